//! SPI transport built on top of `embedded-hal` `SpiDevice`.
//!
//! Targets the register protocol shared by the InvenSense MPU family: bit 7 of
//! the first byte selects a read, the remaining bits carry the register.

use embedded_hal::spi::{Operation, SpiDevice};

use super::{Bus, MemRead, MemWrite, PeripheralId, MAX_TRANSFER_LEN};
use crate::error::{Error, Result};

/// Read flag OR-ed into the register byte.
const READ_FLAG: u8 = 0x80;

/// SPI-based transport. The device address is ignored; chip select is owned
/// by the `SpiDevice`.
pub struct SpiBus<SPI> {
    spi: SPI,
    peripheral: PeripheralId,
    dma: [u8; MAX_TRANSFER_LEN],
    received: usize,
}

impl<SPI> SpiBus<SPI> {
    /// Wraps an SPI device reported as `peripheral` by completion interrupts.
    pub const fn new(spi: SPI, peripheral: PeripheralId) -> Self {
        Self {
            spi,
            peripheral,
            dma: [0; MAX_TRANSFER_LEN],
            received: 0,
        }
    }

    /// Builds the command byte used to address registers over SPI.
    fn command_byte(register: u8, is_read: bool) -> u8 {
        let command = register & !READ_FLAG;
        if is_read {
            command | READ_FLAG
        } else {
            command
        }
    }

    /// Provides mutable access to the wrapped SPI device.
    pub fn spi_mut(&mut self) -> &mut SPI {
        &mut self.spi
    }

    /// Consumes the transport and returns the owned SPI device.
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI> Bus for SpiBus<SPI>
where
    SPI: SpiDevice,
{
    type Error = SPI::Error;

    fn peripheral(&self) -> PeripheralId {
        self.peripheral
    }

    fn init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn is_ready(&mut self, _address: u8) -> Result<(), Self::Error> {
        // No acknowledge phase on SPI.
        Ok(())
    }

    fn mem_write(&mut self, _address: u8, op: MemWrite<'_>) -> Result<(), Self::Error> {
        if op.data.len() > MAX_TRANSFER_LEN {
            return Err(Error::TransferTooLarge);
        }
        if op.data.is_empty() {
            return Ok(());
        }

        let command = [Self::command_byte(op.register, false)];
        let mut operations = [Operation::Write(&command), Operation::Write(op.data)];
        self.spi.transaction(&mut operations).map_err(Error::from)
    }

    fn mem_read(&mut self, _address: u8, op: MemRead<'_>) -> Result<(), Self::Error> {
        if op.buf.is_empty() {
            return Ok(());
        }

        let command = [Self::command_byte(op.register, true)];
        let mut operations = [Operation::Write(&command), Operation::Read(op.buf)];
        self.spi.transaction(&mut operations).map_err(Error::from)
    }

    fn mem_write_async(&mut self, address: u8, op: MemWrite<'_>) -> Result<(), Self::Error> {
        self.received = 0;
        self.mem_write(address, op)
    }

    fn mem_read_async(&mut self, _address: u8, register: u8, len: usize) -> Result<(), Self::Error> {
        self.received = 0;
        let buf = self.dma.get_mut(..len).ok_or(Error::TransferTooLarge)?;
        if buf.is_empty() {
            return Ok(());
        }

        let command = [Self::command_byte(register, true)];
        let mut operations = [Operation::Write(&command), Operation::Read(buf)];
        self.spi.transaction(&mut operations)?;
        self.received = len;
        Ok(())
    }

    fn received(&self) -> &[u8] {
        &self.dma[..self.received]
    }

    fn write(&mut self, _address: u8, data: &[u8]) -> Result<(), Self::Error> {
        self.spi.write(data).map_err(Error::from)
    }

    fn read(&mut self, _address: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.spi.read(buf).map_err(Error::from)
    }

    fn deinit(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SpiBus;
    use crate::bus::{Bus, MemRead, MemWrite, PeripheralId, MAX_TRANSFER_LEN};
    use crate::error::Error;
    use core::convert::Infallible;
    use embedded_hal::spi::{ErrorType, Operation, SpiDevice};

    struct MockDevice<'a> {
        expectations: &'a [TransactionExpectation<'a>],
        index: usize,
    }

    impl<'a> MockDevice<'a> {
        fn new(expectations: &'a [TransactionExpectation<'a>]) -> Self {
            Self { expectations, index: 0 }
        }
    }

    impl<'a> Drop for MockDevice<'a> {
        fn drop(&mut self) {
            assert_eq!(
                self.index,
                self.expectations.len(),
                "not all SPI expectations consumed"
            );
        }
    }

    impl<'a> ErrorType for MockDevice<'a> {
        type Error = Infallible;
    }

    impl<'a> SpiDevice for MockDevice<'a> {
        fn transaction<'b>(
            &mut self,
            operations: &mut [Operation<'b, u8>],
        ) -> Result<(), Self::Error> {
            let expected = self
                .expectations
                .get(self.index)
                .expect("unexpected SPI transaction");
            self.index += 1;

            assert_eq!(operations.len(), 2, "expected command + data operations");
            let (first, rest) = operations.split_first_mut().expect("missing first op");
            let command = match first {
                Operation::Write(data) => {
                    assert_eq!(data.len(), 1, "command length mismatch");
                    data[0]
                }
                _ => panic!("first operation must be write"),
            };

            match (*expected, rest.first_mut().expect("missing second op")) {
                (TransactionExpectation::Read { command: want, response }, Operation::Read(buf)) => {
                    assert_eq!(command, want, "command byte mismatch");
                    assert_eq!(buf.len(), response.len(), "response length mismatch");
                    buf.copy_from_slice(response);
                }
                (TransactionExpectation::Write { command: want, payload }, Operation::Write(data)) => {
                    assert_eq!(command, want, "command byte mismatch");
                    assert_eq!(*data, payload, "payload mismatch");
                }
                _ => panic!("operation kind mismatch"),
            }

            Ok(())
        }
    }

    #[derive(Clone, Copy)]
    enum TransactionExpectation<'a> {
        Read { command: u8, response: &'a [u8] },
        Write { command: u8, payload: &'a [u8] },
    }

    #[test]
    fn mem_read_sets_read_flag() {
        let expectations = [TransactionExpectation::Read {
            command: 0x9B,
            response: &[0x18],
        }];
        let mut bus = SpiBus::new(MockDevice::new(&expectations), PeripheralId(2));

        let mut buf = [0u8; 1];
        bus.mem_read(0x68, MemRead::new(0x1B, &mut buf)).unwrap();
        assert_eq!(buf, [0x18]);
    }

    #[test]
    fn mem_write_clears_read_flag() {
        let expectations = [TransactionExpectation::Write {
            command: 0x6B,
            payload: &[0x80],
        }];
        let mut bus = SpiBus::new(MockDevice::new(&expectations), PeripheralId(2));

        bus.mem_write(0x68, MemWrite::new(0x6B, &[0x80])).unwrap();
    }

    #[test]
    fn mem_read_async_lands_in_transport_buffer() {
        let expectations = [TransactionExpectation::Read {
            command: 0xC3,
            response: &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06],
        }];
        let mut bus = SpiBus::new(MockDevice::new(&expectations), PeripheralId(2));

        bus.mem_read_async(0x68, 0x43, 6).unwrap();
        assert_eq!(bus.received(), &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn empty_transfers_are_skipped() {
        let expectations: [TransactionExpectation; 0] = [];
        let mut bus = SpiBus::new(MockDevice::new(&expectations), PeripheralId(2));

        bus.mem_read(0x68, MemRead::new(0x3B, &mut [])).unwrap();
        bus.mem_write(0x68, MemWrite::new(0x6B, &[])).unwrap();
        bus.mem_read_async(0x68, 0x3B, 0).unwrap();
        assert!(bus.received().is_empty());
    }

    #[test]
    fn is_ready_always_succeeds() {
        let expectations: [TransactionExpectation; 0] = [];
        let mut bus = SpiBus::new(MockDevice::new(&expectations), PeripheralId(2));

        bus.is_ready(0x68).unwrap();
    }

    #[test]
    fn oversized_transfers_are_rejected() {
        let expectations: [TransactionExpectation; 0] = [];
        let mut bus = SpiBus::new(MockDevice::new(&expectations), PeripheralId(2));

        assert_eq!(
            bus.mem_read_async(0x68, 0x3B, MAX_TRANSFER_LEN + 1),
            Err(Error::TransferTooLarge)
        );
        assert_eq!(
            bus.mem_write(0x68, MemWrite::new(0x00, &[0u8; MAX_TRANSFER_LEN + 1])),
            Err(Error::TransferTooLarge)
        );
    }
}
