//! I2C transport built on top of `embedded-hal` `I2c`.

use embedded_hal::i2c::I2c;

use super::{Bus, MemRead, MemWrite, PeripheralId, MAX_TRANSFER_LEN};
use crate::error::{Error, Result};

/// I2C-based transport.
///
/// `embedded-hal` buses are blocking, so async submissions run the transfer to
/// completion straight away into the transport buffer. The completion is still
/// only observed once the platform raises it through the registry, which keeps
/// the callback flow identical to a DMA-backed HAL.
pub struct I2cBus<I2C> {
    i2c: I2C,
    peripheral: PeripheralId,
    dma: [u8; MAX_TRANSFER_LEN],
    received: usize,
}

impl<I2C> I2cBus<I2C> {
    /// Wraps an I2C controller reported as `peripheral` by completion interrupts.
    pub const fn new(i2c: I2C, peripheral: PeripheralId) -> Self {
        Self {
            i2c,
            peripheral,
            dma: [0; MAX_TRANSFER_LEN],
            received: 0,
        }
    }

    /// Provides mutable access to the wrapped I2C controller.
    pub fn i2c_mut(&mut self) -> &mut I2C {
        &mut self.i2c
    }

    /// Consumes the transport and returns the owned I2C controller.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C> Bus for I2cBus<I2C>
where
    I2C: I2c,
{
    type Error = I2C::Error;

    fn peripheral(&self) -> PeripheralId {
        self.peripheral
    }

    fn init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn is_ready(&mut self, address: u8) -> Result<(), Self::Error> {
        // An empty write only succeeds if the address is acknowledged.
        self.i2c.write(address, &[]).map_err(Error::from)
    }

    fn mem_write(&mut self, address: u8, op: MemWrite<'_>) -> Result<(), Self::Error> {
        let len = op.data.len();
        if len > MAX_TRANSFER_LEN {
            return Err(Error::TransferTooLarge);
        }

        let mut frame = [0u8; MAX_TRANSFER_LEN + 1];
        frame[0] = op.register;
        frame[1..=len].copy_from_slice(op.data);
        self.i2c.write(address, &frame[..=len]).map_err(Error::from)
    }

    fn mem_read(&mut self, address: u8, op: MemRead<'_>) -> Result<(), Self::Error> {
        if op.buf.is_empty() {
            return Ok(());
        }

        self.i2c
            .write_read(address, &[op.register], op.buf)
            .map_err(Error::from)
    }

    fn mem_write_async(&mut self, address: u8, op: MemWrite<'_>) -> Result<(), Self::Error> {
        self.received = 0;
        self.mem_write(address, op)
    }

    fn mem_read_async(&mut self, address: u8, register: u8, len: usize) -> Result<(), Self::Error> {
        self.received = 0;
        let buf = self.dma.get_mut(..len).ok_or(Error::TransferTooLarge)?;
        self.i2c.write_read(address, &[register], buf)?;
        self.received = len;
        Ok(())
    }

    fn received(&self) -> &[u8] {
        &self.dma[..self.received]
    }

    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error> {
        self.i2c.write(address, data).map_err(Error::from)
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.i2c.read(address, buf).map_err(Error::from)
    }

    fn deinit(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::I2cBus;
    use crate::bus::{Bus, MemRead, MemWrite, PeripheralId, MAX_TRANSFER_LEN};
    use crate::error::Error;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const ADDR: u8 = 0x68;

    #[test]
    fn is_ready_sends_empty_write() {
        let expectations = [I2cTransaction::write(ADDR, vec![])];
        let mut mock = I2cMock::new(&expectations);
        let mut bus = I2cBus::new(mock.clone(), PeripheralId(1));

        bus.is_ready(ADDR).unwrap();
        mock.done();
    }

    #[test]
    fn is_ready_reports_missing_ack() {
        let expectations = [I2cTransaction::write(ADDR, vec![]).with_error(ErrorKind::Other)];
        let mut mock = I2cMock::new(&expectations);
        let mut bus = I2cBus::new(mock.clone(), PeripheralId(1));

        assert_eq!(bus.is_ready(ADDR), Err(Error::Interface(ErrorKind::Other)));
        mock.done();
    }

    #[test]
    fn mem_write_prefixes_register_address() {
        let expectations = [I2cTransaction::write(ADDR, vec![0x6B, 0x80, 0x01])];
        let mut mock = I2cMock::new(&expectations);
        let mut bus = I2cBus::new(mock.clone(), PeripheralId(1));

        bus.mem_write(ADDR, MemWrite::new(0x6B, &[0x80, 0x01])).unwrap();
        mock.done();
    }

    #[test]
    fn mem_read_writes_register_then_reads() {
        let expectations = [I2cTransaction::write_read(ADDR, vec![0x1B], vec![0xAA, 0x55])];
        let mut mock = I2cMock::new(&expectations);
        let mut bus = I2cBus::new(mock.clone(), PeripheralId(1));

        let mut buf = [0u8; 2];
        bus.mem_read(ADDR, MemRead::new(0x1B, &mut buf)).unwrap();
        assert_eq!(buf, [0xAA, 0x55]);
        mock.done();
    }

    #[test]
    fn mem_read_ignores_empty_buffer() {
        let expectations: [I2cTransaction; 0] = [];
        let mut mock = I2cMock::new(&expectations);
        let mut bus = I2cBus::new(mock.clone(), PeripheralId(1));

        bus.mem_read(ADDR, MemRead::new(0x1B, &mut [])).unwrap();
        mock.done();
    }

    #[test]
    fn mem_read_async_lands_in_transport_buffer() {
        let expectations = [I2cTransaction::write_read(
            ADDR,
            vec![0x3B],
            vec![0x10, 0x00, 0x00, 0x00, 0xF0, 0x00],
        )];
        let mut mock = I2cMock::new(&expectations);
        let mut bus = I2cBus::new(mock.clone(), PeripheralId(1));

        assert!(bus.received().is_empty());
        bus.mem_read_async(ADDR, 0x3B, 6).unwrap();
        assert_eq!(bus.received(), &[0x10, 0x00, 0x00, 0x00, 0xF0, 0x00]);
        mock.done();
    }

    #[test]
    fn failed_async_read_leaves_no_stale_bytes() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0x3B], vec![0x01, 0x02]),
            I2cTransaction::write_read(ADDR, vec![0x43], vec![0x00, 0x00]).with_error(ErrorKind::Other),
        ];
        let mut mock = I2cMock::new(&expectations);
        let mut bus = I2cBus::new(mock.clone(), PeripheralId(1));

        bus.mem_read_async(ADDR, 0x3B, 2).unwrap();
        assert!(bus.mem_read_async(ADDR, 0x43, 2).is_err());
        assert!(bus.received().is_empty());
        mock.done();
    }

    #[test]
    fn raw_write_and_read_skip_register_addressing() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x75]),
            I2cTransaction::read(ADDR, vec![0x68]),
        ];
        let mut mock = I2cMock::new(&expectations);
        let mut bus = I2cBus::new(mock.clone(), PeripheralId(1));

        bus.write(ADDR, &[0x75]).unwrap();
        let mut id = [0u8; 1];
        bus.read(ADDR, &mut id).unwrap();
        assert_eq!(id, [0x68]);
        mock.done();
    }

    #[test]
    fn oversized_transfers_never_reach_the_wire() {
        let expectations: [I2cTransaction; 0] = [];
        let mut mock = I2cMock::new(&expectations);
        let mut bus = I2cBus::new(mock.clone(), PeripheralId(1));

        let payload = [0u8; MAX_TRANSFER_LEN + 1];
        assert_eq!(
            bus.mem_write(ADDR, MemWrite::new(0x00, &payload)),
            Err(Error::TransferTooLarge)
        );
        assert_eq!(
            bus.mem_read_async(ADDR, 0x3B, MAX_TRANSFER_LEN + 8),
            Err(Error::TransferTooLarge)
        );
        assert!(bus.received().is_empty());
        mock.done();
    }

    #[test]
    fn full_buffer_write_fits_one_frame() {
        let payload = [0xA5u8; MAX_TRANSFER_LEN];
        let mut frame = vec![0x10];
        frame.extend_from_slice(&payload);
        let expectations = [I2cTransaction::write(ADDR, frame)];
        let mut mock = I2cMock::new(&expectations);
        let mut bus = I2cBus::new(mock.clone(), PeripheralId(1));

        bus.mem_write(ADDR, MemWrite::new(0x10, &payload)).unwrap();
        mock.done();
    }
}
