//! Transport abstraction shared by every sensor driver.
//!
//! The layer is split in two:
//!
//! - [`Bus`] is the capability table a concrete peripheral implements (an I2C
//!   controller, an SPI device, ...). It is driven through `&mut self` and knows
//!   nothing about callbacks.
//! - [`BusRegistry`](registry::BusRegistry) owns a fixed set of buses indexed by
//!   [`BusId`], hands out shared access through [`BusAccess`], and correlates the
//!   platform's completion interrupt back to the client that submitted the
//!   transfer.

pub mod i2c;
pub mod registry;
pub mod spi;

use crate::error::Result;

/// Size of the transport-owned buffer used by async transfers.
pub const MAX_TRANSFER_LEN: usize = 32;

/// Logical bus identifier, the index of the bus inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusId(pub u8);

/// Low-level peripheral identity carried by the platform completion interrupt.
///
/// This is whatever the HAL reports (controller instance number, DMA stream, ...)
/// and is unrelated to the [`BusId`] the bus ends up registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeripheralId(pub u8);

/// Register read into a caller-provided buffer.
#[derive(Debug)]
pub struct MemRead<'b> {
    /// First register address.
    pub register: u8,
    /// Destination buffer; its length is the transfer size.
    pub buf: &'b mut [u8],
}

/// Register write from a caller-provided buffer.
#[derive(Debug, Clone, Copy)]
pub struct MemWrite<'b> {
    /// First register address.
    pub register: u8,
    /// Payload; its length is the transfer size.
    pub data: &'b [u8],
}

impl<'b> MemRead<'b> {
    /// Creates a read of `buf.len()` bytes starting at `register`.
    pub fn new(register: u8, buf: &'b mut [u8]) -> Self {
        Self { register, buf }
    }
}

impl<'b> MemWrite<'b> {
    /// Creates a write of `data` starting at `register`.
    pub const fn new(register: u8, data: &'b [u8]) -> Self {
        Self { register, data }
    }
}

/// Completion callbacks for async transfers.
///
/// Invoked from the completion interrupt: implementations must not block and
/// must not start blocking transfers.
pub trait TransferClient {
    /// The submitted transfer finished. `data` holds the received bytes for a
    /// read and is empty for a write.
    fn transfer_complete(&self, bus: BusId, data: &[u8]);

    /// The first half of the submitted transfer landed.
    fn half_transfer_complete(&self, bus: BusId) {
        let _ = bus;
    }
}

/// Addressing record passed to every registry operation.
#[derive(Clone, Copy)]
pub struct DeviceAddress<'a> {
    /// Logical bus the device sits on.
    pub bus: BusId,
    /// 7-bit device address (ignored by chip-selected transports).
    pub address: u8,
    /// Client notified when an async transfer for this device completes.
    pub client: Option<&'a dyn TransferClient>,
}

impl<'a> DeviceAddress<'a> {
    /// Addresses a device without completion callbacks.
    pub const fn new(bus: BusId, address: u8) -> Self {
        Self {
            bus,
            address,
            client: None,
        }
    }

    /// Attaches the completion callbacks used by async transfers.
    pub fn with_client(mut self, client: &'a dyn TransferClient) -> Self {
        self.client = Some(client);
        self
    }
}

impl core::fmt::Debug for DeviceAddress<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceAddress")
            .field("bus", &self.bus)
            .field("address", &self.address)
            .field("client", &self.client.is_some())
            .finish()
    }
}

/// Handle on one registered bus: the shared access plus the logical id.
pub struct BusHandle<'a, E> {
    access: &'a dyn BusAccess<'a, Error = E>,
    id: BusId,
}

impl<'a, E> BusHandle<'a, E> {
    /// Binds `id` on the given bus access.
    pub fn new(access: &'a dyn BusAccess<'a, Error = E>, id: BusId) -> Self {
        Self { access, id }
    }

    /// Logical bus identifier.
    pub fn id(&self) -> BusId {
        self.id
    }

    /// Shared access used to issue operations.
    pub fn access(&self) -> &'a dyn BusAccess<'a, Error = E> {
        self.access
    }
}

impl<E> Clone for BusHandle<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for BusHandle<'_, E> {}

/// Capability table every serial transport must provide.
///
/// Blocking operations return once the transfer completed or failed. Async
/// operations return once the transfer is submitted; the bytes of an async
/// read are kept in a transport-owned buffer exposed through
/// [`received`](Bus::received) until the next submission.
///
/// Transfers that do not fit the transport buffer fail with
/// [`Error::TransferTooLarge`](crate::Error::TransferTooLarge) before anything
/// reaches the wire.
pub trait Bus {
    /// Error type produced by the concrete peripheral.
    type Error;

    /// Identity the platform reports in the completion interrupt for this bus.
    fn peripheral(&self) -> PeripheralId;

    /// Brings the peripheral up.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Probes whether the device at `address` answers.
    fn is_ready(&mut self, address: u8) -> Result<(), Self::Error>;

    /// Writes consecutive registers.
    fn mem_write(&mut self, address: u8, op: MemWrite<'_>) -> Result<(), Self::Error>;

    /// Reads consecutive registers.
    fn mem_read(&mut self, address: u8, op: MemRead<'_>) -> Result<(), Self::Error>;

    /// Submits a register write. The payload is copied before returning.
    fn mem_write_async(
        &mut self,
        address: u8,
        op: MemWrite<'_>,
    ) -> Result<(), Self::Error>;

    /// Submits a read of `len` registers into the transport buffer, at most
    /// [`MAX_TRANSFER_LEN`] bytes.
    fn mem_read_async(
        &mut self,
        address: u8,
        register: u8,
        len: usize,
    ) -> Result<(), Self::Error>;

    /// Bytes delivered by the last async read.
    fn received(&self) -> &[u8];

    /// Raw write without register addressing.
    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error>;

    /// Raw read without register addressing.
    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Releases the peripheral.
    fn deinit(&mut self) -> Result<(), Self::Error>;
}

/// Shared access to registered buses, as used by sensor drivers.
///
/// Every call names its target through a [`DeviceAddress`]. Async submissions
/// record the address's client for the bus until the transfer completes.
pub trait BusAccess<'a> {
    /// Error type of the underlying transports.
    type Error;

    /// Brings up one bus.
    fn init(&self, bus: BusId) -> Result<(), Self::Error>;

    /// Probes the device; fails with [`Error::NotReady`](crate::Error::NotReady)
    /// if it does not answer.
    fn is_ready(&self, device: &DeviceAddress<'a>) -> Result<(), Self::Error>;

    /// Blocking register write.
    fn mem_write(&self, device: &DeviceAddress<'a>, op: MemWrite<'_>) -> Result<(), Self::Error>;

    /// Blocking register read.
    fn mem_read(&self, device: &DeviceAddress<'a>, op: MemRead<'_>) -> Result<(), Self::Error>;

    /// Async register write; completion is reported to `device.client`.
    fn mem_write_async(
        &self,
        device: &DeviceAddress<'a>,
        op: MemWrite<'_>,
    ) -> Result<(), Self::Error>;

    /// Async register read of `len` bytes; the bytes are handed to `device.client`.
    fn mem_read_async(
        &self,
        device: &DeviceAddress<'a>,
        register: u8,
        len: usize,
    ) -> Result<(), Self::Error>;

    /// Blocking raw write.
    fn write(&self, device: &DeviceAddress<'a>, data: &[u8]) -> Result<(), Self::Error>;

    /// Blocking raw read.
    fn read(&self, device: &DeviceAddress<'a>, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Returns `true` while an async transfer is outstanding on `bus`.
    fn is_pending(&self, bus: BusId) -> bool;

    /// Drops the outstanding async transfer of `device`, if `device` is the
    /// one that submitted it. A completion arriving afterwards is ignored.
    ///
    /// Returns `true` if an association was dropped.
    fn cancel(&self, device: &DeviceAddress<'a>) -> Result<bool, Self::Error>;

    /// Releases one bus.
    fn deinit(&self, bus: BusId) -> Result<(), Self::Error>;
}
