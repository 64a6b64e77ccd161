//! Fixed-size bus registry and completion correlation.
//!
//! The platform's transfer-complete interrupt only knows which peripheral
//! fired. The registry maps that [`PeripheralId`] back to the logical
//! [`BusId`], hands the received bytes to the client that submitted the
//! transfer and drops the association so a later, unrelated completion cannot
//! reach a stale client.
//!
//! State is kept in `Cell`/`RefCell`: the registry is shared between the
//! application context and the completion interrupt on a single core. The
//! platform must raise [`BusRegistry::on_transfer_complete`] only after the
//! submitting call has returned, e.g. by deferring the interrupt work to the
//! next poll or by masking the completion interrupt around submissions. A
//! borrow conflict surfaces as [`Error::Busy`] instead of a panic, and a
//! completion that finds the bus still borrowed is left pending for a later
//! call.

use core::cell::{Cell, RefCell};

use super::{
    Bus, BusAccess, BusHandle, BusId, DeviceAddress, MemRead, MemWrite, PeripheralId, TransferClient,
    MAX_TRANSFER_LEN,
};
use crate::error::{Error, Result};

/// Kind of async transfer outstanding on a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Transfer {
    Read,
    Write,
}

struct BusSlot<'a, B> {
    bus: RefCell<B>,
    peripheral: PeripheralId,
    client: Cell<Option<&'a dyn TransferClient>>,
    pending: Cell<Option<Transfer>>,
}

impl<'a, B> BusSlot<'a, B>
where
    B: Bus,
{
    fn new(bus: B) -> Self {
        Self {
            peripheral: bus.peripheral(),
            bus: RefCell::new(bus),
            client: Cell::new(None),
            pending: Cell::new(None),
        }
    }
}

/// Owns `N` buses of the same transport type, addressed by [`BusId`] index.
pub struct BusRegistry<'a, B, const N: usize> {
    slots: [BusSlot<'a, B>; N],
}

impl<'a, B, const N: usize> BusRegistry<'a, B, N>
where
    B: Bus,
{
    /// Registers `buses`; the bus at index `i` becomes `BusId(i)`.
    pub fn new(buses: [B; N]) -> Self {
        Self {
            slots: buses.map(BusSlot::new),
        }
    }

    /// Returns a handle on `bus` for binding sensor drivers.
    pub fn handle(&'a self, bus: BusId) -> Result<BusHandle<'a, B::Error>, B::Error>
    where
        B: 'a,
    {
        self.slot(bus)?;
        Ok(BusHandle::new(self, bus))
    }

    /// Consumes the registry and returns the owned transports.
    pub fn release(self) -> [B; N] {
        self.slots.map(|slot| slot.bus.into_inner())
    }

    /// Brings up every registered bus, stopping at the first failure.
    pub fn init_all(&self) -> Result<(), B::Error> {
        (0..N).try_for_each(|index| self.init(BusId(index as u8)))
    }

    /// Releases every registered bus, stopping at the first failure.
    pub fn deinit_all(&self) -> Result<(), B::Error> {
        (0..N).try_for_each(|index| self.deinit(BusId(index as u8)))
    }

    /// Reverse-maps a completion interrupt's peripheral to its logical bus.
    pub fn bus_for_peripheral(&self, peripheral: PeripheralId) -> Option<BusId> {
        self.slots
            .iter()
            .position(|slot| slot.peripheral == peripheral)
            .map(|index| BusId(index as u8))
    }

    /// Returns `true` while an async transfer is outstanding on `bus`.
    pub fn is_pending(&self, bus: BusId) -> bool {
        self.slot(bus)
            .map(|slot| slot.pending.get().is_some())
            .unwrap_or(false)
    }

    /// Drops the outstanding async transfer on `device.bus` if `device` owns
    /// it, i.e. carries the same client as the submission. Used to recover
    /// from a completion interrupt that never arrived.
    pub fn cancel(&self, device: &DeviceAddress<'a>) -> Result<bool, B::Error> {
        let slot = self.slot(device.bus)?;
        let owned = match (slot.client.get(), device.client) {
            (Some(current), Some(requester)) => same_client(current, requester),
            (None, None) => true,
            _ => false,
        };
        if !owned {
            return Ok(false);
        }

        slot.client.set(None);
        let dropped = slot.pending.take();
        if let Some(transfer) = dropped {
            warn!("bus {}: {} cancelled", device.bus.0, transfer);
        }
        Ok(dropped.is_some())
    }

    /// Completion hook for the platform's transfer-complete interrupt (RX or TX).
    ///
    /// Returns `true` if a client callback was dispatched. The association is
    /// cleared before the callback runs, which lets the callback chain the
    /// next submission on the same bus. If the bus is still borrowed by the
    /// submitting call, nothing is dispatched and the association is kept so
    /// the completion can be raised again.
    pub fn on_transfer_complete(&self, peripheral: PeripheralId) -> bool {
        let Some(id) = self.bus_for_peripheral(peripheral) else {
            warn!("completion from unregistered peripheral {}", peripheral.0);
            return false;
        };
        let slot = &self.slots[usize::from(id.0)];

        let Some(transfer) = slot.pending.get() else {
            warn!("spurious completion on bus {}", id.0);
            return false;
        };

        let mut rx = [0u8; MAX_TRANSFER_LEN];
        let len = match transfer {
            Transfer::Read => match slot.bus.try_borrow() {
                Ok(bus) => {
                    let data = bus.received();
                    let len = data.len().min(MAX_TRANSFER_LEN);
                    rx[..len].copy_from_slice(&data[..len]);
                    len
                }
                Err(_) => {
                    error!("bus {} still borrowed at completion, deferring", id.0);
                    return false;
                }
            },
            Transfer::Write => 0,
        };

        slot.pending.set(None);
        let client = slot.client.take();

        match client {
            Some(client) => {
                trace!("bus {}: {} complete, {} bytes", id.0, transfer, len);
                client.transfer_complete(id, &rx[..len]);
                true
            }
            None => false,
        }
    }

    /// Half-transfer hook. Forwards to the pending client without clearing it.
    pub fn on_half_transfer(&self, peripheral: PeripheralId) -> bool {
        let Some(id) = self.bus_for_peripheral(peripheral) else {
            return false;
        };
        let slot = &self.slots[usize::from(id.0)];

        match (slot.pending.get(), slot.client.get()) {
            (Some(_), Some(client)) => {
                client.half_transfer_complete(id);
                true
            }
            _ => false,
        }
    }

    fn slot(&self, bus: BusId) -> Result<&BusSlot<'a, B>, B::Error> {
        self.slots.get(usize::from(bus.0)).ok_or(Error::UnknownBus)
    }

    /// Runs a blocking operation on an idle bus.
    fn with_idle_bus<R>(
        &self,
        bus: BusId,
        op: impl FnOnce(&mut B) -> Result<R, B::Error>,
    ) -> Result<R, B::Error> {
        let slot = self.slot(bus)?;
        if slot.pending.get().is_some() {
            return Err(Error::Busy);
        }

        let mut transport = slot.bus.try_borrow_mut().map_err(|_| Error::Busy)?;
        op(&mut *transport)
    }

    /// Records the association, then submits. A failed submission leaves the
    /// bus without an association.
    fn submit(
        &self,
        device: &DeviceAddress<'a>,
        transfer: Transfer,
        op: impl FnOnce(&mut B) -> Result<(), B::Error>,
    ) -> Result<(), B::Error> {
        let slot = self.slot(device.bus)?;
        if slot.pending.get().is_some() {
            warn!("bus {} has a transfer in flight, rejecting submission", device.bus.0);
            return Err(Error::Busy);
        }

        let mut transport = slot.bus.try_borrow_mut().map_err(|_| Error::Busy)?;

        slot.client.set(device.client);
        slot.pending.set(Some(transfer));

        if let Err(err) = op(&mut *transport) {
            slot.client.set(None);
            slot.pending.set(None);
            error!("bus {}: {} submission failed", device.bus.0, transfer);
            return Err(err);
        }

        debug!("bus {}: {} submitted to {=u8:#x}", device.bus.0, transfer, device.address);
        Ok(())
    }
}

impl<'a, B, const N: usize> BusAccess<'a> for BusRegistry<'a, B, N>
where
    B: Bus,
{
    type Error = B::Error;

    fn init(&self, bus: BusId) -> Result<(), Self::Error> {
        self.with_idle_bus(bus, |transport| transport.init())
    }

    fn is_ready(&self, device: &DeviceAddress<'a>) -> Result<(), Self::Error> {
        match self.with_idle_bus(device.bus, |transport| transport.is_ready(device.address)) {
            Err(Error::Interface(_)) => {
                warn!("device {=u8:#x} on bus {} did not answer", device.address, device.bus.0);
                Err(Error::NotReady)
            }
            other => other,
        }
    }

    fn mem_write(&self, device: &DeviceAddress<'a>, op: MemWrite<'_>) -> Result<(), Self::Error> {
        if op.data.len() > MAX_TRANSFER_LEN {
            return Err(Error::TransferTooLarge);
        }

        self.with_idle_bus(device.bus, |transport| transport.mem_write(device.address, op))
    }

    fn mem_read(&self, device: &DeviceAddress<'a>, op: MemRead<'_>) -> Result<(), Self::Error> {
        self.with_idle_bus(device.bus, |transport| transport.mem_read(device.address, op))
    }

    fn mem_write_async(
        &self,
        device: &DeviceAddress<'a>,
        op: MemWrite<'_>,
    ) -> Result<(), Self::Error> {
        if op.data.len() > MAX_TRANSFER_LEN {
            return Err(Error::TransferTooLarge);
        }

        self.submit(device, Transfer::Write, |transport| {
            transport.mem_write_async(device.address, op)
        })
    }

    fn mem_read_async(
        &self,
        device: &DeviceAddress<'a>,
        register: u8,
        len: usize,
    ) -> Result<(), Self::Error> {
        if len > MAX_TRANSFER_LEN {
            return Err(Error::TransferTooLarge);
        }

        self.submit(device, Transfer::Read, |transport| {
            transport.mem_read_async(device.address, register, len)
        })
    }

    fn write(&self, device: &DeviceAddress<'a>, data: &[u8]) -> Result<(), Self::Error> {
        self.with_idle_bus(device.bus, |transport| transport.write(device.address, data))
    }

    fn read(&self, device: &DeviceAddress<'a>, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.with_idle_bus(device.bus, |transport| transport.read(device.address, buf))
    }

    fn is_pending(&self, bus: BusId) -> bool {
        BusRegistry::is_pending(self, bus)
    }

    fn cancel(&self, device: &DeviceAddress<'a>) -> Result<bool, Self::Error> {
        BusRegistry::cancel(self, device)
    }

    fn deinit(&self, bus: BusId) -> Result<(), Self::Error> {
        self.with_idle_bus(bus, |transport| transport.deinit())
    }
}

fn same_client(a: &dyn TransferClient, b: &dyn TransferClient) -> bool {
    core::ptr::from_ref(a).cast::<()>() == core::ptr::from_ref(b).cast::<()>()
}
