//! Error handling primitives for the bus layer and the sensor drivers.

/// Crate-wide result type alias.
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Error variants produced by the bus registry and the sensor drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Any error reported by the underlying bus (NACK, arbitration loss, timeout).
    Interface(E),
    /// The device did not acknowledge the readiness probe.
    NotReady,
    /// The logical bus identifier is not present in the registry.
    UnknownBus,
    /// No driver matches the requested sensor type.
    UnknownSensorType,
    /// The sensor was used before a successful init.
    NotInitialized,
    /// A read cycle or an async transfer is already in flight.
    Busy,
    /// The async read pipeline failed and requires a re-init.
    Failed,
    /// A range code has no entry in the conversion tables.
    InvalidConfig,
    /// The transfer does not fit in the transport buffer.
    TransferTooLarge,
    /// A read-modify-write targeted a read-only register.
    ReadOnlyRegister,
}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Self::Interface(err)
    }
}
