//! Sensor instance, driver capability table and type dispatch.
//!
//! A [`GyroAcc`] is the handle an application keeps for one physical sensor.
//! It starts out unbound; [`GyroAcc::init`] resolves the [`SensorType`] to a
//! driver, which binds the instance to a bus, programs the chip and leaves the
//! async read pipeline [`Idle`](ReadState::Idle).
//!
//! Async reads complete in interrupt context. The instance registers itself as
//! the [`TransferClient`] of its transfers and forwards every completion to the
//! bound driver, which advances the [`ReadState`] machine. A full sample takes
//! two bus round trips, accelerometer block first:
//!
//! ```text
//! Idle --read_all_async--> AccelPending --complete--> GyroPending --complete--> Idle
//!                               \                          \
//!                                +--submission failed------+--> Failed
//! ```

use core::cell::Cell;

use embedded_hal::delay::DelayNs;
use micromath::vector::F32x3;

use crate::bus::{BusHandle, BusId, DeviceAddress, TransferClient};
use crate::config::SensorConfig;
use crate::error::{Error, Result};
use crate::mpu6050::Mpu6050;

const ZERO: F32x3 = F32x3 {
    x: 0.0,
    y: 0.0,
    z: 0.0,
};

/// Sensor model selected at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorType {
    /// No driver; init fails with [`Error::UnknownSensorType`].
    Unknown,
    /// InvenSense MPU-6050.
    Mpu6050,
}

impl From<u8> for SensorType {
    fn from(value: u8) -> Self {
        match value {
            1 => SensorType::Mpu6050,
            _ => SensorType::Unknown,
        }
    }
}

/// Converted gyroscope/accelerometer reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Angular rate in rad/s.
    pub gyro: F32x3,
    /// Acceleration in g.
    pub accel: F32x3,
}

impl SensorSample {
    /// All-zero sample held by an instance before its first completed read.
    pub const ZERO: Self = Self {
        gyro: ZERO,
        accel: ZERO,
    };
}

impl Default for SensorSample {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Scalars turning raw counts into physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Conversion {
    /// Raw gyroscope count to rad/s.
    pub gyro: f32,
    /// Raw accelerometer count to g.
    pub accel: f32,
}

/// Progress of the async read pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadState {
    /// No successful init yet.
    Uninitialized,
    /// Ready to start a read.
    Idle,
    /// Accelerometer block requested.
    AccelPending,
    /// Gyroscope block requested.
    GyroPending,
    /// A submission failed; only a new init recovers.
    Failed,
}

/// Notified from the completion context once a read cycle produced a sample.
pub trait SampleClient {
    /// A new sample was committed to the instance.
    fn sample_ready(&self, sample: SensorSample);
}

/// Capability table implemented by every gyroscope/accelerometer driver.
///
/// Drivers are stateless: everything they need lives in the [`GyroAcc`] they
/// are handed, so one driver value serves any number of sensors.
pub trait GyroAccDriver<E> {
    /// Binds `imu` to `bus`, programs the chip and arms the read pipeline.
    fn init<'a>(
        &self,
        imu: &'a GyroAcc<'a, E>,
        bus: BusHandle<'a, E>,
        config: SensorConfig,
        delay: &mut dyn DelayNs,
    ) -> Result<(), E>;

    /// Blocking read of both output blocks.
    fn read_all(&self, imu: &GyroAcc<'_, E>) -> Result<SensorSample, E>;

    /// Blocking read of the gyroscope block.
    fn read_gyro(&self, imu: &GyroAcc<'_, E>) -> Result<F32x3, E>;

    /// Blocking read of the accelerometer block.
    fn read_acc(&self, imu: &GyroAcc<'_, E>) -> Result<F32x3, E>;

    /// Starts a full accelerometer + gyroscope cycle.
    fn read_all_async(&self, imu: &GyroAcc<'_, E>) -> Result<(), E>;

    /// Starts a gyroscope-only cycle.
    fn read_gyro_async(&self, imu: &GyroAcc<'_, E>) -> Result<(), E>;

    /// Starts an accelerometer-only cycle.
    fn read_acc_async(&self, imu: &GyroAcc<'_, E>) -> Result<(), E>;

    /// Advances the pipeline with the bytes of a completed transfer.
    fn transfer_complete(&self, imu: &GyroAcc<'_, E>, data: &[u8]);
}

/// Bus binding captured at init.
pub(crate) struct Binding<'a, E> {
    pub(crate) bus: BusHandle<'a, E>,
    pub(crate) device: DeviceAddress<'a>,
    pub(crate) conversion: Conversion,
}

/// One gyroscope/accelerometer sensor.
///
/// All state sits behind `Cell`s so the instance can be shared between the
/// application and the completion interrupt through `&GyroAcc`.
pub struct GyroAcc<'a, E> {
    driver: Cell<Option<&'a dyn GyroAccDriver<E>>>,
    bus: Cell<Option<BusHandle<'a, E>>>,
    device: Cell<Option<DeviceAddress<'a>>>,
    config: Cell<Option<SensorConfig>>,
    conversion: Cell<Option<Conversion>>,
    state: Cell<ReadState>,
    chain_gyro: Cell<bool>,
    staged_accel: Cell<Option<F32x3>>,
    data: Cell<SensorSample>,
    client: Cell<Option<&'a dyn SampleClient>>,
}

impl<'a, E> GyroAcc<'a, E> {
    /// Creates an unbound instance.
    pub const fn new() -> Self {
        Self {
            driver: Cell::new(None),
            bus: Cell::new(None),
            device: Cell::new(None),
            config: Cell::new(None),
            conversion: Cell::new(None),
            state: Cell::new(ReadState::Uninitialized),
            chain_gyro: Cell::new(false),
            staged_accel: Cell::new(None),
            data: Cell::new(SensorSample::ZERO),
            client: Cell::new(None),
        }
    }

    // ==================================================================
    // == Dispatch =======================================================
    // ==================================================================
    /// Resolves `kind` to its driver and initializes the sensor on `bus`.
    ///
    /// An unknown type fails before the instance is touched. A driver failure
    /// leaves the instance uninitialized; calling `init` again retries the
    /// whole sequence. The previously committed sample survives a re-init.
    pub fn init(
        &'a self,
        kind: SensorType,
        bus: BusHandle<'a, E>,
        config: SensorConfig,
        delay: &mut impl DelayNs,
    ) -> Result<(), E> {
        let driver: &'a dyn GyroAccDriver<E> = match kind {
            SensorType::Mpu6050 => &Mpu6050,
            SensorType::Unknown => {
                error!("no driver for sensor type {}", kind);
                return Err(Error::UnknownSensorType);
            }
        };

        self.driver.set(Some(driver));
        driver.init(self, bus, config, delay)
    }

    /// Blocking read of both output blocks; the result is also committed.
    pub fn read_all(&self) -> Result<SensorSample, E> {
        self.driver()?.read_all(self)
    }

    /// Blocking gyroscope read in rad/s.
    pub fn read_gyro(&self) -> Result<F32x3, E> {
        self.driver()?.read_gyro(self)
    }

    /// Blocking accelerometer read in g.
    pub fn read_acc(&self) -> Result<F32x3, E> {
        self.driver()?.read_acc(self)
    }

    /// Starts a full async read. The sample is committed once both blocks
    /// arrived; see [`data`](Self::data) and [`set_client`](Self::set_client).
    pub fn read_all_async(&self) -> Result<(), E> {
        self.driver()?.read_all_async(self)
    }

    /// Starts an async gyroscope read; the accelerometer half of the stored
    /// sample is kept.
    pub fn read_gyro_async(&self) -> Result<(), E> {
        self.driver()?.read_gyro_async(self)
    }

    /// Starts an async accelerometer read; the gyroscope half of the stored
    /// sample is kept.
    pub fn read_acc_async(&self) -> Result<(), E> {
        self.driver()?.read_acc_async(self)
    }

    // ==================================================================
    // == Accessors ======================================================
    // ==================================================================
    /// Last committed sample.
    pub fn data(&self) -> SensorSample {
        self.data.get()
    }

    /// Current pipeline state.
    pub fn state(&self) -> ReadState {
        self.state.get()
    }

    /// Configuration recorded by the last init attempt.
    pub fn config(&self) -> Option<SensorConfig> {
        self.config.get()
    }

    /// Conversion scalars of the last init attempt.
    pub fn conversion(&self) -> Option<Conversion> {
        self.conversion.get()
    }

    /// Bus and device address the instance is bound to.
    pub fn device(&self) -> Option<DeviceAddress<'a>> {
        self.device.get()
    }

    /// Registers the client told about every completed async cycle.
    pub fn set_client(&self, client: &'a dyn SampleClient) {
        self.client.set(Some(client));
    }

    fn driver(&self) -> Result<&'a dyn GyroAccDriver<E>, E> {
        self.driver.get().ok_or(Error::NotInitialized)
    }

    // ==================================================================
    // == Driver plumbing ================================================
    // ==================================================================
    /// Records the binding of a new init attempt and disarms the pipeline.
    pub(crate) fn bind(
        &self,
        bus: BusHandle<'a, E>,
        device: DeviceAddress<'a>,
        config: SensorConfig,
        conversion: Conversion,
    ) {
        self.state.set(ReadState::Uninitialized);
        self.staged_accel.set(None);
        self.bus.set(Some(bus));
        self.device.set(Some(device));
        self.config.set(Some(config));
        self.conversion.set(Some(conversion));
    }

    /// Binding regardless of pipeline state, for the completion path.
    pub(crate) fn binding(&self) -> Result<Binding<'a, E>, E> {
        match (self.bus.get(), self.device.get(), self.conversion.get()) {
            (Some(bus), Some(device), Some(conversion)) => Ok(Binding {
                bus,
                device,
                conversion,
            }),
            _ => Err(Error::NotInitialized),
        }
    }

    /// Binding for a new read, rejected unless the pipeline is idle.
    pub(crate) fn idle_binding(&self) -> Result<Binding<'a, E>, E> {
        match self.state.get() {
            ReadState::Idle => self.binding(),
            ReadState::Uninitialized => Err(Error::NotInitialized),
            ReadState::AccelPending | ReadState::GyroPending => Err(Error::Busy),
            ReadState::Failed => Err(Error::Failed),
        }
    }

    /// Forgets an in-flight cycle; the pipeline is idle again.
    pub(crate) fn abandon_cycle(&self) {
        self.staged_accel.set(None);
        self.state.set(ReadState::Idle);
    }

    pub(crate) fn set_state(&self, state: ReadState) {
        self.state.set(state);
    }

    pub(crate) fn set_chain_gyro(&self, chain: bool) {
        self.chain_gyro.set(chain);
    }

    pub(crate) fn chain_gyro(&self) -> bool {
        self.chain_gyro.get()
    }

    pub(crate) fn stage_accel(&self, accel: F32x3) {
        self.staged_accel.set(Some(accel));
    }

    pub(crate) fn take_staged_accel(&self) -> Option<F32x3> {
        self.staged_accel.take()
    }

    /// Stores the sample of a blocking read.
    pub(crate) fn commit(&self, sample: SensorSample) {
        self.data.set(sample);
    }

    /// Ends an async cycle: commits, re-arms and notifies the sample client.
    pub(crate) fn complete(&self, sample: SensorSample) {
        self.data.set(sample);
        self.state.set(ReadState::Idle);
        if let Some(client) = self.client.get() {
            client.sample_ready(sample);
        }
    }
}

impl<E> Default for GyroAcc<'_, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TransferClient for GyroAcc<'_, E> {
    fn transfer_complete(&self, bus: BusId, data: &[u8]) {
        match self.driver.get() {
            Some(driver) => driver.transfer_complete(self, data),
            None => warn!("completion on bus {} for an unbound sensor", bus.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GyroAcc, ReadState, SensorSample, SensorType};
    use crate::bus::i2c::I2cBus;
    use crate::bus::registry::BusRegistry;
    use crate::bus::{BusId, PeripheralId, TransferClient};
    use crate::config::{RangeTier, SensorConfig};
    use crate::error::Error;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::Mock as I2cMock;

    #[test]
    fn sensor_type_tags() {
        assert_eq!(SensorType::from(1), SensorType::Mpu6050);
        assert_eq!(SensorType::from(0), SensorType::Unknown);
        assert_eq!(SensorType::from(42), SensorType::Unknown);
    }

    #[test]
    fn unknown_type_leaves_instance_untouched() {
        let mut mock = I2cMock::new(&[]);
        let registry = BusRegistry::new([I2cBus::new(mock.clone(), PeripheralId(1))]);
        let imu = GyroAcc::new();
        let config = SensorConfig::new().gyro(RangeTier::High).build();

        let result = imu.init(
            SensorType::Unknown,
            registry.handle(BusId(0)).unwrap(),
            config,
            &mut NoopDelay::new(),
        );

        assert_eq!(result, Err(Error::UnknownSensorType));
        assert_eq!(imu.state(), ReadState::Uninitialized);
        assert_eq!(imu.config(), None);
        assert_eq!(imu.conversion(), None);
        assert!(imu.device().is_none());
        assert_eq!(imu.data(), SensorSample::default());
        mock.done();
    }

    #[test]
    fn operations_before_init_are_rejected() {
        let imu: GyroAcc<'_, embedded_hal::i2c::ErrorKind> = GyroAcc::default();

        assert_eq!(imu.read_all_async(), Err(Error::NotInitialized));
        assert_eq!(imu.read_gyro_async(), Err(Error::NotInitialized));
        assert_eq!(imu.read_acc_async(), Err(Error::NotInitialized));
        assert_eq!(imu.read_all(), Err(Error::NotInitialized));
        assert!(imu.read_gyro().is_err());
        assert!(imu.read_acc().is_err());
        assert_eq!(imu.state(), ReadState::Uninitialized);
    }

    #[test]
    fn stray_completion_on_unbound_sensor_is_dropped() {
        let imu: GyroAcc<'_, embedded_hal::i2c::ErrorKind> = GyroAcc::new();
        imu.transfer_complete(BusId(0), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(imu.data(), SensorSample::ZERO);
        assert_eq!(imu.state(), ReadState::Uninitialized);
    }
}
