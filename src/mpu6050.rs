//! InvenSense MPU-6050 driver.
//!
//! Output registers are read in two 6-byte blocks, accelerometer at
//! `ACCEL_XOUT_H` and gyroscope at `GYRO_XOUT_H`, each holding big-endian
//! two's complement X/Y/Z counts. The temperature registers between them are
//! only ever touched by the blocking burst read and are discarded.

use embedded_hal::delay::DelayNs;
use micromath::vector::F32x3;

use crate::bus::{BusAccess, BusHandle, DeviceAddress, MemRead, MemWrite};
use crate::config::SensorConfig;
use crate::device::{Conversion, GyroAcc, GyroAccDriver, ReadState, SensorSample};
use crate::error::{Error, Result};
use crate::params::{AccelFullScale, ClockSource, GyroFullScale};
use crate::registers::{
    clock_select_command,
    wake_command,
    AccelConfig,
    GyroConfig,
    Register,
    RegisterAccess,
    BURST_LEN,
    MPU6050_ADDRESS,
    MPU6050_ADDRESS_ALT,
    OUTPUT_BLOCK_LEN,
    REG_ACCEL_XOUT_H,
    REG_GYRO_XOUT_H,
    REG_PWR_MGMT_1,
};

// Settle time after the reset/wake write before the chip accepts commands.
const RESET_SETTLE_MS: u32 = 100;

/// Stateless MPU-6050 driver; all per-sensor state lives in [`GyroAcc`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Mpu6050;

/// Output block targeted by a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Accel,
    Gyro,
}

impl Block {
    fn register(self) -> u8 {
        match self {
            Block::Accel => REG_ACCEL_XOUT_H,
            Block::Gyro => REG_GYRO_XOUT_H,
        }
    }

    fn pending_state(self) -> ReadState {
        match self {
            Block::Accel => ReadState::AccelPending,
            Block::Gyro => ReadState::GyroPending,
        }
    }
}

impl Mpu6050 {
    /// Conversion scalars for `config`, `None` if a selected code has no entry.
    pub fn conversion(config: &SensorConfig) -> Option<Conversion> {
        Some(Conversion {
            gyro: GyroFullScale::from_tier(config.gyro).rad_s_per_lsb()?,
            accel: AccelFullScale::from_tier(config.accel).g_per_lsb()?,
        })
    }

    fn decode_block(block: &[u8; OUTPUT_BLOCK_LEN], scale: f32) -> F32x3 {
        let axis = |hi: usize| f32::from(i16::from_be_bytes([block[hi], block[hi + 1]])) * scale;
        F32x3 {
            x: axis(0),
            y: axis(2),
            z: axis(4),
        }
    }

    /// Bus address selected by `config`.
    pub fn address(config: &SensorConfig) -> u8 {
        if config.alt_address {
            MPU6050_ADDRESS_ALT
        } else {
            MPU6050_ADDRESS
        }
    }

    /// Read-modify-write of one configuration register. The new value is
    /// written even if it equals the current one.
    fn update_register<'a, E, R, F>(
        access: &dyn BusAccess<'a, Error = E>,
        device: &DeviceAddress<'a>,
        mutate: F,
    ) -> Result<(), E>
    where
        R: Register,
        F: FnOnce(&mut R),
    {
        if R::ACCESS == RegisterAccess::ReadOnly {
            return Err(Error::ReadOnlyRegister);
        }

        let mut current = [0u8; 1];
        access.mem_read(device, MemRead::new(R::ADDRESS, &mut current))?;

        let mut register = R::from(current[0]);
        mutate(&mut register);

        let updated: u8 = register.into();
        trace!("register {=u8:#x}: {=u8:#x} -> {=u8:#x}", R::ADDRESS, current[0], updated);
        access.mem_write(device, MemWrite::new(R::ADDRESS, &[updated]))
    }

    fn read_block<E>(imu: &GyroAcc<'_, E>, block: Block) -> Result<F32x3, E> {
        let binding = imu.idle_binding()?;
        let mut raw = [0u8; OUTPUT_BLOCK_LEN];
        binding
            .bus
            .access()
            .mem_read(&binding.device, MemRead::new(block.register(), &mut raw))?;

        let scale = match block {
            Block::Accel => binding.conversion.accel,
            Block::Gyro => binding.conversion.gyro,
        };
        Ok(Self::decode_block(&raw, scale))
    }

    /// Submits the read of `block` on behalf of an idle sensor.
    ///
    /// The pending state is entered before submission so a completion firing
    /// right away finds it. A bus held by another device is reported as
    /// [`Error::Busy`] and leaves the sensor idle; any other failure is terminal.
    fn start_cycle<E>(imu: &GyroAcc<'_, E>, block: Block, chain_gyro: bool) -> Result<(), E> {
        let binding = imu.idle_binding()?;

        imu.set_chain_gyro(chain_gyro);
        imu.set_state(block.pending_state());

        match binding
            .bus
            .access()
            .mem_read_async(&binding.device, block.register(), OUTPUT_BLOCK_LEN)
        {
            Ok(()) => Ok(()),
            Err(Error::Busy) => {
                imu.set_state(ReadState::Idle);
                Err(Error::Busy)
            }
            Err(err) => {
                error!("mpu6050: {} read submission failed", block_name(block));
                imu.set_state(ReadState::Failed);
                Err(err)
            }
        }
    }

    /// Chains the gyroscope read from the accelerometer completion.
    fn chain_gyro_read<E>(imu: &GyroAcc<'_, E>) {
        imu.set_state(ReadState::GyroPending);
        let submitted = imu.binding().and_then(|binding| {
            binding.bus.access().mem_read_async(
                &binding.device,
                REG_GYRO_XOUT_H,
                OUTPUT_BLOCK_LEN,
            )
        });

        if submitted.is_err() {
            error!("mpu6050: chained gyro read submission failed");
            imu.set_state(ReadState::Failed);
        }
    }

    /// Drops the bus association of a cycle whose completion never arrived,
    /// so a re-init is not locked out by its own stale transfer.
    fn abandon_stale_cycle<E>(imu: &GyroAcc<'_, E>) -> Result<(), E> {
        if !matches!(imu.state(), ReadState::AccelPending | ReadState::GyroPending) {
            return Ok(());
        }

        let previous = imu.binding()?;
        if previous.bus.access().cancel(&previous.device)? {
            warn!("mpu6050: abandoned in-flight {} read", imu.state());
        }
        imu.abandon_cycle();
        Ok(())
    }

    fn fail<E>(imu: &GyroAcc<'_, E>, len: usize) {
        error!("mpu6050: completion carried {} bytes, expected {}", len, OUTPUT_BLOCK_LEN);
        imu.set_state(ReadState::Failed);
    }
}

fn block_name(block: Block) -> &'static str {
    match block {
        Block::Accel => "accel",
        Block::Gyro => "gyro",
    }
}

fn step<T, E>(name: &str, result: Result<T, E>) -> Result<T, E> {
    match &result {
        Ok(_) => debug!("mpu6050: {} done", name),
        Err(_) => error!("mpu6050: init aborted at {}", name),
    }
    result
}

impl<E> GyroAccDriver<E> for Mpu6050 {
    // ==================================================================
    // == Initialization =================================================
    // ==================================================================
    fn init<'a>(
        &self,
        imu: &'a GyroAcc<'a, E>,
        bus: BusHandle<'a, E>,
        config: SensorConfig,
        delay: &mut dyn DelayNs,
    ) -> Result<(), E> {
        let gyro_scale = GyroFullScale::from_tier(config.gyro);
        let accel_scale = AccelFullScale::from_tier(config.accel);
        let conversion = Self::conversion(&config).ok_or(Error::InvalidConfig)?;

        Self::abandon_stale_cycle(imu)?;
        let access = bus.access();
        if access.is_pending(bus.id()) {
            warn!("mpu6050: bus {} has a transfer in flight, init rejected", bus.id().0);
            return Err(Error::Busy);
        }

        let device = DeviceAddress::new(bus.id(), Self::address(&config)).with_client(imu);
        imu.bind(bus, device, config, conversion);

        step("readiness check", access.is_ready(&device))?;

        step(
            "wake",
            access.mem_write(&device, MemWrite::new(REG_PWR_MGMT_1, &[wake_command()])),
        )?;
        delay.delay_ms(RESET_SETTLE_MS);

        let clock = clock_select_command(ClockSource::PllGyroZ);
        step(
            "clock select",
            access.mem_write(&device, MemWrite::new(REG_PWR_MGMT_1, &[clock])),
        )?;

        step(
            "gyro range",
            Self::update_register(access, &device, |register: &mut GyroConfig| {
                register.set_full_scale(gyro_scale);
                register.set_self_test(0);
            }),
        )?;

        step(
            "accel range",
            Self::update_register(access, &device, |register: &mut AccelConfig| {
                register.set_full_scale(accel_scale);
                register.set_self_test(0);
            }),
        )?;

        imu.set_state(ReadState::Idle);
        info!(
            "mpu6050 ready on bus {}: gyro {}, accel {}",
            bus.id().0,
            gyro_scale,
            accel_scale
        );
        Ok(())
    }

    // ==================================================================
    // == Blocking reads =================================================
    // ==================================================================
    fn read_all(&self, imu: &GyroAcc<'_, E>) -> Result<SensorSample, E> {
        let binding = imu.idle_binding()?;
        let mut raw = [0u8; BURST_LEN];
        binding
            .bus
            .access()
            .mem_read(&binding.device, MemRead::new(REG_ACCEL_XOUT_H, &mut raw))?;

        let mut accel = [0u8; OUTPUT_BLOCK_LEN];
        let mut gyro = [0u8; OUTPUT_BLOCK_LEN];
        accel.copy_from_slice(&raw[..OUTPUT_BLOCK_LEN]);
        gyro.copy_from_slice(&raw[BURST_LEN - OUTPUT_BLOCK_LEN..]);

        let sample = SensorSample {
            gyro: Self::decode_block(&gyro, binding.conversion.gyro),
            accel: Self::decode_block(&accel, binding.conversion.accel),
        };
        imu.commit(sample);
        Ok(sample)
    }

    fn read_gyro(&self, imu: &GyroAcc<'_, E>) -> Result<F32x3, E> {
        let gyro = Self::read_block(imu, Block::Gyro)?;
        imu.commit(SensorSample { gyro, ..imu.data() });
        Ok(gyro)
    }

    fn read_acc(&self, imu: &GyroAcc<'_, E>) -> Result<F32x3, E> {
        let accel = Self::read_block(imu, Block::Accel)?;
        imu.commit(SensorSample { accel, ..imu.data() });
        Ok(accel)
    }

    // ==================================================================
    // == Async pipeline =================================================
    // ==================================================================
    fn read_all_async(&self, imu: &GyroAcc<'_, E>) -> Result<(), E> {
        Self::start_cycle(imu, Block::Accel, true)
    }

    fn read_gyro_async(&self, imu: &GyroAcc<'_, E>) -> Result<(), E> {
        Self::start_cycle(imu, Block::Gyro, false)
    }

    fn read_acc_async(&self, imu: &GyroAcc<'_, E>) -> Result<(), E> {
        Self::start_cycle(imu, Block::Accel, false)
    }

    fn transfer_complete(&self, imu: &GyroAcc<'_, E>, data: &[u8]) {
        let Some(conversion) = imu.conversion() else {
            return;
        };

        match imu.state() {
            ReadState::AccelPending => {
                let Ok(block) = <&[u8; OUTPUT_BLOCK_LEN]>::try_from(data) else {
                    return Self::fail(imu, data.len());
                };
                let accel = Self::decode_block(block, conversion.accel);

                if imu.chain_gyro() {
                    imu.stage_accel(accel);
                    Self::chain_gyro_read(imu);
                } else {
                    imu.complete(SensorSample { accel, ..imu.data() });
                }
            }
            ReadState::GyroPending => {
                let Ok(block) = <&[u8; OUTPUT_BLOCK_LEN]>::try_from(data) else {
                    return Self::fail(imu, data.len());
                };
                let gyro = Self::decode_block(block, conversion.gyro);
                let accel = imu.take_staged_accel().unwrap_or(imu.data().accel);

                imu.complete(SensorSample { gyro, accel });
            }
            state => warn!("mpu6050: completion ignored in state {}", state),
        }
    }
}
