//! Register map definitions for the MPU-6050 gyroscope/accelerometer.
#![allow(unused_parens)]

use modular_bitfield::prelude::*;

use crate::params::{AccelFullScale, ClockSource, GyroFullScale};

/// 7-bit I2C address with AD0 tied low.
pub const MPU6050_ADDRESS: u8 = 0x68;
/// 7-bit I2C address with AD0 tied high.
pub const MPU6050_ADDRESS_ALT: u8 = 0x69;

/// Register address of `SMPLRT_DIV`.
pub const REG_SMPLRT_DIV: u8 = 0x19;
/// Register address of `CONFIG`.
pub const REG_CONFIG: u8 = 0x1A;
/// Register address of `GYRO_CONFIG`.
pub const REG_GYRO_CONFIG: u8 = 0x1B;
/// Register address of `ACCEL_CONFIG`.
pub const REG_ACCEL_CONFIG: u8 = 0x1C;
/// Register address of `INT_PIN_CFG`.
pub const REG_INT_PIN_CFG: u8 = 0x37;
/// Register address of `INT_ENABLE`.
pub const REG_INT_ENABLE: u8 = 0x38;
/// Register address of `INT_STATUS`.
pub const REG_INT_STATUS: u8 = 0x3A;
/// Register address of `ACCEL_XOUT_H`, start of the accelerometer block.
pub const REG_ACCEL_XOUT_H: u8 = 0x3B;
/// Register address of `TEMP_OUT_H`.
pub const REG_TEMP_OUT_H: u8 = 0x41;
/// Register address of `GYRO_XOUT_H`, start of the gyroscope block.
pub const REG_GYRO_XOUT_H: u8 = 0x43;
/// Register address of `SIGNAL_PATH_RESET`.
pub const REG_SIGNAL_PATH_RESET: u8 = 0x68;
/// Register address of `USER_CTRL`.
pub const REG_USER_CTRL: u8 = 0x6A;
/// Register address of `PWR_MGMT_1`.
pub const REG_PWR_MGMT_1: u8 = 0x6B;
/// Register address of `PWR_MGMT_2`.
pub const REG_PWR_MGMT_2: u8 = 0x6C;
/// Register address of `WHO_AM_I`.
pub const REG_WHO_AM_I: u8 = 0x75;

/// Bytes in one output block: X/Y/Z, big-endian high byte first.
pub const OUTPUT_BLOCK_LEN: usize = 6;
/// Bytes from `ACCEL_XOUT_H` through `GYRO_ZOUT_L`, temperature included.
pub const BURST_LEN: usize = 14;

/// Access permissions encoded for each register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterAccess {
    /// Read-only register.
    ReadOnly,
    /// Read/write register.
    ReadWrite,
}

/// Minimal metadata exposed by every register value type.
pub trait Register: From<u8> + Into<u8> + Copy {
    /// Register address as documented in the register map.
    const ADDRESS: u8;
    /// Access permission classification.
    const ACCESS: RegisterAccess;
    /// Power-on reset value.
    const RESET_VALUE: u8;
}

/// Bitfield representation of the `PWR_MGMT_1` register (address `0x6B`).
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerManagement1 {
    // Clock source selection (bits 2:0).
    pub clock_source: ClockSource,
    // Temperature sensor disable (bit 3).
    pub temp_disable: bool,
    #[skip]
    __: B1,
    // Cycle between sleep and single samples (bit 5).
    pub cycle: bool,
    // Sleep mode (bit 6).
    pub sleep: bool,
    // Resets every register to its default; self-clearing (bit 7).
    pub device_reset: bool,
}

impl From<u8> for PowerManagement1 {
    fn from(value: u8) -> Self {
        Self::from_bytes([value])
    }
}

impl From<PowerManagement1> for u8 {
    fn from(value: PowerManagement1) -> Self {
        value.into_bytes()[0]
    }
}

/// Bitfield representation of the `GYRO_CONFIG` register (address `0x1B`).
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GyroConfig {
    #[skip]
    __: B3,
    // Full-scale range selection FS_SEL (bits 4:3).
    pub full_scale: GyroFullScale,
    // Per-axis self-test triggers ZG_ST, YG_ST, XG_ST (bits 7:5).
    pub self_test: B3,
}

impl From<u8> for GyroConfig {
    fn from(value: u8) -> Self {
        Self::from_bytes([value])
    }
}

impl From<GyroConfig> for u8 {
    fn from(value: GyroConfig) -> Self {
        value.into_bytes()[0]
    }
}

/// Bitfield representation of the `ACCEL_CONFIG` register (address `0x1C`).
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelConfig {
    #[skip]
    __: B3,
    // Full-scale range selection AFS_SEL (bits 4:3).
    pub full_scale: AccelFullScale,
    // Per-axis self-test triggers ZA_ST, YA_ST, XA_ST (bits 7:5).
    pub self_test: B3,
}

impl From<u8> for AccelConfig {
    fn from(value: u8) -> Self {
        Self::from_bytes([value])
    }
}

impl From<AccelConfig> for u8 {
    fn from(value: AccelConfig) -> Self {
        value.into_bytes()[0]
    }
}

/// Bitfield representation of the `WHO_AM_I` register (address `0x75`).
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhoAmI {
    #[skip]
    __: B1,
    // Upper six bits of the 7-bit bus address, AD0 excluded (bits 6:1).
    pub id: B6,
    #[skip]
    __: B1,
}

impl From<u8> for WhoAmI {
    fn from(value: u8) -> Self {
        Self::from_bytes([value])
    }
}

impl From<WhoAmI> for u8 {
    fn from(value: WhoAmI) -> Self {
        value.into_bytes()[0]
    }
}

impl Register for PowerManagement1 {
    const ADDRESS: u8 = REG_PWR_MGMT_1;
    const ACCESS: RegisterAccess = RegisterAccess::ReadWrite;
    const RESET_VALUE: u8 = 0x40;
}

impl Register for GyroConfig {
    const ADDRESS: u8 = REG_GYRO_CONFIG;
    const ACCESS: RegisterAccess = RegisterAccess::ReadWrite;
    const RESET_VALUE: u8 = 0x00;
}

impl Register for AccelConfig {
    const ADDRESS: u8 = REG_ACCEL_CONFIG;
    const ACCESS: RegisterAccess = RegisterAccess::ReadWrite;
    const RESET_VALUE: u8 = 0x00;
}

impl Register for WhoAmI {
    const ADDRESS: u8 = REG_WHO_AM_I;
    const ACCESS: RegisterAccess = RegisterAccess::ReadOnly;
    const RESET_VALUE: u8 = 0x68;
}

/// Value written to `PWR_MGMT_1` to reset and wake the device.
pub fn wake_command() -> u8 {
    u8::from(PowerManagement1::new().with_device_reset(true))
}

/// Value written to `PWR_MGMT_1` to select the clock source, leaving sleep off.
pub fn clock_select_command(source: ClockSource) -> u8 {
    u8::from(PowerManagement1::new().with_clock_source(source))
}
