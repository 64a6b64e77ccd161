//! Strongly typed MPU-6050 parameter encodings and conversion tables.
//!
//! The full-scale enums map directly to the `FS_SEL`/`AFS_SEL` register codes
//! and double as indices into the sensitivity tables below, so a code and its
//! conversion scalar can never drift apart.
//!
//! # Examples
//!
//! ```rust
//! use gyro_acc::config::RangeTier;
//! use gyro_acc::params::{AccelFullScale, GyroFullScale};
//!
//! assert_eq!(GyroFullScale::from_tier(RangeTier::Medium), GyroFullScale::Dps1000);
//! assert_eq!(AccelFullScale::from_tier(RangeTier::Medium).sensitivity(), 4096.0);
//! ```

use core::f32::consts::PI;

use modular_bitfield::prelude::Specifier;

use crate::config::RangeTier;

const DEG_TO_RAD: f32 = PI / 180.0;

/// Published gyroscope sensitivities in LSB per °/s, indexed by `FS_SEL`.
pub const GYRO_SENSITIVITY: [f32; 4] = [131.0, 65.5, 32.8, 16.4];

/// Published accelerometer sensitivities in LSB per g, indexed by `AFS_SEL`.
pub const ACCEL_SENSITIVITY: [f32; 4] = [16384.0, 8192.0, 4096.0, 2048.0];

/// Raw gyroscope count to rad/s, indexed by `FS_SEL`.
pub const GYRO_RAD_S_PER_LSB: [f32; 4] = [
    1.0 / GYRO_SENSITIVITY[0] * DEG_TO_RAD,
    1.0 / GYRO_SENSITIVITY[1] * DEG_TO_RAD,
    1.0 / GYRO_SENSITIVITY[2] * DEG_TO_RAD,
    1.0 / GYRO_SENSITIVITY[3] * DEG_TO_RAD,
];

/// Raw accelerometer count to g, indexed by `AFS_SEL`.
pub const ACCEL_G_PER_LSB: [f32; 4] = [
    1.0 / ACCEL_SENSITIVITY[0],
    1.0 / ACCEL_SENSITIVITY[1],
    1.0 / ACCEL_SENSITIVITY[2],
    1.0 / ACCEL_SENSITIVITY[3],
];

/// Gyroscope full-scale selections encoded in `GYRO_CONFIG[4:3]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Specifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[bits = 2]
pub enum GyroFullScale {
    /// ±250 °/s.
    Dps250 = 0b00,
    /// ±500 °/s.
    Dps500 = 0b01,
    /// ±1000 °/s.
    Dps1000 = 0b10,
    /// ±2000 °/s.
    Dps2000 = 0b11,
}

impl GyroFullScale {
    /// Maps a range tier onto a full-scale code. ±250 °/s is not reachable
    /// through the tier interface.
    pub const fn from_tier(tier: RangeTier) -> Self {
        match tier {
            RangeTier::Low => Self::Dps500,
            RangeTier::Medium => Self::Dps1000,
            RangeTier::High => Self::Dps2000,
        }
    }

    /// Published sensitivity in LSB per °/s.
    pub const fn sensitivity(self) -> f32 {
        GYRO_SENSITIVITY[self as usize]
    }

    /// Conversion scalar from raw counts to rad/s, `None` if the code has no
    /// table entry.
    pub fn rad_s_per_lsb(self) -> Option<f32> {
        GYRO_RAD_S_PER_LSB.get(self as usize).copied()
    }
}

/// Accelerometer full-scale selections encoded in `ACCEL_CONFIG[4:3]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Specifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[bits = 2]
pub enum AccelFullScale {
    /// ±2 g.
    G2 = 0b00,
    /// ±4 g.
    G4 = 0b01,
    /// ±8 g.
    G8 = 0b10,
    /// ±16 g.
    G16 = 0b11,
}

impl AccelFullScale {
    /// Maps a range tier onto a full-scale code. ±2 g is not reachable through
    /// the tier interface.
    pub const fn from_tier(tier: RangeTier) -> Self {
        match tier {
            RangeTier::Low => Self::G4,
            RangeTier::Medium => Self::G8,
            RangeTier::High => Self::G16,
        }
    }

    /// Published sensitivity in LSB per g.
    pub const fn sensitivity(self) -> f32 {
        ACCEL_SENSITIVITY[self as usize]
    }

    /// Conversion scalar from raw counts to g, `None` if the code has no table
    /// entry.
    pub fn g_per_lsb(self) -> Option<f32> {
        ACCEL_G_PER_LSB.get(self as usize).copied()
    }
}

/// Clock sources encoded in `PWR_MGMT_1[2:0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Specifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[bits = 3]
pub enum ClockSource {
    /// Internal 8 MHz oscillator.
    Internal8MHz = 0b000,
    /// PLL referenced to the X-axis gyroscope.
    PllGyroX = 0b001,
    /// PLL referenced to the Y-axis gyroscope.
    PllGyroY = 0b010,
    /// PLL referenced to the Z-axis gyroscope.
    PllGyroZ = 0b011,
    /// PLL referenced to an external 32.768 kHz clock.
    PllExternal32k = 0b100,
    /// PLL referenced to an external 19.2 MHz clock.
    PllExternal19M = 0b101,
    /// Clock stopped, timing generator held in reset.
    Stopped = 0b111,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_reciprocals_of_published_sensitivity() {
        for tier in [RangeTier::Low, RangeTier::Medium, RangeTier::High] {
            let accel = AccelFullScale::from_tier(tier);
            assert_eq!(accel.g_per_lsb(), Some(1.0 / accel.sensitivity()));

            let gyro = GyroFullScale::from_tier(tier);
            assert_eq!(
                gyro.rad_s_per_lsb(),
                Some(1.0 / gyro.sensitivity() * (PI / 180.0))
            );
        }
    }

    #[test]
    fn scaling_round_trips_within_epsilon() {
        for scale in [AccelFullScale::G2, AccelFullScale::G4, AccelFullScale::G8, AccelFullScale::G16] {
            let scalar = scale.g_per_lsb().unwrap();
            for raw in [i16::MIN, -4096, -1, 0, 1, 4096, i16::MAX] {
                let restored = raw as f32 * scalar * (1.0 / scalar);
                assert!((restored - raw as f32).abs() <= f32::EPSILON * (raw as f32).abs().max(1.0));
            }
        }
    }

    #[test]
    fn tiers_follow_full_scale_ladder() {
        assert_eq!(GyroFullScale::from_tier(RangeTier::Low), GyroFullScale::Dps500);
        assert_eq!(GyroFullScale::from_tier(RangeTier::High), GyroFullScale::Dps2000);
        assert_eq!(AccelFullScale::from_tier(RangeTier::Low), AccelFullScale::G4);
        assert_eq!(AccelFullScale::from_tier(RangeTier::High), AccelFullScale::G16);
        assert_eq!(AccelFullScale::G8 as u8, 0b10);
    }
}
