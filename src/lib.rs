#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;

mod error;

pub mod bus;
pub mod config;
pub mod device;
pub mod mpu6050;
pub mod params;
pub mod registers;

pub use crate::bus::registry::BusRegistry;
pub use crate::bus::{BusHandle, BusId, DeviceAddress, PeripheralId};
pub use crate::config::{RangeTier, SensorConfig};
pub use crate::device::{GyroAcc, ReadState, SampleClient, SensorSample, SensorType};
pub use crate::error::{Error, Result};
