//! Configuration primitives shared by every gyroscope/accelerometer driver.

/// Coarse sensitivity setting. Each driver maps a tier onto one of its
/// full-scale codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangeTier {
    /// Narrowest range offered through the tier interface.
    #[default]
    Low,
    /// Intermediate range.
    Medium,
    /// Widest range.
    High,
}

/// User-facing sensor configuration, recorded by the driver at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorConfig {
    /// Gyroscope range tier.
    pub gyro: RangeTier,
    /// Accelerometer range tier.
    pub accel: RangeTier,
    /// Use the part's alternate bus address (AD0 pulled high on the MPU-6050).
    pub alt_address: bool,
}

impl SensorConfig {
    /// Begins building a [`SensorConfig`] using the builder pattern.
    pub fn new() -> SensorConfigBuilder {
        SensorConfigBuilder::new()
    }
}

/// Builder for [`SensorConfig`].
#[derive(Debug, Clone, Copy)]
pub struct SensorConfigBuilder {
    config: SensorConfig,
}

impl SensorConfigBuilder {
    /// Creates a new builder seeded with [`SensorConfig::default()`].
    pub fn new() -> Self {
        Self {
            config: SensorConfig::default(),
        }
    }

    /// Overrides the gyroscope range tier.
    pub fn gyro(mut self, tier: RangeTier) -> Self {
        self.config.gyro = tier;
        self
    }

    /// Overrides the accelerometer range tier.
    pub fn accel(mut self, tier: RangeTier) -> Self {
        self.config.accel = tier;
        self
    }

    /// Selects the alternate bus address.
    pub fn alt_address(mut self, alt: bool) -> Self {
        self.config.alt_address = alt;
        self
    }

    /// Finalizes the builder and returns the [`SensorConfig`].
    pub fn build(self) -> SensorConfig {
        self.config
    }
}

impl Default for SensorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
