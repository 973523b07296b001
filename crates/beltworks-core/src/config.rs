//! Engine configuration.
//!
//! Human-authored values are `f64`/integers so config files stay readable;
//! they are converted to fixed-point once, when the engine is built.

use crate::belt::BeltParams;
use crate::fixed::{Fixed64, f64_to_fixed64, tick_interval};
use serde::{Deserialize, Serialize};

/// Fastest accepted belt, in belts crossed per second.
pub const MAX_BELT_SPEED: f64 = 1_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeltConfig {
    /// Progress per second; 1.0 crosses a belt in one second.
    pub speed: f64,
    pub min_spacing: f64,
    pub capacity: usize,
    /// Head progress from which a connector may pull the head item.
    pub take_threshold: f64,
}

impl Default for BeltConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            min_spacing: 0.2,
            capacity: 5,
            take_threshold: 0.9,
        }
    }
}

impl BeltConfig {
    pub fn params(&self) -> BeltParams {
        BeltParams {
            speed: f64_to_fixed64(self.speed),
            min_spacing: f64_to_fixed64(self.min_spacing),
            capacity: self.capacity,
            take_threshold: f64_to_fixed64(self.take_threshold),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub ticks_per_second: u32,
    pub belt: BeltConfig,
    /// Inventory slots per storage box.
    pub storage_slots: usize,
    /// Per-kind capacity of the event bus ring buffers.
    pub event_buffer_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: 20,
            belt: BeltConfig::default(),
            storage_slots: 16,
            event_buffer_capacity: 1024,
        }
    }
}

impl SimConfig {
    /// Seconds per step.
    pub fn tick_interval(&self) -> Fixed64 {
        tick_interval(self.ticks_per_second)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticks_per_second == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        let belt = &self.belt;
        if !(belt.speed > 0.0 && belt.speed <= MAX_BELT_SPEED) {
            return Err(ConfigError::BeltSpeed(belt.speed));
        }
        if !(belt.min_spacing > 0.0 && belt.min_spacing < 1.0) {
            return Err(ConfigError::MinSpacing(belt.min_spacing));
        }
        if belt.capacity == 0 {
            return Err(ConfigError::ZeroBeltCapacity);
        }
        if !(belt.take_threshold > 0.0 && belt.take_threshold <= 1.0) {
            return Err(ConfigError::TakeThreshold(belt.take_threshold));
        }
        if self.storage_slots == 0 {
            return Err(ConfigError::ZeroStorageSlots);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("ticks_per_second must be at least 1")]
    ZeroTickRate,
    #[error("belt speed must be in (0, {max}], got {0}", max = MAX_BELT_SPEED)]
    BeltSpeed(f64),
    #[error("belt min_spacing must be in (0, 1), got {0}")]
    MinSpacing(f64),
    #[error("belt capacity must be at least 1")]
    ZeroBeltCapacity,
    #[error("belt take_threshold must be in (0, 1], got {0}")]
    TakeThreshold(f64),
    #[error("storage boxes need at least one slot")]
    ZeroStorageSlots,
}
