//! Clock state and determinism hashing.
//!
//! The engine runs a fixed timestep: `Engine::advance` feeds elapsed time
//! into the accumulator and runs one step per whole tick interval it holds,
//! carrying the remainder forward. `Engine::step` runs exactly one.

use crate::fixed::{Fixed64, Ticks};

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// Mutable clock state tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimState {
    /// Steps run since the engine was created.
    pub tick: Ticks,

    /// Elapsed seconds not yet consumed by a step. Always below one tick
    /// interval after `advance` returns.
    pub accumulator: Fixed64,
}

impl SimState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            accumulator: Fixed64::ZERO,
        }
    }

    /// Add elapsed time and return how many whole intervals are now due,
    /// removing them from the accumulator.
    pub fn accumulate(&mut self, elapsed: Fixed64, interval: Fixed64) -> u64 {
        if elapsed > Fixed64::ZERO {
            self.accumulator = self.accumulator.saturating_add(elapsed);
        }
        if interval <= Fixed64::ZERO {
            return 0;
        }
        let mut due = 0;
        while self.accumulator >= interval {
            self.accumulator -= interval;
            due += 1;
        }
        due
    }
}

impl Default for SimState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Advance result
// ---------------------------------------------------------------------------

/// Result of an `Engine::advance()` or `Engine::step()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvanceResult {
    /// Number of simulation steps actually executed.
    pub steps_run: u64,

    /// Chunk ticks run across those steps.
    pub chunks_processed: u64,
}

impl AdvanceResult {
    pub(crate) fn absorb(&mut self, other: AdvanceResult) {
        self.steps_run += other.steps_run;
        self.chunks_processed += other.chunks_processed;
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A deterministic hash of simulation state for desync detection.
///
/// FNV-1a (64-bit). Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::{f64_to_fixed64, tick_interval};

    #[test]
    fn sim_state_starts_at_zero() {
        let state = SimState::new();
        assert_eq!(state.tick, 0);
        assert_eq!(state.accumulator, Fixed64::ZERO);
    }

    #[test]
    fn accumulate_runs_whole_intervals_and_carries_remainder() {
        let mut state = SimState::new();
        let dt = tick_interval(10);
        assert_eq!(state.accumulate(f64_to_fixed64(0.25), dt), 2);
        assert!(state.accumulator < dt);
        assert_eq!(state.accumulate(f64_to_fixed64(0.15), dt), 1);
        assert!(state.accumulator < dt);
    }

    #[test]
    fn accumulate_ignores_negative_elapsed() {
        let mut state = SimState::new();
        assert_eq!(state.accumulate(-Fixed64::ONE, tick_interval(20)), 0);
        assert_eq!(state.accumulator, Fixed64::ZERO);
    }

    #[test]
    fn state_hash_deterministic() {
        let mut h1 = StateHash::new();
        h1.write_u64(42);
        h1.write_fixed64(f64_to_fixed64(0.5));

        let mut h2 = StateHash::new();
        h2.write_u64(42);
        h2.write_fixed64(f64_to_fixed64(0.5));

        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn state_hash_order_matters() {
        let mut h1 = StateHash::new();
        h1.write_i32(1);
        h1.write_i32(2);

        let mut h2 = StateHash::new();
        h2.write_i32(2);
        h2.write_i32(1);

        assert_ne!(h1.finish(), h2.finish());
    }
}
