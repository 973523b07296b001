use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
///
/// Every simulated time and progress value is a `Fixed64` so that two engines
/// fed the same inputs stay bit-for-bit identical.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Length of one simulation step for the given tick rate, in seconds.
///
/// Rounded to the nearest representable value, the same way
/// [`f64_to_fixed64`] rounds, so `tick_interval(20) == f64_to_fixed64(0.05)`.
/// A rate of zero is treated as one tick per second.
#[inline]
pub fn tick_interval(ticks_per_second: u32) -> Fixed64 {
    let rate = i64::from(ticks_per_second.max(1));
    Fixed64::from_bits((Fixed64::ONE.to_bits() + rate / 2) / rate)
}

/// `value / total` clamped to `0..=1`. A non-positive total yields zero.
#[inline]
pub fn fraction(value: Fixed64, total: Fixed64) -> Fixed64 {
    if total <= Fixed64::ZERO {
        return Fixed64::ZERO;
    }
    (value / total).clamp(Fixed64::ZERO, Fixed64::ONE)
}
