//! 16.16 fixed-point helpers shared by the resampler and filter synthesis.

/// Number of fractional bits.
pub const FRAC_BITS: u32 = 16;

/// 1.0 in 16.16.
pub const ONE: i32 = 1 << FRAC_BITS;

/// Round-to-nearest bias added before the final shift.
const HALF: i64 = 1 << (FRAC_BITS - 1);

/// Quantize with round-half-up: `floor(0.5 + 65536 * value)`.
pub fn round_f64(value: f64) -> i32 {
    (0.5 + ONE as f64 * value).floor() as i32
}

/// Quantize by truncation toward zero: `trunc(value * 65536)`.
///
/// Saturates on overflow and maps NaN to 0.
pub fn truncate_f32(value: f32) -> i32 {
    (value * ONE as f32) as i32
}

/// Convert a 16.16 accumulator back to a signed 8-bit sample.
pub fn requantize_i8(acc: i64) -> i8 {
    ((acc + HALF) >> FRAC_BITS).clamp(i8::MIN as i64, i8::MAX as i64) as i8
}
