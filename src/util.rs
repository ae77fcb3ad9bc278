use num_traits::Float;
use std::fmt::Debug;

/// Decibel values at or below this are treated as silence when converting to linear gain.
pub const MINUS_INFINITY_DB: f64 = -200.0;

/// The sample precision the processing core is generic over. Only `f32` and `f64` implement this.
pub trait Sample: Float + Default + Debug + Send + Sync + 'static {
    fn from_f64(value: f64) -> Self;
}

impl Sample for f32 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Sample for f64 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Convert decibels to linear gain. Anything at or below `MINUS_INFINITY_DB` becomes `0.0`.
#[inline]
pub fn db_to_gain<T: Sample>(db: T) -> T {
    if db > T::from_f64(MINUS_INFINITY_DB) {
        T::from_f64(10.0).powf(db * T::from_f64(0.05))
    } else {
        T::zero()
    }
}

/// Convert linear gain to decibels, clamped to `MINUS_INFINITY_DB`. Non-positive gains map to the
/// floor.
#[inline]
pub fn gain_to_db<T: Sample>(gain: T) -> T {
    let floor = T::from_f64(MINUS_INFINITY_DB);
    if gain > T::zero() {
        (gain.log10() * T::from_f64(20.0)).max(floor)
    } else {
        floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_to_gain_reference_points() {
        assert_eq!(db_to_gain(0.0_f64), 1.0);
        assert!((db_to_gain(-20.0_f64) - 0.1).abs() < 1e-12);
        assert!((db_to_gain(6.0_f32) - 1.995_262_3).abs() < 1e-5);
    }

    #[test]
    fn test_db_to_gain_silence_floor() {
        assert_eq!(db_to_gain(-200.0_f32), 0.0);
        assert_eq!(db_to_gain(-500.0_f64), 0.0);
        assert!(db_to_gain(-199.0_f64) > 0.0);
    }

    #[test]
    fn test_gain_to_db() {
        assert_eq!(gain_to_db(1.0_f64), 0.0);
        assert!((gain_to_db(0.5_f64) + 6.020_599_913).abs() < 1e-6);
        assert_eq!(gain_to_db(0.0_f32), -200.0);
        assert_eq!(gain_to_db(-1.0_f64), -200.0);
        assert_eq!(gain_to_db(1e-30_f64), -200.0);
    }
}
