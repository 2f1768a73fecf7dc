//! Decibel <-> linear amplitude conversion

/// Convert a decibel value to linear amplitude (`10^(dB / 20)`)
///
/// `0 dB` maps to `1.0`.
#[inline]
pub fn linear_from_decibel(decibel: f32) -> f32 {
    10.0_f32.powf(decibel / 20.0)
}

/// Convert linear amplitude to decibels (`20 * log10(linear)`)
///
/// The logarithm is undefined for non-positive input, so `linear` is clamped
/// to `f32::MIN_POSITIVE` first (about -759 dB).
#[inline]
pub fn decibel_from_linear(linear: f32) -> f32 {
    20.0 * linear.max(f32::MIN_POSITIVE).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_is_zero_decibel() {
        assert_eq!(linear_from_decibel(0.0), 1.0);
        assert_eq!(decibel_from_linear(1.0), 0.0);
    }

    #[test]
    fn test_known_values() {
        assert!((linear_from_decibel(-20.0) - 0.1).abs() < 1e-6);
        assert!((linear_from_decibel(-6.0) - 0.501_187).abs() < 1e-5);
        assert!((decibel_from_linear(0.5) + 6.020_6).abs() < 1e-3);
    }

    #[test]
    fn test_monotonic() {
        let mut prev = linear_from_decibel(-120.0);
        for db in (-119..=0).map(|d| d as f32) {
            let next = linear_from_decibel(db);
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_round_trip() {
        for i in 1..=1000 {
            let x = i as f32 / 1000.0;
            let back = linear_from_decibel(decibel_from_linear(x));
            assert!((back - x).abs() <= x * 1e-5, "{} -> {}", x, back);
        }
    }

    #[test]
    fn test_zero_is_finite() {
        let db = decibel_from_linear(0.0);
        assert!(db.is_finite());
        assert!(db < -700.0);
        assert!(decibel_from_linear(-1.0).is_finite());
    }
}
