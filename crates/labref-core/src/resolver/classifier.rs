//! Value classification against a reference range.

use crate::models::Classification;

/// Classify a value against optional bounds.
///
/// Below `low` is LOW, above `high` is HIGH, anything else (including a value
/// exactly on a bound) is NORMAL. Callers decide what to do when both bounds
/// are absent; this function then returns NORMAL.
pub fn classify(value: f64, low: Option<f64>, high: Option<f64>) -> Classification {
    if low.map_or(false, |low| value < low) {
        Classification::Low
    } else if high.map_or(false, |high| value > high) {
        Classification::High
    } else {
        Classification::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classify_bounded() {
        assert_eq!(classify(5.2, Some(4.0), Some(10.0)), Classification::Normal);
        assert_eq!(classify(3.1, Some(4.0), Some(10.0)), Classification::Low);
        assert_eq!(classify(10.5, Some(4.0), Some(10.0)), Classification::High);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert_eq!(classify(4.0, Some(4.0), Some(10.0)), Classification::Normal);
        assert_eq!(classify(10.0, Some(4.0), Some(10.0)), Classification::Normal);
    }

    #[test]
    fn test_one_sided() {
        assert_eq!(classify(12.0, Some(13.5), None), Classification::Low);
        assert_eq!(classify(1000.0, Some(13.5), None), Classification::Normal);
        assert_eq!(classify(250.0, None, Some(200.0)), Classification::High);
        assert_eq!(classify(-5.0, None, Some(200.0)), Classification::Normal);
    }

    #[test]
    fn test_inverted_bounds_prefer_low() {
        // Data error, but the result stays defined
        assert_eq!(classify(5.0, Some(10.0), Some(4.0)), Classification::Low);
    }

    fn rank(c: Classification) -> u8 {
        match c {
            Classification::Low => 0,
            Classification::Normal => 1,
            Classification::High => 2,
            Classification::Unknown => unreachable!("classify never returns UNKNOWN"),
        }
    }

    proptest! {
        #[test]
        fn prop_total(
            value in -1e6f64..1e6,
            low in proptest::option::of(-1e6f64..1e6),
            high in proptest::option::of(-1e6f64..1e6),
        ) {
            let c = classify(value, low, high);
            prop_assert_ne!(c, Classification::Unknown);
        }

        #[test]
        fn prop_monotonic_in_value(
            a in -1e6f64..1e6,
            b in -1e6f64..1e6,
            low in -1e3f64..1e3,
            width in 0.0f64..1e3,
        ) {
            let high = low + width;
            let (small, large) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(
                rank(classify(small, Some(low), Some(high)))
                    <= rank(classify(large, Some(low), Some(high)))
            );
        }

        #[test]
        fn prop_inside_is_normal(low in -1e3f64..1e3, width in 0.0f64..1e3, t in 0.0f64..=1.0) {
            let high = low + width;
            let value = (low + width * t).clamp(low, high);
            prop_assert_eq!(classify(value, Some(low), Some(high)), Classification::Normal);
        }
    }
}
