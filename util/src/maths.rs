//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Limit a value to the range `[min, max]`.
///
/// Returns the limited value and whether or not the limit was applied.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> (T, bool)
where
    T: Float
{
    if *value > *max {
        (*max, true)
    }
    else if *value < *min {
        (*min, true)
    }
    else {
        (*value, false)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&0.5f64, &-1.0, &1.0), (0.5, false));
        assert_eq!(clamp(&1.5f64, &-1.0, &1.0), (1.0, true));
        assert_eq!(clamp(&-3.0f64, &0.0, &0.3), (0.0, true));
        assert_eq!(clamp(&0.3f64, &0.0, &0.3), (0.3, false));
    }
}
