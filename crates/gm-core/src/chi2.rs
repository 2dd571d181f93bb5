//! Chi-squared tail probability and the float-exponent helper used to keep
//! long probability products out of underflow.

use crate::error::{ClassifierError, Result};

/// Probability that a chi-squared variate with `v` degrees of freedom is at
/// least `x2`. `v` must be even.
///
/// With m = x2/2 this is `e^-m * Σ m^i / i!` for i in 0..v/2, accumulated
/// term by term. Roundoff (plus error in the platform `exp`) can spill the
/// sum a few ULP above 1.0, so the result is clamped.
pub fn chi2q(x2: f64, v: u32) -> Result<f64> {
    if v % 2 != 0 {
        return Err(ClassifierError::InvalidDegreesOfFreedom(v));
    }
    let m = x2 / 2.0;
    let mut sum = (-m).exp();
    let mut term = sum;
    for i in 1..(v / 2) {
        term *= m / i as f64;
        sum += term;
    }
    Ok(sum.min(1.0))
}

/// Split a finite non-negative f64 into `(mantissa, exponent)` with the
/// mantissa in [0.5, 1.0) and `x == mantissa * 2^exponent`. Zero maps to
/// `(0.0, 0)`.
pub(crate) fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 {
        return (0.0, 0);
    }
    let mut x = x;
    let mut e = 0i32;
    if x.to_bits() >> 52 & 0x7ff == 0 {
        // subnormal: scale into the normal range first
        x *= 2f64.powi(64);
        e -= 64;
    }
    let bits = x.to_bits();
    e += ((bits >> 52 & 0x7ff) as i32) - 1022;
    let mantissa = f64::from_bits((bits & !(0x7ffu64 << 52)) | (0x3feu64 << 52));
    (mantissa, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_chi2q_at_zero_is_one() {
        for v in [2u32, 4, 10, 100, 300] {
            assert_eq!(chi2q(0.0, v).unwrap(), 1.0, "chi2q(0, {v})");
        }
    }

    #[test]
    fn test_chi2q_known_values() {
        // v=2 reduces to e^-m
        assert_relative_eq!(chi2q(2.0, 2).unwrap(), (-1.0f64).exp(), epsilon = 1e-12);
        // v=4, x2=4: e^-2 * (1 + 2)
        assert_relative_eq!(chi2q(4.0, 4).unwrap(), 3.0 * (-2.0f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_chi2q_odd_v_rejected() {
        assert!(matches!(
            chi2q(1.0, 3),
            Err(ClassifierError::InvalidDegreesOfFreedom(3))
        ));
    }

    #[test]
    fn test_chi2q_clamped_at_one() {
        // Small x2 with large v accumulates roundoff; must never exceed 1.0.
        let q = chi2q(100.0, 300).unwrap();
        assert!(q <= 1.0, "got {q}");
    }

    #[test]
    fn test_chi2q_large_x2_near_zero() {
        let q = chi2q(1000.0, 2).unwrap();
        assert!((0.0..1e-100).contains(&q), "got {q}");
    }

    #[test]
    fn test_frexp_roundtrip() {
        for x in [1.0f64, 0.5, 0.75, 1e-10, 1e-200, 3.141592653589793, 1e300] {
            let (m, e) = frexp(x);
            assert!((0.5..1.0).contains(&m), "mantissa {m} for {x}");
            assert_eq!(m * 2f64.powi(e), x, "roundtrip for {x}");
        }
    }

    #[test]
    fn test_frexp_zero() {
        assert_eq!(frexp(0.0), (0.0, 0));
    }

    #[test]
    fn test_frexp_subnormal() {
        let x = 1e-310; // below the normal range
        let (m, e) = frexp(x);
        assert!((0.5..1.0).contains(&m), "mantissa {m}");
        assert_eq!(m * 2f64.powi(e), x);
    }

    proptest! {
        #[test]
        fn prop_chi2q_in_unit_interval(x2 in 0.0f64..2000.0, half_v in 1u32..300) {
            let q = chi2q(x2, 2 * half_v).unwrap();
            prop_assert!((0.0..=1.0).contains(&q));
        }

        #[test]
        fn prop_chi2q_decreasing_in_x2(x2 in 0.0f64..500.0, half_v in 1u32..100) {
            let v = 2 * half_v;
            let lo = chi2q(x2, v).unwrap();
            let hi = chi2q(x2 + 10.0, v).unwrap();
            prop_assert!(hi <= lo + 1e-12);
        }

        #[test]
        fn prop_frexp_roundtrip(x in 1e-305f64..1e305) {
            let (m, e) = frexp(x);
            prop_assert!((0.5..1.0).contains(&m));
            prop_assert_eq!(m * 2f64.powi(e), x);
        }
    }
}
