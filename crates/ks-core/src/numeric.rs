use crate::CoreError;

/// Floating point type used throughout the engine.
pub type Real = f64;

/// Absolute plus relative comparison tolerance.
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Distance from `x` to the next representable float away from zero.
pub fn spacing(x: Real) -> Real {
    let a = x.abs();
    if !a.is_finite() {
        return Real::NAN;
    }
    Real::from_bits(a.to_bits() + 1) - a
}

/// Interpret a numeric value as a boolean (non-zero is true).
pub fn truthy(v: Real) -> bool {
    v != 0.0
}

/// Map a boolean onto 0/1.
pub fn from_bool(b: bool) -> Real {
    if b { 1.0 } else { 0.0 }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn spacing_reaches_next_float(x in -1e300_f64..1e300_f64) {
            let s = spacing(x);
            prop_assert!(s > 0.0);
            prop_assert_eq!((x.abs() + s).to_bits(), x.abs().to_bits() + 1);
        }

        #[test]
        fn nearly_equal_is_symmetric(a in -1e6_f64..1e6_f64, b in -1e6_f64..1e6_f64) {
            let tol = Tolerances::default();
            prop_assert_eq!(nearly_equal(a, b, tol), nearly_equal(b, a, tol));
            prop_assert!(nearly_equal(a, a, tol));
        }
    }
}
