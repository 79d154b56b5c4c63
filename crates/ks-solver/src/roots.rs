//! Root bracketing between two accepted integrator states.

use nalgebra::DVector;

use crate::error::SolverResult;

/// Bisection cap; the time tolerance is normally reached far sooner.
const MAX_BISECTIONS: usize = 200;

/// True when component value `b` lies on the other side of zero from `a`.
///
/// Components with `a == 0` never count here; moving off zero is found by
/// [`left_zero`].
pub fn crossed(a: f64, b: f64) -> bool {
    a != 0.0 && (b == 0.0 || (a > 0.0) != (b > 0.0))
}

/// Indices of components that changed sign between `from` and `to`.
pub fn crossings(from: &DVector<f64>, to: &DVector<f64>) -> Vec<usize> {
    from.iter()
        .zip(to.iter())
        .enumerate()
        .filter(|(_, (a, b))| crossed(**a, **b))
        .map(|(i, _)| i)
        .collect()
}

/// Indices of components that were exactly zero in `from` and are not in `to`.
pub fn left_zero(from: &DVector<f64>, to: &DVector<f64>) -> Vec<usize> {
    from.iter()
        .zip(to.iter())
        .enumerate()
        .filter(|(_, (a, b))| **a == 0.0 && **b != 0.0)
        .map(|(i, _)| i)
        .collect()
}

/// One side of a root bracket.
#[derive(Debug, Clone)]
pub(crate) struct Sample {
    pub t: f64,
    pub y: DVector<f64>,
    pub g: DVector<f64>,
}

/// Shrink `[lo, hi]` until it is narrower than `ttol`, keeping the earliest
/// crossing of any component inside it. Returns the sample on the crossed side.
///
/// `eval` returns the state and root values at an interior time.
pub(crate) fn locate<F>(lo: Sample, hi: Sample, ttol: f64, mut eval: F) -> SolverResult<Sample>
where
    F: FnMut(f64) -> SolverResult<(DVector<f64>, DVector<f64>)>,
{
    let mut lo = lo;
    let mut hi = hi;

    for _ in 0..MAX_BISECTIONS {
        if hi.t - lo.t <= ttol {
            break;
        }
        let t_mid = 0.5 * (lo.t + hi.t);
        if t_mid <= lo.t || t_mid >= hi.t {
            break;
        }
        let (y, g) = eval(t_mid)?;
        let mid = Sample { t: t_mid, y, g };
        if crossings(&lo.g, &mid.g).is_empty() {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_start_is_inactive() {
        assert!(!crossed(0.0, 1.0));
        assert!(!crossed(0.0, -1.0));
        assert!(crossed(1.0, 0.0));
        assert!(crossed(-1.0, 2.0));
        assert!(!crossed(-1.0, -2.0));
    }

    #[test]
    fn leaving_zero_is_reported_separately() {
        let from = DVector::from_vec(vec![0.0, 0.0, 1.0]);
        let to = DVector::from_vec(vec![1e-14, 0.0, -1.0]);
        assert_eq!(left_zero(&from, &to), vec![0]);
        assert_eq!(crossings(&from, &to), vec![2]);
    }

    #[test]
    fn locates_linear_root() {
        // g(t) = t - 0.3 on [0, 1]
        let sample = |t: f64| Sample {
            t,
            y: DVector::from_element(1, t),
            g: DVector::from_element(1, t - 0.3),
        };
        let root = locate(sample(0.0), sample(1.0), 1e-12, |t| {
            let s = sample(t);
            Ok((s.y, s.g))
        })
        .unwrap();

        assert!(root.t >= 0.3);
        assert!(root.t - 0.3 < 1e-11);
        assert!(root.g[0] >= 0.0);
    }

    #[test]
    fn finds_earliest_of_two_roots() {
        // g0 = t - 0.7, g1 = 0.2 - t; the second crosses first.
        let sample = |t: f64| Sample {
            t,
            y: DVector::zeros(0),
            g: DVector::from_vec(vec![t - 0.7, 0.2 - t]),
        };
        let root = locate(sample(0.0), sample(1.0), 1e-12, |t| {
            let s = sample(t);
            Ok((s.y, s.g))
        })
        .unwrap();
        assert!((root.t - 0.2).abs() < 1e-11);
        assert_eq!(crossings(&sample(0.0).g, &root.g), vec![1]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn bisection_brackets_linear_root(r in 0.001_f64..0.999, slope in prop::sample::select(vec![-3.0_f64, -0.5, 0.5, 3.0])) {
            let sample = |t: f64| Sample {
                t,
                y: DVector::zeros(0),
                g: DVector::from_element(1, slope * (t - r)),
            };
            let ttol = 1e-12;
            let root = locate(sample(0.0), sample(1.0), ttol, |t| {
                let s = sample(t);
                Ok((s.y, s.g))
            })
            .unwrap();
            prop_assert!(root.t >= r - 1e-15);
            prop_assert!(root.t - r <= 2.0 * ttol);
            prop_assert!(crossed(sample(0.0).g[0], root.g[0]));
        }
    }
}
