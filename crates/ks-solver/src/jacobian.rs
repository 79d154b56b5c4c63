//! Finite difference Jacobian computation.

use crate::error::SolverResult;
use nalgebra::{DMatrix, DVector};

/// Relative perturbation used for forward differences.
pub fn default_epsilon() -> f64 {
    f64::EPSILON.sqrt()
}

/// Compute a Jacobian using forward finite differences.
///
/// For each column j, perturbs x[j] by `epsilon * max(|x[j]|, floor)` and
/// computes (f(x+e) - f(x))/e. `f_x` is f evaluated at `x`.
pub fn finite_difference_jacobian<F>(
    x: &DVector<f64>,
    f_x: &DVector<f64>,
    mut f: F,
    epsilon: f64,
    floor: f64,
) -> SolverResult<DMatrix<f64>>
where
    F: FnMut(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    let n = x.len();
    let m = f_x.len();
    let mut jac = DMatrix::zeros(m, n);
    let mut x_perturbed = x.clone();

    for j in 0..n {
        let dx = epsilon * x[j].abs().max(floor);
        x_perturbed[j] = x[j] + dx;
        // Use the representable step, not the requested one.
        let dx = x_perturbed[j] - x[j];

        let f_perturbed = f(&x_perturbed)?;
        jac.set_column(j, &((f_perturbed - f_x) / dx));
        x_perturbed[j] = x[j];
    }

    Ok(jac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jacobian_linear() {
        // f(x) = 2*x, J = 2
        let f = |x: &DVector<f64>| -> SolverResult<DVector<f64>> {
            Ok(DVector::from_element(1, 2.0 * x[0]))
        };

        let x = DVector::from_element(1, 3.0);
        let fx = DVector::from_element(1, 6.0);
        let jac = finite_difference_jacobian(&x, &fx, f, default_epsilon(), 1.0).unwrap();

        assert!((jac[(0, 0)] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn jacobian_coupled() {
        // f = (x0 * x1, -x0), J = [[x1, x0], [-1, 0]]
        let f = |x: &DVector<f64>| -> SolverResult<DVector<f64>> {
            Ok(DVector::from_vec(vec![x[0] * x[1], -x[0]]))
        };

        let x = DVector::from_vec(vec![2.0, 5.0]);
        let fx = DVector::from_vec(vec![10.0, -2.0]);
        let jac = finite_difference_jacobian(&x, &fx, f, default_epsilon(), 1e-8).unwrap();

        assert!((jac[(0, 0)] - 5.0).abs() < 1e-5);
        assert!((jac[(0, 1)] - 2.0).abs() < 1e-5);
        assert!((jac[(1, 0)] + 1.0).abs() < 1e-5);
        assert!(jac[(1, 1)].abs() < 1e-5);
    }

    #[test]
    fn jacobian_handles_zero_entries() {
        let f = |x: &DVector<f64>| -> SolverResult<DVector<f64>> {
            Ok(DVector::from_element(1, 3.0 * x[0]))
        };
        let x = DVector::from_element(1, 0.0);
        let fx = DVector::from_element(1, 0.0);
        let jac = finite_difference_jacobian(&x, &fx, f, default_epsilon(), 1e-6).unwrap();
        assert!((jac[(0, 0)] - 3.0).abs() < 1e-6);
    }
}
