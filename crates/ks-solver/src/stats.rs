use serde::Serialize;

/// Work counters accumulated over the integrator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntegratorStats {
    pub steps: usize,
    pub rejected_steps: usize,
    pub rhs_evals: usize,
    pub root_evals: usize,
    pub jac_evals: usize,
    pub lu_decomps: usize,
    pub root_returns: usize,
    pub restarts: usize,
}
