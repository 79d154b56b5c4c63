//! Variable-order, variable-step BDF integrator.
//!
//! Provides:
//! - Numerical differentiation formulas of orders 1 to 5 over a
//!   modified-divided-difference history
//! - Error-based step and order selection with automatic first step
//! - Dense output between accepted steps
//! - Root location on the dense output, with a restart at each root
//!
//! The caller owns the problem and passes it to every call, so the same
//! integrator can be paired with borrowed simulation state.

use ks_core::spacing;
use nalgebra::{DMatrix, DVector, Dyn, LU};
use tracing::{debug, trace};

use crate::error::{SolverError, SolverResult};
use crate::jacobian::{default_epsilon, finite_difference_jacobian};
use crate::newton::{CorrectorInput, NEWTON_MAXITER, rms_norm, solve_corrector};
use crate::problem::OdeProblem;
use crate::roots::{self, Sample};
use crate::settings::{IntegratorSettings, MAX_ORDER};
use crate::stats::IntegratorStats;

const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
const KAPPA: [f64; MAX_ORDER + 1] = [0.0, -0.1850, -1.0 / 9.0, -0.0823, -0.0415, 0.0];

/// How far a single `step` call may go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// Take internal steps until the target is reached exactly.
    Normal,
    /// Take one internal step toward the target.
    OneStep,
}

/// Why a `step` call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Success,
    /// A root function crossed zero; the reported time is the root.
    RootFound,
    /// The target is within round-off of the current time; nothing was done.
    TooClose,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub t: f64,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninit,
    /// State known, no step history yet.
    Ready,
    Running,
}

struct Coefficients {
    gamma: [f64; MAX_ORDER + 1],
    alpha: [f64; MAX_ORDER + 1],
    error_const: [f64; MAX_ORDER + 1],
}

impl Coefficients {
    fn new() -> Self {
        let mut gamma = [0.0; MAX_ORDER + 1];
        let mut alpha = [0.0; MAX_ORDER + 1];
        let mut error_const = [0.0; MAX_ORDER + 1];
        error_const[0] = 1.0;
        for k in 1..=MAX_ORDER {
            gamma[k] = gamma[k - 1] + 1.0 / k as f64;
            alpha[k] = (1.0 - KAPPA[k]) * gamma[k];
            error_const[k] = KAPPA[k] * gamma[k] + 1.0 / (k + 1) as f64;
        }
        Self {
            gamma,
            alpha,
            error_const,
        }
    }
}

/// Interpolating polynomial over the most recent step.
#[derive(Debug, Clone)]
pub struct DenseOutput {
    t: f64,
    h: f64,
    order: usize,
    d: Vec<DVector<f64>>,
}

impl DenseOutput {
    pub fn eval(&self, t: f64) -> DVector<f64> {
        let mut y = self.d[0].clone();
        let mut p = 1.0;
        for i in 0..self.order {
            let shift = self.t - self.h * i as f64;
            p *= (t - shift) / (self.h * (i + 1) as f64);
            y.axpy(p, &self.d[i + 1], 1.0);
        }
        y
    }
}

/// Rescaling matrix for changing the step size by `factor`.
fn compute_r(order: usize, factor: f64) -> DMatrix<f64> {
    let n = order + 1;
    let mut m = DMatrix::zeros(n, n);
    for j in 0..n {
        m[(0, j)] = 1.0;
    }
    for i in 1..n {
        for j in 1..n {
            m[(i, j)] = (i as f64 - 1.0 - factor * j as f64) / i as f64;
        }
    }
    for i in 1..n {
        for j in 0..n {
            m[(i, j)] *= m[(i - 1, j)];
        }
    }
    m
}

/// Rewrite the difference array for a step size scaled by `factor`.
fn change_d(d: &mut [DVector<f64>], order: usize, factor: f64) {
    let ru = compute_r(order, factor) * compute_r(order, 1.0);
    let old: Vec<DVector<f64>> = d[..=order].to_vec();
    for (i, row) in d.iter_mut().take(order + 1).enumerate() {
        row.fill(0.0);
        for (j, prev) in old.iter().enumerate() {
            row.axpy(ru[(j, i)], prev, 1.0);
        }
    }
}

fn compute_jacobian<P: OdeProblem>(
    problem: &mut P,
    t: f64,
    y: &DVector<f64>,
    floor: f64,
    stats: &mut IntegratorStats,
) -> SolverResult<DMatrix<f64>> {
    let n = y.len();
    let mut f_y = DVector::zeros(n);
    problem
        .rhs(t, y, &mut f_y)
        .map_err(|_| SolverError::CallbackFailed { t })?;
    let jac = finite_difference_jacobian(
        y,
        &f_y,
        |yp| {
            let mut out = DVector::zeros(n);
            problem
                .rhs(t, yp, &mut out)
                .map_err(|_| SolverError::CallbackFailed { t })?;
            Ok(out)
        },
        default_epsilon(),
        floor,
    )?;
    stats.rhs_evals += n + 1;
    stats.jac_evals += 1;
    Ok(jac)
}

/// Stiff integrator with root finding.
pub struct Bdf {
    settings: IntegratorSettings,
    coeffs: Coefficients,
    phase: Phase,
    t: f64,
    y: DVector<f64>,
    g: DVector<f64>,
    d: Vec<DVector<f64>>,
    order: usize,
    h_abs: f64,
    n_equal_steps: usize,
    newton_tol: f64,
    jac: Option<DMatrix<f64>>,
    lu: Option<LU<f64, Dyn, Dyn>>,
    root_info: Vec<i8>,
    stats: IntegratorStats,
}

impl Bdf {
    pub fn new(settings: IntegratorSettings) -> SolverResult<Self> {
        settings.validate()?;
        let rtol = settings.rtol;
        Ok(Self {
            newton_tol: (10.0 * f64::EPSILON / rtol).max(0.03f64.min(rtol.sqrt())),
            settings,
            coeffs: Coefficients::new(),
            phase: Phase::Uninit,
            t: 0.0,
            y: DVector::zeros(0),
            g: DVector::zeros(0),
            d: Vec::new(),
            order: 1,
            h_abs: 0.0,
            n_equal_steps: 0,
            jac: None,
            lu: None,
            root_info: Vec::new(),
            stats: IntegratorStats::default(),
        })
    }

    pub fn settings(&self) -> &IntegratorSettings {
        &self.settings
    }

    /// Start a new integration from `(t0, y0)`.
    pub fn init<P: OdeProblem>(
        &mut self,
        problem: &mut P,
        t0: f64,
        y0: DVector<f64>,
    ) -> SolverResult<()> {
        if y0.is_empty() {
            return Err(SolverError::InvalidArg {
                what: "state vector is empty".into(),
            });
        }
        self.stats = IntegratorStats::default();
        self.jac = None;
        self.restart(problem, t0, y0)
    }

    /// Continue from a new state after a discontinuity. History and the
    /// Jacobian are discarded; counters are kept.
    pub fn reinit<P: OdeProblem>(
        &mut self,
        problem: &mut P,
        t: f64,
        y: DVector<f64>,
    ) -> SolverResult<()> {
        if self.phase == Phase::Uninit {
            return Err(SolverError::NotInitialized);
        }
        if y.len() != self.y.len() {
            return Err(SolverError::InvalidArg {
                what: format!("state length {} != {}", y.len(), self.y.len()),
            });
        }
        self.stats.restarts += 1;
        self.jac = None;
        debug!(t, "integrator reinitialized");
        self.restart(problem, t, y)
    }

    fn restart<P: OdeProblem>(
        &mut self,
        problem: &mut P,
        t: f64,
        y: DVector<f64>,
    ) -> SolverResult<()> {
        if !t.is_finite() || !y.iter().all(|v| v.is_finite()) {
            return Err(SolverError::InvalidArg {
                what: format!("non-finite initial state at t={t}"),
            });
        }
        self.t = t;
        self.y = y;
        self.d.clear();
        self.order = 1;
        self.n_equal_steps = 0;
        self.lu = None;
        self.root_info = vec![0; problem.num_roots()];
        self.g = DVector::zeros(problem.num_roots());
        self.phase = Phase::Ready;
        self.refresh_roots(problem)
    }

    /// Re-evaluate the root functions at the current state. Needed when
    /// anything they depend on changed outside the integrator.
    pub fn refresh_roots<P: OdeProblem>(&mut self, problem: &mut P) -> SolverResult<()> {
        if self.phase == Phase::Uninit {
            return Err(SolverError::NotInitialized);
        }
        if self.g.len() != problem.num_roots() {
            self.g = DVector::zeros(problem.num_roots());
            self.root_info = vec![0; problem.num_roots()];
        }
        if self.g.is_empty() {
            return Ok(());
        }
        problem
            .roots(self.t, &self.y, &mut self.g)
            .map_err(|_| SolverError::CallbackFailed { t: self.t })?;
        self.stats.root_evals += 1;
        Ok(())
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn y(&self) -> &DVector<f64> {
        &self.y
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Size of the next step to attempt.
    pub fn step_size(&self) -> f64 {
        self.h_abs
    }

    pub fn stats(&self) -> &IntegratorStats {
        &self.stats
    }

    /// Per root function: +1 rising, -1 falling, 0 no crossing, for the
    /// most recent `RootFound` return.
    pub fn root_info(&self) -> &[i8] {
        &self.root_info
    }

    /// Interpolant over the last accepted step, if a step has been taken
    /// since the last (re)start.
    pub fn dense_output(&self) -> Option<DenseOutput> {
        if self.phase != Phase::Running {
            return None;
        }
        Some(DenseOutput {
            t: self.t,
            h: self.h_abs,
            order: self.order,
            d: self.d[..=self.order].to_vec(),
        })
    }

    /// Advance toward `t_target`.
    pub fn step<P: OdeProblem>(
        &mut self,
        problem: &mut P,
        t_target: f64,
        mode: StepMode,
    ) -> SolverResult<StepReport> {
        if self.phase == Phase::Uninit {
            return Err(SolverError::NotInitialized);
        }
        if !t_target.is_finite() || t_target < self.t {
            return Err(SolverError::InvalidArg {
                what: format!("target {t_target} is behind t={}", self.t),
            });
        }

        let tround = f64::EPSILON * self.t.abs().max(t_target.abs());
        if t_target - self.t <= 2.0 * tround {
            return Ok(StepReport {
                t: t_target,
                status: StepStatus::TooClose,
            });
        }

        self.root_info.fill(0);
        if self.phase == Phase::Ready {
            self.start(problem, t_target)?;
        }

        let mut taken = 0;
        loop {
            if taken >= self.settings.max_steps {
                return Err(SolverError::TooMuchWork {
                    steps: taken,
                    t: self.t,
                });
            }
            let t_old = self.t;
            self.advance(problem, t_target)?;
            taken += 1;

            if let Some(t_root) = self.check_roots(problem, t_old)? {
                return Ok(StepReport {
                    t: t_root,
                    status: StepStatus::RootFound,
                });
            }
            if self.t >= t_target || mode == StepMode::OneStep {
                return Ok(StepReport {
                    t: self.t,
                    status: StepStatus::Success,
                });
            }
        }
    }

    /// Build the step history from the current state.
    fn start<P: OdeProblem>(&mut self, problem: &mut P, t_target: f64) -> SolverResult<()> {
        let n = self.y.len();
        let mut f0 = DVector::zeros(n);
        problem
            .rhs(self.t, &self.y, &mut f0)
            .map_err(|_| SolverError::CallbackFailed { t: self.t })?;
        self.stats.rhs_evals += 1;

        let mut h_abs = match self.settings.initial_step {
            Some(h) => h,
            None => self.select_initial_step(problem, &f0, t_target - self.t)?,
        };
        if let Some(max_step) = self.settings.max_step {
            h_abs = h_abs.min(max_step);
        }
        h_abs = h_abs.max(10.0 * spacing(self.t));

        self.d = vec![DVector::zeros(n); MAX_ORDER + 3];
        self.d[0] = self.y.clone();
        self.d[1] = &f0 * h_abs;
        self.h_abs = h_abs;
        self.order = 1;
        self.n_equal_steps = 0;
        self.lu = None;
        self.phase = Phase::Running;
        trace!(t = self.t, h = h_abs, "integrator started");
        Ok(())
    }

    fn select_initial_step<P: OdeProblem>(
        &mut self,
        problem: &mut P,
        f0: &DVector<f64>,
        interval: f64,
    ) -> SolverResult<f64> {
        if interval <= 0.0 {
            return Ok(0.0);
        }
        let (atol, rtol) = (self.settings.atol, self.settings.rtol);
        let scale = self.y.map(|v| atol + v.abs() * rtol);
        let d0 = rms_norm(&self.y, &scale);
        let d1 = rms_norm(f0, &scale);
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        }
        .min(interval);

        let y1 = &self.y + f0 * h0;
        let mut f1 = DVector::zeros(self.y.len());
        let t1 = self.t + h0;
        problem
            .rhs(t1, &y1, &mut f1)
            .map_err(|_| SolverError::CallbackFailed { t: t1 })?;
        self.stats.rhs_evals += 1;

        let d2 = rms_norm(&(f1 - f0), &scale) / h0;
        let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
            1e-6f64.max(h0 * 1e-3)
        } else {
            (0.01 / d1.max(d2)).sqrt()
        };
        Ok((100.0 * h0)
            .min(h1)
            .min(interval)
            .min(self.settings.max_step.unwrap_or(f64::INFINITY)))
    }

    /// Take one accepted internal step, never past `t_bound`.
    fn advance<P: OdeProblem>(&mut self, problem: &mut P, t_bound: f64) -> SolverResult<()> {
        let t = self.t;
        let n = self.y.len();
        let min_step = 10.0 * spacing(t);
        let (atol, rtol) = (self.settings.atol, self.settings.rtol);

        let mut h_abs = self.h_abs;
        if let Some(max_step) = self.settings.max_step {
            if h_abs > max_step {
                change_d(&mut self.d, self.order, max_step / h_abs);
                h_abs = max_step;
                self.n_equal_steps = 0;
            }
        }
        if h_abs < min_step {
            change_d(&mut self.d, self.order, min_step / h_abs);
            h_abs = min_step;
            self.n_equal_steps = 0;
        }

        let order = self.order;
        let alpha = self.coeffs.alpha[order];
        let mut jac = self.jac.take();
        let mut lu = self.lu.take();
        let mut current_jac = false;

        loop {
            if h_abs < min_step {
                return Err(SolverError::StepTooSmall { t, h: h_abs });
            }

            let mut t_new = t + h_abs;
            if t_new > t_bound {
                t_new = t_bound;
                change_d(&mut self.d, order, (t_new - t) / h_abs);
                self.n_equal_steps = 0;
                lu = None;
            }
            let h = t_new - t;
            h_abs = h;

            let mut y_predict = DVector::zeros(n);
            for row in &self.d[..=order] {
                y_predict += row;
            }
            let scale = y_predict.map(|v| atol + rtol * v.abs());
            let mut psi = DVector::zeros(n);
            for i in 1..=order {
                psi.axpy(self.coeffs.gamma[i], &self.d[i], 1.0);
            }
            psi /= alpha;
            let c = h / alpha;
            let input = CorrectorInput {
                t_new,
                y_predict: &y_predict,
                c,
                psi: &psi,
                scale: &scale,
                tol: self.newton_tol,
            };

            let corrector = loop {
                let j = match jac.take() {
                    Some(j) => j,
                    None => {
                        current_jac = true;
                        compute_jacobian(problem, t_new, &y_predict, atol, &mut self.stats)?
                    }
                };
                let factored = match lu.take() {
                    Some(f) => f,
                    None => {
                        self.stats.lu_decomps += 1;
                        (DMatrix::identity(n, n) - &j * c).lu()
                    }
                };
                let out = solve_corrector(problem, &input, &factored, &mut self.stats)?;
                jac = Some(j);
                lu = Some(factored);
                if out.converged || current_jac {
                    break out;
                }
                // Stale Jacobian: refresh it at the predicted state and retry.
                jac = None;
                lu = None;
            };

            if !corrector.converged {
                h_abs *= 0.5;
                change_d(&mut self.d, order, 0.5);
                self.n_equal_steps = 0;
                lu = None;
                self.stats.rejected_steps += 1;
                continue;
            }

            let safety = 0.9 * (2 * NEWTON_MAXITER + 1) as f64
                / (2 * NEWTON_MAXITER + corrector.iterations) as f64;
            let scale = corrector.y.map(|v| atol + rtol * v.abs());
            let error_norm = rms_norm(&(&corrector.d * self.coeffs.error_const[order]), &scale);

            if error_norm > 1.0 {
                let factor =
                    MIN_FACTOR.max(safety * error_norm.powf(-1.0 / (order as f64 + 1.0)));
                h_abs *= factor;
                change_d(&mut self.d, order, factor);
                self.n_equal_steps = 0;
                self.stats.rejected_steps += 1;
                continue;
            }

            // Accepted.
            self.stats.steps += 1;
            self.n_equal_steps += 1;
            self.t = t_new;
            self.y = corrector.y;
            self.h_abs = h_abs;
            self.jac = jac;
            self.lu = lu;

            let d = corrector.d;
            let next = &d - &self.d[order + 1];
            self.d[order + 2] = next;
            self.d[order + 1] = d;
            for i in (0..=order).rev() {
                let (head, tail) = self.d.split_at_mut(i + 1);
                head[i] += &tail[0];
            }
            trace!(t = self.t, h = h_abs, order, "step accepted");

            if self.n_equal_steps < order + 1 {
                return Ok(());
            }

            let error_m_norm = if order > 1 {
                rms_norm(&(&self.d[order] * self.coeffs.error_const[order - 1]), &scale)
            } else {
                f64::INFINITY
            };
            let error_p_norm = if order < self.settings.max_order {
                rms_norm(
                    &(&self.d[order + 2] * self.coeffs.error_const[order + 1]),
                    &scale,
                )
            } else {
                f64::INFINITY
            };

            let norms = [error_m_norm, error_norm, error_p_norm];
            let mut best = 0;
            let mut best_factor = f64::NEG_INFINITY;
            for (k, norm) in norms.iter().enumerate() {
                let factor = norm.powf(-1.0 / (order + k) as f64);
                if factor > best_factor {
                    best = k;
                    best_factor = factor;
                }
            }

            let new_order = order + best - 1;
            let factor = MAX_FACTOR.min(safety * best_factor);
            self.order = new_order;
            self.h_abs *= factor;
            change_d(&mut self.d, new_order, factor);
            self.n_equal_steps = 0;
            self.lu = None;
            return Ok(());
        }
    }

    /// Look for root crossings over the step just taken from `t_old`.
    fn check_roots<P: OdeProblem>(
        &mut self,
        problem: &mut P,
        t_old: f64,
    ) -> SolverResult<Option<f64>> {
        if self.g.is_empty() {
            return Ok(None);
        }
        let mut g_new = DVector::zeros(self.g.len());
        problem
            .roots(self.t, &self.y, &mut g_new)
            .map_err(|_| SolverError::CallbackFailed { t: self.t })?;
        self.stats.root_evals += 1;

        if let Some(t_root) = self.check_zero_start(problem, t_old)? {
            return Ok(Some(t_root));
        }
        if roots::crossings(&self.g, &g_new).is_empty() {
            self.g = g_new;
            return Ok(None);
        }

        let Some(dense) = self.dense_output() else {
            return Err(SolverError::NotInitialized);
        };
        let lo = Sample {
            t: t_old,
            y: dense.eval(t_old),
            g: self.g.clone(),
        };
        let hi = Sample {
            t: self.t,
            y: self.y.clone(),
            g: g_new,
        };
        let ttol = 100.0 * f64::EPSILON * (self.t.abs() + (self.t - t_old));
        let n_roots = self.g.len();
        let mut evals = 0;
        let root = roots::locate(lo, hi, ttol, |t| {
            let y = dense.eval(t);
            let mut g = DVector::zeros(n_roots);
            problem
                .roots(t, &y, &mut g)
                .map_err(|_| SolverError::CallbackFailed { t })?;
            evals += 1;
            Ok((y, g))
        })?;
        self.stats.root_evals += evals;
        self.stats.root_returns += 1;

        for i in roots::crossings(&self.g, &root.g) {
            self.root_info[i] = if root.g[i] > self.g[i] { 1 } else { -1 };
        }
        debug!(t = root.t, roots = ?self.root_info, "root located");

        // Restart at the root; the step beyond it is discarded.
        self.t = root.t;
        self.y = root.y;
        self.g = root.g;
        self.d.clear();
        self.lu = None;
        self.phase = Phase::Ready;
        Ok(Some(self.t))
    }

    /// Components that sat exactly on zero at `t_old` are looked at just
    /// past it. Any that moved off zero there make that point a root.
    fn check_zero_start<P: OdeProblem>(
        &mut self,
        problem: &mut P,
        t_old: f64,
    ) -> SolverResult<Option<f64>> {
        if !self.g.iter().any(|&v| v == 0.0) {
            return Ok(None);
        }
        let t_near = t_old + 100.0 * f64::EPSILON * (t_old.abs() + (self.t - t_old));
        if t_near >= self.t {
            return Ok(None);
        }
        let Some(dense) = self.dense_output() else {
            return Err(SolverError::NotInitialized);
        };
        let y = dense.eval(t_near);
        let mut g = DVector::zeros(self.g.len());
        problem
            .roots(t_near, &y, &mut g)
            .map_err(|_| SolverError::CallbackFailed { t: t_near })?;
        self.stats.root_evals += 1;

        let left = roots::left_zero(&self.g, &g);
        if left.is_empty() {
            return Ok(None);
        }
        for i in left {
            self.root_info[i] = if g[i] > 0.0 { 1 } else { -1 };
        }
        self.stats.root_returns += 1;
        debug!(t = t_near, roots = ?self.root_info, "root function moved off zero");

        self.t = t_near;
        self.y = y;
        self.g = g;
        self.d.clear();
        self.lu = None;
        self.phase = Phase::Ready;
        Ok(Some(self.t))
    }
}
