//! Whole-run behavior: sampling, restarts, batches and failure handling.

use ks_core::{ErrorCode, VarId};
use ks_model::{Expr, Func, Model, ModelBuilder};
use ks_sim::{
    EngineSettings, IntegratorAdapter, SimError, SimResults, Simulation, TimeGrid, run_batch,
};
use ks_solver::IntegratorSettings;

fn tight() -> EngineSettings {
    EngineSettings {
        integrator: IntegratorSettings {
            atol: 1e-10,
            rtol: 1e-8,
            ..IntegratorSettings::default()
        },
        ..EngineSettings::default()
    }
}

/// dx/dt = -k x with an assignment `half := x / 2`.
fn decay_model(x0: f64, k: f64) -> (Model, VarId, VarId) {
    let mut b = ModelBuilder::new();
    let x = b.add_ode_variable("x", x0);
    let kv = b.add_parameter("k", k);
    let half = b.add_assignment_variable("half");
    let k_ref = b.var(kv);
    let x_ref = b.var(x);
    let kx = b.times(vec![k_ref, x_ref]);
    let rate = b.neg(kx);
    b.set_ode(x, rate);
    let x_ref = b.var(x);
    let two = b.num(2.0);
    let halved = b.divide(x_ref, two);
    b.set_assignment(half, halved);
    (b.build().unwrap(), x, kv)
}

fn close(a: f64, b: f64, rel: f64) -> bool {
    (a - b).abs() <= rel * b.abs().max(1e-12)
}

#[test]
fn samples_follow_analytic_solution() {
    let (model, _, _) = decay_model(4.0, 0.5);
    let grid = TimeGrid::uniform(0.0, 4.0, 8).unwrap();
    let mut sim = Simulation::new(&model, tight(), grid).unwrap();
    assert_eq!(sim.current_step(), 0);
    assert!(!sim.is_completed());

    sim.simulate_one().unwrap();
    assert_eq!(sim.current_step(), 1);
    assert_eq!(sim.current_time(), 0.5);

    let results = sim.simulate().unwrap().clone();
    assert!(sim.is_completed());
    assert_eq!(results.len(), 9);
    for (i, &t) in results.times.iter().enumerate() {
        let x = results.value_at("x", i).unwrap();
        let half = results.value_at("half", i).unwrap();
        let exact = 4.0 * (-0.5 * t).exp();
        assert!(close(x, exact, 1e-6), "x({t}) = {x}, expected {exact}");
        assert_eq!(half, x / 2.0, "assignment out of date at t={t}");
    }
    assert!(sim.simulate_one().is_err());
}

#[test]
fn restart_with_overrides_starts_a_fresh_run() {
    let (model, x, k) = decay_model(4.0, 0.5);
    let grid = TimeGrid::with_interval(0.0, 1.0, 2).unwrap();
    let mut sim = Simulation::new(&model, tight(), grid).unwrap();
    sim.simulate().unwrap();
    let first_end = sim.results().value_at("x", 2).unwrap();

    sim.restart_with(&[(x, 8.0), (k, 1.0)]).unwrap();
    assert_eq!(sim.current_step(), 0);
    assert_eq!(sim.results().len(), 1);
    assert_eq!(sim.results().value_at("x", 0), Some(8.0));
    assert_eq!(sim.results().value_at("half", 0), Some(4.0));
    let results = sim.simulate().unwrap();
    let x2 = results.value_at("x", 2).unwrap();
    assert!(close(x2, 8.0 * (-2.0f64).exp(), 1e-6), "x(2) = {x2}");

    sim.restart().unwrap();
    let results = sim.simulate().unwrap();
    assert!(close(results.value_at("x", 2).unwrap(), first_end, 1e-9));
}

#[test]
fn batch_runs_are_independent_and_ordered() {
    let (model, x, _) = decay_model(1.0, 1.0);
    let grid = TimeGrid::with_interval(0.0, 0.5, 4).unwrap();
    let runs: Vec<Vec<(VarId, f64)>> = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|&x0| vec![(x, x0)])
        .collect();

    let results = run_batch(&model, &tight(), &grid, &runs);
    assert_eq!(results.len(), 4);
    for (run, result) in runs.iter().zip(&results) {
        let x0 = run[0].1;
        let r: &SimResults = result.as_ref().unwrap();
        assert_eq!(r.value_at("x", 0), Some(x0));
        let end = r.value_at("x", 4).unwrap();
        assert!(close(end, x0 * (-2.0f64).exp(), 1e-6), "x0={x0}: {end}");
    }
}

#[test]
fn batch_reports_each_failure_separately() {
    let (model, x, _) = decay_model(1.0, 1.0);
    let half = model.find_variable("half").unwrap();
    let grid = TimeGrid::with_interval(0.0, 1.0, 1).unwrap();
    let runs = vec![vec![(x, 3.0)], vec![(half, 1.0)]];
    let results = run_batch(&model, &tight(), &grid, &runs);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(SimError::InvalidArg { .. })));
}

#[test]
fn models_without_rates_or_with_algebraic_equations_are_rejected() {
    let mut b = ModelBuilder::new();
    b.add_parameter("k", 1.0);
    let model = b.build().unwrap();
    assert!(matches!(
        IntegratorAdapter::new(&model, EngineSettings::default()),
        Err(SimError::Unsupported { .. })
    ));

    let mut b = ModelBuilder::new();
    let x = b.add_ode_variable("x", 1.0);
    let z = b.add_algebraic_variable("z", 0.0);
    let zero = b.num(0.0);
    b.set_ode(x, zero);
    let z_ref = b.var(z);
    b.add_algebraic(z, z_ref);
    let model = b.build().unwrap();
    assert!(matches!(
        IntegratorAdapter::new(&model, EngineSettings::default()),
        Err(SimError::Unsupported { .. })
    ));
}

#[test]
fn grid_must_start_at_model_initial_time() {
    let mut b = ModelBuilder::new();
    let x = b.add_ode_variable("x", 1.0);
    let zero = b.num(0.0);
    b.set_ode(x, zero);
    b.set_initial_time(2.0);
    let model = b.build().unwrap();

    assert!(Simulation::new(&model, EngineSettings::default(), TimeGrid::default()).is_err());
    let grid = TimeGrid::with_interval(2.0, 1.0, 3).unwrap();
    let mut sim = Simulation::new(&model, EngineSettings::default(), grid).unwrap();
    let results = sim.simulate().unwrap();
    assert_eq!(results.times, vec![2.0, 3.0, 4.0, 5.0]);
    assert_eq!(results.value_at("x", 3), Some(1.0));
}

#[test]
fn failing_rate_rolls_back_and_reports() {
    // dx/dt = x until time > 1, then an unknown node
    let mut b = ModelBuilder::new();
    let x = b.add_ode_variable("x", 1.0);
    let t = b.time();
    let one = b.num(1.0);
    let late = b.gt(t, one);
    let broken = b.push(Expr::Unknown("csymbol".into()));
    let x_ref = b.var(x);
    let rate = b.piecewise(vec![late, broken, x_ref]);
    b.set_ode(x, rate);
    let model = b.build().unwrap();

    let mut adapter = IntegratorAdapter::new(&model, tight()).unwrap();
    adapter.solve(0.5).unwrap();
    let at_half = adapter.values().to_vec();

    let err = adapter.solve(2.0).unwrap_err();
    assert!(matches!(err, SimError::Integration { .. }), "{err}");
    assert!(adapter.errors().with_code(ErrorCode::UnknownNode).count() == 1);
    assert!(adapter.errors().with_code(ErrorCode::IntegratorFailure).count() == 1);
    // values are those of the last successful step, not of a trial point
    let x_now = adapter.value(x);
    assert!(x_now.is_finite());
    assert!(x_now >= at_half[x.ix()]);
    assert!(x_now <= 1.0f64.exp() * 1.0001, "x = {x_now}");
}

#[test]
fn warnings_do_not_stop_a_run() {
    // dx/dt = -x + 0 * undefined(x), factorial(2.5) as a parameter init
    let mut b = ModelBuilder::new();
    let x = b.add_ode_variable("x", 1.0);
    let p = b.add_parameter("p", 0.0);
    let x_ref = b.var(x);
    let call = b.call("undefined", vec![x_ref]);
    let zero = b.num(0.0);
    let masked = b.times(vec![zero, call]);
    let x_ref = b.var(x);
    let neg = b.neg(x_ref);
    let rate = b.plus(vec![neg, masked]);
    b.set_ode(x, rate);
    let arg = b.num(2.5);
    let fact = b.apply(Func::Factorial, arg);
    b.set_init_assignment(p, fact);
    let model = b.build().unwrap();

    let grid = TimeGrid::with_interval(0.0, 1.0, 1).unwrap();
    let mut sim = Simulation::new(&model, tight(), grid).unwrap();
    let results = sim.simulate().unwrap().clone();
    assert_eq!(results.value_at("p", 0), Some(2.0));
    assert!(close(results.value_at("x", 1).unwrap(), (-1.0f64).exp(), 1e-6));

    let errors = sim.adapter().errors();
    assert!(!errors.has_failures());
    assert_eq!(errors.with_code(ErrorCode::NonIntegerFactorial).count(), 1);
    let undefined = errors.with_code(ErrorCode::UndefinedFunction).next().unwrap();
    assert!(undefined.occurrences > 1);
}

#[test]
fn results_serialize_to_json() {
    let (model, _, _) = decay_model(1.0, 1.0);
    let grid = TimeGrid::with_interval(0.0, 1.0, 2).unwrap();
    let mut sim = Simulation::new(&model, tight(), grid).unwrap();
    sim.simulate().unwrap();
    let json = sim.results().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["times"].as_array().unwrap().len(), 3);
    assert_eq!(value["series"][0]["name"], "x");
    assert_eq!(value["series"][2]["kind"], "Assignment");
}

#[test]
fn solve_rejects_going_backwards() {
    let (model, _, _) = decay_model(1.0, 1.0);
    let mut adapter = IntegratorAdapter::new(&model, tight()).unwrap();
    adapter.solve(1.0).unwrap();
    assert!(matches!(adapter.solve(0.5), Err(SimError::InvalidArg { .. })));
    assert!(matches!(adapter.solve(f64::NAN), Err(SimError::InvalidArg { .. })));
    adapter.solve(1.0).unwrap();
    assert_eq!(adapter.time(), 1.0);
}
