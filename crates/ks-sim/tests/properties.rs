//! Engine-level properties checked through the public API.

use ks_core::{ErrorCode, Severity};
use ks_model::{EventDef, Func, ModelBuilder};
use ks_sim::{
    EngineSettings, IntegratorAdapter, RootFunction, RunState, UpdateCoordinator, lower_triggers,
};

#[test]
fn memoized_assignment_is_not_recomputed_within_a_pass() {
    // a := factorial(2.5) warns every time its equation runs
    let mut b = ModelBuilder::new();
    let x = b.add_ode_variable("x", 1.0);
    let a = b.add_assignment_variable("a");
    let zero = b.num(0.0);
    b.set_ode(x, zero);
    let arg = b.num(2.5);
    let fact = b.apply(Func::Factorial, arg);
    b.set_assignment(a, fact);
    let a_ref = b.var(a);
    let model = b.build().unwrap();

    let mut state = RunState::new(&model).unwrap();
    let coord = UpdateCoordinator::new(&model, 100);
    coord.initialize(&mut state, &[]).unwrap();
    let runs = |state: &RunState| state.errors().iter().next().map_or(0, |d| d.occurrences);
    assert_eq!(runs(&state), 1);

    let mut ev = state.evaluator(&model, 0.0);
    assert_eq!(ev.eval(a_ref), 2.0);
    assert_eq!(ev.eval(a_ref), 2.0);
    assert_eq!(runs(&state), 1);

    // a new pass invalidates the cache
    assert!(coord.settle(&mut state, 0.0));
    assert_eq!(runs(&state), 2);
}

#[test]
fn self_referencing_assignment_records_one_cycle_error() {
    let mut b = ModelBuilder::new();
    let x = b.add_ode_variable("x", 1.0);
    let a = b.add_assignment_variable("A");
    let zero = b.num(0.0);
    b.set_ode(x, zero);
    let a_ref = b.var(a);
    let one = b.num(1.0);
    let rhs = b.plus(vec![a_ref, one]);
    b.set_assignment(a, rhs);
    let model = b.build().unwrap();

    let mut state = RunState::new(&model).unwrap();
    let settled = UpdateCoordinator::new(&model, 100).settle(&mut state, 0.0);
    assert!(!settled);
    assert_eq!(state.values()[a.ix()], 1.0);
    let cycles: Vec<_> = state.errors().with_code(ErrorCode::CyclicDependency).collect();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].occurrences, 1);
    assert_eq!(cycles[0].severity, Severity::Error);
}

#[test]
fn delayed_trigger_fires_exactly_at_trigger_time_plus_delay() {
    let mut b = ModelBuilder::new();
    let x = b.add_ode_variable("x", 1.0);
    let p = b.add_parameter("p", 0.0);
    let zero = b.num(0.0);
    b.set_ode(x, zero);
    let t = b.time();
    let start = b.num(1.9);
    let trig = b.gt(t, start);
    let delay = b.num(1.5);
    let one = b.num(1.0);
    b.add_event(EventDef::new("late", trig).delay(delay).assign(p, one));
    let model = b.build().unwrap();

    let mut state = RunState::new(&model).unwrap();
    let coord = UpdateCoordinator::new(&model, 100);
    coord.initialize(&mut state, &[]).unwrap();
    assert!(coord.settle(&mut state, 2.0));
    assert_eq!(state.values()[p.ix()], 0.0);
    let pending = state.queue().peek().unwrap();
    assert_eq!(pending.time, 3.5);
    assert_eq!(pending.values.as_deref(), Some(&[1.0][..]));
}

#[test]
fn compound_trigger_lowers_to_one_root_per_comparison() {
    let mut b = ModelBuilder::new();
    let x = b.add_ode_variable("x", 6.0);
    let y = b.add_ode_variable("y", 3.0);
    let zero = b.num(0.0);
    b.set_ode(x, zero);
    b.set_ode(y, zero);
    let x_ref = b.var(x);
    let five = b.num(5.0);
    let y_ref = b.var(y);
    let two = b.num(2.0);
    let c1 = b.gt(x_ref, five);
    let c2 = b.lt(y_ref, two);
    let trig = b.and(vec![c1, c2]);
    b.add_event(EventDef::new("both", trig));
    let model = b.build().unwrap();

    let roots = lower_triggers(&model);
    assert_eq!(roots.len(), 2);

    let mut state = RunState::new(&model).unwrap();
    UpdateCoordinator::new(&model, 100)
        .initialize(&mut state, &[])
        .unwrap();
    let mut ev = state.evaluator(&model, 0.0);
    let g: Vec<f64> = roots.iter().map(|r| r.eval(&mut ev)).collect();
    assert_eq!(g, vec![1.0, 1.0]);
    assert!(matches!(roots[0], RootFunction::Difference { .. }));
    // only x > 5 holds, so the compound trigger stays false
    assert!(!ev.truth(trig));
}

#[test]
fn event_change_to_ode_value_is_visible_immediately() {
    let mut b = ModelBuilder::new();
    let x = b.add_ode_variable("x", 1.0);
    let x_ref = b.var(x);
    let rate = b.neg(x_ref);
    b.set_ode(x, rate);
    let t = b.time();
    let half = b.num(0.5);
    let trig = b.geq(t, half);
    let hundred = b.num(100.0);
    b.add_event(EventDef::new("bump", trig).assign(x, hundred));
    let model = b.build().unwrap();

    let settings = EngineSettings::default();
    let mut adapter = IntegratorAdapter::new(&model, settings).unwrap();
    adapter.solve(0.5).unwrap();
    assert_eq!(adapter.time(), 0.5);
    assert_eq!(adapter.values()[x.ix()], 100.0);
    assert_eq!(adapter.event_log().len(), 1);
}
