//! Independent runs of one model in parallel.

use ks_core::{Real, VarId};
use ks_model::Model;
use rayon::prelude::*;
use tracing::debug;

use crate::error::SimResult;
use crate::results::SimResults;
use crate::settings::EngineSettings;
use crate::sim::{Simulation, TimeGrid};

/// Simulate `model` once per entry of `runs`, each with its own initial
/// value overrides. Runs share only the read-only model; results come back
/// in the order of `runs`.
pub fn run_batch(
    model: &Model,
    settings: &EngineSettings,
    grid: &TimeGrid,
    runs: &[Vec<(VarId, Real)>],
) -> Vec<SimResult<SimResults>> {
    debug!(runs = runs.len(), "batch started");
    runs.par_iter()
        .map(|overrides| -> SimResult<SimResults> {
            let mut sim = Simulation::with_overrides(model, settings.clone(), grid.clone(), overrides)?;
            sim.simulate()?;
            Ok(sim.into_results())
        })
        .collect()
}
