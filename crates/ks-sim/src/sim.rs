//! Grid-driven simulation of one run.
//!
//! Provides:
//! - `TimeGrid`, the sampling times of a run
//! - `Simulation`, which steps an `IntegratorAdapter` across a grid and
//!   records every sample

use ks_core::{Real, VarId};
use ks_model::Model;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapter::IntegratorAdapter;
use crate::error::{SimError, SimResult};
use crate::results::SimResults;
use crate::settings::EngineSettings;

/// Sampling times of a run. The first point is the start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Real>", into = "Vec<Real>")]
pub struct TimeGrid {
    points: Vec<Real>,
}

impl Default for TimeGrid {
    /// Ten unit steps from 0.
    fn default() -> Self {
        Self {
            points: (0..=10).map(Real::from).collect(),
        }
    }
}

impl TimeGrid {
    /// Grid from `start` through the given strictly ascending points, all
    /// after `start`.
    pub fn new(start: Real, points: impl IntoIterator<Item = Real>) -> SimResult<Self> {
        if !start.is_finite() {
            return Err(SimError::invalid("grid start must be finite"));
        }
        let mut all = vec![start];
        for t in points {
            let last = all[all.len() - 1];
            if !t.is_finite() || t <= last {
                return Err(SimError::invalid(format!(
                    "grid point {t} does not follow {last}"
                )));
            }
            all.push(t);
        }
        if all.len() < 2 {
            return Err(SimError::invalid("grid needs at least one point after start"));
        }
        Ok(Self { points: all })
    }

    /// `steps` equal intervals covering `duration`. The last point is
    /// exactly `start + duration`.
    pub fn uniform(start: Real, duration: Real, steps: usize) -> SimResult<Self> {
        if steps == 0 || !(duration > 0.0) {
            return Err(SimError::invalid("uniform grid needs steps >= 1 and duration > 0"));
        }
        let interval = duration / steps as Real;
        Self::new(
            start,
            (1..=steps).map(|i| {
                if i == steps {
                    start + duration
                } else {
                    start + i as Real * interval
                }
            }),
        )
    }

    /// `steps` intervals of fixed length.
    pub fn with_interval(start: Real, interval: Real, steps: usize) -> SimResult<Self> {
        if steps == 0 || !(interval > 0.0) {
            return Err(SimError::invalid("interval grid needs steps >= 1 and interval > 0"));
        }
        Self::new(start, (1..=steps).map(|i| start + i as Real * interval))
    }

    pub fn points(&self) -> &[Real] {
        &self.points
    }

    pub fn start(&self) -> Real {
        self.points[0]
    }

    pub fn end(&self) -> Real {
        self.points[self.points.len() - 1]
    }

    /// Number of points, start included.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl TryFrom<Vec<Real>> for TimeGrid {
    type Error = SimError;

    fn try_from(points: Vec<Real>) -> SimResult<Self> {
        let Some((&start, rest)) = points.split_first() else {
            return Err(SimError::invalid("grid is empty"));
        };
        Self::new(start, rest.iter().copied())
    }
}

impl From<TimeGrid> for Vec<Real> {
    fn from(grid: TimeGrid) -> Self {
        grid.points
    }
}

/// One run stepped across a time grid.
pub struct Simulation<'m> {
    adapter: IntegratorAdapter<'m>,
    grid: TimeGrid,
    current: usize,
    results: SimResults,
}

impl<'m> Simulation<'m> {
    pub fn new(model: &'m Model, settings: EngineSettings, grid: TimeGrid) -> SimResult<Self> {
        Self::with_overrides(model, settings, grid, &[])
    }

    pub fn with_overrides(
        model: &'m Model,
        settings: EngineSettings,
        grid: TimeGrid,
        overrides: &[(VarId, Real)],
    ) -> SimResult<Self> {
        if grid.start() != model.initial_time() {
            return Err(SimError::invalid(format!(
                "grid starts at {} but the model starts at {}",
                grid.start(),
                model.initial_time()
            )));
        }
        let adapter = IntegratorAdapter::with_overrides(model, settings, overrides)?;
        let mut results = SimResults::new(model, grid.len());
        results.record(adapter.time(), adapter.values());
        Ok(Self {
            adapter,
            grid,
            current: 0,
            results,
        })
    }

    /// Advance to the next grid point and record it.
    pub fn simulate_one(&mut self) -> SimResult<()> {
        let Some(&next) = self.grid.points().get(self.current + 1) else {
            return Err(SimError::invalid("simulation already reached the end of its grid"));
        };
        self.adapter.solve(next)?;
        self.current += 1;
        self.results.record(next, self.adapter.values());
        Ok(())
    }

    /// Advance through the rest of the grid.
    pub fn simulate(&mut self) -> SimResult<&SimResults> {
        while !self.is_completed() {
            self.simulate_one()?;
        }
        debug!(
            samples = self.results.len(),
            events = self.adapter.event_log().len(),
            warnings = self.adapter.errors().num_warnings(),
            "simulation completed"
        );
        Ok(&self.results)
    }

    pub fn is_completed(&self) -> bool {
        self.current + 1 >= self.grid.len()
    }

    /// Index of the last recorded grid point.
    pub fn current_step(&self) -> usize {
        self.current
    }

    pub fn current_time(&self) -> Real {
        self.grid.points()[self.current]
    }

    pub fn restart(&mut self) -> SimResult<()> {
        self.restart_with(&[])
    }

    /// Restart from the initial values with the given variables replaced.
    pub fn restart_with(&mut self, overrides: &[(VarId, Real)]) -> SimResult<()> {
        self.adapter.restart_with(overrides)?;
        self.current = 0;
        self.results.clear();
        self.results
            .record(self.adapter.time(), self.adapter.values());
        Ok(())
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn results(&self) -> &SimResults {
        &self.results
    }

    pub fn into_results(self) -> SimResults {
        self.results
    }

    pub fn adapter(&self) -> &IntegratorAdapter<'m> {
        &self.adapter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_construction() {
        let g = TimeGrid::new(0.0, [0.5, 1.0, 4.0]).unwrap();
        assert_eq!(g.points(), &[0.0, 0.5, 1.0, 4.0]);
        assert_eq!(g.end(), 4.0);

        let g = TimeGrid::uniform(1.0, 0.5, 4).unwrap();
        assert_eq!(g.points(), &[1.0, 1.125, 1.25, 1.375, 1.5]);

        let g = TimeGrid::with_interval(0.0, 0.25, 4).unwrap();
        assert_eq!(g.points(), &[0.0, 0.25, 0.5, 0.75, 1.0]);

        assert_eq!(TimeGrid::default().len(), 11);
    }

    #[test]
    fn grid_rejects_bad_points() {
        assert!(TimeGrid::new(0.0, []).is_err());
        assert!(TimeGrid::new(0.0, [1.0, 1.0]).is_err());
        assert!(TimeGrid::new(1.0, [0.5]).is_err());
        assert!(TimeGrid::new(0.0, [Real::NAN]).is_err());
        assert!(TimeGrid::uniform(0.0, 0.0, 3).is_err());
        assert!(TimeGrid::with_interval(0.0, 1.0, 0).is_err());
    }

    #[test]
    fn grid_json_is_validated() {
        let g: TimeGrid = serde_json::from_str("[0, 1, 2.5]").unwrap();
        assert_eq!(g.end(), 2.5);
        assert_eq!(serde_json::to_string(&g).unwrap(), "[0.0,1.0,2.5]");
        assert!(serde_json::from_str::<TimeGrid>("[0, 2, 1]").is_err());
        assert!(serde_json::from_str::<TimeGrid>("[]").is_err());
    }
}
