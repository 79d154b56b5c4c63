//! Sampled simulation output.

use ks_core::Real;
use ks_model::{Model, VariableKind};
use serde::{Deserialize, Serialize};

use crate::error::SimResult;

/// Values of one variable at every sampled time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timecourse {
    pub name: String,
    pub kind: VariableKind,
    pub values: Vec<Real>,
}

/// All variables sampled on a time grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimResults {
    pub times: Vec<Real>,
    pub series: Vec<Timecourse>,
}

impl SimResults {
    /// Empty results with one series per model variable.
    pub fn new(model: &Model, capacity: usize) -> Self {
        Self {
            times: Vec::with_capacity(capacity),
            series: model
                .variables()
                .iter()
                .map(|v| Timecourse {
                    name: v.name.clone(),
                    kind: v.kind,
                    values: Vec::with_capacity(capacity),
                })
                .collect(),
        }
    }

    pub(crate) fn record(&mut self, t: Real, values: &[Real]) {
        self.times.push(t);
        for (series, &v) in self.series.iter_mut().zip(values) {
            series.values.push(v);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.times.clear();
        for series in &mut self.series {
            series.values.clear();
        }
    }

    /// Number of recorded samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn series(&self, name: &str) -> Option<&Timecourse> {
        self.series.iter().find(|s| s.name == name)
    }

    /// Value of `name` at sample `step`.
    pub fn value_at(&self, name: &str, step: usize) -> Option<Real> {
        self.series(name)?.values.get(step).copied()
    }

    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
