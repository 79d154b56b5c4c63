//! Integrator configuration.

use serde::{Deserialize, Serialize};

use crate::error::{SolverError, SolverResult};

/// Highest BDF order the integrator supports.
pub const MAX_ORDER: usize = 5;

/// Integrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    /// Absolute tolerance.
    pub atol: f64,
    /// Relative tolerance.
    pub rtol: f64,
    /// Internal steps allowed per `step` call.
    pub max_steps: usize,
    /// Highest method order, 1..=5.
    pub max_order: usize,
    /// Upper bound on the step size. None means unbounded.
    pub max_step: Option<f64>,
    /// First step size. None selects one automatically.
    pub initial_step: Option<f64>,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            atol: 1e-5,
            rtol: 1e-5,
            max_steps: 5000,
            max_order: MAX_ORDER,
            max_step: None,
            initial_step: None,
        }
    }
}

impl IntegratorSettings {
    pub fn validate(&self) -> SolverResult<()> {
        let invalid = |what: &str| {
            Err(SolverError::InvalidArg {
                what: what.to_string(),
            })
        };
        if !(self.atol > 0.0 && self.atol.is_finite()) {
            return invalid("atol must be positive and finite");
        }
        if !(self.rtol > 0.0 && self.rtol.is_finite()) {
            return invalid("rtol must be positive and finite");
        }
        if self.max_steps == 0 {
            return invalid("max_steps must be at least 1");
        }
        if !(1..=MAX_ORDER).contains(&self.max_order) {
            return invalid("max_order must be between 1 and 5");
        }
        if self.max_step.is_some_and(|h| !(h > 0.0)) {
            return invalid("max_step must be positive");
        }
        if self.initial_step.is_some_and(|h| !(h > 0.0 && h.is_finite())) {
            return invalid("initial_step must be positive and finite");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        IntegratorSettings::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_values() {
        let bad = [
            IntegratorSettings {
                atol: 0.0,
                ..Default::default()
            },
            IntegratorSettings {
                rtol: f64::NAN,
                ..Default::default()
            },
            IntegratorSettings {
                max_order: 6,
                ..Default::default()
            },
            IntegratorSettings {
                max_steps: 0,
                ..Default::default()
            },
            IntegratorSettings {
                max_step: Some(-1.0),
                ..Default::default()
            },
        ];
        for s in bad {
            assert!(s.validate().is_err(), "{s:?}");
        }
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: IntegratorSettings = serde_json::from_str(r#"{"rtol": 1e-8}"#).unwrap();
        assert_eq!(s.rtol, 1e-8);
        assert_eq!(s.max_steps, 5000);
    }
}
