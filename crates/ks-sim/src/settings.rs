//! Engine configuration.

use ks_solver::IntegratorSettings;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Configuration for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub integrator: IntegratorSettings,
    /// Settlement passes allowed at a single instant before giving up on
    /// mutually retriggering events.
    pub max_settle_iterations: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            integrator: IntegratorSettings::default(),
            max_settle_iterations: 1000,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> SimResult<()> {
        self.integrator.validate()?;
        if self.max_settle_iterations == 0 {
            return Err(SimError::invalid("max_settle_iterations must be at least 1"));
        }
        Ok(())
    }

    /// Parse settings from JSON; missing fields take their defaults.
    pub fn from_json(text: &str) -> SimResult<Self> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = EngineSettings::default();
        assert_eq!(s.max_settle_iterations, 1000);
        assert_eq!(s.integrator.atol, 1e-5);
        s.validate().unwrap();
    }

    #[test]
    fn json_overrides_nested_fields() {
        let s = EngineSettings::from_json(
            r#"{"integrator": {"rtol": 1e-9, "max_order": 2}, "max_settle_iterations": 5}"#,
        )
        .unwrap();
        assert_eq!(s.integrator.rtol, 1e-9);
        assert_eq!(s.integrator.max_order, 2);
        assert_eq!(s.integrator.atol, 1e-5);
        assert_eq!(s.max_settle_iterations, 5);
    }

    #[test]
    fn json_validation_applies() {
        assert!(EngineSettings::from_json(r#"{"max_settle_iterations": 0}"#).is_err());
        assert!(EngineSettings::from_json(r#"{"integrator": {"atol": -1}}"#).is_err());
    }
}
