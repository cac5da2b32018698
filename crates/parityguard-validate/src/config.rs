use std::collections::BTreeMap;
use std::time::Duration;

use parityguard_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Identifying fields tried, in order, when joining result rows.
pub const DEFAULT_KEY_FIELDS: [&str; 4] = ["query_id", "database_name", "wait_event_name", "blocked_pid"];

/// Comparison settings for the parity validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParityConfig {
    pub default_tolerance: f64,
    /// Per-metric or per-widget tolerance overrides.
    pub metric_tolerances: BTreeMap<String, f64>,
    /// Window appended as `SINCE <window> ago` to translated queries.
    pub time_window: String,
    /// Legacy fields never compared.
    pub ignore_attributes: Vec<String>,
    /// Fallback legacy -> new attribute renames.
    pub attribute_mappings: BTreeMap<String, String>,
    pub key_fields: Vec<String>,
    pub key_fields_by_event: BTreeMap<String, Vec<String>>,
    pub query_timeout_secs: u64,
}

impl Default for ParityConfig {
    fn default() -> Self {
        Self {
            default_tolerance: 0.05,
            metric_tolerances: BTreeMap::new(),
            time_window: "30 minutes".to_string(),
            ignore_attributes: Vec::new(),
            attribute_mappings: BTreeMap::new(),
            key_fields: DEFAULT_KEY_FIELDS.iter().map(|f| f.to_string()).collect(),
            key_fields_by_event: BTreeMap::new(),
            query_timeout_secs: 30,
        }
    }
}

impl ParityConfig {
    /// Tolerance for a metric or widget, falling back to the default.
    pub fn tolerance_for(&self, name: &str) -> f64 {
        self.metric_tolerances
            .get(name)
            .copied()
            .unwrap_or(self.default_tolerance)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs.max(1))
    }

    /// Reject tolerances outside `(0, 1)` and empty windows.
    pub fn validate(&self) -> Result<()> {
        check_tolerance("default_tolerance", self.default_tolerance)?;
        for (name, tolerance) in &self.metric_tolerances {
            check_tolerance(&format!("metric_tolerances.{name}"), *tolerance)?;
        }
        if self.time_window.trim().is_empty() {
            return Err(Error::Config("time_window must not be empty".to_string()));
        }
        if self.key_fields.is_empty() {
            return Err(Error::Config("key_fields must not be empty".to_string()));
        }
        Ok(())
    }
}

fn check_tolerance(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be within (0, 1), got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_metric_tolerance_overrides_default() {
        let mut config = ParityConfig::default();
        config.metric_tolerances.insert("db.commits".to_string(), 0.1);
        assert_eq!(config.tolerance_for("db.commits"), 0.1);
        assert_eq!(config.tolerance_for("db.rollbacks"), 0.05);
    }

    #[test]
    fn rejects_out_of_range_tolerance() {
        let mut config = ParityConfig::default();
        assert!(config.validate().is_ok());
        config.default_tolerance = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        config.default_tolerance = 0.05;
        config.metric_tolerances.insert("x".to_string(), 0.0);
        assert!(config.validate().is_err());
    }
}
