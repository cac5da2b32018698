use std::collections::BTreeMap;

use async_trait::async_trait;
use parityguard_core::{Result, Row};

/// Query client for one telemetry pipeline.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Human-readable name used in logs (e.g. `legacy`).
    fn name(&self) -> &str;

    /// Run a query and return its result rows.
    async fn query(&self, query: &str) -> Result<Vec<Row>>;

    /// Current value of a single metric under the given filters.
    async fn metric_value(&self, metric: &str, filters: &BTreeMap<String, String>) -> Result<f64>;
}
