use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parityguard_core::{Error, Result, Row};
use serde::{Deserialize, Serialize};

use crate::source::DataSource;

/// Recorded query results for one pipeline.
///
/// Queries are matched on whitespace-normalized text. Metric values are
/// looked up as `name{k=v,...}` first, then by bare name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayFixture {
    #[serde(default)]
    pub queries: BTreeMap<String, Vec<Row>>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

/// Data source answering from a [`ReplayFixture`].
#[derive(Debug, Clone)]
pub struct ReplaySource {
    name: String,
    queries: BTreeMap<String, Vec<Row>>,
    metrics: BTreeMap<String, f64>,
    delay: Option<Duration>,
}

impl ReplaySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_fixture(name, ReplayFixture::default())
    }

    pub fn from_fixture(name: impl Into<String>, fixture: ReplayFixture) -> Self {
        Self {
            name: name.into(),
            queries: fixture
                .queries
                .into_iter()
                .map(|(query, rows)| (normalize_query(&query), rows))
                .collect(),
            metrics: fixture.metrics,
            delay: None,
        }
    }

    /// Load a JSON fixture from disk.
    pub fn from_path(name: impl Into<String>, path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|err| Error::DataSource(format!("failed to read {}: {err}", path.display())))?;
        let fixture: ReplayFixture = serde_json::from_str(&contents)
            .map_err(|err| Error::DataSource(format!("invalid fixture {}: {err}", path.display())))?;
        Ok(Self::from_fixture(name, fixture))
    }

    pub fn with_query(mut self, query: &str, rows: Vec<Row>) -> Self {
        self.queries.insert(normalize_query(query), rows);
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    /// Delay every answer, to exercise timeouts and cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DataSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, query: &str) -> Result<Vec<Row>> {
        self.pause().await;
        self.queries
            .get(&normalize_query(query))
            .cloned()
            .ok_or_else(|| Error::DataSource(format!("{}: no recorded result for query: {query}", self.name)))
    }

    async fn metric_value(&self, metric: &str, filters: &BTreeMap<String, String>) -> Result<f64> {
        self.pause().await;
        let keyed = metric_key(metric, filters);
        self.metrics
            .get(&keyed)
            .or_else(|| self.metrics.get(metric))
            .copied()
            .ok_or_else(|| Error::DataSource(format!("{}: no recorded value for metric {keyed}", self.name)))
    }
}

/// Collapse runs of whitespace so formatting differences do not matter.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `name{k=v,...}` with filters in key order; bare name without filters.
pub fn metric_key(metric: &str, filters: &BTreeMap<String, String>) -> String {
    if filters.is_empty() {
        return metric.to_string();
    }
    let rendered = filters
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("{metric}{{{rendered}}}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn matches_queries_ignoring_whitespace() {
        let source = ReplaySource::new("legacy").with_query(
            "SELECT count(*)   FROM PostgresSlowQueries",
            vec![serde_json::from_value(json!({"count": 3})).expect("row")],
        );
        let rows = source
            .query("SELECT count(*)\n FROM PostgresSlowQueries")
            .await
            .expect("rows");
        assert_eq!(rows.len(), 1);
        assert!(source.query("SELECT 1 FROM Other").await.is_err());
    }

    #[tokio::test]
    async fn metric_lookup_prefers_filtered_key() {
        let source = ReplaySource::new("new")
            .with_metric("postgresql.backends", 10.0)
            .with_metric("postgresql.backends{db.name=app}", 4.0);
        let mut filters = BTreeMap::new();
        assert_eq!(source.metric_value("postgresql.backends", &filters).await.expect("bare"), 10.0);
        filters.insert("db.name".to_string(), "app".to_string());
        assert_eq!(source.metric_value("postgresql.backends", &filters).await.expect("keyed"), 4.0);
        filters.insert("db.name".to_string(), "other".to_string());
        assert_eq!(source.metric_value("postgresql.backends", &filters).await.expect("fallback"), 10.0);
    }
}
