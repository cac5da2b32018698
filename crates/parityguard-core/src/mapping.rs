use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of metric emitted by the new pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Gauge,
    Counter,
    Histogram,
    Summary,
}

impl Default for MetricType {
    fn default() -> Self {
        Self::Gauge
    }
}

/// How a legacy metric maps onto the new pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricMapping {
    /// Legacy metric name; filled from the document key when omitted.
    #[serde(default)]
    pub legacy_name: String,
    pub new_name: String,
    #[serde(default, rename = "type")]
    pub metric_type: MetricType,
    /// Name of a registered transformation applied to the new value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<String>,
    /// Parameters handed to the transformation (e.g. `{"interval": 60}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Optional derived-metric expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeMapping>,
}

/// Attribute-level rename and value handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AttributeMapping {
    #[serde(default)]
    pub legacy_name: String,
    pub new_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub required: bool,
}

/// How a legacy event type is queried in the new pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EventMapping {
    #[serde(default)]
    pub legacy_event_type: String,
    /// Query source that replaces the legacy event type (e.g. `Metric`).
    pub new_source: String,
    /// Filter predicate injected into translated queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional_fields: Vec<String>,
    /// Event-specific attribute renames, merged over the global table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeMapping>,
    /// Identifying fields used to join legacy and new rows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_fields: Vec<String>,
}
