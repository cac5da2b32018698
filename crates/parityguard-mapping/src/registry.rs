use std::collections::BTreeMap;
use std::path::Path;

use parityguard_core::{EventMapping, MetricMapping, Result as CoreResult};
use serde_json::Value;

use crate::document::{MappingDocument, load_document};
use crate::errors::{MappingError, Result};
use crate::transforms::TransformRegistry;

/// Sentinel values reported by the legacy pipeline and their comparable form.
pub const DEFAULT_SPECIAL_VALUES: [(&str, &str); 2] = [
    ("<nil>", ""),
    ("<insufficient privilege>", "[REDACTED]"),
];

/// Mapping found for a legacy metric name or event type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    Metric(&'a MetricMapping),
    Event(&'a EventMapping),
}

/// Read-only lookup of legacy names against the new pipeline.
///
/// Built once from a validated document, then shared behind an `Arc`.
#[derive(Debug)]
pub struct MappingRegistry {
    metrics: BTreeMap<String, MetricMapping>,
    events: BTreeMap<String, EventMapping>,
    attribute_mappings: BTreeMap<String, String>,
    special_values: BTreeMap<String, String>,
    transforms: TransformRegistry,
}

impl MappingRegistry {
    /// Load a mapping document with the built-in transformations.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, TransformRegistry::with_builtins())
    }

    /// Load a mapping document with a caller-supplied transformation set.
    pub fn load_with(path: &Path, transforms: TransformRegistry) -> Result<Self> {
        let document = load_document(path, &transforms)?;
        let registry = Self::from_document(document, transforms)?;
        tracing::info!(
            event = "mapping_registry_loaded",
            path = %path.display(),
            metrics = registry.metrics.len(),
            events = registry.events.len()
        );
        Ok(registry)
    }

    /// Build a registry from a document, re-checking every reference.
    pub fn from_document(document: MappingDocument, transforms: TransformRegistry) -> Result<Self> {
        let report = crate::document::check_references(&document, &transforms);
        if !report.is_ok() {
            return Err(MappingError::Invalid(report));
        }

        let mut special_values = default_special_values();
        special_values.extend(document.special_values);

        Ok(Self {
            metrics: document.metrics,
            events: document.events,
            attribute_mappings: document.attribute_mappings,
            special_values,
            transforms,
        })
    }

    /// Registry with no mappings and the built-in transformations.
    pub fn empty() -> Self {
        Self {
            metrics: BTreeMap::new(),
            events: BTreeMap::new(),
            attribute_mappings: BTreeMap::new(),
            special_values: default_special_values(),
            transforms: TransformRegistry::with_builtins(),
        }
    }

    /// Look a name up as a metric first, then as an event type.
    pub fn resolve(&self, name: &str) -> Option<Resolved<'_>> {
        self.resolve_metric(name)
            .map(Resolved::Metric)
            .or_else(|| self.resolve_event(name).map(Resolved::Event))
    }

    pub fn resolve_metric(&self, name: &str) -> Option<&MetricMapping> {
        self.metrics.get(name)
    }

    pub fn resolve_event(&self, event_type: &str) -> Option<&EventMapping> {
        self.events.get(event_type)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &MetricMapping> {
        self.metrics.values()
    }

    pub fn events(&self) -> impl Iterator<Item = &EventMapping> {
        self.events.values()
    }

    /// Apply a registered transformation.
    pub fn transform(&self, name: &str, value: Value, params: Option<&Value>) -> CoreResult<Value> {
        self.transforms.apply(name, value, params)
    }

    /// Legacy -> new attribute names for an event type.
    ///
    /// Event-specific mappings take precedence over the global table.
    pub fn attribute_mappings_for_event(&self, event_type: &str) -> BTreeMap<String, String> {
        let mut merged = self.attribute_mappings.clone();
        if let Some(event) = self.events.get(event_type) {
            for (key, attribute) in &event.attributes {
                merged.insert(key.clone(), attribute.new_name.clone());
            }
        }
        merged
    }

    /// Global legacy -> new attribute names.
    pub fn global_attribute_mappings(&self) -> &BTreeMap<String, String> {
        &self.attribute_mappings
    }

    /// Replace a sentinel value with its comparable form.
    pub fn normalize_special<'a>(&'a self, value: &'a str) -> &'a str {
        self.special_values
            .get(value)
            .map(String::as_str)
            .unwrap_or(value)
    }
}

fn default_special_values() -> BTreeMap<String, String> {
    DEFAULT_SPECIAL_VALUES
        .iter()
        .map(|(legacy, new)| (legacy.to_string(), new.to_string()))
        .collect()
}
