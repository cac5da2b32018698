use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use jsonschema::JSONSchema;
use parityguard_core::{AttributeMapping, EventMapping, MetricMapping};
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use schemars::schema_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DocumentIssue, DocumentReport, MappingError, Result};
use crate::transforms::TransformRegistry;

/// Declarative mapping between the legacy and the new pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MappingDocument {
    /// Metric mappings keyed by legacy metric name.
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricMapping>,
    /// Event mappings keyed by legacy event type.
    #[serde(default)]
    pub events: BTreeMap<String, EventMapping>,
    /// Global legacy -> new attribute renames.
    #[serde(default)]
    pub attribute_mappings: BTreeMap<String, String>,
    /// Replacements applied to sentinel string values before comparison.
    #[serde(default)]
    pub special_values: BTreeMap<String, String>,
}

/// Source format of a mapping document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Toml,
}

impl DocumentFormat {
    /// Pick the format from a file extension; anything but `.toml` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

/// JSON Schema for mapping documents.
pub fn mapping_document_schema() -> RootSchema {
    schema_for!(MappingDocument)
}

/// Read, structurally validate and semantically check a mapping document.
pub fn load_document(path: &Path, transforms: &TransformRegistry) -> Result<MappingDocument> {
    let contents = fs::read_to_string(path)?;
    parse_document(&contents, DocumentFormat::from_path(path), transforms)
}

/// Parse a mapping document from text.
pub fn parse_document(
    contents: &str,
    format: DocumentFormat,
    transforms: &TransformRegistry,
) -> Result<MappingDocument> {
    let raw: Value = match format {
        DocumentFormat::Json => serde_json::from_str(contents)?,
        DocumentFormat::Toml => toml::from_str(contents)?,
    };

    let structural = validate_document_json(&raw)?;
    if !structural.is_ok() {
        return Err(MappingError::Invalid(structural));
    }

    let mut document: MappingDocument = serde_json::from_value(raw).map_err(|err| {
        let mut report = DocumentReport::default();
        report.push_error(DocumentIssue::error("invalid_document", "/", err.to_string()));
        MappingError::Invalid(report)
    })?;
    document.fill_legacy_names();

    let semantic = check_references(&document, transforms);
    if !semantic.is_ok() {
        return Err(MappingError::Invalid(semantic));
    }
    for warning in &semantic.warnings {
        tracing::warn!(
            event = "mapping_document_warning",
            code = %warning.code,
            path = %warning.path,
            message = %warning.message
        );
    }

    Ok(document)
}

/// Validate a raw document against the generated schema.
pub fn validate_document_json(document: &Value) -> Result<DocumentReport> {
    let schema = serde_json::to_value(mapping_document_schema())?;
    let compiled =
        JSONSchema::compile(&schema).map_err(|err| MappingError::Schema(err.to_string()))?;

    let mut report = DocumentReport::default();
    if let Err(errors) = compiled.validate(document) {
        for error in errors {
            let path = normalized_json_pointer(&error.instance_path.to_string());
            report.push_error(DocumentIssue::error("schema_violation", path, error.to_string()));
        }
    }
    Ok(report)
}

/// Check names and transformation references of a typed document.
pub fn check_references(document: &MappingDocument, transforms: &TransformRegistry) -> DocumentReport {
    let mut report = DocumentReport::default();

    for (key, metric) in &document.metrics {
        let base = format!("/metrics/{}", escape_pointer(key));
        if metric.new_name.trim().is_empty() {
            report.push_error(
                DocumentIssue::error(
                    "empty_new_name",
                    format!("{base}/new_name"),
                    format!("metric '{key}' has an empty new_name"),
                )
                .with_hint("set new_name to the metric emitted by the new pipeline"),
            );
        }
        if metric.legacy_name != *key {
            report.push_warning(DocumentIssue::new(
                crate::errors::IssueSeverity::Warning,
                "legacy_name_mismatch",
                format!("{base}/legacy_name"),
                format!(
                    "legacy_name '{}' differs from its key '{key}'; the key is used for lookup",
                    metric.legacy_name
                ),
                None,
            ));
        }
        check_transformation(
            metric.transformation.as_deref(),
            &format!("{base}/transformation"),
            transforms,
            &mut report,
        );
        check_attributes(&metric.attributes, &format!("{base}/attributes"), transforms, &mut report);
    }

    for (key, event) in &document.events {
        let base = format!("/events/{}", escape_pointer(key));
        if event.new_source.trim().is_empty() {
            report.push_error(DocumentIssue::error(
                "empty_new_source",
                format!("{base}/new_source"),
                format!("event '{key}' has an empty new_source"),
            ));
        }
        check_attributes(&event.attributes, &format!("{base}/attributes"), transforms, &mut report);
    }

    for (legacy, new) in &document.attribute_mappings {
        if new.trim().is_empty() {
            report.push_error(DocumentIssue::error(
                "empty_new_name",
                format!("/attribute_mappings/{}", escape_pointer(legacy)),
                format!("attribute '{legacy}' maps to an empty name"),
            ));
        }
    }

    report
}

fn check_attributes(
    attributes: &BTreeMap<String, AttributeMapping>,
    base: &str,
    transforms: &TransformRegistry,
    report: &mut DocumentReport,
) {
    for (key, attribute) in attributes {
        let path = format!("{base}/{}", escape_pointer(key));
        if attribute.new_name.trim().is_empty() {
            report.push_error(DocumentIssue::error(
                "empty_new_name",
                format!("{path}/new_name"),
                format!("attribute '{key}' has an empty new_name"),
            ));
        }
        check_transformation(
            attribute.transformation.as_deref(),
            &format!("{path}/transformation"),
            transforms,
            report,
        );
    }
}

fn check_transformation(
    name: Option<&str>,
    path: &str,
    transforms: &TransformRegistry,
    report: &mut DocumentReport,
) {
    let Some(name) = name else {
        return;
    };
    if !transforms.contains(name) {
        let known = transforms.names().collect::<Vec<_>>().join(", ");
        report.push_error(
            DocumentIssue::error(
                "unknown_transformation",
                path,
                format!("transformation '{name}' is not registered"),
            )
            .with_hint(format!("use one of: {known}")),
        );
    }
}

impl MappingDocument {
    fn fill_legacy_names(&mut self) {
        for (key, metric) in &mut self.metrics {
            if metric.legacy_name.is_empty() {
                metric.legacy_name = key.clone();
            }
            fill_attribute_names(&mut metric.attributes);
        }
        for (key, event) in &mut self.events {
            if event.legacy_event_type.is_empty() {
                event.legacy_event_type = key.clone();
            }
            fill_attribute_names(&mut event.attributes);
        }
    }
}

fn fill_attribute_names(attributes: &mut BTreeMap<String, AttributeMapping>) {
    for (key, attribute) in attributes {
        if attribute.legacy_name.is_empty() {
            attribute.legacy_name = key.clone();
        }
    }
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn normalized_json_pointer(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}
