use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use parityguard_core::{
    Error, IssueSeverity, IssueType, Result, Row, ValidationIssue, ValidationResult, ValidationStatus,
    accuracy, determine_status,
};
use parityguard_dashboard::Widget;
use parityguard_mapping::MappingRegistry;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::compare::RowComparator;
use crate::config::ParityConfig;
use crate::source::DataSource;
use crate::translate::{TranslatedQuery, translate_query};

/// Marker stored as `skip_reason` for widgets not run because of cancellation.
pub const CANCELLED_REASON: &str = "cancelled";

/// Compares the legacy and the new pipeline for widgets and metrics.
pub struct ParityValidator {
    legacy: Arc<dyn DataSource>,
    new: Arc<dyn DataSource>,
    registry: Arc<MappingRegistry>,
    config: ParityConfig,
}

impl ParityValidator {
    pub fn new(
        legacy: Arc<dyn DataSource>,
        new: Arc<dyn DataSource>,
        registry: Arc<MappingRegistry>,
        config: ParityConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            legacy,
            new,
            registry,
            config,
        })
    }

    pub fn config(&self) -> &ParityConfig {
        &self.config
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    /// Attribute renames for an event: registry mappings over configured ones.
    pub fn attribute_mappings(&self, event_type: &str) -> BTreeMap<String, String> {
        let mut mappings = self.config.attribute_mappings.clone();
        mappings.extend(self.registry.attribute_mappings_for_event(event_type));
        mappings
    }

    /// Identifying fields for an event, most specific source first.
    pub fn key_fields(&self, event_type: &str) -> Vec<String> {
        if let Some(event) = self.registry.resolve_event(event_type) {
            if !event.key_fields.is_empty() {
                return event.key_fields.clone();
            }
        }
        self.config
            .key_fields_by_event
            .get(event_type)
            .filter(|fields| !fields.is_empty())
            .cloned()
            .unwrap_or_else(|| self.config.key_fields.clone())
    }

    pub fn translate(&self, query: &str) -> Result<TranslatedQuery> {
        let event_type = crate::translate::event_type_of(query).unwrap_or_default();
        let mappings = self.attribute_mappings(&event_type);
        translate_query(query, &self.registry, &mappings, &self.config.time_window)
    }

    /// Run a widget query against both pipelines and compare the row sets.
    pub async fn validate_widget(
        &self,
        cancel: &CancellationToken,
        widget: &Widget,
    ) -> Result<ValidationResult> {
        let translated = self.translate(&widget.query.raw_query)?;

        let legacy_rows = self
            .guarded(cancel, self.legacy.name(), self.legacy.query(&widget.query.raw_query))
            .await?;
        let new_rows = self
            .guarded(cancel, self.new.name(), self.new.query(&translated.query))
            .await?;

        Ok(self.compare_row_sets(&widget.title, &translated, &legacy_rows, &new_rows))
    }

    /// Compare one mapped metric between both pipelines.
    pub async fn validate_metric(
        &self,
        cancel: &CancellationToken,
        metric: &str,
        filters: &BTreeMap<String, String>,
    ) -> Result<ValidationResult> {
        let mapping = self
            .registry
            .resolve_metric(metric)
            .ok_or_else(|| Error::Translation(format!("no mapping found for metric '{metric}'")))?;

        let legacy_value = self
            .guarded(cancel, self.legacy.name(), self.legacy.metric_value(metric, filters))
            .await?;

        let new_filters: BTreeMap<String, String> = filters
            .iter()
            .map(|(key, value)| {
                let mapped = mapping
                    .attributes
                    .get(key)
                    .map(|attribute| attribute.new_name.clone())
                    .or_else(|| self.registry.global_attribute_mappings().get(key).cloned())
                    .unwrap_or_else(|| key.clone());
                (mapped, value.clone())
            })
            .collect();
        let raw_new_value = self
            .guarded(
                cancel,
                self.new.name(),
                self.new.metric_value(&mapping.new_name, &new_filters),
            )
            .await?;

        let new_value = match mapping.transformation.as_deref() {
            Some(name) => {
                let transformed =
                    self.registry
                        .transform(name, Value::from(raw_new_value), mapping.params.as_ref())?;
                transformed.as_f64().ok_or_else(|| {
                    Error::Transform(format!("transformation '{name}' did not yield a number for {metric}"))
                })?
            }
            None => raw_new_value,
        };

        let tolerance = self.config.tolerance_for(metric);
        let score = accuracy(legacy_value, new_value);
        let status = determine_status(score, tolerance);

        let mut issues = Vec::new();
        if status != ValidationStatus::Passed {
            let difference = (legacy_value - new_value).abs();
            let severity = if status == ValidationStatus::Failed {
                IssueSeverity::High
            } else {
                IssueSeverity::Medium
            };
            let mut issue = ValidationIssue::new(
                IssueType::ValueMismatch,
                severity,
                format!(
                    "value mismatch: legacy={legacy_value}, new={new_value}, accuracy={:.2}%",
                    score * 100.0
                ),
            )
            .with_detail("difference", difference)
            .with_detail("tolerance", tolerance)
            .with_suggestion(format!(
                "check the unit and transformation of '{}' against '{metric}'",
                mapping.new_name
            ));
            if legacy_value != 0.0 {
                issue = issue.with_detail("percentage", difference / legacy_value.abs() * 100.0);
            }
            issues.push(issue);
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("mapping".to_string(), Value::from(mapping.new_name.clone()));
        metadata.insert(
            "transformation".to_string(),
            Value::from(mapping.transformation.clone().unwrap_or_else(|| "direct".to_string())),
        );
        metadata.insert("tolerance".to_string(), Value::from(tolerance));

        tracing::info!(
            event = "metric_validated",
            metric = %metric,
            status = %status,
            accuracy = score
        );

        Ok(ValidationResult {
            timestamp: Utc::now(),
            metric_name: metric.to_string(),
            legacy_value: Value::from(legacy_value),
            new_value: Value::from(new_value),
            accuracy: score,
            status,
            issues,
            metadata,
        })
    }

    /// Validate widgets in order. Errors become failed results; once the
    /// token is cancelled the remaining widgets are skipped.
    pub async fn validate_all(&self, cancel: &CancellationToken, widgets: &[Widget]) -> Vec<ValidationResult> {
        let mut results = Vec::with_capacity(widgets.len());
        for widget in widgets {
            if cancel.is_cancelled() {
                results.push(ValidationResult::skipped(&widget.title, CANCELLED_REASON));
                continue;
            }
            let result = match self.validate_widget(cancel, widget).await {
                Ok(result) => result,
                Err(Error::Cancelled) => ValidationResult::skipped(&widget.title, CANCELLED_REASON),
                Err(err) => {
                    tracing::warn!(
                        event = "widget_validation_failed",
                        widget = %widget.title,
                        error = %err
                    );
                    ValidationResult::failure(&widget.title, err.to_string())
                }
            };
            tracing::info!(
                event = "widget_validated",
                widget = %widget.title,
                status = %result.status,
                accuracy = result.accuracy
            );
            results.push(result);
        }
        results
    }

    /// Validate every mapped metric without filters.
    pub async fn validate_all_metrics(&self, cancel: &CancellationToken) -> Vec<ValidationResult> {
        let names: Vec<String> = self
            .registry
            .metrics()
            .map(|mapping| mapping.legacy_name.clone())
            .collect();
        let filters = BTreeMap::new();
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            if cancel.is_cancelled() {
                results.push(ValidationResult::skipped(&name, CANCELLED_REASON));
                continue;
            }
            let result = match self.validate_metric(cancel, &name, &filters).await {
                Ok(result) => result,
                Err(Error::Cancelled) => ValidationResult::skipped(&name, CANCELLED_REASON),
                Err(err) => ValidationResult::failure(&name, err.to_string()),
            };
            results.push(result);
        }
        results
    }

    fn compare_row_sets(
        &self,
        title: &str,
        translated: &TranslatedQuery,
        legacy_rows: &[Row],
        new_rows: &[Row],
    ) -> ValidationResult {
        let mut metadata = BTreeMap::new();
        metadata.insert("legacy_count".to_string(), Value::from(legacy_rows.len()));
        metadata.insert("new_count".to_string(), Value::from(new_rows.len()));
        metadata.insert("translated_query".to_string(), Value::from(translated.query.clone()));

        let mut result = ValidationResult {
            timestamp: Utc::now(),
            metric_name: title.to_string(),
            legacy_value: Value::from(legacy_rows.len()),
            new_value: Value::from(new_rows.len()),
            accuracy: 1.0,
            status: ValidationStatus::Skipped,
            issues: Vec::new(),
            metadata,
        };

        if legacy_rows.is_empty() && new_rows.is_empty() {
            result
                .metadata
                .insert("skip_reason".to_string(), Value::from("no data in either pipeline"));
            return result;
        }

        if legacy_rows.is_empty() || new_rows.is_empty() {
            result.accuracy = 0.0;
            result.status = ValidationStatus::Failed;
            result.issues.push(
                ValidationIssue::new(
                    IssueType::MissingData,
                    IssueSeverity::Critical,
                    format!(
                        "missing data: legacy={} rows, new={} rows",
                        legacy_rows.len(),
                        new_rows.len()
                    ),
                )
                .with_suggestion(format!(
                    "verify the new pipeline collects '{}'",
                    translated.event_type
                )),
            );
            return result;
        }

        let tolerance = self.config.tolerance_for(title);
        let mappings = self.attribute_mappings(&translated.event_type);
        let key_fields = self.key_fields(&translated.event_type);
        let comparator = RowComparator::new(
            &self.registry,
            &mappings,
            &key_fields,
            &self.config.ignore_attributes,
            tolerance,
        );
        let comparison = comparator.compare(legacy_rows, new_rows);

        result.accuracy = comparison.accuracy();
        result.status = determine_status(result.accuracy, tolerance);
        result
            .metadata
            .insert("matched_rows".to_string(), Value::from(comparison.matched_rows));
        result
            .metadata
            .insert("field_comparisons".to_string(), Value::from(comparison.field_comparisons));
        result
            .metadata
            .insert("field_matches".to_string(), Value::from(comparison.field_matches));
        result.metadata.insert("tolerance".to_string(), Value::from(tolerance));

        if comparison.count_ratio() < 0.9 {
            result.issues.push(
                ValidationIssue::new(
                    IssueType::CardinalityHigh,
                    IssueSeverity::Medium,
                    format!(
                        "row count mismatch: legacy={}, new={}",
                        legacy_rows.len(),
                        new_rows.len()
                    ),
                )
                .with_detail("count_ratio", comparison.count_ratio()),
            );
        }

        let field_status = determine_status(comparison.field_ratio(), tolerance);
        if field_status != ValidationStatus::Passed {
            let severity = if field_status == ValidationStatus::Failed {
                IssueSeverity::High
            } else {
                IssueSeverity::Medium
            };
            result.issues.push(
                ValidationIssue::new(
                    IssueType::ValueMismatch,
                    severity,
                    format!(
                        "{} of {} compared fields matched",
                        comparison.field_matches, comparison.field_comparisons
                    ),
                )
                .with_detail("field_ratio", comparison.field_ratio())
                .with_suggestion(format!(
                    "review attribute mappings for '{}'",
                    translated.event_type
                )),
            );
        }

        result
    }

    /// Race a data-source call against the query timeout and cancellation.
    async fn guarded<T>(
        &self,
        cancel: &CancellationToken,
        source: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = self.config.query_timeout();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            outcome = tokio::time::timeout(timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(Error::DataSource(format!(
                    "{source} query timed out after {}s",
                    timeout.as_secs()
                ))),
            },
        }
    }
}
