use std::collections::BTreeMap;

use parityguard_core::{Row, ValidationStatus, accuracy, determine_status, ratio};
use parityguard_mapping::MappingRegistry;
use serde_json::Value;

/// Weight of the row-count ratio in a row-set accuracy; fields get the rest.
pub const COUNT_WEIGHT: f64 = 0.3;
/// Weight of the field-match ratio in a row-set accuracy.
pub const FIELD_WEIGHT: f64 = 0.7;

/// Counts gathered while comparing two result sets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowSetComparison {
    pub legacy_count: usize,
    pub new_count: usize,
    pub matched_rows: usize,
    pub field_comparisons: usize,
    pub field_matches: usize,
}

impl RowSetComparison {
    pub fn count_ratio(&self) -> f64 {
        ratio(self.legacy_count, self.new_count)
    }

    /// Share of compared fields that matched; zero when nothing was compared.
    pub fn field_ratio(&self) -> f64 {
        if self.field_comparisons == 0 {
            0.0
        } else {
            self.field_matches as f64 / self.field_comparisons as f64
        }
    }

    pub fn accuracy(&self) -> f64 {
        COUNT_WEIGHT * self.count_ratio() + FIELD_WEIGHT * self.field_ratio()
    }
}

/// Joins legacy and new rows on identifying fields and compares values.
pub struct RowComparator<'a> {
    registry: &'a MappingRegistry,
    attribute_mappings: &'a BTreeMap<String, String>,
    key_fields: &'a [String],
    ignore_attributes: &'a [String],
    tolerance: f64,
}

impl<'a> RowComparator<'a> {
    pub fn new(
        registry: &'a MappingRegistry,
        attribute_mappings: &'a BTreeMap<String, String>,
        key_fields: &'a [String],
        ignore_attributes: &'a [String],
        tolerance: f64,
    ) -> Self {
        Self {
            registry,
            attribute_mappings,
            key_fields,
            ignore_attributes,
            tolerance,
        }
    }

    /// Compare two result sets. The outcome does not depend on row order.
    pub fn compare(&self, legacy: &[Row], new: &[Row]) -> RowSetComparison {
        let legacy_groups = group_rows(legacy, |row| self.legacy_key(row));
        let new_groups = group_rows(new, |row| self.new_key(row));

        let mut comparison = RowSetComparison {
            legacy_count: legacy.len(),
            new_count: new.len(),
            matched_rows: 0,
            field_comparisons: 0,
            field_matches: 0,
        };

        for (key, legacy_rows) in &legacy_groups {
            let Some(new_rows) = new_groups.get(key) else {
                continue;
            };
            for (legacy_row, new_row) in legacy_rows.iter().zip(new_rows.iter()) {
                comparison.matched_rows += 1;
                let (matches, comparisons) = self.compare_rows(legacy_row, new_row);
                comparison.field_matches += matches;
                comparison.field_comparisons += comparisons;
            }
        }

        comparison
    }

    fn mapped_name<'n>(&'n self, legacy_field: &'n str) -> &'n str {
        self.attribute_mappings
            .get(legacy_field)
            .map(String::as_str)
            .unwrap_or(legacy_field)
    }

    fn legacy_key(&self, row: &Row) -> String {
        self.key_fields
            .iter()
            .find_map(|field| {
                row.get(field)
                    .filter(|value| !value.is_null())
                    .map(|value| format!("{field}={}", self.key_value(value)))
            })
            .unwrap_or_default()
    }

    fn new_key(&self, row: &Row) -> String {
        self.key_fields
            .iter()
            .find_map(|field| {
                row.get(self.mapped_name(field))
                    .filter(|value| !value.is_null())
                    .map(|value| format!("{field}={}", self.key_value(value)))
            })
            .unwrap_or_default()
    }

    fn key_value(&self, value: &Value) -> String {
        match as_number(value) {
            Some(number) => number.to_string(),
            None => self.as_text(value),
        }
    }

    fn compare_rows(&self, legacy: &Row, new: &Row) -> (usize, usize) {
        let mut matches = 0;
        let mut comparisons = 0;
        for (field, legacy_value) in legacy {
            if self.ignore_attributes.iter().any(|ignored| ignored == field) {
                continue;
            }
            let Some(new_value) = new.get(self.mapped_name(field)) else {
                continue;
            };
            comparisons += 1;
            if self.values_match(legacy_value, new_value) {
                matches += 1;
            }
        }
        (matches, comparisons)
    }

    /// Numbers (including numeric strings) use the tolerance rule; anything
    /// else compares as normalized text.
    pub fn values_match(&self, legacy: &Value, new: &Value) -> bool {
        if let (Some(left), Some(right)) = (as_number(legacy), as_number(new)) {
            return determine_status(accuracy(left, right), self.tolerance) == ValidationStatus::Passed;
        }
        self.as_text(legacy) == self.as_text(new)
    }

    fn as_text(&self, value: &Value) -> String {
        match value {
            Value::Null => self.registry.normalize_special("<nil>").to_string(),
            Value::String(text) => self.registry.normalize_special(text).to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Number(number) => number.to_string(),
            other => other.to_string(),
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Group rows by key; rows sharing a key are ordered by their canonical JSON.
fn group_rows<'r>(rows: &'r [Row], key: impl Fn(&Row) -> String) -> BTreeMap<String, Vec<&'r Row>> {
    let mut groups: BTreeMap<String, Vec<(String, &Row)>> = BTreeMap::new();
    for row in rows {
        let canonical = serde_json::to_string(row).unwrap_or_default();
        groups.entry(key(row)).or_default().push((canonical, row));
    }
    groups
        .into_iter()
        .map(|(key, mut entries)| {
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            (key, entries.into_iter().map(|(_, row)| row).collect())
        })
        .collect()
}
