use std::fs;

use parityguard_mapping::{MappingError, MappingRegistry, Resolved};
use serde_json::json;

fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write document");
    path
}

#[test]
fn loads_json_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write(
        &dir,
        "mappings.json",
        r#"{
            "metrics": {
                "db.commits": {
                    "new_name": "postgresql.commits",
                    "type": "counter",
                    "transformation": "rate_per_second",
                    "params": {"interval": 60}
                }
            },
            "events": {
                "PostgresWaitEvents": {
                    "new_source": "Metric",
                    "new_filter": "metricName = 'postgresql.wait_events'",
                    "key_fields": ["wait_event_name"]
                }
            },
            "attribute_mappings": {"database_name": "db.name"}
        }"#,
    );

    let registry = MappingRegistry::load(&path).expect("load registry");
    let Some(Resolved::Metric(metric)) = registry.resolve("db.commits") else {
        panic!("metric mapping missing");
    };
    assert_eq!(metric.new_name, "postgresql.commits");
    assert_eq!(metric.legacy_name, "db.commits");

    let converted = registry
        .transform("rate_per_second", json!(600.0), metric.params.as_ref())
        .expect("transform");
    assert_eq!(converted, json!(10.0));

    let event = registry.resolve_event("PostgresWaitEvents").expect("event");
    assert_eq!(event.key_fields, vec!["wait_event_name".to_string()]);
}

#[test]
fn loads_toml_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write(
        &dir,
        "mappings.toml",
        r#"
[attribute_mappings]
query_id = "db.query.id"

[events.PostgresSlowQueries]
new_source = "Metric"
new_filter = "metricName LIKE 'postgresql.slow%'"

[events.PostgresSlowQueries.attributes.query_text]
new_name = "db.query.text"
transformation = "anonymize"
"#,
    );

    let registry = MappingRegistry::load(&path).expect("load registry");
    let mappings = registry.attribute_mappings_for_event("PostgresSlowQueries");
    assert_eq!(mappings["query_id"], "db.query.id");
    assert_eq!(mappings["query_text"], "db.query.text");
}

#[test]
fn empty_new_name_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write(&dir, "mappings.json", r#"{"metrics": {"db.size": {"new_name": "  "}}}"#);

    let err = MappingRegistry::load(&path).unwrap_err();
    let report = err.report().expect("structured report");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].code, "empty_new_name");
    assert_eq!(report.errors[0].path, "/metrics/db.size/new_name");
}

#[test]
fn unknown_transformation_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write(
        &dir,
        "mappings.json",
        r#"{"metrics": {"db.size": {"new_name": "postgresql.db_size", "transformation": "bytes_to_mb"}}}"#,
    );

    let err = MappingRegistry::load(&path).unwrap_err();
    let report = err.report().expect("structured report");
    assert_eq!(report.errors[0].code, "unknown_transformation");
    assert!(report.errors[0].hint.as_deref().unwrap_or("").contains("rate_per_second"));

    let core: parityguard_core::Error = err.into();
    assert!(matches!(core, parityguard_core::Error::Config(_)));
}

#[test]
fn structural_violations_are_reported_with_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write(
        &dir,
        "mappings.json",
        r#"{"metrics": {"db.size": {"type": "gauge"}}, "events": {"X": {"new_source": 5}}, "extra": true}"#,
    );

    let err = MappingRegistry::load(&path).unwrap_err();
    let report = err.report().expect("structured report");
    assert!(report.errors.len() >= 3, "expected every violation: {report:?}");
    assert!(report.errors.iter().all(|issue| issue.code == "schema_violation"));
    assert!(report.errors.iter().any(|issue| issue.path == "/events/X/new_source"));
}

#[test]
fn malformed_json_is_a_decode_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write(&dir, "mappings.json", "{ not json");
    assert!(matches!(MappingRegistry::load(&path), Err(MappingError::Json(_))));
}
