use std::path::Path;

use parityguard_dashboard::{DashboardParser, TIMESERIES_MARKER};

fn demo_dashboard() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/postgresql_dashboard.json")
}

#[test]
fn parses_postgres_dashboard() {
    let mut parser = DashboardParser::new();
    let widgets = parser.parse_file(&demo_dashboard()).expect("parse dashboard");

    assert_eq!(widgets.len(), 12, "one widget per query");
    assert_eq!(parser.widgets().len(), 12);

    let distribution = widgets
        .iter()
        .find(|widget| widget.title == "Database Query Distribution")
        .expect("distribution widget");
    assert_eq!(distribution.visualization, "viz.bar");
    assert_eq!(distribution.page, "Overview");
    assert!(distribution.query.raw_query.contains("uniqueCount(query_id)"));
    assert_eq!(distribution.query.event_type, "PostgresSlowQueries");

    let disk = widgets
        .iter()
        .filter(|widget| widget.title == "Disk IO Usage")
        .count();
    assert_eq!(disk, 2);

    let timeline = widgets
        .iter()
        .find(|widget| widget.title == "Execution Counts Timeline")
        .expect("timeline widget");
    assert_eq!(timeline.query.time_window, "1 hour ago");
    assert!(timeline.query.timeseries);

    let exec_time = widgets
        .iter()
        .find(|widget| widget.title == "Average Execution Time")
        .expect("exec time widget");
    assert_eq!(exec_time.query.time_window, TIMESERIES_MARKER);
}

#[test]
fn indexes_attributes_by_event() {
    let mut parser = DashboardParser::new();
    parser.parse_file(&demo_dashboard()).expect("parse dashboard");

    let slow = parser.attributes_for_event("PostgresSlowQueries");
    for expected in ["query_id", "database_name", "avg_elapsed_time_ms", "execution_count"] {
        assert!(slow.contains(&expected.to_string()), "missing {expected}");
    }
    let waits = parser.attributes_for_event("PostgresWaitEvents");
    assert!(waits.contains(&"wait_category".to_string()));
    assert!(parser.attributes_for_event("Unknown").is_empty());
}

#[test]
fn summary_counts_widgets_and_events() {
    let mut parser = DashboardParser::new();
    parser.parse_file(&demo_dashboard()).expect("parse dashboard");

    let summary = parser.summary();
    assert_eq!(summary.total_widgets, 12);
    assert_eq!(summary.event_types, 5);
    assert_eq!(summary.events_used.len(), 5);
    assert_eq!(summary.widgets_by_visualization["viz.table"], 4);
    assert_eq!(summary.widgets_by_visualization["viz.line"], 4);
    assert_eq!(summary.widgets_by_visualization["viz.bar"], 2);
    assert!(!summary.widgets_by_visualization.contains_key("viz.markdown"));
}

#[test]
fn index_accumulates_across_documents() {
    let mut parser = DashboardParser::new();
    parser.parse_file(&demo_dashboard()).expect("first dashboard");
    parser
        .parse(
            br#"{"pages": [{"name": "extra", "widgets": [{
                "title": "Custom",
                "visualization": {"id": "viz.table"},
                "rawConfiguration": {"nrqlQueries": [{"query": "SELECT max(lag_seconds) FROM ReplicationLag"}]}
            }]}]}"#,
        )
        .expect("second dashboard");

    let summary = parser.summary();
    assert_eq!(summary.total_widgets, 13);
    assert_eq!(summary.event_types, 6);
    assert!(parser.attributes_for_event("PostgresSlowQueries").contains(&"query_id".to_string()));
    assert_eq!(parser.attributes_for_event("ReplicationLag"), vec!["lag_seconds".to_string()]);
}
