use serde::Serialize;

/// A legacy PostgreSQL integration event and where its data lives now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyEvent {
    pub name: String,
    pub required_fields: Vec<String>,
    pub optional_fields: Vec<String>,
    /// Equivalent source and predicate in the metrics pipeline.
    pub new_source: String,
    pub description: String,
}

impl LegacyEvent {
    fn new(
        name: &str,
        new_source: &str,
        description: &str,
        required: &[&str],
        optional: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            required_fields: required.iter().map(|f| f.to_string()).collect(),
            optional_fields: optional.iter().map(|f| f.to_string()).collect(),
            new_source: new_source.to_string(),
            description: description.to_string(),
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.required_fields.iter().any(|f| f == field) || self.optional_fields.iter().any(|f| f == field)
    }
}

/// Known legacy PostgreSQL events.
pub fn postgres_catalog() -> Vec<LegacyEvent> {
    vec![
        LegacyEvent::new(
            "PostgresSlowQueries",
            "Metric WHERE db.system = 'postgresql'",
            "Slow query performance metrics",
            &[
                "query_id",
                "query_text",
                "database_name",
                "execution_count",
                "avg_elapsed_time_ms",
            ],
            &[
                "schema_name",
                "statement_type",
                "avg_disk_reads",
                "avg_disk_writes",
                "total_exec_time",
                "rows",
            ],
        ),
        LegacyEvent::new(
            "PostgresWaitEvents",
            "Metric WHERE db.system = 'postgresql' AND wait.event_name IS NOT NULL",
            "Database wait event metrics",
            &["wait_event_name", "total_wait_time_ms"],
            &["wait_category", "database_name", "query_id"],
        ),
        LegacyEvent::new(
            "PostgresBlockingSessions",
            "Log WHERE db.system = 'postgresql' AND blocking.detected = true",
            "Blocking session detection",
            &["blocked_pid", "blocking_pid", "database_name"],
            &[
                "blocked_query",
                "blocked_query_id",
                "blocked_query_start",
                "blocking_query",
                "blocking_query_id",
                "blocking_query_start",
                "blocking_database",
            ],
        ),
        LegacyEvent::new(
            "PostgresIndividualQueries",
            "Metric WHERE db.system = 'postgresql'",
            "Individual query details",
            &["query_id", "query_text"],
            &["avg_cpu_time_ms", "plan_id"],
        ),
        LegacyEvent::new(
            "PostgresExecutionPlanMetrics",
            "Metric WHERE db.system = 'postgresql' AND db.plan.node_type IS NOT NULL",
            "Query execution plan metrics",
            &["plan_id", "level_id", "node_type"],
            &[
                "query_id",
                "query_text",
                "total_cost",
                "startup_cost",
                "plan_rows",
                "actual_startup_time",
                "actual_total_time",
                "actual_rows",
                "actual_loops",
                "shared_hit_block",
                "shared_read_blocks",
                "shared_dirtied_blocks",
                "shared_written_blocks",
                "local_hit_block",
                "local_read_blocks",
                "local_dirtied_blocks",
                "local_written_blocks",
                "temp_read_block",
                "temp_written_blocks",
                "database_name",
            ],
        ),
    ]
}
