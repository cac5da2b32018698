//! Pattern-based extraction of the parts of an NRQL query that matter for
//! parity checks.
//!
//! This is not a full grammar. The extractor recognizes the event source,
//! aggregation calls, facets and the time window well enough to translate and
//! compare widget queries.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Aggregation functions recognized in `SELECT` lists.
pub const AGGREGATION_FUNCTIONS: [&str; 9] = [
    "count",
    "uniqueCount",
    "sum",
    "average",
    "latest",
    "max",
    "min",
    "percentile",
    "histogram",
];

/// Marker stored as the time window of a `TIMESERIES` query without `SINCE`.
pub const TIMESERIES_MARKER: &str = "TIMESERIES";

/// One aggregation call, e.g. `latest(avg_elapsed_time_ms)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub function: String,
    pub target: String,
}

/// Parsed form of a widget query. Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NrqlQuery {
    pub widget_title: String,
    pub raw_query: String,
    /// Source after `FROM`; empty when none was recognized.
    pub event_type: String,
    pub aggregations: Vec<Aggregation>,
    /// Simple field targets of the aggregations, `*` excluded.
    pub attributes: Vec<String>,
    pub facets: Vec<String>,
    /// `SINCE` window as written, else the `TIMESERIES` marker, else empty.
    pub time_window: String,
    pub timeseries: bool,
    pub visualization: String,
}

/// Query dialect seam used by the dashboard parser.
pub trait QueryParser: Send + Sync {
    fn parse_nrql(&self, query: &str) -> NrqlQuery;
}

/// Regex-driven NRQL extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct NrqlParser;

struct Patterns {
    from: Regex,
    aggregation: Regex,
    facet: Regex,
    since: Regex,
    timeseries: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            let functions = AGGREGATION_FUNCTIONS.join("|");
            Some(Patterns {
                from: Regex::new(r"(?i)\bFROM\s+([A-Za-z_][\w.]*)").ok()?,
                aggregation: Regex::new(&format!(r"(?i)\b({functions})\s*\(\s*([^)]*)\)")).ok()?,
                facet: Regex::new(
                    r"(?i)\bFACET\s+(.+?)(?:\s+LIMIT\b|\s+SINCE\b|\s+UNTIL\b|\s+TIMESERIES\b|\s+COMPARE\b|\s+ORDER\s+BY\b|$)",
                )
                .ok()?,
                since: Regex::new(
                    r"(?i)\bSINCE\s+(.+?)(?:\s+UNTIL\b|\s+LIMIT\b|\s+TIMESERIES\b|\s+FACET\b|\s+COMPARE\b|\s+WHERE\b|$)",
                )
                .ok()?,
                timeseries: Regex::new(r"(?i)\bTIMESERIES\b").ok()?,
            })
        })
        .as_ref()
}

impl QueryParser for NrqlParser {
    fn parse_nrql(&self, query: &str) -> NrqlQuery {
        let mut parsed = NrqlQuery {
            raw_query: query.to_string(),
            ..NrqlQuery::default()
        };
        let Some(patterns) = patterns() else {
            return parsed;
        };
        let query = query.trim();

        if let Some(captures) = patterns.from.captures(query) {
            parsed.event_type = captures[1].to_string();
        }

        for captures in patterns.aggregation.captures_iter(query) {
            let function = canonical_function(&captures[1]);
            let target = first_argument(&captures[2]);
            if is_simple_field(&target) && !parsed.attributes.contains(&target) {
                parsed.attributes.push(target.clone());
            }
            parsed.aggregations.push(Aggregation { function, target });
        }

        if let Some(captures) = patterns.facet.captures(query) {
            parsed.facets = captures[1]
                .split(',')
                .map(str::trim)
                .filter(|facet| !facet.is_empty())
                .map(str::to_string)
                .collect();
        }

        parsed.timeseries = patterns.timeseries.is_match(query);
        if let Some(captures) = patterns.since.captures(query) {
            parsed.time_window = captures[1].trim().to_string();
        } else if parsed.timeseries {
            parsed.time_window = TIMESERIES_MARKER.to_string();
        }

        parsed
    }
}

fn canonical_function(matched: &str) -> String {
    AGGREGATION_FUNCTIONS
        .iter()
        .find(|name| name.eq_ignore_ascii_case(matched))
        .map(|name| name.to_string())
        .unwrap_or_else(|| matched.to_string())
}

fn first_argument(arguments: &str) -> String {
    let first = arguments.split(',').next().unwrap_or_default();
    first.trim().trim_matches(|c| c == '\'' || c == '"' || c == '`').to_string()
}

fn is_simple_field(target: &str) -> bool {
    !target.is_empty()
        && target != "*"
        && !target.contains(char::is_whitespace)
        && !target.contains('(')
}
