//! Rewrites a legacy widget query into its new-pipeline equivalent.
//!
//! Steps run in a fixed order: attribute renames first, then the source
//! swap, then filter injection, then the default window. Renaming before the
//! filter is injected keeps the filter text exactly as configured. Without a
//! `WHERE` or `FACET`, the filter goes ahead of any trailing clause.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use parityguard_core::{Error, Result};
use parityguard_mapping::MappingRegistry;
use regex::{Captures, Regex};

/// Outcome of translating one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedQuery {
    pub event_type: String,
    pub query: String,
}

struct Patterns {
    from: Regex,
    where_keyword: Regex,
    facet_keyword: Regex,
    clause_end: Regex,
    since_keyword: Regex,
}

fn patterns() -> Result<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                from: Regex::new(r"(?i)\bFROM\s+([A-Za-z_][\w.]*)").ok()?,
                where_keyword: Regex::new(r"(?i)\bWHERE\b").ok()?,
                facet_keyword: Regex::new(r"(?i)\bFACET\b").ok()?,
                clause_end: Regex::new(
                    r"(?i)\s+(?:FACET|SINCE|UNTIL|LIMIT|TIMESERIES|COMPARE\s+WITH|ORDER\s+BY)\b",
                )
                .ok()?,
                since_keyword: Regex::new(r"(?i)\bSINCE\b").ok()?,
            })
        })
        .as_ref()
        .ok_or_else(|| Error::Translation("query patterns failed to compile".to_string()))
}

/// Event type named after `FROM`, if any.
pub fn event_type_of(query: &str) -> Option<String> {
    let patterns = patterns().ok()?;
    patterns
        .from
        .captures(query)
        .map(|captures| captures[1].to_string())
}

/// Translate a legacy query using the registry's event mapping.
///
/// `attribute_mappings` holds the legacy -> new renames applied as whole
/// words. `default_window` is used when the query has no `SINCE`.
pub fn translate_query(
    query: &str,
    registry: &MappingRegistry,
    attribute_mappings: &BTreeMap<String, String>,
    default_window: &str,
) -> Result<TranslatedQuery> {
    let patterns = patterns()?;
    let event_type = event_type_of(query)
        .ok_or_else(|| Error::Translation(format!("query has no FROM clause: {query}")))?;
    let mapping = registry
        .resolve_event(&event_type)
        .ok_or_else(|| Error::Translation(format!("no mapping for event type '{event_type}'")))?;

    let renamed = rewrite_attributes(query.trim(), attribute_mappings)?;
    let mut translated = replace_source(patterns, &renamed, &mapping.new_source);

    if let Some(filter) = mapping
        .new_filter
        .as_deref()
        .map(str::trim)
        .filter(|filter| !filter.is_empty())
    {
        translated = inject_filter(patterns, &translated, filter);
    }

    if !patterns.since_keyword.is_match(&translated) {
        translated.push_str(&format!(" SINCE {default_window} ago"));
    }

    tracing::debug!(
        event = "query_translated",
        event_type = %event_type,
        query = %translated
    );

    Ok(TranslatedQuery {
        event_type,
        query: translated,
    })
}

/// Rename whole-word attribute references in one pass.
fn rewrite_attributes(query: &str, attribute_mappings: &BTreeMap<String, String>) -> Result<String> {
    if attribute_mappings.is_empty() {
        return Ok(query.to_string());
    }

    let mut names: Vec<&String> = attribute_mappings.keys().collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = names
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = Regex::new(&format!(r"\b(?:{alternation})\b"))
        .map_err(|err| Error::Translation(format!("invalid attribute mapping: {err}")))?;

    Ok(pattern
        .replace_all(query, |captures: &Captures<'_>| {
            let matched = &captures[0];
            attribute_mappings
                .get(matched)
                .cloned()
                .unwrap_or_else(|| matched.to_string())
        })
        .into_owned())
}

fn replace_source(patterns: &Patterns, query: &str, new_source: &str) -> String {
    match patterns.from.captures(query).and_then(|captures| captures.get(1)) {
        Some(source) => format!("{}{}{}", &query[..source.start()], new_source, &query[source.end()..]),
        None => query.to_string(),
    }
}

fn inject_filter(patterns: &Patterns, query: &str, filter: &str) -> String {
    let body_start = patterns
        .from
        .find(query)
        .map(|from| from.end())
        .unwrap_or(0);
    let (head, body) = query.split_at(body_start);

    if let Some(keyword) = patterns.where_keyword.find(body) {
        let rest = &body[keyword.end()..];
        let condition_end = patterns
            .clause_end
            .find(rest)
            .map(|clause| clause.start())
            .unwrap_or(rest.len());
        let condition = rest[..condition_end].trim();
        let tail = &rest[condition_end..];
        let before = &body[..keyword.start()];
        if condition.is_empty() {
            return format!("{head}{before}WHERE {filter}{tail}");
        }
        return format!("{head}{before}WHERE {filter} AND ({condition}){tail}");
    }

    if let Some(keyword) = patterns.facet_keyword.find(body) {
        let before = &body[..keyword.start()];
        let after = &body[keyword.start()..];
        let separator = if before.ends_with(char::is_whitespace) { "" } else { " " };
        return format!("{head}{before}{separator}WHERE {filter} {after}");
    }

    match patterns.clause_end.find(body) {
        Some(clause) => format!(
            "{head}{} WHERE {filter}{}",
            &body[..clause.start()],
            &body[clause.start()..]
        ),
        None => format!("{} WHERE {filter}", query.trim_end()),
    }
}
