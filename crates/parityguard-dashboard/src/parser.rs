use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{LegacyEvent, postgres_catalog};
use crate::errors::{DashboardError, Result};
use crate::nrql::{NrqlParser, NrqlQuery, QueryParser};

/// One validation target: a single query of a dashboard widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub page: String,
    pub title: String,
    pub visualization: String,
    pub query: NrqlQuery,
}

/// Aggregate view of everything a parser has seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub total_widgets: usize,
    pub event_types: usize,
    pub unique_attributes: usize,
    pub widgets_by_visualization: BTreeMap<String, usize>,
    pub events_used: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DashboardDocument {
    #[serde(default)]
    name: Option<String>,
    pages: Option<Vec<PageDefinition>>,
}

#[derive(Debug, Deserialize)]
struct PageDefinition {
    #[serde(default)]
    name: String,
    #[serde(default)]
    widgets: Vec<WidgetDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WidgetDefinition {
    #[serde(default)]
    title: String,
    #[serde(default)]
    visualization: Option<VisualizationDefinition>,
    #[serde(default)]
    raw_configuration: Option<RawConfiguration>,
}

#[derive(Debug, Deserialize)]
struct VisualizationDefinition {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfiguration {
    #[serde(default)]
    nrql_queries: Vec<QueryDefinition>,
}

#[derive(Debug, Deserialize)]
struct QueryDefinition {
    #[serde(default)]
    query: String,
}

/// Extracts widgets from dashboard documents.
///
/// The attribute index and the set of event types only grow across calls to
/// [`DashboardParser::parse`].
#[derive(Debug)]
pub struct DashboardParser<P = NrqlParser> {
    query_parser: P,
    widgets: Vec<Widget>,
    catalog: BTreeMap<String, LegacyEvent>,
    attributes_by_event: BTreeMap<String, BTreeSet<String>>,
    event_types_seen: BTreeSet<String>,
}

impl DashboardParser<NrqlParser> {
    pub fn new() -> Self {
        Self::with_query_parser(NrqlParser)
    }
}

impl Default for DashboardParser<NrqlParser> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: QueryParser> DashboardParser<P> {
    /// Parser using a custom query dialect, preloaded with the legacy catalog.
    pub fn with_query_parser(query_parser: P) -> Self {
        let catalog = postgres_catalog()
            .into_iter()
            .map(|event| (event.name.clone(), event))
            .collect();
        Self {
            query_parser,
            widgets: Vec::new(),
            catalog,
            attributes_by_event: BTreeMap::new(),
            event_types_seen: BTreeSet::new(),
        }
    }

    /// Read and parse a dashboard file.
    pub fn parse_file(&mut self, path: &Path) -> Result<Vec<Widget>> {
        let bytes = fs::read(path)?;
        self.parse(&bytes)
    }

    /// Parse one dashboard document, returning its widgets.
    pub fn parse(&mut self, document: &[u8]) -> Result<Vec<Widget>> {
        let document: DashboardDocument = serde_json::from_slice(document)?;
        let pages = document
            .pages
            .ok_or_else(|| DashboardError::InvalidDocument("dashboard has no pages".to_string()))?;

        let mut parsed = Vec::new();
        for page in pages {
            for widget in page.widgets {
                let visualization = widget
                    .visualization
                    .map(|viz| viz.id)
                    .unwrap_or_default();
                let queries = widget
                    .raw_configuration
                    .map(|raw| raw.nrql_queries)
                    .unwrap_or_default();

                for definition in queries {
                    if definition.query.trim().is_empty() {
                        tracing::debug!(
                            event = "dashboard_query_skipped",
                            page = %page.name,
                            widget = %widget.title,
                            reason = "empty query"
                        );
                        continue;
                    }
                    let mut query = self.query_parser.parse_nrql(&definition.query);
                    query.widget_title = widget.title.clone();
                    query.visualization = visualization.clone();
                    self.index(&query);
                    parsed.push(Widget {
                        page: page.name.clone(),
                        title: widget.title.clone(),
                        visualization: visualization.clone(),
                        query,
                    });
                }
            }
        }

        tracing::info!(
            event = "dashboard_parsed",
            dashboard = %document.name.as_deref().unwrap_or("unnamed"),
            widgets = parsed.len()
        );
        self.widgets.extend(parsed.iter().cloned());
        Ok(parsed)
    }

    fn index(&mut self, query: &NrqlQuery) {
        if query.event_type.is_empty() {
            return;
        }
        self.event_types_seen.insert(query.event_type.clone());
        let attributes = self
            .attributes_by_event
            .entry(query.event_type.clone())
            .or_default();
        attributes.extend(query.attributes.iter().cloned());
        attributes.extend(
            query
                .facets
                .iter()
                .filter(|facet| !facet.contains(char::is_whitespace) && !facet.contains('('))
                .cloned(),
        );
    }

    /// Every widget parsed so far, in document order.
    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    /// Known legacy events, keyed by name.
    pub fn events(&self) -> &BTreeMap<String, LegacyEvent> {
        &self.catalog
    }

    /// Attributes referenced by queries against an event type.
    pub fn attributes_for_event(&self, event_type: &str) -> Vec<String> {
        self.attributes_by_event
            .get(event_type)
            .map(|attributes| attributes.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Event types referenced by parsed queries.
    pub fn event_types_seen(&self) -> &BTreeSet<String> {
        &self.event_types_seen
    }

    pub fn summary(&self) -> DashboardSummary {
        let mut widgets_by_visualization = BTreeMap::new();
        for widget in &self.widgets {
            *widgets_by_visualization
                .entry(widget.visualization.clone())
                .or_insert(0) += 1;
        }

        let unique_attributes: BTreeSet<&String> = self.attributes_by_event.values().flatten().collect();
        let event_types: BTreeSet<&String> =
            self.catalog.keys().chain(self.event_types_seen.iter()).collect();

        DashboardSummary {
            total_widgets: self.widgets.len(),
            event_types: event_types.len(),
            unique_attributes: unique_attributes.len(),
            widgets_by_visualization,
            events_used: self.event_types_seen.iter().cloned().collect(),
        }
    }
}
