//! Dashboard definition parsing.
//!
//! Walks `pages[].widgets[]` and turns every NRQL query into a [`Widget`]
//! carrying the parsed query, while indexing the attributes referenced per
//! event type.

pub mod catalog;
pub mod errors;
pub mod nrql;
pub mod parser;

pub use catalog::{LegacyEvent, postgres_catalog};
pub use errors::{DashboardError, Result};
pub use nrql::{AGGREGATION_FUNCTIONS, Aggregation, NrqlParser, NrqlQuery, QueryParser, TIMESERIES_MARKER};
pub use parser::{DashboardParser, DashboardSummary, Widget};
