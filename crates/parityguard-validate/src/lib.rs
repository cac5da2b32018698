//! Parity validation between the legacy event pipeline and the metrics
//! pipeline: query translation, row-set and scalar comparison, and the data
//! source seam both pipelines are queried through.

pub mod compare;
pub mod config;
pub mod replay;
pub mod source;
pub mod translate;
pub mod validator;

pub use compare::{RowComparator, RowSetComparison};
pub use config::{DEFAULT_KEY_FIELDS, ParityConfig};
pub use replay::{ReplayFixture, ReplaySource, metric_key, normalize_query};
pub use source::DataSource;
pub use translate::{TranslatedQuery, event_type_of, translate_query};
pub use validator::{CANCELLED_REASON, ParityValidator};
