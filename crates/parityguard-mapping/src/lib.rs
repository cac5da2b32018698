//! Mapping registry between the legacy event pipeline and the metrics pipeline.
//!
//! Documents are validated against a generated JSON Schema, then checked for
//! empty names and unregistered transformations before a registry is built.

pub mod document;
pub mod errors;
pub mod registry;
pub mod transforms;

pub use document::{
    DocumentFormat, MappingDocument, check_references, load_document, mapping_document_schema,
    parse_document, validate_document_json,
};
pub use errors::{DocumentIssue, DocumentReport, IssueSeverity, MappingError, Result};
pub use registry::{DEFAULT_SPECIAL_VALUES, MappingRegistry, Resolved};
pub use transforms::{Transform, TransformRegistry};
