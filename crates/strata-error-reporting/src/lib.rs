//! Structured diagnostics for strata.
//!
//! Errors raised while loading or resolving a configuration are converted to
//! [`DiagnosticMessage`]s: a catalogued code, a title, a problem statement,
//! bulleted details and hints. Messages render as plain text, as JSON, or as
//! an annotated source snippet when the anchored document is available in a
//! [`strata_source_map::SourceContext`].

pub mod builder;
pub mod catalog;
pub mod diagnostic;

pub use builder::DiagnosticMessageBuilder;
pub use catalog::{ERROR_CATALOG, ErrorCodeInfo, get_docs_url, get_error_info, get_subsystem};
pub use diagnostic::{DetailItem, DetailKind, DiagnosticKind, DiagnosticMessage};
