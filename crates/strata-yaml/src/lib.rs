//! # strata-yaml
//!
//! Reads strata documents written in YAML.
//!
//! Plain YAML is already a valid document: every mapping entry overlays
//! whatever was declared before it. Directives are written as mapping keys
//! (`if`, `for`, `select`, `include`, ...), merge actions and references as
//! tags (`!append`, `!remove`, `!copy`, `!ref`, ...) and interpolations as
//! `{{ expression }}` inside scalars. See [`expr`] for the expression
//! language.
//!
//! ## Example
//!
//! ```rust
//! use strata_graph::{Engine, Value};
//! use strata_yaml::YamlParser;
//!
//! let mut engine = Engine::default().with_parser(YamlParser);
//! engine
//!     .load_source("base.yaml", "ports: [80]\nhost: example.org\n")
//!     .unwrap();
//! engine
//!     .load_source("site.yaml", "ports: !append [443]\nurl: \"https://{{ host }}\"\n")
//!     .unwrap();
//! assert_eq!(
//!     engine.resolve_path(&["ports"]).unwrap(),
//!     Value::List(vec![Value::Integer(80), Value::Integer(443)])
//! );
//! assert_eq!(
//!     engine.resolve_path(&["url"]).unwrap(),
//!     Value::from("https://example.org")
//! );
//! ```

mod convert;
mod error;
pub mod expr;
mod parser;
pub mod tag;

pub use error::{Error, Result};
pub use expr::{parse_expression, parse_template};
pub use tag::Tag;

use convert::Converter;
use strata_error_reporting::DiagnosticMessage;
use strata_graph::syntax::Document;
use strata_graph::{DocumentParser, GraphError};
use strata_source_map::{FileId, Location, Range, SourceInfo};
use tracing::{debug, warn};

/// A converted document and the warnings raised while reading it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub document: Document,
    pub diagnostics: Vec<DiagnosticMessage>,
}

/// Parse `content`, registered as `file_id`, into a document.
pub fn parse(content: &str, file_id: FileId) -> Result<Parsed> {
    let root = parser::read(content, file_id)?;
    let whole = SourceInfo::original(
        file_id,
        Range::new(Location::default(), Location::new(content.len(), 0, 0)),
    );
    let mut converter = Converter::default();
    let document = converter.document(root, whole)?;
    debug!(
        file = file_id.0,
        statements = document.block.len(),
        warnings = converter.diagnostics.len(),
        "yaml document converted"
    );
    Ok(Parsed {
        document,
        diagnostics: converter.diagnostics,
    })
}

/// The [`DocumentParser`] for YAML documents. Warnings are logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlParser;

impl DocumentParser for YamlParser {
    fn parse(&self, content: &str, file_id: FileId) -> std::result::Result<Document, GraphError> {
        let parsed = parse(content, file_id)?;
        for diagnostic in &parsed.diagnostics {
            warn!(
                code = diagnostic.code.as_deref().unwrap_or_default(),
                "{}",
                diagnostic.to_text(None).trim_end()
            );
        }
        Ok(parsed.document)
    }
}
