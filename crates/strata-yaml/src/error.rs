//! Errors raised while reading YAML into a document.

use strata_error_reporting::{DiagnosticMessage, DiagnosticMessageBuilder};
use strata_graph::GraphError;
use strata_source_map::SourceInfo;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Malformed YAML, reported by the scanner
    #[error("{message}")]
    Scan {
        message: String,
        source_info: SourceInfo,
    },

    /// Well-formed YAML that does not describe a document
    #[error("{message}")]
    Structure {
        message: String,
        source_info: SourceInfo,
    },

    #[error("invalid expression: {message}")]
    Expression {
        message: String,
        source_info: SourceInfo,
    },

    #[error("invalid directive: {message}")]
    Directive {
        message: String,
        source_info: SourceInfo,
    },

    #[error("invalid tag: {message}")]
    Tag {
        message: String,
        source_info: SourceInfo,
    },
}

impl Error {
    pub fn structure(message: impl Into<String>, source_info: SourceInfo) -> Self {
        Error::Structure {
            message: message.into(),
            source_info,
        }
    }

    pub fn expression(message: impl Into<String>, source_info: SourceInfo) -> Self {
        Error::Expression {
            message: message.into(),
            source_info,
        }
    }

    pub fn directive(message: impl Into<String>, source_info: SourceInfo) -> Self {
        Error::Directive {
            message: message.into(),
            source_info,
        }
    }

    pub fn tag(message: impl Into<String>, source_info: SourceInfo) -> Self {
        Error::Tag {
            message: message.into(),
            source_info,
        }
    }

    pub fn source_info(&self) -> &SourceInfo {
        match self {
            Error::Scan { source_info, .. }
            | Error::Structure { source_info, .. }
            | Error::Expression { source_info, .. }
            | Error::Directive { source_info, .. }
            | Error::Tag { source_info, .. } => source_info,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::Scan { .. } | Error::Structure { .. } | Error::Expression { .. } => "S-1-1",
            Error::Tag { .. } => "S-1-3",
            Error::Directive { .. } => "S-1-4",
        }
    }

    pub fn to_diagnostic(&self) -> DiagnosticMessage {
        let title = match self {
            Error::Scan { .. } => "YAML syntax error",
            Error::Structure { .. } => "Invalid document structure",
            Error::Expression { .. } => "Invalid expression",
            Error::Directive { .. } => "Invalid directive",
            Error::Tag { .. } => "Invalid tag",
        };
        DiagnosticMessageBuilder::error(title)
            .with_code(self.code())
            .problem(self.to_string())
            .with_location(self.source_info().clone())
            .build()
    }
}

impl From<Error> for GraphError {
    fn from(err: Error) -> Self {
        let source_info = err.source_info().clone();
        GraphError::syntax(err.to_string(), source_info)
    }
}
