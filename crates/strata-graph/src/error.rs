//! Errors raised while building or resolving the graph.

use strata_error_reporting::{DiagnosticMessage, DiagnosticMessageBuilder};
use strata_source_map::SourceInfo;
use thiserror::Error;

/// Every failure the core can report.
///
/// Errors are `Clone` so a failed operation can be memoized and handed to
/// every later caller unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("syntax error: {message}")]
    Syntax {
        message: String,
        source_info: SourceInfo,
    },

    #[error("no match for {what}")]
    NoMatching {
        what: String,
        source_info: SourceInfo,
    },

    #[error("index error: {message}")]
    Index {
        message: String,
        source_info: SourceInfo,
    },

    #[error("type error: {message}")]
    Type {
        message: String,
        source_info: SourceInfo,
    },

    #[error("cannot overlay {incoming} onto {existing} at `{key}`")]
    OverlayMismatch {
        key: String,
        existing: String,
        incoming: String,
        source_info: SourceInfo,
    },

    #[error("cycle detected while evaluating {what}")]
    Cycle {
        what: String,
        source_info: SourceInfo,
    },

    #[error("paradox in {what}: decided on {observed}, but it is now {current}")]
    Paradox {
        what: String,
        observed: String,
        current: String,
        source_info: SourceInfo,
    },

    #[error("evaluation nested deeper than {max_depth} levels")]
    NestingTooDeep {
        max_depth: usize,
        source_info: SourceInfo,
    },

    #[error("could not find `{uri}`")]
    NotFound { uri: String, source_info: SourceInfo },

    #[error("could not load `{uri}`: {message}")]
    Load {
        uri: String,
        message: String,
        source_info: SourceInfo,
    },

    #[error("programming error: {0}")]
    Programming(String),
}

impl GraphError {
    pub fn syntax(message: impl Into<String>, source_info: SourceInfo) -> Self {
        GraphError::Syntax {
            message: message.into(),
            source_info,
        }
    }

    pub fn no_matching(what: impl Into<String>, source_info: SourceInfo) -> Self {
        GraphError::NoMatching {
            what: what.into(),
            source_info,
        }
    }

    pub fn index(message: impl Into<String>, source_info: SourceInfo) -> Self {
        GraphError::Index {
            message: message.into(),
            source_info,
        }
    }

    pub fn type_error(message: impl Into<String>, source_info: SourceInfo) -> Self {
        GraphError::Type {
            message: message.into(),
            source_info,
        }
    }

    /// Catalog code, see `strata_error_reporting::catalog`.
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::Programming(_) => "S-0-1",
            GraphError::Syntax { .. } => "S-1-1",
            GraphError::NoMatching { .. } => "S-2-1",
            GraphError::Index { .. } => "S-2-2",
            GraphError::Type { .. } => "S-2-3",
            GraphError::OverlayMismatch { .. } => "S-2-4",
            GraphError::Cycle { .. } => "S-3-1",
            GraphError::Paradox { .. } => "S-3-2",
            GraphError::NestingTooDeep { .. } => "S-3-3",
            GraphError::NotFound { .. } => "S-4-1",
            GraphError::Load { .. } => "S-4-2",
        }
    }

    pub fn source_info(&self) -> Option<&SourceInfo> {
        match self {
            GraphError::Syntax { source_info, .. }
            | GraphError::NoMatching { source_info, .. }
            | GraphError::Index { source_info, .. }
            | GraphError::Type { source_info, .. }
            | GraphError::OverlayMismatch { source_info, .. }
            | GraphError::Cycle { source_info, .. }
            | GraphError::Paradox { source_info, .. }
            | GraphError::NestingTooDeep { source_info, .. }
            | GraphError::NotFound { source_info, .. }
            | GraphError::Load { source_info, .. } => Some(source_info),
            GraphError::Programming(_) => None,
        }
    }

    /// The one failure an `or` expression recovers from.
    pub fn is_no_matching(&self) -> bool {
        matches!(self, GraphError::NoMatching { .. })
    }

    pub fn to_diagnostic(&self) -> DiagnosticMessage {
        let builder = match self {
            GraphError::Syntax { message, .. } => {
                DiagnosticMessageBuilder::error("Syntax error").problem(message.clone())
            }
            GraphError::NoMatching { what, .. } => DiagnosticMessageBuilder::error("No match")
                .problem(format!("Nothing is defined for {what}"))
                .add_hint("Use `or` to provide a fallback value"),
            GraphError::Index { message, .. } => {
                DiagnosticMessageBuilder::error("Index error").problem(message.clone())
            }
            GraphError::Type { message, .. } => {
                DiagnosticMessageBuilder::error("Type error").problem(message.clone())
            }
            GraphError::OverlayMismatch {
                key,
                existing,
                incoming,
                ..
            } => DiagnosticMessageBuilder::error("Overlay type mismatch")
                .problem(format!("`{key}` is a {existing} and cannot be replaced by a {incoming}"))
                .add_hint("Use `append` or `remove` to change a sequence"),
            GraphError::Cycle { what, .. } => DiagnosticMessageBuilder::error("Cycle detected")
                .problem(format!("{what} depends on its own value")),
            GraphError::Paradox {
                what,
                observed,
                current,
                ..
            } => DiagnosticMessageBuilder::error("Paradox detected")
                .problem(format!("The {what} was decided on a value that has since changed"))
                .add_detail(format!("The decision saw `{observed}`"))
                .add_detail(format!("The value is now `{current}`"))
                .add_hint("Avoid branching on a value the branch itself overrides"),
            GraphError::NestingTooDeep { max_depth, .. } => {
                DiagnosticMessageBuilder::error("Evaluation nested too deeply")
                    .problem(format!("More than {max_depth} evaluations were in flight at once"))
                    .add_hint("Check for macros that call themselves")
            }
            GraphError::NotFound { uri, .. } => DiagnosticMessageBuilder::error("Document not found")
                .problem(format!("No document could be opened at `{uri}`")),
            GraphError::Load { uri, message, .. } => {
                DiagnosticMessageBuilder::error("Document could not be loaded")
                    .problem(format!("Loading `{uri}` failed"))
                    .add_detail(message.clone())
            }
            GraphError::Programming(message) => {
                DiagnosticMessageBuilder::error("Internal error").problem(message.clone())
            }
        };
        let builder = builder.with_code(self.code());
        match self.source_info() {
            Some(source_info) => builder.with_location(source_info.clone()).build(),
            None => builder.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_error_reporting::get_error_info;

    #[test]
    fn test_codes_are_catalogued() {
        let errors = [
            GraphError::Programming("x".into()),
            GraphError::syntax("x", SourceInfo::default()),
            GraphError::no_matching("x", SourceInfo::default()),
            GraphError::index("x", SourceInfo::default()),
            GraphError::type_error("x", SourceInfo::default()),
            GraphError::Cycle {
                what: "x".into(),
                source_info: SourceInfo::default(),
            },
            GraphError::NestingTooDeep {
                max_depth: 1,
                source_info: SourceInfo::default(),
            },
            GraphError::NotFound {
                uri: "x".into(),
                source_info: SourceInfo::default(),
            },
        ];
        for error in errors {
            assert!(get_error_info(error.code()).is_some(), "{}", error.code());
        }
    }

    #[test]
    fn test_paradox_diagnostic() {
        let error = GraphError::Paradox {
            what: "select directive".into(),
            observed: "bar".into(),
            current: "qux".into(),
            source_info: SourceInfo::default(),
        };
        let diagnostic = error.to_diagnostic();
        assert_eq!(diagnostic.code.as_deref(), Some("S-3-2"));
        assert_eq!(diagnostic.details.len(), 2);
        assert!(diagnostic.to_text(None).contains("Paradox detected"));
    }

    #[test]
    fn test_only_no_matching_is_recoverable() {
        assert!(GraphError::no_matching("a", SourceInfo::default()).is_no_matching());
        assert!(!GraphError::index("a", SourceInfo::default()).is_no_matching());
    }
}
