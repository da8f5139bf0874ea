//! Builder API for diagnostic messages.

use crate::diagnostic::{DetailItem, DetailKind, DiagnosticKind, DiagnosticMessage};
use strata_source_map::SourceInfo;

/// Builds a [`DiagnosticMessage`] in title, problem, details, hints order.
///
/// ```
/// use strata_error_reporting::DiagnosticMessageBuilder;
///
/// let error = DiagnosticMessageBuilder::error("Type error")
///     .with_code("S-2-3")
///     .problem("Cannot add a mapping to a sequence")
///     .add_detail("left operand is a sequence")
///     .add_detail("right operand is a mapping")
///     .build();
///
/// assert_eq!(error.code.as_deref(), Some("S-2-3"));
/// assert_eq!(error.details.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct DiagnosticMessageBuilder {
    message: DiagnosticMessage,
}

impl DiagnosticMessageBuilder {
    pub fn new(kind: DiagnosticKind, title: impl Into<String>) -> Self {
        Self {
            message: DiagnosticMessage::new(kind, title),
        }
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Error, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Warning, title)
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Info, title)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.message.code = Some(code.into());
        self
    }

    /// The "what went wrong" statement. Replaces any earlier one.
    pub fn problem(mut self, stmt: impl Into<String>) -> Self {
        self.message.problem = Some(stmt.into());
        self
    }

    pub fn add_detail(self, detail: impl Into<String>) -> Self {
        self.push_detail(DetailKind::Error, detail.into(), None)
    }

    /// A detail that points at its own source location.
    pub fn add_detail_at(self, detail: impl Into<String>, location: SourceInfo) -> Self {
        self.push_detail(DetailKind::Error, detail.into(), Some(location))
    }

    pub fn add_info(self, info: impl Into<String>) -> Self {
        self.push_detail(DetailKind::Info, info.into(), None)
    }

    pub fn add_note(self, note: impl Into<String>) -> Self {
        self.push_detail(DetailKind::Note, note.into(), None)
    }

    pub fn add_hint(mut self, hint: impl Into<String>) -> Self {
        self.message.hints.push(hint.into());
        self
    }

    pub fn with_location(mut self, location: SourceInfo) -> Self {
        self.message.location = Some(location);
        self
    }

    pub fn build(self) -> DiagnosticMessage {
        self.message
    }

    fn push_detail(mut self, kind: DetailKind, content: String, location: Option<SourceInfo>) -> Self {
        self.message.details.push(DetailItem {
            kind,
            content,
            location,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_kinds_keep_order() {
        let msg = DiagnosticMessageBuilder::warning("Unknown tag")
            .add_detail("tag `!apend` is not recognized")
            .add_info("the value is kept as written")
            .add_note("tags are case sensitive")
            .add_hint("Did you mean `!append`?")
            .build();

        let kinds: Vec<DetailKind> = msg.details.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![DetailKind::Error, DetailKind::Info, DetailKind::Note]
        );
        assert_eq!(msg.kind, DiagnosticKind::Warning);
        assert_eq!(msg.hints, vec!["Did you mean `!append`?".to_string()]);
    }

    #[test]
    fn test_problem_replaces() {
        let msg = DiagnosticMessageBuilder::error("Bad")
            .problem("first")
            .problem("second")
            .build();
        assert_eq!(msg.problem.as_deref(), Some("second"));
    }
}
