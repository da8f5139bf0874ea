//! Core diagnostic message types.

use serde::{Deserialize, Serialize};
use strata_source_map::{SourceContext, SourceInfo};

/// The kind of diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Error,
    Warning,
    Info,
    Note,
}

impl DiagnosticKind {
    fn label(self) -> &'static str {
        match self {
            DiagnosticKind::Error => "Error",
            DiagnosticKind::Warning => "Warning",
            DiagnosticKind::Info => "Info",
            DiagnosticKind::Note => "Note",
        }
    }
}

/// How detail items are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailKind {
    /// ✖ bullet
    Error,
    /// ℹ bullet
    Info,
    /// • bullet
    Note,
}

impl DetailKind {
    fn bullet(self) -> &'static str {
        match self {
            DetailKind::Error => "✖",
            DetailKind::Info => "ℹ",
            DetailKind::Note => "•",
        }
    }
}

/// A detail bullet, optionally pointing at a second source location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailItem {
    pub kind: DetailKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceInfo>,
}

/// A structured diagnostic.
///
/// The title is a short summary, the problem states what went wrong, details
/// give the specific values involved and hints suggest a fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub title: String,
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<DetailItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceInfo>,
}

impl DiagnosticMessage {
    pub fn new(kind: DiagnosticKind, title: impl Into<String>) -> Self {
        Self {
            code: None,
            title: title.into(),
            kind,
            problem: None,
            details: Vec::new(),
            hints: Vec::new(),
            location: None,
        }
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Error, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Warning, title)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn docs_url(&self) -> Option<&'static str> {
        self.code
            .as_deref()
            .and_then(crate::catalog::get_docs_url)
    }

    pub fn is_error(&self) -> bool {
        self.kind == DiagnosticKind::Error
    }

    /// Render as text.
    ///
    /// With a [`SourceContext`] that holds the text of the anchored document,
    /// the message is drawn as a source snippet. Otherwise it falls back to a
    /// bulleted layout:
    ///
    /// ```text
    /// Error [S-3-1]: Cycle detected
    /// `foo` depends on itself
    /// ✖ ...
    /// ? hint
    /// ```
    pub fn to_text(&self, ctx: Option<&SourceContext>) -> String {
        let snippet = match (ctx, &self.location) {
            (Some(ctx), Some(location)) => self.render_snippet(location, ctx),
            _ => None,
        };

        let mut lines = Vec::new();
        match snippet {
            Some(snippet) => {
                lines.push(snippet.trim_end().to_string());
                for detail in self.details.iter().filter(|d| d.location.is_none()) {
                    lines.push(format!("{} {}", detail.kind.bullet(), detail.content));
                }
            }
            None => {
                lines.push(self.heading());
                if let Some(problem) = &self.problem {
                    lines.push(problem.clone());
                }
                for detail in &self.details {
                    lines.push(format!("{} {}", detail.kind.bullet(), detail.content));
                }
                if let (Some(ctx), Some(location)) = (ctx, &self.location) {
                    if let Some(position) = describe_position(location, ctx) {
                        lines.push(format!("  --> {position}"));
                    }
                }
            }
        }
        for hint in &self.hints {
            lines.push(format!("? {hint}"));
        }
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Serialization of these plain types cannot fail
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn heading(&self) -> String {
        match &self.code {
            Some(code) => format!("{} [{}]: {}", self.kind.label(), code, self.title),
            None => format!("{}: {}", self.kind.label(), self.title),
        }
    }

    fn render_snippet(&self, location: &SourceInfo, ctx: &SourceContext) -> Option<String> {
        use ariadne::{Color, Config, Label, Report, ReportKind, Source};

        let (start, end) = location.map_range(ctx)?;
        let file = ctx.get_file(start.file_id)?;
        let content = file.content.as_deref()?;
        let span = char_span(content, start.location.offset, end.location.offset);

        let report_kind = match self.kind {
            DiagnosticKind::Error => ReportKind::Error,
            DiagnosticKind::Warning => ReportKind::Warning,
            DiagnosticKind::Info | DiagnosticKind::Note => ReportKind::Advice,
        };
        let title = match &self.code {
            Some(code) => format!("[{}] {}", code, self.title),
            None => self.title.clone(),
        };

        let mut report = Report::build(report_kind, file.path.clone(), span.start)
            .with_config(Config::default().with_color(false))
            .with_message(title)
            .with_label(
                Label::new((file.path.clone(), span))
                    .with_message(self.problem.as_deref().unwrap_or(&self.title))
                    .with_color(Color::Red),
            );

        for detail in &self.details {
            let Some(detail_location) = &detail.location else {
                continue;
            };
            let Some((detail_start, detail_end)) = detail_location.map_range(ctx) else {
                continue;
            };
            if detail_start.file_id != start.file_id {
                continue;
            }
            let detail_span = char_span(
                content,
                detail_start.location.offset,
                detail_end.location.offset,
            );
            report = report.with_label(
                Label::new((file.path.clone(), detail_span))
                    .with_message(&detail.content)
                    .with_color(Color::Cyan),
            );
        }

        let mut output = Vec::new();
        report
            .finish()
            .write((file.path.clone(), Source::from(content)), &mut output)
            .ok()?;
        String::from_utf8(output).ok()
    }
}

/// Ariadne counts characters, the source map counts bytes.
fn char_span(content: &str, start: usize, end: usize) -> std::ops::Range<usize> {
    let to_chars = |offset: usize| {
        content
            .get(..offset.min(content.len()))
            .map_or(offset, |prefix| prefix.chars().count())
    };
    let start = to_chars(start);
    let end = to_chars(end).max(start);
    start..end
}

fn describe_position(location: &SourceInfo, ctx: &SourceContext) -> Option<String> {
    let (start, _) = location.map_range(ctx)?;
    let file = ctx.get_file(start.file_id)?;
    Some(format!(
        "{}:{}:{}",
        file.path,
        start.location.row + 1,
        start.location.column + 1
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DiagnosticMessageBuilder;
    use strata_source_map::{Location, Range};

    #[test]
    fn test_plain_text_layout() {
        let msg = DiagnosticMessageBuilder::error("Cycle detected")
            .with_code("S-3-1")
            .problem("`foo` depends on itself")
            .add_detail("resolution of `foo` re-entered itself")
            .add_hint("Did you mean to reference a different key?")
            .build();

        insta::assert_snapshot!(msg.to_text(None), @r"
        Error [S-3-1]: Cycle detected
        `foo` depends on itself
        ✖ resolution of `foo` re-entered itself
        ? Did you mean to reference a different key?
        ");
    }

    #[test]
    fn test_position_without_content() {
        let mut ctx = SourceContext::new();
        let file_id = ctx.add_file("remote.yml", None);
        let msg = DiagnosticMessageBuilder::error("Not found")
            .with_location(SourceInfo::original(file_id, Range::default()))
            .build();

        let text = msg.to_text(Some(&ctx));
        assert!(text.contains("--> remote.yml:1:1"));
    }

    #[test]
    fn test_snippet_rendering() {
        let mut ctx = SourceContext::new();
        let file_id = ctx.add_file("config.yml", Some("a: 1\nfoo: '{{ foo }}'\n".to_string()));
        let location = SourceInfo::original(
            file_id,
            Range::new(Location::new(10, 1, 5), Location::new(19, 1, 14)),
        );
        let msg = DiagnosticMessageBuilder::error("Cycle detected")
            .with_code("S-3-1")
            .problem("`foo` depends on itself")
            .add_hint("Break the cycle?")
            .with_location(location)
            .build();

        let text = msg.to_text(Some(&ctx));
        assert!(text.contains("[S-3-1] Cycle detected"));
        assert!(text.contains("config.yml"));
        assert!(text.contains("`foo` depends on itself"));
        assert!(text.contains("? Break the cycle?"));
    }

    #[test]
    fn test_to_json() {
        let msg = DiagnosticMessage::warning("Unknown tag")
            .with_code("S-1-2");
        let json = msg.to_json();
        assert_eq!(json["kind"], "warning");
        assert_eq!(json["code"], "S-1-2");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_char_span_multibyte() {
        let content = "é: x";
        assert_eq!(char_span(content, 2, 4), 1..3);
    }
}
