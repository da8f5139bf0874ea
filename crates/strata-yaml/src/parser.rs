//! Reading YAML events into a tree that keeps tags, scalar styles and
//! source positions.

use crate::error::{Error, Result};
use strata_source_map::{FileId, Location, Range, SourceInfo};
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser, Tag};
use yaml_rust2::scanner::{Marker, TScalarStyle};

/// How a scalar was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Style {
    Plain,
    Quoted,
    /// `|` or `>`, already chomped by the scanner
    Block,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum YamlKind {
    Scalar {
        text: String,
        style: Style,
        /// Where the text starts within the node's source range
        text_offset: usize,
    },
    Sequence(Vec<YamlNode>),
    Mapping(Vec<(YamlNode, YamlNode)>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct YamlNode {
    pub kind: YamlKind,
    pub tag: Option<Tag>,
    pub source_info: SourceInfo,
}

impl YamlNode {
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            YamlKind::Scalar { .. } => "scalar",
            YamlKind::Sequence(_) => "sequence",
            YamlKind::Mapping(_) => "mapping",
        }
    }

    /// The scalar's text, if this is a scalar.
    pub fn scalar(&self) -> Option<(&str, Style, usize)> {
        match &self.kind {
            YamlKind::Scalar {
                text,
                style,
                text_offset,
            } => Some((text, *style, *text_offset)),
            _ => None,
        }
    }

    /// An empty value, `~` or `null`.
    pub fn is_null(&self) -> bool {
        self.tag.is_none()
            && matches!(
                self.scalar(),
                Some((text, Style::Plain, _)) if text.is_empty() || text == "~" || text.eq_ignore_ascii_case("null")
            )
    }
}

/// Read the first document in `content`. An empty stream yields `None`.
pub(crate) fn read(content: &str, file_id: FileId) -> Result<Option<YamlNode>> {
    let mut parser = Parser::new_from_str(content);
    let mut builder = YamlBuilder::new(content, file_id);

    if let Err(err) = parser.load(&mut builder, false) {
        let at = builder.location(err.marker());
        return Err(Error::Scan {
            message: err.info().to_string(),
            source_info: SourceInfo::original(file_id, Range::point(at)),
        });
    }
    builder.finish()
}

/// A node under construction.
enum Frame {
    Sequence {
        start: Marker,
        tag: Option<Tag>,
        items: Vec<YamlNode>,
    },
    Mapping {
        start: Marker,
        tag: Option<Tag>,
        entries: Vec<(YamlNode, Option<YamlNode>)>,
    },
}

struct YamlBuilder<'a> {
    content: &'a str,
    ascii: bool,
    file_id: FileId,
    stack: Vec<Frame>,
    root: Option<YamlNode>,
    /// The first problem found; events after it are ignored
    error: Option<Error>,
}

impl<'a> YamlBuilder<'a> {
    fn new(content: &'a str, file_id: FileId) -> Self {
        YamlBuilder {
            content,
            ascii: content.is_ascii(),
            file_id,
            stack: Vec::new(),
            root: None,
            error: None,
        }
    }

    fn finish(self) -> Result<Option<YamlNode>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.root),
        }
    }

    /// Markers count characters; source infos count bytes.
    fn location(&self, marker: &Marker) -> Location {
        let offset = if self.ascii {
            marker.index()
        } else {
            self.content
                .char_indices()
                .nth(marker.index())
                .map_or(self.content.len(), |(i, _)| i)
        };
        Location::new(offset, marker.line().saturating_sub(1), marker.col())
    }

    fn span(&self, start: &Marker, end: &Marker) -> SourceInfo {
        SourceInfo::original(
            self.file_id,
            Range::new(self.location(start), self.location(end)),
        )
    }

    fn scalar_span(&self, marker: &Marker, len: usize) -> SourceInfo {
        let start = self.location(marker);
        let end_offset = (start.offset + len).min(self.content.len());
        let end = Location::new(end_offset, start.row, start.column + (end_offset - start.offset));
        SourceInfo::original(self.file_id, Range::new(start, end))
    }

    fn fail(&mut self, err: Error) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn push_complete(&mut self, node: YamlNode) {
        match self.stack.last_mut() {
            None => self.root = Some(node),
            Some(Frame::Sequence { items, .. }) => items.push(node),
            Some(Frame::Mapping { entries, .. }) => match entries.last_mut() {
                Some((_, value @ None)) => *value = Some(node),
                _ => entries.push((node, None)),
            },
        }
    }
}

impl MarkedEventReceiver for YamlBuilder<'_> {
    fn on_event(&mut self, ev: Event, marker: Marker) {
        if self.error.is_some() {
            return;
        }
        match ev {
            Event::Nothing
            | Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart
            | Event::DocumentEnd => {}

            Event::Scalar(text, style, _anchor_id, tag) => {
                let (style, quotes) = match style {
                    TScalarStyle::Plain => (Style::Plain, 0),
                    TScalarStyle::Literal | TScalarStyle::Folded => (Style::Block, 0),
                    _ => (Style::Quoted, 1),
                };
                let source_info = self.scalar_span(&marker, text.len() + 2 * quotes);
                self.push_complete(YamlNode {
                    kind: YamlKind::Scalar {
                        text,
                        style,
                        text_offset: quotes,
                    },
                    tag,
                    source_info,
                });
            }

            Event::SequenceStart(_anchor_id, tag) => self.stack.push(Frame::Sequence {
                start: marker,
                tag,
                items: Vec::new(),
            }),

            Event::MappingStart(_anchor_id, tag) => self.stack.push(Frame::Mapping {
                start: marker,
                tag,
                entries: Vec::new(),
            }),

            Event::SequenceEnd | Event::MappingEnd => {
                let node = match self.stack.pop() {
                    Some(Frame::Sequence { start, tag, items }) => YamlNode {
                        kind: YamlKind::Sequence(items),
                        tag,
                        source_info: self.span(&start, &marker),
                    },
                    Some(Frame::Mapping { start, tag, entries }) => {
                        let source_info = self.span(&start, &marker);
                        let mut complete = Vec::with_capacity(entries.len());
                        for (key, value) in entries {
                            let Some(value) = value else {
                                self.fail(Error::structure(
                                    "mapping key without a value",
                                    key.source_info,
                                ));
                                return;
                            };
                            complete.push((key, value));
                        }
                        YamlNode {
                            kind: YamlKind::Mapping(complete),
                            tag,
                            source_info,
                        }
                    }
                    None => {
                        let at = self.scalar_span(&marker, 0);
                        self.fail(Error::structure("unbalanced collection end", at));
                        return;
                    }
                };
                self.push_complete(node);
            }

            Event::Alias(_anchor_id) => {
                let at = self.scalar_span(&marker, 1);
                self.fail(Error::structure(
                    "aliases are not supported; use `!ref` or `!copy` to reuse a value",
                    at,
                ));
            }
        }
    }
}
