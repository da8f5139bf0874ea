//! Source anchors carried by syntax events, graph nodes and errors

use crate::context::SourceContext;
use crate::types::{FileId, Location, Range};
use serde::{Deserialize, Serialize};

/// Where a piece of configuration came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// The range in the immediate text
    pub range: Range,
    /// How this range maps back to a registered document
    pub mapping: SourceMapping,
}

/// Describes how the text behind a [`SourceInfo`] relates to a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceMapping {
    /// Direct position in a registered document
    Original { file_id: FileId },
    /// A slice of a parent source, e.g. an expression inside a scalar
    Substring {
        parent: Box<SourceInfo>,
        offset: usize,
    },
    /// Produced during evaluation; borrows the anchor of the node that made it
    Generated { origin: Box<SourceInfo> },
    /// Built programmatically, no document behind it
    Synthetic,
}

/// Result of mapping a position back to a registered document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedLocation {
    pub file_id: FileId,
    pub location: Location,
}

impl Default for SourceInfo {
    fn default() -> Self {
        SourceInfo::synthetic()
    }
}

impl SourceInfo {
    /// Create source info for a range of a registered document
    pub fn original(file_id: FileId, range: Range) -> Self {
        SourceInfo {
            range,
            mapping: SourceMapping::Original { file_id },
        }
    }

    /// Create source info for `[start, end)` of the parent's text
    pub fn substring(parent: SourceInfo, start: usize, end: usize) -> Self {
        SourceInfo {
            range: Range::new(
                Location::new(0, 0, 0),
                Location::new(end.saturating_sub(start), 0, 0),
            ),
            mapping: SourceMapping::Substring {
                parent: Box::new(parent),
                offset: start,
            },
        }
    }

    /// Source info for a value synthesized while evaluating `origin`.
    pub fn generated(origin: &SourceInfo) -> Self {
        match origin.mapping {
            // Generated-from-generated collapses to the first origin
            SourceMapping::Generated { .. } => origin.clone(),
            _ => SourceInfo {
                range: origin.range,
                mapping: SourceMapping::Generated {
                    origin: Box::new(origin.clone()),
                },
            },
        }
    }

    pub fn synthetic() -> Self {
        SourceInfo {
            range: Range::default(),
            mapping: SourceMapping::Synthetic,
        }
    }

    /// The registered document this info ultimately points into.
    pub fn file_id(&self) -> Option<FileId> {
        match &self.mapping {
            SourceMapping::Original { file_id } => Some(*file_id),
            SourceMapping::Substring { parent, .. } => parent.file_id(),
            SourceMapping::Generated { origin } => origin.file_id(),
            SourceMapping::Synthetic => None,
        }
    }

    /// Map an offset relative to this info's text back to its document.
    pub fn map_offset(&self, offset: usize, ctx: &SourceContext) -> Option<MappedLocation> {
        match &self.mapping {
            SourceMapping::Original { file_id } => {
                let file = ctx.get_file(*file_id)?;
                let location = file.line_index.offset_to_location(offset)?;
                Some(MappedLocation {
                    file_id: *file_id,
                    location,
                })
            }
            SourceMapping::Substring {
                parent,
                offset: base,
            } => parent.map_offset(parent.range.start.offset + base + offset, ctx),
            SourceMapping::Generated { origin } => {
                origin.map_offset(origin.range.start.offset, ctx)
            }
            SourceMapping::Synthetic => None,
        }
    }

    /// The start and end of this info mapped back to its document.
    pub fn map_range(&self, ctx: &SourceContext) -> Option<(MappedLocation, MappedLocation)> {
        match &self.mapping {
            SourceMapping::Generated { origin } => origin.map_range(ctx),
            _ => {
                let start = self.map_offset(self.range.start.offset, ctx)?;
                let end = self.map_offset(self.range.end.offset, ctx)?;
                Some((start, end))
            }
        }
    }
}
