//! Registry of loaded documents

use crate::types::{FileId, Location};
use serde::{Deserialize, Serialize};

/// All documents seen by an engine, indexed by [`FileId`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceContext {
    files: Vec<SourceFile>,
}

/// A registered document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// URI or path the document was opened from
    pub path: String,
    /// Document text, when it was available as UTF-8
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Line break index for offset lookups
    pub line_index: LineIndex,
}

/// Byte offsets of line breaks, for offset to row/column conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(content: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(content.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        LineIndex {
            line_starts,
            len: content.len(),
        }
    }

    /// Returns None when `offset` lies past the end of the text.
    pub fn offset_to_location(&self, offset: usize) -> Option<Location> {
        if offset > self.len {
            return None;
        }
        let row = match self.line_starts.binary_search(&offset) {
            Ok(row) => row,
            Err(next) => next.checked_sub(1)?,
        };
        Some(Location::new(offset, row, offset - self.line_starts[row]))
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

/// The index of an empty text: one line, starting at offset 0.
impl Default for LineIndex {
    fn default() -> Self {
        LineIndex::new("")
    }
}

impl SourceContext {
    pub fn new() -> Self {
        SourceContext { files: Vec::new() }
    }

    /// Register a document and return its id.
    ///
    /// Documents without text still get an id so that anchors into them can
    /// be reported by path.
    pub fn add_file(&mut self, path: impl Into<String>, content: Option<String>) -> FileId {
        let id = FileId(self.files.len());
        let line_index = content.as_deref().map(LineIndex::new).unwrap_or_default();
        self.files.push(SourceFile {
            path: path.into(),
            content,
            line_index,
        });
        id
    }

    pub fn get_file(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
