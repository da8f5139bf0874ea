//! Collaborators that fetch and parse included documents.
//!
//! The core never touches URIs itself. An [`Engine`](crate::Engine) asks its
//! [`Loader`] for raw bytes and its [`DocumentParser`] for a syntax tree.

use crate::error::GraphError;
use crate::syntax::Document;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use strata_source_map::FileId;
use thiserror::Error;

/// Content returned by a successful [`Loader::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    pub content: Vec<u8>,
    /// Opaque version tag, if the loader can provide one
    pub etag: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("not found")]
    NotFound,

    /// The caller's cached copy is current. Only meaningful to loaders that
    /// cache; the core holds no such cache.
    #[error("not modified")]
    NotModified,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Fetches documents by URI.
pub trait Loader {
    fn open(&self, uri: &str) -> Result<Opened, LoadError>;
}

/// Turns document text into the syntax tree the graph consumes.
pub trait DocumentParser {
    /// `file_id` identifies `content` in the engine's source context, for
    /// anchoring the tree's source infos.
    fn parse(&self, content: &str, file_id: FileId) -> Result<Document, GraphError>;
}

impl<F> DocumentParser for F
where
    F: Fn(&str, FileId) -> Result<Document, GraphError>,
{
    fn parse(&self, content: &str, file_id: FileId) -> Result<Document, GraphError> {
        self(content, file_id)
    }
}

/// Loader that finds nothing. The default when includes are not expected.
#[derive(Debug, Clone, Default)]
pub struct NullLoader;

impl Loader for NullLoader {
    fn open(&self, _uri: &str) -> Result<Opened, LoadError> {
        Err(LoadError::NotFound)
    }
}

/// Loader backed by an in-memory map. Useful for tests and bundled documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    documents: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, uri: impl Into<String>, content: impl Into<String>) -> &mut Self {
        self.documents.insert(uri.into(), content.into());
        self
    }

    pub fn with_documents(
        documents: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        let mut loader = Self::new();
        for (uri, content) in documents {
            loader.add(uri, content);
        }
        loader
    }
}

impl Loader for MemoryLoader {
    fn open(&self, uri: &str) -> Result<Opened, LoadError> {
        self.documents
            .get(uri)
            .map(|content| Opened {
                content: content.clone().into_bytes(),
                etag: None,
            })
            .ok_or(LoadError::NotFound)
    }
}

/// Loader that reads files relative to a root directory.
///
/// Absolute URIs are read as given. The etag is derived from the file's
/// modification time and length.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root: PathBuf,
}

impl FileSystemLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSystemLoader { root: root.into() }
    }

    fn path_for(&self, uri: &str) -> PathBuf {
        let uri = uri.strip_prefix("file://").unwrap_or(uri);
        let path = Path::new(uri);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Loader for FileSystemLoader {
    fn open(&self, uri: &str) -> Result<Opened, LoadError> {
        let path = self.path_for(uri);
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(LoadError::NotFound),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(LoadError::NotFound),
            Err(e) => return Err(e.into()),
        };
        let content = std::fs::read(&path)?;
        let etag = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|age| format!("{}-{}", age.as_nanos(), metadata.len()));
        Ok(Opened { content, etag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::with_documents([("a.yaml", "a: 1")]);
        assert_eq!(loader.open("a.yaml").unwrap().content, b"a: 1");
        assert!(matches!(loader.open("b.yaml"), Err(LoadError::NotFound)));
    }

    #[test]
    fn test_null_loader() {
        assert!(matches!(NullLoader.open("anything"), Err(LoadError::NotFound)));
    }

    #[test]
    fn test_file_system_loader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.yaml"), "x: 1\n").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let loader = FileSystemLoader::new(dir.path());
        let opened = loader.open("base.yaml").unwrap();
        assert_eq!(opened.content, b"x: 1\n");
        assert!(opened.etag.is_some());

        let absolute = dir.path().join("base.yaml");
        assert!(loader.open(absolute.to_str().unwrap()).is_ok());
        assert!(matches!(loader.open("missing.yaml"), Err(LoadError::NotFound)));
        assert!(matches!(loader.open("sub"), Err(LoadError::NotFound)));
    }
}
