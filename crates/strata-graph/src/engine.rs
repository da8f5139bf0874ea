//! The public facade over graph, executor and collaborators.

use crate::build::Builder;
use crate::error::GraphError;
use crate::executor::{Caller, Entry, Executor, OpKey, Output};
use crate::loader::{DocumentParser, LoadError, Loader, NullLoader};
use crate::node::{Graph, Key, NodeId};
use crate::options::EngineOptions;
use crate::syntax::Document;
use crate::value::Value;
use strata_source_map::{FileId, SourceContext, SourceInfo};
use tracing::{debug, warn};

/// Loads documents into one overlay graph and resolves it on demand.
///
/// ```
/// use strata_graph::syntax::{Document, Expr, Statement, Syntax};
/// use strata_graph::{Engine, Value};
///
/// let mut engine = Engine::default();
/// engine
///     .load_document(&Document::new(vec![
///         Statement::entry("b", Syntax::expr(Expr::name("a"))),
///         Statement::entry("a", Syntax::scalar("c")),
///     ]))
///     .unwrap();
/// assert_eq!(engine.resolve_path(&["b"]).unwrap(), Value::from("c"));
/// ```
pub struct Engine {
    pub(crate) graph: Graph,
    pub(crate) executor: Executor,
    pub(crate) options: EngineOptions,
    pub(crate) loader: Box<dyn Loader>,
    pub(crate) parser: Option<Box<dyn DocumentParser>>,
    pub(crate) sources: SourceContext,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(EngineOptions::default())
    }
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        Engine {
            graph: Graph::new(),
            executor: Executor::new(options.max_depth),
            options,
            loader: Box::new(NullLoader),
            parser: None,
            sources: SourceContext::new(),
        }
    }

    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_parser(mut self, parser: impl DocumentParser + 'static) -> Self {
        self.parser = Some(Box::new(parser));
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn source_context(&self) -> &SourceContext {
        &self.sources
    }

    /// Overlay a document onto everything loaded so far.
    ///
    /// Results memoized before the load are discarded.
    pub fn load_document(&mut self, document: &Document) -> Result<NodeId, GraphError> {
        let before = self.graph.len();
        let predecessor = self.graph.root();
        let root = Builder::new(&mut self.graph).build_document(document, predecessor, None)?;
        self.graph.set_root(root);
        self.executor.reset();
        debug!(nodes = self.graph.len() - before, "document loaded");
        Ok(root)
    }

    /// Register `content` under `name`, parse it and load it.
    pub fn load_source(&mut self, name: &str, content: &str) -> Result<NodeId, GraphError> {
        let file_id = self.sources.add_file(name, Some(content.to_string()));
        let document = self.parse(content, file_id)?;
        self.load_document(&document)
    }

    /// Fetch a document through the loader and load it.
    pub fn load_uri(&mut self, uri: &str) -> Result<NodeId, GraphError> {
        let anchor = SourceInfo::default();
        match self.open(uri, &anchor)? {
            Some(content) => self.load_source(uri, &content),
            None => Err(GraphError::NotFound {
                uri: uri.to_string(),
                source_info: anchor,
            }),
        }
    }

    /// Resolve the whole configuration.
    pub fn resolve(&mut self) -> Result<Value, GraphError> {
        let root = self.root()?;
        self.resolve_node(root)
    }

    pub fn resolve_node(&mut self, node: NodeId) -> Result<Value, GraphError> {
        self.resolve_in(Caller::root(), node)
    }

    /// Resolve the value at a path of keys; integer segments index sequences.
    pub fn resolve_path(&mut self, path: &[&str]) -> Result<Value, GraphError> {
        let node = self.node_at(path)?;
        self.resolve_in(Caller::root(), node)
    }

    /// Expand the value at a path without scalarizing it.
    pub fn expand_path(&mut self, path: &[&str]) -> Result<NodeId, GraphError> {
        let node = self.node_at(path)?;
        self.expand(Caller::root(), node)
    }

    pub fn keys_path(&mut self, path: &[&str]) -> Result<Vec<String>, GraphError> {
        let node = self.node_at(path)?;
        self.keys_in(Caller::root(), node)
    }

    /// Render an error against the documents this engine has loaded.
    pub fn render_error(&self, error: &GraphError) -> String {
        error.to_diagnostic().to_text(Some(&self.sources))
    }

    pub(crate) fn root(&self) -> Result<NodeId, GraphError> {
        self.graph
            .root()
            .ok_or_else(|| GraphError::Programming("no document has been loaded".to_string()))
    }

    fn node_at(&mut self, path: &[&str]) -> Result<NodeId, GraphError> {
        let mut node = self.root()?;
        for segment in path {
            node = self.get_in(Caller::root(), node, &Key::parse(segment))?;
        }
        Ok(node)
    }

    pub(crate) fn parse(&self, content: &str, file_id: FileId) -> Result<Document, GraphError> {
        match &self.parser {
            Some(parser) => parser.parse(content, file_id),
            None => Err(GraphError::Programming(
                "no document parser is configured".to_string(),
            )),
        }
    }

    /// Fetch a document's text; `None` when the loader has nothing at `uri`.
    pub(crate) fn open(&self, uri: &str, anchor: &SourceInfo) -> Result<Option<String>, GraphError> {
        match self.loader.open(uri) {
            Ok(opened) => String::from_utf8(opened.content)
                .map(Some)
                .map_err(|e| GraphError::Load {
                    uri: uri.to_string(),
                    message: e.to_string(),
                    source_info: anchor.clone(),
                }),
            Err(LoadError::NotFound) => Ok(None),
            Err(LoadError::NotModified) => {
                warn!(uri, "loader reported an unchanged document but nothing is cached");
                Err(GraphError::Programming(format!(
                    "loader returned not-modified for `{uri}` with no cached copy"
                )))
            }
            Err(LoadError::Io(e)) => Err(GraphError::Load {
                uri: uri.to_string(),
                message: e.to_string(),
                source_info: anchor.clone(),
            }),
        }
    }

    /// Run `compute` as the memoized operation `key` on behalf of `caller`.
    pub(crate) fn run<F>(&mut self, caller: Caller, key: OpKey, compute: F) -> Result<Output, GraphError>
    where
        F: FnOnce(&mut Self, Caller) -> Result<Output, GraphError>,
    {
        let node = key.node;
        match self.executor.enter(caller, key) {
            Entry::Cached(result) => result,
            Entry::Started(op) => {
                let result = compute(self, Caller(Some(op)));
                self.executor.finish(op, &result);
                result
            }
            Entry::Cycle => Err(GraphError::Cycle {
                what: format!("`{}`", self.graph.describe(node)),
                source_info: self.graph.source_info(node).clone(),
            }),
            Entry::TooDeep => Err(GraphError::NestingTooDeep {
                max_depth: self.options.max_depth,
                source_info: self.graph.source_info(node).clone(),
            }),
            Entry::Inconsistent => Err(GraphError::Programming(format!(
                "operation on node {node} is running outside the caller's chain"
            ))),
        }
    }
}
