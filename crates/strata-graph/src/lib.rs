//! Lazy overlay resolution for strata configuration documents.
//!
//! A document is a stack of overlays: every mapping entry, directive and
//! included file is a layer on top of whatever was declared before it.
//! Nothing is evaluated when a document is loaded. Values are computed on
//! demand by walking the layer chain, and every computation is memoized by
//! an [`Executor`] that also detects cycles and paradoxes.
//!
//! # Architecture
//!
//! - [`syntax`]: the parsed document handed over by a front-end
//! - [`Graph`]: an arena of [`NodeKind`] nodes built from the syntax
//! - [`Engine`]: owns the graph, the executor and the document loader
//! - [`GraphError`]: every failure, renderable as a diagnostic
//!
//! # Example
//!
//! ```rust
//! use strata_graph::syntax::{Action, Document, Statement, Syntax};
//! use strata_graph::{Engine, Value};
//!
//! let mut engine = Engine::default();
//! engine
//!     .load_document(&Document::new(vec![
//!         Statement::entry("ports", Syntax::sequence(vec![Syntax::scalar("80")])),
//!         Statement::with_action("ports", Action::Append, Syntax::sequence(vec![
//!             Syntax::scalar("443"),
//!         ])),
//!     ]))
//!     .unwrap();
//! assert_eq!(
//!     engine.resolve_path(&["ports"]).unwrap(),
//!     Value::List(vec![Value::Integer(80), Value::Integer(443)])
//! );
//! ```

pub mod error;
pub mod executor;
pub mod loader;
pub mod node;
pub mod ops;
pub mod options;
pub mod syntax;
pub mod value;

mod build;
mod directive;
mod engine;
mod eval;

pub use engine::Engine;
pub use error::GraphError;
pub use executor::{Caller, Executor, Method, OpId, OpKey, OpState, Output};
pub use loader::{
    DocumentParser, FileSystemLoader, LoadError, Loader, MemoryLoader, NullLoader, Opened,
};
pub use node::{Graph, Key, Literal, NodeId, NodeKind, Scope};
pub use ops::{BinaryOp, UnaryOp};
pub use options::EngineOptions;
pub use value::Value;

// Re-export for convenience
pub use strata_source_map::SourceInfo;
