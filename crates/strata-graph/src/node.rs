//! The node arena.
//!
//! Nodes live in a single vector and refer to each other by [`NodeId`].
//! Three relations share the arena: the lexical `parent` (used for name
//! lookup), the overlay `predecessor` (what a node shadows) and the ids held
//! inside each [`NodeKind`]. Links always point at nodes created earlier
//! than the linking node, except for a few back-filled during construction.

use crate::ops::{BinaryOp, UnaryOp};
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use strata_source_map::SourceInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }

    pub(crate) fn from_index(index: usize) -> Self {
        NodeId(index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A key used to look a child up in an expanded container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(String),
    Index(i64),
}

impl Key {
    /// Integer-looking path segments select sequence items.
    pub fn parse(segment: &str) -> Key {
        match segment.parse::<i64>() {
            Ok(i) => Key::Index(i),
            Err(_) => Key::Name(segment.to_string()),
        }
    }

    /// The key as a mapping key.
    pub fn to_name(&self) -> String {
        match self {
            Key::Name(name) => name.clone(),
            Key::Index(i) => i.to_string(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => write!(f, "{name}"),
            Key::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl From<&str> for Key {
    fn from(segment: &str) -> Self {
        Key::parse(segment)
    }
}

/// Literal scalars. `Raw` is unquoted source text, boxed when resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Raw(String),
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Literal {
    pub fn value(&self) -> Value {
        match self {
            Literal::Raw(text) => Value::box_scalar(text),
            Literal::Text(text) => Value::String(text.clone()),
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(x) => Value::Float(*x),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
        }
    }

    pub fn from_value(value: &Value) -> Option<Literal> {
        Some(match value {
            Value::Null => Literal::Null,
            Value::Bool(b) => Literal::Bool(*b),
            Value::Integer(i) => Literal::Integer(*i),
            Value::Float(x) => Literal::Float(*x),
            Value::String(s) => Literal::Text(s.clone()),
            Value::List(_) | Value::Map(_) => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// A mapping block; `set` bindings, `here` and `self`
    Block,
    /// One iteration of a `for`
    Loop,
    /// One macro invocation
    Call,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccessKey {
    Name(String),
    Index(i64),
    /// Computed subscript
    Expr(NodeId),
}

/// A contiguous range of nodes cloned per loop iteration or macro call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub start: NodeId,
    /// Exclusive
    pub end: NodeId,
    pub root: NodeId,
    pub filter: Option<NodeId>,
    /// Stands in for the call site's predecessor in macro bodies
    pub placeholder: Option<NodeId>,
}

impl Template {
    fn contains(&self, id: NodeId) -> bool {
        self.start <= id && id < self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Scalar(Literal),
    Sequence(Vec<NodeId>),
    /// One overlay layer; anything not found locally is looked up in the
    /// predecessor
    Mapping(IndexMap<String, NodeId>),
    MergedString(Vec<NodeId>),
    /// Delayed lookup; without a container the key is a name
    Access {
        container: Option<NodeId>,
        key: AccessKey,
    },
    /// Whatever `container` held at `key`, absent if nothing did
    Inherited { container: NodeId, key: String },
    Placeholder(Option<NodeId>),
    Append { addend: NodeId },
    Remove { subtrahend: NodeId },
    Copy { source: NodeId },
    Context {
        scope: Scope,
        value: Option<NodeId>,
        bindings: IndexMap<String, NodeId>,
    },
    For {
        target: String,
        iterable: NodeId,
        body: Template,
    },
    If {
        branches: Vec<(NodeId, NodeId)>,
        otherwise: Option<NodeId>,
    },
    Select {
        key: NodeId,
        cases: Vec<(String, NodeId)>,
    },
    Call {
        name: String,
        arguments: IndexMap<String, NodeId>,
    },
    Include { uri: NodeId },
    Search { uri: NodeId },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Unary { op: UnaryOp, operand: NodeId },
    Conditional {
        condition: NodeId,
        then: NodeId,
        otherwise: NodeId,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Scalar(_) => "scalar",
            NodeKind::Sequence(_) => "sequence",
            NodeKind::Mapping(_) => "mapping",
            NodeKind::MergedString(_) => "string template",
            NodeKind::Access { .. } => "reference",
            NodeKind::Inherited { .. } => "inherited value",
            NodeKind::Placeholder(_) => "macro predecessor",
            NodeKind::Append { .. } => "append",
            NodeKind::Remove { .. } => "remove",
            NodeKind::Copy { .. } => "copy",
            NodeKind::Context { .. } => "scope",
            NodeKind::For { .. } => "for directive",
            NodeKind::If { .. } => "if directive",
            NodeKind::Select { .. } => "select directive",
            NodeKind::Call { .. } => "macro call",
            NodeKind::Include { .. } => "include directive",
            NodeKind::Search { .. } => "search directive",
            NodeKind::Binary { .. } | NodeKind::Unary { .. } => "expression",
            NodeKind::Conditional { .. } => "conditional expression",
        }
    }

    fn remap(&mut self, f: &impl Fn(NodeId) -> NodeId) {
        let opt = |id: &mut Option<NodeId>| {
            if let Some(inner) = id {
                *inner = f(*inner);
            }
        };
        match self {
            NodeKind::Scalar(_) => {}
            NodeKind::Sequence(items) | NodeKind::MergedString(items) => {
                for item in items {
                    *item = f(*item);
                }
            }
            NodeKind::Mapping(entries) => {
                for id in entries.values_mut() {
                    *id = f(*id);
                }
            }
            NodeKind::Access { container, key } => {
                opt(container);
                if let AccessKey::Expr(id) = key {
                    *id = f(*id);
                }
            }
            NodeKind::Inherited { container, .. } => *container = f(*container),
            NodeKind::Placeholder(target) => opt(target),
            NodeKind::Append { addend: id }
            | NodeKind::Remove { subtrahend: id }
            | NodeKind::Copy { source: id }
            | NodeKind::Include { uri: id }
            | NodeKind::Search { uri: id }
            | NodeKind::Unary { operand: id, .. } => *id = f(*id),
            NodeKind::Context {
                value, bindings, ..
            } => {
                opt(value);
                for id in bindings.values_mut() {
                    *id = f(*id);
                }
            }
            NodeKind::For { iterable, body, .. } => {
                *iterable = f(*iterable);
                // A nested template moves as one block with its enclosing copy
                let (old, new) = (body.start.index(), f(body.start).index());
                if old != new {
                    let shift = |id: NodeId| NodeId::from_index(id.index() - old + new);
                    body.start = shift(body.start);
                    body.end = shift(body.end);
                    body.root = shift(body.root);
                    body.filter = body.filter.map(shift);
                    body.placeholder = body.placeholder.map(shift);
                }
            }
            NodeKind::If {
                branches,
                otherwise,
            } => {
                for (condition, block) in branches {
                    *condition = f(*condition);
                    *block = f(*block);
                }
                opt(otherwise);
            }
            NodeKind::Select { key, cases } => {
                *key = f(*key);
                for (_, block) in cases {
                    *block = f(*block);
                }
            }
            NodeKind::Call { arguments, .. } => {
                for id in arguments.values_mut() {
                    *id = f(*id);
                }
            }
            NodeKind::Binary { left, right, .. } => {
                *left = f(*left);
                *right = f(*right);
            }
            NodeKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                *condition = f(*condition);
                *then = f(*then);
                *otherwise = f(*otherwise);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Lexical parent, for name lookup
    pub parent: Option<NodeId>,
    /// The node this one overlays
    pub predecessor: Option<NodeId>,
    pub source_info: SourceInfo,
}

/// Roots and nodes of the loaded cloned instance of a [`Template`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instance {
    pub root: NodeId,
    pub filter: Option<NodeId>,
}

/// Every node ever created, plus the registered macros.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    macros: HashMap<String, Template>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        kind: NodeKind,
        parent: Option<NodeId>,
        predecessor: Option<NodeId>,
        source_info: SourceInfo,
    ) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent,
            predecessor,
            source_info,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn predecessor(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].predecessor
    }

    pub fn source_info(&self, id: NodeId) -> &SourceInfo {
        &self.nodes[id.index()].source_info
    }

    /// Back-fill a node whose children were created after it.
    pub(crate) fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id.index()].kind = kind;
    }

    pub(crate) fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.index()].kind
    }

    /// The id the next pushed node will get.
    pub fn next_id(&self) -> NodeId {
        NodeId::from_index(self.nodes.len())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub(crate) fn define_macro(&mut self, name: &str, template: Template) {
        self.macros.insert(name.to_string(), template);
    }

    pub fn macro_template(&self, name: &str) -> Option<Template> {
        self.macros.get(name).copied()
    }

    /// Short human description of a node for error messages.
    pub fn describe(&self, id: NodeId) -> String {
        match self.kind(id) {
            NodeKind::Access { container, key } => {
                let key = match key {
                    AccessKey::Name(name) => name.clone(),
                    AccessKey::Index(i) => format!("[{i}]"),
                    AccessKey::Expr(_) => "[...]".to_string(),
                };
                match container {
                    Some(container) => format!("{}.{}", self.describe(*container), key),
                    None => key,
                }
            }
            NodeKind::Inherited { key, .. } => key.clone(),
            NodeKind::Call { name, .. } => format!("call {name}"),
            kind => kind.name().to_string(),
        }
    }

    /// Copy a template's nodes, rewiring links that stay inside the range.
    ///
    /// The copy's root and filter are reparented to `parent`. In macro
    /// templates the placeholder is pointed at `predecessor`.
    pub fn instantiate(
        &mut self,
        template: &Template,
        parent: NodeId,
        predecessor: Option<NodeId>,
    ) -> Instance {
        let base = self.nodes.len();
        let start = template.start.index();
        let remap = |id: NodeId| {
            if template.contains(id) {
                NodeId::from_index(id.index() - start + base)
            } else {
                id
            }
        };
        for index in start..template.end.index() {
            let mut node = self.nodes[index].clone();
            node.kind.remap(&remap);
            node.parent = node.parent.map(remap);
            node.predecessor = node.predecessor.map(remap);
            self.nodes.push(node);
        }

        let root = remap(template.root);
        self.nodes[root.index()].parent = Some(parent);
        let filter = template.filter.map(remap);
        if let Some(filter) = filter {
            self.nodes[filter.index()].parent = Some(parent);
        }
        if let Some(placeholder) = template.placeholder {
            self.set_kind(remap(placeholder), NodeKind::Placeholder(predecessor));
        }
        Instance { root, filter }
    }
}
