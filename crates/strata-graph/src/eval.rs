//! Expansion, lookup and resolution of nodes.
//!
//! `expand` resolves delayed references one layer deep, `resolve`
//! scalarizes. Both are memoized per node through [`Engine::run`]. Scope
//! nodes (`Context`, `Placeholder`, `Search`, `Inherited`) forward to the
//! node they stand for without an operation of their own.

use crate::build::Builder;
use crate::engine::Engine;
use crate::error::GraphError;
use crate::executor::{Caller, Method, OpKey, Output};
use crate::node::{AccessKey, Key, Literal, NodeId, NodeKind, Scope};
use crate::ops::{BinaryOp, apply_binary, apply_unary, loose_eq};
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use strata_source_map::SourceInfo;

impl Engine {
    /// Expand a node; `None` when it stands for nothing.
    pub(crate) fn expand_opt(&mut self, caller: Caller, node: NodeId) -> Result<Option<NodeId>, GraphError> {
        if self.executor.is_peeking(node) {
            // Read during its own decision: see what it overlays instead
            self.executor.mark_stale(node);
            return match self.graph.predecessor(node) {
                Some(predecessor) => self.expand_opt(caller, predecessor),
                None => Ok(None),
            };
        }
        match self.graph.kind(node).clone() {
            NodeKind::Scalar(_) | NodeKind::Sequence(_) | NodeKind::MergedString(_) => Ok(Some(node)),
            NodeKind::Context { value, .. } | NodeKind::Placeholder(value) => match value {
                Some(value) => self.expand_opt(caller, value),
                None => Ok(None),
            },
            NodeKind::Search { .. } => match self.graph.predecessor(node) {
                Some(predecessor) => self.expand_opt(caller, predecessor),
                None => Ok(None),
            },
            NodeKind::Inherited { container, key } => {
                match self.get_opt(caller, container, &Key::Name(key))? {
                    Some(child) => self.expand_opt(caller, child),
                    None => Ok(None),
                }
            }
            _ => {
                let output = self.run(caller, OpKey::new(node, Method::Expand), |engine, caller| {
                    engine.compute_expand(caller, node).map(Output::Node)
                })?;
                match output {
                    Output::Node(expanded) => Ok(expanded),
                    other => Err(unexpected_output(node, &other)),
                }
            }
        }
    }

    pub(crate) fn expand(&mut self, caller: Caller, node: NodeId) -> Result<NodeId, GraphError> {
        self.expand_opt(caller, node)?
            .ok_or_else(|| self.no_matching(node))
    }

    fn compute_expand(&mut self, caller: Caller, node: NodeId) -> Result<Option<NodeId>, GraphError> {
        match self.graph.kind(node).clone() {
            NodeKind::Mapping(_) => {
                self.check_overlay(caller, node)?;
                Ok(Some(node))
            }
            NodeKind::Access { container, key } => {
                let target = self.access(caller, node, container, &key)?;
                self.expand_opt(caller, target)
            }
            NodeKind::Append { addend } => self.expand_list_action(caller, node, addend, true),
            NodeKind::Remove { subtrahend } => self.expand_list_action(caller, node, subtrahend, false),
            NodeKind::Copy { source } => {
                let value = self.resolve_in(caller, source)?;
                Ok(Some(self.materialize(node, &value)))
            }
            NodeKind::For { .. } => self.expand_for(caller, node).map(Some),
            NodeKind::If { .. } | NodeKind::Select { .. } => self.expand_decision(caller, node),
            NodeKind::Call { .. } => self.expand_call(caller, node),
            NodeKind::Include { .. } => self.expand_include(caller, node),
            NodeKind::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => match self.resolve_in(caller, left) {
                Ok(value) if value.is_truthy() => self.expand_opt(caller, left),
                Ok(_) => self.expand_opt(caller, right),
                Err(e) if e.is_no_matching() => self.expand_opt(caller, right),
                Err(e) => Err(e),
            },
            NodeKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let chosen = if self.resolve_in(caller, condition)?.is_truthy() {
                    then
                } else {
                    otherwise
                };
                self.expand_opt(caller, chosen)
            }
            NodeKind::Binary { .. } | NodeKind::Unary { .. } => {
                let value = self.resolve_in(caller, node)?;
                Ok(Some(self.materialize(node, &value)))
            }
            NodeKind::Scalar(_)
            | NodeKind::Sequence(_)
            | NodeKind::MergedString(_)
            | NodeKind::Context { .. }
            | NodeKind::Placeholder(_)
            | NodeKind::Search { .. }
            | NodeKind::Inherited { .. } => Err(GraphError::Programming(format!(
                "{} {node} has no expansion of its own",
                self.graph.kind(node).name()
            ))),
        }
    }

    /// A mapping may only overlay a mapping, or nothing.
    fn check_overlay(&mut self, caller: Caller, node: NodeId) -> Result<(), GraphError> {
        let Some(predecessor) = self.graph.predecessor(node) else {
            return Ok(());
        };
        if !matches!(
            self.graph.kind(predecessor),
            NodeKind::Inherited { .. } | NodeKind::Placeholder(_)
        ) {
            return Ok(());
        }
        let Some(previous) = self.expand_opt(caller, predecessor)? else {
            return Ok(());
        };
        match self.graph.kind(previous) {
            NodeKind::Scalar(Literal::Null) => Ok(()),
            kind @ (NodeKind::Scalar(_) | NodeKind::Sequence(_) | NodeKind::MergedString(_)) => {
                Err(GraphError::OverlayMismatch {
                    key: self.graph.describe(predecessor),
                    existing: kind.name().to_string(),
                    incoming: "mapping".to_string(),
                    source_info: self.graph.source_info(node).clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Synthesize the sequence produced by `append` or `remove`.
    fn expand_list_action(
        &mut self,
        caller: Caller,
        node: NodeId,
        operand: NodeId,
        append: bool,
    ) -> Result<Option<NodeId>, GraphError> {
        let verb = if append { "append to" } else { "remove from" };
        let existing = match self.graph.predecessor(node) {
            Some(predecessor) => match self.expand_opt(caller, predecessor)? {
                Some(previous) => self.sequence_items(previous, node, verb)?,
                None => Vec::new(),
            },
            None => Vec::new(),
        };
        let expanded = self.expand(caller, operand)?;
        let operand_items = self.sequence_items(expanded, node, if append { "append" } else { "remove" })?;

        let items = if append {
            existing.into_iter().chain(operand_items).collect()
        } else {
            let mut removed = Vec::with_capacity(operand_items.len());
            for item in operand_items {
                removed.push(self.resolve_in(caller, item)?);
            }
            let mut kept = Vec::with_capacity(existing.len());
            for item in existing {
                let value = self.resolve_in(caller, item)?;
                if !removed.iter().any(|r| loose_eq(r, &value)) {
                    kept.push(item);
                }
            }
            kept
        };
        let origin = SourceInfo::generated(self.graph.source_info(node));
        let parent = self.graph.parent(node);
        Ok(Some(self.graph.push(NodeKind::Sequence(items), parent, None, origin)))
    }

    fn sequence_items(&self, expanded: NodeId, anchor: NodeId, verb: &str) -> Result<Vec<NodeId>, GraphError> {
        match self.graph.kind(expanded) {
            NodeKind::Sequence(items) => Ok(items.clone()),
            NodeKind::Scalar(Literal::Null) => Ok(Vec::new()),
            other => Err(GraphError::type_error(
                format!("cannot {verb} a {}", other.name()),
                self.graph.source_info(anchor).clone(),
            )),
        }
    }

    /// Scalarize a node.
    pub(crate) fn resolve_in(&mut self, caller: Caller, node: NodeId) -> Result<Value, GraphError> {
        if self.executor.is_peeking(node) {
            self.executor.mark_stale(node);
            return match self.graph.predecessor(node) {
                Some(predecessor) => self.resolve_in(caller, predecessor),
                None => Err(self.no_matching(node)),
            };
        }
        match self.graph.kind(node).clone() {
            NodeKind::Scalar(literal) => return Ok(literal.value()),
            NodeKind::Context { value, .. } | NodeKind::Placeholder(value) => {
                return match value {
                    Some(value) => self.resolve_in(caller, value),
                    None => Err(self.no_matching(node)),
                };
            }
            NodeKind::Search { .. } => {
                return match self.graph.predecessor(node) {
                    Some(predecessor) => self.resolve_in(caller, predecessor),
                    None => Err(self.no_matching(node)),
                };
            }
            NodeKind::Inherited { container, key } => {
                return match self.get_opt(caller, container, &Key::Name(key))? {
                    Some(child) => self.resolve_in(caller, child),
                    None => Err(self.no_matching(node)),
                };
            }
            _ => {}
        }
        let output = self.run(caller, OpKey::new(node, Method::Resolve), |engine, caller| {
            engine.compute_resolve(caller, node).map(Output::Value)
        })?;
        match output {
            Output::Value(value) => Ok(value),
            other => Err(unexpected_output(node, &other)),
        }
    }

    fn compute_resolve(&mut self, caller: Caller, node: NodeId) -> Result<Value, GraphError> {
        match self.graph.kind(node).clone() {
            NodeKind::Scalar(literal) => Ok(literal.value()),
            NodeKind::MergedString(parts) => {
                let mut text = String::new();
                for part in parts {
                    let value = self.resolve_in(caller, part)?;
                    match value.interpolate() {
                        Some(piece) => text.push_str(&piece),
                        None => {
                            return Err(GraphError::type_error(
                                format!("cannot interpolate a {} into a string", value.type_name()),
                                self.graph.source_info(part).clone(),
                            ));
                        }
                    }
                }
                Ok(Value::String(text))
            }
            NodeKind::Sequence(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.resolve_in(caller, item)?);
                }
                Ok(Value::List(values))
            }
            NodeKind::Mapping(_) => {
                self.expand(caller, node)?;
                let mut entries = IndexMap::new();
                for key in self.keys_in(caller, node)? {
                    let child = self.get_in(caller, node, &Key::Name(key.clone()))?;
                    entries.insert(key, self.resolve_in(caller, child)?);
                }
                Ok(Value::Map(entries))
            }
            NodeKind::Access { container, key } => {
                let target = self.access(caller, node, container, &key)?;
                self.resolve_in(caller, target)
            }
            NodeKind::Binary { op, left, right } => self.resolve_binary(caller, node, op, left, right),
            NodeKind::Unary { op, operand } => {
                let value = self.resolve_in(caller, operand)?;
                apply_unary(op, &value)
                    .map_err(|e| GraphError::type_error(e.0, self.graph.source_info(node).clone()))
            }
            NodeKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.resolve_in(caller, condition)?.is_truthy() {
                    self.resolve_in(caller, then)
                } else {
                    self.resolve_in(caller, otherwise)
                }
            }
            _ => {
                let expanded = self.expand(caller, node)?;
                self.resolve_in(caller, expanded)
            }
        }
    }

    fn resolve_binary(
        &mut self,
        caller: Caller,
        node: NodeId,
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    ) -> Result<Value, GraphError> {
        match op {
            // A missing left operand is as good as a falsy one
            BinaryOp::Or => match self.resolve_in(caller, left) {
                Ok(value) if value.is_truthy() => Ok(value),
                Ok(_) => self.resolve_in(caller, right),
                Err(e) if e.is_no_matching() => self.resolve_in(caller, right),
                Err(e) => Err(e),
            },
            BinaryOp::And => {
                if !self.resolve_in(caller, left)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.resolve_in(caller, right)?.is_truthy()))
            }
            _ => {
                let left = self.resolve_in(caller, left)?;
                let right = self.resolve_in(caller, right)?;
                apply_binary(op, &left, &right)
                    .map_err(|e| GraphError::type_error(e.0, self.graph.source_info(node).clone()))
            }
        }
    }

    /// Keys visible on a mapping: inherited keys first, then new local ones.
    pub(crate) fn keys_in(&mut self, caller: Caller, node: NodeId) -> Result<Vec<String>, GraphError> {
        let expanded = self.expand(caller, node)?;
        let output = self.run(caller, OpKey::new(expanded, Method::Keys), |engine, caller| {
            engine.compute_keys(caller, expanded).map(Output::Keys)
        })?;
        match output {
            Output::Keys(keys) => Ok(keys),
            other => Err(unexpected_output(node, &other)),
        }
    }

    fn compute_keys(&mut self, caller: Caller, expanded: NodeId) -> Result<Vec<String>, GraphError> {
        let mut layers = Vec::new();
        let mut current = Some(expanded);
        while let Some(layer) = current {
            let NodeKind::Mapping(entries) = self.graph.kind(layer) else {
                if layer == expanded {
                    return Err(GraphError::type_error(
                        format!("a {} has no keys", self.graph.kind(layer).name()),
                        self.graph.source_info(layer).clone(),
                    ));
                }
                break;
            };
            layers.push(entries.keys().cloned().collect::<Vec<_>>());
            current = match self.graph.predecessor(layer) {
                Some(predecessor) => self.expand_opt(caller, predecessor)?,
                None => None,
            };
        }
        let mut keys = IndexSet::new();
        for layer in layers.into_iter().rev() {
            keys.extend(layer);
        }
        Ok(keys.into_iter().collect())
    }

    /// The child at `key`, searching the overlay chain; `None` if no layer
    /// defines it.
    pub(crate) fn get_opt(&mut self, caller: Caller, node: NodeId, key: &Key) -> Result<Option<NodeId>, GraphError> {
        let Some(expanded) = self.expand_opt(caller, node)? else {
            return Ok(None);
        };
        match self.graph.kind(expanded) {
            NodeKind::Mapping(_) => {}
            NodeKind::Sequence(items) => return self.index(expanded, items.clone(), key).map(Some),
            other => {
                return Err(GraphError::type_error(
                    format!("cannot look up `{key}` in a {}", other.name()),
                    self.graph.source_info(node).clone(),
                ));
            }
        }

        let name = key.to_name();
        let mut current = Some(expanded);
        while let Some(layer) = current {
            let NodeKind::Mapping(entries) = self.graph.kind(layer) else {
                break;
            };
            if let Some(child) = entries.get(&name) {
                return Ok(Some(*child));
            }
            current = match self.graph.predecessor(layer) {
                Some(predecessor) => self.expand_opt(caller, predecessor)?,
                None => None,
            };
        }
        Ok(None)
    }

    pub(crate) fn get_in(&mut self, caller: Caller, node: NodeId, key: &Key) -> Result<NodeId, GraphError> {
        self.get_opt(caller, node, key)?.ok_or_else(|| {
            GraphError::no_matching(format!("`{key}`"), self.graph.source_info(node).clone())
        })
    }

    fn index(&self, sequence: NodeId, items: Vec<NodeId>, key: &Key) -> Result<NodeId, GraphError> {
        let source_info = || self.graph.source_info(sequence).clone();
        let Key::Index(index) = key else {
            return Err(GraphError::index(
                format!("sequence index must be an integer, not `{key}`"),
                source_info(),
            ));
        };
        let len = items.len() as i64;
        let position = if *index < 0 { index + len } else { *index };
        usize::try_from(position)
            .ok()
            .and_then(|position| items.get(position).copied())
            .ok_or_else(|| {
                GraphError::index(
                    format!("index {index} is out of range for a sequence of {len} items"),
                    source_info(),
                )
            })
    }

    /// The node a delayed lookup refers to.
    fn access(
        &mut self,
        caller: Caller,
        node: NodeId,
        container: Option<NodeId>,
        key: &AccessKey,
    ) -> Result<NodeId, GraphError> {
        let source_info = self.graph.source_info(node).clone();
        let Some(container) = container else {
            let AccessKey::Name(name) = key else {
                return Err(GraphError::Programming(format!(
                    "name lookup at {node} has no name"
                )));
            };
            return self
                .lookup_name(caller, node, name)?
                .ok_or_else(|| GraphError::no_matching(format!("`{name}`"), source_info));
        };
        let key = match key {
            AccessKey::Name(name) => Key::Name(name.clone()),
            AccessKey::Index(index) => Key::Index(*index),
            AccessKey::Expr(expr) => match self.resolve_in(caller, *expr)? {
                Value::Integer(index) => Key::Index(index),
                Value::String(name) => Key::Name(name),
                other => {
                    return Err(GraphError::type_error(
                        format!("subscript must be an integer or a string, not a {}", other.type_name()),
                        source_info,
                    ));
                }
            },
        };
        self.get_opt(caller, container, &key)?.ok_or_else(|| {
            GraphError::no_matching(format!("`{}`", self.graph.describe(node)), source_info)
        })
    }

    /// Find a name: the nearest scope binding, `here`/`self`, then the
    /// document root.
    fn lookup_name(&mut self, caller: Caller, node: NodeId, name: &str) -> Result<Option<NodeId>, GraphError> {
        let mut current = self.graph.parent(node);
        while let Some(scope) = current {
            if let NodeKind::Context {
                scope: kind,
                value,
                bindings,
            } = self.graph.kind(scope)
            {
                if let Some(bound) = bindings.get(name) {
                    return Ok(Some(*bound));
                }
                if *kind == Scope::Block && (name == "here" || name == "self") {
                    return Ok(*value);
                }
            }
            current = self.graph.parent(scope);
        }
        let root = self.root()?;
        self.get_opt(caller, root, &Key::Name(name.to_string()))
    }

    /// Turn a resolved value into nodes anchored at `node`.
    pub(crate) fn materialize(&mut self, node: NodeId, value: &Value) -> NodeId {
        let parent = self.graph.parent(node);
        let source_info = self.graph.source_info(node).clone();
        Builder::new(&mut self.graph).materialize(value, parent, &source_info)
    }

    pub(crate) fn no_matching(&self, node: NodeId) -> GraphError {
        GraphError::no_matching(
            format!("`{}`", self.graph.describe(node)),
            self.graph.source_info(node).clone(),
        )
    }
}

fn unexpected_output(node: NodeId, output: &Output) -> GraphError {
    GraphError::Programming(format!("operation on node {node} produced {output:?}"))
}
