//! Folding syntax trees into the graph.
//!
//! A mapping block becomes a `Context` node whose value is a chain of
//! layers. Consecutive entries share one `Mapping` layer; a repeated key or
//! a directive starts a new one. Each layer's predecessor is the layer
//! before it, and the first layer's predecessor is whatever the block
//! overlays. An entry's previous value is reached through an `Inherited`
//! node on the layer below, so nested mappings overlay key by key.
//!
//! Constant sub-expressions are evaluated here, once, instead of at every
//! resolve.

use crate::error::GraphError;
use crate::node::{AccessKey, Graph, Literal, NodeId, NodeKind, Scope, Template};
use crate::ops::{BinaryOp, apply_binary, apply_unary};
use crate::syntax::{
    Action, Chomp, Document, Expr, ExprKind, ForLoop, Statement, StatementKind, Syntax,
    SyntaxKind, TemplatePart,
};
use crate::value::Value;
use indexmap::IndexMap;
use strata_source_map::SourceInfo;

/// Shape of a value known without evaluating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Mapping,
    Sequence,
    Scalar,
}

impl Shape {
    fn name(self) -> &'static str {
        match self {
            Shape::Mapping => "mapping",
            Shape::Sequence => "sequence",
            Shape::Scalar => "scalar",
        }
    }

    fn conflicts_with(self, other: Shape) -> bool {
        (self == Shape::Mapping) != (other == Shape::Mapping)
    }
}

/// The mapping layer being filled by a run of plain entries.
struct Layer {
    node: NodeId,
    predecessor: Option<NodeId>,
    entries: IndexMap<String, NodeId>,
}

pub(crate) struct Builder<'g> {
    graph: &'g mut Graph,
}

impl<'g> Builder<'g> {
    pub(crate) fn new(graph: &'g mut Graph) -> Self {
        Builder { graph }
    }

    /// Build a document overlaying `predecessor`. Returns its block context.
    pub(crate) fn build_document(
        &mut self,
        document: &Document,
        predecessor: Option<NodeId>,
        parent: Option<NodeId>,
    ) -> Result<NodeId, GraphError> {
        self.build_block(&document.block, predecessor, parent, &document.source_info)
    }

    fn build_block(
        &mut self,
        block: &[Statement],
        predecessor: Option<NodeId>,
        parent: Option<NodeId>,
        source_info: &SourceInfo,
    ) -> Result<NodeId, GraphError> {
        let context = self.graph.push(
            NodeKind::Context {
                scope: Scope::Block,
                value: None,
                bindings: IndexMap::new(),
            },
            parent,
            predecessor,
            source_info.clone(),
        );
        let mut bindings = IndexMap::new();
        let mut top = predecessor;
        let mut layered = false;
        let mut layer: Option<Layer> = None;

        for statement in block {
            let source_info = &statement.source_info;
            match &statement.kind {
                StatementKind::Entry { key, action, value } => {
                    let value = self.build_entry(&mut layer, &mut top, context, key, *action, value, source_info)?;
                    layered = true;
                    if let Some(layer) = layer.as_mut() {
                        layer.entries.insert(key.clone(), value);
                    }
                }
                StatementKind::Extend { key, value } => {
                    let value = self.build_entry(&mut layer, &mut top, context, key, Action::Append, value, source_info)?;
                    layered = true;
                    if let Some(layer) = layer.as_mut() {
                        layer.entries.insert(key.clone(), value);
                    }
                }
                StatementKind::Set { name, value } => {
                    let value = self.build_value(value, None, Some(context))?;
                    bindings.insert(name.clone(), value);
                }
                StatementKind::Macro { name, body } => {
                    self.build_macro(name, body, context)?;
                }
                directive => {
                    self.flush(&mut layer, &mut top);
                    let node = self.build_directive(directive, top, context, source_info)?;
                    top = Some(node);
                    layered = true;
                }
            }
        }
        self.flush(&mut layer, &mut top);

        if !layered {
            let empty = self.graph.push(
                NodeKind::Mapping(IndexMap::new()),
                Some(context),
                predecessor,
                source_info.clone(),
            );
            top = Some(empty);
        }
        self.graph.set_kind(
            context,
            NodeKind::Context {
                scope: Scope::Block,
                value: top,
                bindings,
            },
        );
        Ok(context)
    }

    /// Write the current layer's entries and make it the top of the chain.
    fn flush(&mut self, layer: &mut Option<Layer>, top: &mut Option<NodeId>) {
        if let Some(layer) = layer.take() {
            self.graph.set_kind(layer.node, NodeKind::Mapping(layer.entries));
            *top = Some(layer.node);
        }
    }

    fn build_entry(
        &mut self,
        layer: &mut Option<Layer>,
        top: &mut Option<NodeId>,
        context: NodeId,
        key: &str,
        action: Action,
        value: &Syntax,
        source_info: &SourceInfo,
    ) -> Result<NodeId, GraphError> {
        if layer.as_ref().is_some_and(|layer| layer.entries.contains_key(key)) {
            self.flush(layer, top);
        }
        let layer_predecessor = if let Some(current) = layer.as_ref() {
            current.predecessor
        } else {
            let node = self.graph.push(
                NodeKind::Mapping(IndexMap::new()),
                Some(context),
                *top,
                source_info.clone(),
            );
            *layer = Some(Layer {
                node,
                predecessor: *top,
                entries: IndexMap::new(),
            });
            *top
        };
        let existing = layer_predecessor.map(|container| {
            self.graph.push(
                NodeKind::Inherited {
                    container,
                    key: key.to_string(),
                },
                Some(context),
                None,
                source_info.clone(),
            )
        });

        match action {
            Action::Assign => {
                if let (Some(existing), Some(incoming)) = (existing, syntax_shape(value)) {
                    if let Some(previous) = self.static_shape(existing) {
                        if previous.conflicts_with(incoming) {
                            return Err(GraphError::OverlayMismatch {
                                key: key.to_string(),
                                existing: previous.name().to_string(),
                                incoming: incoming.name().to_string(),
                                source_info: source_info.clone(),
                            });
                        }
                    }
                }
                self.build_value(value, existing, Some(context))
            }
            Action::Append | Action::Remove => {
                let operand = self.build_value(value, None, Some(context))?;
                let kind = if action == Action::Append {
                    NodeKind::Append { addend: operand }
                } else {
                    NodeKind::Remove { subtrahend: operand }
                };
                Ok(self.graph.push(kind, Some(context), existing, source_info.clone()))
            }
            Action::Copy => {
                let node = self.graph.push(
                    NodeKind::Placeholder(None),
                    Some(context),
                    None,
                    source_info.clone(),
                );
                let path = copy_path(value)?;
                let source = self.build_expr(&path, Some(node));
                self.graph.set_kind(node, NodeKind::Copy { source });
                Ok(node)
            }
        }
    }

    fn build_directive(
        &mut self,
        directive: &StatementKind,
        predecessor: Option<NodeId>,
        context: NodeId,
        source_info: &SourceInfo,
    ) -> Result<NodeId, GraphError> {
        let node = self.graph.push(
            NodeKind::Placeholder(None),
            Some(context),
            predecessor,
            source_info.clone(),
        );
        let kind = match directive {
            StatementKind::Include(uri) => NodeKind::Include {
                uri: self.build_expr(uri, Some(node)),
            },
            StatementKind::Search(uri) => NodeKind::Search {
                uri: self.build_expr(uri, Some(node)),
            },
            StatementKind::If {
                branches,
                otherwise,
            } => {
                let mut built = Vec::with_capacity(branches.len());
                for (condition, block) in branches {
                    let condition = self.build_expr(condition, Some(node));
                    let block = self.build_block(block, predecessor, Some(node), source_info)?;
                    built.push((condition, block));
                }
                let otherwise = match otherwise {
                    Some(block) => Some(self.build_block(block, predecessor, Some(node), source_info)?),
                    None => None,
                };
                NodeKind::If {
                    branches: built,
                    otherwise,
                }
            }
            StatementKind::Select { key, cases } => {
                let key = self.build_expr(key, Some(node));
                let mut built = Vec::with_capacity(cases.len());
                for (label, block) in cases {
                    let block = self.build_block(block, predecessor, Some(node), source_info)?;
                    built.push((label.clone(), block));
                }
                NodeKind::Select { key, cases: built }
            }
            StatementKind::Call { name, arguments } => {
                let mut built = IndexMap::new();
                for (argument, value) in arguments {
                    built.insert(argument.clone(), self.build_value(value, None, Some(node))?);
                }
                NodeKind::Call {
                    name: name.clone(),
                    arguments: built,
                }
            }
            other => {
                return Err(GraphError::Programming(format!(
                    "statement {other:?} is not a directive"
                )));
            }
        };
        self.graph.set_kind(node, kind);
        Ok(node)
    }

    /// Register a macro. Its body is a template whose predecessor is a
    /// placeholder bound at each call site.
    fn build_macro(&mut self, name: &str, body: &Syntax, context: NodeId) -> Result<(), GraphError> {
        let start = self.graph.next_id();
        let placeholder = self.graph.push(
            NodeKind::Placeholder(None),
            Some(context),
            None,
            body.source_info.clone(),
        );
        let root = self.build_value(body, Some(placeholder), Some(context))?;
        let template = Template {
            start,
            end: self.graph.next_id(),
            root,
            filter: None,
            placeholder: Some(placeholder),
        };
        self.graph.define_macro(name, template);
        Ok(())
    }

    /// Build a value that overlays `existing`.
    fn build_value(
        &mut self,
        syntax: &Syntax,
        existing: Option<NodeId>,
        parent: Option<NodeId>,
    ) -> Result<NodeId, GraphError> {
        let source_info = &syntax.source_info;
        let node = match &syntax.kind {
            SyntaxKind::Mapping(block) => self.build_block(block, existing, parent, source_info)?,
            SyntaxKind::Sequence(items) => {
                let node = self.graph.push(
                    NodeKind::Sequence(Vec::new()),
                    parent,
                    existing,
                    source_info.clone(),
                );
                let mut built = Vec::with_capacity(items.len());
                for item in items {
                    built.push(self.build_value(item, None, Some(node))?);
                }
                self.graph.set_kind(node, NodeKind::Sequence(built));
                node
            }
            SyntaxKind::Scalar { text, quoted } => {
                let literal = if *quoted {
                    Literal::Text(text.clone())
                } else {
                    Literal::Raw(text.clone())
                };
                self.graph
                    .push(NodeKind::Scalar(literal), parent, existing, source_info.clone())
            }
            SyntaxKind::Multiline { text, chomp } => self.graph.push(
                NodeKind::Scalar(Literal::Text(apply_chomp(text, *chomp))),
                parent,
                existing,
                source_info.clone(),
            ),
            SyntaxKind::Template(parts) => self.build_template(parts, parent, source_info),
            SyntaxKind::Expr(expr) => self.build_expr(expr, parent),
            SyntaxKind::For(for_loop) => self.build_for(for_loop, parent, source_info)?,
        };
        Ok(node)
    }

    fn build_template(
        &mut self,
        parts: &[TemplatePart],
        parent: Option<NodeId>,
        source_info: &SourceInfo,
    ) -> NodeId {
        if let [TemplatePart::Expr(expr)] = parts {
            return self.build_expr(expr, parent);
        }
        let node = self.graph.push(
            NodeKind::MergedString(Vec::new()),
            parent,
            None,
            source_info.clone(),
        );
        let built = parts
            .iter()
            .map(|part| match part {
                TemplatePart::Text(text) => self.graph.push(
                    NodeKind::Scalar(Literal::Text(text.clone())),
                    Some(node),
                    None,
                    source_info.clone(),
                ),
                TemplatePart::Expr(expr) => self.build_expr(expr, Some(node)),
            })
            .collect();
        self.graph.set_kind(node, NodeKind::MergedString(built));
        node
    }

    /// The body and filter form a template cloned once per item.
    fn build_for(
        &mut self,
        for_loop: &ForLoop,
        parent: Option<NodeId>,
        source_info: &SourceInfo,
    ) -> Result<NodeId, GraphError> {
        let node = self
            .graph
            .push(NodeKind::Placeholder(None), parent, None, source_info.clone());
        let iterable = self.build_expr(&for_loop.iterable, Some(node));
        let start = self.graph.next_id();
        let root = self.build_value(&for_loop.body, None, Some(node))?;
        let filter = for_loop
            .filter
            .as_ref()
            .map(|filter| self.build_expr(filter, Some(node)));
        let body = Template {
            start,
            end: self.graph.next_id(),
            root,
            filter,
            placeholder: None,
        };
        self.graph.set_kind(
            node,
            NodeKind::For {
                target: for_loop.target.clone(),
                iterable,
                body,
            },
        );
        Ok(node)
    }

    pub(crate) fn build_expr(&mut self, expr: &Expr, parent: Option<NodeId>) -> NodeId {
        let source_info = &expr.source_info;
        if let Some(literal) = constant(expr).as_ref().and_then(Literal::from_value) {
            return self
                .graph
                .push(NodeKind::Scalar(literal), parent, None, source_info.clone());
        }

        match &expr.kind {
            // A falsy constant `or` operand never decides the result
            ExprKind::Binary(BinaryOp::Or, left, right)
                if constant(left).is_some_and(|value| !value.is_truthy()) =>
            {
                return self.build_expr(right, parent);
            }
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if let Some(value) = constant(condition) {
                    let chosen = if value.is_truthy() { then } else { otherwise };
                    return self.build_expr(chosen, parent);
                }
            }
            _ => {}
        }

        let node = self
            .graph
            .push(NodeKind::Placeholder(None), parent, None, source_info.clone());
        let here = Some(node);
        let kind = match &expr.kind {
            ExprKind::Null => NodeKind::Scalar(Literal::Null),
            ExprKind::Bool(b) => NodeKind::Scalar(Literal::Bool(*b)),
            ExprKind::Integer(i) => NodeKind::Scalar(Literal::Integer(*i)),
            ExprKind::Float(x) => NodeKind::Scalar(Literal::Float(*x)),
            ExprKind::String(s) => NodeKind::Scalar(Literal::Text(s.clone())),
            ExprKind::Name(name) => NodeKind::Access {
                container: None,
                key: AccessKey::Name(name.clone()),
            },
            ExprKind::Attribute(base, name) => NodeKind::Access {
                container: Some(self.build_expr(base, here)),
                key: AccessKey::Name(name.clone()),
            },
            ExprKind::Subscript(base, index) => {
                let container = Some(self.build_expr(base, here));
                let key = match constant(index) {
                    Some(Value::Integer(i)) => AccessKey::Index(i),
                    Some(Value::String(name)) => AccessKey::Name(name),
                    _ => AccessKey::Expr(self.build_expr(index, here)),
                };
                NodeKind::Access { container, key }
            }
            ExprKind::Binary(op, left, right) => NodeKind::Binary {
                op: *op,
                left: self.build_expr(left, here),
                right: self.build_expr(right, here),
            },
            ExprKind::Unary(op, operand) => NodeKind::Unary {
                op: *op,
                operand: self.build_expr(operand, here),
            },
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => NodeKind::Conditional {
                condition: self.build_expr(condition, here),
                then: self.build_expr(then, here),
                otherwise: self.build_expr(otherwise, here),
            },
            ExprKind::List(items) => {
                NodeKind::Sequence(items.iter().map(|item| self.build_expr(item, here)).collect())
            }
            ExprKind::Dict(entries) => NodeKind::Mapping(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), self.build_expr(value, here)))
                    .collect(),
            ),
        };
        self.graph.set_kind(node, kind);
        node
    }

    /// Turn a resolved value back into nodes.
    pub(crate) fn materialize(
        &mut self,
        value: &Value,
        parent: Option<NodeId>,
        source_info: &SourceInfo,
    ) -> NodeId {
        let origin = SourceInfo::generated(source_info);
        if let Some(literal) = Literal::from_value(value) {
            return self.graph.push(NodeKind::Scalar(literal), parent, None, origin);
        }
        let node = self
            .graph
            .push(NodeKind::Placeholder(None), parent, None, origin);
        let kind = match value {
            Value::List(items) => NodeKind::Sequence(
                items
                    .iter()
                    .map(|item| self.materialize(item, Some(node), source_info))
                    .collect(),
            ),
            Value::Map(entries) => NodeKind::Mapping(
                entries
                    .iter()
                    .map(|(key, item)| (key.clone(), self.materialize(item, Some(node), source_info)))
                    .collect(),
            ),
            _ => NodeKind::Scalar(Literal::Null),
        };
        self.graph.set_kind(node, kind);
        node
    }

    /// Statically visible shape of the value a node stands for.
    fn static_shape(&self, node: NodeId) -> Option<Shape> {
        match self.graph.kind(node) {
            // Anything may overlay null
            NodeKind::Scalar(Literal::Null) => None,
            NodeKind::Scalar(_) | NodeKind::MergedString(_) => Some(Shape::Scalar),
            NodeKind::Sequence(_) | NodeKind::Append { .. } | NodeKind::Remove { .. } => {
                Some(Shape::Sequence)
            }
            NodeKind::For { .. } => Some(Shape::Sequence),
            NodeKind::Mapping(_)
            | NodeKind::Context {
                scope: Scope::Block,
                ..
            } => Some(Shape::Mapping),
            NodeKind::Inherited { container, key } => self
                .static_lookup(*container, key)
                .and_then(|found| self.static_shape(found)),
            _ => None,
        }
    }

    /// Find what `container` holds at `key` by following literal layers only.
    fn static_lookup(&self, container: NodeId, key: &str) -> Option<NodeId> {
        let mut current = container;
        loop {
            match self.graph.kind(current) {
                NodeKind::Context {
                    value: Some(value), ..
                } => current = *value,
                NodeKind::Mapping(entries) => match entries.get(key) {
                    Some(found) => return Some(*found),
                    None => current = self.graph.predecessor(current)?,
                },
                _ => return None,
            }
        }
    }
}

fn syntax_shape(syntax: &Syntax) -> Option<Shape> {
    match &syntax.kind {
        SyntaxKind::Mapping(_) => Some(Shape::Mapping),
        SyntaxKind::Sequence(_) | SyntaxKind::For(_) => Some(Shape::Sequence),
        SyntaxKind::Scalar { .. } | SyntaxKind::Multiline { .. } => Some(Shape::Scalar),
        SyntaxKind::Template(parts) => match parts.as_slice() {
            [TemplatePart::Expr(_)] => None,
            _ => Some(Shape::Scalar),
        },
        SyntaxKind::Expr(_) => None,
    }
}

/// The path expression named by a `copy` entry.
fn copy_path(value: &Syntax) -> Result<Expr, GraphError> {
    match &value.kind {
        SyntaxKind::Scalar { text, .. } => Ok(Expr::path(text.trim()).at(value.source_info.clone())),
        SyntaxKind::Expr(expr) => Ok(expr.clone()),
        SyntaxKind::Template(parts) => match parts.as_slice() {
            [TemplatePart::Expr(expr)] => Ok(expr.clone()),
            _ => Err(GraphError::syntax(
                "copy expects a path to an existing value",
                value.source_info.clone(),
            )),
        },
        _ => Err(GraphError::syntax(
            "copy expects a path to an existing value",
            value.source_info.clone(),
        )),
    }
}

/// Evaluate an expression that does not depend on the graph.
///
/// `or` and `and` short-circuit on a constant left operand, so a constant
/// result may ignore a dynamic right operand entirely.
pub(crate) fn constant(expr: &Expr) -> Option<Value> {
    match &expr.kind {
        ExprKind::Null => Some(Value::Null),
        ExprKind::Bool(b) => Some(Value::Bool(*b)),
        ExprKind::Integer(i) => Some(Value::Integer(*i)),
        ExprKind::Float(x) => Some(Value::Float(*x)),
        ExprKind::String(s) => Some(Value::String(s.clone())),
        ExprKind::Unary(op, operand) => apply_unary(*op, &constant(operand)?).ok(),
        ExprKind::Binary(BinaryOp::Or, left, right) => {
            let left = constant(left)?;
            if left.is_truthy() {
                Some(left)
            } else {
                constant(right)
            }
        }
        ExprKind::Binary(BinaryOp::And, left, right) => {
            if !constant(left)?.is_truthy() {
                return Some(Value::Bool(false));
            }
            constant(right).map(|right| Value::Bool(right.is_truthy()))
        }
        ExprKind::Binary(op, left, right) => {
            apply_binary(*op, &constant(left)?, &constant(right)?).ok()
        }
        ExprKind::Conditional {
            condition,
            then,
            otherwise,
        } => {
            if constant(condition)?.is_truthy() {
                constant(then)
            } else {
                constant(otherwise)
            }
        }
        ExprKind::Name(_)
        | ExprKind::Attribute(..)
        | ExprKind::Subscript(..)
        | ExprKind::List(_)
        | ExprKind::Dict(_) => None,
    }
}

/// Apply block scalar chomping.
pub(crate) fn apply_chomp(text: &str, chomp: Chomp) -> String {
    match chomp {
        Chomp::Keep => text.to_string(),
        Chomp::Strip => text.trim_end_matches('\n').to_string(),
        Chomp::Literal => {
            let mut text = text.trim_end_matches('\n').to_string();
            text.push('\n');
            text
        }
        Chomp::Fold => {
            let mut folded = String::new();
            let mut joinable = false;
            for line in text.trim_end_matches('\n').split('\n') {
                if line.is_empty() {
                    folded.push('\n');
                    joinable = false;
                } else {
                    if joinable {
                        folded.push(' ');
                    }
                    folded.push_str(line);
                    joinable = true;
                }
            }
            folded.push('\n');
            folded
        }
    }
}
