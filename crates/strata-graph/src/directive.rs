//! Directive evaluation: loops, branch decisions, macro calls and includes.

use crate::build::Builder;
use crate::engine::Engine;
use crate::error::GraphError;
use crate::executor::{Caller, Output};
use crate::node::{Literal, NodeId, NodeKind, Scope};
use crate::ops::loose_eq;
use crate::value::Value;
use indexmap::IndexMap;
use strata_source_map::SourceInfo;
use tracing::debug;

/// The branch an `if` or `select` picked and the value it was picked on.
#[derive(Debug, Clone, PartialEq)]
struct Decision {
    choice: Option<usize>,
    observed: Value,
}

impl Engine {
    /// Clone the loop body once per item and collect the survivors.
    pub(crate) fn expand_for(&mut self, caller: Caller, node: NodeId) -> Result<NodeId, GraphError> {
        let NodeKind::For {
            target,
            iterable,
            body,
        } = self.graph.kind(node).clone()
        else {
            return Err(GraphError::Programming(format!("{node} is not a for directive")));
        };
        let parent = self.graph.parent(node);
        let origin = SourceInfo::generated(self.graph.source_info(node));

        let collection = self.expand(caller, iterable)?;
        let elements = match self.graph.kind(collection).clone() {
            NodeKind::Sequence(items) => items,
            NodeKind::Mapping(_) => self
                .keys_in(caller, collection)?
                .into_iter()
                .map(|key| {
                    self.graph
                        .push(NodeKind::Scalar(Literal::Text(key)), Some(node), None, origin.clone())
                })
                .collect(),
            other => {
                return Err(GraphError::type_error(
                    format!("cannot iterate over a {}", other.name()),
                    self.graph.source_info(iterable).clone(),
                ));
            }
        };

        let mut items = Vec::with_capacity(elements.len());
        for element in elements {
            let mut bindings = IndexMap::new();
            bindings.insert(target.clone(), element);
            let scope = self.graph.push(
                NodeKind::Context {
                    scope: Scope::Loop,
                    value: None,
                    bindings,
                },
                parent,
                None,
                origin.clone(),
            );
            let instance = self.graph.instantiate(&body, scope, None);
            if let NodeKind::Context { value, .. } = self.graph.kind_mut(scope) {
                *value = Some(instance.root);
            }
            if let Some(filter) = instance.filter {
                if !self.resolve_in(caller, filter)?.is_truthy() {
                    continue;
                }
            }
            if self.options.flatten_nested_loops
                && matches!(self.graph.kind(instance.root), NodeKind::For { .. })
            {
                let inner = self.expand(caller, scope)?;
                if let NodeKind::Sequence(inner_items) = self.graph.kind(inner) {
                    items.extend(inner_items.iter().copied());
                    continue;
                }
            }
            items.push(scope);
        }
        Ok(self.graph.push(NodeKind::Sequence(items), parent, None, origin))
    }

    /// Evaluate an `if` or `select`.
    ///
    /// The decision is made inside a peek. If the peek had to read the
    /// directive's own predecessor, the chosen branch is published and the
    /// decision is made again against it; a different outcome is a paradox.
    pub(crate) fn expand_decision(&mut self, caller: Caller, node: NodeId) -> Result<Option<NodeId>, GraphError> {
        self.executor.begin_peek(node);
        let decided = self.decide(caller, node);
        let outcome = self.executor.end_peek(node);
        let decided = decided?;

        let result = self.expand_branch(caller, node, &decided)?;
        if outcome.stale {
            if let Some(op) = caller.op() {
                self.executor.publish(op, Output::Node(result));
            }
            let current = self.decide(caller, node)?;
            if current.choice != decided.choice {
                debug!(%node, observed = %decided.observed, current = %current.observed, "paradox detected");
                return Err(GraphError::Paradox {
                    what: self.graph.kind(node).name().to_string(),
                    observed: decided.observed.to_string(),
                    current: current.observed.to_string(),
                    source_info: self.graph.source_info(node).clone(),
                });
            }
        }
        Ok(result)
    }

    fn decide(&mut self, caller: Caller, node: NodeId) -> Result<Decision, GraphError> {
        match self.graph.kind(node).clone() {
            NodeKind::If { branches, .. } => {
                let mut observed = Value::Null;
                for (index, (condition, _)) in branches.into_iter().enumerate() {
                    observed = self.resolve_in(caller, condition)?;
                    if observed.is_truthy() {
                        return Ok(Decision {
                            choice: Some(index),
                            observed,
                        });
                    }
                }
                Ok(Decision {
                    choice: None,
                    observed,
                })
            }
            NodeKind::Select { key, cases } => {
                let observed = self.resolve_in(caller, key)?;
                let choice = cases
                    .iter()
                    .position(|(label, _)| loose_eq(&Value::box_scalar(label), &observed));
                Ok(Decision { choice, observed })
            }
            other => Err(GraphError::Programming(format!(
                "{node} is a {}, not a decision",
                other.name()
            ))),
        }
    }

    fn expand_branch(&mut self, caller: Caller, node: NodeId, decision: &Decision) -> Result<Option<NodeId>, GraphError> {
        let block = match self.graph.kind(node) {
            NodeKind::If {
                branches,
                otherwise,
            } => decision
                .choice
                .and_then(|index| branches.get(index))
                .map(|(_, block)| *block)
                .or(*otherwise),
            NodeKind::Select { cases, .. } => {
                let Some((_, block)) = decision.choice.and_then(|index| cases.get(index)) else {
                    return Err(GraphError::no_matching(
                        format!("case `{}`", decision.observed),
                        self.graph.source_info(node).clone(),
                    ));
                };
                Some(*block)
            }
            _ => None,
        };
        match block.or(self.graph.predecessor(node)) {
            Some(next) => self.expand_opt(caller, next),
            None => Ok(None),
        }
    }

    /// Instantiate a macro body over the call site's predecessor.
    pub(crate) fn expand_call(&mut self, caller: Caller, node: NodeId) -> Result<Option<NodeId>, GraphError> {
        let NodeKind::Call { name, arguments } = self.graph.kind(node).clone() else {
            return Err(GraphError::Programming(format!("{node} is not a macro call")));
        };
        let source_info = self.graph.source_info(node).clone();
        let Some(template) = self.graph.macro_template(&name) else {
            return Err(GraphError::no_matching(format!("macro `{name}`"), source_info));
        };
        let scope = self.graph.push(
            NodeKind::Context {
                scope: Scope::Call,
                value: None,
                bindings: arguments,
            },
            self.graph.parent(node),
            None,
            SourceInfo::generated(&source_info),
        );
        let instance = self
            .graph
            .instantiate(&template, scope, self.graph.predecessor(node));
        if let NodeKind::Context { value, .. } = self.graph.kind_mut(scope) {
            *value = Some(instance.root);
        }
        self.expand_opt(caller, scope)
    }

    /// Load, parse and splice in an included document.
    ///
    /// The location is computed while the include is being decided, so a
    /// lookup that reaches the include itself reads what it overlays. When
    /// that happened the location is computed again once the included
    /// document is in place, and a different answer is a paradox.
    pub(crate) fn expand_include(&mut self, caller: Caller, node: NodeId) -> Result<Option<NodeId>, GraphError> {
        let NodeKind::Include { uri } = *self.graph.kind(node) else {
            return Err(GraphError::Programming(format!("{node} is not an include")));
        };
        let source_info = self.graph.source_info(node).clone();

        self.executor.begin_peek(node);
        let located = self.include_candidates(caller, node, uri);
        let outcome = self.executor.end_peek(node);
        let (location, candidates) = located?;

        let result = self.splice_include(caller, node, &candidates, &source_info)?;
        let Some(result) = result else {
            return Err(GraphError::NotFound {
                uri: location,
                source_info,
            });
        };
        if outcome.stale {
            if let Some(op) = caller.op() {
                self.executor.publish(op, Output::Node(result));
            }
            let current = self.resolve_uri(caller, uri)?;
            if current != location {
                debug!(%node, observed = %location, %current, "paradox detected");
                return Err(GraphError::Paradox {
                    what: self.graph.kind(node).name().to_string(),
                    observed: location,
                    current,
                    source_info,
                });
            }
        }
        Ok(result)
    }

    /// The include's location and every place it may be found, in order.
    fn include_candidates(&mut self, caller: Caller, node: NodeId, uri: NodeId) -> Result<(String, Vec<String>), GraphError> {
        let location = self.resolve_uri(caller, uri)?;
        let mut candidates = vec![location.clone()];
        for base in self.search_bases(caller, node)? {
            candidates.push(format!("{}/{}", base.trim_end_matches('/'), location));
        }
        Ok((location, candidates))
    }

    /// Open the first candidate that exists and build it in place of `node`.
    /// `None` when no candidate exists.
    fn splice_include(
        &mut self,
        caller: Caller,
        node: NodeId,
        candidates: &[String],
        source_info: &SourceInfo,
    ) -> Result<Option<Option<NodeId>>, GraphError> {
        for candidate in candidates {
            let Some(content) = self.open(candidate, source_info)? else {
                continue;
            };
            debug!(uri = %candidate, tried = candidates.len(), "include resolved");
            let file_id = self.sources.add_file(candidate.clone(), Some(content.clone()));
            let document = self.parse(&content, file_id)?;
            let predecessor = self.graph.predecessor(node);
            let parent = self.graph.parent(node);
            let context = Builder::new(&mut self.graph).build_document(&document, predecessor, parent)?;
            return self.expand_opt(caller, context).map(Some);
        }
        Ok(None)
    }

    fn resolve_uri(&mut self, caller: Caller, uri: NodeId) -> Result<String, GraphError> {
        let value = self.resolve_in(caller, uri)?;
        match value {
            Value::String(text) => Ok(text),
            other if other.is_scalar() && other != Value::Null => Ok(other.to_string()),
            other => Err(GraphError::type_error(
                format!("a document location must be a string, not a {}", other.type_name()),
                self.graph.source_info(uri).clone(),
            )),
        }
    }

    /// Search bases visible to an include, in declaration order.
    fn search_bases(&mut self, caller: Caller, node: NodeId) -> Result<Vec<String>, GraphError> {
        let mut bases = Vec::new();
        let mut current = self.graph.predecessor(node);
        while let Some(layer) = current {
            current = match self.graph.kind(layer).clone() {
                NodeKind::Search { uri } => {
                    bases.push(self.resolve_uri(caller, uri)?);
                    self.graph.predecessor(layer)
                }
                NodeKind::Context { value, .. } => value,
                NodeKind::Inherited { container, .. } => Some(container),
                NodeKind::Mapping(_)
                | NodeKind::Include { .. }
                | NodeKind::If { .. }
                | NodeKind::Select { .. }
                | NodeKind::Call { .. } => self.graph.predecessor(layer),
                _ => None,
            };
        }
        bases.reverse();
        Ok(bases)
    }
}
