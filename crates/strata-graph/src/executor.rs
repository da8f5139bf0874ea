//! Dependency-tracking executor.
//!
//! Every memoized evaluation step is an [`Operation`] keyed by the node it
//! targets and the [`Method`] applied. Callers pass their own operation as
//! an explicit [`Caller`] handle, which gives each operation a parent (for
//! cycle detection) and builds dependency edges (for targeted purging).
//!
//! Branch decisions are made inside a *peek*: every operation created while
//! a peek is open is provisional and is purged when the peek ends. A read
//! of the node being decided, made during its own peek, is redirected to
//! the node's predecessor by the engine and marks the peek stale; the
//! engine then re-checks the decision once the node's result is known.

use crate::error::GraphError;
use crate::node::NodeId;
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId(usize);

/// The operation on whose behalf a call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub(crate) Option<OpId>);

impl Caller {
    /// A top-level request with no parent operation.
    pub fn root() -> Self {
        Caller(None)
    }

    pub fn op(self) -> Option<OpId> {
        self.0
    }
}

/// Child lookups are not operations of their own: a lookup is a walk over
/// memoized expansions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Expand,
    Resolve,
    Keys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpKey {
    pub node: NodeId,
    pub method: Method,
}

impl OpKey {
    pub fn new(node: NodeId, method: Method) -> Self {
        OpKey { node, method }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// An expanded node, or a child; `None` when nothing is defined
    Node(Option<NodeId>),
    Value(Value),
    Keys(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpState {
    Pending,
    Running,
    Succeeded(Output),
    Failed(GraphError),
}

#[derive(Debug)]
pub struct Operation {
    pub key: OpKey,
    pub state: OpState,
    /// The operation that was running when this one started
    pub parent: Option<OpId>,
    pub dependencies: HashSet<OpId>,
    pub dependents: HashSet<OpId>,
    pub depth: usize,
    /// Provisional result handed out while the operation is still running
    pub published: Option<Output>,
    pub purged: bool,
}

/// What a caller should do after [`Executor::enter`].
#[derive(Debug)]
pub enum Entry {
    /// The result is already known
    Cached(Result<Output, GraphError>),
    /// A new operation was started; compute it and call `finish`
    Started(OpId),
    /// The operation is already running further up the caller's chain
    Cycle,
    /// Starting the operation would exceed the depth limit
    TooDeep,
    /// The operation is running but is not an ancestor of the caller
    Inconsistent,
}

#[derive(Debug)]
struct PeekFrame {
    node: NodeId,
    created: Vec<OpId>,
    stale: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeekOutcome {
    /// A read of the decided node was redirected to its predecessor
    pub stale: bool,
    pub purged: usize,
}

#[derive(Debug)]
pub struct Executor {
    ops: Vec<Operation>,
    memo: HashMap<OpKey, OpId>,
    peeks: Vec<PeekFrame>,
    max_depth: usize,
}

impl Executor {
    pub fn new(max_depth: usize) -> Self {
        Executor {
            ops: Vec::new(),
            memo: HashMap::new(),
            peeks: Vec::new(),
            max_depth,
        }
    }

    pub fn operation(&self, op: OpId) -> &Operation {
        &self.ops[op.0]
    }

    /// Look `key` up, starting a new operation on a miss.
    pub fn enter(&mut self, caller: Caller, key: OpKey) -> Entry {
        if let Some(&existing) = self.memo.get(&key) {
            let cached = match &self.ops[existing.0].state {
                OpState::Succeeded(output) => Some(Ok(output.clone())),
                OpState::Failed(error) => Some(Err(error.clone())),
                OpState::Running | OpState::Pending => {
                    self.ops[existing.0].published.clone().map(Ok)
                }
            };
            if let Some(result) = cached {
                self.link(caller, existing);
                return Entry::Cached(result);
            }
            return if self.is_ancestor(existing, caller) {
                debug!(node = %key.node, method = ?key.method, "cycle detected");
                Entry::Cycle
            } else {
                Entry::Inconsistent
            };
        }

        let depth = caller.0.map_or(0, |parent| self.ops[parent.0].depth + 1);
        if depth > self.max_depth {
            debug!(node = %key.node, depth, "operation nested too deeply");
            return Entry::TooDeep;
        }

        let id = OpId(self.ops.len());
        trace!(node = %key.node, method = ?key.method, depth, "operation started");
        self.ops.push(Operation {
            key,
            state: OpState::Running,
            parent: caller.0,
            dependencies: HashSet::new(),
            dependents: HashSet::new(),
            depth,
            published: None,
            purged: false,
        });
        self.memo.insert(key, id);
        self.link(caller, id);
        if let Some(frame) = self.peeks.last_mut() {
            frame.created.push(id);
        }
        Entry::Started(id)
    }

    /// Record the terminal state of a started operation.
    pub fn finish(&mut self, op: OpId, result: &Result<Output, GraphError>) {
        let was_published = self.ops[op.0].published.take().is_some();
        let operation = &mut self.ops[op.0];
        trace!(node = %operation.key.node, method = ?operation.key.method, ok = result.is_ok(), "operation finished");
        operation.state = match result {
            Ok(output) => OpState::Succeeded(output.clone()),
            Err(error) => OpState::Failed(error.clone()),
        };
        if was_published && result.is_err() {
            let dependents: Vec<OpId> = self.ops[op.0].dependents.iter().copied().collect();
            let mut purged = 0;
            for dependent in dependents {
                purged += self.purge(dependent, Some(op));
            }
            debug!(purged, "purged dependents of a failed published operation");
        }
    }

    /// Hand out a provisional result for a running operation.
    pub fn publish(&mut self, op: OpId, output: Output) {
        self.ops[op.0].published = Some(output);
    }

    pub fn begin_peek(&mut self, node: NodeId) {
        trace!(%node, "peek started");
        self.peeks.push(PeekFrame {
            node,
            created: Vec::new(),
            stale: false,
        });
    }

    /// Close the innermost peek and purge everything created inside it.
    pub fn end_peek(&mut self, node: NodeId) -> PeekOutcome {
        let Some(frame) = self.peeks.pop() else {
            return PeekOutcome::default();
        };
        debug_assert_eq!(frame.node, node);
        let mut purged = 0;
        for op in frame.created {
            purged += self.purge(op, None);
        }
        debug!(%node, stale = frame.stale, purged, "peek ended");
        PeekOutcome {
            stale: frame.stale,
            purged,
        }
    }

    pub fn is_peeking(&self, node: NodeId) -> bool {
        self.peeks.iter().any(|frame| frame.node == node)
    }

    pub fn mark_stale(&mut self, node: NodeId) {
        if let Some(frame) = self.peeks.iter_mut().rev().find(|frame| frame.node == node) {
            debug!(%node, "peek read a predecessor");
            frame.stale = true;
        }
    }

    /// Forget every operation.
    pub fn reset(&mut self) {
        debug!(operations = self.ops.len(), "memo table reset");
        self.ops.clear();
        self.memo.clear();
        self.peeks.clear();
    }

    /// Number of live memoized operations.
    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }

    fn link(&mut self, caller: Caller, target: OpId) {
        if let Some(parent) = caller.0 {
            if parent != target {
                self.ops[parent.0].dependencies.insert(target);
                self.ops[target.0].dependents.insert(parent);
            }
        }
    }

    fn is_ancestor(&self, target: OpId, caller: Caller) -> bool {
        let mut current = caller.0;
        while let Some(op) = current {
            if op == target {
                return true;
            }
            current = self.ops[op.0].parent;
        }
        false
    }

    /// Drop a finished operation and its transitive dependents from the
    /// memo table. Running operations and `keep` are left alone.
    fn purge(&mut self, op: OpId, keep: Option<OpId>) -> usize {
        let mut count = 0;
        let mut pending = vec![op];
        while let Some(op) = pending.pop() {
            let operation = &self.ops[op.0];
            if Some(op) == keep
                || operation.purged
                || matches!(operation.state, OpState::Running | OpState::Pending)
            {
                continue;
            }
            if self.memo.get(&operation.key) == Some(&op) {
                self.memo.remove(&operation.key);
            }
            let operation = &mut self.ops[op.0];
            operation.purged = true;
            let dependencies = std::mem::take(&mut operation.dependencies);
            let dependents = std::mem::take(&mut operation.dependents);
            for dependency in dependencies {
                self.ops[dependency.0].dependents.remove(&op);
            }
            for dependent in dependents {
                self.ops[dependent.0].dependencies.remove(&op);
                pending.push(dependent);
            }
            count += 1;
        }
        count
    }
}
