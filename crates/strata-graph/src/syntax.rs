//! The syntax contract between a front-end and the graph.
//!
//! A front-end turns document text into a [`Document`]: a block of
//! [`Statement`]s whose values are [`Syntax`] subtrees, with embedded
//! [`Expr`]essions. Every element carries the [`SourceInfo`] it was read
//! from. Nothing here is evaluated; the graph builder folds it into nodes.
//!
//! The constructors at the bottom of each type let embedders and tests
//! assemble documents without a parser:
//!
//! ```
//! use strata_graph::syntax::{Document, Expr, Statement, Syntax};
//!
//! let doc = Document::new(vec![
//!     Statement::entry("b", Syntax::expr(Expr::name("a"))),
//!     Statement::entry("a", Syntax::scalar("c")),
//! ]);
//! assert_eq!(doc.block.len(), 2);
//! ```

use crate::ops::{BinaryOp, UnaryOp};
use strata_source_map::SourceInfo;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub block: Block,
    pub source_info: SourceInfo,
}

pub type Block = Vec<Statement>;

/// How an entry combines with whatever already exists at its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Assign,
    Append,
    Remove,
    Copy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub source_info: SourceInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// `key: value`, `key.append: value`, ...
    Entry {
        key: String,
        action: Action,
        value: Syntax,
    },
    /// `extend key: items`
    Extend { key: String, value: Syntax },
    /// `set name: value`, a binding visible to the whole block
    Set { name: String, value: Syntax },
    Include(Expr),
    Search(Expr),
    /// `if` with any number of `elif` branches and an optional `else`
    If {
        branches: Vec<(Expr, Block)>,
        otherwise: Option<Block>,
    },
    /// `select key:` followed by `case label:` blocks
    Select { key: Expr, cases: Vec<(String, Block)> },
    Macro { name: String, body: Syntax },
    Call {
        name: String,
        arguments: Vec<(String, Syntax)>,
    },
}

/// Block scalar chomping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chomp {
    /// `>`
    Fold,
    /// `|`
    Literal,
    /// `|-`
    Strip,
    /// `|+`
    Keep,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Syntax {
    pub kind: SyntaxKind,
    pub source_info: SourceInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxKind {
    Mapping(Block),
    Sequence(Vec<Syntax>),
    /// Unquoted scalars are boxed at resolve time, quoted ones never are.
    Scalar { text: String, quoted: bool },
    Multiline { text: String, chomp: Chomp },
    /// Text interleaved with `{{ }}` interpolations
    Template(Vec<TemplatePart>),
    Expr(Expr),
    For(Box<ForLoop>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

/// `for target in iterable [if filter]: body`
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub target: String,
    pub iterable: Expr,
    pub filter: Option<Expr>,
    pub body: Syntax,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub source_info: SourceInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Name(String),
    Attribute(Box<Expr>, String),
    Subscript(Box<Expr>, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    /// `then if condition else otherwise`
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    List(Vec<Expr>),
    Dict(Vec<(String, Expr)>),
}

impl Document {
    pub fn new(block: Block) -> Self {
        Document {
            block,
            source_info: SourceInfo::default(),
        }
    }

    pub fn at(mut self, source_info: SourceInfo) -> Self {
        self.source_info = source_info;
        self
    }
}

impl Statement {
    pub fn new(kind: StatementKind) -> Self {
        Statement {
            kind,
            source_info: SourceInfo::default(),
        }
    }

    pub fn at(mut self, source_info: SourceInfo) -> Self {
        self.source_info = source_info;
        self
    }

    pub fn entry(key: impl Into<String>, value: Syntax) -> Self {
        Self::with_action(key, Action::Assign, value)
    }

    pub fn with_action(key: impl Into<String>, action: Action, value: Syntax) -> Self {
        Statement::new(StatementKind::Entry {
            key: key.into(),
            action,
            value,
        })
    }

    pub fn extend(key: impl Into<String>, value: Syntax) -> Self {
        Statement::new(StatementKind::Extend {
            key: key.into(),
            value,
        })
    }

    pub fn set(name: impl Into<String>, value: Syntax) -> Self {
        Statement::new(StatementKind::Set {
            name: name.into(),
            value,
        })
    }

    pub fn include(uri: Expr) -> Self {
        Statement::new(StatementKind::Include(uri))
    }

    pub fn search(uri: Expr) -> Self {
        Statement::new(StatementKind::Search(uri))
    }

    pub fn if_else(branches: Vec<(Expr, Block)>, otherwise: Option<Block>) -> Self {
        Statement::new(StatementKind::If { branches, otherwise })
    }

    pub fn select(key: Expr, cases: Vec<(&str, Block)>) -> Self {
        Statement::new(StatementKind::Select {
            key,
            cases: cases
                .into_iter()
                .map(|(label, block)| (label.to_string(), block))
                .collect(),
        })
    }

    pub fn macro_def(name: impl Into<String>, body: Syntax) -> Self {
        Statement::new(StatementKind::Macro {
            name: name.into(),
            body,
        })
    }

    pub fn call(name: impl Into<String>, arguments: Vec<(&str, Syntax)>) -> Self {
        Statement::new(StatementKind::Call {
            name: name.into(),
            arguments: arguments
                .into_iter()
                .map(|(arg, value)| (arg.to_string(), value))
                .collect(),
        })
    }
}

impl Syntax {
    pub fn new(kind: SyntaxKind) -> Self {
        Syntax {
            kind,
            source_info: SourceInfo::default(),
        }
    }

    pub fn at(mut self, source_info: SourceInfo) -> Self {
        self.source_info = source_info;
        self
    }

    /// An unquoted scalar.
    pub fn scalar(text: impl Into<String>) -> Self {
        Syntax::new(SyntaxKind::Scalar {
            text: text.into(),
            quoted: false,
        })
    }

    /// A quoted scalar, never boxed.
    pub fn text(text: impl Into<String>) -> Self {
        Syntax::new(SyntaxKind::Scalar {
            text: text.into(),
            quoted: true,
        })
    }

    pub fn multiline(text: impl Into<String>, chomp: Chomp) -> Self {
        Syntax::new(SyntaxKind::Multiline {
            text: text.into(),
            chomp,
        })
    }

    pub fn mapping(block: Block) -> Self {
        Syntax::new(SyntaxKind::Mapping(block))
    }

    pub fn sequence(items: Vec<Syntax>) -> Self {
        Syntax::new(SyntaxKind::Sequence(items))
    }

    pub fn template(parts: Vec<TemplatePart>) -> Self {
        Syntax::new(SyntaxKind::Template(parts))
    }

    pub fn expr(expr: Expr) -> Self {
        Syntax::new(SyntaxKind::Expr(expr))
    }

    pub fn for_loop(target: impl Into<String>, iterable: Expr, filter: Option<Expr>, body: Syntax) -> Self {
        Syntax::new(SyntaxKind::For(Box::new(ForLoop {
            target: target.into(),
            iterable,
            filter,
            body,
        })))
    }
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr {
            kind,
            source_info: SourceInfo::default(),
        }
    }

    pub fn at(mut self, source_info: SourceInfo) -> Self {
        self.source_info = source_info;
        self
    }

    pub fn null() -> Self {
        Expr::new(ExprKind::Null)
    }

    pub fn bool(b: bool) -> Self {
        Expr::new(ExprKind::Bool(b))
    }

    pub fn int(i: i64) -> Self {
        Expr::new(ExprKind::Integer(i))
    }

    pub fn float(x: f64) -> Self {
        Expr::new(ExprKind::Float(x))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::new(ExprKind::String(s.into()))
    }

    pub fn name(name: impl Into<String>) -> Self {
        Expr::new(ExprKind::Name(name.into()))
    }

    /// `self.name`
    pub fn attr(self, name: impl Into<String>) -> Self {
        let source_info = self.source_info.clone();
        Expr::new(ExprKind::Attribute(Box::new(self), name.into())).at(source_info)
    }

    /// `self[index]`
    pub fn index(self, index: Expr) -> Self {
        let source_info = self.source_info.clone();
        Expr::new(ExprKind::Subscript(Box::new(self), Box::new(index))).at(source_info)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        let source_info = left.source_info.clone();
        Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right))).at(source_info)
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        let source_info = operand.source_info.clone();
        Expr::new(ExprKind::Unary(op, Box::new(operand))).at(source_info)
    }

    pub fn conditional(then: Expr, condition: Expr, otherwise: Expr) -> Self {
        let source_info = then.source_info.clone();
        Expr::new(ExprKind::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
        .at(source_info)
    }

    pub fn list(items: Vec<Expr>) -> Self {
        Expr::new(ExprKind::List(items))
    }

    pub fn dict(entries: Vec<(&str, Expr)>) -> Self {
        Expr::new(ExprKind::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        ))
    }

    /// A dotted path such as `a.b.0`; numeric segments become subscripts.
    pub fn path(path: &str) -> Self {
        let mut segments = path.split('.');
        let mut expr = Expr::name(segments.next().unwrap_or_default());
        for segment in segments {
            expr = match segment.parse::<i64>() {
                Ok(i) => expr.index(Expr::int(i)),
                Err(_) => expr.attr(segment),
            };
        }
        expr
    }
}
