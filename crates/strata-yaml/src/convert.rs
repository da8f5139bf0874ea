//! Turning a YAML tree into the graph's syntax tree.
//!
//! Mapping keys double as directives:
//!
//! ```yaml
//! set base: /srv              # a binding visible to the whole block
//! if env == 'prod':           # followed by any number of `elif` and an `else`
//!   replicas: 3
//! else:
//!   replicas: 1
//! select tier:                # case labels are boxed like plain scalars
//!   gold: {retries: 5}
//! include: common.yaml        # or a sequence of locations
//! search: [vendor, lib]
//! macro service:              # a reusable body
//!   port: "{{ port }}"
//! call service: {port: 80}
//! extend servers: [c]         # append to what is already there
//! squares:
//!   for x in [1, 2, 3] if x > 1: "{{ x * x }}"
//! ```
//!
//! A quoted key is always a plain key, so `"if": 1` sets a key named `if`.

use crate::error::{Error, Result};
use crate::expr::{
    is_identifier, is_template, parse_expression_at, parse_for_header, parse_template_at,
};
use crate::parser::{Style, YamlKind, YamlNode};
use crate::tag::{Tag, parse_tag};
use strata_error_reporting::DiagnosticMessage;
use strata_graph::ops::BinaryOp;
use strata_graph::syntax::{
    Action, Block, Chomp, Document, Expr, Statement, StatementKind, Syntax, TemplatePart,
};
use strata_source_map::SourceInfo;

/// What a mapping key asks for.
#[derive(Debug, Clone, PartialEq)]
enum Key {
    Plain(String),
    If(Expr),
    Elif(Expr),
    Else,
    For {
        target: String,
        iterable: Expr,
        filter: Option<Expr>,
    },
    Select(Expr),
    Include,
    Search,
    Set(String),
    Macro(String),
    Call(String),
    Extend(String),
}

/// Converts one document, collecting warnings on the way.
#[derive(Debug, Default)]
pub(crate) struct Converter {
    pub diagnostics: Vec<DiagnosticMessage>,
}

impl Converter {
    pub fn document(&mut self, root: Option<YamlNode>, whole: SourceInfo) -> Result<Document> {
        let Some(root) = root else {
            return Ok(Document::new(Vec::new()).at(whole));
        };
        if root.is_null() {
            return Ok(Document::new(Vec::new()).at(whole));
        }
        let tag = self.tag(&root)?;
        if tag.is_some() {
            return Err(Error::tag(
                "a document's root cannot be tagged",
                root.source_info,
            ));
        }
        let source_info = root.source_info.clone();
        match root.kind {
            YamlKind::Mapping(entries) => Ok(Document::new(self.block(entries)?).at(source_info)),
            _ => Err(Error::structure(
                format!("a document must be a mapping, not a {}", root.kind_name()),
                source_info,
            )),
        }
    }

    fn tag(&mut self, node: &YamlNode) -> Result<Option<Tag>> {
        match &node.tag {
            Some(tag) => parse_tag(&tag.handle, &tag.suffix, &node.source_info, &mut self.diagnostics),
            None => Ok(None),
        }
    }

    fn key(&mut self, node: &YamlNode) -> Result<Key> {
        if node.tag.is_some() {
            return Err(Error::tag("mapping keys cannot be tagged", node.source_info.clone()));
        }
        let Some((text, style, offset)) = node.scalar() else {
            return Err(Error::structure(
                format!("a mapping key must be a scalar, not a {}", node.kind_name()),
                node.source_info.clone(),
            ));
        };
        if style != Style::Plain {
            return Ok(Key::Plain(text.to_string()));
        }
        parse_key(text, &node.source_info, offset)
    }

    fn block(&mut self, entries: Vec<(YamlNode, YamlNode)>) -> Result<Block> {
        let mut keyed = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            keyed.push((self.key(&key)?, key.source_info, value));
        }

        let mut block = Vec::with_capacity(keyed.len());
        let mut keyed = keyed.into_iter().peekable();
        while let Some((key, source_info, value)) = keyed.next() {
            let statement = match key {
                Key::Plain(name) => self.entry(name, value)?,
                Key::If(condition) => {
                    let mut branches = vec![(condition, self.body(value, "if")?)];
                    let mut otherwise = None;
                    while let Some((next, _, _)) = keyed.peek() {
                        match next {
                            Key::Elif(_) => {
                                if let Some((Key::Elif(condition), _, value)) = keyed.next() {
                                    branches.push((condition, self.body(value, "elif")?));
                                }
                            }
                            Key::Else => {
                                if let Some((_, _, value)) = keyed.next() {
                                    otherwise = Some(self.body(value, "else")?);
                                }
                                break;
                            }
                            _ => break,
                        }
                    }
                    Statement::if_else(branches, otherwise)
                }
                Key::Elif(_) | Key::Else => {
                    return Err(Error::directive(
                        "`elif` and `else` must follow an `if`",
                        source_info,
                    ));
                }
                Key::For { .. } => {
                    return Err(Error::directive(
                        "a `for` loop must be the only key of its mapping",
                        source_info,
                    ));
                }
                Key::Select(key) => self.select(key, value)?,
                Key::Include => {
                    for (uri, source_info) in self.locations(value)? {
                        block.push(Statement::include(uri).at(source_info));
                    }
                    continue;
                }
                Key::Search => {
                    for (uri, source_info) in self.locations(value)? {
                        block.push(Statement::search(uri).at(source_info));
                    }
                    continue;
                }
                Key::Set(name) => Statement::set(name, self.value(value)?),
                Key::Macro(name) => Statement::macro_def(name, self.value(value)?),
                Key::Call(name) => self.call(name, value)?,
                Key::Extend(name) => Statement::extend(name, self.value(value)?),
            };
            block.push(statement.at(source_info));
        }
        Ok(block)
    }

    /// A `key: value` entry, where the value's tag picks the action.
    fn entry(&mut self, key: String, mut value: YamlNode) -> Result<Statement> {
        let tag = self.tag(&value)?;
        if tag.is_some_and(Tag::is_entry_only) {
            value.tag = None;
        }
        let statement = match tag {
            Some(Tag::Append) => Statement::with_action(key, Action::Append, self.value(value)?),
            Some(Tag::Remove) => Statement::with_action(key, Action::Remove, self.value(value)?),
            Some(Tag::Extend) => Statement::extend(key, self.value(value)?),
            Some(Tag::Copy) => {
                let path = self.expression(&value, Tag::Copy)?;
                Statement::with_action(key, Action::Copy, Syntax::expr(path).at(value.source_info))
            }
            Some(Tag::Include) => {
                let uri = self.location(&value)?;
                let source_info = value.source_info;
                Statement::entry(
                    key,
                    Syntax::mapping(vec![Statement::include(uri).at(source_info.clone())])
                        .at(source_info),
                )
            }
            tag => Statement::entry(key, self.tagged_value(value, tag)?),
        };
        Ok(statement)
    }

    fn value(&mut self, node: YamlNode) -> Result<Syntax> {
        let tag = self.tag(&node)?;
        self.tagged_value(node, tag)
    }

    /// Convert `node`, whose tag has already been read as `tag`.
    fn tagged_value(&mut self, node: YamlNode, tag: Option<Tag>) -> Result<Syntax> {
        let source_info = node.source_info.clone();
        match tag {
            Some(tag) if tag.is_entry_only() => {
                return Err(Error::tag(
                    format!("`!{}` only applies to the value of a mapping entry", tag.name()),
                    source_info,
                ));
            }
            Some(tag @ (Tag::Ref | Tag::Expr)) => {
                return Ok(Syntax::expr(self.expression(&node, tag)?).at(source_info));
            }
            _ => {}
        }
        let as_text = tag == Some(Tag::Str);

        let syntax = match node.kind {
            YamlKind::Scalar {
                ref text,
                style,
                text_offset,
            } => {
                if !as_text && node.is_null() {
                    Syntax::expr(Expr::null().at(source_info.clone()))
                } else if !as_text && is_template(text) {
                    Syntax::template(parse_template_at(text, &source_info, text_offset)?)
                } else {
                    match style {
                        Style::Plain if !as_text => Syntax::scalar(text.as_str()),
                        Style::Block => Syntax::multiline(text.as_str(), Chomp::Keep),
                        _ => Syntax::text(text.as_str()),
                    }
                }
            }
            YamlKind::Sequence(items) => {
                let items = items
                    .into_iter()
                    .map(|item| self.value(item))
                    .collect::<Result<Vec<_>>>()?;
                Syntax::sequence(items)
            }
            YamlKind::Mapping(mut entries) => {
                if entries.len() == 1 {
                    if let Key::For {
                        target,
                        iterable,
                        filter,
                    } = self.key(&entries[0].0)?
                    {
                        let (_, body) = entries.remove(0);
                        let body = self.value(body)?;
                        return Ok(Syntax::for_loop(target, iterable, filter, body).at(source_info));
                    }
                }
                Syntax::mapping(self.block(entries)?)
            }
        };
        Ok(syntax.at(source_info))
    }

    /// The block of an `if`, `elif`, `else` or `select` case.
    fn body(&mut self, node: YamlNode, what: &str) -> Result<Block> {
        if node.is_null() {
            return Ok(Vec::new());
        }
        if node.tag.is_some() {
            return Err(Error::tag(
                format!("the body of `{what}` cannot be tagged"),
                node.source_info,
            ));
        }
        match node.kind {
            YamlKind::Mapping(entries) => self.block(entries),
            _ => Err(Error::directive(
                format!("the body of `{what}` must be a mapping, not a {}", node.kind_name()),
                node.source_info,
            )),
        }
    }

    fn select(&mut self, key: Expr, node: YamlNode) -> Result<Statement> {
        let YamlKind::Mapping(entries) = node.kind else {
            return Err(Error::directive(
                format!("`select` expects a mapping of cases, not a {}", node.kind_name()),
                node.source_info,
            ));
        };
        let mut cases = Vec::with_capacity(entries.len());
        for (label, body) in entries {
            let Some((text, _, _)) = label.scalar() else {
                return Err(Error::directive(
                    "a case label must be a scalar",
                    label.source_info,
                ));
            };
            cases.push((text.to_string(), self.body(body, "select")?));
        }
        Ok(Statement::new(StatementKind::Select { key, cases }))
    }

    fn call(&mut self, name: String, node: YamlNode) -> Result<Statement> {
        let arguments = if node.is_null() {
            Vec::new()
        } else {
            let YamlKind::Mapping(entries) = node.kind else {
                return Err(Error::directive(
                    format!("`call {name}` expects a mapping of arguments"),
                    node.source_info,
                ));
            };
            let mut arguments = Vec::with_capacity(entries.len());
            for (argument, value) in entries {
                let argument_name = match argument.scalar() {
                    Some((text, _, _)) if is_identifier(text) => text.to_string(),
                    _ => {
                        return Err(Error::directive(
                            "an argument name must be an identifier",
                            argument.source_info,
                        ));
                    }
                };
                arguments.push((argument_name, self.value(value)?));
            }
            arguments
        };
        Ok(Statement::new(StatementKind::Call { name, arguments }))
    }

    /// A scalar read as an expression, for `!ref`, `!copy` and `!expr`.
    fn expression(&mut self, node: &YamlNode, tag: Tag) -> Result<Expr> {
        match node.scalar() {
            Some((text, _, offset)) => parse_expression_at(text, &node.source_info, offset),
            None => Err(Error::tag(
                format!("`!{}` expects a scalar, not a {}", tag.name(), node.kind_name()),
                node.source_info.clone(),
            )),
        }
    }

    /// One location, or a sequence of them.
    fn locations(&mut self, node: YamlNode) -> Result<Vec<(Expr, SourceInfo)>> {
        let nodes = match node.kind {
            YamlKind::Sequence(items) if node.tag.is_none() => items,
            kind => vec![YamlNode { kind, ..node }],
        };
        nodes
            .into_iter()
            .map(|node| Ok((self.location(&node)?, node.source_info)))
            .collect()
    }

    /// A document location: plain text, a template or an `!expr`.
    fn location(&mut self, node: &YamlNode) -> Result<Expr> {
        let source_info = node.source_info.clone();
        let Some((text, _, offset)) = node.scalar() else {
            return Err(Error::directive(
                format!("a document location must be a scalar, not a {}", node.kind_name()),
                source_info,
            ));
        };
        match self.tag(node)? {
            Some(Tag::Expr | Tag::Ref) => return parse_expression_at(text, &source_info, offset),
            Some(Tag::Str) | None => {}
            Some(other) => {
                return Err(Error::tag(
                    format!("`!{}` cannot be used on a document location", other.name()),
                    source_info,
                ));
            }
        }
        if !is_template(text) {
            return Ok(Expr::string(text).at(source_info));
        }
        // Interpolations are joined with `+`
        let parts = parse_template_at(text, &source_info, offset)?;
        let mut joined: Option<Expr> = None;
        for part in parts {
            let expr = match part {
                TemplatePart::Text(text) => Expr::string(text).at(source_info.clone()),
                TemplatePart::Expr(expr) => expr,
            };
            joined = Some(match joined {
                Some(left) => Expr::binary(BinaryOp::Add, left, expr).at(source_info.clone()),
                None => expr,
            });
        }
        Ok(joined.unwrap_or_else(|| Expr::string("").at(source_info)))
    }
}

/// Classify a plain key. `offset` is where `text` starts in `source_info`.
fn parse_key(text: &str, source_info: &SourceInfo, offset: usize) -> Result<Key> {
    match text {
        "else" => return Ok(Key::Else),
        "include" => return Ok(Key::Include),
        "search" => return Ok(Key::Search),
        _ => {}
    }
    let word_end = text.find(char::is_whitespace).unwrap_or(text.len());
    let word = &text[..word_end];
    let rest = text[word_end..].trim_start();
    let rest_offset = offset + (text.len() - rest.len());

    if !matches!(
        word,
        "if" | "elif" | "for" | "select" | "set" | "macro" | "call" | "extend"
    ) {
        return Ok(Key::Plain(text.to_string()));
    }
    if rest.is_empty() {
        return Err(Error::directive(
            format!("`{word}` needs an argument"),
            source_info.clone(),
        ));
    }
    let name = || -> Result<String> {
        if is_identifier(rest) {
            Ok(rest.to_string())
        } else {
            Err(Error::directive(
                format!("`{word}` expects a name, found `{rest}`"),
                SourceInfo::substring(source_info.clone(), rest_offset, rest_offset + rest.len()),
            ))
        }
    };
    let key = match word {
        "if" => Key::If(parse_expression_at(rest, source_info, rest_offset)?),
        "elif" => Key::Elif(parse_expression_at(rest, source_info, rest_offset)?),
        "select" => Key::Select(parse_expression_at(rest, source_info, rest_offset)?),
        "for" => {
            let (target, iterable, filter) = parse_for_header(rest, source_info, rest_offset)?;
            Key::For {
                target,
                iterable,
                filter,
            }
        }
        "set" => Key::Set(name()?),
        "macro" => Key::Macro(name()?),
        "call" => Key::Call(name()?),
        _ => Key::Extend(rest.to_string()),
    };
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::read;
    use pretty_assertions::assert_eq;
    use strata_graph::syntax::{ExprKind, SyntaxKind};
    use strata_source_map::FileId;

    fn convert(content: &str) -> Result<Document> {
        let root = read(content, FileId(0))?;
        Converter::default().document(root, SourceInfo::default())
    }

    fn kinds(document: &Document) -> Vec<&'static str> {
        document
            .block
            .iter()
            .map(|statement| match &statement.kind {
                StatementKind::Entry { action, .. } => match action {
                    Action::Assign => "entry",
                    Action::Append => "append",
                    Action::Remove => "remove",
                    Action::Copy => "copy",
                },
                StatementKind::Extend { .. } => "extend",
                StatementKind::Set { .. } => "set",
                StatementKind::Include(_) => "include",
                StatementKind::Search(_) => "search",
                StatementKind::If { .. } => "if",
                StatementKind::Select { .. } => "select",
                StatementKind::Macro { .. } => "macro",
                StatementKind::Call { .. } => "call",
            })
            .collect()
    }

    #[test]
    fn test_keys() {
        let info = SourceInfo::default();
        assert_eq!(parse_key("name", &info, 0).unwrap(), Key::Plain("name".into()));
        assert_eq!(parse_key("iffy", &info, 0).unwrap(), Key::Plain("iffy".into()));
        assert_eq!(parse_key("else", &info, 0).unwrap(), Key::Else);
        assert_eq!(parse_key("set base", &info, 0).unwrap(), Key::Set("base".into()));
        assert_eq!(parse_key("extend a b", &info, 0).unwrap(), Key::Extend("a b".into()));
        assert!(matches!(parse_key("if x == 1", &info, 0).unwrap(), Key::If(_)));
        assert!(matches!(parse_key("for x in y", &info, 0).unwrap(), Key::For { .. }));
        assert_eq!(parse_key("if", &info, 0).unwrap_err().code(), "S-1-4");
        assert_eq!(parse_key("set a-b", &info, 0).unwrap_err().code(), "S-1-4");
        assert_eq!(parse_key("if x ==", &info, 0).unwrap_err().code(), "S-1-1");
    }

    #[test]
    fn test_directives_and_entries() {
        let document = convert(
            "set base: /srv\n\
             a: 1\n\
             b: !append [2]\n\
             c: !remove [3]\n\
             d: !copy a\n\
             e: !extend {x: 1}\n\
             extend f: [4]\n\
             include: [one.yaml, two.yaml]\n\
             search: lib\n\
             if a:\n  g: 1\n\
             elif b:\n  g: 2\n\
             else:\n  g: 3\n\
             select a:\n  1: {h: 1}\n\
             macro m:\n  k: v\n\
             call m:\n",
        )
        .unwrap();
        assert_eq!(
            kinds(&document),
            vec![
                "set", "entry", "append", "remove", "copy", "extend", "extend", "include",
                "include", "search", "if", "select", "macro", "call"
            ]
        );
        let StatementKind::If {
            branches,
            otherwise,
        } = &document.block[10].kind
        else {
            panic!("expected an if");
        };
        assert_eq!(branches.len(), 2);
        assert!(otherwise.is_some());
    }

    #[test]
    fn test_scalars() {
        let document = convert(
            "plain: yes\nquoted: 'yes'\nnull_value:\ntemplate: \"{{ a }}!\"\nblock: |\n  x\nforced: !!str '{{ a }}'\n",
        )
        .unwrap();
        let values: Vec<&SyntaxKind> = document
            .block
            .iter()
            .map(|statement| match &statement.kind {
                StatementKind::Entry { value, .. } => &value.kind,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            values[0],
            &SyntaxKind::Scalar {
                text: "yes".into(),
                quoted: false
            }
        );
        assert_eq!(
            values[1],
            &SyntaxKind::Scalar {
                text: "yes".into(),
                quoted: true
            }
        );
        assert!(matches!(values[2], SyntaxKind::Expr(e) if e.kind == ExprKind::Null));
        assert!(matches!(values[3], SyntaxKind::Template(parts) if parts.len() == 2));
        assert_eq!(
            values[4],
            &SyntaxKind::Multiline {
                text: "x\n".into(),
                chomp: Chomp::Keep
            }
        );
        assert!(matches!(values[5], SyntaxKind::Scalar { quoted: true, .. }));
    }

    #[test]
    fn test_for_loop_value() {
        let document = convert("squares:\n  for x in [1, 2] if x > 1: \"{{ x * x }}\"\n").unwrap();
        let StatementKind::Entry { value, .. } = &document.block[0].kind else {
            panic!("expected an entry");
        };
        let SyntaxKind::For(for_loop) = &value.kind else {
            panic!("expected a for loop, got {value:?}");
        };
        assert_eq!(for_loop.target, "x");
        assert!(for_loop.filter.is_some());
    }

    #[test]
    fn test_include_location_templates_are_joined() {
        let document = convert("include: \"env/{{ env }}.yaml\"\n").unwrap();
        let StatementKind::Include(uri) = &document.block[0].kind else {
            panic!("expected an include");
        };
        assert!(matches!(uri.kind, ExprKind::Binary(BinaryOp::Add, _, _)));
    }

    #[test]
    fn test_structural_errors() {
        let cases = [
            ("- a\n- b\n", "S-1-1"),
            ("else:\n  a: 1\n", "S-1-4"),
            ("for x in y: 1\n", "S-1-4"),
            ("if a: 1\n", "S-1-4"),
            ("select a: [1]\n", "S-1-4"),
            ("call m: [1]\n", "S-1-4"),
            ("a: [!append 1]\n", "S-1-3"),
            ("a: !ref [1]\n", "S-1-3"),
            ("? [a]\n: 1\n", "S-1-1"),
        ];
        for (content, code) in cases {
            let err = convert(content).unwrap_err();
            assert_eq!(err.code(), code, "{content:?}: {err}");
        }
    }

    #[test]
    fn test_quoted_keys_are_never_directives() {
        let document = convert("'if': 1\n\"include\": 2\n").unwrap();
        assert_eq!(kinds(&document), vec!["entry", "entry"]);
    }

    #[test]
    fn test_unknown_tags_warn() {
        let root = read("a: !appendd [1]\n", FileId(0)).unwrap();
        let mut converter = Converter::default();
        let document = converter.document(root, SourceInfo::default()).unwrap();
        assert_eq!(kinds(&document), vec!["entry"]);
        assert_eq!(converter.diagnostics.len(), 1);
        assert_eq!(converter.diagnostics[0].hints, vec!["Did you mean `!append`?".to_string()]);
    }

    #[test]
    fn test_empty_documents() {
        assert!(convert("").unwrap().block.is_empty());
        assert!(convert("~\n").unwrap().block.is_empty());
    }
}
