//! YAML tags that change how a value is read.
//!
//! Tags are single words: `!append`, `!remove`, `!extend`, `!copy`, `!ref`,
//! `!include` and `!expr`. Underscores are reserved for future combined
//! tags and rejected for now. The core schema tag `!!str` forces a scalar to
//! be read as text; other core schema tags are accepted and ignored.

use crate::error::{Error, Result};
use strata_error_reporting::{DiagnosticMessage, DiagnosticMessageBuilder};
use strata_source_map::SourceInfo;

const CORE_SCHEMA: &str = "tag:yaml.org,2002:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Add items to the sequence already at the key
    Append,
    /// Remove matching items from the sequence already at the key
    Remove,
    /// Like `Append`, with the value written as a nested block
    Extend,
    /// Snapshot the value at a dotted path, then overlay it
    Copy,
    /// A lazy reference to the value at a dotted path
    Ref,
    /// Include a document at the key
    Include,
    /// The scalar is an expression
    Expr,
    /// `!!str`
    Str,
}

impl Tag {
    const ALL: &'static [(&'static str, Tag)] = &[
        ("append", Tag::Append),
        ("remove", Tag::Remove),
        ("extend", Tag::Extend),
        ("copy", Tag::Copy),
        ("ref", Tag::Ref),
        ("include", Tag::Include),
        ("expr", Tag::Expr),
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tag::Str => "!!str",
            tag => Tag::ALL
                .iter()
                .find(|(_, t)| *t == tag)
                .map_or("!", |(name, _)| *name),
        }
    }

    /// Whether the tag only makes sense on the value of a mapping entry.
    pub fn is_entry_only(self) -> bool {
        matches!(
            self,
            Tag::Append | Tag::Remove | Tag::Extend | Tag::Copy | Tag::Include
        )
    }
}

/// Interpret the tag `handle` + `suffix` attached to a node.
///
/// Unknown local tags are not fatal: they push a warning (with a suggestion
/// when one is close) and read as untagged. Malformed tags are errors.
pub fn parse_tag(
    handle: &str,
    suffix: &str,
    source_info: &SourceInfo,
    diagnostics: &mut Vec<DiagnosticMessage>,
) -> Result<Option<Tag>> {
    if handle == CORE_SCHEMA {
        return Ok((suffix == "str").then_some(Tag::Str));
    }
    // A lone `!` is the non-specific tag
    if handle.is_empty() || suffix.is_empty() {
        return Ok(None);
    }
    if handle != "!" {
        return Err(Error::tag(
            format!("`{handle}{suffix}` is not a tag this format understands"),
            source_info.clone(),
        ));
    }
    if suffix.contains(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
        return Err(Error::tag(
            format!("`!{suffix}` contains characters other than letters, digits and `_`"),
            source_info.clone(),
        ));
    }
    if suffix.contains('_') {
        return Err(Error::tag(
            format!("`!{suffix}` combines tags, which is not supported"),
            source_info.clone(),
        ));
    }
    if let Some((_, tag)) = Tag::ALL.iter().find(|(name, _)| *name == suffix) {
        return Ok(Some(*tag));
    }

    let mut builder = DiagnosticMessageBuilder::warning("Unknown tag")
        .with_code("S-1-2")
        .problem(format!("`!{suffix}` is not a known tag and was ignored"))
        .with_location(source_info.clone());
    if let Some(suggestion) = closest_tag(suffix) {
        builder = builder.add_hint(format!("Did you mean `!{suggestion}`?"));
    }
    diagnostics.push(builder.build());
    Ok(None)
}

fn closest_tag(name: &str) -> Option<&'static str> {
    let name = name.to_lowercase();
    Tag::ALL
        .iter()
        .map(|(candidate, _)| (*candidate, levenshtein_distance(&name, candidate)))
        .filter(|(_, distance)| *distance <= 2)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
