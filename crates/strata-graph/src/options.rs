//! Engine configuration.

use serde::Deserialize;

/// Tunables for an [`Engine`](crate::Engine).
///
/// Deserializable so embedding applications can read it from their own
/// configuration files:
///
/// ```
/// use strata_graph::EngineOptions;
///
/// let options: EngineOptions = serde_json::from_str(r#"{"max_depth": 32}"#).unwrap();
/// assert_eq!(options.max_depth, 32);
/// assert!(options.flatten_nested_loops);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Maximum number of nested in-flight operations. Recursion past this
    /// fails with `NestingTooDeep`.
    pub max_depth: usize,
    /// Splice the items of a `for` body that is itself a `for` into the
    /// outer sequence.
    pub flatten_nested_loops: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            max_depth: 256,
            flatten_nested_loops: true,
        }
    }
}
