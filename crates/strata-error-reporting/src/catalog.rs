//! Error code catalog.
//!
//! Codes follow `S-<subsystem>-<number>`: 0 internal, 1 syntax, 2 evaluation
//! and overlay, 3 executor, 4 loader.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata for an error code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorCodeInfo {
    /// Subsystem name (e.g., "syntax", "executor")
    pub subsystem: String,

    /// Short title for the error
    pub title: String,

    /// Default one-line description
    pub message_template: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_url: Option<String>,

    pub since_version: String,
}

/// Embedded catalog, parsed on first use.
///
/// # Panics
///
/// Panics if the embedded JSON is invalid, which a test below guards against.
pub static ERROR_CATALOG: Lazy<HashMap<String, ErrorCodeInfo>> = Lazy::new(|| {
    let json_data = include_str!("../error_catalog.json");
    serde_json::from_str(json_data).expect("Invalid error catalog JSON")
});

pub fn get_error_info(code: &str) -> Option<&'static ErrorCodeInfo> {
    ERROR_CATALOG.get(code)
}

pub fn get_docs_url(code: &str) -> Option<&'static str> {
    ERROR_CATALOG
        .get(code)
        .and_then(|info| info.docs_url.as_deref())
}

pub fn get_subsystem(code: &str) -> Option<&'static str> {
    ERROR_CATALOG.get(code).map(|info| info.subsystem.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_loads() {
        assert!(!ERROR_CATALOG.is_empty());
    }

    #[test]
    fn test_codes_are_well_formed() {
        for (code, info) in ERROR_CATALOG.iter() {
            let parts: Vec<&str> = code.split('-').collect();
            assert_eq!(parts.len(), 3, "{code}");
            assert_eq!(parts[0], "S", "{code}");
            assert!(parts[1].parse::<u32>().is_ok(), "{code}");
            assert!(parts[2].parse::<u32>().is_ok(), "{code}");
            assert!(!info.title.is_empty(), "{code}");
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(get_subsystem("S-3-2"), Some("executor"));
        assert_eq!(get_error_info("S-3-1").unwrap().title, "Cycle Detected");
        assert!(get_docs_url("S-0-1").unwrap().ends_with("S-0-1"));
        assert!(get_error_info("S-99-99").is_none());
    }
}
