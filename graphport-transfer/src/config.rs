//! Per-call configuration for exports and imports.
//!
//! Both structs deserialize with `#[serde(default)]`, so a partial JSON
//! object only overrides the settings it names.

use serde::{Deserialize, Serialize};

/// Export settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Maximum link nesting followed from the root before failing with
    /// `DepthExceeded`.
    pub max_depth: usize,
    /// Pretty-print the JSON document.
    pub pretty: bool,
    /// Extension of the suggested export filename.
    pub file_extension: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_depth: 256,
            pretty: true,
            file_extension: "json".to_string(),
        }
    }
}

/// Import settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Upper bound on relink passes.
    pub max_relink_passes: usize,
    /// Fail on fields the type does not declare. When false they are
    /// logged and skipped.
    pub strict_fields: bool,
    /// Invoke the repository's post-import hook per touched type.
    pub run_post_import: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_relink_passes: 10_000,
            strict_fields: true,
            run_post_import: true,
        }
    }
}
