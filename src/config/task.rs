//! `[tasks.<name>]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `[tasks.<name>]` section - a named pipeline.
///
/// # Example
/// ```toml
/// [tasks.build-prod]
/// optimize = true
/// env = { NODE_ENV = "production" }
///
/// [tasks.styles]
/// groups = ["css"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct TaskConfig {
    /// Minify, hash and record manifest entries.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub optimize: bool,

    /// Clean output directories before processing.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub clean: bool,

    /// Groups this task runs. Empty means every group.
    pub groups: Vec<String>,

    /// Environment exported to every external tool.
    pub env: BTreeMap<String, String>,

    /// Run as watch mode: rebuild the affected group on each change.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub watch: bool,
}

impl TaskConfig {
    /// Whether this task includes the given group.
    pub fn includes(&self, group: &str) -> bool {
        self.groups.is_empty() || self.groups.iter().any(|g| g == group)
    }
}
