//! `[build]` section configuration.
//!
//! Contains settings shared by every group: output root, manifest, hashing.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[build]` section in assetline.toml - shared pipeline settings.
///
/// # Example
/// ```toml
/// [build]
/// output = "dist"
/// targets = ["last 20 versions"]
///
/// [build.manifest]
/// enable = true
/// path = "rev-manifest.json"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Project root directory (usually set via CLI `--root`).
    #[serde(default = "defaults::build::root")]
    #[educe(Default = defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Output root. Full builds clean this directory before processing.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Browser targets handed to the post-processor (`{targets}` placeholder).
    #[serde(default = "defaults::build::targets")]
    #[educe(Default = defaults::build::targets())]
    pub targets: Vec<String>,

    /// Number of hex characters kept from the content hash.
    #[serde(default = "defaults::build::hash_length")]
    #[educe(Default = defaults::build::hash_length())]
    pub hash_length: usize,

    /// Cache-busting manifest settings.
    #[serde(default)]
    pub manifest: ManifestConfig,
}

/// `[build.manifest]` section - revision manifest output.
///
/// The manifest maps unminified output names to their hashed copies and is
/// merged with the file already on disk instead of being replaced.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct ManifestConfig {
    /// Write the manifest at all.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub enable: bool,

    /// Manifest location, relative to `build.output`.
    #[serde(default = "defaults::build::manifest::path")]
    #[educe(Default = defaults::build::manifest::path())]
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::super::PipelineConfig;
    use std::path::PathBuf;

    #[test]
    fn test_build_config_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();

        assert_eq!(config.build.output, PathBuf::from("dist"));
        assert_eq!(config.build.targets, vec!["last 20 versions".to_string()]);
        assert_eq!(config.build.hash_length, 10);
        assert!(config.build.manifest.enable);
        assert_eq!(config.build.manifest.path, PathBuf::from("rev-manifest.json"));
    }

    #[test]
    fn test_build_config_custom() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [build]
            output = "public"
            hash_length = 8

            [build.manifest]
            enable = false
        "#,
        )
        .unwrap();

        assert_eq!(config.build.output, PathBuf::from("public"));
        assert_eq!(config.build.hash_length, 8);
        assert!(!config.build.manifest.enable);
    }

    #[test]
    fn test_unknown_field_rejection() {
        let result: Result<PipelineConfig, _> = toml::from_str(
            r#"
            [build]
            minify = true
        "#,
        );
        assert!(result.is_err());
    }
}
