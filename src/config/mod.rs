//! Pipeline configuration management for `assetline.toml`.
//!
//! # Sections
//!
//! | Section           | Purpose                                          |
//! |-------------------|--------------------------------------------------|
//! | `[build]`         | Output root, manifest, hashing, browser targets  |
//! | `[groups.<name>]` | Asset groups: sources, destination, tools        |
//! | `[tasks.<name>]`  | Named pipelines (`build-prod`, `watch`, ...)     |
//!
//! # Example
//!
//! ```toml
//! [build]
//! output = "dist"
//!
//! [groups.css]
//! kind = "css"
//! src = ["app/sass/**/*.scss"]
//! dest = "dist/css"
//! concat = "app.css"
//!
//! [tasks.build-prod]
//! optimize = true
//! env = { NODE_ENV = "production" }
//! ```

mod build;
pub mod defaults;
mod error;
mod group;
mod task;

pub use build::{BuildConfig, ManifestConfig};
pub use error::ConfigError;
pub use group::{AssetKind, BundleConfig, GroupConfig, Phase};
pub use task::TaskConfig;

use crate::cli::{Cli, Commands};
use crate::utils::glob::{self, PatternSet};
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Default config file name.
pub const CONFIG_FILE: &str = "assetline.toml";

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing assetline.toml.
///
/// Constructed once at startup and shared read-only (behind an `Arc`)
/// by every task run.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Shared build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Asset groups by name
    #[serde(default)]
    pub groups: BTreeMap<String, GroupConfig>,

    /// Tasks by name
    #[serde(default = "defaults::tasks::builtin")]
    #[educe(Default = defaults::tasks::builtin())]
    pub tasks: BTreeMap<String, TaskConfig>,
}

impl PipelineConfig {
    /// Parse configuration from TOML string.
    ///
    /// Built-in tasks missing from the file are added back, so overriding
    /// `build-prod` does not drop `watch`.
    pub fn from_str(content: &str) -> Result<Self> {
        let mut config: PipelineConfig = toml::from_str(content).map_err(ConfigError::from)?;
        for (name, task) in defaults::tasks::builtin() {
            config.tasks.entry(name).or_insert(task);
        }
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.build.root = Some(path.to_path_buf())
    }

    /// Absolute manifest path, `None` when the manifest is disabled.
    pub fn manifest_path(&self) -> Option<PathBuf> {
        let manifest = &self.build.manifest;
        manifest.enable.then(|| self.build.output.join(&manifest.path))
    }

    /// Look up a task by name.
    pub fn task(&self, name: &str) -> Result<&TaskConfig, ConfigError> {
        self.tasks.get(name).ok_or_else(|| ConfigError::UnknownTask {
            name: name.to_owned(),
            available: self.tasks.keys().cloned().collect::<Vec<_>>().join(", "),
        })
    }

    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&GroupConfig> {
        self.groups.get(name)
    }

    /// Groups included in a task, in name order.
    pub fn task_groups<'a>(
        &'a self,
        task: &'a TaskConfig,
    ) -> impl Iterator<Item = (&'a String, &'a GroupConfig)> + 'a {
        self.groups.iter().filter(|(name, _)| task.includes(name))
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = cli
            .root
            .as_ref()
            .map(|root| PathBuf::from(shellexpand::tilde(&root.to_string_lossy()).into_owned()))
            .unwrap_or_else(|| self.get_root().to_owned());

        self.config_path = Self::normalize_path(&root.join(&cli.config));
        self.resolve(&root);

        if let Commands::Run {
            task,
            optimize: Some(optimize),
        } = &cli.command
            && let Some(task) = self.tasks.get_mut(task)
        {
            task.optimize = *optimize;
        }
    }

    /// Set the root and make every configured path absolute.
    pub fn resolve(&mut self, root: &Path) {
        let root = Self::normalize_path(root);
        self.set_root(&root);

        self.build.output = Self::normalize_path(&root.join(&self.build.output));
        for group in self.groups.values_mut() {
            group.dest = Self::normalize_path(&root.join(&group.dest));
            if let Some(base) = group.base.as_ref() {
                group.base = Some(Self::normalize_path(&root.join(base)));
            }
        }
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration before any task starts.
    pub fn validate(&self) -> Result<()> {
        let root = self.get_root();

        if !(4..=64).contains(&self.build.hash_length) {
            bail!(ConfigError::Validation(
                "[build.hash_length] must be between 4 and 64".into()
            ));
        }

        Self::check_clean_target("[build.output]", &self.build.output, root)?;

        for (name, group) in &self.groups {
            if group.src.is_empty() {
                bail!(ConfigError::Validation(format!(
                    "[groups.{name}.src] must have at least one pattern"
                )));
            }
            if group.clean {
                Self::check_clean_target(&format!("[groups.{name}.dest]"), &group.dest, root)?;
            }

            PatternSet::new(root, &group.watch_patterns())
                .map_err(|e| ConfigError::Validation(format!("[groups.{name}] {e}")))?;
            glob::glob_set(&group.inline_exclude)
                .map_err(|e| ConfigError::Validation(format!("[groups.{name}.inline_exclude] {e}")))?;

            for bundle in &group.bundles {
                if bundle.name.is_empty() || bundle.src.is_empty() {
                    bail!(ConfigError::Validation(format!(
                        "[groups.{name}.bundles] entries need a name and at least one source"
                    )));
                }
            }

            for (field, command) in group.tool_commands() {
                Self::check_command_installed(&format!("[groups.{name}.{field}]"), command)?;
            }
        }

        for (task_name, task) in &self.tasks {
            for group in &task.groups {
                if !self.groups.contains_key(group) {
                    bail!(ConfigError::UnknownGroup {
                        task: task_name.clone(),
                        group: group.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Refuse to clean the project root or anything above it.
    fn check_clean_target(field: &str, target: &Path, root: &Path) -> Result<()> {
        if root.starts_with(target) {
            bail!(ConfigError::Validation(format!(
                "{field} `{}` would clean the project root",
                target.display()
            )));
        }
        Ok(())
    }

    /// Check if a command is installed and available
    fn check_command_installed(field: &str, command: &[String]) -> Result<()> {
        if command.is_empty() {
            bail!(ConfigError::Validation(format!(
                "{field} must have at least one element"
            )));
        }

        let cmd = &command[0];
        which::which(cmd)
            .with_context(|| format!("`{cmd}` not found. Please install it first."))?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
