//! `[groups.<name>]` section configuration.
//!
//! An asset group is one logical category of sources (stylesheets, scripts,
//! views, images) sharing a destination directory and a transform chain.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Enums
// ============================================================================

/// What kind of assets a group holds. Selects the transform chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Stylesheets: compile → post-process → concat → minify → hash.
    Css,
    /// Scripts: bundle → concat → minify → hash.
    Js,
    /// Views: template → rewrite references → inline → minify.
    Html,
    /// Images: optimize when optimizing, copy otherwise.
    Images,
    /// Plain copy.
    #[default]
    Copy,
}

impl AssetKind {
    /// Short name used in logs and the `{kind}` placeholder.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Js => "js",
            Self::Html => "html",
            Self::Images => "images",
            Self::Copy => "copy",
        }
    }

    /// Kinds producing `.min` and hashed copies when optimizing.
    pub const fn is_minifiable(self) -> bool {
        matches!(self, Self::Css | Self::Js)
    }

    /// Output extension after the compile step, if the kind forces one.
    pub const fn output_extension(self) -> Option<&'static str> {
        match self {
            Self::Css => Some("css"),
            Self::Js => Some("js"),
            Self::Html => Some("html"),
            Self::Images | Self::Copy => None,
        }
    }
}

/// Task phase a group runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Runs concurrently with every other processing group.
    Process,
    /// Runs after all processing groups finished (reads the manifest).
    Finalize,
}

// ============================================================================
// Group
// ============================================================================

/// `[groups.<name>]` section - one asset group.
///
/// # Example
/// ```toml
/// [groups.css]
/// kind = "css"
/// src = ["app/sass/**/*.scss"]
/// dest = "dist/css"
/// compiler = ["sass", "--stdin"]
///
/// [[groups.css.bundles]]
/// name = "ios.css"
/// src = ["app/sass/a.scss", "app/sass/b.scss"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct GroupConfig {
    /// Asset kind, selects the transform chain.
    pub kind: AssetKind,

    /// Ordered source globs. Entries starting with `!` exclude matches.
    pub src: Vec<String>,

    /// Destination directory.
    pub dest: PathBuf,

    /// Base directory for relative output paths.
    /// Defaults to the literal prefix of each glob.
    pub base: Option<PathBuf>,

    /// Concatenate the unbundled pass into this single file.
    pub concat: Option<String>,

    /// Named bundles, each concatenated into its own output file.
    pub bundles: Vec<BundleConfig>,

    /// Drop the source directory structure when writing.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub flatten: bool,

    /// Inline local html imports, stylesheets and scripts into html when
    /// optimizing.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub inline: bool,

    /// Urls never inlined, as globs (`//fonts.googleapis.com/*`).
    pub inline_exclude: Vec<String>,

    /// Produce hashed copies and manifest entries when optimizing.
    /// Defaults to true for css and js groups.
    pub hash: Option<bool>,

    /// Task phase. Defaults to `finalize` for html groups.
    pub phase: Option<Phase>,

    /// Clean `dest` before processing.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub clean: bool,

    /// Extra globs that trigger this group in watch mode.
    pub watch: Vec<String>,

    /// StyleCompiler (css) or TemplateEngine (html) command.
    pub compiler: Option<Vec<String>>,

    /// PostProcessor command (css).
    pub post: Option<Vec<String>>,

    /// Bundler command (js), run once per entry source.
    pub bundler: Option<Vec<String>>,

    /// Minifier command overriding the built-in minifier.
    pub minifier: Option<Vec<String>>,

    /// ImageOptimizer command (images).
    pub optimizer: Option<Vec<String>>,
}

impl GroupConfig {
    /// Whether optimized runs hash outputs for this group.
    pub fn hashes(&self) -> bool {
        self.hash.unwrap_or(self.kind.is_minifiable()) && self.kind.is_minifiable()
    }

    /// Phase this group runs in, applying the per-kind default.
    pub fn phase(&self) -> Phase {
        self.phase.unwrap_or(match self.kind {
            AssetKind::Html => Phase::Finalize,
            _ => Phase::Process,
        })
    }

    /// Every glob that should trigger a rebuild of this group.
    pub fn watch_patterns(&self) -> Vec<String> {
        let mut patterns = self.src.clone();
        for bundle in &self.bundles {
            for pattern in &bundle.src {
                if !patterns.contains(pattern) {
                    patterns.push(pattern.clone());
                }
            }
        }
        patterns.extend(self.watch.iter().cloned());
        patterns
    }

    /// All configured external tool commands, labelled by their field name.
    pub fn tool_commands(&self) -> impl Iterator<Item = (&'static str, &Vec<String>)> {
        [
            ("compiler", self.compiler.as_ref()),
            ("post", self.post.as_ref()),
            ("bundler", self.bundler.as_ref()),
            ("minifier", self.minifier.as_ref()),
            ("optimizer", self.optimizer.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, cmd)| cmd.map(|cmd| (name, cmd)))
    }
}

/// `[[groups.<name>.bundles]]` - a named, ordered list of sources
/// concatenated into one output file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleConfig {
    /// Output file name, e.g. `ios.css`.
    pub name: String,

    /// Ordered source globs. Order determines concatenation order.
    #[serde(alias = "globs")]
    pub src: Vec<String>,
}
