//! Bundle planner: turns an asset group into Stage invocations.
//!
//! A group yields one unbundled invocation over its full source list plus
//! one invocation per named bundle. All of them share the group's
//! destination directory and tool set, and may run concurrently.
//!
//! The transform chain is resolved here, once, into a list of [`Step`]s:
//!
//! ```text
//! css   Compile → PostProcess? → Concat? → Write ┐
//! js    Compile → Concat? → Write ───────────────┤ optimize
//!                                                └→ Minify → RenameMin → Write
//!                                                   → Hash → Write → RecordManifest
//! html  Compile → Concat? → Flatten? → RewriteRefs? → Inline? → Minify? → Write
//! images  Optimize? → Write
//! copy    Write
//! ```

use crate::config::{AssetKind, GroupConfig};
use crate::tools::GroupTools;
use std::{
    path::PathBuf,
    sync::Arc,
};

/// One transform in a Stage's chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Kind-specific compile: style compiler, bundler or template engine.
    Compile,
    /// Style post-processor.
    PostProcess,
    /// Concatenate every file into one named output.
    Concat(String),
    /// Drop source directories from output paths.
    Flatten,
    /// Rewrite asset references using the manifest.
    RewriteRefs,
    /// Inline local stylesheets and scripts.
    Inline,
    /// Minify in place; never grows a file.
    Minify,
    /// `app.css` → `app.min.css`.
    RenameMin,
    /// Image optimization; never grows a file.
    Optimize,
    /// `app.min.css` → `app-<hash>.min.css`.
    Hash,
    /// Write the current files to the destination.
    Write,
    /// Map unminified names to hashed names in the manifest.
    RecordManifest,
}

/// A concrete Stage run: sources, destination, resolved chain.
#[derive(Debug, Clone)]
pub struct StageInvocation {
    pub group: String,
    /// `None` for the unbundled pass.
    pub bundle: Option<String>,
    pub kind: AssetKind,
    /// Ordered source globs.
    pub sources: Vec<String>,
    pub dest: PathBuf,
    pub base: Option<PathBuf>,
    pub steps: Vec<Step>,
    pub tools: Arc<GroupTools>,
    /// Url globs the inline step leaves alone.
    pub inline_exclude: Vec<String>,
}

impl StageInvocation {
    /// Display label used in progress messages: `css` or `css:ios.css`.
    pub fn label(&self) -> String {
        match &self.bundle {
            Some(bundle) => format!("{}:{bundle}", self.group),
            None => self.group.clone(),
        }
    }
}

/// Plan every Stage invocation of a group: `1 + bundles.len()` of them.
pub fn plan(name: &str, group: &GroupConfig, optimize: bool, manifest: bool) -> Vec<StageInvocation> {
    let tools = Arc::new(GroupTools::from_config(group));

    let unbundled = (None, group.src.clone(), group.concat.clone());
    let bundles = group
        .bundles
        .iter()
        .map(|b| (Some(b.name.clone()), b.src.clone(), Some(b.name.clone())));

    std::iter::once(unbundled)
        .chain(bundles)
        .map(|(bundle, sources, concat)| StageInvocation {
            group: name.to_owned(),
            bundle,
            kind: group.kind,
            sources,
            dest: group.dest.clone(),
            base: group.base.clone(),
            steps: chain(group, concat, optimize, manifest),
            tools: Arc::clone(&tools),
            inline_exclude: group.inline_exclude.clone(),
        })
        .collect()
}

/// Resolve the transform chain for one invocation.
pub fn chain(group: &GroupConfig, concat: Option<String>, optimize: bool, manifest: bool) -> Vec<Step> {
    let mut steps = Vec::new();

    match group.kind {
        AssetKind::Css | AssetKind::Js => {
            steps.push(Step::Compile);
            if group.kind == AssetKind::Css && group.post.is_some() {
                steps.push(Step::PostProcess);
            }
            steps.extend(concat.map(Step::Concat));
            steps.push(Step::Write);

            if optimize {
                steps.extend([Step::Minify, Step::RenameMin, Step::Write]);
                if group.hashes() {
                    steps.extend([Step::Hash, Step::Write]);
                    if manifest {
                        steps.push(Step::RecordManifest);
                    }
                }
            }
        }
        AssetKind::Html => {
            steps.push(Step::Compile);
            steps.extend(concat.map(Step::Concat));
            if group.flatten {
                steps.push(Step::Flatten);
            }
            if manifest {
                steps.push(Step::RewriteRefs);
            }
            if optimize {
                if group.inline {
                    steps.push(Step::Inline);
                }
                steps.push(Step::Minify);
            }
            steps.push(Step::Write);
        }
        AssetKind::Images => {
            if optimize {
                steps.push(Step::Optimize);
            }
            if group.flatten {
                steps.push(Step::Flatten);
            }
            steps.push(Step::Write);
        }
        AssetKind::Copy => {
            steps.extend(concat.map(Step::Concat));
            if group.flatten {
                steps.push(Step::Flatten);
            }
            steps.push(Step::Write);
        }
    }

    steps
}
