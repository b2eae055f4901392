//! Watch mode: rebuild the affected group on every source change.
//!
//! # Architecture
//!
//! ```text
//! ┌────────┐   mpsc    ┌───────────────────┐  per group  ┌──────────────────┐
//! │ notify │──────────▶│ WatchDispatcher   │────────────▶│ reduced TaskGraph │
//! │ events │           │ (match watch globs)│ tokio::spawn│ clean + process   │
//! └────────┘           └───────────────────┘             └──────────────────┘
//! ```
//!
//! Every relevant event starts one independent cycle per matched group.
//! Cycles are neither debounced nor coalesced: two quick saves of the same
//! file run two full clean + process cycles, which may overlap.

use crate::{
    config::PipelineConfig,
    log,
    logger::timestamp,
    pipeline::{TaskGraph, TaskReport, task},
    utils::glob::PatternSet,
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{sync::mpsc, task::JoinHandle};

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
        || name.starts_with('#')
}

/// Format path as relative to root for log display.
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Maps changed paths to groups and launches their reduced Tasks.
pub struct WatchDispatcher {
    config: Arc<PipelineConfig>,
    task: String,
    groups: Vec<(String, PatternSet)>,
    /// Output directories; events inside them are our own writes.
    ignored: Vec<PathBuf>,
}

impl WatchDispatcher {
    pub fn new(config: Arc<PipelineConfig>, task: &str) -> Result<Self> {
        let task_config = config.task(task)?;
        let root = config.get_root();

        let groups = config
            .task_groups(task_config)
            .map(|(name, group)| {
                PatternSet::new(root, &group.watch_patterns())
                    .map(|set| (name.clone(), set))
                    .with_context(|| format!("invalid watch patterns in [groups.{name}]"))
            })
            .collect::<Result<Vec<_>>>()?;

        // A destination at or above the root would ignore every source.
        let ignored = std::iter::once(&config.build.output)
            .chain(config.groups.values().map(|g| &g.dest))
            .filter(|dir| !root.starts_with(dir))
            .cloned()
            .collect();

        Ok(Self {
            task: task.to_owned(),
            groups,
            ignored,
            config,
        })
    }

    /// Directories to watch recursively.
    pub fn watch_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for base in self.groups.iter().flat_map(|(_, set)| set.bases()) {
            if !dirs.iter().any(|d| base.starts_with(d)) {
                dirs.retain(|d| !d.starts_with(&base));
                dirs.push(base);
            }
        }
        dirs
    }

    fn is_ignored(&self, path: &Path) -> bool {
        is_temp_file(path) || self.ignored.iter().any(|dir| path.starts_with(dir))
    }

    /// Groups affected by `paths`, each listed once, in config order.
    pub fn groups_for(&self, paths: &[PathBuf]) -> Vec<&str> {
        let paths: Vec<&PathBuf> = paths.iter().filter(|p| !self.is_ignored(p)).collect();
        self.groups
            .iter()
            .filter(|(_, set)| paths.iter().any(|p| set.is_match(p)))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Start one reduced Task per affected group.
    ///
    /// Returns immediately; the handles resolve when each cycle finishes.
    pub fn dispatch(&self, paths: &[PathBuf]) -> Vec<JoinHandle<TaskReport>> {
        let root = self.config.get_root();
        let mut handles = Vec::new();

        for group in self.groups_for(paths) {
            let changed = paths
                .iter()
                .map(|p| rel_path(p, root))
                .collect::<Vec<_>>()
                .join(", ");
            log!("watch"; "{} {changed} changed, rebuilding {group}", timestamp());

            match TaskGraph::for_group(&self.config, &self.task, group) {
                Ok(graph) => handles.push(tokio::spawn(task::run(Arc::new(graph)))),
                Err(e) => log!("watch"; "{e}"),
            }
        }

        handles
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Watch sources and rebuild until the watcher shuts down.
pub async fn watch(config: Arc<PipelineConfig>, task: &str) -> Result<()> {
    let dispatcher = WatchDispatcher::new(Arc::clone(&config), task)?;
    let root = config.get_root();

    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |res| {
        // Receiver gone means we are shutting down.
        let _ = tx.send(res);
    })
    .context("Failed to create file watcher")?;

    let mut watched = Vec::new();
    for dir in dispatcher.watch_dirs() {
        if dir.exists() {
            watcher
                .watch(&dir, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}", dir.display()))?;
            watched.push(format!("{}/", rel_path(&dir, root)));
        }
    }

    if watched.is_empty() {
        log!("watch"; "nothing to watch");
        return Ok(());
    }
    log!("watch"; "watching {}", watched.join(", "));

    while let Some(res) = rx.recv().await {
        match res {
            Ok(event) if is_relevant(&event) => {
                // Cycles report through the log; nothing waits for them.
                dispatcher.dispatch(&event.paths);
            }
            Ok(_) => {}
            Err(e) => log!("watch"; "error: {e}"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::task::TaskState;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn project() -> (TempDir, Arc<PipelineConfig>) {
        let dir = tempdir().unwrap();
        let mut config = PipelineConfig::from_str(
            r#"
            [groups.css]
            kind = "css"
            src = ["app/css/**/*.css"]
            dest = "dist/css"
            concat = "app.css"
            watch = ["app/components/**/*.css"]

            [groups.js]
            kind = "js"
            src = ["app/js/**/*.js"]
            dest = "dist/js"
        "#,
        )
        .unwrap();
        config.resolve(dir.path());
        (dir, Arc::new(config))
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("app/css/site.css~")));
        assert!(is_temp_file(Path::new("app/css/.site.css.swp")));
        assert!(is_temp_file(Path::new("app/css/site.bak")));
        assert!(!is_temp_file(Path::new("app/css/site.css")));
    }

    #[test]
    fn test_groups_for_changed_paths() {
        let (_dir, config) = project();
        let root = config.get_root().to_path_buf();
        let dispatcher = WatchDispatcher::new(Arc::clone(&config), "watch").unwrap();

        let groups = dispatcher.groups_for(&[
            root.join("app/css/site.css"),
            root.join("app/components/card.css"),
        ]);
        assert_eq!(groups, vec!["css"]);

        assert_eq!(dispatcher.groups_for(&[root.join("app/js/app.js")]), vec!["js"]);
        assert!(dispatcher.groups_for(&[root.join("app/css/site.css~")]).is_empty());
        assert!(dispatcher.groups_for(&[root.join("dist/css/app.css")]).is_empty());
        assert!(dispatcher.groups_for(&[root.join("README.md")]).is_empty());
    }

    #[test]
    fn test_watch_dirs() {
        let (_dir, config) = project();
        let root = config.get_root().to_path_buf();
        let dispatcher = WatchDispatcher::new(Arc::clone(&config), "watch").unwrap();

        let mut dirs = dispatcher.watch_dirs();
        dirs.sort();
        assert_eq!(
            dirs,
            vec![root.join("app/components"), root.join("app/css"), root.join("app/js")]
        );
    }

    #[test]
    fn test_unknown_watch_task() {
        let (_dir, config) = project();
        assert!(WatchDispatcher::new(config, "serve").is_err());
    }

    #[tokio::test]
    async fn test_double_event_runs_two_cycles() {
        let (_dir, config) = project();
        let root = config.get_root().to_path_buf();
        fs::create_dir_all(root.join("app/css")).unwrap();
        fs::write(root.join("app/css/site.css"), "a{}").unwrap();
        fs::create_dir_all(root.join("dist/js")).unwrap();
        fs::write(root.join("dist/js/app.js"), "kept").unwrap();

        let dispatcher = WatchDispatcher::new(Arc::clone(&config), "watch").unwrap();
        let changed = [root.join("app/css/site.css")];

        let mut handles = dispatcher.dispatch(&changed);
        handles.extend(dispatcher.dispatch(&changed));
        assert_eq!(handles.len(), 2);

        for handle in handles {
            let report = handle.await.unwrap();
            assert_eq!(report.task, "watch:css");
            assert_eq!(report.state(), TaskState::Done);
            assert!(report.transitions.contains(&TaskState::Cleaning));
        }

        assert!(root.join("dist/css/app.css").is_file());
        // Reduced cycles never touch other groups' outputs
        assert!(root.join("dist/js/app.js").is_file());
    }
}
