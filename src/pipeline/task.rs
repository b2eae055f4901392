//! Tasks: named pipelines run through a small state machine.
//!
//! ```text
//! Idle → Cleaning → Processing → Finalizing → Done
//!          │            │             │
//!          └────────────┴─────────────┴──▶ Failed
//! ```
//!
//! Cleaning is skipped when there is nothing to clean and Finalizing when
//! no group runs in the finalize phase. Stages of one phase run
//! concurrently; the next phase starts only after all of them reported.

use super::{
    clean::clean_all,
    error::chain,
    manifest::Manifest,
    planner::{StageInvocation, plan},
    stage::{self, StageContext, StageResult},
};
use crate::{
    config::{ConfigError, GroupConfig, Phase, PipelineConfig, TaskConfig},
    log,
    tools::ToolEnv,
};
use anyhow::{Result, bail};
use std::{
    fmt,
    path::PathBuf,
    sync::Arc,
    time::Instant,
};
use tokio::task::JoinSet;

// ============================================================================
// Graph
// ============================================================================

/// A Task resolved against the configuration, ready to run.
///
/// Built once per run and never mutated.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    pub name: String,
    /// Directories emptied before processing.
    pub clean: Vec<PathBuf>,
    pub process: Vec<StageInvocation>,
    pub finalize: Vec<StageInvocation>,
    /// `None` when the manifest is disabled.
    pub manifest: Option<PathBuf>,
    pub env: ToolEnv,
    pub hash_length: usize,
    pub output: PathBuf,
}

impl TaskGraph {
    /// Resolve a task by name into its full graph.
    pub fn build(config: &PipelineConfig, name: &str) -> Result<Self, ConfigError> {
        let task = config.task(name)?;
        let groups: Vec<_> = config.task_groups(task).collect();

        let clean = if !task.clean {
            Vec::new()
        } else if task.groups.is_empty() {
            let output = &config.build.output;
            std::iter::once(output.clone())
                .chain(
                    groups
                        .iter()
                        .filter(|(_, g)| g.clean && !g.dest.starts_with(output))
                        .map(|(_, g)| g.dest.clone()),
                )
                .collect()
        } else {
            dedup_nested(groups.iter().filter(|(_, g)| g.clean).map(|(_, g)| g.dest.clone()))
        };

        Ok(Self::assemble(config, name, task, &groups, clean))
    }

    /// The reduced graph a watch event runs: one group, cleaning only its
    /// destination.
    pub fn for_group(config: &PipelineConfig, task_name: &str, group: &str) -> Result<Self, ConfigError> {
        let task = config.task(task_name)?;
        let (name, group_config) = config
            .groups
            .get_key_value(group)
            .ok_or_else(|| ConfigError::UnknownGroup {
                task: task_name.to_owned(),
                group: group.to_owned(),
            })?;

        let clean = if task.clean && group_config.clean {
            vec![group_config.dest.clone()]
        } else {
            Vec::new()
        };

        let label = format!("{task_name}:{group}");
        Ok(Self::assemble(config, &label, task, &[(name, group_config)], clean))
    }

    fn assemble(
        config: &PipelineConfig,
        name: &str,
        task: &TaskConfig,
        groups: &[(&String, &GroupConfig)],
        clean: Vec<PathBuf>,
    ) -> Self {
        let manifest = config.manifest_path();
        let (mut process, mut finalize) = (Vec::new(), Vec::new());

        for (group_name, group) in groups {
            let invocations = plan(group_name, group, task.optimize, manifest.is_some());
            match group.phase() {
                Phase::Process => process.extend(invocations),
                Phase::Finalize => finalize.extend(invocations),
            }
        }

        Self {
            name: name.to_owned(),
            clean,
            process,
            finalize,
            manifest,
            env: ToolEnv {
                root: config.get_root().to_path_buf(),
                vars: task.env.clone(),
                targets: config.build.targets.join(", "),
            },
            hash_length: config.build.hash_length,
            output: config.build.output.clone(),
        }
    }

    pub fn stage_count(&self) -> usize {
        self.process.len() + self.finalize.len()
    }
}

/// Drop directories nested inside another directory of the list.
fn dedup_nested(dirs: impl Iterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();
    for dir in dirs {
        if out.iter().any(|d| dir.starts_with(d)) {
            continue;
        }
        out.retain(|d| !d.starts_with(&dir));
        out.push(dir);
    }
    out
}

// ============================================================================
// State Machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Cleaning,
    Processing,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Cleaning => "cleaning",
            Self::Processing => "processing",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// Aggregate outcome of a Task run.
#[derive(Debug)]
pub struct TaskReport {
    pub task: String,
    /// Every state entered, in order, starting with `Idle`.
    pub transitions: Vec<TaskState>,
    pub results: Vec<StageResult>,
    /// Fatal errors, formatted with their source chain.
    pub errors: Vec<String>,
    started: Instant,
}

impl TaskReport {
    fn new(task: &str) -> Self {
        Self {
            task: task.to_owned(),
            transitions: vec![TaskState::Idle],
            results: Vec::new(),
            errors: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> TaskState {
        self.transitions.last().copied().unwrap_or(TaskState::Idle)
    }

    pub fn is_done(&self) -> bool {
        self.state() == TaskState::Done
    }

    pub fn warning_count(&self) -> usize {
        self.results.iter().map(|r| r.warnings.len()).sum()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.results.iter().flat_map(|r| r.outputs.iter())
    }

    fn enter(&mut self, state: TaskState) {
        self.transitions.push(state);
        let elapsed = self.started.elapsed().as_millis();
        match state {
            TaskState::Done => {
                let warnings = self.warning_count();
                let files = self.outputs().count();
                if warnings == 0 {
                    log!(&self.task; "done: {files} files in {elapsed}ms");
                } else {
                    log!(&self.task; "done: {files} files in {elapsed}ms ({warnings} warnings)");
                }
            }
            TaskState::Failed => log!("error"; "{} failed after {elapsed}ms", self.task),
            _ => log!(&self.task; "{state}..."),
        }
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Run a Task to completion. Never returns early: the report's final state
/// is `Done` or `Failed`.
pub async fn run(graph: Arc<TaskGraph>) -> TaskReport {
    let mut report = TaskReport::new(&graph.name);

    match execute(&graph, &mut report).await {
        Ok(()) => report.enter(TaskState::Done),
        Err(e) => {
            report.errors.push(format!("{e:#}"));
            for error in &report.errors {
                log!("error"; "{error}");
            }
            report.enter(TaskState::Failed);
        }
    }

    report
}

async fn execute(graph: &TaskGraph, report: &mut TaskReport) -> Result<()> {
    if !graph.clean.is_empty() {
        report.enter(TaskState::Cleaning);
        let (targets, root) = (graph.clean.clone(), graph.env.root.clone());
        tokio::task::spawn_blocking(move || clean_all(&targets, &root)).await??;
    }

    report.enter(TaskState::Processing);
    let manifest = Arc::new(match &graph.manifest {
        Some(path) => Manifest::load(path)?,
        None => Manifest::disabled(),
    });
    let ctx = Arc::new(StageContext {
        env: graph.env.clone(),
        manifest: Arc::clone(&manifest),
        hash_length: graph.hash_length,
        output: graph.output.clone(),
    });

    join_stages(&graph.process, &ctx, report).await?;

    if !manifest.is_empty() {
        tokio::task::spawn_blocking(move || manifest.save()).await??;
    }

    if !graph.finalize.is_empty() {
        report.enter(TaskState::Finalizing);
        join_stages(&graph.finalize, &ctx, report).await?;
    }

    Ok(())
}

/// Launch every invocation concurrently and wait for all of them.
///
/// A failing Stage does not cancel its siblings; the phase fails once all
/// of them have reported.
async fn join_stages(
    invocations: &[StageInvocation],
    ctx: &Arc<StageContext>,
    report: &mut TaskReport,
) -> Result<()> {
    let mut set = JoinSet::new();
    for inv in invocations.iter().cloned() {
        let ctx = Arc::clone(ctx);
        set.spawn_blocking(move || {
            let label = inv.label();
            stage::run(&inv, &ctx).map_err(|e| format!("{label}: {}", chain(&e)))
        });
    }

    let mut failed = 0;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(result)) => report.results.push(result),
            Ok(Err(error)) => {
                report.errors.push(error);
                failed += 1;
            }
            Err(e) => {
                report.errors.push(format!("stage panicked: {e}"));
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} stages failed", invocations.len());
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::BTreeMap, fs, path::Path};
    use tempfile::{TempDir, tempdir};

    fn project(toml: &str) -> (TempDir, PipelineConfig) {
        let dir = tempdir().unwrap();
        let mut config = PipelineConfig::from_str(toml).unwrap();
        config.resolve(dir.path());
        (dir, config)
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    async fn run_task(config: &PipelineConfig, name: &str) -> TaskReport {
        run(Arc::new(TaskGraph::build(config, name).unwrap())).await
    }

    const SCENARIO: &str = r#"
        [groups.css]
        kind = "css"
        src = ["app/sass/*.scss"]
        dest = "dist/css"
        concat = "app.css"
        compiler = ["cat"]

        [[groups.css.bundles]]
        name = "ios.css"
        src = ["app/sass/a.scss", "app/sass/b.scss", "app/sass/c.scss", "app/sass/d.scss"]

        [groups.views]
        kind = "html"
        src = ["app/views/**/*.html"]
        dest = "dist/views"
        flatten = true
    "#;

    fn scenario_sources(root: &Path) {
        for name in ["a", "b", "c", "d"] {
            write(root, &format!("app/sass/{name}.scss"), &format!(".{name} {{\n  color: red;\n}}\n"));
        }
        write(
            root,
            "app/views/pages/index.html",
            "<html>\n  <head>\n    <link rel=\"stylesheet\" href=\"/css/app.css\">\n  </head>\n</html>\n",
        );
    }

    #[tokio::test]
    async fn test_build_prod_scenario() {
        let (dir, config) = project(SCENARIO);
        let root = config.get_root().to_path_buf();
        scenario_sources(&root);

        let report = run_task(&config, "build-prod").await;
        assert!(report.is_done(), "errors: {:?}", report.errors);
        assert_eq!(
            report.transitions,
            vec![
                TaskState::Idle,
                TaskState::Cleaning,
                TaskState::Processing,
                TaskState::Finalizing,
                TaskState::Done,
            ]
        );

        let css = listing(&root.join("dist/css"));
        assert_eq!(css.len(), 6, "{css:?}");
        for expected in ["app.css", "app.min.css", "ios.css", "ios.min.css"] {
            assert!(css.contains(&expected.to_string()), "missing {expected}");
        }
        let hashed: Vec<_> = css.iter().filter(|n| n.matches('-').count() == 1).collect();
        assert_eq!(hashed.len(), 2);
        assert!(hashed.iter().any(|n| n.starts_with("app-") && n.ends_with(".min.css")));
        assert!(hashed.iter().any(|n| n.starts_with("ios-") && n.ends_with(".min.css")));

        let manifest: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(root.join("dist/rev-manifest.json")).unwrap()).unwrap();
        assert_eq!(manifest.len(), 2);
        assert!(manifest["css/app.css"].starts_with("css/app-"));

        // Finalize ran after the join and saw the manifest
        let index = fs::read_to_string(root.join("dist/views/index.html")).unwrap();
        assert!(index.contains(&manifest["css/app.css"]), "{index}");
        drop(dir);
    }

    #[tokio::test]
    async fn test_build_dev_lite_writes_no_optimized_outputs() {
        let (_dir, config) = project(SCENARIO);
        let root = config.get_root().to_path_buf();
        scenario_sources(&root);

        let report = run_task(&config, "build-dev-lite").await;
        assert!(report.is_done());
        assert_eq!(listing(&root.join("dist/css")), vec!["app.css", "ios.css"]);
        assert!(!root.join("dist/rev-manifest.json").exists());
    }

    #[tokio::test]
    async fn test_cleaning_precedes_processing() {
        let (_dir, config) = project(SCENARIO);
        let root = config.get_root().to_path_buf();
        scenario_sources(&root);
        write(&root, "dist/css/stale.css", "old");
        write(&root, "dist/old/leftover.js", "old");

        let report = run_task(&config, "build-dev-lite").await;
        assert!(report.is_done());
        assert!(!root.join("dist/css/stale.css").exists());
        assert!(!root.join("dist/old").exists());
        assert!(root.join("dist/css/app.css").is_file());
    }

    #[tokio::test]
    async fn test_task_without_finalize_goes_straight_to_done() {
        let (_dir, config) = project(
            r#"
            [groups.css]
            kind = "css"
            src = ["app/css/*.css"]
            dest = "dist/css"
        "#,
        );
        let root = config.get_root().to_path_buf();
        write(&root, "app/css/site.css", "a{}");

        let report = run_task(&config, "build-dev-lite").await;
        assert_eq!(
            report.transitions,
            vec![TaskState::Idle, TaskState::Cleaning, TaskState::Processing, TaskState::Done]
        );
    }

    #[tokio::test]
    async fn test_compile_errors_degrade_but_task_is_done() {
        let (_dir, config) = project(
            r#"
            [groups.css]
            kind = "css"
            src = ["app/sass/*.scss"]
            dest = "dist/css"
            compiler = ["sh", "-c", "exit 1"]

            [groups.js]
            kind = "js"
            src = ["app/js/*.js"]
            dest = "dist/js"
        "#,
        );
        let root = config.get_root().to_path_buf();
        write(&root, "app/sass/site.scss", "a{");
        write(&root, "app/js/app.js", "let a;");

        let report = run_task(&config, "build-dev-lite").await;
        assert!(report.is_done());
        assert_eq!(report.warning_count(), 1);
        assert!(root.join("dist/js/app.js").is_file());
    }

    #[tokio::test]
    async fn test_filesystem_error_fails_task_after_siblings_finish() {
        let (_dir, config) = project(
            r#"
            [groups.broken]
            kind = "copy"
            src = ["app/files/*"]
            dest = "blocker/out"
            clean = false

            [groups.js]
            kind = "js"
            src = ["app/js/*.js"]
            dest = "dist/js"
        "#,
        );
        let root = config.get_root().to_path_buf();
        write(&root, "app/files/a.txt", "a");
        write(&root, "app/js/app.js", "let a;");
        // A file where the destination directory should be
        write(&root, "blocker", "not a directory");

        let report = run_task(&config, "build-dev-lite").await;
        assert_eq!(report.state(), TaskState::Failed);
        assert!(!report.transitions.contains(&TaskState::Done));
        assert!(report.errors.iter().any(|e| e.starts_with("broken:")));
        assert!(root.join("dist/js/app.js").is_file());
    }

    #[tokio::test]
    async fn test_reduced_task_cleans_only_its_group() {
        let (_dir, config) = project(SCENARIO);
        let root = config.get_root().to_path_buf();
        scenario_sources(&root);
        write(&root, "dist/js/app.js", "kept");
        write(&root, "dist/css/stale.css", "old");

        let graph = TaskGraph::for_group(&config, "watch", "css").unwrap();
        assert_eq!(graph.clean, vec![root.join("dist/css")]);
        assert!(graph.finalize.is_empty());

        let report = run(Arc::new(graph)).await;
        assert!(report.is_done());
        assert!(root.join("dist/js/app.js").is_file());
        assert!(!root.join("dist/css/stale.css").exists());
        assert_eq!(listing(&root.join("dist/css")), vec!["app.css", "ios.css"]);
    }

    #[test]
    fn test_unknown_task_is_config_error() {
        let (_dir, config) = project(SCENARIO);
        assert!(matches!(
            TaskGraph::build(&config, "deploy"),
            Err(ConfigError::UnknownTask { .. })
        ));
        assert!(matches!(
            TaskGraph::for_group(&config, "watch", "fonts"),
            Err(ConfigError::UnknownGroup { .. })
        ));
    }

    #[test]
    fn test_dev_and_prod_share_one_graph() {
        let (_dir, config) = project(SCENARIO);
        let dev = TaskGraph::build(&config, "build-dev").unwrap();
        let prod = TaskGraph::build(&config, "build-prod").unwrap();

        let steps = |g: &TaskGraph| g.process.iter().map(|i| i.steps.clone()).collect::<Vec<_>>();
        assert_eq!(steps(&dev), steps(&prod));
        assert_eq!(dev.clean, prod.clean);
        assert_eq!(dev.env.vars["NODE_ENV"], "development");
        assert_eq!(prod.env.vars["NODE_ENV"], "production");
        assert_eq!(prod.stage_count(), 3);
    }

    #[test]
    fn test_subset_task_cleans_group_dests() {
        let (_dir, config) = project(&format!("{SCENARIO}\n[tasks.styles]\ngroups = [\"css\"]\n"));
        let graph = TaskGraph::build(&config, "styles").unwrap();
        assert_eq!(graph.clean, vec![config.build.output.join("css")]);
        assert!(graph.finalize.is_empty());
    }

    #[test]
    fn test_dedup_nested() {
        let dirs = [PathBuf::from("/a/b"), PathBuf::from("/a"), PathBuf::from("/c"), PathBuf::from("/a/d")];
        assert_eq!(
            dedup_nested(dirs.into_iter()),
            vec![PathBuf::from("/a"), PathBuf::from("/c")]
        );
    }
}
