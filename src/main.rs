//! assetline - a declarative multi-stage asset pipeline.

mod cli;
mod config;
mod init;
mod logger;
mod pipeline;
mod tools;
mod utils;
mod watch;

use anyhow::{Result, bail};
use clap::Parser;
use cli::{Cli, Commands};
use config::PipelineConfig;
use pipeline::TaskGraph;
use std::{path::Path, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(load_config(&cli)?);

    match &cli.command {
        Commands::Init => init::new_project(&config),
        Commands::Tasks => {
            list_tasks(&config);
            Ok(())
        }
        Commands::Run { task, .. } => run_task(config, task).await,
    }
}

/// Load and validate configuration from CLI arguments
fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() && !cli.is_init() {
        PipelineConfig::from_path(&config_path)?
    } else {
        PipelineConfig::default()
    };
    config.update_with_cli(cli);

    let config_exists = config.config_path.exists();
    match (cli.is_init(), config_exists) {
        (true, true) => {
            bail!("Config file already exists. Remove it manually or init in a different path.")
        }
        (false, false) => bail!("Config file not found."),
        _ => {}
    }

    if !cli.is_init() {
        config.validate()?;
    }

    Ok(config)
}

/// Resolve a task by name and run it; watch tasks never return on success.
async fn run_task(config: Arc<PipelineConfig>, name: &str) -> Result<()> {
    let task = config.task(name)?;
    if task.watch {
        return watch::watch(config, name).await;
    }

    let graph = TaskGraph::build(&config, name)?;
    let report = pipeline::task::run(Arc::new(graph)).await;
    if !report.is_done() {
        bail!("Task `{name}` failed: {}", report.errors.join("; "));
    }
    Ok(())
}

fn list_tasks(config: &PipelineConfig) {
    for (name, task) in &config.tasks {
        let groups = if task.groups.is_empty() {
            "all groups".to_owned()
        } else {
            task.groups.join(", ")
        };
        let mode = match (task.watch, task.optimize) {
            (true, _) => "watch",
            (false, true) => "optimize",
            (false, false) => "plain",
        };
        log!("tasks"; "{name}: {mode}, {groups}");
    }
}
