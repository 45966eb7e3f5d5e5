//! Build command implementation.

use crate::confirm;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tspprune_dataset::{
    confirm_and_clear, ensure_tree, ArtifactBuilder, ArtifactCache, DataLayout, InProcessExecutor,
    InstanceExecutor, InstanceJobOrchestrator, PipelineConfig, ProcessExecutor, RunSummary,
    TracingProgressSink,
};

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// JSON pipeline configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Feature names, comma separated (replaces the configured list)
    #[arg(short, long, value_delimiter = ',')]
    pub features: Vec<String>,

    /// Reference tours directory (defaults to <data-root>/solutions)
    #[arg(long)]
    pub solutions_dir: Option<PathBuf>,

    /// Instance jobs in flight at once
    #[arg(long)]
    pub workers: Option<usize>,

    /// Wall-clock limit per instance, in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Run instance jobs on threads instead of child processes
    #[arg(long)]
    pub in_process: bool,

    /// Clear the npy cache before building
    #[arg(long)]
    pub clear: bool,

    /// Do not ask before clearing
    #[arg(long)]
    pub force: bool,
}

/// Everything settled before the run touches the data tree.
#[derive(Debug)]
pub struct BuildPlan {
    config: PipelineConfig,
    builder: ArtifactBuilder,
    solutions_dir: Option<PathBuf>,
    in_process: bool,
}

/// Resolve the configuration and feature names, then run the optional
/// confirm-and-clear. A declined clear stops here, before the run log or
/// any directory is created.
pub fn prepare(args: BuildArgs, layout: &DataLayout) -> Result<BuildPlan> {
    let mut config = super::resolve_config(args.config.as_deref(), &args.features)?;
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    if args.timeout_secs.is_some() {
        config.instance_timeout_secs = args.timeout_secs;
    }
    let builder = ArtifactBuilder::from_config(&config, ArtifactCache::new(layout.npy_dir()))?;

    if args.clear {
        let policy = confirm::policy(args.force);
        confirm_and_clear(&[layout.npy_dir()], policy.as_ref())?;
    }

    Ok(BuildPlan {
        config,
        builder,
        solutions_dir: args.solutions_dir,
        in_process: args.in_process,
    })
}

pub async fn execute(
    plan: BuildPlan,
    layout: &DataLayout,
    log_level: &str,
    log_path: &Path,
) -> Result<()> {
    let BuildPlan { config, builder, solutions_dir, in_process } = plan;
    info!(root = %layout.root().display(), features = ?config.feature_dirs, "pipeline started");
    ensure_tree(&layout.top_level_dirs())?;

    let executor: Arc<dyn InstanceExecutor> = if in_process {
        Arc::new(InProcessExecutor::new(Arc::new(builder)).with_timeout(config.instance_timeout()))
    } else {
        let program =
            std::env::current_exe().context("Failed to locate the tspprune executable")?;
        Arc::new(
            ProcessExecutor::new(program, config.clone(), layout.npy_dir())
                .with_args(["--log-level", log_level, "worker"])
                .with_timeout(config.instance_timeout()),
        )
    };

    let progress = Arc::new(TracingProgressSink);
    let mut orchestrator = InstanceJobOrchestrator::new(layout.clone(), config, executor, progress);
    if let Some(dir) = solutions_dir {
        orchestrator = orchestrator.with_solutions_dir(dir);
    }

    let summary = orchestrator.run().await?;
    info!("done");
    print_summary(&summary, log_path);
    Ok(())
}

fn print_summary(summary: &RunSummary, log_path: &Path) {
    println!();
    if summary.is_clean() {
        println!("{}", "Build complete".bold().cyan());
    } else {
        println!("{}", "Build complete with failures".bold().yellow());
    }
    println!("  Classes:    {}", summary.classes);
    println!(
        "  Instances:  {} ({} ok, {} failed)",
        summary.instances,
        summary.succeeded,
        summary.failures.len()
    );
    println!("  Computed:   {}", summary.artifacts_computed.to_string().green());
    println!("  Skipped:    {}", summary.artifacts_skipped.to_string().dimmed());
    if summary.exact_solves > 0 {
        println!("  Exact solves: {}", summary.exact_solves.to_string().yellow());
    }
    for failure in &summary.failures {
        println!("  {} {}/{}: {}", "✗".red(), failure.class, failure.stem, failure.reason);
    }
    println!("  Log:        {}", log_path.display().to_string().dimmed());
    println!();
}
