//! tspprune CLI - builds and inspects cached edge datasets for TSP pruning
//!
//! This CLI provides a `tspprune` command that turns a corpus of TSPLIB
//! instances into per-edge feature, label and sample-weight arrays.

mod commands;
mod confirm;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};
use tspprune_dataset::{lifecycle, DataLayout, PipelineError};

use commands::{assemble, build, clear, generate, worker};

/// Exit status when the operator declines a destructive clear.
pub const EXIT_USER_ABORTED: i32 = 2;

/// tspprune - cached edge datasets for TSP pruning models
#[derive(Parser, Debug)]
#[command(
    name = "tspprune",
    author,
    version,
    about = "Cached edge-dataset pipeline for TSP pruning"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Root of the data tree (problems/, solutions/, npy/, models/, logs/)
    #[arg(short = 'd', long, default_value = "data", global = true)]
    data_root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute every missing feature, label and weight array of the corpus
    ///
    /// Walks problems/<class>/*.tsp in sorted order and runs one isolated
    /// job per instance. Cached arrays are skipped.
    Build(build::BuildArgs),

    /// Build a single instance (used internally by `build`)
    #[command(hide = true)]
    Worker {
        /// JSON-encoded worker request
        request: String,
    },

    /// Write seeded random EUC_2D instances to problems/generated
    Generate(generate::GenerateArgs),

    /// Load cached arrays for a selection of instances and pool them
    Assemble(assemble::AssembleArgs),

    /// Clear output directories after confirmation
    Clear(clear::ClearArgs),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        if let Some(PipelineError::UserAborted { paths }) = e.downcast_ref::<PipelineError>() {
            eprintln!("{} declined clearing:", "Aborted:".red().bold());
            for path in paths {
                eprintln!("  {}", path.display());
            }
            eprintln!("Nothing was changed.");
            std::process::exit(EXIT_USER_ABORTED);
        }
        eprintln!("{} {e:#}", "Error:".red().bold());
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let layout = DataLayout::new(&args.data_root);

    match args.command {
        Command::Worker { request } => {
            init_tracing(&args.log_level, None, false)?;
            worker::execute(&request)
        }
        Command::Build(build_args) => {
            // nothing is written until a requested clear has been confirmed
            let console = subscriber(&args.log_level, None, true);
            let prepare = || build::prepare(build_args, &layout);
            let plan = tracing::dispatcher::with_default(&console, prepare)?;

            lifecycle::ensure(&layout.logs_dir())?;
            let log_path = layout.run_log_path(chrono::Local::now());
            init_tracing(&args.log_level, Some(File::create(&log_path)?), true)?;
            build::execute(plan, &layout, &args.log_level, &log_path).await
        }
        Command::Generate(generate_args) => {
            init_tracing(&args.log_level, None, true)?;
            generate::execute(&generate_args, &layout)
        }
        Command::Assemble(assemble_args) => {
            init_tracing(&args.log_level, None, true)?;
            assemble::execute(assemble_args, &layout)
        }
        Command::Clear(clear_args) => {
            init_tracing(&args.log_level, None, true)?;
            clear::execute(&clear_args, &layout)
        }
    }
}

/// Log to stderr and, for runs that keep a log, to `run_log` as well.
fn subscriber(level: &str, run_log: Option<File>, with_time: bool) -> Dispatch {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let stderr_layer = if with_time {
        stderr_layer.boxed()
    } else {
        stderr_layer.without_time().with_ansi(false).boxed()
    };
    let file_layer = run_log.map(|file| {
        fmt::layer().with_writer(Mutex::new(file)).with_ansi(false).with_target(false)
    });

    Dispatch::new(tracing_subscriber::registry().with(filter).with(stderr_layer).with(file_layer))
}

fn init_tracing(level: &str, run_log: Option<File>, with_time: bool) -> anyhow::Result<()> {
    subscriber(level, run_log, with_time).try_init()?;
    Ok(())
}
