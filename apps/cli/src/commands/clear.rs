//! Clear command implementation.

use crate::confirm;
use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use tspprune_dataset::{confirm_and_clear, DataLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Target {
    Npy,
    Solutions,
    Models,
    Logs,
    Problems,
}

impl Target {
    fn path(self, layout: &DataLayout) -> PathBuf {
        match self {
            Self::Npy => layout.npy_dir(),
            Self::Solutions => layout.solutions_dir(),
            Self::Models => layout.models_dir(),
            Self::Logs => layout.logs_dir(),
            Self::Problems => layout.problems_dir(),
        }
    }
}

#[derive(Args, Debug)]
pub struct ClearArgs {
    /// Directories to clear (default: npy, models, logs)
    #[arg(value_enum)]
    pub targets: Vec<Target>,

    /// Do not ask for confirmation
    #[arg(long)]
    pub force: bool,
}

pub fn execute(args: &ClearArgs, layout: &DataLayout) -> Result<()> {
    let mut targets = if args.targets.is_empty() {
        vec![Target::Npy, Target::Models, Target::Logs]
    } else {
        args.targets.clone()
    };
    targets.sort();
    targets.dedup();
    let paths: Vec<PathBuf> = targets.iter().map(|t| t.path(layout)).collect();

    let removed = confirm_and_clear(&paths, confirm::policy(args.force).as_ref())?;
    if removed > 0 {
        println!("{}", format!("✓ Removed {removed} entries").green().bold());
    } else {
        println!("{}", "✓ Already clean".green().bold());
    }
    Ok(())
}
