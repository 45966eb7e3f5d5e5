//! Interactive confirmation for destructive clears.

use colored::Colorize;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::warn;
use tspprune_dataset::{AssumeYes, Confirm, PipelineResult};

/// Asks on the terminal. Without a terminal, or if the prompt fails, the
/// answer is "no".
#[derive(Debug, Default, Clone, Copy)]
pub struct InquireConfirm;

impl Confirm for InquireConfirm {
    fn confirm(&self, paths: &[PathBuf]) -> PipelineResult<bool> {
        if !std::io::stdin().is_terminal() {
            warn!("no terminal to confirm clearing; pass --force to clear without asking");
            return Ok(false);
        }

        println!("{}", "The following directories are not empty:".bold().yellow());
        for path in paths {
            println!("  {}", path.display().to_string().cyan());
        }
        let answer = inquire::Confirm::new("Delete their contents?").with_default(false).prompt();
        match answer {
            Ok(yes) => Ok(yes),
            Err(e) => {
                warn!("confirmation prompt failed: {e}");
                Ok(false)
            }
        }
    }
}

/// `--force` skips the prompt.
pub fn policy(force: bool) -> Box<dyn Confirm> {
    if force { Box::new(AssumeYes) } else { Box::new(InquireConfirm) }
}
