//! Worker command: one isolated instance build.
//!
//! stdout carries only the JSON report; logs go to stderr, where the parent
//! picks them up.

use anyhow::{Context, Result};
use tspprune_dataset::WorkerRequest;

pub fn execute(request: &str) -> Result<()> {
    let request: WorkerRequest =
        serde_json::from_str(request).context("Failed to parse worker request")?;
    let report = request.run()?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
