//! Generate command implementation.

use crate::confirm;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tspprune_dataset::{confirm_and_clear, generate_instances, DataLayout, GenerateOptions};

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Number of instances
    #[arg(long, default_value_t = 1000)]
    pub count: usize,

    /// Nodes per instance
    #[arg(long, default_value_t = 10)]
    pub nodes: usize,

    /// Coordinates are drawn from [0, max-coordinate)
    #[arg(long, default_value_t = 100.0)]
    pub max_coordinate: f64,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Decimal places per coordinate
    #[arg(long, default_value_t = 2)]
    pub precision: usize,

    /// Do not ask before replacing existing generated instances
    #[arg(long)]
    pub force: bool,
}

pub fn execute(args: &GenerateArgs, layout: &DataLayout) -> Result<()> {
    let opts = GenerateOptions {
        count: args.count,
        nodes: args.nodes,
        max_coordinate: args.max_coordinate,
        seed: args.seed,
        precision: args.precision,
    };
    opts.validate()?;

    let dir = layout.generated_problems_dir();
    confirm_and_clear(std::slice::from_ref(&dir), confirm::policy(args.force).as_ref())?;
    let written = generate_instances(&dir, &opts)?;

    let message = format!(
        "✓ Generated {} instances with {} nodes in {}",
        written.len(),
        opts.nodes,
        dir.display()
    );
    println!("{}", message.green().bold());
    Ok(())
}
