//! Assemble command implementation.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;
use tspprune_dataset::{ArtifactCache, DataLayout, DatasetAssembler, Selection, TrainingMatrix};

#[derive(Args, Debug)]
pub struct AssembleArgs {
    /// CLASS or CLASS:stem,stem (repeatable, kept in order)
    #[arg(short, long = "select", required = true)]
    pub selections: Vec<String>,

    /// JSON pipeline configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Feature names, comma separated, in column order
    #[arg(short, long, value_delimiter = ',')]
    pub features: Vec<String>,

    /// Write pooled features.npy, labels.npy and weights.npy here
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: AssembleArgs, layout: &DataLayout) -> Result<()> {
    let config = super::resolve_config(args.config.as_deref(), &args.features)?;
    let selection = parse_selection(&args.selections)?;

    let cache = ArtifactCache::new(layout.npy_dir());
    let assembler = DatasetAssembler::new(cache, config.feature_dirs, selection);
    let instances = assembler.load_instances()?;

    if args.json {
        let out: Vec<_> = instances
            .iter()
            .map(|i| {
                json!({
                    "class": i.class,
                    "stem": i.stem,
                    "rows": i.features.nrows(),
                    "columns": i.features.ncols(),
                    "positives": i.labels.iter().filter(|&&l| l > 0.0).count(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!("{}", format!("Instances ({})", instances.len()).bold().cyan());
        println!("{:<16} {:<24} {:>8} {:>8}", "Class", "Stem", "Rows", "Tour");
        println!("{}", "─".repeat(60));
        for i in &instances {
            let positives = i.labels.iter().filter(|&&l| l > 0.0).count();
            println!("{:<16} {:<24} {:>8} {:>8}", i.class, i.stem, i.features.nrows(), positives);
        }
        println!();
    }

    if let Some(dir) = args.export {
        let pooled = TrainingMatrix::pool(&instances)?;
        pooled.write_npy(&dir)?;
        if !args.json {
            println!(
                "{} pooled {} x {} into {}",
                "✓".green(),
                pooled.features.nrows(),
                pooled.features.ncols(),
                dir.display()
            );
        }
    }
    Ok(())
}

fn parse_selection(specs: &[String]) -> Result<Selection> {
    let mut selection = Selection::new();
    for spec in specs {
        let (class, stems) = match spec.split_once(':') {
            Some((class, stems)) => {
                let stems: Vec<_> =
                    stems.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
                (class, stems)
            }
            None => (spec.as_str(), Vec::new()),
        };
        if class.is_empty() {
            bail!("invalid selection {spec:?}: missing class name");
        }
        selection = selection.class(class, stems);
    }
    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection() {
        let specs = vec!["hard:b,a".to_string(), "easy".to_string()];
        let selection = parse_selection(&specs).unwrap();
        let entries: Vec<_> =
            selection.entries().map(|(c, s)| (c.to_string(), s.to_vec())).collect();
        assert_eq!(
            entries,
            vec![
                ("hard".to_string(), vec!["b".to_string(), "a".to_string()]),
                ("easy".to_string(), vec![]),
            ]
        );
    }

    #[test]
    fn test_parse_selection_rejects_missing_class() {
        assert!(parse_selection(&[":a".to_string()]).is_err());
    }
}
