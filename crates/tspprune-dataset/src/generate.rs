//! Seeded random `EUC_2D` instances for the `generated` class.

use crate::error::{PipelineError, PipelineResult};
use crate::layout::PROBLEM_EXTENSION;
use crate::tsplib;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub count: usize,
    pub nodes: usize,
    /// Coordinates are drawn from `[0, max_coordinate)`.
    pub max_coordinate: f64,
    pub seed: u64,
    /// Decimal places written per coordinate.
    pub precision: usize,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self { count: 1000, nodes: 10, max_coordinate: 100.0, seed: 0, precision: 2 }
    }
}

impl GenerateOptions {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.nodes < 3 {
            return Err(PipelineError::InvalidConfig("instances need at least 3 nodes".to_string()));
        }
        if !(self.max_coordinate.is_finite() && self.max_coordinate > 0.0) {
            return Err(PipelineError::InvalidConfig("max_coordinate must be positive".to_string()));
        }
        Ok(())
    }
}

/// Instance name for the `index`-th (1-based) generated problem.
#[must_use]
pub fn instance_name(index: usize, nodes: usize) -> String {
    format!("random{index}_{nodes}")
}

/// Write `opts.count` instances into `dir`, returning their paths in order.
///
/// The same options always produce byte-identical files.
pub fn generate_instances(dir: &Path, opts: &GenerateOptions) -> PipelineResult<Vec<PathBuf>> {
    opts.validate()?;
    std::fs::create_dir_all(dir)?;

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut written = Vec::with_capacity(opts.count);
    for i in 1..=opts.count {
        let coords: Vec<(f64, f64)> = (0..opts.nodes)
            .map(|_| {
                let x = rng.gen_range(0.0..opts.max_coordinate);
                (x, rng.gen_range(0.0..opts.max_coordinate))
            })
            .collect();
        let name = instance_name(i, opts.nodes);
        let path = dir.join(format!("{name}.{PROBLEM_EXTENSION}"));
        tsplib::write_problem(&path, &name, &coords, opts.precision)?;
        written.push(path);
    }
    info!(dir = %dir.display(), count = written.len(), nodes = opts.nodes, "generated instances");
    Ok(written)
}
