use crate::artifacts::RESERVED_DIR_NAMES;
use crate::error::{PipelineError, PipelineResult};
use crate::features::FeatureParams;
use crate::solver::MAX_EXACT_NODES;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Pipeline configuration, read from a JSON document.
///
/// Only `feature_dirs` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Feature names to compute, in column order.
    pub feature_dirs: Vec<String>,
    #[serde(default)]
    pub feature_params: FeatureParams,
    /// Instance jobs in flight at once. Defaults to the number of cores.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Wall-clock limit for one instance job.
    #[serde(default)]
    pub instance_timeout_secs: Option<u64>,
    /// Largest instance the exact solver accepts.
    #[serde(default = "default_max_exact_nodes")]
    pub max_exact_nodes: usize,
}

fn default_max_exact_nodes() -> usize {
    16
}

impl PipelineConfig {
    #[must_use]
    pub fn new(feature_dirs: Vec<String>) -> Self {
        Self {
            feature_dirs,
            feature_params: FeatureParams::default(),
            workers: None,
            instance_timeout_secs: None,
            max_exact_nodes: default_max_exact_nodes(),
        }
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.feature_dirs.is_empty() {
            return Err(PipelineError::InvalidConfig("feature_dirs must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for name in &self.feature_dirs {
            validate_feature_name(name)?;
            if !seen.insert(name.as_str()) {
                return Err(PipelineError::InvalidConfig(format!("duplicate feature {name:?}")));
            }
        }
        if self.workers == Some(0) {
            return Err(PipelineError::InvalidConfig("workers must be >= 1".to_string()));
        }
        if self.instance_timeout_secs == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "instance_timeout_secs must be >= 1".to_string(),
            ));
        }
        if !(2..=MAX_EXACT_NODES).contains(&self.max_exact_nodes) {
            return Err(PipelineError::InvalidConfig(format!(
                "max_exact_nodes must be within 2..={MAX_EXACT_NODES}"
            )));
        }
        self.feature_params.validate()?;
        Ok(())
    }

    #[must_use]
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        })
    }

    #[must_use]
    pub fn instance_timeout(&self) -> Option<Duration> {
        self.instance_timeout_secs.map(Duration::from_secs)
    }
}

/// A feature name doubles as a cache directory name, so it must be a single
/// plain path component distinct from the label and weight directories.
pub fn validate_feature_name(name: &str) -> PipelineResult<()> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !plain {
        return Err(PipelineError::InvalidConfig(format!(
            "feature name {name:?} is not a plain directory name"
        )));
    }
    if RESERVED_DIR_NAMES.contains(&name) {
        return Err(PipelineError::InvalidConfig(format!("feature name {name:?} is reserved")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::MstWeighting;
    use tempfile::TempDir;

    #[test]
    fn test_minimal_document() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"feature_dirs": ["weight", "mst"]}"#).unwrap();
        assert_eq!(config.feature_dirs, vec!["weight", "mst"]);
        assert_eq!(config.max_exact_nodes, 16);
        assert_eq!(config.workers, None);
        assert_eq!(config.feature_params.mst_weighting, MstWeighting::Reciprocal);
        config.validate().unwrap();
    }

    #[test]
    fn test_full_document() {
        let json = r#"{
            "feature_dirs": ["iterated_mst"],
            "feature_params": {"mst_rounds": 3, "mst_weighting": "linear"},
            "workers": 2,
            "instance_timeout_secs": 30,
            "max_exact_nodes": 12
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.feature_params.mst_rounds, 3);
        assert_eq!(config.effective_workers(), 2);
        assert_eq!(config.instance_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_load_reports_missing_feature_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"workers": 2}"#).unwrap();

        let err = PipelineConfig::load(&path).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(msg) if msg.contains("feature_dirs")));
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        for bad in [vec![], vec!["solutions"], vec!["a/b"], vec![".."], vec!["x", "x"]] {
            let config = PipelineConfig::new(bad.iter().map(ToString::to_string).collect());
            assert!(config.validate().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = PipelineConfig::new(vec!["weight".to_string()]);
        config.workers = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_max_exact_nodes() {
        let mut config = PipelineConfig::new(vec!["weight".to_string()]);
        config.max_exact_nodes = 200;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(msg)) if msg.contains("max_exact_nodes")
        ));
        config.max_exact_nodes = MAX_EXACT_NODES;
        config.validate().unwrap();
        config.max_exact_nodes = 1;
        assert!(config.validate().is_err());
    }
}
