//! Reassembling training matrices from the artifact cache.

use crate::artifacts::{read_array, ArtifactCache, ArtifactKind, CacheKey};
use crate::error::{PipelineError, PipelineResult};
use ndarray::{concatenate, stack, Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_npy::WriteNpyExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Which instances to load, class by class, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    entries: Vec<(String, Vec<String>)>,
}

impl Selection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `stems` of `class`; no stems means every stem with a cached
    /// label.
    #[must_use]
    pub fn class<I, S>(mut self, class: impl Into<String>, stems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.push((class.into(), stems.into_iter().map(Into::into).collect()));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(class, stems)| (class.as_str(), stems.as_slice()))
    }
}

/// On-disk locations of one selected instance's arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePaths {
    pub class: String,
    pub stem: String,
    /// One per feature, in column order.
    pub features: Vec<PathBuf>,
    pub label: PathBuf,
    pub weight: PathBuf,
}

/// Aligned arrays of one instance: row `i` of every member is edge `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceData {
    pub class: String,
    pub stem: String,
    /// `E x F`
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
    pub weights: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct DatasetAssembler {
    cache: ArtifactCache,
    feature_names: Vec<String>,
    selection: Selection,
}

impl DatasetAssembler {
    #[must_use]
    pub fn new(cache: ArtifactCache, feature_names: Vec<String>, selection: Selection) -> Self {
        Self { cache, feature_names, selection }
    }

    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Paths of every selected instance, in selection order.
    ///
    /// Fails with [`PipelineError::ArtifactMissing`] on the first expected
    /// array that is not on disk.
    pub fn resolve_paths(&self) -> PipelineResult<Vec<InstancePaths>> {
        let mut resolved = Vec::new();
        for (class, stems) in self.selection.entries() {
            let stems = if stems.is_empty() {
                self.cache.cached_stems(class, &ArtifactKind::Label)?
            } else {
                stems.to_vec()
            };
            for stem in stems {
                resolved.push(self.paths_for(class, &stem)?);
            }
        }
        Ok(resolved)
    }

    fn paths_for(&self, class: &str, stem: &str) -> PipelineResult<InstancePaths> {
        let existing = |kind: ArtifactKind| {
            let path = self.cache.path_for(&CacheKey::new(class, kind, stem));
            if path.is_file() { Ok(path) } else { Err(PipelineError::ArtifactMissing { path }) }
        };

        let features = self
            .feature_names
            .iter()
            .map(|name| existing(ArtifactKind::Feature(name.clone())))
            .collect::<PipelineResult<Vec<_>>>()?;

        Ok(InstancePaths {
            class: class.to_string(),
            stem: stem.to_string(),
            features,
            label: existing(ArtifactKind::Label)?,
            weight: existing(ArtifactKind::Weight)?,
        })
    }

    /// One `E x F` matrix per instance, columns in feature-name order.
    pub fn load_features(&self) -> PipelineResult<Vec<Array2<f64>>> {
        self.resolve_paths()?.iter().map(feature_matrix).collect()
    }

    pub fn load_labels(&self) -> PipelineResult<Vec<Array1<f64>>> {
        self.resolve_paths()?.iter().map(|p| read_array(&p.label)).collect()
    }

    pub fn load_weights(&self) -> PipelineResult<Vec<Array1<f64>>> {
        self.resolve_paths()?.iter().map(|p| read_array(&p.weight)).collect()
    }

    /// Features, labels and weights of every instance, checked for equal
    /// row counts.
    pub fn load_instances(&self) -> PipelineResult<Vec<InstanceData>> {
        self.resolve_paths()?
            .into_iter()
            .map(|paths| {
                let features = feature_matrix(&paths)?;
                let labels = read_array(&paths.label)?;
                let weights = read_array(&paths.weight)?;
                if labels.len() != features.nrows() || weights.len() != features.nrows() {
                    return Err(PipelineError::AlignmentViolation {
                        stem: paths.stem,
                        detail: format!(
                            "features have {} rows, labels {}, weights {}",
                            features.nrows(),
                            labels.len(),
                            weights.len()
                        ),
                    });
                }
                Ok(InstanceData { class: paths.class, stem: paths.stem, features, labels, weights })
            })
            .collect()
    }
}

fn feature_matrix(paths: &InstancePaths) -> PipelineResult<Array2<f64>> {
    let columns = paths.features.iter().map(|p| read_array(p)).collect::<PipelineResult<Vec<_>>>()?;
    if columns.is_empty() {
        return Err(PipelineError::InvalidConfig("no feature names configured".to_string()));
    }
    let views: Vec<ArrayView1<'_, f64>> = columns.iter().map(|c| c.view()).collect();
    stack(Axis(1), &views).map_err(|e| PipelineError::AlignmentViolation {
        stem: paths.stem.clone(),
        detail: format!("feature columns differ in length: {e}"),
    })
}

/// Rows of many instances pooled in order, ready for an external trainer.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingMatrix {
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
    pub weights: Array1<f64>,
}

impl TrainingMatrix {
    pub const FEATURES_FILE: &'static str = "features.npy";
    pub const LABELS_FILE: &'static str = "labels.npy";
    pub const WEIGHTS_FILE: &'static str = "weights.npy";

    /// Concatenate instances in order. No shuffling.
    pub fn pool(instances: &[InstanceData]) -> PipelineResult<Self> {
        let Some(first) = instances.first() else {
            return Err(PipelineError::Corpus("nothing selected to pool".to_string()));
        };
        let width = first.features.ncols();
        if let Some(odd) = instances.iter().find(|i| i.features.ncols() != width) {
            return Err(PipelineError::AlignmentViolation {
                stem: odd.stem.clone(),
                detail: format!("{} feature columns, expected {width}", odd.features.ncols()),
            });
        }

        let features: Vec<ArrayView2<'_, f64>> =
            instances.iter().map(|i| i.features.view()).collect();
        let labels: Vec<ArrayView1<'_, f64>> = instances.iter().map(|i| i.labels.view()).collect();
        let weights: Vec<ArrayView1<'_, f64>> =
            instances.iter().map(|i| i.weights.view()).collect();
        let pooled = |e: ndarray::ShapeError| {
            PipelineError::Corpus(format!("cannot pool instances: {e}"))
        };

        Ok(Self {
            features: concatenate(Axis(0), &features).map_err(pooled)?,
            labels: concatenate(Axis(0), &labels).map_err(pooled)?,
            weights: concatenate(Axis(0), &weights).map_err(pooled)?,
        })
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.labels.len()
    }

    /// Write `features.npy`, `labels.npy` and `weights.npy` into `dir`.
    pub fn write_npy(&self, dir: &Path) -> PipelineResult<()> {
        std::fs::create_dir_all(dir)?;
        export(&self.features, &dir.join(Self::FEATURES_FILE))?;
        export(&self.labels, &dir.join(Self::LABELS_FILE))?;
        export(&self.weights, &dir.join(Self::WEIGHTS_FILE))
    }
}

fn export<T: WriteNpyExt>(array: &T, path: &Path) -> PipelineResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    array.write_npy(&mut writer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use ndarray_npy::ReadNpyExt;
    use tempfile::TempDir;

    fn seed(cache: &ArtifactCache, class: &str, stem: &str, edges: usize, offset: f64) {
        let col = |k: f64| Array1::from_iter((0..edges).map(|i| offset + k * i as f64));
        let key = |kind: ArtifactKind| CacheKey::new(class, kind, stem);
        cache.write(&key(ArtifactKind::Feature("a".into())), &col(1.0)).unwrap();
        cache.write(&key(ArtifactKind::Feature("b".into())), &col(10.0)).unwrap();
        cache.write(&key(ArtifactKind::Label), &Array1::zeros(edges)).unwrap();
        cache.write(&key(ArtifactKind::Weight), &Array1::ones(edges)).unwrap();
    }

    fn assembler(cache: &ArtifactCache, selection: Selection) -> DatasetAssembler {
        DatasetAssembler::new(cache.clone(), vec!["a".to_string(), "b".to_string()], selection)
    }

    #[test]
    fn test_columns_follow_feature_order() {
        let temp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(temp.path());
        seed(&cache, "easy", "x", 3, 0.0);

        let matrices =
            assembler(&cache, Selection::new().class("easy", ["x"])).load_features().unwrap();

        assert_eq!(matrices.len(), 1);
        assert_eq!(matrices[0], array![[0.0, 0.0], [1.0, 10.0], [2.0, 20.0]]);
    }

    #[test]
    fn test_empty_stems_means_all_labelled() {
        let temp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(temp.path());
        seed(&cache, "easy", "y", 3, 0.0);
        seed(&cache, "easy", "x", 3, 0.0);

        let selection = Selection::new().class("easy", Vec::<String>::new());
        let paths = assembler(&cache, selection).resolve_paths().unwrap();
        let stems: Vec<_> = paths.iter().map(|p| p.stem.as_str()).collect();
        assert_eq!(stems, vec!["x", "y"]);
    }

    #[test]
    fn test_missing_artifact_is_surfaced() {
        let temp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(temp.path());
        seed(&cache, "easy", "x", 3, 0.0);
        let weight = cache.path_for(&CacheKey::new("easy", ArtifactKind::Weight, "x"));
        std::fs::remove_file(weight).unwrap();

        let err =
            assembler(&cache, Selection::new().class("easy", ["x"])).resolve_paths().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ArtifactMissing { path } if path.ends_with("sample_weights/x.npy")
        ));
    }

    #[test]
    fn test_length_mismatch_is_alignment_violation() {
        let temp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(temp.path());
        seed(&cache, "easy", "x", 3, 0.0);
        cache.write(&CacheKey::new("easy", ArtifactKind::Label, "x"), &Array1::zeros(4)).unwrap();

        let err =
            assembler(&cache, Selection::new().class("easy", ["x"])).load_instances().unwrap_err();
        assert!(matches!(err, PipelineError::AlignmentViolation { .. }));
    }

    #[test]
    fn test_pool_keeps_selection_order_and_exports() {
        let temp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(temp.path().join("npy"));
        seed(&cache, "hard", "h", 1, 100.0);
        seed(&cache, "easy", "e", 3, 0.0);

        let selection = Selection::new().class("hard", ["h"]).class("easy", ["e"]);
        let instances = assembler(&cache, selection).load_instances().unwrap();
        let pooled = TrainingMatrix::pool(&instances).unwrap();

        assert_eq!(pooled.rows(), 4);
        assert_eq!(pooled.features.column(0).to_vec(), vec![100.0, 0.0, 1.0, 2.0]);

        let out = temp.path().join("export");
        pooled.write_npy(&out).unwrap();
        let file = File::open(out.join(TrainingMatrix::LABELS_FILE)).unwrap();
        let labels = Array1::<f64>::read_npy(file).unwrap();
        assert_eq!(labels.len(), 4);
    }
}
