//! Content-addressed on-disk cache of per-instance arrays.
//!
//! A key `(class, kind, stem)` maps to `<npy>/<class>/<kind dir>/<stem>.npy`.
//! The presence of that file is the only cache-hit signal.

use crate::error::{PipelineError, PipelineResult};
use ndarray::Array1;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const LABEL_DIR: &str = "solutions";
pub const WEIGHT_DIR: &str = "sample_weights";
pub const ARRAY_EXTENSION: &str = "npy";

/// Directory names feature names may not take.
pub const RESERVED_DIR_NAMES: [&str; 2] = [LABEL_DIR, WEIGHT_DIR];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ArtifactKind {
    Feature(String),
    Label,
    Weight,
}

impl ArtifactKind {
    #[must_use]
    pub fn dir_name(&self) -> &str {
        match self {
            Self::Feature(name) => name,
            Self::Label => LABEL_DIR,
            Self::Weight => WEIGHT_DIR,
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Feature(name) => write!(f, "feature {name}"),
            Self::Label => f.write_str("label"),
            Self::Weight => f.write_str("sample weights"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub class: String,
    pub kind: ArtifactKind,
    pub stem: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(class: impl Into<String>, kind: ArtifactKind, stem: impl Into<String>) -> Self {
        Self { class: class.into(), kind, stem: stem.into() }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// Cache rooted at the `npy` directory of a data root.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn kind_dir(&self, class: &str, kind: &ArtifactKind) -> PathBuf {
        self.root.join(class).join(kind.dir_name())
    }

    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.kind_dir(&key.class, &key.kind).join(format!("{}.{ARRAY_EXTENSION}", key.stem))
    }

    #[must_use]
    pub fn exists(&self, key: &CacheKey) -> bool {
        self.path_for(key).is_file()
    }

    pub fn read(&self, key: &CacheKey) -> PipelineResult<Array1<f64>> {
        read_array(&self.path_for(key))
    }

    /// Persist `array` under `key`.
    ///
    /// Written to a temporary file beside the target and renamed into place,
    /// so readers never observe a partial array and a repeated write simply
    /// replaces the previous one.
    pub fn write(&self, key: &CacheKey, array: &Array1<f64>) -> PipelineResult<()> {
        let path = self.path_for(key);
        let dir = path.parent().ok_or_else(|| {
            PipelineError::Corpus(format!("cache path has no parent: {}", path.display()))
        })?;
        std::fs::create_dir_all(dir)?;

        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            array.write_npy(&mut writer)?;
            writer.flush()?;
        }
        tmp.persist(&path).map_err(|e| PipelineError::Io(e.error))?;
        Ok(())
    }

    /// Sorted stems that have a cached array of `kind` for `class`.
    pub fn cached_stems(&self, class: &str, kind: &ArtifactKind) -> PipelineResult<Vec<String>> {
        let dir = self.kind_dir(class, kind);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut stems = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_array = path.extension().and_then(|e| e.to_str()) == Some(ARRAY_EXTENSION);
            if !path.is_file() || !is_array {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
        stems.sort();
        Ok(stems)
    }
}

/// Read a one-dimensional `f64` array, mapping a missing file to
/// [`PipelineError::ArtifactMissing`].
pub fn read_array(path: &Path) -> PipelineResult<Array1<f64>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::ArtifactMissing { path: path.to_path_buf() });
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Array1::<f64>::read_npy(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::TempDir;

    #[test]
    fn test_path_for_layout() {
        let cache = ArtifactCache::new("data/npy");
        let feature = CacheKey::new("easy", ArtifactKind::Feature("mst".to_string()), "a1");
        let label = CacheKey::new("easy", ArtifactKind::Label, "a1");
        let weight = CacheKey::new("easy", ArtifactKind::Weight, "a1");

        assert_eq!(cache.path_for(&feature), PathBuf::from("data/npy/easy/mst/a1.npy"));
        assert_eq!(cache.path_for(&label), PathBuf::from("data/npy/easy/solutions/a1.npy"));
        assert_eq!(cache.path_for(&weight), PathBuf::from("data/npy/easy/sample_weights/a1.npy"));
    }

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(temp.path());
        let key = CacheKey::new("easy", ArtifactKind::Weight, "a1");

        assert!(!cache.exists(&key));
        cache.write(&key, &array![0.25, 0.5, 1.0]).unwrap();
        assert!(cache.exists(&key));
        assert_eq!(cache.read(&key).unwrap(), array![0.25, 0.5, 1.0]);
    }

    #[test]
    fn test_second_write_replaces_cleanly() {
        let temp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(temp.path());
        let key = CacheKey::new("easy", ArtifactKind::Label, "a1");

        cache.write(&key, &array![1.0, 0.0]).unwrap();
        cache.write(&key, &array![0.0, 1.0, 1.0]).unwrap();

        assert_eq!(cache.read(&key).unwrap(), array![0.0, 1.0, 1.0]);
        assert_eq!(cache.cached_stems("easy", &ArtifactKind::Label).unwrap(), vec!["a1"]);
    }

    #[test]
    fn test_read_missing_is_artifact_missing() {
        let temp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(temp.path());
        let key = CacheKey::new("easy", ArtifactKind::Label, "nope");
        assert!(matches!(cache.read(&key), Err(PipelineError::ArtifactMissing { .. })));
    }

    #[test]
    fn test_cached_stems_sorted_and_filtered() {
        let temp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(temp.path());
        for stem in ["b", "a", "c"] {
            cache.write(&CacheKey::new("easy", ArtifactKind::Label, stem), &array![1.0]).unwrap();
        }
        let notes = cache.kind_dir("easy", &ArtifactKind::Label).join("notes.txt");
        std::fs::write(notes, b"x").unwrap();

        assert_eq!(cache.cached_stems("easy", &ArtifactKind::Label).unwrap(), vec!["a", "b", "c"]);
        assert!(cache.cached_stems("hard", &ArtifactKind::Label).unwrap().is_empty());
    }

    #[test]
    fn test_kind_serde_shape() {
        let json = serde_json::to_string(&ArtifactKind::Feature("mst".to_string())).unwrap();
        assert_eq!(json, r#"{"kind":"feature","name":"mst"}"#);
        let back: ArtifactKind = serde_json::from_str(r#"{"kind":"label"}"#).unwrap();
        assert_eq!(back, ArtifactKind::Label);
    }
}
