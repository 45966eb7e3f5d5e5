//! Creation and confirmed clearing of the output directory tree.

use crate::artifacts::ArtifactKind;
use crate::error::{PipelineError, PipelineResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Decides whether a destructive clear of `paths` may proceed.
///
/// Called once per clear with every non-empty directory, never per directory.
pub trait Confirm: Send + Sync {
    fn confirm(&self, paths: &[PathBuf]) -> PipelineResult<bool>;
}

/// Non-interactive policy for scripted runs (`--force`).
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _paths: &[PathBuf]) -> PipelineResult<bool> {
        Ok(true)
    }
}

/// Refuses every clear.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeNo;

impl Confirm for AssumeNo {
    fn confirm(&self, _paths: &[PathBuf]) -> PipelineResult<bool> {
        Ok(false)
    }
}

/// Create `path` (and missing parents) if absent.
pub fn ensure(path: &Path) -> PipelineResult<()> {
    if path.is_dir() {
        debug!(path = %path.display(), "directory already exists");
        return Ok(());
    }
    std::fs::create_dir_all(path)?;
    info!(path = %path.display(), "created directory");
    Ok(())
}

pub fn ensure_tree(paths: &[PathBuf]) -> PipelineResult<()> {
    for path in paths {
        ensure(path)?;
    }
    Ok(())
}

/// Clear the contents of every non-empty directory in `paths` after a single
/// confirmation listing all of them.
///
/// Empty or missing directories are left alone and never prompt. A declined
/// confirmation returns [`PipelineError::UserAborted`] before anything is
/// removed. Returns the number of top-level entries removed.
pub fn confirm_and_clear(paths: &[PathBuf], confirm: &dyn Confirm) -> PipelineResult<usize> {
    let mut non_empty = Vec::new();
    for path in paths {
        if !is_empty_dir(path)? {
            non_empty.push(path.clone());
        }
    }

    if non_empty.is_empty() {
        debug!("nothing to clear");
        return Ok(0);
    }

    if !confirm.confirm(&non_empty)? {
        return Err(PipelineError::UserAborted { paths: non_empty });
    }

    let mut removed = 0;
    for path in &non_empty {
        removed += clear_contents(path)?;
        info!(path = %path.display(), "cleared directory");
    }
    Ok(removed)
}

/// Output sub-directories a class needs before any instance job writes:
/// one per feature, the label and weight directories, and the class's
/// reference-tour directory.
pub fn ensure_class_dirs(
    npy_dir: &Path,
    solutions_dir: &Path,
    class: &str,
    feature_names: &[String],
) -> PipelineResult<()> {
    let class_dir = npy_dir.join(class);
    ensure(&class_dir)?;
    ensure(&solutions_dir.join(class))?;
    for name in feature_names {
        ensure(&class_dir.join(ArtifactKind::Feature(name.clone()).dir_name()))?;
    }
    ensure(&class_dir.join(ArtifactKind::Label.dir_name()))?;
    ensure(&class_dir.join(ArtifactKind::Weight.dir_name()))?;
    Ok(())
}

fn is_empty_dir(path: &Path) -> PipelineResult<bool> {
    match std::fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}

fn clear_contents(dir: &Path) -> PipelineResult<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        // file_type() does not follow links: a link to a directory is unlinked, not recursed
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
        count += 1;
    }
    Ok(count)
}
