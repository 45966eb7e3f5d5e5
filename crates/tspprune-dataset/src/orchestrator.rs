//! Walks the problem corpus and builds every instance's artifacts.

use crate::builder::{BuildReport, InstanceJob};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::executor::InstanceExecutor;
use crate::layout::{self, DataLayout, PROBLEM_EXTENSION};
use crate::lifecycle;
use crate::progress::{ProgressEvent, ProgressSink};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFailure {
    pub class: String,
    pub stem: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub classes: usize,
    pub instances: usize,
    pub succeeded: usize,
    pub artifacts_computed: usize,
    pub artifacts_skipped: usize,
    pub exact_solves: usize,
    pub failures: Vec<InstanceFailure>,
}

impl RunSummary {
    fn record(&mut self, report: &BuildReport) {
        self.succeeded += 1;
        self.artifacts_computed += report.computed();
        self.artifacts_skipped += report.skipped();
        if report.exact_solved() {
            self.exact_solves += 1;
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, progress: &dyn ProgressSink, failure: InstanceFailure) {
        progress.on_event(ProgressEvent::InstanceFailed {
            class: failure.class.clone(),
            stem: failure.stem.clone(),
            reason: failure.reason.clone(),
        });
        self.failures.push(failure);
    }
}

/// Dispatches one [`InstanceJob`] per problem file, class by class.
///
/// At most `workers` jobs are in flight; results are consumed in dispatch
/// order so progress output is the same for any pool size. A failed
/// instance is recorded in the [`RunSummary`] and the run moves on.
pub struct InstanceJobOrchestrator {
    layout: DataLayout,
    config: PipelineConfig,
    solutions_dir: PathBuf,
    workers: usize,
    executor: Arc<dyn InstanceExecutor>,
    progress: Arc<dyn ProgressSink>,
}

impl InstanceJobOrchestrator {
    #[must_use]
    pub fn new(
        layout: DataLayout,
        config: PipelineConfig,
        executor: Arc<dyn InstanceExecutor>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        let solutions_dir = layout.solutions_dir();
        let workers = config.effective_workers();
        Self { layout, config, solutions_dir, workers, executor, progress }
    }

    /// Look for reference tours somewhere other than `<root>/solutions`.
    #[must_use]
    pub fn with_solutions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.solutions_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub async fn run(&self) -> PipelineResult<RunSummary> {
        self.config.validate()?;
        let classes = list_classes(&self.layout.problems_dir())?;
        self.progress.on_event(ProgressEvent::RunStarted { classes: classes.clone() });

        let mut summary = RunSummary { classes: classes.len(), ..RunSummary::default() };
        for (i, class) in classes.iter().enumerate() {
            self.progress.on_event(ProgressEvent::ClassStarted {
                index: i + 1,
                total: classes.len(),
                class: class.clone(),
            });
            lifecycle::ensure_class_dirs(
                &self.layout.npy_dir(),
                &self.solutions_dir,
                class,
                &self.config.feature_dirs,
            )?;
            self.run_class(class, &mut summary).await?;
        }

        self.progress.on_event(ProgressEvent::RunFinished { summary: summary.clone() });
        Ok(summary)
    }

    async fn run_class(&self, class: &str, summary: &mut RunSummary) -> PipelineResult<()> {
        let instances = list_instances(&self.layout.problems_dir().join(class))?;
        summary.instances += instances.len();
        let (instances, clashes) = split_stem_clashes(class, instances);
        for failure in clashes {
            summary.fail(self.progress.as_ref(), failure);
        }
        let total = instances.len();
        debug!(class, instances = total, workers = self.workers, "dispatching class");

        let jobs = instances.into_iter().enumerate().map(|(i, (stem, problem_path))| {
            let job = InstanceJob {
                class: class.to_string(),
                problem_path,
                tour_path: layout::tour_path_in(&self.solutions_dir, class, &stem),
                stem,
            };
            (i + 1, job)
        });

        let mut results = stream::iter(jobs)
            .map(|(index, job)| {
                self.progress.on_event(ProgressEvent::InstanceStarted {
                    class: job.class.clone(),
                    stem: job.stem.clone(),
                    index,
                    total,
                });
                let executor = Arc::clone(&self.executor);
                async move {
                    let (class, stem) = (job.class.clone(), job.stem.clone());
                    (class, stem, executor.execute(job).await)
                }
            })
            .buffered(self.workers);

        while let Some((class, stem, result)) = results.next().await {
            match result {
                Ok(report) => {
                    summary.record(&report);
                    self.progress.on_event(ProgressEvent::InstanceFinished { report });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let reason = match e {
                        PipelineError::BuildFailure { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    summary.fail(self.progress.as_ref(), InstanceFailure { class, stem, reason });
                }
            }
        }
        Ok(())
    }
}

/// Sorted class names: the sub-directories of the problems root.
pub fn list_classes(problems_dir: &Path) -> PipelineResult<Vec<String>> {
    let entries = std::fs::read_dir(problems_dir).map_err(|e| {
        PipelineError::Corpus(format!(
            "cannot read problems directory {}: {e}",
            problems_dir.display()
        ))
    })?;
    let mut classes = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            classes.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    classes.sort();
    Ok(classes)
}

/// Stems and paths of the problem files in one class directory, sorted by
/// file name.
pub fn list_instances(class_dir: &Path) -> PipelineResult<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(class_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_problem = path.extension().and_then(|e| e.to_str()) == Some(PROBLEM_EXTENSION);
        if entry.file_type()?.is_file() && is_problem {
            files.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    files.sort();
    Ok(files
        .into_iter()
        .map(|(name, path)| (layout::name_stem(&name).to_string(), path))
        .collect())
}

/// Separates files whose stem is shared with another file in the class
/// (`a.tsp` and `a.v2.tsp`). They would write the same cache keys, so every
/// one of them fails instead of being built.
fn split_stem_clashes(
    class: &str,
    instances: Vec<(String, PathBuf)>,
) -> (Vec<(String, PathBuf)>, Vec<InstanceFailure>) {
    let mut files: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (stem, path) in &instances {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        files.entry(stem.clone()).or_default().push(name);
    }

    let mut unique = Vec::new();
    let mut clashes = Vec::new();
    for (stem, path) in instances {
        match files.get(&stem) {
            Some(names) if names.len() > 1 => clashes.push(InstanceFailure {
                class: class.to_string(),
                reason: format!("stem {stem:?} is shared by {}", names.join(", ")),
                stem,
            }),
            _ => unique.push((stem, path)),
        }
    }
    (unique, clashes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_classes_sorted_dirs_only() {
        let temp = TempDir::new().unwrap();
        for class in ["medium", "easy", "hard"] {
            std::fs::create_dir(temp.path().join(class)).unwrap();
        }
        std::fs::write(temp.path().join("README"), "x").unwrap();

        assert_eq!(list_classes(temp.path()).unwrap(), vec!["easy", "hard", "medium"]);
    }

    #[test]
    fn test_missing_problems_root_is_corpus_error() {
        let temp = TempDir::new().unwrap();
        let err = list_classes(&temp.path().join("absent")).unwrap_err();
        assert!(matches!(err, PipelineError::Corpus(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_list_instances_filters_and_sorts() {
        let temp = TempDir::new().unwrap();
        for name in ["b.tsp", "a.tsp", "a.opt.tour", "notes.txt", "c.tsp"] {
            std::fs::write(temp.path().join(name), "").unwrap();
        }
        std::fs::create_dir(temp.path().join("d.tsp")).unwrap();

        let stems: Vec<String> =
            list_instances(temp.path()).unwrap().into_iter().map(|(stem, _)| stem).collect();
        assert_eq!(stems, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_shared_stems_are_split_off() {
        let temp = TempDir::new().unwrap();
        for name in ["a.tsp", "a.v2.tsp", "b.tsp"] {
            std::fs::write(temp.path().join(name), "").unwrap();
        }

        let (unique, clashes) = split_stem_clashes("easy", list_instances(temp.path()).unwrap());

        assert_eq!(unique, vec![("b".to_string(), temp.path().join("b.tsp"))]);
        assert_eq!(clashes.len(), 2);
        assert!(clashes.iter().all(|f| f.stem == "a" && f.reason.contains("a.tsp, a.v2.tsp")));
    }
}
