use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

pub const PROBLEMS_DIR: &str = "problems";
pub const GENERATED_CLASS: &str = "generated";
pub const SOLUTIONS_DIR: &str = "solutions";
pub const NPY_DIR: &str = "npy";
pub const MODELS_DIR: &str = "models";
pub const LOGS_DIR: &str = "logs";

pub const PROBLEM_EXTENSION: &str = "tsp";
pub const TOUR_EXTENSION: &str = "opt.tour";

/// Filesystem layout of a data root.
///
/// ```text
/// <root>/problems/<class>/<stem>.tsp
/// <root>/solutions/<class>/<stem>.opt.tour
/// <root>/npy/<class>/<artifact>/<stem>.npy
/// <root>/models/
/// <root>/logs/<timestamp>.txt
/// ```
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn problems_dir(&self) -> PathBuf {
        self.root.join(PROBLEMS_DIR)
    }

    #[must_use]
    pub fn generated_problems_dir(&self) -> PathBuf {
        self.problems_dir().join(GENERATED_CLASS)
    }

    #[must_use]
    pub fn solutions_dir(&self) -> PathBuf {
        self.root.join(SOLUTIONS_DIR)
    }

    #[must_use]
    pub fn npy_dir(&self) -> PathBuf {
        self.root.join(NPY_DIR)
    }

    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        self.root.join(MODELS_DIR)
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// Top-level output roots in a fixed order.
    #[must_use]
    pub fn top_level_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.problems_dir(),
            self.solutions_dir(),
            self.npy_dir(),
            self.models_dir(),
            self.logs_dir(),
        ]
    }

    #[must_use]
    pub fn problem_path(&self, class: &str, stem: &str) -> PathBuf {
        self.problems_dir().join(class).join(format!("{stem}.{PROBLEM_EXTENSION}"))
    }

    #[must_use]
    pub fn tour_path(&self, class: &str, stem: &str) -> PathBuf {
        tour_path_in(&self.solutions_dir(), class, stem)
    }

    /// Log file for a run that started at `started`.
    #[must_use]
    pub fn run_log_path(&self, started: DateTime<Local>) -> PathBuf {
        self.logs_dir().join(format!("{}.txt", timestamp_filename(started)))
    }
}

#[must_use]
pub fn tour_path_in(solutions_dir: &Path, class: &str, stem: &str) -> PathBuf {
    solutions_dir.join(class).join(format!("{stem}.{TOUR_EXTENSION}"))
}

#[must_use]
pub fn timestamp_filename(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Stem of a file name: everything before the first `.`.
#[must_use]
pub fn name_stem(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}
