use std::path::PathBuf;
use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A cache entry the caller relies on is not on disk.
    #[error("artifact missing: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    /// Building the artifacts of one instance failed. Recorded per instance,
    /// never fatal to a corpus run.
    #[error("build failed for {class}/{stem}: {reason}")]
    BuildFailure { class: String, stem: String, reason: String },

    /// The operator declined a destructive directory clear.
    #[error("aborted by user: refused to clear {}", display_paths(paths))]
    UserAborted { paths: Vec<PathBuf> },

    #[error("alignment violation for {stem}: {detail}")]
    AlignmentViolation { stem: String, detail: String },

    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid instance {}: {reason}", path.display())]
    InvalidInstance { path: PathBuf, reason: String },

    #[error("exact solver error: {0}")]
    Solver(String),

    #[error("corpus error: {0}")]
    Corpus(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),

    #[error(transparent)]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub(crate) fn invalid_instance(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidInstance { path: path.into(), reason: reason.into() }
    }

    /// Attach `path` to an [`PipelineError::InvalidInstance`] raised without one.
    #[must_use]
    pub fn at_path(self, path: &std::path::Path) -> Self {
        match self {
            Self::InvalidInstance { path: p, reason } if p.as_os_str().is_empty() => {
                Self::InvalidInstance { path: path.to_path_buf(), reason }
            }
            other => other,
        }
    }

    /// True for errors that stop a whole run rather than a single instance.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UserAborted { .. }
                | Self::InvalidConfig(_)
                | Self::UnknownFeature(_)
                | Self::Corpus(_)
        )
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}
