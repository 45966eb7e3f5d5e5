//! Running one [`InstanceJob`] in isolation.
//!
//! Whatever goes wrong inside an instance job, including a panic or a hang,
//! comes back as a [`PipelineError::BuildFailure`] for that instance only.

use crate::artifacts::ArtifactCache;
use crate::builder::{ArtifactBuilder, BuildReport, InstanceJob};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

#[async_trait]
pub trait InstanceExecutor: Send + Sync {
    async fn execute(&self, job: InstanceJob) -> PipelineResult<BuildReport>;
}

fn failure(job: &InstanceJob, reason: impl Into<String>) -> PipelineError {
    PipelineError::BuildFailure {
        class: job.class.clone(),
        stem: job.stem.clone(),
        reason: reason.into(),
    }
}

/// Runs each job on the blocking thread pool.
///
/// Panics are contained. A timed-out job is reported as failed, but its
/// thread cannot be stopped and finishes in the background.
#[derive(Debug, Clone)]
pub struct InProcessExecutor {
    builder: Arc<ArtifactBuilder>,
    timeout: Option<Duration>,
}

impl InProcessExecutor {
    #[must_use]
    pub fn new(builder: Arc<ArtifactBuilder>) -> Self {
        Self { builder, timeout: None }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl InstanceExecutor for InProcessExecutor {
    async fn execute(&self, job: InstanceJob) -> PipelineResult<BuildReport> {
        let builder = Arc::clone(&self.builder);
        let task_job = job.clone();
        let handle = tokio::task::spawn_blocking(move || builder.build(&task_job));

        let joined = match self.timeout {
            Some(limit) => match timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    return Err(failure(&job, format!("timed out after {}s", limit.as_secs())));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(e)) => Err(failure(&job, e.to_string())),
            Err(e) if e.is_panic() => Err(failure(&job, "worker panicked")),
            Err(e) => Err(failure(&job, e.to_string())),
        }
    }
}

/// Everything a worker process needs to build one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub job: InstanceJob,
    pub config: PipelineConfig,
    pub npy_root: PathBuf,
}

impl WorkerRequest {
    /// Build the requested instance in the current process.
    pub fn run(&self) -> PipelineResult<BuildReport> {
        let builder =
            ArtifactBuilder::from_config(&self.config, ArtifactCache::new(&self.npy_root))?;
        builder.build(&self.job)
    }
}

/// Runs each job in a fresh child process.
///
/// The child gets the serialized [`WorkerRequest`] as its last argument,
/// writes a [`BuildReport`] as JSON on stdout and logs on stderr. The child
/// is killed when the timeout elapses.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: PathBuf,
    args: Vec<OsString>,
    config: PipelineConfig,
    npy_root: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    #[must_use]
    pub fn new(
        program: impl Into<PathBuf>,
        config: PipelineConfig,
        npy_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            config,
            npy_root: npy_root.into(),
            timeout: None,
        }
    }

    /// Arguments placed before the request, e.g. the worker subcommand.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl InstanceExecutor for ProcessExecutor {
    async fn execute(&self, job: InstanceJob) -> PipelineResult<BuildReport> {
        let request = WorkerRequest {
            job: job.clone(),
            config: self.config.clone(),
            npy_root: self.npy_root.clone(),
        };
        let request = serde_json::to_string(&request)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(request)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(program = %self.program.display(), stem = %job.stem, "spawning worker");

        let output = match self.timeout {
            Some(limit) => match timeout(limit, cmd.output()).await {
                Ok(output) => output,
                Err(_) => {
                    let reason = format!("timed out after {}s, worker killed", limit.as_secs());
                    return Err(failure(&job, reason));
                }
            },
            None => cmd.output().await,
        };
        let output = output.map_err(|e| failure(&job, format!("failed to spawn worker: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut last_line = None;
        for line in stderr.lines().map(str::trim).filter(|l| !l.is_empty()) {
            info!(target: "tspprune::worker", class = %job.class, stem = %job.stem, "{line}");
            last_line = Some(line);
        }

        if !output.status.success() {
            let code = output.status.code().map_or_else(|| "signal".to_string(), |c| c.to_string());
            let reason = match last_line {
                Some(line) => format!("worker exited with {code}: {line}"),
                None => format!("worker exited with {code}"),
            };
            return Err(failure(&job, reason));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| failure(&job, format!("unreadable worker report: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::EdgeFeature;
    use crate::graph::Graph;
    use crate::solver::HeldKarpSolver;
    use tempfile::TempDir;

    struct Panicking;

    impl EdgeFeature for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn compute(&self, _graph: &Graph) -> PipelineResult<Vec<f64>> {
            panic!("feature blew up");
        }
    }

    struct Sleepy;

    impl EdgeFeature for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn compute(&self, graph: &Graph) -> PipelineResult<Vec<f64>> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(vec![0.0; graph.edge_count()])
        }
    }

    fn setup(feature: Arc<dyn EdgeFeature>) -> (TempDir, ArtifactBuilder, InstanceJob) {
        let temp = TempDir::new().unwrap();
        let problem_path = temp.path().join("t.tsp");
        std::fs::write(
            &problem_path,
            "NAME: t\nDIMENSION: 3\nEDGE_WEIGHT_TYPE: EUC_2D\n\
             NODE_COORD_SECTION\n1 0 0\n2 3 0\n3 0 4\nEOF\n",
        )
        .unwrap();
        let job = InstanceJob {
            class: "easy".to_string(),
            stem: "t".to_string(),
            problem_path,
            tour_path: temp.path().join("t.opt.tour"),
        };
        let builder = ArtifactBuilder::new(
            ArtifactCache::new(temp.path().join("npy")),
            vec![feature],
            Arc::new(HeldKarpSolver::new(16)),
        );
        (temp, builder, job)
    }

    #[tokio::test]
    async fn test_panic_becomes_build_failure() {
        let (_temp, builder, job) = setup(Arc::new(Panicking));
        let executor = InProcessExecutor::new(Arc::new(builder));

        let err = executor.execute(job).await.unwrap_err();
        assert!(matches!(err, PipelineError::BuildFailure { ref stem, .. } if stem == "t"));
    }

    #[tokio::test]
    async fn test_timeout_becomes_build_failure() {
        let (_temp, builder, job) = setup(Arc::new(Sleepy));
        let executor =
            InProcessExecutor::new(Arc::new(builder)).with_timeout(Some(Duration::from_millis(50)));

        let err = executor.execute(job).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BuildFailure { ref reason, .. } if reason.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn test_in_process_success() {
        let (_temp, builder, job) = setup(Arc::new(Sleepy));
        let report = InProcessExecutor::new(Arc::new(builder)).execute(job).await.unwrap();
        assert_eq!(report.computed(), 3);
    }

    #[test]
    fn test_worker_request_runs_from_json() {
        let (temp, _builder, job) = setup(Arc::new(Sleepy));
        let request = WorkerRequest {
            job,
            config: PipelineConfig::new(vec!["weight".to_string()]),
            npy_root: temp.path().join("npy"),
        };
        let json = serde_json::to_string(&request).unwrap();
        let parsed: WorkerRequest = serde_json::from_str(&json).unwrap();

        let report = parsed.run().unwrap();
        assert_eq!(report.computed(), 3);
        assert!(temp.path().join("npy/easy/weight/t.npy").is_file());
    }

    #[tokio::test]
    async fn test_missing_program_is_build_failure() {
        let (temp, _builder, job) = setup(Arc::new(Sleepy));
        let executor = ProcessExecutor::new(
            temp.path().join("no-such-binary"),
            PipelineConfig::new(vec!["weight".to_string()]),
            temp.path().join("npy"),
        );

        let err = executor.execute(job).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BuildFailure { ref reason, .. } if reason.contains("spawn")
        ));
    }

    /// `sh -c <script> sh <request>`: the request lands in `$1`.
    #[cfg(unix)]
    fn shell(temp: &TempDir, script: &str) -> ProcessExecutor {
        ProcessExecutor::new(
            "sh",
            PipelineConfig::new(vec!["weight".to_string()]),
            temp.path().join("npy"),
        )
        .with_args(["-c", script, "sh"])
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_worker_is_killed_and_reported() {
        let (temp, _builder, job) = setup(Arc::new(Sleepy));
        let executor = shell(&temp, "sleep 30").with_timeout(Some(Duration::from_millis(200)));

        let started = std::time::Instant::now();
        let err = executor.execute(job).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(
            err,
            PipelineError::BuildFailure { ref stem, ref reason, .. }
                if stem == "t" && reason.contains("timed out") && reason.contains("killed")
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_exit_reason_carries_last_stderr_line() {
        let (temp, _builder, job) = setup(Arc::new(Sleepy));
        let script = "echo starting >&2; echo 'Error: t.tsp: bad DIMENSION' >&2; echo >&2; exit 3";

        let err = shell(&temp, script).execute(job).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::BuildFailure { ref reason, .. }
                if reason == "worker exited with 3: Error: t.tsp: bad DIMENSION"
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_report_is_read_from_stdout() {
        let (temp, builder, job) = setup(Arc::new(Sleepy));
        let report = builder.build(&job).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        let script = format!("printf '%s' '{json}'");

        let echoed = shell(&temp, &script).execute(job).await.unwrap();
        assert_eq!(echoed, report);
    }
}
