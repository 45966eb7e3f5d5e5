use crate::artifacts::{ArtifactCache, ArtifactKind, CacheKey};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::features::{EdgeFeature, FeatureRegistry};
use crate::graph::Graph;
use crate::solver::{ExactSolver, HeldKarpSolver};
use crate::tsplib;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// One unit of work: every requested artifact of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceJob {
    pub class: String,
    pub stem: String,
    pub problem_path: PathBuf,
    /// Reference tour location; used only if the file exists.
    pub tour_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Computed,
    Skipped,
}

/// Where a computed label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    ReferenceTour,
    ExactSolve,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactOutcome {
    pub kind: ArtifactKind,
    pub status: ArtifactStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_source: Option<LabelSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub class: String,
    pub stem: String,
    /// Edge count, if the instance had to be parsed.
    pub edges: Option<usize>,
    pub outcomes: Vec<ArtifactOutcome>,
}

impl BuildReport {
    #[must_use]
    pub fn computed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status == ArtifactStatus::Computed).count()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status == ArtifactStatus::Skipped).count()
    }

    #[must_use]
    pub fn exact_solved(&self) -> bool {
        self.outcomes.iter().any(|o| o.label_source == Some(LabelSource::ExactSolve))
    }
}

/// Produces the missing artifacts of a single instance.
pub struct ArtifactBuilder {
    cache: ArtifactCache,
    features: Vec<Arc<dyn EdgeFeature>>,
    solver: Arc<dyn ExactSolver>,
}

impl std::fmt::Debug for ArtifactBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactBuilder")
            .field("cache", &self.cache)
            .field("features", &self.features.iter().map(|f| f.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ArtifactBuilder {
    #[must_use]
    pub fn new(
        cache: ArtifactCache,
        features: Vec<Arc<dyn EdgeFeature>>,
        solver: Arc<dyn ExactSolver>,
    ) -> Self {
        Self { cache, features, solver }
    }

    /// Builder with the built-in features named by `config` and a
    /// [`HeldKarpSolver`].
    pub fn from_config(config: &PipelineConfig, cache: ArtifactCache) -> PipelineResult<Self> {
        config.validate()?;
        let features =
            FeatureRegistry::builtin(config.feature_params).resolve(&config.feature_dirs)?;
        Ok(Self::new(cache, features, Arc::new(HeldKarpSolver::new(config.max_exact_nodes))))
    }

    #[must_use]
    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name().to_string()).collect()
    }

    /// Compute and write every artifact of `job` that is not cached yet.
    ///
    /// All arrays are indexed by the instance's edge ordering; an array of the
    /// wrong length is an [`PipelineError::AlignmentViolation`] and is not
    /// written.
    pub fn build(&self, job: &InstanceJob) -> PipelineResult<BuildReport> {
        let mut report = BuildReport {
            class: job.class.clone(),
            stem: job.stem.clone(),
            edges: None,
            outcomes: Vec::new(),
        };
        // parsed on first miss only
        let mut graph: Option<Graph> = None;

        for feature in &self.features {
            let kind = ArtifactKind::Feature(feature.name().to_string());
            if self.skip(job, &kind, &mut report) {
                continue;
            }
            info!(class = %job.class, stem = %job.stem, artifact = %kind, "computing");
            let graph = load_graph(&mut graph, job)?;
            let values = feature.compute(graph)?;
            self.store(job, kind, graph, values, &mut report, None)?;
        }

        if !self.skip(job, &ArtifactKind::Label, &mut report) {
            let graph = load_graph(&mut graph, job)?;
            let (values, source) = self.label(job, graph)?;
            self.store(job, ArtifactKind::Label, graph, values, &mut report, Some(source))?;
        }

        if !self.skip(job, &ArtifactKind::Weight, &mut report) {
            info!(
                class = %job.class,
                stem = %job.stem,
                artifact = %ArtifactKind::Weight,
                "computing"
            );
            let graph = load_graph(&mut graph, job)?;
            let values = normalized_weights(graph);
            self.store(job, ArtifactKind::Weight, graph, values, &mut report, None)?;
        }

        report.edges = graph.as_ref().map(Graph::edge_count);
        Ok(report)
    }

    fn skip(&self, job: &InstanceJob, kind: &ArtifactKind, report: &mut BuildReport) -> bool {
        let key = CacheKey::new(job.class.as_str(), kind.clone(), job.stem.as_str());
        if !self.cache.exists(&key) {
            return false;
        }
        info!(class = %job.class, stem = %job.stem, artifact = %kind, "skipping");
        report.outcomes.push(ArtifactOutcome {
            kind: kind.clone(),
            status: ArtifactStatus::Skipped,
            label_source: None,
        });
        true
    }

    fn label(&self, job: &InstanceJob, graph: &Graph) -> PipelineResult<(Vec<f64>, LabelSource)> {
        if job.tour_path.is_file() {
            info!(
                class = %job.class,
                stem = %job.stem,
                artifact = %ArtifactKind::Label,
                source = "reference_tour",
                "computing"
            );
            let tour = tsplib::read_tour(&job.tour_path)?;
            let values = tour.indicator(&graph.ordering()).map_err(|e| e.at_path(&job.tour_path))?;
            return Ok((values, LabelSource::ReferenceTour));
        }

        warn!(
            class = %job.class,
            stem = %job.stem,
            artifact = %ArtifactKind::Label,
            source = "exact_solve",
            nodes = graph.order(),
            "no reference tour, computing label by exact solve"
        );
        let values = self.solver.optimal_edges(graph)?;
        Ok((values, LabelSource::ExactSolve))
    }

    fn store(
        &self,
        job: &InstanceJob,
        kind: ArtifactKind,
        graph: &Graph,
        values: Vec<f64>,
        report: &mut BuildReport,
        label_source: Option<LabelSource>,
    ) -> PipelineResult<()> {
        if values.len() != graph.edge_count() {
            return Err(PipelineError::AlignmentViolation {
                stem: job.stem.clone(),
                detail: format!(
                    "{kind} has {} entries, instance has {} edges",
                    values.len(),
                    graph.edge_count()
                ),
            });
        }
        let key = CacheKey::new(job.class.as_str(), kind.clone(), job.stem.as_str());
        self.cache.write(&key, &Array1::from(values))?;
        report.outcomes.push(ArtifactOutcome {
            kind,
            status: ArtifactStatus::Computed,
            label_source,
        });
        Ok(())
    }
}

fn load_graph<'a>(slot: &'a mut Option<Graph>, job: &InstanceJob) -> PipelineResult<&'a Graph> {
    if slot.is_none() {
        *slot = Some(tsplib::read_problem(&job.problem_path)?);
    }
    slot.as_ref().ok_or_else(|| {
        PipelineError::Corpus(format!("failed to load {}", job.problem_path.display()))
    })
}

/// Edge weights over the instance's own maximum; all zeros if that maximum
/// is not positive.
#[must_use]
pub fn normalized_weights(graph: &Graph) -> Vec<f64> {
    let max = graph.max_weight().unwrap_or(0.0);
    if max <= 0.0 {
        return vec![0.0; graph.edge_count()];
    }
    graph.weights().iter().map(|w| w / max).collect()
}
