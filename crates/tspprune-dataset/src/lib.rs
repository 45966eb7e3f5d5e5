//! tspprune dataset pipeline
//!
//! Builds per-edge training data for TSP edge-pruning models:
//! - Parsing TSPLIB instances and reference tours
//! - Computing edge features, labels and sample weights into an on-disk cache
//! - Running one isolated job per instance over a class-partitioned corpus
//! - Reassembling aligned feature matrices from the cache

pub mod artifacts;
pub mod builder;
pub mod config;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod features;
pub mod generate;
pub mod graph;
pub mod layout;
pub mod lifecycle;
pub mod orchestrator;
pub mod progress;
pub mod solver;
pub mod tsplib;

pub use artifacts::{ArtifactCache, ArtifactKind, CacheKey};
pub use builder::{
    ArtifactBuilder, ArtifactOutcome, ArtifactStatus, BuildReport, InstanceJob, LabelSource,
};
pub use config::PipelineConfig;
pub use dataset::{DatasetAssembler, InstanceData, InstancePaths, Selection, TrainingMatrix};
pub use error::{PipelineError, PipelineResult};
pub use executor::{InProcessExecutor, InstanceExecutor, ProcessExecutor, WorkerRequest};
pub use features::{EdgeFeature, FeatureKind, FeatureParams, FeatureRegistry, MstWeighting};
pub use generate::{generate_instances, GenerateOptions};
pub use graph::{EdgeOrdering, Graph, Tour};
pub use layout::DataLayout;
pub use lifecycle::{confirm_and_clear, ensure, ensure_tree, AssumeNo, AssumeYes, Confirm};
pub use orchestrator::{InstanceFailure, InstanceJobOrchestrator, RunSummary};
pub use progress::{NullProgressSink, ProgressEvent, ProgressSink, TracingProgressSink};
pub use solver::{ExactSolver, HeldKarpSolver, MAX_EXACT_NODES};
