use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Error type returned by the opaque collaborators (extraction engine and
/// consolidation sub-stages).
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Launch parameters that cannot describe a valid run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("num_workers must be at least 1")]
    NoWorkers,
    #[error("worker_id {worker_id} must lie in the range [0, {num_workers})")]
    WorkerIdOutOfRange { worker_id: usize, num_workers: usize },
    #[error("checkpoint interval must be at least 1")]
    ZeroCheckpointInterval,
    #[error("input directory {0} does not exist")]
    MissingInputDir(PathBuf),
}

/// Failure reported by the extraction collaborator for a single document.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The extraction engine itself is gone; nothing further can be processed.
    #[error("extraction engine unavailable: {0}")]
    EngineUnavailable(String),
    /// Only this document failed.
    #[error("failed to process file: {0}")]
    FileFailed(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("extraction engine unavailable while processing {file}: {reason}")]
    EngineUnavailable { file: PathBuf, reason: String },
    #[error("consolidation stage {stage} failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: CollaboratorError,
    },
    #[error("malformed statistics file {path}: {reason}")]
    Stats { path: PathBuf, reason: String },
    #[error("gave up waiting after {waited:?} for workers {pending:?}")]
    BarrierTimeout { pending: Vec<usize>, waited: Duration },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::error::EncodeError),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] bincode::error::DecodeError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to persist {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl PipelineError {
    pub fn stats(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::Stats {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
