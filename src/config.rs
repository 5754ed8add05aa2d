use crate::error::{ConfigError, PipelineError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CHECKPOINT_EVERY: usize = 10;
pub const DEFAULT_INPUT_EXTENSION: &str = "xml";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

pub const EXTRACTION_CHECKPOINT: &str = "local_statements_progress.bin";
pub const STATS_FILE: &str = "local_consolidation_stats.csv";
pub const LOCK_FILE: &str = "lock";
pub const AGGREGATE_STATS_FILE: &str = "aggregate_stats.csv";
pub const FINAL_STATS_FILE: &str = "final_consolidation_stats.csv";

/// Namespace of every artifact a process writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Worker(usize),
    Master,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Worker(id) => write!(f, "worker-{}", id),
            Scope::Master => write!(f, "MASTER"),
        }
    }
}

/// Polling policy of the rendezvous barrier.
#[derive(Debug, Clone, PartialEq)]
pub struct BarrierConfig {
    /// Sleep between polling rounds.
    pub poll_interval: Duration,
    /// Upper bound on a single lock attempt.
    pub lock_timeout: Duration,
    /// Total time the master may sleep before giving up. `None` polls forever.
    pub max_wait: Option<Duration>,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_wait: None,
        }
    }
}

/// Launch parameters of one worker process. Built once, validated, then
/// passed by reference into every component.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub worker_id: usize,
    pub num_workers: usize,
    pub input_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub output_dir: PathBuf,
    pub stats_dir: PathBuf,
    /// Only input files with this extension take part in the run.
    pub input_extension: String,
    /// Extraction progress is flushed every this many processed files.
    pub checkpoint_every: usize,
    pub barrier: BarrierConfig,
}

impl PipelineConfig {
    /// Configuration with default tuning for the given worker and directories.
    pub fn new(
        worker_id: usize,
        num_workers: usize,
        input_dir: impl Into<PathBuf>,
        checkpoint_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        stats_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            worker_id,
            num_workers,
            input_dir: input_dir.into(),
            checkpoint_dir: checkpoint_dir.into(),
            output_dir: output_dir.into(),
            stats_dir: stats_dir.into(),
            input_extension: DEFAULT_INPUT_EXTENSION.to_string(),
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            barrier: BarrierConfig::default(),
        }
    }

    /// All four directories under one base, as the test suites lay them out.
    pub fn under_base(worker_id: usize, num_workers: usize, base_dir: &Path) -> Self {
        Self::new(
            worker_id,
            num_workers,
            base_dir.join("input"),
            base_dir.join("checkpoints"),
            base_dir.join("output"),
            base_dir.join("stats"),
        )
    }

    pub fn with_checkpoint_every(mut self, every: usize) -> Self {
        self.checkpoint_every = every;
        self
    }

    pub fn with_input_extension(mut self, extension: impl Into<String>) -> Self {
        self.input_extension = extension.into();
        self
    }

    pub fn with_barrier(mut self, barrier: BarrierConfig) -> Self {
        self.barrier = barrier;
        self
    }

    /// Reject configurations that cannot run, before any work starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.worker_id >= self.num_workers {
            return Err(ConfigError::WorkerIdOutOfRange {
                worker_id: self.worker_id,
                num_workers: self.num_workers,
            });
        }
        if self.checkpoint_every == 0 {
            return Err(ConfigError::ZeroCheckpointInterval);
        }
        if !self.input_dir.is_dir() {
            return Err(ConfigError::MissingInputDir(self.input_dir.clone()));
        }
        Ok(())
    }

    pub fn is_master(&self) -> bool {
        self.worker_id == 0
    }

    pub fn scope(&self) -> Scope {
        Scope::Worker(self.worker_id)
    }

    pub fn checkpoint_path(&self, scope: Scope, name: &str) -> PathBuf {
        self.checkpoint_dir.join(scope.to_string()).join(name)
    }

    pub fn output_path(&self, scope: Scope, name: &str) -> PathBuf {
        self.output_dir.join(scope.to_string()).join(name)
    }

    pub fn stats_path(&self, scope: Scope, name: &str) -> PathBuf {
        self.stats_dir.join(scope.to_string()).join(name)
    }

    /// Completion marker of a worker.
    pub fn worker_stats_path(&self, worker_id: usize) -> PathBuf {
        self.stats_path(Scope::Worker(worker_id), STATS_FILE)
    }

    pub fn worker_lock_path(&self, worker_id: usize) -> PathBuf {
        self.stats_path(Scope::Worker(worker_id), LOCK_FILE)
    }

    /// Input documents in the order every worker agrees on.
    pub fn list_inputs(&self) -> Result<Vec<PathBuf>, PipelineError> {
        list_inputs(&self.input_dir, &self.input_extension)
    }
}

/// Regular files under `input_dir` with the given extension, sorted by name.
pub fn list_inputs(input_dir: &Path, extension: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();

    for entry in fs::read_dir(input_dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_display() {
        assert_eq!(Scope::Worker(3).to_string(), "worker-3");
        assert_eq!(Scope::Master.to_string(), "MASTER");
    }

    #[test]
    fn test_validate_rejects_worker_id_out_of_range() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp_dir.path().join("input")).unwrap();

        let config = PipelineConfig::under_base(2, 2, temp_dir.path());
        assert_eq!(
            config.validate(),
            Err(ConfigError::WorkerIdOutOfRange {
                worker_id: 2,
                num_workers: 2
            })
        );
    }

    #[test]
    fn test_validate_rejects_zero_workers_and_interval() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp_dir.path().join("input")).unwrap();

        let config = PipelineConfig::under_base(0, 0, temp_dir.path());
        assert_eq!(config.validate(), Err(ConfigError::NoWorkers));

        let config = PipelineConfig::under_base(0, 1, temp_dir.path()).with_checkpoint_every(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroCheckpointInterval));
    }

    #[test]
    fn test_validate_requires_input_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::under_base(0, 1, temp_dir.path());
        assert!(matches!(config.validate(), Err(ConfigError::MissingInputDir(_))));

        fs::create_dir_all(temp_dir.path().join("input")).unwrap();
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_paths_are_scoped_by_worker() {
        let config = PipelineConfig::under_base(1, 2, Path::new("/state"));
        assert_eq!(
            config.worker_stats_path(1),
            PathBuf::from("/state/stats/worker-1/local_consolidation_stats.csv")
        );
        assert_eq!(
            config.worker_lock_path(0),
            PathBuf::from("/state/stats/worker-0/lock")
        );
        assert_eq!(
            config.checkpoint_path(Scope::Master, "x.bin"),
            PathBuf::from("/state/checkpoints/MASTER/x.bin")
        );
    }

    #[test]
    fn test_list_inputs_filters_and_sorts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path();
        fs::write(input.join("b.xml"), "b").unwrap();
        fs::write(input.join("a.xml"), "a").unwrap();
        fs::write(input.join("c.txt"), "c").unwrap();
        fs::create_dir_all(input.join("d.xml")).unwrap();

        let files = list_inputs(input, "xml").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.xml", "b.xml"]);
    }
}
