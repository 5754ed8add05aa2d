use crate::checkpoint;
use crate::collaborator::Phase;
use crate::config::{EXTRACTION_CHECKPOINT, PipelineConfig, Scope};
use crate::error::PipelineError;
use crate::partition::{PartitionRange, partition};
use std::fmt;

/// Progress of one worker as seen from its artifacts on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    pub worker_id: usize,
    pub range: PartitionRange,
    /// Next unprocessed input index of the last flushed extraction checkpoint.
    pub checkpoint_index: Option<usize>,
    pub checkpoint_records: Option<usize>,
    pub output_exists: bool,
    pub stats_published: bool,
}

impl WorkerStatus {
    pub fn state(&self) -> &'static str {
        if self.stats_published {
            "stats dumped"
        } else if self.output_exists {
            "consolidated"
        } else if self.checkpoint_index.is_some() {
            "extracting"
        } else {
            "not started"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub total_inputs: usize,
    pub workers: Vec<WorkerStatus>,
    pub final_output_exists: bool,
}

/// Inspect every worker's artifacts. Takes no locks and writes nothing, so it
/// is safe to run next to a live pipeline.
pub fn collect(config: &PipelineConfig) -> Result<StatusReport, PipelineError> {
    config.validate()?;
    let inputs = config.list_inputs()?;

    let mut workers = Vec::with_capacity(config.num_workers);
    for worker_id in 0..config.num_workers {
        let scope = Scope::Worker(worker_id);
        let range = partition(inputs.len(), config.num_workers, worker_id)?;
        let extraction = checkpoint::peek_extraction(&config.checkpoint_path(scope, EXTRACTION_CHECKPOINT))?;
        let published = config.worker_stats_path(worker_id);

        workers.push(WorkerStatus {
            worker_id,
            range,
            checkpoint_index: extraction.map(|p| p.next_index),
            checkpoint_records: extraction.map(|p| p.records),
            output_exists: config.output_path(scope, &Phase::Local.output_file()).exists(),
            stats_published: published.metadata().map(|m| m.len() > 0).unwrap_or(false),
        });
    }

    Ok(StatusReport {
        total_inputs: inputs.len(),
        workers,
        final_output_exists: config
            .output_path(Scope::Master, &Phase::Final.output_file())
            .exists(),
    })
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} input files across {} workers", self.total_inputs, self.workers.len())?;
        writeln!(f, "{:<10} {:>14} {:>12} {:>9}  state", "worker", "range", "checkpoint", "records")?;
        for w in &self.workers {
            let range = format!("[{}, {})", w.range.start, w.range.end);
            let index = w.checkpoint_index.map_or_else(|| "-".to_string(), |i| i.to_string());
            let records = w.checkpoint_records.map_or_else(|| "-".to_string(), |n| n.to_string());
            writeln!(
                f,
                "{:<10} {:>14} {:>12} {:>9}  {}",
                Scope::Worker(w.worker_id).to_string(),
                range,
                index,
                records,
                w.state()
            )?;
        }
        let final_state = if self.final_output_exists { "written" } else { "pending" };
        write!(f, "final output: {}", final_state)
    }
}
