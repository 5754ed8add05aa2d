use crate::checkpoint::{self, ExtractionCheckpoint};
use crate::collaborator::Extractor;
use crate::config::{EXTRACTION_CHECKPOINT, PipelineConfig};
use crate::error::{ExtractError, PipelineError};
use crate::partition::{PartitionRange, partition};
use crate::record::Record;
use crate::stats::ProcessingStats;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

/// What the extraction state hands to consolidation.
#[derive(Debug)]
pub struct ExtractionOutcome<R> {
    pub range: PartitionRange,
    pub records: Vec<R>,
    pub processing: ProcessingStats,
    /// Files that failed and were skipped in this process.
    pub skipped: Vec<PathBuf>,
    /// Index the loop resumed from, when a checkpoint was found.
    pub resumed_from: Option<usize>,
}

fn progress(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (10_000.0 * done as f64 / total as f64).round() / 100.0
}

/// Extract records from this worker's slice of `inputs`, flushing a checkpoint
/// every `config.checkpoint_every` processed files.
///
/// A file the extractor rejects is logged and skipped. An unavailable engine
/// aborts the worker; progress since the last flush is lost.
pub fn extract_partition<R, E>(
    config: &PipelineConfig,
    extractor: &E,
    inputs: &[PathBuf],
) -> Result<ExtractionOutcome<R>, PipelineError>
where
    R: Record,
    E: Extractor<R> + ?Sized,
{
    let scope = config.scope();
    let range = partition(inputs.len(), config.num_workers, config.worker_id)?;
    let checkpoint_path = config.checkpoint_path(scope, EXTRACTION_CHECKPOINT);

    info!(worker = %scope, start = range.start, end = range.end, "Obtaining local records from {} input files", range.len());

    let mut state = match checkpoint::load::<ExtractionCheckpoint<R>>(&checkpoint_path)? {
        Some(state) => state,
        None => ExtractionCheckpoint::fresh(range.start),
    };

    // Checkpoints are trusted, but an index outside the range would not even
    // slice; keep it inside.
    let resume_at = state.next_index.clamp(range.start, range.end);
    if resume_at != state.next_index {
        warn!(worker = %scope, checkpoint_index = state.next_index, "Checkpoint index outside partition, clamping to {}", resume_at);
        state.next_index = resume_at;
    }
    let resumed_from = (resume_at > range.start).then_some(resume_at);
    if let Some(index) = resumed_from {
        info!(
            worker = %scope,
            records = state.records.len(),
            "Resuming work at {}% progress",
            progress(index - range.start, range.len())
        );
    }

    let mut skipped = Vec::new();
    let mut unflushed = false;

    for index in resume_at..range.end {
        let file = &inputs[index];
        info!(worker = %scope, "Processing article {}...", file.display());

        let started = Instant::now();
        match extractor.extract(file) {
            Ok(records) => {
                state.durations.push(started.elapsed().as_secs_f64());
                state.records.extend(records);
            }
            Err(ExtractError::EngineUnavailable(reason)) => {
                error!(worker = %scope, "Failed to obtain extraction engine: {}", reason);
                return Err(PipelineError::EngineUnavailable {
                    file: file.clone(),
                    reason,
                });
            }
            Err(ExtractError::FileFailed(reason)) => {
                error!(worker = %scope, "Failed to process file {}: {}", file.display(), reason);
                skipped.push(file.clone());
            }
        }

        state.next_index = index + 1;
        unflushed = true;

        let processed = index + 1 - range.start;
        if processed % config.checkpoint_every == 0 {
            info!(worker = %scope, "Saving progress to checkpoint...");
            checkpoint::persist(&checkpoint_path, &state)?;
            unflushed = false;
        }

        info!(
            worker = %scope,
            "Progress: {}/{} articles ({}%)",
            processed,
            range.len(),
            progress(processed, range.len())
        );
    }

    if unflushed {
        checkpoint::persist(&checkpoint_path, &state)?;
    }

    let processing = ProcessingStats::from_durations(&state.durations);
    Ok(ExtractionOutcome {
        range,
        records: state.records,
        processing,
        skipped,
        resumed_from,
    })
}
