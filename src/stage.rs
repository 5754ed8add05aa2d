use crate::checkpoint::{self, Memo};
use crate::collaborator::{Consolidator, Phase, Stage};
use crate::config::{PipelineConfig, Scope};
use crate::error::{CollaboratorError, PipelineError};
use crate::record::Record;
use crate::stats::StageTimings;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Result of running one stage.
#[derive(Debug)]
pub struct StageOutcome<R> {
    pub output: Vec<R>,
    /// Wall-clock time of this invocation, near zero on a checkpoint hit.
    pub elapsed: Duration,
    pub restored: bool,
}

/// Runs consolidation sub-stages of one phase behind per-stage checkpoints.
pub struct StageRunner<'a> {
    config: &'a PipelineConfig,
    scope: Scope,
    phase: Phase,
}

impl<'a> StageRunner<'a> {
    pub fn new(config: &'a PipelineConfig, scope: Scope, phase: Phase) -> Self {
        Self {
            config,
            scope,
            phase,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn checkpoint_path(&self, stage: Stage) -> PathBuf {
        let name = format!("{}.bin", self.phase.stage_key(stage));
        self.config.checkpoint_path(self.scope, &name)
    }

    /// Run `stage_fn` over `input` unless its checkpoint already holds the
    /// output. Freshly computed output is persisted once, inside the timed
    /// window.
    #[tracing::instrument(level = "debug", skip_all, fields(worker = %self.scope, stage = %stage))]
    pub fn run<R, F>(&self, stage: Stage, input: Vec<R>, stage_fn: F) -> Result<StageOutcome<R>, PipelineError>
    where
        R: Record,
        F: FnOnce(Vec<R>) -> Result<Vec<R>, CollaboratorError>,
    {
        let path = self.checkpoint_path(stage);
        let started = Instant::now();

        let memo = checkpoint::load_or_compute(&path, || {
            stage_fn(input).map_err(|source| PipelineError::Stage {
                stage: self.phase.stage_key(stage),
                source,
            })
        })?;

        let restored = memo.is_restored();
        let output = match memo {
            Memo::Restored(output) => {
                info!(worker = %self.scope, stage = %stage, "Restored {} records from checkpoint", output.len());
                output
            }
            Memo::Computed(output) => {
                checkpoint::persist(&path, &output)?;
                output
            }
        };
        let elapsed = started.elapsed();

        debug!(records = output.len(), ?elapsed, restored, "stage finished");
        Ok(StageOutcome {
            output,
            elapsed,
            restored,
        })
    }
}

/// Apply grounding, sequence-mapping and preassembly in that order, each
/// consuming the previous stage's output.
pub fn consolidate<R, C>(
    runner: &StageRunner<'_>,
    consolidator: &C,
    records: Vec<R>,
) -> Result<(Vec<R>, StageTimings), PipelineError>
where
    R: Record,
    C: Consolidator<R> + ?Sized,
{
    let mut timings = StageTimings::new(runner.phase());
    let mut records = records;

    for stage in Stage::ALL {
        let outcome = runner.run(stage, records, |input| stage.apply(consolidator, input))?;
        timings.record(stage, outcome.elapsed);
        records = outcome.output;
    }

    Ok((records, timings))
}
