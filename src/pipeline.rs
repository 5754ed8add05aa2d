use crate::aggregate::{AggregateReport, Aggregator};
use crate::barrier::{RendezvousBarrier, Sleeper, ThreadSleeper, publish_stats};
use crate::collaborator::{Consolidator, Extractor, Phase};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::extraction::extract_partition;
use crate::record::{self, Record};
use crate::stage::{StageRunner, consolidate};
use crate::stats::WorkerStats;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::info;

/// States a worker moves through. Only the master visits `BarrierWait` and
/// `Aggregating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Extracting,
    Consolidating,
    StatsDumped,
    BarrierWait,
    Aggregating,
    Done,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Extracting => "EXTRACTING",
            WorkerState::Consolidating => "CONSOLIDATING",
            WorkerState::StatsDumped => "STATS_DUMPED",
            WorkerState::BarrierWait => "BARRIER_WAIT",
            WorkerState::Aggregating => "AGGREGATING",
            WorkerState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// What one worker process accomplished.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub stats: WorkerStats,
    pub output_records: usize,
    /// Input index extraction picked up from, when a checkpoint was found.
    pub resumed_from: Option<usize>,
    /// Present on the master only.
    pub aggregate: Option<AggregateReport>,
}

/// Full per-worker sequence: extract, consolidate, publish, and on the master,
/// rendezvous and aggregate.
pub struct WorkerPipeline<'a, R, E, C, S = ThreadSleeper> {
    config: &'a PipelineConfig,
    extractor: E,
    consolidator: C,
    sleeper: S,
    _record: PhantomData<fn() -> R>,
}

impl<'a, R, E, C> WorkerPipeline<'a, R, E, C, ThreadSleeper>
where
    R: Record,
    E: Extractor<R>,
    C: Consolidator<R>,
{
    pub fn new(config: &'a PipelineConfig, extractor: E, consolidator: C) -> Self {
        Self::with_sleeper(config, extractor, consolidator, ThreadSleeper)
    }
}

impl<'a, R, E, C, S> WorkerPipeline<'a, R, E, C, S>
where
    R: Record,
    E: Extractor<R>,
    C: Consolidator<R>,
    S: Sleeper,
{
    pub fn with_sleeper(config: &'a PipelineConfig, extractor: E, consolidator: C, sleeper: S) -> Self {
        Self {
            config,
            extractor,
            consolidator,
            sleeper,
            _record: PhantomData,
        }
    }

    fn enter(&self, state: WorkerState) {
        info!(worker = %self.config.scope(), %state, "Entering {}", state);
    }

    pub fn run(&self) -> Result<RunSummary, PipelineError> {
        self.config.validate()?;
        let scope = self.config.scope();

        self.enter(WorkerState::Extracting);
        let inputs = self.config.list_inputs()?;
        let extraction = extract_partition(self.config, &self.extractor, &inputs)?;
        if !extraction.skipped.is_empty() {
            info!(worker = %scope, "Skipped {} files that failed extraction", extraction.skipped.len());
        }

        self.enter(WorkerState::Consolidating);
        info!(worker = %scope, "Consolidating local records...");
        let runner = StageRunner::new(self.config, scope, Phase::Local);
        let (records, consolidation) = consolidate(&runner, &self.consolidator, extraction.records)?;
        record::write_records(
            &self.config.output_path(scope, &Phase::Local.output_file()),
            &records,
        )?;

        info!(worker = %scope, "Dumping statistics of local processing...");
        let stats = WorkerStats {
            worker_id: self.config.worker_id,
            processing: extraction.processing,
            consolidation,
        };
        publish_stats(self.config, &stats)?;
        self.enter(WorkerState::StatsDumped);
        info!(worker = %scope, "FINISHED!");

        let aggregate = if self.config.is_master() {
            Some(self.run_master(stats.clone())?)
        } else {
            None
        };

        self.enter(WorkerState::Done);
        Ok(RunSummary {
            stats,
            output_records: records.len(),
            resumed_from: extraction.resumed_from,
            aggregate,
        })
    }

    fn run_master(&self, own: WorkerStats) -> Result<AggregateReport, PipelineError> {
        self.enter(WorkerState::BarrierWait);
        let barrier = RendezvousBarrier::with_sleeper(self.config, |d: Duration| self.sleeper.sleep(d));
        let all_stats = barrier.wait(own)?;

        self.enter(WorkerState::Aggregating);
        Aggregator::new(self.config, &self.consolidator).run::<R>(&all_stats)
    }
}
