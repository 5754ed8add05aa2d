use crate::collaborator::{Consolidator, Phase};
use crate::config::{AGGREGATE_STATS_FILE, FINAL_STATS_FILE, PipelineConfig, Scope};
use crate::error::PipelineError;
use crate::record::{self, Record};
use crate::stage::{StageRunner, consolidate};
use crate::stats::{StageTimings, StatsTable, WorkerStats};
use std::path::PathBuf;
use tracing::info;

/// What the master produced from the union of all workers.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateReport {
    /// Worker rows followed by `mean`, `min` and `max`.
    pub table: StatsTable,
    pub final_timings: StageTimings,
    pub input_records: usize,
    pub final_records: usize,
    pub output_path: PathBuf,
}

/// Merges worker outputs and statistics once the barrier is satisfied.
pub struct Aggregator<'a, C: ?Sized> {
    config: &'a PipelineConfig,
    consolidator: &'a C,
}

impl<'a, C: ?Sized> Aggregator<'a, C> {
    pub fn new(config: &'a PipelineConfig, consolidator: &'a C) -> Self {
        Self {
            config,
            consolidator,
        }
    }

    /// Concatenate every worker's consolidated output in worker-id order.
    pub fn collect_records<R: Record>(&self) -> Result<Vec<R>, PipelineError> {
        info!(worker = %Scope::Master, "Extracting local records from worker outputs...");

        let mut records = Vec::new();
        for worker_id in 0..self.config.num_workers {
            let path = self
                .config
                .output_path(Scope::Worker(worker_id), &Phase::Local.output_file());
            let mut worker_records: Vec<R> = record::read_records(&path)?;
            info!(worker = %Scope::Master, "{} contributed {} records", Scope::Worker(worker_id), worker_records.len());
            records.append(&mut worker_records);
        }
        Ok(records)
    }

    /// Build the aggregate table, run final consolidation over the union and
    /// persist the final artifacts.
    pub fn run<R>(&self, worker_stats: &[WorkerStats]) -> Result<AggregateReport, PipelineError>
    where
        R: Record,
        C: Consolidator<R>,
    {
        let table = StatsTable::from_workers(worker_stats).with_summary();

        let records: Vec<R> = self.collect_records()?;
        let input_records = records.len();

        info!(worker = %Scope::Master, "Consolidating final records...");
        let runner = StageRunner::new(self.config, Scope::Master, Phase::Final);
        let (records, final_timings) = consolidate(&runner, self.consolidator, records)?;

        let output_path = self
            .config
            .output_path(Scope::Master, &Phase::Final.output_file());
        record::write_records(&output_path, &records)?;

        info!(worker = %Scope::Master, "Dumping statistics of final processing...");
        table.save(&self.config.stats_path(Scope::Master, AGGREGATE_STATS_FILE))?;
        final_timings
            .to_table(&Scope::Master.to_string())
            .save(&self.config.stats_path(Scope::Master, FINAL_STATS_FILE))?;

        info!(worker = %Scope::Master, input_records, final_records = records.len(), "FINISHED!");
        Ok(AggregateReport {
            table,
            final_timings,
            input_records,
            final_records: records.len(),
            output_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::stats::{ProcessingStats, SUMMARY_LABELS};

    struct Identity;

    impl Consolidator<String> for Identity {
        fn ground(&self, records: Vec<String>) -> Result<Vec<String>, CollaboratorError> {
            Ok(records)
        }

        fn map_sequence(&self, records: Vec<String>) -> Result<Vec<String>, CollaboratorError> {
            Ok(records)
        }

        fn preassemble(&self, mut records: Vec<String>) -> Result<Vec<String>, CollaboratorError> {
            records.sort();
            records.dedup();
            Ok(records)
        }
    }

    fn worker(worker_id: usize) -> WorkerStats {
        WorkerStats {
            worker_id,
            processing: ProcessingStats::from_durations(&[1.0]),
            consolidation: StageTimings::new(Phase::Local),
        }
    }

    #[test]
    fn test_run_merges_outputs_and_writes_artifacts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::under_base(0, 2, temp_dir.path());
        let local = Phase::Local.output_file();
        record::write_records(&config.output_path(Scope::Worker(0), &local), &["b".to_string(), "a".to_string()]).unwrap();
        record::write_records(&config.output_path(Scope::Worker(1), &local), &["a".to_string(), "c".to_string()]).unwrap();

        let report = Aggregator::new(&config, &Identity)
            .run::<String>(&[worker(1), worker(0)])
            .unwrap();

        assert_eq!(report.input_records, 4);
        assert_eq!(report.final_records, 3);
        let merged: Vec<String> = record::read_records(&report.output_path).unwrap();
        assert_eq!(merged, vec!["a", "b", "c"]);

        let labels: Vec<&str> = report.table.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels[..2], ["0", "1"]);
        assert_eq!(labels[2..], SUMMARY_LABELS);

        let master = |name: &str| config.stats_path(Scope::Master, name);
        assert_eq!(StatsTable::load(&master(AGGREGATE_STATS_FILE)).unwrap(), report.table);
        let final_table = StatsTable::load(&master(FINAL_STATS_FILE)).unwrap();
        assert_eq!(final_table.columns, StageTimings::column_names(Phase::Final));
        assert_eq!(final_table.rows[0].label, "MASTER");
    }

    #[test]
    fn test_missing_worker_output_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::under_base(0, 2, temp_dir.path());
        record::write_records(
            &config.output_path(Scope::Worker(0), &Phase::Local.output_file()),
            &["a".to_string()],
        )
        .unwrap();

        let result = Aggregator::new(&config, &Identity).run::<String>(&[worker(0), worker(1)]);
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }
}
