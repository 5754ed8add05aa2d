use crate::checkpoint::parent_dir;
use crate::collaborator::{Phase, Stage};
use crate::error::PipelineError;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

pub const INDEX_COLUMN: &str = "worker_id";
pub const PROCESSING_MEAN: &str = "processing_mean_time";
pub const PROCESSING_TOTAL: &str = "processing_total_time";
pub const SUMMARY_LABELS: [&str; 3] = ["mean", "min", "max"];

/// Per-file extraction timings of one worker, in seconds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessingStats {
    /// Undefined when no file was processed successfully.
    pub mean: Option<f64>,
    pub total: f64,
}

impl ProcessingStats {
    pub fn from_durations(durations: &[f64]) -> Self {
        let total: f64 = durations.iter().sum();
        let mean = if durations.is_empty() {
            None
        } else {
            Some(total / durations.len() as f64)
        };
        Self { mean, total }
    }
}

/// Elapsed seconds of each consolidation sub-stage of one phase, in the
/// order they ran.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTimings {
    phase: Phase,
    entries: Vec<(Stage, f64)>,
}

impl StageTimings {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            entries: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Record `elapsed` for `stage`, replacing any earlier value.
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        self.set_secs(stage, elapsed.as_secs_f64());
    }

    fn set_secs(&mut self, stage: Stage, secs: f64) {
        match self.entries.iter_mut().find(|(s, _)| *s == stage) {
            Some(entry) => entry.1 = secs,
            None => self.entries.push((stage, secs)),
        }
    }

    pub fn get(&self, stage: Stage) -> Option<f64> {
        self.entries
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, secs)| *secs)
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, secs)| secs).sum()
    }

    /// Column names for this phase: one per stage followed by the total.
    pub fn column_names(phase: Phase) -> Vec<String> {
        let mut names: Vec<String> = Stage::ALL.iter().map(|s| phase.stage_key(*s)).collect();
        names.push(phase.total_key());
        names
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        let mut values: Vec<Option<f64>> = Stage::ALL.iter().map(|s| self.get(*s)).collect();
        values.push(Some(self.total()));
        values
    }

    /// Single-row table of these timings, labelled with `label`.
    pub fn to_table(&self, label: &str) -> StatsTable {
        let mut table = StatsTable::new(Self::column_names(self.phase));
        table.push_row(label, self.values());
        table
    }
}

/// Statistics a worker publishes on completion. Its file doubles as the
/// worker's completion marker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerStats {
    pub worker_id: usize,
    pub processing: ProcessingStats,
    pub consolidation: StageTimings,
}

impl WorkerStats {
    pub fn column_names() -> Vec<String> {
        let mut names = vec![PROCESSING_MEAN.to_string(), PROCESSING_TOTAL.to_string()];
        names.extend(StageTimings::column_names(Phase::Local));
        names
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        let mut values = vec![self.processing.mean, Some(self.processing.total)];
        values.extend(self.consolidation.values());
        values
    }

    pub fn to_table(&self) -> StatsTable {
        let mut table = StatsTable::new(Self::column_names());
        table.push_row(&self.worker_id.to_string(), self.values());
        table
    }

    /// Rebuild the stats of `worker_id` from a published table.
    pub fn from_table(table: &StatsTable, worker_id: usize, origin: &Path) -> Result<Self, PipelineError> {
        let label = worker_id.to_string();
        let row = match table.rows.as_slice() {
            [row] => row,
            rows => {
                return Err(PipelineError::stats(
                    origin,
                    format!("expected exactly one row, found {}", rows.len()),
                ));
            }
        };
        if row.label != label {
            return Err(PipelineError::stats(
                origin,
                format!("row belongs to worker {}, expected {}", row.label, label),
            ));
        }

        let cell = |name: &str| -> Result<Option<f64>, PipelineError> {
            table
                .column(name)
                .map(|idx| row.values[idx])
                .ok_or_else(|| PipelineError::stats(origin, format!("missing column {}", name)))
        };

        let mut consolidation = StageTimings::new(Phase::Local);
        for stage in Stage::ALL {
            if let Some(secs) = cell(&Phase::Local.stage_key(stage))? {
                consolidation.set_secs(stage, secs);
            }
        }

        Ok(Self {
            worker_id,
            processing: ProcessingStats {
                mean: cell(PROCESSING_MEAN)?,
                total: cell(PROCESSING_TOTAL)?.unwrap_or(0.0),
            },
            consolidation,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsRow {
    pub label: String,
    pub values: Vec<Option<f64>>,
}

/// Labelled table of optional numbers, stored as CSV. The label column comes
/// first and undefined cells are written empty.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsTable {
    pub columns: Vec<String>,
    pub rows: Vec<StatsRow>,
}

impl StatsTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// One row per worker, ordered by worker id.
    pub fn from_workers(workers: &[WorkerStats]) -> Self {
        let mut sorted: Vec<&WorkerStats> = workers.iter().collect();
        sorted.sort_by_key(|w| w.worker_id);

        let mut table = Self::new(WorkerStats::column_names());
        for worker in sorted {
            table.push_row(&worker.worker_id.to_string(), worker.values());
        }
        table
    }

    pub fn push_row(&mut self, label: &str, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.columns.len());
        self.rows.push(StatsRow {
            label: label.to_string(),
            values,
        });
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row(&self, label: &str) -> Option<&StatsRow> {
        self.rows.iter().find(|r| r.label == label)
    }

    /// Append `mean`, `min` and `max` rows computed column-wise over the rows
    /// present so far, skipping undefined cells.
    pub fn with_summary(mut self) -> Self {
        let width = self.columns.len();
        let mut mean = Vec::with_capacity(width);
        let mut min = Vec::with_capacity(width);
        let mut max = Vec::with_capacity(width);

        for idx in 0..width {
            let defined: Vec<f64> = self.rows.iter().filter_map(|r| r.values[idx]).collect();
            if defined.is_empty() {
                mean.push(None);
                min.push(None);
                max.push(None);
                continue;
            }
            mean.push(Some(defined.iter().sum::<f64>() / defined.len() as f64));
            min.push(defined.iter().copied().reduce(f64::min));
            max.push(defined.iter().copied().reduce(f64::max));
        }

        for (label, values) in SUMMARY_LABELS.into_iter().zip([mean, min, max]) {
            self.push_row(label, values);
        }
        self
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), PipelineError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        let mut header = vec![INDEX_COLUMN.to_string()];
        header.extend(self.columns.iter().cloned());
        csv_writer.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![row.label.clone()];
            record.extend(row.values.iter().map(|v| v.map(|x| x.to_string()).unwrap_or_default()));
            csv_writer.write_record(&record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: R, origin: &Path) -> Result<Self, PipelineError> {
        let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let mut fields = headers.iter();
        match fields.next() {
            Some(INDEX_COLUMN) => {}
            other => {
                return Err(PipelineError::stats(
                    origin,
                    format!("first column must be {}, found {:?}", INDEX_COLUMN, other),
                ));
            }
        }
        let mut table = Self::new(fields.map(str::to_string).collect());

        for result in csv_reader.records() {
            let record = result?;
            let mut cells = record.iter();
            let label = cells.next().unwrap_or_default().to_string();
            let values = cells
                .map(|cell| parse_cell(cell, origin))
                .collect::<Result<Vec<_>, _>>()?;
            table.push_row(&label, values);
        }
        Ok(table)
    }

    /// Replace `path` atomically with this table.
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let dir = parent_dir(path);
        fs::create_dir_all(dir)?;

        let mut temp = NamedTempFile::new_in(dir)?;
        self.write_to(temp.as_file_mut())?;
        temp.as_file().sync_all()?;
        temp.persist(path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        Self::read_from(File::open(path)?, path)
    }
}

fn parse_cell(cell: &str, origin: &Path) -> Result<Option<f64>, PipelineError> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|e| PipelineError::stats(origin, format!("bad number {:?}: {}", trimmed, e)))
}
