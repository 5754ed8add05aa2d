pub mod aggregate;
pub mod barrier;
pub mod builtin;
pub mod checkpoint;
pub mod collaborator;
pub mod config;
pub mod error;
pub mod extraction;
pub mod file_lock;
pub mod logging;
pub mod partition;
pub mod pipeline;
pub mod record;
pub mod stage;
pub mod stats;
pub mod status;

pub use aggregate::{AggregateReport, Aggregator};
pub use barrier::{RendezvousBarrier, Sleeper, ThreadSleeper, publish_stats};
pub use collaborator::{Consolidator, Extractor, Phase, Stage};
pub use config::{BarrierConfig, PipelineConfig, Scope};
pub use error::*;
pub use partition::{PartitionRange, partition};
pub use pipeline::{RunSummary, WorkerPipeline, WorkerState};
pub use record::Record;
pub use stats::{ProcessingStats, StageTimings, StatsTable, WorkerStats};
