use crate::error::ConfigError;
use std::ops::Range;

/// Half-open slice `[start, end)` of the sorted input list owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionRange {
    pub start: usize,
    pub end: usize,
}

impl PartitionRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn indices(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Split `total` items across `num_workers` in contiguous chunks of
/// `ceil(total / num_workers)`. Trailing workers may receive an empty range.
pub fn partition(
    total: usize,
    num_workers: usize,
    worker_id: usize,
) -> Result<PartitionRange, ConfigError> {
    if num_workers == 0 {
        return Err(ConfigError::NoWorkers);
    }
    if worker_id >= num_workers {
        return Err(ConfigError::WorkerIdOutOfRange {
            worker_id,
            num_workers,
        });
    }

    let chunk = total.div_ceil(num_workers);
    let start = worker_id.saturating_mul(chunk).min(total);
    let end = (worker_id + 1).saturating_mul(chunk).min(total);

    Ok(PartitionRange { start, end })
}
