use crate::config::{PipelineConfig, Scope};
use crate::error::PipelineError;
use crate::file_lock::FileLock;
use crate::stats::{StatsTable, WorkerStats};
use fixedbitset::FixedBitSet;
use itertools::Itertools;
use std::fs;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Pause between polling rounds. Injected so tests can drive the barrier
/// without real sleeps.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

impl<F: Fn(Duration)> Sleeper for F {
    fn sleep(&self, duration: Duration) {
        self(duration)
    }
}

/// Publish a worker's stats under its advisory lock. The master never reads
/// the file while this holds the lock.
pub fn publish_stats(config: &PipelineConfig, stats: &WorkerStats) -> Result<(), PipelineError> {
    let lock = FileLock::acquire(&config.worker_lock_path(stats.worker_id))?;
    debug!(lock = %lock.path().display(), "publishing statistics");
    stats.to_table().save(&config.worker_stats_path(stats.worker_id))?;
    drop(lock);
    Ok(())
}

/// Master-side polling until every worker has published its completion
/// marker.
pub struct RendezvousBarrier<'a, S = ThreadSleeper> {
    config: &'a PipelineConfig,
    sleeper: S,
}

impl<'a> RendezvousBarrier<'a, ThreadSleeper> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self::with_sleeper(config, ThreadSleeper)
    }
}

impl<'a, S: Sleeper> RendezvousBarrier<'a, S> {
    pub fn with_sleeper(config: &'a PipelineConfig, sleeper: S) -> Self {
        Self { config, sleeper }
    }

    /// Block until all workers are done and return their stats ordered by
    /// worker id. `own` is the caller's stats, which count as done already.
    ///
    /// Without `max_wait` this only returns once every worker has finished: a
    /// worker that died before publishing keeps the master polling.
    pub fn wait(&self, own: WorkerStats) -> Result<Vec<WorkerStats>, PipelineError> {
        let num_workers = self.config.num_workers;
        let policy = &self.config.barrier;

        let own_id = own.worker_id;
        let mut done = FixedBitSet::with_capacity(num_workers);
        let mut collected: Vec<Option<WorkerStats>> = vec![None; num_workers];
        done.insert(own_id);
        collected[own_id] = Some(own);

        // The caller's marker is never polled, so its lock is retired here like
        // every peer's lock is after collection.
        FileLock::acquire(&self.config.worker_lock_path(own_id))?.release_and_remove()?;

        let mut waited = Duration::ZERO;
        loop {
            let pending: Vec<usize> = done.zeroes().collect();
            for worker_id in pending {
                if let Some(stats) = self.try_collect(worker_id)? {
                    info!(worker = %Scope::Master, "Collected statistics of {}", Scope::Worker(worker_id));
                    done.insert(worker_id);
                    collected[worker_id] = Some(stats);
                }
            }

            let stragglers: Vec<usize> = done.zeroes().collect();
            if stragglers.is_empty() {
                break;
            }

            info!(worker = %Scope::Master, "Waiting for {} workers to finish...", stragglers.len());
            info!(worker = %Scope::Master, "Stragglers: [{}]", stragglers.iter().join(", "));

            if let Some(max_wait) = policy.max_wait {
                if waited >= max_wait {
                    return Err(PipelineError::BarrierTimeout {
                        pending: stragglers,
                        waited,
                    });
                }
            }
            self.sleeper.sleep(policy.poll_interval);
            waited += policy.poll_interval;
        }

        Ok(collected.into_iter().flatten().collect())
    }

    /// One attempt at reading a worker's completion marker. `None` means the
    /// worker is still writing or has not published yet.
    fn try_collect(&self, worker_id: usize) -> Result<Option<WorkerStats>, PipelineError> {
        let lock_path = self.config.worker_lock_path(worker_id);
        let Some(lock) = FileLock::try_acquire(&lock_path, self.config.barrier.lock_timeout)? else {
            debug!(worker_id, "lock held by writer, retrying next round");
            return Ok(None);
        };

        let stats_path = self.config.worker_stats_path(worker_id);
        let published = fs::metadata(&stats_path).map(|m| m.len() > 0).unwrap_or(false);
        if !published {
            return Ok(None);
        }

        let table = StatsTable::load(&stats_path)?;
        let stats = WorkerStats::from_table(&table, worker_id, &stats_path)?;

        // Nobody reads this worker's marker again.
        lock.release_and_remove()?;
        Ok(Some(stats))
    }
}
