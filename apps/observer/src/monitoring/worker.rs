use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info_span, warn};

use super::executor::Prober;
use super::queue::{QueueReceiver, QueueSender};
use super::types::{Job, ProbeResult};

/// Totals reported once every worker has exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Jobs probed and handed to the result queue
    pub probed: u64,
    /// Workers that panicked or were aborted
    pub failed: usize,
}

/// Fixed set of workers sharing one job queue.
pub struct WorkerPool {
    size: usize,
    prober: Arc<Prober>,
    jobs: QueueReceiver<Job>,
    results: QueueSender<ProbeResult>,
}

impl WorkerPool {
    /// A pool of `size` workers; a size of zero is bumped to one.
    pub fn new(size: usize, prober: Arc<Prober>, jobs: QueueReceiver<Job>, results: QueueSender<ProbeResult>) -> Self {
        Self { size: size.max(1), prober, jobs, results }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Start every worker on the current runtime.
    ///
    /// The pool's own queue handles are consumed here, so once the returned
    /// handle is joined no worker can touch either queue again.
    pub fn spawn(self) -> WorkerPoolHandle {
        let handles = (0..self.size)
            .map(|id| {
                let worker = Worker {
                    prober: Arc::clone(&self.prober),
                    jobs: self.jobs.clone(),
                    results: self.results.clone(),
                };
                tokio::spawn(worker.run().instrument(info_span!("worker", id)))
            })
            .collect();

        WorkerPoolHandle { handles }
    }
}

struct Worker {
    prober: Arc<Prober>,
    jobs: QueueReceiver<Job>,
    results: QueueSender<ProbeResult>,
}

impl Worker {
    async fn run(self) -> u64 {
        let mut probed = 0;

        while let Some(job) = self.jobs.recv().await {
            let result = self.prober.probe(&job).await;
            if self.results.send(result).await.is_err() {
                error!(location = %job.location, "result queue closed before worker finished");
                break;
            }
            probed += 1;
        }

        debug!(probed, "job queue closed, worker exiting");
        probed
    }
}

/// Join barrier over the running workers.
#[derive(Debug)]
pub struct WorkerPoolHandle {
    handles: Vec<JoinHandle<u64>>,
}

impl WorkerPoolHandle {
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker. Only returns once the job queue has been closed
    /// and drained.
    pub async fn join(self) -> WorkerStats {
        collect(join_all(self.handles).await)
    }

    /// Like [`join`](Self::join) but aborts workers still running after
    /// `deadline`. Jobs still queued at that point are dropped.
    pub async fn join_within(self, deadline: Duration) -> WorkerStats {
        let aborts: Vec<_> = self.handles.iter().map(JoinHandle::abort_handle).collect();
        let pending = join_all(self.handles);
        tokio::pin!(pending);

        match tokio::time::timeout(deadline, pending.as_mut()).await {
            Ok(outcomes) => collect(outcomes),
            Err(_) => {
                warn!(deadline = ?deadline, "workers did not drain in time, aborting the rest");
                for abort in &aborts {
                    abort.abort();
                }
                collect(pending.await)
            }
        }
    }
}

fn collect(outcomes: Vec<Result<u64, tokio::task::JoinError>>) -> WorkerStats {
    let mut stats = WorkerStats::default();
    for outcome in outcomes {
        match outcome {
            Ok(probed) => stats.probed += probed,
            Err(error) if error.is_cancelled() => stats.failed += 1,
            Err(error) => {
                error!(%error, "worker panicked");
                stats.failed += 1;
            }
        }
    }
    stats
}
