use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::queue::{QueueSender, SendOutcome};
use super::types::Job;

/// Counters reported by a scheduler once it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Ticks whose whole job list was enqueued
    pub ticks: u64,
    /// Jobs enqueued, partial ticks included
    pub enqueued: u64,
}

/// Feeds one frequency tier into the job queue.
pub struct Scheduler {
    interval: Duration,
    jobs: Vec<Job>,
    queue: QueueSender<Job>,
}

impl Scheduler {
    /// Create a scheduler for one tier.
    ///
    /// # Panics
    ///
    /// `run` panics if `interval` is zero; the loader never produces one.
    pub fn new(interval: Duration, jobs: Vec<Job>, queue: QueueSender<Job>) -> Self {
        Self { interval, jobs, queue }
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<TickStats> {
        tokio::spawn(self.run(cancel))
    }

    /// Enqueue the tier's jobs every interval until `cancel` fires.
    ///
    /// The first tick comes one full interval after start. A full queue holds
    /// the tick back and later ticks are delayed rather than bunched up.
    pub async fn run(self, cancel: CancellationToken) -> TickStats {
        let mut stats = TickStats::default();
        let mut timer = interval_at(Instant::now() + self.interval, self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.interval, jobs = self.jobs.len(), "scheduler started");

        'ticks: loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            for job in &self.jobs {
                match self.queue.send_or_cancel(job.clone(), &cancel).await {
                    SendOutcome::Sent => stats.enqueued += 1,
                    SendOutcome::Cancelled(_) => {
                        debug!("cancelled during tick flush");
                        break 'ticks;
                    }
                    SendOutcome::Closed(job) => {
                        error!(location = %job.location, "job queue closed while scheduler was running");
                        break 'ticks;
                    }
                }
            }

            stats.ticks += 1;
            debug!(tick = stats.ticks, jobs = self.jobs.len(), "tick flushed");
        }

        info!(ticks = stats.ticks, enqueued = stats.enqueued, "scheduler stopped");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::queue::bounded;
    use reqwest::Method;
    use url::Url;

    fn jobs(count: usize) -> Vec<Job> {
        (0..count)
            .map(|i| Job::new(Url::parse(&format!("https://host{i}.example/")).unwrap(), Method::GET))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_tick_enqueues_group_in_order() {
        let (tx, rx) = bounded(16);
        let group = jobs(3);
        let cancel = CancellationToken::new();
        let handle = Scheduler::new(Duration::from_secs(1), group.clone(), tx).spawn(cancel.clone());

        for expected in &group {
            let job = rx.recv().await.unwrap();
            assert_eq!(&job, expected);
        }

        cancel.cancel();
        let stats = handle.await.unwrap();
        assert_eq!(stats, TickStats { ticks: 1, enqueued: 3 });

        // Scheduler held the only sender.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_is_enqueued_before_first_interval() {
        let (tx, rx) = bounded(4);
        let cancel = CancellationToken::new();
        let handle = Scheduler::new(Duration::from_secs(10), jobs(2), tx).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(9)).await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), TickStats::default());
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_applies_backpressure_and_cancel_still_stops() {
        let (tx, rx) = bounded(2);
        let cancel = CancellationToken::new();
        let handle = Scheduler::new(Duration::from_secs(1), jobs(5), tx).spawn(cancel.clone());

        // Nobody consumes: the first tick blocks after two jobs.
        tokio::time::sleep(Duration::from_secs(30)).await;
        cancel.cancel();

        let stats = handle.await.unwrap();
        assert_eq!(stats, TickStats { ticks: 0, enqueued: 2 });

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_ticks_resend_whole_group() {
        let (tx, rx) = bounded(64);
        let cancel = CancellationToken::new();
        let handle = Scheduler::new(Duration::from_secs(2), jobs(2), tx).spawn(cancel.clone());

        let mut received = Vec::new();
        for _ in 0..6 {
            received.push(rx.recv().await.unwrap().location.to_string());
        }
        cancel.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(stats.ticks, 3);
        assert_eq!(
            received,
            vec![
                "https://host0.example/",
                "https://host1.example/",
                "https://host0.example/",
                "https://host1.example/",
                "https://host0.example/",
                "https://host1.example/",
            ]
        );
    }
}
