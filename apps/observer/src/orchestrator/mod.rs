/// Orchestrator module - wires the probe pipeline together
///
/// The orchestrator owns the primary handle of both queues and is the only
/// place that closes them. Startup runs sink → workers → schedulers, and
/// shutdown walks the same chain backwards, joining every stage before the
/// queue feeding the next one is closed:
///
/// cancel → join schedulers → close jobs → join workers → close results →
/// join sink → output closed


use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{self, Config};
use crate::error::ObserveError;
use crate::loader::DefinitionSource;
use crate::monitoring::queue::{self, QueueSender};
use crate::monitoring::{
    Clock, HttpTransport, Job, ProbeResult, Prober, Scheduler, Sink, SinkError, SinkStats, SystemClock, TickStats,
    Transport, WorkerPool, WorkerPoolHandle, WorkerStats,
};

/// Sizing knobs for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub workers: usize,
    pub job_queue_capacity: usize,
    pub result_queue_capacity: usize,
    pub drain_timeout: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&config::Pipeline::default())
    }
}

impl From<&config::Pipeline> for PipelineSettings {
    fn from(pipeline: &config::Pipeline) -> Self {
        Self {
            workers: pipeline.workers.max(1),
            job_queue_capacity: pipeline.job_queue_capacity.max(1),
            result_queue_capacity: pipeline.result_queue_capacity.max(1),
            drain_timeout: pipeline.drain_timeout(),
        }
    }
}

/// What happened during a run, summed over every stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub schedulers: usize,
    pub ticks: u64,
    pub dispatched: u64,
    pub probed: u64,
    pub persisted: u64,
    pub dropped: u64,
    pub failed_workers: usize,
}

/// Main orchestrator for the observer
pub struct Orchestrator {
    settings: PipelineSettings,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(settings: PipelineSettings, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        Self { settings, transport, clock }
    }

    /// Production wiring: HTTP transport and wall clock.
    pub fn from_config(config: &Config) -> Result<Self, ObserveError> {
        let transport = HttpTransport::new(config.pipeline.probe_timeout())?;
        Ok(Self::new(PipelineSettings::from(&config.pipeline), Arc::new(transport), Arc::new(SystemClock)))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Read the definitions file, then [`run`](Self::run) until `cancel` fires.
    pub async fn observe(
        &self,
        definitions: &Path,
        results: &Path,
        cancel: CancellationToken,
    ) -> Result<PipelineReport, ObserveError> {
        let source = DefinitionSource::read(definitions)?;
        self.run(&source, results, cancel).await
    }

    /// Run the pipeline until `cancel` fires and everything has drained.
    ///
    /// Only setup failures are returned. If the definitions do not parse, the
    /// already started stages are shut down before the error is returned.
    pub async fn run(
        &self,
        source: &DefinitionSource,
        results: &Path,
        cancel: CancellationToken,
    ) -> Result<PipelineReport, ObserveError> {
        let sink = Sink::open(results).await.map_err(|error| ObserveError::Results {
            path: results.to_path_buf(),
            source: match error {
                SinkError::Io(source) => source,
                other => std::io::Error::other(other),
            },
        })?;
        let sink = Arc::new(sink);
        info!(results = %results.display(), "results output opened");

        let (jobs, job_queue) = queue::bounded::<Job>(self.settings.job_queue_capacity);
        let (results_tx, result_queue) = queue::bounded::<ProbeResult>(self.settings.result_queue_capacity);

        let prober = Arc::new(Prober::new(Arc::clone(&self.transport), Arc::clone(&self.clock)));
        let pool = WorkerPool::new(self.settings.workers, prober, job_queue, results_tx.clone());

        let sink_task = tokio::spawn(Arc::clone(&sink).run(result_queue).instrument(info_span!("sink")));
        let workers = pool.spawn();
        info!(workers = workers.worker_count(), "workers started");

        let mut pipeline = RunningPipeline {
            schedulers: Vec::new(),
            jobs,
            workers,
            results: results_tx,
            sink,
            sink_task,
            drain_timeout: self.settings.drain_timeout,
        };

        let groups = match source.parse() {
            Ok(groups) => groups,
            Err(error) => {
                error!(origin = source.origin(), %error, "definitions rejected, stopping pipeline");
                pipeline.shutdown().await;
                return Err(error.into());
            }
        };

        for (interval, group) in groups {
            let span = info_span!("scheduler", tier = %humantime::format_duration(interval));
            let scheduler = Scheduler::new(interval, group, pipeline.jobs.clone());
            pipeline.schedulers.push(tokio::spawn(scheduler.run(cancel.clone()).instrument(span)));
        }
        info!(schedulers = pipeline.schedulers.len(), "pipeline running");

        cancel.cancelled().await;
        info!("cancellation received, shutting down pipeline");

        let report = pipeline.shutdown().await;
        info!(
            ticks = report.ticks,
            dispatched = report.dispatched,
            probed = report.probed,
            persisted = report.persisted,
            dropped = report.dropped,
            "pipeline stopped"
        );
        Ok(report)
    }
}

/// Handles to every started stage, in pipeline order.
struct RunningPipeline {
    schedulers: Vec<JoinHandle<TickStats>>,
    jobs: QueueSender<Job>,
    workers: WorkerPoolHandle,
    results: QueueSender<ProbeResult>,
    sink: Arc<Sink>,
    sink_task: JoinHandle<SinkStats>,
    drain_timeout: Option<Duration>,
}

impl RunningPipeline {
    /// Join each stage, then close the queue it was feeding.
    async fn shutdown(self) -> PipelineReport {
        let mut report = PipelineReport { schedulers: self.schedulers.len(), ..PipelineReport::default() };

        for outcome in join_all(self.schedulers).await {
            match outcome {
                Ok(stats) => {
                    report.ticks += stats.ticks;
                    report.dispatched += stats.enqueued;
                }
                Err(error) => error!(%error, "scheduler task failed"),
            }
        }
        debug!("schedulers joined, closing job queue");
        self.jobs.close();

        let WorkerStats { probed, failed } = match self.drain_timeout {
            Some(deadline) => self.workers.join_within(deadline).await,
            None => self.workers.join().await,
        };
        report.probed = probed;
        report.failed_workers = failed;
        debug!("workers joined, closing result queue");
        self.results.close();

        match self.sink_task.await {
            Ok(stats) => {
                report.persisted = stats.persisted;
                report.dropped = stats.dropped;
            }
            Err(error) => {
                error!(%error, "sink task failed");
                let stats = self.sink.stats();
                report.persisted = stats.persisted;
                report.dropped = stats.dropped;
            }
        }
        if !self.sink.is_closed().await {
            warn!("sink task ended without closing its output");
            self.sink.close().await;
        }

        report
    }
}
