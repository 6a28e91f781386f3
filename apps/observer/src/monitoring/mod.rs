/// Probe pipeline building blocks
///
/// This module is responsible for:
/// - Moving jobs and results between stages over bounded queues
/// - Scheduling each frequency tier onto the job queue
/// - Executing probes through a fixed worker pool
/// - Persisting results in append-only JSON Lines
pub mod checker;
pub mod clock;
pub mod executor;
pub mod queue;
pub mod scheduler;
pub mod sink;
pub mod types;
pub mod worker;

pub use checker::{HttpTransport, Transport, TransportError};
pub use clock::{Clock, FixedClock, SystemClock};
pub use executor::Prober;
pub use scheduler::{Scheduler, TickStats};
pub use sink::{Sink, SinkError, SinkStats};
pub use types::{FrequencyGroups, Job, ProbeResult};
pub use worker::{WorkerPool, WorkerPoolHandle, WorkerStats};
