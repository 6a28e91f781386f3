use std::sync::Arc;

use reqwest::Request;
use tracing::debug;

use super::checker::Transport;
use super::clock::Clock;
use super::types::{Job, ProbeResult};

/// Turns a job into a result through the injected transport and clock
pub struct Prober {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl Prober {
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        Self { transport, clock }
    }

    /// Probe `job` once. Transport failures are folded into an unreachable
    /// result; this never fails.
    pub async fn probe(&self, job: &Job) -> ProbeResult {
        let request = Request::new(job.method.clone(), job.location.clone());

        match self.transport.execute(request).await {
            Ok(status) => {
                debug!(location = %job.location, status, "probe answered");
                ProbeResult::reachable(job.location.clone(), status, self.clock.now())
            }
            Err(error) => {
                debug!(location = %job.location, error = %format_args!("{error:#}"), "probe unreachable");
                ProbeResult::unreachable(job.location.clone(), self.clock.now())
            }
        }
    }
}
