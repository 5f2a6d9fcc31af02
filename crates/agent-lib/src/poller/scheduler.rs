//! Periodic scheduling of poll cycles
//!
//! Runs one fixed-rate loop per endpoint. Every tick is spawned as its own
//! task so a tick that outlives the period is seen by the next one as an
//! overrun instead of delaying the schedule.

use super::engine::{PollCycleEngine, TickOutcome};
use crate::observability::AgentMetrics;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Drives the poll cycle engines of every monitored endpoint
pub struct PollScheduler {
    engines: Vec<Arc<PollCycleEngine>>,
    period: Duration,
}

impl PollScheduler {
    pub fn new(engines: Vec<Arc<PollCycleEngine>>, period: Duration) -> Self {
        Self { engines, period }
    }

    /// Run until shutdown is signalled, then wait for in-flight ticks
    pub async fn run(self, shutdown: broadcast::Receiver<()>) {
        info!(
            endpoints = self.engines.len(),
            period_secs = self.period.as_secs(),
            "Starting poll scheduler"
        );
        AgentMetrics::new().set_endpoints_monitored(self.engines.len());

        let mut loops = JoinSet::new();
        for engine in self.engines {
            loops.spawn(run_endpoint(engine, self.period, shutdown.resubscribe()));
        }

        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Endpoint loop terminated abnormally");
            }
        }

        info!("Poll scheduler stopped");
    }
}

/// Fixed-rate ticker; ticks missed during a stall are dropped, not burst
pub(super) fn endpoint_ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn run_endpoint(
    engine: Arc<PollCycleEngine>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = endpoint_ticker(period);
    let mut in_flight: JoinSet<TickOutcome> = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if engine.is_disabled() {
                    break;
                }
                let engine = engine.clone();
                in_flight.spawn(async move { engine.tick().await });
            }
            Some(done) = in_flight.join_next() => {
                match done {
                    Ok(TickOutcome::Disabled) => break,
                    Ok(TickOutcome::Completed(report)) => {
                        debug!(
                            endpoint = %engine.name(),
                            objects = report.objects,
                            measurements = report.measurements,
                            delivered = report.delivered,
                            "Poll cycle complete"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!(endpoint = %engine.name(), error = %e, "Poll task panicked"),
                }
            }
            _ = shutdown.recv() => {
                info!(endpoint = %engine.name(), "Shutting down poll loop");
                break;
            }
        }
    }

    while let Some(done) = in_flight.join_next().await {
        if let Err(e) = done {
            warn!(endpoint = %engine.name(), error = %e, "Poll task panicked");
        }
    }
    debug!(endpoint = %engine.name(), "Poll loop drained");
}

/// Builder for creating the poll scheduler
pub struct PollSchedulerBuilder {
    engines: Vec<Arc<PollCycleEngine>>,
    period: Duration,
}

impl PollSchedulerBuilder {
    /// Create a new builder with the default 20 second period
    pub fn new() -> Self {
        Self {
            engines: Vec::new(),
            period: Duration::from_secs(20),
        }
    }

    /// Add an endpoint engine
    pub fn engine(mut self, engine: Arc<PollCycleEngine>) -> Self {
        self.engines.push(engine);
        self
    }

    /// Set the tick period
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Build the scheduler
    pub fn build(self) -> Result<PollScheduler> {
        if self.engines.is_empty() {
            anyhow::bail!("At least one endpoint engine is required");
        }
        if self.period.is_zero() {
            anyhow::bail!("Poll period must be greater than zero");
        }

        Ok(PollScheduler::new(self.engines, self.period))
    }
}

impl Default for PollSchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
