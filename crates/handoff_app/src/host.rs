//! The session host.
//!
//! Runs the ownership arbiter, keeps the buffered log of hold, release and
//! ownership messages, and answers every `Join` with a replay of that log
//! addressed to the joiner.

use std::time::Duration;

use handoff_core::{ArbiterService, OwnershipArbiter, OwnershipPolicy};
use handoff_ids::ParticipantId;
use handoff_net::{Broadcast, BufferedLog, NetError, Payload};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// What one pump did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub received: usize,
    pub requests: usize,
    pub recorded: usize,
    pub replays: Vec<ParticipantId>,
}

/// Arbiter plus buffered log over one endpoint.
pub struct SessionHost<B: Broadcast> {
    service: ArbiterService<B>,
    log: BufferedLog,
}

impl<B: Broadcast> SessionHost<B> {
    /// Host on `endpoint`. Objects the arbiter has not seen are treated as
    /// scene-owned.
    pub fn new(endpoint: B, policy: OwnershipPolicy) -> Self {
        let arbiter = OwnershipArbiter::new(policy).with_auto_register(true);
        Self {
            service: ArbiterService::new(arbiter, endpoint),
            log: BufferedLog::new(),
        }
    }

    #[must_use]
    pub fn arbiter(&self) -> &OwnershipArbiter {
        self.service.arbiter()
    }

    #[must_use]
    pub fn log(&self) -> &BufferedLog {
        &self.log
    }

    /// Drain the endpoint once.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if publishing an outcome or a replay fails.
    pub fn pump(&mut self) -> Result<PumpReport, NetError> {
        let received = self.service.endpoint_mut().drain();
        let mut report = PumpReport {
            received: received.len(),
            ..PumpReport::default()
        };

        for envelope in &received {
            if self.log.record(envelope) {
                report.recorded += 1;
            }
            match envelope.payload {
                Payload::Join { participant } => {
                    let envelopes = self.log.replay();
                    debug!(%participant, replayed = envelopes.len(), "replaying log");
                    self.service.endpoint_mut().publish(Payload::Replay {
                        participant,
                        envelopes,
                    })?;
                    report.replays.push(participant);
                }
                Payload::OwnershipRequest { .. } => {
                    if self.service.handle(envelope)? {
                        report.requests += 1;
                    }
                }
                _ => {}
            }
        }
        Ok(report)
    }

    /// Pump at a fixed rate until `shutdown` resolves.
    pub async fn run(&mut self, interval: Duration, shutdown: impl std::future::Future<Output = ()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(?interval, "session host running");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.pump() {
                        warn!(%err, "pump failed");
                    }
                }
                () = &mut shutdown => break,
            }
        }
        info!(buffered = self.log.len(), "session host stopped");
    }
}
