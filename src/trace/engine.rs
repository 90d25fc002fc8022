use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::error::ProbeError;
use crate::lookup::Locator;
use crate::probe::{ProbeReply, Prober};
use crate::state::{ProbeOutcome, Session};
use crate::tui::{Banner, Frame, TerminalSink, paint};

/// Extra time a probe task gets beyond its own timeout before it is abandoned
pub const PROBE_GRACE: Duration = Duration::from_millis(500);

/// Drives rounds of probes and refreshes the table after each one
///
/// Every round probes hops `1..=active_hops` in parallel, waits for all of
/// them, folds the outcomes into the session and then repaints. In
/// sequential mode the hops are probed one after another instead and the
/// round ends early at the target. The session is only touched here, between
/// rounds.
pub struct RoundDriver<P, L, S> {
    prober: Arc<P>,
    session: Session,
    locator: L,
    sink: S,
    banner: Banner,
    next_row: u16,
}

impl<P, L, S> RoundDriver<P, L, S>
where
    P: Prober + 'static,
    L: Locator,
    S: TerminalSink,
{
    pub fn new(prober: P, session: Session, locator: L, sink: S) -> Self {
        let banner = Banner::new(&session, &locator);
        Self {
            prober: Arc::new(prober),
            session,
            locator,
            sink,
            banner,
            next_row: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Row just below the last painted line
    pub fn next_row(&self) -> u16 {
        self.next_row
    }

    /// Probe every active hop once and apply the results.
    ///
    /// Returns the converged distance if the target was reached for the first
    /// time this round. Probe failures count as losses; in strict mode a
    /// malformed reply address ends the run instead.
    pub async fn run_round(&mut self) -> Result<Option<u8>, ProbeError> {
        let outcomes = if self.session.config.sequential {
            self.probe_sequential().await?
        } else {
            self.probe_concurrent().await?
        };

        let converged = self.session.apply_round(&outcomes);
        if let Some(hop) = converged {
            tracing::info!(
                hop,
                addr = %self.session.target.resolved,
                round = self.session.round(),
                "target reached, hop count frozen"
            );
        }
        Ok(converged)
    }

    async fn probe_concurrent(&self) -> Result<Vec<ProbeOutcome>, ProbeError> {
        let handles: Vec<(u8, JoinHandle<Result<ProbeReply, ProbeError>>)> = (1..=self
            .session
            .active_hops())
            .map(|ttl| (ttl, self.spawn_probe(ttl)))
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (ttl, handle) in handles {
            outcomes.push(self.settle(ttl, handle.await)?);
        }
        Ok(outcomes)
    }

    /// One hop at a time, stopping once the target answers
    async fn probe_sequential(&self) -> Result<Vec<ProbeOutcome>, ProbeError> {
        let target = self.session.target.resolved;
        let mut outcomes = Vec::new();
        for ttl in 1..=self.session.active_hops() {
            let outcome = self.settle(ttl, self.spawn_probe(ttl).await)?;
            let reached = outcome.responder == Some(target);
            outcomes.push(outcome);
            if reached {
                break;
            }
        }
        Ok(outcomes)
    }

    /// Run one probe on its own task, bounded by the timeout plus grace
    fn spawn_probe(&self, ttl: u8) -> JoinHandle<Result<ProbeReply, ProbeError>> {
        let prober = Arc::clone(&self.prober);
        let target = self.session.target.resolved;
        let timeout = self.session.config.timeout;
        let deadline = timeout + PROBE_GRACE;

        tokio::spawn(async move {
            match tokio::time::timeout(deadline, prober.probe(target, ttl, timeout)).await {
                Ok(result) => result,
                Err(_) => Ok(ProbeReply::no_reply(deadline)),
            }
        })
    }

    /// Turn a finished probe task into an outcome, or the strict-mode error
    fn settle(
        &self,
        ttl: u8,
        joined: Result<Result<ProbeReply, ProbeError>, JoinError>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let timeout = self.session.config.timeout;
        match joined {
            Ok(Ok(reply)) => Ok(into_outcome(ttl, reply)),
            Ok(Err(e)) if self.session.config.strict && e.is_fatal_when_strict() => {
                tracing::error!(hop = ttl, error = %e, "malformed reply in strict mode");
                Err(e)
            }
            Ok(Err(e)) => {
                tracing::debug!(hop = ttl, error = %e, "probe failed");
                Ok(ProbeOutcome::lost(ttl, timeout))
            }
            Err(e) => {
                tracing::debug!(hop = ttl, error = %e, "probe task aborted");
                Ok(ProbeOutcome::lost(ttl, timeout))
            }
        }
    }

    /// Repaint the whole table from the current session
    pub fn render(&mut self) -> std::io::Result<()> {
        let frame = Frame::build(&self.session, &self.locator);
        self.next_row = paint(&mut self.sink, &self.banner, &frame)?;
        Ok(())
    }

    /// Run a fixed number of rounds at the configured cadence
    pub async fn run_rounds(&mut self, rounds: u64) -> Result<()> {
        self.render().context("Failed to draw table")?;
        for _ in 0..rounds {
            self.step().await?;
        }
        Ok(())
    }

    /// Run until the task is dropped or a fatal error occurs
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(
            addr = %self.session.target.resolved,
            prober = self.prober.name(),
            max_hops = self.session.max_hops(),
            "monitoring started"
        );
        self.render().context("Failed to draw table")?;
        loop {
            self.step().await?;
        }
    }

    async fn step(&mut self) -> Result<()> {
        let started = Instant::now();
        self.run_round()
            .await
            .with_context(|| format!("Probing {} failed", self.session.target.original))?;
        self.render().context("Failed to draw table")?;

        if let Some(pause) = pause_after(started.elapsed(), self.session.config.interval) {
            tokio::time::sleep(pause).await;
        }
        Ok(())
    }
}

fn into_outcome(hop: u8, reply: ProbeReply) -> ProbeOutcome {
    ProbeOutcome {
        hop,
        responder: reply.responder,
        rtt: reply.rtt,
        succeeded: reply.succeeded,
    }
}

/// Time left to wait before the next round, `None` if it should start now.
///
/// Overruns are not carried into the next interval.
pub fn pause_after(elapsed: Duration, interval: Duration) -> Option<Duration> {
    interval.checked_sub(elapsed).filter(|d| !d.is_zero())
}
