use std::net::IpAddr;

use crate::config::Config;
use crate::state::hop::{HopRecord, ProbeOutcome};

/// Target being monitored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Name as given on the command line
    pub original: String,
    pub resolved: IpAddr,
}

impl Target {
    pub fn new(original: String, resolved: IpAddr) -> Self {
        Self { original, resolved }
    }
}

/// Hop-count discovery state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Target not yet seen; the full hop range is probed
    Discovering,
    /// Target replied at `hop`; the hop count is frozen
    Converged { hop: u8 },
}

/// A monitoring session against one target
///
/// Owned and mutated by the round driver only.
#[derive(Debug, Clone)]
pub struct Session {
    pub target: Target,
    pub config: Config,
    phase: Phase,
    hops: Vec<HopRecord>,
    round: u64,
}

impl Session {
    pub fn new(target: Target, config: Config) -> Self {
        let hops = (1..=config.max_hops)
            .map(|hop| HopRecord::with_capacity(hop, config.window_size))
            .collect();

        Self {
            target,
            config,
            phase: Phase::Discovering,
            hops,
            round: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_converged(&self) -> bool {
        matches!(self.phase, Phase::Converged { .. })
    }

    pub fn max_hops(&self) -> u8 {
        self.config.max_hops
    }

    /// Number of hop distances probed each round
    pub fn active_hops(&self) -> u8 {
        match self.phase {
            Phase::Discovering => self.config.max_hops,
            Phase::Converged { hop } => hop,
        }
    }

    /// Number of completed rounds
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn hops(&self) -> &[HopRecord] {
        &self.hops
    }

    /// Get hop by distance (1-indexed)
    pub fn hop(&self, hop: u8) -> Option<&HopRecord> {
        if hop == 0 {
            None
        } else {
            self.hops.get(hop as usize - 1)
        }
    }

    /// Apply the outcomes of one completed round.
    ///
    /// While discovering, the shallowest outcome whose responder is the target
    /// freezes the hop count at that distance: deeper records are dropped and
    /// deeper outcomes from the same round are ignored. Returns the distance
    /// if this round converged the session.
    pub fn apply_round(&mut self, outcomes: &[ProbeOutcome]) -> Option<u8> {
        self.round += 1;

        let converged_at = match self.phase {
            Phase::Discovering => outcomes
                .iter()
                .filter(|o| o.hop >= 1 && o.hop <= self.active_hops())
                .filter(|o| o.responder == Some(self.target.resolved))
                .map(|o| o.hop)
                .min(),
            Phase::Converged { .. } => None,
        };

        if let Some(hop) = converged_at {
            self.phase = Phase::Converged { hop };
            self.hops.truncate(hop as usize);
        }

        let active = self.active_hops();
        for outcome in outcomes {
            if outcome.hop == 0 || outcome.hop > active {
                continue;
            }
            if let Some(record) = self.hops.get_mut(outcome.hop as usize - 1) {
                record.update(outcome);
            }
        }

        converged_at
    }

    /// Greatest hop distance that has ever recorded a responder (0 if none)
    pub fn valid_hop_count(&self) -> u8 {
        self.hops
            .iter()
            .rev()
            .find(|h| h.has_replied())
            .map(|h| h.hop())
            .unwrap_or(0)
    }

    /// Number of probes sent to the first hop (one per round)
    pub fn sent(&self) -> u64 {
        self.hops.first().map(|h| h.attempts()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn ip(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    fn session(max_hops: u8) -> Session {
        let target = Target::new("example.com".to_string(), ip(93, 184, 216, 34));
        let config = Config {
            max_hops,
            ..Config::default()
        };
        Session::new(target, config)
    }

    fn reply(hop: u8, addr: IpAddr) -> ProbeOutcome {
        ProbeOutcome::reply(hop, addr, Duration::from_millis(hop as u64 * 10))
    }

    #[test]
    fn test_session_starts_discovering() {
        let session = session(30);
        assert_eq!(session.phase(), Phase::Discovering);
        assert_eq!(session.active_hops(), 30);
        assert_eq!(session.hops().len(), 30);
        assert_eq!(session.round(), 0);
        assert!(session.hop(0).is_none());
        assert_eq!(session.hop(30).map(|h| h.hop()), Some(30));
        assert!(session.hop(31).is_none());
    }

    #[test]
    fn test_convergence_truncates_hops() {
        let mut session = session(5);
        let target = session.target.resolved;
        let outcomes = vec![
            reply(1, ip(192, 168, 1, 1)),
            reply(2, ip(10, 0, 0, 1)),
            reply(3, target),
            reply(4, target),
            reply(5, target),
        ];

        assert_eq!(session.apply_round(&outcomes), Some(3));
        assert_eq!(session.phase(), Phase::Converged { hop: 3 });
        assert_eq!(session.active_hops(), 3);
        assert_eq!(session.hops().len(), 3);
        assert_eq!(session.hop(3).map(|h| h.attempts()), Some(1));
    }

    #[test]
    fn test_convergence_picks_shallowest_target_reply() {
        let mut session = session(8);
        let target = session.target.resolved;
        let outcomes = vec![reply(6, target), reply(4, target), reply(7, target)];
        assert_eq!(session.apply_round(&outcomes), Some(4));
        assert_eq!(session.active_hops(), 4);
    }

    #[test]
    fn test_convergence_happens_once() {
        let mut session = session(10);
        let target = session.target.resolved;

        assert_eq!(session.apply_round(&[reply(6, target)]), Some(6));
        // A shallower target reply later must not shrink the range again
        assert_eq!(session.apply_round(&[reply(2, target)]), None);
        assert_eq!(session.active_hops(), 6);

        // Outcomes beyond the frozen distance are ignored
        assert_eq!(session.apply_round(&[reply(9, ip(1, 1, 1, 1))]), None);
        assert_eq!(session.hops().len(), 6);
    }

    #[test]
    fn test_no_target_reply_stays_discovering() {
        let mut session = session(4);
        for _ in 0..5 {
            let outcomes: Vec<_> = (1..=4).map(|h| reply(h, ip(10, 0, 0, h))).collect();
            assert_eq!(session.apply_round(&outcomes), None);
        }
        assert_eq!(session.phase(), Phase::Discovering);
        assert_eq!(session.active_hops(), 4);
        assert_eq!(session.round(), 5);
        assert_eq!(session.sent(), 5);
    }

    #[test]
    fn test_valid_hop_count_tracks_deepest_reply() {
        let mut session = session(6);
        assert_eq!(session.valid_hop_count(), 0);

        session.apply_round(&[
            reply(1, ip(10, 0, 0, 1)),
            ProbeOutcome::lost(2, Duration::from_secs(1)),
            reply(3, ip(10, 0, 0, 3)),
            ProbeOutcome::lost(4, Duration::from_secs(1)),
        ]);
        assert_eq!(session.valid_hop_count(), 3);

        // A later loss at hop 3 keeps its history
        session.apply_round(&[ProbeOutcome::lost(3, Duration::from_secs(1))]);
        assert_eq!(session.valid_hop_count(), 3);
    }

    #[test]
    fn test_zero_hop_outcome_is_ignored() {
        let mut session = session(3);
        session.apply_round(&[reply(0, ip(10, 0, 0, 1))]);
        assert!(session.hops().iter().all(|h| h.attempts() == 0));
    }
}
