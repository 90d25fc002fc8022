use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::Duration;

use crate::lookup::Locator;

/// Default number of samples kept per hop
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Result of a single probe at a given hop distance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub hop: u8,
    pub responder: Option<IpAddr>,
    pub rtt: Duration,
    pub succeeded: bool,
}

impl ProbeOutcome {
    pub fn reply(hop: u8, responder: IpAddr, rtt: Duration) -> Self {
        Self {
            hop,
            responder: Some(responder),
            rtt,
            succeeded: true,
        }
    }

    pub fn lost(hop: u8, rtt: Duration) -> Self {
        Self {
            hop,
            responder: None,
            rtt,
            succeeded: false,
        }
    }
}

/// A successful reply held in the sliding window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub address: IpAddr,
    pub rtt: Duration,
}

/// Statistics for a single hop distance
///
/// Successful replies go into a bounded FIFO window; averages, jitter and the
/// representative address are derived from the window on every read. Attempt
/// and loss counters are cumulative for the lifetime of the hop.
#[derive(Debug, Clone)]
pub struct HopRecord {
    hop: u8,
    capacity: usize,
    window: VecDeque<Sample>,
    attempts: u64,
    losses: u64,
}

impl HopRecord {
    pub fn new(hop: u8) -> Self {
        Self::with_capacity(hop, DEFAULT_WINDOW_SIZE)
    }

    pub fn with_capacity(hop: u8, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            hop,
            capacity,
            window: VecDeque::with_capacity(capacity.min(DEFAULT_WINDOW_SIZE)),
            attempts: 0,
            losses: 0,
        }
    }

    /// Fold one probe outcome into the record
    pub fn update(&mut self, outcome: &ProbeOutcome) {
        self.attempts += 1;

        match outcome.responder {
            Some(address) if outcome.succeeded => {
                self.window.push_back(Sample {
                    address,
                    rtt: outcome.rtt,
                });
                while self.window.len() > self.capacity {
                    self.window.pop_front();
                }
            }
            _ => self.losses += 1,
        }
    }

    pub fn hop(&self) -> u8 {
        self.hop
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn losses(&self) -> u64 {
        self.losses
    }

    /// Samples currently in the window, oldest first
    pub fn samples(&self) -> impl ExactSizeIterator<Item = &Sample> {
        self.window.iter()
    }

    /// True once any reply has been recorded at this distance.
    ///
    /// Losses never evict samples, so a non-empty window means the hop has
    /// replied at some point.
    pub fn has_replied(&self) -> bool {
        !self.window.is_empty()
    }

    /// Mean RTT across the window, `None` when the window is empty
    pub fn avg_rtt(&self) -> Option<Duration> {
        if self.window.is_empty() {
            return None;
        }
        let total: Duration = self.window.iter().map(|s| s.rtt).sum();
        Some(total / self.window.len() as u32)
    }

    /// Largest absolute deviation from the mean RTT within the window
    pub fn jitter(&self) -> Duration {
        let Some(avg) = self.avg_rtt() else {
            return Duration::ZERO;
        };
        self.window
            .iter()
            .map(|s| s.rtt.abs_diff(avg))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Loss percentage over all attempts (0-100)
    pub fn loss_pct(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.losses as f64 / self.attempts as f64 * 100.0
        }
    }

    /// Oldest address still resident in the window
    pub fn representative_address(&self) -> Option<IpAddr> {
        self.window.front().map(|s| s.address)
    }

    /// Location text for the representative address, `None` if no replies
    pub fn location<L: Locator + ?Sized>(&self, locator: &L) -> Option<String> {
        self.representative_address()
            .map(|address| locator.locate(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::NoLocator;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_hop_record_initial_state() {
        let hop = HopRecord::new(3);
        assert_eq!(hop.hop(), 3);
        assert_eq!(hop.attempts(), 0);
        assert_eq!(hop.losses(), 0);
        assert_eq!(hop.avg_rtt(), None);
        assert_eq!(hop.jitter(), Duration::ZERO);
        assert_eq!(hop.loss_pct(), 0.0);
        assert_eq!(hop.representative_address(), None);
        assert!(!hop.has_replied());
    }

    #[test]
    fn test_window_is_bounded_and_fifo() {
        let mut hop = HopRecord::new(1);
        for i in 0..25u8 {
            hop.update(&ProbeOutcome::reply(1, ip(i), ms(i as u64)));
            assert!(hop.samples().len() <= DEFAULT_WINDOW_SIZE);
        }

        let kept: Vec<u8> = hop
            .samples()
            .map(|s| match s.address {
                IpAddr::V4(v4) => v4.octets()[3],
                IpAddr::V6(_) => unreachable!(),
            })
            .collect();
        assert_eq!(kept, (15..25).collect::<Vec<u8>>());
        assert_eq!(hop.attempts(), 25);
    }

    #[test]
    fn test_avg_and_jitter() {
        let mut hop = HopRecord::new(2);
        for rtt in [10, 20, 30, 60] {
            hop.update(&ProbeOutcome::reply(2, ip(1), ms(rtt)));
        }

        // mean = 30ms, largest deviation = |60 - 30|
        assert_eq!(hop.avg_rtt(), Some(ms(30)));
        assert_eq!(hop.jitter(), ms(30));
    }

    #[test]
    fn test_losses_do_not_touch_window() {
        let mut hop = HopRecord::new(4);
        hop.update(&ProbeOutcome::reply(4, ip(4), ms(12)));
        for _ in 0..3 {
            hop.update(&ProbeOutcome::lost(4, ms(1000)));
        }

        assert_eq!(hop.attempts(), 4);
        assert_eq!(hop.losses(), 3);
        assert_eq!(hop.samples().len(), 1);
        assert_eq!(hop.avg_rtt(), Some(ms(12)));
        assert!((hop.loss_pct() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failed_outcome_with_address_counts_as_loss() {
        // e.g. destination unreachable from some router
        let mut hop = HopRecord::new(5);
        hop.update(&ProbeOutcome {
            hop: 5,
            responder: Some(ip(5)),
            rtt: ms(8),
            succeeded: false,
        });
        assert_eq!(hop.losses(), 1);
        assert!(!hop.has_replied());
    }

    #[test]
    fn test_representative_is_oldest_resident() {
        let mut hop = HopRecord::new(4);
        let (a, b) = (ip(1), ip(2));
        for round in 0..10 {
            let addr = if round % 2 == 0 { a } else { b };
            hop.update(&ProbeOutcome::reply(4, addr, ms(5)));
        }
        assert_eq!(hop.representative_address(), Some(a));

        // Evicting the oldest A makes B the oldest resident
        hop.update(&ProbeOutcome::reply(4, a, ms(5)));
        assert_eq!(hop.representative_address(), Some(b));
    }

    #[test]
    fn test_location_requires_reply() {
        let mut hop = HopRecord::new(1);
        assert_eq!(hop.location(&NoLocator), None);
        hop.update(&ProbeOutcome::reply(1, ip(1), ms(1)));
        assert_eq!(hop.location(&NoLocator), Some(String::new()));
    }

    #[test]
    fn test_oversized_capacity_allocates_lazily() {
        let mut hop = HopRecord::with_capacity(1, usize::MAX);
        for rtt in 1..=20 {
            hop.update(&ProbeOutcome::reply(1, ip(1), ms(rtt)));
        }
        assert_eq!(hop.samples().len(), 20);
    }

    #[test]
    fn test_custom_capacity() {
        let mut hop = HopRecord::with_capacity(1, 3);
        for rtt in [1, 2, 3, 4, 5] {
            hop.update(&ProbeOutcome::reply(1, ip(1), ms(rtt)));
        }
        assert_eq!(hop.samples().len(), 3);
        assert_eq!(hop.avg_rtt(), Some(ms(4)));
    }
}
