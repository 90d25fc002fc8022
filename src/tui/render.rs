use std::io;
use std::net::IpAddr;
use std::time::Duration;

use crate::lookup::Locator;
use crate::state::{HopRecord, Session};
use crate::tui::sink::TerminalSink;

/// Placeholder for anything unknown
pub const SENTINEL: &str = "*";

const ADDRESS_HEADER: &str = "Address";

/// Banner lines shown above the table, fixed for the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    lines: Vec<String>,
}

impl Banner {
    pub fn new(session: &Session, locator: &dyn Locator) -> Self {
        let target = &session.target;
        Self {
            lines: vec![
                format!(
                    "hopwatch to {} with max {} hops:",
                    target.original,
                    session.max_hops()
                ),
                format!("  Target: {}", target.resolved),
                format!("  Registration: {}", locator.registration(target.resolved)),
                format!("  Location: {}", locator.locate(target.resolved)),
            ],
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// One displayed hop
#[derive(Debug, Clone, PartialEq)]
pub struct HopRow {
    pub hop: u8,
    pub avg_rtt: Option<Duration>,
    /// `None` when the window is empty
    pub jitter: Option<Duration>,
    pub loss_pct: f64,
    pub address: Option<IpAddr>,
    pub location: Option<String>,
}

impl HopRow {
    fn from_record(record: &HopRecord, locator: &dyn Locator) -> Self {
        let replied = record.has_replied();
        Self {
            hop: record.hop(),
            avg_rtt: record.avg_rtt(),
            jitter: replied.then(|| record.jitter()),
            loss_pct: record.loss_pct(),
            address: record.representative_address(),
            location: record.location(locator),
        }
    }

    fn address_text(&self) -> String {
        self.address
            .map(|a| a.to_string())
            .unwrap_or_else(|| SENTINEL.to_string())
    }
}

/// Everything needed to draw one refresh
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub round: u64,
    pub rows: Vec<HopRow>,
    /// Append the "nothing seen past here" marker row
    pub trailer: bool,
    /// Width the address column is padded to, before the separating space
    pub address_width: usize,
}

impl Frame {
    /// Snapshot the session.
    ///
    /// Shows one row past the deepest hop that ever replied, capped at the
    /// active hop count. The trailer marks a path whose end is not yet known.
    pub fn build(session: &Session, locator: &dyn Locator) -> Self {
        let active = session.active_hops();
        let show_count = session.valid_hop_count().saturating_add(1).min(active);

        let rows: Vec<HopRow> = session
            .hops()
            .iter()
            .take(show_count as usize)
            .map(|record| HopRow::from_record(record, locator))
            .collect();

        // Widest address across every hop, displayed or not
        let address_width = session
            .hops()
            .iter()
            .map(|h| {
                h.representative_address()
                    .map(|a| a.to_string().len())
                    .unwrap_or(SENTINEL.len())
            })
            .chain(std::iter::once(ADDRESS_HEADER.len()))
            .max()
            .unwrap_or(ADDRESS_HEADER.len());

        Self {
            round: session.round(),
            rows,
            trailer: !session.is_converged() || show_count < active,
            address_width,
        }
    }

    /// Status line, column header, hop rows and the optional trailer
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.rows.len() + 3);
        lines.push(format!("  Round: {}", self.round));
        lines.push(self.format_line("#", "Avg", "Jitter", "Loss", ADDRESS_HEADER, "Location"));

        for row in &self.rows {
            lines.push(self.format_line(
                &row.hop.to_string(),
                &row.avg_rtt.map(format_rtt).unwrap_or_else(|| SENTINEL.to_string()),
                &row.jitter.map(format_rtt).unwrap_or_else(|| SENTINEL.to_string()),
                &format!("{:.2}%", row.loss_pct),
                &row.address_text(),
                row.location.as_deref().unwrap_or(SENTINEL),
            ));
        }

        if self.trailer {
            lines.push(self.format_line(SENTINEL, SENTINEL, SENTINEL, SENTINEL, SENTINEL, SENTINEL));
        }

        lines
    }

    fn format_line(
        &self,
        hop: &str,
        avg: &str,
        jitter: &str,
        loss: &str,
        address: &str,
        location: &str,
    ) -> String {
        let line = format!(
            "{:>3}  {:>9}  {:>9}  {:>7}  {:<width$} {}",
            hop,
            avg,
            jitter,
            loss,
            address,
            location,
            width = self.address_width
        );
        line.trim_end().to_string()
    }
}

/// RTT in milliseconds with one decimal
pub fn format_rtt(rtt: Duration) -> String {
    format!("{:.1}ms", rtt.as_secs_f64() * 1000.0)
}

/// Draw the banner and frame from the top of the screen.
///
/// Clears every line below the last written row and parks the cursor on the
/// first cleared line. Returns that row.
pub fn paint<S: TerminalSink + ?Sized>(sink: &mut S, banner: &Banner, frame: &Frame) -> io::Result<u16> {
    let mut row: u16 = 0;
    for line in banner.lines().iter().cloned().chain(frame.lines()) {
        sink.write_line(row, &line)?;
        row = row.saturating_add(1);
    }

    for blank in row..sink.height() {
        sink.clear_line(blank)?;
    }
    sink.set_cursor(0, row)?;
    sink.flush()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::lookup::NoLocator;
    use crate::state::{ProbeOutcome, Target};
    use crate::tui::sink::MemorySink;
    use std::net::Ipv4Addr;

    struct FixedLocator;

    impl Locator for FixedLocator {
        fn locate(&self, ip: IpAddr) -> String {
            format!("loc-{}", ip)
        }

        fn registration(&self, _ip: IpAddr) -> String {
            "Japan".to_string()
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn target() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))
    }

    fn session(max_hops: u8) -> Session {
        let config = Config {
            max_hops,
            ..Config::default()
        };
        Session::new(Target::new("example.com".to_string(), target()), config)
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_banner_lines() {
        let banner = Banner::new(&session(30), &FixedLocator);
        assert_eq!(
            banner.lines(),
            &[
                "hopwatch to example.com with max 30 hops:".to_string(),
                "  Target: 93.184.216.34".to_string(),
                "  Registration: Japan".to_string(),
                "  Location: loc-93.184.216.34".to_string(),
            ]
        );
    }

    #[test]
    fn test_converged_path_has_no_trailer() {
        let mut session = session(5);
        session.apply_round(&[
            ProbeOutcome::reply(1, ip(1), ms(1)),
            ProbeOutcome::reply(2, ip(2), ms(2)),
            ProbeOutcome::reply(3, target(), ms(3)),
            ProbeOutcome::reply(4, target(), ms(3)),
            ProbeOutcome::lost(5, ms(1000)),
        ]);

        let frame = Frame::build(&session, &NoLocator);
        assert_eq!(frame.rows.len(), 3);
        assert!(!frame.trailer);
        assert_eq!(frame.lines().len(), 2 + 3);
    }

    #[test]
    fn test_discovering_shows_one_row_past_deepest_reply() {
        let mut session = session(30);
        let mut outcomes: Vec<_> = (1..=30).map(|h| ProbeOutcome::lost(h, ms(1000))).collect();
        outcomes[0] = ProbeOutcome::reply(1, ip(1), ms(1));
        outcomes[3] = ProbeOutcome::reply(4, ip(4), ms(4));
        session.apply_round(&outcomes);

        let frame = Frame::build(&session, &NoLocator);
        assert_eq!(frame.rows.len(), 5);
        assert_eq!(frame.rows.last().map(|r| r.hop), Some(5));
        assert!(frame.trailer);

        let lines = frame.lines();
        assert!(lines.last().map(|l| l.split_whitespace().all(|t| t == SENTINEL)).unwrap_or(false));
    }

    #[test]
    fn test_nothing_replied_shows_first_hop_and_trailer() {
        let mut session = session(30);
        let outcomes: Vec<_> = (1..=30).map(|h| ProbeOutcome::lost(h, ms(1000))).collect();
        session.apply_round(&outcomes);

        let frame = Frame::build(&session, &NoLocator);
        assert_eq!(frame.rows.len(), 1);
        assert!(frame.trailer);
    }

    #[test]
    fn test_silent_hop_renders_sentinels_with_loss() {
        let mut session = session(3);
        for _ in 0..20 {
            session.apply_round(&[
                ProbeOutcome::reply(1, ip(1), ms(1)),
                ProbeOutcome::lost(2, ms(1000)),
                ProbeOutcome::reply(3, target(), ms(3)),
            ]);
        }

        let frame = Frame::build(&session, &FixedLocator);
        let hop2 = &frame.rows[1];
        assert_eq!(hop2.avg_rtt, None);
        assert_eq!(hop2.jitter, None);
        assert_eq!(hop2.address, None);
        assert_eq!(hop2.location, None);
        assert_eq!(hop2.loss_pct, 100.0);

        let line = &frame.lines()[3];
        assert!(line.contains("100.00%"));
        assert_eq!(line.split_whitespace().filter(|t| *t == SENTINEL).count(), 4);

        assert_eq!(frame.rows[0].loss_pct, 0.0);
        assert_eq!(frame.rows[2].location.as_deref(), Some("loc-93.184.216.34"));
    }

    #[test]
    fn test_address_column_padded_to_widest() {
        let mut session = session(3);
        let wide = IpAddr::V4(Ipv4Addr::new(192, 168, 100, 200));
        session.apply_round(&[
            ProbeOutcome::reply(1, ip(1), ms(1)),
            ProbeOutcome::reply(2, wide, ms(2)),
            ProbeOutcome::reply(3, target(), ms(3)),
        ]);

        let frame = Frame::build(&session, &FixedLocator);
        assert_eq!(frame.address_width, "192.168.100.200".len());

        let lines = frame.lines();
        let col = |line: &str| line.find("loc-").unwrap();
        assert_eq!(col(&lines[2]), col(&lines[3]));
        assert_eq!(col(&lines[3]), col(&lines[4]));
    }

    #[test]
    fn test_address_column_never_narrower_than_header() {
        let frame = Frame::build(&session(3), &NoLocator);
        assert_eq!(frame.address_width, ADDRESS_HEADER.len());
    }

    #[test]
    fn test_paint_clears_below_and_parks_cursor() {
        let mut sink = MemorySink::new(20);
        for row in 0..20 {
            sink.write_line(row, "stale").unwrap();
        }

        let mut session = session(3);
        session.apply_round(&[
            ProbeOutcome::reply(1, ip(1), ms(1)),
            ProbeOutcome::reply(2, ip(2), ms(2)),
            ProbeOutcome::reply(3, target(), ms(3)),
        ]);
        let banner = Banner::new(&session, &NoLocator);
        let frame = Frame::build(&session, &NoLocator);

        let next = paint(&mut sink, &banner, &frame).unwrap();
        // 4 banner + round + header + 3 hops
        assert_eq!(next, 9);
        assert_eq!(sink.cursor(), (0, 9));
        assert!((9..20).all(|row| sink.line(row).is_empty()));
        assert_eq!(sink.non_empty_lines().len(), 9);
        assert_eq!(sink.flushes(), 1);
    }

    #[test]
    fn test_format_rtt() {
        assert_eq!(format_rtt(Duration::from_micros(1540)), "1.5ms");
        assert_eq!(format_rtt(Duration::ZERO), "0.0ms");
    }
}
