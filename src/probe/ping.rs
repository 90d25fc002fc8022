use std::net::IpAddr;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::error::ProbeError;
use crate::probe::correlate::ReplyKind;
use crate::probe::{ProbeReply, Prober};

/// Prober that runs the operating system's `ping` for each probe
///
/// Used where raw sockets are not permitted. Each probe spawns one process
/// and parses its text output.
#[derive(Debug, Default)]
pub struct PingProber {
    program: Option<String>,
}

/// Reply line recovered from `ping` output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingLine {
    pub responder: IpAddr,
    pub kind: ReplyKind,
    pub rtt: Option<Duration>,
}

impl PingProber {
    pub fn new() -> Self {
        Self { program: None }
    }

    /// Use a specific ping binary instead of the platform default
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    fn command(&self, target: IpAddr, ttl: u8, timeout: Duration) -> Command {
        let (program, args) = ping_args(target, ttl, timeout);
        let mut cmd = Command::new(self.program.as_deref().unwrap_or(program));
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Prober for PingProber {
    async fn probe(&self, target: IpAddr, ttl: u8, timeout: Duration) -> Result<ProbeReply, ProbeError> {
        let started = Instant::now();
        let output = self.command(target, ttl, timeout).output().await?;
        let elapsed = started.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Parse(format!(
                "ping produced no output (status: {}): {}",
                output.status,
                stderr.trim()
            )));
        }

        // A non-zero exit status is normal for TTL-exceeded replies
        Ok(match parse_ping_output(&stdout)? {
            Some(line) => {
                let rtt = line.rtt.unwrap_or(elapsed);
                match line.kind {
                    ReplyKind::EchoReply | ReplyKind::TimeExceeded => {
                        ProbeReply::answered(line.responder, rtt)
                    }
                    ReplyKind::Unreachable(_) => ProbeReply {
                        responder: Some(line.responder),
                        rtt,
                        succeeded: false,
                    },
                }
            }
            None => ProbeReply::no_reply(elapsed),
        })
    }

    fn name(&self) -> &'static str {
        "ping"
    }
}

/// Platform-specific program and arguments for a single TTL-limited ping
pub fn ping_args(target: IpAddr, ttl: u8, timeout: Duration) -> (&'static str, Vec<String>) {
    let ipv6 = target.is_ipv6();
    let secs = (timeout.as_secs_f64().ceil().max(1.0) as u64).to_string();
    let millis = timeout.as_millis().max(1).to_string();
    let ttl = ttl.to_string();
    let target = target.to_string();

    let (program, args): (&'static str, Vec<&str>) = if cfg!(windows) {
        ("ping", vec!["-n", "1", "-i", ttl.as_str(), "-w", millis.as_str(), target.as_str()])
    } else if cfg!(target_os = "macos") {
        if ipv6 {
            ("ping6", vec!["-n", "-c", "1", "-h", ttl.as_str(), target.as_str()])
        } else {
            ("ping", vec!["-n", "-c", "1", "-m", ttl.as_str(), "-t", secs.as_str(), target.as_str()])
        }
    } else {
        let mut args = vec!["-n", "-c", "1", "-t", ttl.as_str(), "-W", secs.as_str()];
        if ipv6 {
            args.push("-6");
        }
        args.push(target.as_str());
        ("ping", args)
    };

    (program, args.into_iter().map(String::from).collect())
}

/// Find the first reply line in `ping` output.
///
/// Returns `Ok(None)` when the probe went unanswered, and
/// [`ProbeError::AddressFormat`] when a reply names an address that does not
/// parse.
pub fn parse_ping_output(output: &str) -> Result<Option<PingLine>, ProbeError> {
    for line in output.lines() {
        let lower = line.to_ascii_lowercase();

        let kind = if lower.contains("time to live exceeded")
            || lower.contains("time exceeded")
            || lower.contains("ttl expired")
        {
            ReplyKind::TimeExceeded
        } else if lower.contains("unreachable") {
            ReplyKind::Unreachable(0)
        } else if (lower.contains("bytes from") || lower.contains("reply from"))
            && (lower.contains("time=") || lower.contains("time<"))
        {
            ReplyKind::EchoReply
        } else {
            continue;
        };

        let Some(token) = address_token(line, &lower) else {
            return Err(ProbeError::Parse(format!("reply without address: {}", line.trim())));
        };
        let responder = parse_address(token)?;
        let rtt = match kind {
            ReplyKind::EchoReply => parse_rtt(&lower),
            _ => None,
        };

        return Ok(Some(PingLine {
            responder,
            kind,
            rtt,
        }));
    }

    Ok(None)
}

/// Text naming the responder: the token after "from", or its parenthesised form
fn address_token<'a>(line: &'a str, lower: &str) -> Option<&'a str> {
    let start = lower.find("from ")? + "from ".len();
    let mut tokens = line[start..].split_whitespace();
    let first = tokens.next()?;

    if first.starts_with('(') {
        return Some(first);
    }
    // "From host.example (10.0.0.1) ..." when reverse DNS is on
    match tokens.next() {
        Some(next) if next.starts_with('(') => Some(next),
        _ => Some(first),
    }
}

fn parse_address(token: &str) -> Result<IpAddr, ProbeError> {
    let cleaned = token
        .trim_start_matches('(')
        .trim_end_matches([':', ',', ')', '.']);
    // strip IPv6 zone index, e.g. fe80::1%eth0
    let cleaned = cleaned.split('%').next().unwrap_or(cleaned);

    cleaned
        .parse()
        .map_err(|_| ProbeError::AddressFormat(token.to_string()))
}

/// RTT from "time=1.54 ms", "time=12ms" or "time<1ms"
fn parse_rtt(lower: &str) -> Option<Duration> {
    let start = lower.find("time=").or_else(|| lower.find("time<"))? + "time=".len();
    let number: String = lower[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let millis: f64 = number.parse().ok()?;
    Some(Duration::from_secs_f64(millis / 1000.0))
}
