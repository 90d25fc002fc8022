//! Live hop-by-hop path monitoring.
//!
//! Probes every hop towards a target once per round, keeps a sliding window
//! of replies per hop and redraws a latency/jitter/loss table in place.

pub mod cli;
pub mod config;
pub mod error;
pub mod lookup;
pub mod prefs;
pub mod probe;
pub mod resolve;
pub mod state;
pub mod trace;
pub mod tui;
