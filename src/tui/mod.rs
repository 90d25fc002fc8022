pub mod render;
pub mod sink;

pub use render::{Banner, Frame, HopRow, paint};
pub use sink::{CrosstermSink, MemorySink, TerminalSink};
