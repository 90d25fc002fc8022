use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::{execute, queue};
use std::io::{self, Write};

/// Rows assumed when the terminal size cannot be queried
const FALLBACK_HEIGHT: u16 = 24;

/// Line-addressed terminal output
///
/// Rows are absolute screen lines counted from the top.
pub trait TerminalSink {
    /// Replace the contents of `row` with `text`
    fn write_line(&mut self, row: u16, text: &str) -> io::Result<()>;

    fn clear_line(&mut self, row: u16) -> io::Result<()>;

    fn set_cursor(&mut self, col: u16, row: u16) -> io::Result<()>;

    /// Visible rows
    fn height(&self) -> u16;

    fn flush(&mut self) -> io::Result<()>;
}

/// Sink writing to a real terminal through crossterm
///
/// Commands are queued and only reach the terminal on [`TerminalSink::flush`].
pub struct CrosstermSink<W: Write> {
    out: W,
}

impl CrosstermSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> CrosstermSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Clear the whole screen and hide the cursor before the first frame
    pub fn enter(&mut self) -> io::Result<()> {
        execute!(self.out, Hide, Clear(ClearType::All), MoveTo(0, 0))
    }

    /// Leave the cursor visible at `row` so the shell prompt lands below the table
    pub fn leave(&mut self, row: u16) -> io::Result<()> {
        execute!(self.out, MoveTo(0, row), Show)
    }
}

impl<W: Write> TerminalSink for CrosstermSink<W> {
    fn write_line(&mut self, row: u16, text: &str) -> io::Result<()> {
        queue!(self.out, MoveTo(0, row), Clear(ClearType::CurrentLine), Print(text))
    }

    fn clear_line(&mut self, row: u16) -> io::Result<()> {
        queue!(self.out, MoveTo(0, row), Clear(ClearType::CurrentLine))
    }

    fn set_cursor(&mut self, col: u16, row: u16) -> io::Result<()> {
        queue!(self.out, MoveTo(col, row))
    }

    fn height(&self) -> u16 {
        terminal::size()
            .map(|(_, rows)| rows)
            .unwrap_or(FALLBACK_HEIGHT)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// In-memory screen, used to inspect rendered frames
#[derive(Debug, Clone)]
pub struct MemorySink {
    lines: Vec<String>,
    cursor: (u16, u16),
    flushes: usize,
}

impl MemorySink {
    pub fn new(height: u16) -> Self {
        Self {
            lines: vec![String::new(); height as usize],
            cursor: (0, 0),
            flushes: 0,
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Text on `row`, empty for cleared or out-of-range rows
    pub fn line(&self, row: u16) -> &str {
        self.lines.get(row as usize).map(String::as_str).unwrap_or("")
    }

    /// Rows with any text on them
    pub fn non_empty_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .map(String::as_str)
            .filter(|l| !l.is_empty())
            .collect()
    }

    pub fn cursor(&self) -> (u16, u16) {
        self.cursor
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl TerminalSink for MemorySink {
    fn write_line(&mut self, row: u16, text: &str) -> io::Result<()> {
        // Writes below the visible area are dropped, as a terminal would scroll
        if let Some(line) = self.lines.get_mut(row as usize) {
            *line = text.to_string();
        }
        Ok(())
    }

    fn clear_line(&mut self, row: u16) -> io::Result<()> {
        if let Some(line) = self.lines.get_mut(row as usize) {
            line.clear();
        }
        Ok(())
    }

    fn set_cursor(&mut self, col: u16, row: u16) -> io::Result<()> {
        self.cursor = (col, row);
        Ok(())
    }

    fn height(&self) -> u16 {
        self.lines.len() as u16
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
