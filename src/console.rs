//! Bounded scrollback for server broadcast text
//!
//! Characters arrive one at a time from echo frames. The buffer keeps at most
//! [`CONSOLE_CAPACITY`] characters and fewer than [`CONSOLE_MAX_LINES`]
//! completed lines; the oldest line is scrolled out first.

/// Maximum number of characters held
pub const CONSOLE_CAPACITY: usize = 159;
/// Line count at which the oldest line is evicted
pub const CONSOLE_MAX_LINES: usize = 4;

const BACKSPACE: u8 = 0o10;
const LINE_FEED: u8 = 0o12;
const FORM_FEED: u8 = 0o14;
const CARRIAGE_RETURN: u8 = 0o15;

/// Console text store
#[derive(Debug, Clone)]
pub struct ConsoleBuffer {
    text: String,
    /// Completed lines currently in `text`
    lines: usize,
    capacity: usize,
    max_lines: usize,
}

impl ConsoleBuffer {
    pub fn new() -> Self {
        Self::with_limits(CONSOLE_CAPACITY, CONSOLE_MAX_LINES)
    }

    pub fn with_limits(capacity: usize, max_lines: usize) -> Self {
        Self {
            text: String::with_capacity(capacity),
            lines: 0,
            capacity: capacity.max(1),
            max_lines: max_lines.max(1),
        }
    }

    /// Feed one character from the wire
    pub fn push(&mut self, ch: u8) {
        match ch {
            BACKSPACE => self.backspace(),
            FORM_FEED => self.clear(),
            CARRIAGE_RETURN => self.break_line(),
            // CR already produced the line break
            LINE_FEED => {}
            0x20..=0x7e => self.append(ch as char),
            _ => {}
        }
    }

    /// Current text, lines separated by `\n`
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.lines = 0;
    }

    fn append(&mut self, ch: char) {
        if self.text.len() >= self.capacity {
            self.scroll();
        }
        self.text.push(ch);
    }

    fn break_line(&mut self) {
        self.append('\n');
        self.lines += 1;
        if self.lines >= self.max_lines {
            self.scroll();
        }
    }

    fn backspace(&mut self) {
        if self.text.pop() == Some('\n') {
            self.lines = self.lines.saturating_sub(1);
        }
    }

    /// Drop the oldest line, or everything if it is all one line
    fn scroll(&mut self) {
        match self.text.find('\n') {
            Some(end) => {
                self.text.drain(..=end);
                self.lines = self.lines.saturating_sub(1);
            }
            None => self.clear(),
        }
    }
}

impl Default for ConsoleBuffer {
    fn default() -> Self {
        Self::new()
    }
}
