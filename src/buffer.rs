//! Character sources feeding the lexer.
//!
//! Buffers are readers that keep track of the current line, column and
//! indentation level; they only need to supply characters for the shared
//! tracking core to work. `StringBuffer` makes tests and `eval` easy,
//! `FileBuffer` is the usual reader, `ConsoleBuffer` drives the REPL and
//! supports a line filter for `%` meta-commands plus a prompt callback.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Position and indentation bookkeeping shared by every buffer.
///
/// `consume` updates the state for each character: newlines reset the
/// column and start an empty line, leading spaces and tabs grow the indent
/// until the first visible character.
#[derive(Debug, Clone, Copy)]
struct Tracker {
    line: u32,
    col: u32,
    indent: u32,
    empty_line: bool,
}

impl Tracker {
    fn new() -> Self {
        Tracker { line: 1, col: 0, indent: 0, empty_line: true }
    }

    fn advance(&mut self, c: char) {
        match c {
            '\n' => {
                self.line += 1;
                self.col = 0;
                self.indent = 0;
                self.empty_line = true;
            }
            ' ' => {
                self.col += 1;
                if self.empty_line {
                    self.indent += 1;
                }
            }
            '\t' => {
                self.col += crate::token::TAB_SIZE;
                if self.empty_line {
                    self.indent += crate::token::TAB_SIZE;
                }
            }
            _ => {
                self.col += 1;
                self.empty_line = false;
            }
        }
    }
}

/// Uniform reading contract consumed by the lexer.
pub trait CharStream {
    /// Current character, or `None` at end of input.
    fn peek(&mut self) -> Option<char>;

    /// Advances past the current character.
    fn consume(&mut self);

    /// 1-based current line.
    fn line(&self) -> u32;

    /// 0-based current column.
    fn col(&self) -> u32;

    /// Indentation of the current line in columns.
    fn indent(&self) -> u32;

    /// True until the first visible character of the line.
    fn empty_line(&self) -> bool;

    /// Byte offset of the current character.
    fn position(&self) -> usize;

    /// Rewinds to the beginning of the input.
    fn reset(&mut self);

    /// Text of the given 1-based line, for error reporting.
    fn getline(&self, line: u32) -> Option<String>;

    fn file_name(&self) -> &str;
}

fn line_of(text: &str, wanted: u32) -> Option<String> {
    text.lines().nth(wanted.saturating_sub(1) as usize).map(str::to_string)
}

/// An in-memory source, also the backing store for file contents.
pub struct StringBuffer {
    text: String,
    pos: usize,
    tracker: Tracker,
    name: String,
}

impl StringBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        StringBuffer {
            text: text.into(),
            pos: 0,
            tracker: Tracker::new(),
            name: "<string>".to_string(),
        }
    }

    pub fn with_name(text: impl Into<String>, name: impl Into<String>) -> Self {
        StringBuffer {
            text: text.into(),
            pos: 0,
            tracker: Tracker::new(),
            name: name.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.text
    }
}

impl CharStream for StringBuffer {
    fn peek(&mut self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn consume(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            self.tracker.advance(c);
        }
    }

    fn line(&self) -> u32 {
        self.tracker.line
    }

    fn col(&self) -> u32 {
        self.tracker.col
    }

    fn indent(&self) -> u32 {
        self.tracker.indent
    }

    fn empty_line(&self) -> bool {
        self.tracker.empty_line
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.tracker = Tracker::new();
    }

    fn getline(&self, line: u32) -> Option<String> {
        line_of(&self.text, line)
    }

    fn file_name(&self) -> &str {
        &self.name
    }
}

/// A file source. The file is read once; `reset` rewinds to offset zero.
pub struct FileBuffer {
    inner: StringBuffer,
}

impl FileBuffer {
    pub fn open(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(FileBuffer {
            inner: StringBuffer::with_name(text, path.display().to_string()),
        })
    }

    pub fn source(&self) -> &str {
        self.inner.source()
    }
}

impl CharStream for FileBuffer {
    fn peek(&mut self) -> Option<char> {
        self.inner.peek()
    }

    fn consume(&mut self) {
        self.inner.consume()
    }

    fn line(&self) -> u32 {
        self.inner.line()
    }

    fn col(&self) -> u32 {
        self.inner.col()
    }

    fn indent(&self) -> u32 {
        self.inner.indent()
    }

    fn empty_line(&self) -> bool {
        self.inner.empty_line()
    }

    fn position(&self) -> usize {
        self.inner.position()
    }

    fn reset(&mut self) {
        self.inner.reset()
    }

    fn getline(&self, line: u32) -> Option<String> {
        self.inner.getline(line)
    }

    fn file_name(&self) -> &str {
        self.inner.file_name()
    }
}

/// What the REPL line filter decided about an input line.
pub enum FilterAction {
    /// Hand the line to the lexer.
    Keep,
    /// The filter consumed the line (meta-command); read another.
    Consumed,
}

/// An interactive source reading one line at a time from stdin.
///
/// Before each physical read the prompt callback runs (so the driver can
/// print `>>>` or `...`), then the filter hook may intercept the line.
pub struct ConsoleBuffer {
    pending: String,
    pos: usize,
    tracker: Tracker,
    name: String,
    exhausted: bool,
    filter: Option<Box<dyn FnMut(&str) -> FilterAction>>,
    on_next_line: Option<Box<dyn FnMut(u32)>>,
}

impl ConsoleBuffer {
    pub fn new() -> Self {
        ConsoleBuffer {
            pending: String::new(),
            pos: 0,
            tracker: Tracker::new(),
            name: "<console>".to_string(),
            exhausted: false,
            filter: None,
            on_next_line: None,
        }
    }

    /// Installs the `%` meta-command hook.
    pub fn set_filter(&mut self, filter: impl FnMut(&str) -> FilterAction + 'static) {
        self.filter = Some(Box::new(filter));
    }

    /// Installs the prompt callback, called with the pending line number.
    pub fn set_on_next_line(&mut self, hook: impl FnMut(u32) + 'static) {
        self.on_next_line = Some(Box::new(hook));
    }

    fn fill(&mut self) {
        while self.pos >= self.pending.len() && !self.exhausted {
            if let Some(hook) = self.on_next_line.as_mut() {
                hook(self.tracker.line);
            }
            io::stdout().flush().ok();

            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => {
                    self.exhausted = true;
                    return;
                }
                Ok(_) => {}
            }

            if let Some(filter) = self.filter.as_mut() {
                if matches!(filter(line.trim_end()), FilterAction::Consumed) {
                    // The consumed line surfaces as a blank one so the
                    // caller regains control without further input.
                    self.pending.push('\n');
                    continue;
                }
            }
            if !line.ends_with('\n') {
                line.push('\n');
            }
            self.pending.push_str(&line);
        }
    }
}

impl Default for ConsoleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl CharStream for ConsoleBuffer {
    fn peek(&mut self) -> Option<char> {
        self.fill();
        self.pending[self.pos..].chars().next()
    }

    fn consume(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            self.tracker.advance(c);
        }
    }

    fn line(&self) -> u32 {
        self.tracker.line
    }

    fn col(&self) -> u32 {
        self.tracker.col
    }

    fn indent(&self) -> u32 {
        self.tracker.indent
    }

    fn empty_line(&self) -> bool {
        self.tracker.empty_line
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.pending.clear();
        self.tracker = Tracker::new();
        self.exhausted = false;
    }

    fn getline(&self, line: u32) -> Option<String> {
        line_of(&self.pending, line)
    }

    fn file_name(&self) -> &str {
        &self.name
    }
}
