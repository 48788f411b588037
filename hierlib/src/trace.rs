use std::io::BufRead;

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

use crate::error::TraceError;

/// One entry of a memory trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemAccess {
    pub address: u32,
    pub is_load: bool,
}

impl MemAccess {
    pub fn load(address: u32) -> Self {
        Self { address, is_load: true }
    }

    pub fn store(address: u32) -> Self {
        Self { address, is_load: false }
    }
}

/// Anything the CPU can pull memory accesses from. `None` marks the end of the trace.
pub trait TraceSource {
    fn next_access(&mut self) -> Option<MemAccess>;

    /// Entries which were present but could not be understood
    fn skipped_lines(&self) -> u64 {
        0
    }
}

/// A trace held in memory, mostly useful for tests
#[derive(Debug, Clone, Default)]
pub struct VecTrace {
    accesses: Vec<MemAccess>,
    position: usize,
}

impl VecTrace {
    pub fn new(accesses: Vec<MemAccess>) -> Self {
        Self { accesses, position: 0 }
    }

    pub fn len(&self) -> usize {
        self.accesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }
}

impl TraceSource for VecTrace {
    fn next_access(&mut self) -> Option<MemAccess> {
        let access = self.accesses.get(self.position).copied()?;
        self.position += 1;
        Some(access)
    }
}

impl FromIterator<MemAccess> for VecTrace {
    fn from_iter<I: IntoIterator<Item = MemAccess>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

lazy_static! {
    static ref TRACE_LINE: Regex =
        Regex::new(r"^\s*(?:0[xX])?([0-9a-fA-F]{1,8})\s+([LlSsRrWw])\s*$").unwrap();
}

/// Parses a single trace line of the form `<hex address> <L|S>`.
///
/// `R` and `W` are accepted for loads and stores, the `0x` prefix is optional, and the kind is
/// case insensitive. Blank lines and lines starting with `#` yield `Ok(None)`.
///
/// # Examples
///
/// ```
/// use hierlib::trace::{parse_line, MemAccess};
/// assert_eq!(parse_line(1, "0x1000 L"), Ok(Some(MemAccess::load(0x1000))));
/// assert_eq!(parse_line(2, "# comment"), Ok(None));
/// ```
pub fn parse_line(line_number: usize, line: &str) -> Result<Option<MemAccess>, TraceError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let error = || TraceError {
        line: line_number,
        text: trimmed.to_string(),
    };
    let captures = TRACE_LINE.captures(trimmed).ok_or_else(error)?;
    let address = u32::from_str_radix(&captures[1], 16).map_err(|_| error())?;
    let is_load = matches!(&captures[2], "L" | "l" | "R" | "r");
    Ok(Some(MemAccess { address, is_load }))
}

/// Streams a text trace, one access per line
///
/// Lines which cannot be parsed, including ones which are not valid UTF-8, are logged and skipped.
/// [`TraceSource::skipped_lines`] counts them. Only an I/O error ends the trace early.
#[derive(Debug)]
pub struct TraceReader<R: BufRead> {
    reader: R,
    buffer: Vec<u8>,
    line_number: usize,
    skipped_lines: u64,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            line_number: 0,
            skipped_lines: 0,
        }
    }
}

impl<R: BufRead> TraceSource for TraceReader<R> {
    fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }

    fn next_access(&mut self) -> Option<MemAccess> {
        loop {
            self.buffer.clear();
            match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!("stopped reading the trace after line {}: {e}", self.line_number);
                    return None;
                }
            }
            self.line_number += 1;
            // Undecodable bytes become U+FFFD, which the parser rejects
            let line = String::from_utf8_lossy(&self.buffer);
            match parse_line(self.line_number, &line) {
                Ok(Some(access)) => return Some(access),
                Ok(None) => {}
                Err(e) => {
                    warn!("skipping trace {e}");
                    self.skipped_lines += 1;
                }
            }
        }
    }
}
