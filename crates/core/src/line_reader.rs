//! Bounded line reader for vendor JSONL logs.
//!
//! Lines are accumulated in an owned buffer that starts at 64 KiB and may grow up to a
//! configurable hard cap. A line longer than the cap is reported as
//! [`Error::LineTooLong`]; it is never truncated. If the underlying read fails halfway
//! through a line, the bytes read so far stay buffered and the next call resumes from them.

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use std::io::{self, BufRead, BufReader, Read};

/// Initial read buffer size.
pub const INITIAL_BUFFER_BYTES: usize = 64 * 1024;
/// Default upper bound for a single line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

pub struct LineReader<R> {
    inner: BufReader<R>,
    line: Vec<u8>,
    line_complete: bool,
    max_line_bytes: usize,
    line_number: u64,
    consumed: u64,
    eof: bool,
    cancel: Option<CancellationToken>,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_line_bytes(inner, DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(inner: R, max_line_bytes: usize) -> Self {
        Self {
            inner: BufReader::with_capacity(INITIAL_BUFFER_BYTES, inner),
            line: Vec::with_capacity(INITIAL_BUFFER_BYTES.min(max_line_bytes.max(1))),
            line_complete: false,
            max_line_bytes: max_line_bytes.max(1),
            line_number: 0,
            consumed: 0,
            eof: false,
            cancel: None,
        }
    }

    /// Check `cancel` before every line.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn set_cancel(&mut self, cancel: Option<CancellationToken>) {
        self.cancel = cancel;
    }

    /// Bytes of complete lines handed out (or skipped) so far, newlines included.
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    /// 1-based number of the last line read, blank lines included.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// True once the source is exhausted and no partial line is pending.
    pub fn is_eof(&self) -> bool {
        self.eof && (self.line_complete || self.line.is_empty())
    }

    pub fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }

    /// Next non-blank line without its line terminator, with its 1-based line number.
    pub fn next_line(&mut self) -> Result<Option<(u64, &[u8])>> {
        loop {
            if self.line_complete {
                self.line.clear();
                self.line_complete = false;
            }
            if let Some(cancel) = &self.cancel {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
            }
            if self.eof && self.line.is_empty() {
                return Ok(None);
            }

            if !self.eof && !self.fill_line()? {
                self.eof = true;
                if self.line.is_empty() {
                    return Ok(None);
                }
            }

            self.line_number += 1;
            self.consumed += self.line.len() as u64;
            self.line_complete = true;

            let (start, end) = content_range(&self.line);
            if start == end {
                continue;
            }
            return Ok(Some((self.line_number, &self.line[start..end])));
        }
    }

    /// Read everything that is left as one document, bounded by the line cap.
    pub fn read_remaining(&mut self) -> Result<Vec<u8>> {
        if self.line_complete {
            self.line.clear();
            self.line_complete = false;
        }
        let mut out = std::mem::take(&mut self.line);
        loop {
            let chunk = match self.inner.fill_buf() {
                Ok(chunk) => chunk,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.line = out;
                    return Err(Error::io("read session document", err));
                }
            };
            if chunk.is_empty() {
                break;
            }
            if out.len() + chunk.len() > self.max_line_bytes {
                return Err(Error::LineTooLong {
                    line: self.line_number + 1,
                    max: self.max_line_bytes,
                });
            }
            let len = chunk.len();
            out.extend_from_slice(chunk);
            self.inner.consume(len);
        }
        self.eof = true;
        self.consumed += out.len() as u64;
        self.line_number += bytecount_newlines(&out).max(1);
        Ok(out)
    }

    /// Append bytes to the current line until a newline. Returns false at EOF.
    fn fill_line(&mut self) -> Result<bool> {
        loop {
            let chunk = match self.inner.fill_buf() {
                Ok(chunk) => chunk,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::io("read line", err)),
            };
            if chunk.is_empty() {
                return Ok(false);
            }
            let (take, found) = match chunk.iter().position(|b| *b == b'\n') {
                Some(idx) => (idx + 1, true),
                None => (chunk.len(), false),
            };
            let content_len = self.line.len() + if found { take - 1 } else { take };
            if content_len > self.max_line_bytes {
                return Err(Error::LineTooLong {
                    line: self.line_number + 1,
                    max: self.max_line_bytes,
                });
            }
            self.line.extend_from_slice(&chunk[..take]);
            self.inner.consume(take);
            if found {
                return Ok(true);
            }
        }
    }
}

fn content_range(line: &[u8]) -> (usize, usize) {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |idx| idx + 1);
    (start, end.max(start))
}

fn bytecount_newlines(bytes: &[u8]) -> u64 {
    bytes.iter().filter(|b| **b == b'\n').count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect<R: Read>(reader: &mut LineReader<R>) -> Vec<(u64, String)> {
        let mut out = Vec::new();
        while let Some((number, line)) = reader.next_line().unwrap() {
            out.push((number, String::from_utf8(line.to_vec()).unwrap()));
        }
        out
    }

    #[test]
    fn skips_blank_lines_but_counts_them() {
        let mut reader = LineReader::new(Cursor::new("a\n\n  \r\nb\r\nc"));
        let lines = collect(&mut reader);
        assert_eq!(
            lines,
            vec![(1, "a".into()), (4, "b".into()), (5, "c".into())]
        );
        assert_eq!(reader.bytes_consumed(), 11);
        assert!(reader.is_eof());
    }

    #[test]
    fn lines_longer_than_the_initial_buffer_are_read_whole() {
        let long = "x".repeat(INITIAL_BUFFER_BYTES * 3);
        let input = format!("{long}\nshort\n");
        let mut reader = LineReader::new(Cursor::new(input));
        let lines = collect(&mut reader);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].1.len(), INITIAL_BUFFER_BYTES * 3);
        assert_eq!(lines[1].1, "short");
    }

    #[test]
    fn exceeding_the_cap_is_a_hard_error() {
        let input = format!("ok\n{}\nafter\n", "y".repeat(100));
        let mut reader = LineReader::with_max_line_bytes(Cursor::new(input), 64);
        assert_eq!(reader.next_line().unwrap().unwrap().1, b"ok");
        match reader.next_line() {
            Err(Error::LineTooLong { line, max }) => {
                assert_eq!(line, 2);
                assert_eq!(max, 64);
            }
            other => panic!("expected LineTooLong, got {other:?}"),
        }
    }

    #[test]
    fn cancellation_is_checked_per_line() {
        let cancel = CancellationToken::new();
        let mut reader = LineReader::new(Cursor::new("a\nb\n")).with_cancel(cancel.clone());
        assert!(reader.next_line().unwrap().is_some());
        cancel.cancel();
        assert!(matches!(reader.next_line(), Err(Error::Cancelled)));
    }

    struct FlakyReader {
        chunks: Vec<io::Result<Vec<u8>>>,
    }

    impl Read for FlakyReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            match self.chunks.remove(0) {
                Ok(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Err(err) => Err(err),
            }
        }
    }

    #[test]
    fn partial_line_survives_a_failed_read() {
        let mut reader = LineReader::new(FlakyReader {
            chunks: vec![
                Ok(b"{\"a\":".to_vec()),
                Err(io::Error::other("transient")),
                Ok(b"1}\n".to_vec()),
            ],
        });
        assert!(reader.next_line().is_err());
        let (number, line) = reader.next_line().unwrap().unwrap();
        assert_eq!(number, 1);
        assert_eq!(line, b"{\"a\":1}");
    }

    #[test]
    fn read_remaining_returns_the_document() {
        let mut reader = LineReader::new(Cursor::new("{\n  \"k\": 1\n}\n"));
        let doc = reader.read_remaining().unwrap();
        assert_eq!(doc, b"{\n  \"k\": 1\n}\n");
        assert!(reader.is_eof());
        assert_eq!(reader.bytes_consumed(), doc.len() as u64);
    }
}
