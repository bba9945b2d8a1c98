//! Pull-based byte sources with a sliding read-ahead window.
//!
//! This plays the role the teacher's `Reader` plays for a YAML scanner, but
//! generalized to the framing parser's needs: in addition to a window and a
//! capture buffer, it exposes `scan`, a search for the first occurrence of
//! any of a set of byte-string tokens, used to locate block magic and to
//! skip unparsed YAML trees.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom as IoSeekFrom};

use crate::error::StreamError;

/// A source location, used in error messages and in [`crate::event::Event`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mark {
    pub offset: u64,
    pub line: u64,
    pub column: u64,
}

/// Window must always be able to hold at least this many bytes when more
/// input remains, so that no token handled by `scan` (all shorter than
/// this) can fall across a refill boundary undetected.
pub const MAX_TOKEN_LEN: usize = 32;

/// Default refill chunk size for file-backed streams.
const READ_CHUNK_SIZE: usize = 8192;

/// A pull-based byte source with a bounded read-ahead window.
///
/// Implementations are not required to be `Send`/`Sync`; per the crate's
/// concurrency model a stream is single-owner, confined to the file that
/// created it.
pub trait Stream {
    /// Ensure the window holds at least `min` bytes (or all remaining input,
    /// if shorter), then return it. An empty return value at end of input is
    /// not an error.
    fn peek(&mut self, min: usize) -> Result<&[u8], StreamError>;

    /// Advance the stream by `n` bytes, which must be `<=` the length of the
    /// last window returned by `peek`. Consumed bytes are appended to the
    /// capture buffer if one is active.
    fn consume(&mut self, n: usize) -> Result<(), StreamError>;

    /// Return the bytes up to and including the next LF, consuming them.
    /// The trailing LF (and a preceding CR, if present) are stripped from
    /// the returned value but are still consumed (and captured).
    fn readline(&mut self) -> Result<Vec<u8>, StreamError>;

    /// Advance to the start of the first occurrence of any of `tokens`,
    /// returning the index of the matching token. Returns `Ok(None)` if
    /// none of the tokens occur before end of input, in which case the
    /// stream position ends up at end of input.
    fn scan(&mut self, tokens: &[&[u8]]) -> Result<Option<usize>, StreamError>;

    /// Reposition the stream. Returns an error if the stream is not
    /// seekable or the target is invalid.
    fn seek(&mut self, offset: u64) -> Result<(), StreamError>;

    /// The logical offset of the next byte `peek` would return.
    fn tell(&self) -> u64;

    fn is_seekable(&self) -> bool;

    /// Begin capturing every consumed byte into an internal buffer.
    fn start_capture(&mut self);

    /// Stop capturing and return everything captured since the last
    /// `start_capture`.
    fn take_capture(&mut self) -> Vec<u8>;
}

fn find_any(window: &[u8], tokens: &[&[u8]], complete: bool) -> Option<(usize, usize)> {
    // `complete` indicates whether `window` contains all remaining input,
    // which allows matching tokens whose tail would otherwise need more
    // bytes than are available.
    let max_len = tokens.iter().map(|t| t.len()).max().unwrap_or(0);
    let search_end = if complete {
        window.len()
    } else {
        window.len().saturating_sub(max_len.saturating_sub(1))
    };
    for start in 0..search_end.max(0).min(window.len()) {
        for (ti, tok) in tokens.iter().enumerate() {
            if tok.is_empty() {
                continue;
            }
            if window[start..].starts_with(tok) {
                return Some((start, ti));
            }
        }
    }
    None
}

/// A file-backed stream with an internal sliding window.
pub struct FileStream {
    file: File,
    window: VecDeque<u8>,
    /// Absolute offset of `window[0]`.
    window_start: u64,
    eof: bool,
    capture: Option<Vec<u8>>,
}

impl FileStream {
    pub fn new(file: File) -> FileStream {
        FileStream {
            file,
            window: VecDeque::with_capacity(READ_CHUNK_SIZE * 2),
            window_start: 0,
            eof: false,
            capture: None,
        }
    }

    fn refill(&mut self) -> Result<usize, StreamError> {
        if self.eof {
            return Ok(0);
        }
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let n = self
            .file
            .read(&mut buf)
            .map_err(|e| StreamError::Io {
                offset: self.window_start + self.window.len() as u64,
                source: e,
            })?;
        if n == 0 {
            self.eof = true;
            return Ok(0);
        }
        self.window.extend(&buf[..n]);
        Ok(n)
    }
}

impl Stream for FileStream {
    fn peek(&mut self, min: usize) -> Result<&[u8], StreamError> {
        while self.window.len() < min && !self.eof {
            self.refill()?;
        }
        self.window.make_contiguous();
        Ok(self.window.as_slices().0)
    }

    fn consume(&mut self, n: usize) -> Result<(), StreamError> {
        debug_assert!(n <= self.window.len());
        if let Some(capture) = self.capture.as_mut() {
            capture.extend(self.window.iter().take(n));
        }
        for _ in 0..n {
            self.window.pop_front();
        }
        self.window_start += n as u64;
        Ok(())
    }

    fn readline(&mut self) -> Result<Vec<u8>, StreamError> {
        let mut out = Vec::new();
        loop {
            let window = self.peek(1)?;
            if window.is_empty() {
                return if out.is_empty() {
                    Err(StreamError::UnexpectedEof(self.tell()))
                } else {
                    Ok(out)
                };
            }
            if let Some(pos) = window.iter().position(|&b| b == b'\n') {
                out.extend_from_slice(&window[..pos]);
                self.consume(pos + 1)?;
                if out.last() == Some(&b'\r') {
                    out.pop();
                }
                return Ok(out);
            } else {
                let n = window.len();
                out.extend_from_slice(window);
                self.consume(n)?;
            }
        }
    }

    fn scan(&mut self, tokens: &[&[u8]]) -> Result<Option<usize>, StreamError> {
        let max_len = tokens.iter().map(|t| t.len()).max().unwrap_or(1);
        loop {
            let window = self.peek(max_len.max(READ_CHUNK_SIZE))?;
            let complete = self.eof && window.len() < max_len.max(READ_CHUNK_SIZE);
            if let Some((pos, which)) = find_any(window, tokens, complete) {
                self.consume(pos)?;
                return Ok(Some(which));
            }
            if self.eof {
                let advance = window.len().saturating_sub(max_len.saturating_sub(1));
                if advance == 0 {
                    return Ok(None);
                }
                self.consume(advance)?;
                if self.window.len() <= max_len.saturating_sub(1) {
                    self.consume(self.window.len())?;
                    return Ok(None);
                }
            } else {
                let keep = max_len.saturating_sub(1);
                let advance = window.len().saturating_sub(keep);
                if advance > 0 {
                    self.consume(advance)?;
                }
            }
        }
    }

    fn seek(&mut self, offset: u64) -> Result<(), StreamError> {
        self.file
            .seek(IoSeekFrom::Start(offset))
            .map_err(|e| StreamError::Io { offset, source: e })?;
        self.window.clear();
        self.window_start = offset;
        self.eof = false;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.window_start
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn start_capture(&mut self) {
        self.capture = Some(Vec::new());
    }

    fn take_capture(&mut self) -> Vec<u8> {
        self.capture.take().unwrap_or_default()
    }
}

/// An in-memory stream over an owned buffer.
pub struct MemoryStream {
    data: Vec<u8>,
    pos: usize,
    capture: Option<Vec<u8>>,
}

impl MemoryStream {
    pub fn new(data: Vec<u8>) -> MemoryStream {
        MemoryStream {
            data,
            pos: 0,
            capture: None,
        }
    }
}

impl Stream for MemoryStream {
    fn peek(&mut self, _min: usize) -> Result<&[u8], StreamError> {
        Ok(&self.data[self.pos..])
    }

    fn consume(&mut self, n: usize) -> Result<(), StreamError> {
        debug_assert!(self.pos + n <= self.data.len());
        if let Some(capture) = self.capture.as_mut() {
            capture.extend_from_slice(&self.data[self.pos..self.pos + n]);
        }
        self.pos += n;
        Ok(())
    }

    fn readline(&mut self) -> Result<Vec<u8>, StreamError> {
        let window = &self.data[self.pos..];
        if window.is_empty() {
            return Err(StreamError::UnexpectedEof(self.pos as u64));
        }
        match window.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let mut line = window[..pos].to_vec();
                self.consume(pos + 1)?;
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                Ok(line)
            }
            None => {
                let line = window.to_vec();
                let n = line.len();
                self.consume(n)?;
                Ok(line)
            }
        }
    }

    fn scan(&mut self, tokens: &[&[u8]]) -> Result<Option<usize>, StreamError> {
        let window = &self.data[self.pos..];
        match find_any(window, tokens, true) {
            Some((pos, which)) => {
                self.consume(pos)?;
                Ok(Some(which))
            }
            None => {
                let remaining = self.data.len() - self.pos;
                self.consume(remaining)?;
                Ok(None)
            }
        }
    }

    fn seek(&mut self, offset: u64) -> Result<(), StreamError> {
        if offset as usize > self.data.len() {
            return Err(StreamError::InvalidSeek(offset));
        }
        self.pos = offset as usize;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos as u64
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn start_capture(&mut self) {
        self.capture = Some(Vec::new());
    }

    fn take_capture(&mut self) -> Vec<u8> {
        self.capture.take().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_readline_strips_crlf() {
        let mut s = MemoryStream::new(b"hello\r\nworld".to_vec());
        assert_eq!(s.readline().unwrap(), b"hello");
        assert_eq!(s.readline().unwrap(), b"world");
    }

    #[test]
    fn memory_scan_finds_token() {
        let mut s = MemoryStream::new(b"xxxx\xD3BLKyyyy".to_vec());
        let which = s.scan(&[b"\xD3BLK"]).unwrap();
        assert_eq!(which, Some(0));
        assert_eq!(s.tell(), 4);
    }

    #[test]
    fn memory_scan_not_found_consumes_all() {
        let mut s = MemoryStream::new(b"no token here".to_vec());
        assert_eq!(s.scan(&[b"\xD3BLK"]).unwrap(), None);
        assert_eq!(s.tell(), 13);
    }

    #[test]
    fn memory_capture_collects_consumed_bytes() {
        let mut s = MemoryStream::new(b"abcdef".to_vec());
        s.start_capture();
        s.consume(3).unwrap();
        assert_eq!(s.take_capture(), b"abc");
    }
}
