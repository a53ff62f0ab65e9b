//! Read CRLF-terminated lines from any asynchronous byte stream.
//!
//! Chat clients talk to the server one line at a time.  This crate provides
//! the small amount of framing the server needs: a buffered reader that
//! yields complete `\r\n`-terminated lines and gives up on peers that send
//! unbounded garbage, plus the outgoing newline normalisation that keeps
//! every payload CRLF-framed on the wire.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// How many unread bytes a peer may accumulate without sending a line
/// terminator before the connection is considered hostile.
pub const MAX_LINE: usize = 64 * 1024;

const SEPARATOR: &[u8] = b"\r\n";
const READ_CHUNK: usize = 4096;

/// A buffered CRLF line reader over an asynchronous byte stream.
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    scanned: usize,
    max: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max(inner, MAX_LINE)
    }

    pub fn with_max(inner: R, max: usize) -> Self {
        LineReader {
            inner,
            buf: Vec::new(),
            scanned: 0,
            max,
        }
    }

    /// Returns the next line, including its CRLF terminator.
    ///
    /// `Ok(None)` signals a clean end of stream between lines.  An end of
    /// stream in the middle of a line, or more than `max` buffered bytes
    /// with no terminator in sight, is an error.
    pub async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(at) = self.find_separator() {
                let rest = self.buf.split_off(at + SEPARATOR.len());
                let line = std::mem::replace(&mut self.buf, rest);
                self.scanned = 0;
                return Ok(Some(line));
            }
            if self.buf.len() > self.max {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "line exceeds the receive buffer cap",
                ));
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(io::ErrorKind::UnexpectedEof.into())
                };
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Scans forward for the `\r\n` pair, resuming where the previous scan
    /// stopped.  Returns the index of the `\r`.
    fn find_separator(&mut self) -> Option<usize> {
        let mut start = self.scanned.saturating_sub(1);
        while let Some(i) = memchr::memchr(b'\n', &self.buf[start..]) {
            let at = start + i;
            if at > 0 && self.buf[at - 1] == b'\r' {
                return Some(at - 1);
            }
            start = at + 1;
        }
        self.scanned = self.buf.len();
        None
    }
}

/// Normalises newlines for the wire: every lone `\r`, lone `\n` and `\r\n`
/// pair in `text` becomes a single `\r\n`.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\r\n");
            }
            '\n' => out.push_str("\r\n"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn lines_of(input: &[u8]) -> Vec<Vec<u8>> {
        let mut reader = LineReader::new(input);
        let mut res = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            res.push(line);
        }
        res
    }

    #[tokio::test]
    async fn splits_on_crlf_only() {
        let lines = lines_of(b"one\r\ntwo\nstill two\r\n").await;
        assert_eq!(lines, vec![b"one\r\n".to_vec(), b"two\nstill two\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn empty_lines_are_preserved() {
        let lines = lines_of(b"\r\n\r\na\r\n").await;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], b"\r\n");
    }

    #[tokio::test]
    async fn eof_mid_line_is_an_error() {
        let mut reader = LineReader::new(&b"partial"[..]);
        let err = reader.next_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn oversize_line_is_rejected() {
        let big = vec![b'a'; MAX_LINE + READ_CHUNK];
        let mut reader = LineReader::new(&big[..]);
        let err = reader.next_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn long_terminated_line_under_the_cap_passes() {
        let mut data = vec![b'a'; 1000];
        data.extend_from_slice(b"\r\n");
        let lines = lines_of(&data).await;
        assert_eq!(lines[0].len(), 1002);
    }

    #[test]
    fn normalize_rewrites_every_newline_flavour() {
        assert_eq!(normalize("a\nb"), "a\r\nb");
        assert_eq!(normalize("a\rb"), "a\r\nb");
        assert_eq!(normalize("a\r\nb"), "a\r\nb");
        assert_eq!(normalize("a\n\rb"), "a\r\n\r\nb");
        assert_eq!(normalize("plain"), "plain");
        assert_eq!(normalize("end\n"), "end\r\n");
    }
}
