//! Frame a byte stream into CRLF-terminated IRC lines.
//!
//! Each user owns one [`LineReader`] wrapped around its socket (or, when an
//! I/O hook is installed on the listening port, around whatever the hook
//! hands back). `next_line` drives one `AsyncRead::poll_read` and returns
//! any complete lines that have accumulated; callers loop until it returns
//! `Ok(None)` meaning "no more complete lines, wait for more readability".

use std::io;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;

/// Framing failed: the peer sent more than `max_line_len` bytes without a
/// line terminator. The caller should close the connection (this is a
/// recoverable per-connection error, not a server fault).
#[derive(Debug)]
pub struct Overflow;

impl std::fmt::Display for Overflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line too long")
    }
}

impl std::error::Error for Overflow {}

/// Buffers partial reads and slices out complete lines.
pub struct LineReader {
    buf: Vec<u8>,
    /// Index up to which `buf` has been scanned for a line terminator.
    scanned: usize,
    max_line_len: usize,
}

impl LineReader {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(512),
            scanned: 0,
            max_line_len,
        }
    }

    /// Reads once from `socket`, then pulls out every complete line now
    /// available. A read of zero bytes means EOF.
    pub async fn read_lines<R>(&mut self, socket: &mut R) -> io::Result<ReadOutcome>
        where R: AsyncRead + Unpin
    {
        let start = self.buf.len();
        self.buf.resize(start + 4096, 0);
        let n = socket.read(&mut self.buf[start..]).await?;
        self.buf.truncate(start + n);
        if n == 0 {
            return Ok(ReadOutcome::Eof);
        }
        self.drain_lines()
            .map(ReadOutcome::Lines)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn drain_lines(&mut self) -> Result<Vec<String>, Overflow> {
        let mut lines = Vec::new();
        loop {
            let newline = memchr::memchr(b'\n', &self.buf[self.scanned..])
                .map(|i| self.scanned + i);
            match newline {
                Some(pos) => {
                    let mut end = pos;
                    if end > 0 && self.buf[end - 1] == b'\r' {
                        end -= 1;
                    }
                    let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();
                    lines.push(line);
                    self.buf.drain(..=pos);
                    self.scanned = 0;
                }
                None => {
                    self.scanned = self.buf.len();
                    if self.buf.len() > self.max_line_len {
                        self.buf.clear();
                        self.scanned = 0;
                        return Err(Overflow);
                    }
                    return Ok(lines);
                }
            }
        }
    }
}

pub enum ReadOutcome {
    Lines(Vec<String>),
    Eof,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn splits_crlf_lines() {
        let mut socket = Cursor::new(b"NICK a\r\nUSER a 0 * :a\r\n".to_vec());
        let mut reader = LineReader::new(512);
        match reader.read_lines(&mut socket).await.unwrap() {
            ReadOutcome::Lines(lines) => {
                assert_eq!(lines, vec!["NICK a".to_owned(), "USER a 0 * :a".to_owned()]);
            }
            ReadOutcome::Eof => panic!("expected lines"),
        }
    }

    #[tokio::test]
    async fn tolerates_bare_lf() {
        let mut socket = Cursor::new(b"PING x\n".to_vec());
        let mut reader = LineReader::new(512);
        match reader.read_lines(&mut socket).await.unwrap() {
            ReadOutcome::Lines(lines) => assert_eq!(lines, vec!["PING x".to_owned()]),
            ReadOutcome::Eof => panic!("expected lines"),
        }
    }

    #[tokio::test]
    async fn reports_overflow() {
        let data = vec![b'x'; 20];
        let mut socket = Cursor::new(data);
        let mut reader = LineReader::new(8);
        let err = reader.read_lines(&mut socket).await;
        assert!(matches!(err, Err(_)));
    }

    #[tokio::test]
    async fn eof_on_empty_read() {
        let mut socket = Cursor::new(Vec::new());
        let mut reader = LineReader::new(512);
        match reader.read_lines(&mut socket).await.unwrap() {
            ReadOutcome::Eof => {}
            ReadOutcome::Lines(_) => panic!("expected eof"),
        }
    }
}
