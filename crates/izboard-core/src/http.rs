//! Minimal HTTP/1.1 client framing used by the render fetch.
//!
//! Only what the render endpoints need: a GET with the API key header, a
//! status check while skipping headers, and line reads for short bodies.

use core::fmt::Write as _;

use embedded_io_async::{ErrorType, Read, Write};
use heapless::{String, Vec};
use log::debug;

pub const API_KEY_HEADER: &str = "X-Api-Key";
pub const READ_BUFFER_BYTES: usize = 1024;
pub const LINE_BYTES: usize = 256;
const REQUEST_BYTES: usize = 512;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum HttpError<E> {
    Io(E),
    /// The request did not fit the request buffer.
    RequestTooLong,
    /// The peer closed before the header block ended.
    Closed,
    /// Headers ended without a `200` status line; carries the last code seen.
    Status(Option<u16>),
}

/// Writes a `GET` request for `path` with the API key and `Connection: close`.
pub async fn write_get_request<W>(
    writer: &mut W,
    path: &str,
    host: &str,
    port: u16,
    api_key: &str,
) -> Result<(), HttpError<W::Error>>
where
    W: Write,
{
    let mut request: String<REQUEST_BYTES> = String::new();
    write!(
        request,
        "GET {path} HTTP/1.1\r\n{API_KEY_HEADER}: {api_key}\r\nHost: {host}:{port}\r\nConnection: close\r\n\r\n"
    )
    .map_err(|_| HttpError::RequestTooLong)?;

    writer
        .write_all(request.as_bytes())
        .await
        .map_err(HttpError::Io)?;
    writer.flush().await.map_err(HttpError::Io)
}

/// Read buffer in front of a connection, with line-oriented reads.
///
/// Implements [`Read`] itself so the body can be handed on after the headers
/// without losing bytes that were already buffered.
pub struct BufferedReader<R> {
    inner: R,
    buf: [u8; READ_BUFFER_BYTES],
    start: usize,
    end: usize,
}

impl<R: Read> BufferedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: [0; READ_BUFFER_BYTES],
            start: 0,
            end: 0,
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    async fn fill(&mut self) -> Result<usize, R::Error> {
        if self.start < self.end {
            return Ok(self.end - self.start);
        }
        self.start = 0;
        self.end = self.inner.read(&mut self.buf).await?;
        Ok(self.end)
    }

    /// Reads one line without its terminator; a trailing `\r` is dropped.
    ///
    /// Bytes beyond the capacity of `line` are discarded. Returns `Ok(false)`
    /// when the stream ended before any byte of the line arrived.
    pub async fn read_line<const N: usize>(
        &mut self,
        line: &mut Vec<u8, N>,
    ) -> Result<bool, R::Error> {
        line.clear();
        let mut any = false;

        loop {
            if self.fill().await? == 0 {
                strip_cr(line);
                return Ok(any);
            }
            any = true;

            let pending = &self.buf[self.start..self.end];
            match pending.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    let _ = line.extend_from_slice(&pending[..pos.min(N - line.len())]);
                    self.start += pos + 1;
                    strip_cr(line);
                    return Ok(true);
                }
                None => {
                    let room = N - line.len();
                    let _ = line.extend_from_slice(&pending[..pending.len().min(room)]);
                    self.start = self.end;
                }
            }
        }
    }
}

fn strip_cr<const N: usize>(line: &mut Vec<u8, N>) {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
}

impl<R: Read> ErrorType for BufferedReader<R> {
    type Error = R::Error;
}

impl<R: Read> Read for BufferedReader<R> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.start < self.end {
            let n = buf.len().min(self.end - self.start);
            buf[..n].copy_from_slice(&self.buf[self.start..self.start + n]);
            self.start += n;
            return Ok(n);
        }
        self.inner.read(buf).await
    }
}

/// Status code of a status line such as `HTTP/1.1 200 OK`.
pub fn parse_status_line(line: &[u8]) -> Option<u16> {
    let line = core::str::from_utf8(line).ok()?;
    let mut parts = line.split_ascii_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    let code = parts.next()?;
    if code.len() != 3 {
        return None;
    }
    code.parse().ok()
}

/// Consumes the status line and headers up to and including the blank line.
///
/// Succeeds if any status line before the blank line reported `200`.
pub async fn read_response_head<R>(reader: &mut BufferedReader<R>) -> Result<(), HttpError<R::Error>>
where
    R: Read,
{
    let mut line: Vec<u8, LINE_BYTES> = Vec::new();
    let mut status = None;

    loop {
        if !reader.read_line(&mut line).await.map_err(HttpError::Io)? {
            return Err(HttpError::Closed);
        }
        if line.is_empty() {
            break;
        }
        if let Some(code) = parse_status_line(&line) {
            debug!("fetch: status {}", code);
            status = status.filter(|seen| *seen == 200).or(Some(code));
        }
    }

    match status {
        Some(200) => Ok(()),
        other => Err(HttpError::Status(other)),
    }
}

/// Leading decimal digits of a next-wait body.
///
/// Leading spaces are skipped; anything without digits is no value.
pub fn parse_wait_seconds(body: &[u8]) -> Option<u64> {
    let digits = body
        .iter()
        .skip_while(|b| **b == b' ' || **b == b'\t')
        .take_while(|b| b.is_ascii_digit());

    let mut seen = false;
    let mut value = 0u64;
    for digit in digits {
        seen = true;
        value = value
            .saturating_mul(10)
            .saturating_add((digit - b'0') as u64);
    }
    seen.then_some(value)
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::test_support::ScriptedStream;

    #[test]
    fn request_carries_key_host_and_close() {
        let mut stream = ScriptedStream::new(&[]);
        block_on(write_get_request(
            &mut stream,
            "/api/render/binary?width=800&height=480",
            "dash.lan",
            8080,
            "secret",
        ))
        .unwrap();

        assert_eq!(
            stream.written_str(),
            "GET /api/render/binary?width=800&height=480 HTTP/1.1\r\n\
             X-Api-Key: secret\r\n\
             Host: dash.lan:8080\r\n\
             Connection: close\r\n\
             \r\n"
        );
    }

    #[test]
    fn lines_split_across_reads_are_joined() {
        let stream = ScriptedStream::chunked(b"HTTP/1.1 200 OK\r\nA: b\r\n\r\nBODY", 3);
        let mut reader = BufferedReader::new(stream);
        let mut line: Vec<u8, LINE_BYTES> = Vec::new();

        assert!(block_on(reader.read_line(&mut line)).unwrap());
        assert_eq!(&line[..], b"HTTP/1.1 200 OK");
        assert!(block_on(reader.read_line(&mut line)).unwrap());
        assert_eq!(&line[..], b"A: b");
        assert!(block_on(reader.read_line(&mut line)).unwrap());
        assert!(line.is_empty());

        let mut body = std::vec::Vec::new();
        let mut chunk = [0u8; 8];
        loop {
            let n = block_on(reader.read(&mut chunk)).unwrap();
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(body, b"BODY");
    }

    #[test]
    fn overlong_line_is_truncated_but_fully_consumed() {
        let mut data = vec![b'x'; 40];
        data.extend_from_slice(b"\nnext\n");
        let mut reader = BufferedReader::new(ScriptedStream::chunked(&data, 7));
        let mut line: Vec<u8, 8> = Vec::new();

        assert!(block_on(reader.read_line(&mut line)).unwrap());
        assert_eq!(line.len(), 8);
        assert!(block_on(reader.read_line(&mut line)).unwrap());
        assert_eq!(&line[..], b"next");
    }

    #[test]
    fn head_with_ok_status_is_accepted_and_body_is_left() {
        let stream = ScriptedStream::new(
            b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\n\r\n\x01\x02",
        );
        let mut reader = BufferedReader::new(stream);

        assert_eq!(block_on(read_response_head(&mut reader)), Ok(()));

        let mut body = [0u8; 4];
        let n = block_on(reader.read(&mut body)).unwrap();
        assert_eq!(&body[..n], &[1, 2]);
    }

    #[test]
    fn bare_newline_ends_the_header_block() {
        let mut reader = BufferedReader::new(ScriptedStream::new(b"HTTP/1.0 200 OK\n\nrest"));
        assert_eq!(block_on(read_response_head(&mut reader)), Ok(()));
    }

    #[test]
    fn non_ok_status_is_rejected() {
        let mut reader = BufferedReader::new(ScriptedStream::new(
            b"HTTP/1.1 401 Unauthorized\r\n\r\nMissing API key.",
        ));
        assert_eq!(
            block_on(read_response_head(&mut reader)),
            Err(HttpError::Status(Some(401)))
        );
    }

    #[test]
    fn later_status_line_does_not_undo_an_ok() {
        let mut reader = BufferedReader::new(ScriptedStream::new(
            b"HTTP/1.1 200 OK\r\nX-Upstream: HTTP/1.1 502 Bad Gateway\r\nHTTP/1.1 502 Bad Gateway\r\n\r\n",
        ));
        assert_eq!(block_on(read_response_head(&mut reader)), Ok(()));

        let mut reader = BufferedReader::new(ScriptedStream::new(
            b"HTTP/1.1 100 Continue\r\nHTTP/1.1 200 OK\r\n\r\n",
        ));
        assert_eq!(block_on(read_response_head(&mut reader)), Ok(()));
    }

    #[test]
    fn close_inside_headers_is_reported() {
        let mut reader = BufferedReader::new(ScriptedStream::new(b"HTTP/1.1 200 OK\r\nX: y\r\n"));
        assert_eq!(
            block_on(read_response_head(&mut reader)),
            Err(HttpError::Closed)
        );
    }

    #[test]
    fn status_line_parsing() {
        assert_eq!(parse_status_line(b"HTTP/1.1 200 OK"), Some(200));
        assert_eq!(parse_status_line(b"HTTP/1.1 404 Not Found"), Some(404));
        assert_eq!(parse_status_line(b"Server: HTTP/1.1 200"), None);
        assert_eq!(parse_status_line(b"HTTP/1.1 2000"), None);
    }

    #[test]
    fn wait_seconds_needs_leading_digits() {
        assert_eq!(parse_wait_seconds(b"3600"), Some(3600));
        assert_eq!(parse_wait_seconds(b"  42s"), Some(42));
        assert_eq!(parse_wait_seconds(b"0"), Some(0));
        assert_eq!(parse_wait_seconds(b""), None);
        assert_eq!(parse_wait_seconds(b"{\"waitSeconds\":5}"), None);
        assert_eq!(
            parse_wait_seconds(b"99999999999999999999999"),
            Some(u64::MAX)
        );
    }
}
