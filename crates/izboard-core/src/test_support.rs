//! Hand-written fakes shared by the unit tests.

use core::convert::Infallible;

use embedded_io_async::{ErrorKind, ErrorType, Read, Write};

/// Byte source that hands out at most `max_chunk` bytes per read and
/// records everything written to it.
pub struct ScriptedStream {
    data: Vec<u8>,
    cursor: usize,
    max_chunk: usize,
    pub written: Vec<u8>,
}

impl ScriptedStream {
    pub fn new(data: &[u8]) -> Self {
        Self::chunked(data, usize::MAX)
    }

    pub fn chunked(data: &[u8], max_chunk: usize) -> Self {
        Self {
            data: data.to_vec(),
            cursor: 0,
            max_chunk: max_chunk.max(1),
            written: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn written_str(&self) -> &str {
        core::str::from_utf8(&self.written).unwrap()
    }
}

impl ErrorType for ScriptedStream {
    type Error = Infallible;
}

impl Read for ScriptedStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.remaining()).min(self.max_chunk);
        buf[..n].copy_from_slice(&self.data[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }
}

impl Write for ScriptedStream {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct LinkDropped;

impl embedded_io_async::Error for LinkDropped {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ConnectionReset
    }
}

/// Source that serves `data` and then fails instead of closing.
pub struct FailingStream {
    inner: ScriptedStream,
}

impl FailingStream {
    pub fn new(data: &[u8]) -> Self {
        Self {
            inner: ScriptedStream::new(data),
        }
    }
}

impl ErrorType for FailingStream {
    type Error = LinkDropped;
}

impl Read for FailingStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.inner.remaining() == 0 {
            return Err(LinkDropped);
        }
        let Ok(n) = self.inner.read(buf).await;
        Ok(n)
    }
}

/// Interleaves two planes the way the render endpoint does.
pub fn interleave(black: &[u8], red: &[u8]) -> Vec<u8> {
    black
        .iter()
        .zip(red.iter())
        .flat_map(|(b, r)| [*b, *r])
        .collect()
}

/// Connector handing out pre-scripted connections in order; `None` refuses.
pub struct FakeConnector {
    pub connections: Vec<Option<ScriptedStream>>,
    pub attempts: Vec<(std::string::String, u16)>,
}

impl FakeConnector {
    pub fn new(connections: Vec<Option<ScriptedStream>>) -> Self {
        Self {
            connections,
            attempts: Vec::new(),
        }
    }

    /// Request text written on the `index`th connection.
    pub fn request(&self, index: usize) -> &str {
        self.connections[index]
            .as_ref()
            .map(|stream| stream.written_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Refused;

impl crate::pipeline::Connector for FakeConnector {
    type Error = Refused;
    type Connection<'a> = &'a mut ScriptedStream;

    async fn connect(
        &mut self,
        host: &str,
        port: u16,
    ) -> Result<Self::Connection<'_>, Self::Error> {
        let index = self.attempts.len();
        self.attempts.push((host.into(), port));
        match self.connections.get_mut(index) {
            Some(Some(stream)) => Ok(stream),
            _ => Err(Refused),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PanelOp {
    Window(u16, u16, u16, u16),
    Band {
        y: u16,
        height: u16,
        black: Vec<u8>,
        red: Vec<u8>,
    },
    Refresh,
    PowerOff,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PanelFault;

/// Display that records every operation; can fail on the nth band write.
#[derive(Default)]
pub struct RecordingDisplay {
    pub ops: Vec<PanelOp>,
    pub fail_band: Option<usize>,
}

impl RecordingDisplay {
    pub fn band_rows(&self) -> Vec<u16> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                PanelOp::Band { y, .. } => Some(*y),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &PanelOp) -> usize {
        self.ops.iter().filter(|op| *op == wanted).count()
    }
}

impl crate::pipeline::BandDisplay for RecordingDisplay {
    type Error = PanelFault;

    fn set_partial_window(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    ) -> Result<(), Self::Error> {
        self.ops.push(PanelOp::Window(x, y, width, height));
        Ok(())
    }

    fn write_band(
        &mut self,
        black: &[u8],
        red: &[u8],
        _x: u16,
        y: u16,
        _width: u16,
        height: u16,
    ) -> Result<(), Self::Error> {
        if self.fail_band == Some(self.band_rows().len()) {
            return Err(PanelFault);
        }
        self.ops.push(PanelOp::Band {
            y,
            height,
            black: black.to_vec(),
            red: red.to_vec(),
        });
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), Self::Error> {
        self.ops.push(PanelOp::Refresh);
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), Self::Error> {
        self.ops.push(PanelOp::PowerOff);
        Ok(())
    }
}

/// HTTP 200 response with `body`.
pub fn ok_response(body: &[u8]) -> Vec<u8> {
    let mut response = b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n".to_vec();
    response.extend_from_slice(body);
    response
}

/// Pin that reads high for a fixed number of samples, then low.
pub struct HeldPin {
    high_samples: u32,
    reads: u32,
}

impl HeldPin {
    pub fn new(high_samples: u32) -> Self {
        Self {
            high_samples,
            reads: 0,
        }
    }

    pub fn released() -> Self {
        Self::new(0)
    }
}

impl embedded_hal::digital::ErrorType for HeldPin {
    type Error = Infallible;
}

impl embedded_hal::digital::InputPin for HeldPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let high = self.reads < self.high_samples;
        self.reads += 1;
        Ok(high)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

#[derive(Default)]
pub struct CountingDelay {
    pub elapsed_ns: u64,
}

impl embedded_hal::delay::DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += ns as u64;
    }
}
