//! Band-wise decoding of the two-plane frame stream.
//!
//! The server sends the frame as one unframed byte stream. Within every band
//! the bytes alternate between the black plane (even offsets) and the red
//! plane (odd offsets), so a band of `n` bytes per plane arrives as `2n`
//! interleaved bytes. Only one band is ever held in memory.

use alloc::vec::Vec;

use embedded_io_async::Read;
use log::{debug, warn};

/// Upper bound of a single source read.
pub const READ_CHUNK_BYTES: usize = 1024;
/// Value a plane byte is reset to before a band is filled.
pub const BLANK_BYTE: u8 = 0xFF;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum GeometryError {
    WidthNotByteAligned,
    HeightNotBandAligned,
    Empty,
}

/// Panel size and band height.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameGeometry {
    width: u16,
    height: u16,
    band_height: u16,
}

impl FrameGeometry {
    /// GDEW075Z08: 800x480 split into three 160-row bands.
    pub const PANEL: Self = Self {
        width: 800,
        height: 480,
        band_height: 160,
    };

    pub const fn new(width: u16, height: u16, band_height: u16) -> Result<Self, GeometryError> {
        if width == 0 || height == 0 || band_height == 0 {
            return Err(GeometryError::Empty);
        }
        if width % 8 != 0 {
            return Err(GeometryError::WidthNotByteAligned);
        }
        if height % band_height != 0 {
            return Err(GeometryError::HeightNotBandAligned);
        }
        Ok(Self {
            width,
            height,
            band_height,
        })
    }

    pub const fn width(&self) -> u16 {
        self.width
    }

    pub const fn height(&self) -> u16 {
        self.height
    }

    pub const fn band_height(&self) -> u16 {
        self.band_height
    }

    pub const fn band_count(&self) -> u16 {
        self.height / self.band_height
    }

    /// Bytes of one plane within one band.
    pub const fn plane_bytes(&self) -> usize {
        self.width as usize * self.band_height as usize / 8
    }

    /// Interleaved stream bytes that make up one band.
    pub const fn band_stream_bytes(&self) -> usize {
        self.plane_bytes() * 2
    }

    pub const fn frame_stream_bytes(&self) -> usize {
        self.band_stream_bytes() * self.band_count() as usize
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct AllocationFailure {
    pub requested: usize,
}

/// The two plane buffers of one band. Allocated once per boot, never grown.
#[derive(Debug)]
pub struct BandBuffers {
    black: Vec<u8>,
    red: Vec<u8>,
}

impl BandBuffers {
    pub fn allocate(geometry: &FrameGeometry) -> Result<Self, AllocationFailure> {
        let len = geometry.plane_bytes();
        Ok(Self {
            black: allocate_plane(len)?,
            red: allocate_plane(len)?,
        })
    }

    pub fn len(&self) -> usize {
        self.black.len()
    }

    pub fn is_empty(&self) -> bool {
        self.black.is_empty()
    }

    pub fn clear(&mut self) {
        self.black.fill(BLANK_BYTE);
        self.red.fill(BLANK_BYTE);
    }

    pub fn planes(&self) -> (&[u8], &[u8]) {
        (&self.black, &self.red)
    }

    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        (&mut self.black, &mut self.red)
    }
}

fn allocate_plane(len: usize) -> Result<Vec<u8>, AllocationFailure> {
    let mut plane = Vec::new();
    plane
        .try_reserve_exact(len)
        .map_err(|_| AllocationFailure { requested: len })?;
    plane.resize(len, BLANK_BYTE);
    Ok(plane)
}

/// A fully populated band, borrowed from the decoder's buffers.
#[derive(Debug)]
pub struct Band<'a> {
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub black: &'a [u8],
    pub red: &'a [u8],
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DecodeError<E> {
    /// The source closed before the band at `y` was complete.
    ShortRead {
        y: u16,
        received: usize,
        expected: usize,
    },
    /// The source reported an error; the partial band is discarded.
    Source(E),
}

/// Streaming decoder producing the frame one band at a time.
///
/// Once a band fails to complete, the decoder is finished and yields nothing more.
#[derive(Debug)]
pub struct StreamingFrameDecoder<'b> {
    geometry: FrameGeometry,
    buffers: &'b mut BandBuffers,
    next_y: u16,
    finished: bool,
}

impl<'b> StreamingFrameDecoder<'b> {
    pub fn new(geometry: FrameGeometry, buffers: &'b mut BandBuffers) -> Self {
        Self {
            geometry,
            buffers,
            next_y: 0,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished || self.next_y >= self.geometry.height()
    }

    /// Reads the next band from `source`.
    ///
    /// Returns `Ok(None)` after the last band of the frame.
    pub async fn next_band<R>(
        &mut self,
        source: &mut R,
    ) -> Result<Option<Band<'_>>, DecodeError<R::Error>>
    where
        R: Read,
    {
        if self.is_finished() {
            return Ok(None);
        }

        let expected = self.geometry.band_stream_bytes();
        if self.buffers.len() < self.geometry.plane_bytes() {
            self.finished = true;
            return Err(DecodeError::ShortRead {
                y: self.next_y,
                received: 0,
                expected,
            });
        }

        self.buffers.clear();
        let (black, red) = self.buffers.planes_mut();
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        let mut received = 0usize;

        while received < expected {
            let want = (expected - received).min(READ_CHUNK_BYTES);
            let n = match source.read(&mut chunk[..want]).await {
                Ok(0) => {
                    self.finished = true;
                    warn!(
                        "decode: stream ended at y={} after {}/{} bytes",
                        self.next_y, received, expected
                    );
                    return Err(DecodeError::ShortRead {
                        y: self.next_y,
                        received,
                        expected,
                    });
                }
                Ok(n) => n,
                Err(err) => {
                    self.finished = true;
                    warn!(
                        "decode: source error at y={} after {}/{} bytes",
                        self.next_y, received, expected
                    );
                    return Err(DecodeError::Source(err));
                }
            };

            for (offset, byte) in chunk[..n].iter().enumerate() {
                let index = received + offset;
                let plane = if index % 2 == 0 {
                    &mut *black
                } else {
                    &mut *red
                };
                plane[index / 2] = *byte;
            }
            received += n;
        }

        let y = self.next_y;
        self.next_y = self.next_y.saturating_add(self.geometry.band_height());
        debug!("decode: band y={} complete", y);

        let (black, red) = self.buffers.planes();
        let plane_bytes = self.geometry.plane_bytes();
        Ok(Some(Band {
            y,
            width: self.geometry.width(),
            height: self.geometry.band_height(),
            black: &black[..plane_bytes],
            red: &red[..plane_bytes],
        }))
    }
}
