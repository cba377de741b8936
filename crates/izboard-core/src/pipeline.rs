//! Render fetch pipeline: pull the frame band by band into the panel, then
//! ask the server how long to sleep.

use core::fmt::{Debug, Write as _};

use embedded_io_async::{Read, Write};
use heapless::{String, Vec};
use log::{info, warn};

use crate::{
    config::Configuration,
    frame::{BandBuffers, DecodeError, FrameGeometry, StreamingFrameDecoder},
    http::{BufferedReader, parse_wait_seconds, read_response_head, write_get_request},
};

pub const RENDER_PATH: &str = "/api/render/binary";
pub const NEXT_WAIT_PATH: &str = "/api/configuration/next-update-wait-seconds";

const PATH_BYTES: usize = 64;
const WAIT_LINE_BYTES: usize = 32;

/// Opens a fresh stream connection per request.
pub trait Connector {
    type Error: Debug;
    type Connection<'a>: Read + Write
    where
        Self: 'a;

    async fn connect(
        &mut self,
        host: &str,
        port: u16,
    ) -> Result<Self::Connection<'_>, Self::Error>;
}

/// Band-level panel operations used while streaming a frame.
pub trait BandDisplay {
    type Error: Debug;

    fn set_partial_window(&mut self, x: u16, y: u16, width: u16, height: u16)
    -> Result<(), Self::Error>;

    /// Writes one band; both planes use `0` for an inked pixel.
    fn write_band(
        &mut self,
        black: &[u8],
        red: &[u8],
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    ) -> Result<(), Self::Error>;

    fn refresh(&mut self) -> Result<(), Self::Error>;
    fn power_off(&mut self) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchOutcome {
    Complete,
    InvalidPort,
    ConnectFailed,
    RequestFailed,
    BadResponse,
    ShortRead,
    DisplayFailed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FetchReport {
    pub outcome: FetchOutcome,
    pub bands_written: u16,
}

impl FetchReport {
    const fn new(outcome: FetchOutcome, bands_written: u16) -> Self {
        Self {
            outcome,
            bands_written,
        }
    }
}

/// Fetches and paints the frame, then refreshes (if anything was written)
/// and powers the panel off.
pub async fn fetch_frame<C, D>(
    connector: &mut C,
    display: &mut D,
    buffers: &mut BandBuffers,
    geometry: FrameGeometry,
    config: &Configuration,
) -> FetchReport
where
    C: Connector,
    D: BandDisplay,
{
    let report = stream_frame(connector, display, buffers, geometry, config).await;
    info!(
        "fetch: frame {:?} after {} band(s)",
        report.outcome, report.bands_written
    );

    if report.bands_written > 0 {
        if let Err(err) = display.refresh() {
            warn!("fetch: panel refresh failed: {:?}", err);
        }
    }
    if let Err(err) = display.power_off() {
        warn!("fetch: panel power off failed: {:?}", err);
    }

    report
}

async fn stream_frame<C, D>(
    connector: &mut C,
    display: &mut D,
    buffers: &mut BandBuffers,
    geometry: FrameGeometry,
    config: &Configuration,
) -> FetchReport
where
    C: Connector,
    D: BandDisplay,
{
    let Some(port) = config.tcp_port() else {
        warn!("fetch: port {} out of range", config.port);
        return FetchReport::new(FetchOutcome::InvalidPort, 0);
    };

    let mut path: String<PATH_BYTES> = String::new();
    if write!(
        path,
        "{}?width={}&height={}",
        RENDER_PATH,
        geometry.width(),
        geometry.height()
    )
    .is_err()
    {
        return FetchReport::new(FetchOutcome::RequestFailed, 0);
    }

    let connection = match connector.connect(&config.server, port).await {
        Ok(connection) => connection,
        Err(err) => {
            warn!("fetch: connect {}:{} failed: {:?}", config.server, port, err);
            return FetchReport::new(FetchOutcome::ConnectFailed, 0);
        }
    };
    let mut reader = BufferedReader::new(connection);

    if let Err(err) =
        write_get_request(reader.get_mut(), &path, &config.server, port, &config.api_key).await
    {
        warn!("fetch: sending request failed: {:?}", err);
        return FetchReport::new(FetchOutcome::RequestFailed, 0);
    }

    if let Err(err) = read_response_head(&mut reader).await {
        warn!("fetch: render request rejected: {:?}", err);
        return FetchReport::new(FetchOutcome::BadResponse, 0);
    }

    if let Err(err) = display.set_partial_window(0, 0, geometry.width(), geometry.height()) {
        warn!("fetch: partial window failed: {:?}", err);
        return FetchReport::new(FetchOutcome::DisplayFailed, 0);
    }

    let mut decoder = StreamingFrameDecoder::new(geometry, buffers);
    let mut bands_written = 0u16;

    loop {
        match decoder.next_band(&mut reader).await {
            Ok(Some(band)) => {
                if let Err(err) =
                    display.write_band(band.black, band.red, 0, band.y, band.width, band.height)
                {
                    warn!("fetch: writing band y={} failed: {:?}", band.y, err);
                    return FetchReport::new(FetchOutcome::DisplayFailed, bands_written);
                }
                bands_written += 1;
                info!("fetch: band y={} written", band.y);
            }
            Ok(None) => return FetchReport::new(FetchOutcome::Complete, bands_written),
            Err(DecodeError::ShortRead { y, .. }) => {
                info!("fetch: image incomplete at y={}", y);
                return FetchReport::new(FetchOutcome::ShortRead, bands_written);
            }
            Err(DecodeError::Source(err)) => {
                warn!("fetch: image read failed: {:?}", err);
                return FetchReport::new(FetchOutcome::ShortRead, bands_written);
            }
        }
    }
}

/// Asks the server for the next sleep duration in seconds.
///
/// Any failure, an empty body, or a body without leading digits means no value.
pub async fn fetch_next_wait<C>(connector: &mut C, config: &Configuration) -> Option<u64>
where
    C: Connector,
{
    let port = config.tcp_port()?;
    let connection = match connector.connect(&config.server, port).await {
        Ok(connection) => connection,
        Err(err) => {
            warn!("fetch: next-wait connect failed: {:?}", err);
            return None;
        }
    };
    let mut reader = BufferedReader::new(connection);

    if let Err(err) = write_get_request(
        reader.get_mut(),
        NEXT_WAIT_PATH,
        &config.server,
        port,
        &config.api_key,
    )
    .await
    {
        warn!("fetch: next-wait request failed: {:?}", err);
        return None;
    }

    if let Err(err) = read_response_head(&mut reader).await {
        warn!("fetch: next-wait rejected: {:?}", err);
        return None;
    }

    let mut line: Vec<u8, WAIT_LINE_BYTES> = Vec::new();
    match reader.read_line(&mut line).await {
        Ok(true) => {}
        Ok(false) => return None,
        Err(err) => {
            warn!("fetch: next-wait body read failed: {:?}", err);
            return None;
        }
    }

    let wait = parse_wait_seconds(&line);
    info!("fetch: next wait {:?}s", wait);
    wait
}
