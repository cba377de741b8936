#![cfg_attr(not(test), no_std)]

//! GDEW075Z08 (7.5" 800x480 black/white/red e-paper, GD7965) driver.
//!
//! Image data is written per partial window so a frame can be streamed in
//! horizontal bands without a full-frame buffer.

pub mod protocol;

#[cfg(any(test, feature = "embedded-graphics"))]
mod graphics;

#[cfg(any(test, feature = "embedded-graphics"))]
pub use graphics::{BandCanvas, TriColor};

use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::SpiDevice,
};

use protocol::{Command, Window};

/// Driver configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// Reset pulse low time and settle time after it.
    pub reset_ms: u32,
    /// Longest wait for BUSY to release.
    pub busy_timeout_ms: u32,
    /// BUSY polling interval.
    pub busy_poll_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reset_ms: 10,
            busy_timeout_ms: 20_000,
            busy_poll_ms: 1,
        }
    }
}

/// Driver errors.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Error<SpiErr, DcErr, RstErr, BusyErr> {
    /// SPI transaction failed.
    Spi(SpiErr),
    /// DC pin operation failed.
    Dc(DcErr),
    /// RST pin operation failed.
    Rst(RstErr),
    /// BUSY pin read failed.
    Busy(BusyErr),
    /// BUSY stayed asserted past the configured timeout.
    BusyTimeout,
    /// Window or buffer does not fit the panel.
    InvalidInput,
}

pub type DriverResult<SpiErr, DcErr, RstErr, BusyErr> =
    Result<(), Error<SpiErr, DcErr, RstErr, BusyErr>>;

type Res<SPI, DC, RST, BUSY> = DriverResult<
    <SPI as embedded_hal::spi::ErrorType>::Error,
    <DC as embedded_hal::digital::ErrorType>::Error,
    <RST as embedded_hal::digital::ErrorType>::Error,
    <BUSY as embedded_hal::digital::ErrorType>::Error,
>;

/// Bytes pushed per SPI write while streaming a plane.
const CHUNK_BYTES: usize = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Power {
    /// Not initialised since construction or deep sleep.
    Reset,
    Off,
    On,
}

/// GDEW075Z08 driver.
#[derive(Debug)]
pub struct Gdew075z08<SPI, DC, RST, BUSY, DELAY> {
    spi: SPI,
    dc: DC,
    rst: RST,
    busy: BUSY,
    delay: DELAY,
    config: Config,
    power: Power,
    window: Window,
}

impl<SPI, DC, RST, BUSY, DELAY> Gdew075z08<SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice<u8>,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    DELAY: DelayNs,
{
    /// Creates a driver; the panel is initialised on first use.
    pub fn new(spi: SPI, dc: DC, rst: RST, busy: BUSY, delay: DELAY, config: Config) -> Self {
        Self {
            spi,
            dc,
            rst,
            busy,
            delay,
            config,
            power: Power::Reset,
            window: Window::full(),
        }
    }

    /// Hardware reset followed by the power and panel setup sequence.
    pub fn init(&mut self) -> Res<SPI, DC, RST, BUSY> {
        self.rst.set_high().map_err(Error::Rst)?;
        self.delay.delay_ms(self.config.reset_ms);
        self.rst.set_low().map_err(Error::Rst)?;
        self.delay.delay_ms(self.config.reset_ms);
        self.rst.set_high().map_err(Error::Rst)?;
        self.delay.delay_ms(self.config.reset_ms);
        self.wait_while_busy()?;

        self.send_all(&protocol::POWER_SETUP)?;
        self.send_all(&protocol::PANEL_SETUP)?;
        self.power = Power::Off;
        self.power_on()
    }

    /// Window used by the next [`refresh`](Self::refresh).
    pub fn set_partial_window(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    ) -> Res<SPI, DC, RST, BUSY> {
        self.window = Window::new(x, y, width, height).ok_or(Error::InvalidInput)?;
        Ok(())
    }

    /// Writes both planes of one area into controller RAM.
    ///
    /// Both planes use `0` for an inked pixel. The colour plane is inverted on
    /// the wire since the controller takes `1` as red.
    pub fn write_band(
        &mut self,
        black: &[u8],
        red: &[u8],
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    ) -> Res<SPI, DC, RST, BUSY> {
        let window = Window::new(x, y, width, height).ok_or(Error::InvalidInput)?;
        let expected = window.plane_bytes();
        if black.len() != expected || red.len() != expected {
            return Err(Error::InvalidInput);
        }
        self.ensure_powered()?;

        self.command(protocol::PARTIAL_IN)?;
        self.send(protocol::PARTIAL_WINDOW, &window.to_bytes())?;
        self.command(protocol::DATA_START_1)?;
        self.stream(black, false)?;
        self.command(protocol::DATA_START_2)?;
        self.stream(red, true)?;
        self.command(protocol::PARTIAL_OUT)
    }

    /// Refreshes the recorded window and waits for the panel.
    pub fn refresh(&mut self) -> Res<SPI, DC, RST, BUSY> {
        self.ensure_powered()?;

        if self.window.is_full() {
            self.command(protocol::DISPLAY_REFRESH)?;
            return self.wait_while_busy();
        }

        let window = self.window.to_bytes();
        self.command(protocol::PARTIAL_IN)?;
        self.send(protocol::PARTIAL_WINDOW, &window)?;
        self.command(protocol::DISPLAY_REFRESH)?;
        self.wait_while_busy()?;
        self.command(protocol::PARTIAL_OUT)
    }

    /// Turns the charge pump off; image RAM is kept.
    pub fn power_off(&mut self) -> Res<SPI, DC, RST, BUSY> {
        if self.power != Power::On {
            return Ok(());
        }
        self.command(protocol::POWER_OFF)?;
        self.wait_while_busy()?;
        self.power = Power::Off;
        Ok(())
    }

    /// Powers off and enters deep sleep; the next use re-initialises.
    pub fn deep_sleep(&mut self) -> Res<SPI, DC, RST, BUSY> {
        self.power_off()?;
        self.send(protocol::DEEP_SLEEP, &[protocol::DEEP_SLEEP_CHECK])?;
        self.power = Power::Reset;
        Ok(())
    }

    fn ensure_powered(&mut self) -> Res<SPI, DC, RST, BUSY> {
        match self.power {
            Power::Reset => self.init(),
            Power::Off => self.power_on(),
            Power::On => Ok(()),
        }
    }

    fn power_on(&mut self) -> Res<SPI, DC, RST, BUSY> {
        self.command(protocol::POWER_ON)?;
        self.wait_while_busy()?;
        self.power = Power::On;
        Ok(())
    }

    /// BUSY is low while the controller works.
    fn wait_while_busy(&mut self) -> Res<SPI, DC, RST, BUSY> {
        let mut waited_ms = 0u32;
        while self.busy.is_low().map_err(Error::Busy)? {
            if waited_ms >= self.config.busy_timeout_ms {
                return Err(Error::BusyTimeout);
            }
            self.delay.delay_ms(self.config.busy_poll_ms);
            waited_ms = waited_ms.saturating_add(self.config.busy_poll_ms.max(1));
        }
        Ok(())
    }

    fn send_all(&mut self, commands: &[Command]) -> Res<SPI, DC, RST, BUSY> {
        for command in commands {
            self.send(command.code, command.data)?;
        }
        Ok(())
    }

    fn send(&mut self, code: u8, data: &[u8]) -> Res<SPI, DC, RST, BUSY> {
        self.command(code)?;
        self.dc.set_high().map_err(Error::Dc)?;
        self.spi.write(data).map_err(Error::Spi)
    }

    fn command(&mut self, code: u8) -> Res<SPI, DC, RST, BUSY> {
        self.dc.set_low().map_err(Error::Dc)?;
        self.spi.write(&[code]).map_err(Error::Spi)
    }

    fn stream(&mut self, plane: &[u8], invert: bool) -> Res<SPI, DC, RST, BUSY> {
        self.dc.set_high().map_err(Error::Dc)?;
        if !invert {
            return self.spi.write(plane).map_err(Error::Spi);
        }

        let mut chunk = [0u8; CHUNK_BYTES];
        for part in plane.chunks(CHUNK_BYTES) {
            let out = &mut chunk[..part.len()];
            for (dst, src) in out.iter_mut().zip(part) {
                *dst = !*src;
            }
            self.spi.write(out).map_err(Error::Spi)?;
        }
        Ok(())
    }
}
