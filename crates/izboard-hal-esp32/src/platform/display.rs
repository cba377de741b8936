use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::SpiDevice,
};
use gdew075z08::{Config, Error, Gdew075z08};
use izboard_core::pipeline::BandDisplay;

pub type DisplayError<SPI, DC, RST, BUSY> = Error<
    <SPI as embedded_hal::spi::ErrorType>::Error,
    <DC as embedded_hal::digital::ErrorType>::Error,
    <RST as embedded_hal::digital::ErrorType>::Error,
    <BUSY as embedded_hal::digital::ErrorType>::Error,
>;

/// Board-level adapter exposing the tri-colour panel as a band sink.
#[derive(Debug)]
pub struct PanelDisplay<SPI, DC, RST, BUSY, DELAY> {
    panel: Gdew075z08<SPI, DC, RST, BUSY, DELAY>,
}

impl<SPI, DC, RST, BUSY, DELAY> PanelDisplay<SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice<u8>,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    DELAY: DelayNs,
{
    pub fn new(spi: SPI, dc: DC, rst: RST, busy: BUSY, delay: DELAY) -> Self {
        Self {
            panel: Gdew075z08::new(spi, dc, rst, busy, delay, Config::default()),
        }
    }

    /// Puts the controller into deep sleep ahead of a system sleep.
    pub fn hibernate(&mut self) -> Result<(), DisplayError<SPI, DC, RST, BUSY>> {
        self.panel.deep_sleep()
    }
}

impl<SPI, DC, RST, BUSY, DELAY> BandDisplay for PanelDisplay<SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice<u8>,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    DELAY: DelayNs,
{
    type Error = DisplayError<SPI, DC, RST, BUSY>;

    fn set_partial_window(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    ) -> Result<(), Self::Error> {
        self.panel.set_partial_window(x, y, width, height)
    }

    fn write_band(
        &mut self,
        black: &[u8],
        red: &[u8],
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    ) -> Result<(), Self::Error> {
        self.panel.write_band(black, red, x, y, width, height)
    }

    fn refresh(&mut self) -> Result<(), Self::Error> {
        self.panel.refresh()
    }

    fn power_off(&mut self) -> Result<(), Self::Error> {
        self.panel.power_off()
    }
}
