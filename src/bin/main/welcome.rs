use core::{fmt::Write as _, net::Ipv4Addr};

use embedded_graphics::{draw_target::DrawTarget, geometry::Point};
use gdew075z08::{BandCanvas, TriColor};
use heapless::String;
use izboard_core::{
    frame::{BandBuffers, FrameGeometry},
    pipeline::BandDisplay,
};
use u8g2_fonts::{
    FontRenderer, fonts,
    types::{FontColor, HorizontalAlignment, VerticalPosition},
};

const TITLE_FONT: FontRenderer = FontRenderer::new::<fonts::u8g2_font_helvB24_tf>();
const BODY_FONT: FontRenderer = FontRenderer::new::<fonts::u8g2_font_helvR18_tf>();

const TITLE_Y: i32 = 60;
const SUBTITLE_Y: i32 = 100;
const MARGIN_X: i32 = 50;
const INDENT_X: i32 = 70;

const INK: FontColor<TriColor> = FontColor::Transparent(TriColor::Black);

/// Text shown while the device waits for setup.
pub(super) struct Welcome<'a> {
    pub ssid: &'a str,
    pub address: Ipv4Addr,
    pub mac: [u8; 6],
}

/// Renders the setup instructions one band at a time and refreshes the panel.
pub(super) fn show<D: BandDisplay>(
    display: &mut D,
    buffers: &mut BandBuffers,
    geometry: FrameGeometry,
    welcome: &Welcome<'_>,
) -> Result<(), D::Error> {
    display.set_partial_window(0, 0, geometry.width(), geometry.height())?;

    for band in 0..geometry.band_count() {
        let y = band * geometry.band_height();
        buffers.clear();
        {
            let (black, red) = buffers.planes_mut();
            if let Some(mut canvas) = BandCanvas::new(black, red, y) {
                draw(&mut canvas, geometry, welcome);
            }
        }
        let (black, red) = buffers.planes();
        display.write_band(black, red, 0, y, geometry.width(), geometry.band_height())?;
    }

    display.refresh()?;
    display.power_off()
}

fn draw<T>(target: &mut T, geometry: FrameGeometry, welcome: &Welcome<'_>)
where
    T: DrawTarget<Color = TriColor>,
{
    let center_x = i32::from(geometry.width()) / 2;
    let _ = TITLE_FONT.render_aligned(
        "izBoard",
        Point::new(center_x, TITLE_Y),
        VerticalPosition::Baseline,
        HorizontalAlignment::Center,
        INK,
        target,
    );
    let _ = BODY_FONT.render_aligned(
        "Setup Mode",
        Point::new(center_x, SUBTITLE_Y),
        VerticalPosition::Baseline,
        HorizontalAlignment::Center,
        INK,
        target,
    );

    let mut ip_line: String<24> = String::new();
    let _ = write!(ip_line, "IP: {}", welcome.address);
    let mut mac_line: String<24> = String::new();
    let _ = write!(mac_line, "MAC: {}", MacText(welcome.mac));
    let mut address: String<16> = String::new();
    let _ = write!(address, "{}", welcome.address);

    let lines: [(&str, i32, i32); 6] = [
        (ip_line.as_str(), MARGIN_X, 160),
        (mac_line.as_str(), MARGIN_X, 200),
        ("1. Connect to WiFi:", MARGIN_X, 260),
        (welcome.ssid, INDENT_X, 290),
        ("2. Open browser to:", MARGIN_X, 330),
        (address.as_str(), INDENT_X, 360),
    ];
    for (text, x, y) in lines {
        let _ = BODY_FONT.render(
            text,
            Point::new(x, y),
            VerticalPosition::Baseline,
            INK,
            target,
        );
    }
}

struct MacText([u8; 6]);

impl core::fmt::Display for MacText {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}
