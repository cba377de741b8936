use core::convert::Infallible;

use embedded_graphics_core::{
    Pixel,
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Size},
    pixelcolor::PixelColor,
};

use crate::protocol;

/// Panel colours.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TriColor {
    White,
    Black,
    Red,
}

impl PixelColor for TriColor {
    type Raw = ();
}

/// Draw target covering one horizontal band of the panel.
///
/// Coordinates are panel coordinates; pixels outside the band are dropped so
/// a whole screen can be drawn once per band. Both planes use `0` for an
/// inked pixel.
pub struct BandCanvas<'a> {
    black: &'a mut [u8],
    red: &'a mut [u8],
    y_offset: u16,
    rows: u16,
}

impl<'a> BandCanvas<'a> {
    /// Returns `None` unless both planes hold whole rows of equal count.
    pub fn new(black: &'a mut [u8], red: &'a mut [u8], y_offset: u16) -> Option<Self> {
        if black.len() != red.len() || black.len() % protocol::ROW_BYTES != 0 {
            return None;
        }
        let rows = u16::try_from(black.len() / protocol::ROW_BYTES).ok()?;
        Some(Self {
            black,
            red,
            y_offset,
            rows,
        })
    }

    fn set(&mut self, x: u32, row: usize, color: TriColor) {
        let index = row * protocol::ROW_BYTES + x as usize / 8;
        let mask = 0x80u8 >> (x % 8);
        let (black_ink, red_ink) = match color {
            TriColor::White => (false, false),
            TriColor::Black => (true, false),
            TriColor::Red => (false, true),
        };
        paint(&mut self.black[index], mask, black_ink);
        paint(&mut self.red[index], mask, red_ink);
    }
}

fn paint(byte: &mut u8, mask: u8, ink: bool) {
    if ink {
        *byte &= !mask;
    } else {
        *byte |= mask;
    }
}

impl DrawTarget for BandCanvas<'_> {
    type Color = TriColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.x >= protocol::WIDTH as i32 {
                continue;
            }
            let row = point.y - self.y_offset as i32;
            if row < 0 || row >= self.rows as i32 {
                continue;
            }
            self.set(point.x as u32, row as usize, color);
        }

        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let (black, red) = match color {
            TriColor::White => (0xFF, 0xFF),
            TriColor::Black => (0x00, 0xFF),
            TriColor::Red => (0xFF, 0x00),
        };
        self.black.fill(black);
        self.red.fill(red);
        Ok(())
    }
}

impl OriginDimensions for BandCanvas<'_> {
    fn size(&self) -> Size {
        Size::new(protocol::WIDTH as u32, protocol::HEIGHT as u32)
    }
}
