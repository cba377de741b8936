//! Command set and packet builders for the GD7965 controller.

/// Panel width in pixels.
pub const WIDTH: u16 = 800;
/// Panel height in pixels.
pub const HEIGHT: u16 = 480;
/// Bytes in one panel row of a single plane.
pub const ROW_BYTES: usize = WIDTH as usize / 8;

pub const PANEL_SETTING: u8 = 0x00;
pub const POWER_SETTING: u8 = 0x01;
pub const POWER_OFF: u8 = 0x02;
pub const POWER_ON: u8 = 0x04;
pub const DEEP_SLEEP: u8 = 0x07;
/// Black/white plane (`0` = black).
pub const DATA_START_1: u8 = 0x10;
pub const DISPLAY_REFRESH: u8 = 0x12;
/// Colour plane (`1` = red).
pub const DATA_START_2: u8 = 0x13;
pub const DUAL_SPI: u8 = 0x15;
pub const VCOM_DATA_INTERVAL: u8 = 0x50;
pub const TCON: u8 = 0x60;
pub const RESOLUTION: u8 = 0x61;
pub const PARTIAL_WINDOW: u8 = 0x90;
pub const PARTIAL_IN: u8 = 0x91;
pub const PARTIAL_OUT: u8 = 0x92;

/// Check code required by [`DEEP_SLEEP`].
pub const DEEP_SLEEP_CHECK: u8 = 0xA5;

/// A command byte followed by its parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Command {
    pub code: u8,
    pub data: &'static [u8],
}

const fn cmd(code: u8, data: &'static [u8]) -> Command {
    Command { code, data }
}

/// Sent after reset, before [`POWER_ON`].
///
/// VGH=20V, VGL=-20V, VDH=15V, VDL=-15V.
pub const POWER_SETUP: [Command; 1] = [cmd(POWER_SETTING, &[0x07, 0x07, 0x3F, 0x3F])];

/// Sent once the charge pump is up.
pub const PANEL_SETUP: [Command; 5] = [
    // Tri-colour, LUT from OTP.
    cmd(PANEL_SETTING, &[0x0F]),
    cmd(
        RESOLUTION,
        &[
            (WIDTH >> 8) as u8,
            WIDTH as u8,
            (HEIGHT >> 8) as u8,
            HEIGHT as u8,
        ],
    ),
    cmd(DUAL_SPI, &[0x00]),
    cmd(VCOM_DATA_INTERVAL, &[0x11, 0x07]),
    cmd(TCON, &[0x22]),
];

/// Length of the [`PARTIAL_WINDOW`] parameter block.
pub const PARTIAL_WINDOW_LEN: usize = 9;

/// Panel area addressed by one partial update.
///
/// Horizontal bounds are widened to whole bytes: `x` rounds down to a
/// multiple of 8 and the last column rounds up to one below the next.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Window {
    pub x_start: u16,
    pub x_end: u16,
    pub y_start: u16,
    pub y_end: u16,
}

impl Window {
    /// Returns `None` for empty or off-panel areas.
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let x_last = x.checked_add(width - 1)?;
        let y_last = y.checked_add(height - 1)?;
        if x_last >= WIDTH || y_last >= HEIGHT {
            return None;
        }

        Some(Self {
            x_start: x & !7,
            x_end: x_last | 7,
            y_start: y,
            y_end: y_last,
        })
    }

    pub const fn full() -> Self {
        Self {
            x_start: 0,
            x_end: WIDTH - 1,
            y_start: 0,
            y_end: HEIGHT - 1,
        }
    }

    pub fn is_full(&self) -> bool {
        *self == Self::full()
    }

    /// Bytes per row of one plane inside the window.
    pub fn row_bytes(&self) -> usize {
        (self.x_end - self.x_start + 1) as usize / 8
    }

    pub fn rows(&self) -> usize {
        (self.y_end - self.y_start + 1) as usize
    }

    /// Bytes of one plane covering the whole window.
    pub fn plane_bytes(&self) -> usize {
        self.row_bytes() * self.rows()
    }

    /// Parameters for [`PARTIAL_WINDOW`]; the trailing `0x01` scans inside
    /// the window only.
    pub fn to_bytes(&self) -> [u8; PARTIAL_WINDOW_LEN] {
        let [xs_hi, xs_lo] = self.x_start.to_be_bytes();
        let [xe_hi, xe_lo] = self.x_end.to_be_bytes();
        let [ys_hi, ys_lo] = self.y_start.to_be_bytes();
        let [ye_hi, ye_lo] = self.y_end.to_be_bytes();
        [xs_hi, xs_lo, xe_hi, xe_lo, ys_hi, ys_lo, ye_hi, ye_lo, 0x01]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_encodes_800_by_480() {
        let resolution = PANEL_SETUP
            .iter()
            .find(|command| command.code == RESOLUTION)
            .unwrap();
        assert_eq!(resolution.data, &[0x03, 0x20, 0x01, 0xE0]);
    }

    #[test]
    fn window_bounds_are_byte_aligned() {
        let window = Window::new(13, 5, 10, 2).unwrap();
        assert_eq!(window.x_start, 8);
        assert_eq!(window.x_end, 23);
        assert_eq!(window.y_start, 5);
        assert_eq!(window.y_end, 6);
        assert_eq!(window.row_bytes(), 2);
        assert_eq!(window.plane_bytes(), 4);
    }

    #[test]
    fn band_window_packet_matches_controller_layout() {
        let window = Window::new(0, 320, WIDTH, 160).unwrap();
        assert_eq!(
            window.to_bytes(),
            [0x00, 0x00, 0x03, 0x1F, 0x01, 0x40, 0x01, 0xDF, 0x01]
        );
        assert_eq!(window.plane_bytes(), 16_000);
    }

    #[test]
    fn full_window_is_recognised() {
        assert!(Window::new(0, 0, WIDTH, HEIGHT).unwrap().is_full());
        assert!(!Window::new(0, 0, WIDTH, 160).unwrap().is_full());
    }

    #[test]
    fn empty_or_off_panel_windows_are_rejected() {
        assert_eq!(Window::new(0, 0, 0, 10), None);
        assert_eq!(Window::new(0, 0, 10, 0), None);
        assert_eq!(Window::new(792, 0, 16, 1), None);
        assert_eq!(Window::new(0, 479, 8, 2), None);
        assert_eq!(Window::new(u16::MAX, 0, 2, 1), None);
    }
}
