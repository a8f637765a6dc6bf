use std::convert::Infallible;

use embedded_graphics::mono_font::ascii::FONT_9X18;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};

use crate::report::Report;

/// Native panel width in pixels (short edge).
pub const PANEL_WIDTH: u32 = 176;
/// Native panel height in pixels (long edge).
pub const PANEL_HEIGHT: u32 = 264;

/// A 1-bit frame in the panel controller's native layout: rows of
/// `PANEL_WIDTH` pixels packed MSB first, a set bit is white.
///
/// Drawing goes through the landscape view (`PANEL_HEIGHT` x `PANEL_WIDTH`),
/// which is rotated 90 degrees counter-clockwise into the native buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(PANEL_WIDTH, PANEL_HEIGHT)
    }
}

impl FrameBuffer {
    /// Creates a cleared (all white) frame with the given native dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        let stride = row_stride(width);
        Self {
            width,
            height,
            bytes: vec![0xFF; stride * height as usize],
        }
    }

    pub fn clear(&mut self) {
        self.bytes.fill(0xFF);
    }

    /// Width and height of the landscape drawing surface.
    pub fn landscape_size(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    /// Sets a landscape pixel; coordinates outside the frame are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, black: bool) {
        let Some((index, mask)) = self.locate(x, y) else {
            return;
        };
        if black {
            self.bytes[index] &= !mask;
        } else {
            self.bytes[index] |= mask;
        }
    }

    pub fn is_black(&self, x: u32, y: u32) -> bool {
        self.locate(x, y)
            .map(|(index, mask)| self.bytes[index] & mask == 0)
            .unwrap_or(false)
    }

    /// Buffer in the layout the panel controller expects.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Landscape view encoded as a binary PBM (`P4`) image.
    pub fn to_pbm(&self) -> Vec<u8> {
        let (width, height) = self.landscape_size();
        let stride = row_stride(width);
        let mut out = format!("P4\n{width} {height}\n").into_bytes();
        out.reserve(stride * height as usize);

        for y in 0..height {
            let mut row = vec![0u8; stride];
            for x in 0..width {
                if self.is_black(x, y) {
                    row[(x / 8) as usize] |= 0x80 >> (x % 8);
                }
            }
            out.extend_from_slice(&row);
        }

        out
    }

    fn locate(&self, x: u32, y: u32) -> Option<(usize, u8)> {
        let (landscape_width, landscape_height) = self.landscape_size();
        if x >= landscape_width || y >= landscape_height {
            return None;
        }
        let native_x = y;
        let native_y = landscape_width - 1 - x;
        let index = native_y as usize * row_stride(self.width) + (native_x / 8) as usize;
        Some((index, 0x80 >> (native_x % 8)))
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        let (width, height) = self.landscape_size();
        Size::new(width, height)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y)) {
                self.set_pixel(x, y, color.is_on());
            }
        }
        Ok(())
    }
}

/// Draws the panel layout of `report` onto a fresh frame.
pub fn render(report: &Report) -> FrameBuffer {
    let mut frame = FrameBuffer::default();
    let style = MonoTextStyle::new(&FONT_9X18, BinaryColor::On);

    for line in report.panel_lines() {
        let text = Text::with_baseline(&line.text, Point::new(line.x, line.y), style, Baseline::Top);
        match text.draw(&mut frame) {
            Ok(_) => {}
            Err(never) => match never {},
        }
    }

    frame
}

fn row_stride(width: u32) -> usize {
    width.div_ceil(8) as usize
}
