//! Frame composition: canvas, status overlay and the commit policy.
//!
//! Each draw cycle clears the canvas, lets the foreground application draw,
//! overlays the battery bar plus either the percentage or a power-source
//! icon, and commits the result to the display sink. A pending transition
//! turns the commit into a wipe and is consumed whether or not the wipe
//! succeeds.

use crate::apps::{ApplicationManager, FrameContext};
use crate::config::{DISPLAY_HEIGHT, DISPLAY_WIDTH};
use crate::display::DisplaySink;
use crate::error::Error;
use crate::power::PowerState;
use crate::telemetry::{BatteryStatus, PowerSource, Telemetry};
use crate::tick::{Tick, Ticks};
use core::convert::Infallible;
use core::fmt::Write;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::raw::{RawData, RawU16};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use heapless::String;

pub const FRAME_PIXELS: usize = DISPLAY_WIDTH * DISPLAY_HEIGHT;

/// Frame buffer size as seen by the diagnostics protocol (RGB565, 2 bytes
/// per pixel, big-endian).
pub const FRAME_BYTES: usize = FRAME_PIXELS * 2;

/// Height of the battery bar along the top edge.
pub const STATUS_BAR_HEIGHT: u32 = 3;

// ═══════════════════════════════════════════════════════════════════════════
// Canvas
// ═══════════════════════════════════════════════════════════════════════════

/// Off-screen RGB565 frame buffer, row-major.
pub struct Canvas {
    pixels: [Rgb565; FRAME_PIXELS],
}

impl Canvas {
    pub const fn new() -> Self {
        Self {
            pixels: [Rgb565::BLACK; FRAME_PIXELS],
        }
    }

    pub fn pixels(&self) -> &[Rgb565] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb565> {
        if x < DISPLAY_WIDTH && y < DISPLAY_HEIGHT {
            Some(self.pixels[y * DISPLAY_WIDTH + x])
        } else {
            None
        }
    }

    pub fn blank(&mut self) {
        self.pixels.fill(Rgb565::BLACK);
    }

    /// Overwrite raw big-endian bytes starting at byte `offset`.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), Error> {
        check_span(offset, bytes.len())?;
        for (i, &byte) in bytes.iter().enumerate() {
            let at = offset + i;
            let px = &mut self.pixels[at / 2];
            let raw = RawU16::from(*px).into_inner();
            let raw = if at % 2 == 0 {
                (raw & 0x00FF) | (u16::from(byte) << 8)
            } else {
                (raw & 0xFF00) | u16::from(byte)
            };
            *px = Rgb565::from(RawU16::new(raw));
        }
        Ok(())
    }

    /// Copy raw big-endian bytes starting at byte `offset` into `out`.
    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) -> Result<(), Error> {
        check_span(offset, out.len())?;
        for (i, byte) in out.iter_mut().enumerate() {
            let at = offset + i;
            let [hi, lo] = RawU16::from(self.pixels[at / 2]).into_inner().to_be_bytes();
            *byte = if at % 2 == 0 { hi } else { lo };
        }
        Ok(())
    }
}

fn check_span(offset: usize, len: usize) -> Result<(), Error> {
    match offset.checked_add(len) {
        Some(end) if end <= FRAME_BYTES => Ok(()),
        _ => Err(Error::OutOfRange),
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(DISPLAY_WIDTH as u32, DISPLAY_HEIGHT as u32)
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let (Ok(x), Ok(y)) = (usize::try_from(point.x), usize::try_from(point.y)) {
                if x < DISPLAY_WIDTH && y < DISPLAY_HEIGHT {
                    self.pixels[y * DISPLAY_WIDTH + x] = color;
                }
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.pixels.fill(color);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Status overlay
// ═══════════════════════════════════════════════════════════════════════════

/// Filled width of the battery bar, rounded to the nearest pixel.
pub fn battery_bar_width(level_percent: u8, width: u32) -> u32 {
    (u32::from(level_percent.min(100)) * width + 50) / 100
}

/// Bar colour for the current charge state.
pub fn status_color(source: PowerSource, status: BatteryStatus) -> Rgb565 {
    match source {
        PowerSource::Charging => Rgb565::CSS_ORANGE,
        PowerSource::Charged => Rgb565::GREEN,
        PowerSource::OnBattery => match status {
            BatteryStatus::Full => Rgb565::CYAN,
            BatteryStatus::Normal => Rgb565::CSS_SKY_BLUE,
            BatteryStatus::Low => Rgb565::RED,
            BatteryStatus::Flat | BatteryStatus::Disconnected => Rgb565::WHITE,
        },
    }
}

const USB_ICON_WIDTH: usize = 12;
const USB_ICON: [u16; 7] = [
    0b0000_0000_1100,
    0b0001_0000_0100,
    0b0010_0000_0110,
    0b1111_1111_1111,
    0b0000_1000_0110,
    0b0000_0100_0100,
    0b0000_0011_1100,
];

const POWER_ICON_WIDTH: usize = 7;
const POWER_ICON: [u16; 6] = [
    0b0010100,
    0b0010100,
    0b1111111,
    0b0111110,
    0b0011100,
    0b0001000,
];

fn draw_icon(canvas: &mut Canvas, rows: &[u16], width: usize, origin: Point, color: Rgb565) {
    let pixels = rows.iter().enumerate().flat_map(move |(y, &row)| {
        (0..width).filter_map(move |x| {
            ((row >> (width - 1 - x)) & 1 == 1)
                .then(|| Pixel(origin + Point::new(x as i32, y as i32), color))
        })
    });
    let _ = canvas.draw_iter(pixels);
}

/// Draw the battery bar and the percentage or power icon.
pub fn draw_status<T: Telemetry + ?Sized>(canvas: &mut Canvas, telemetry: &T) {
    let snapshot = telemetry.snapshot();
    let color = status_color(snapshot.source, snapshot.status);
    let width = battery_bar_width(snapshot.level_percent, DISPLAY_WIDTH as u32);
    let _ = Rectangle::new(Point::zero(), Size::new(width, STATUS_BAR_HEIGHT))
        .into_styled(PrimitiveStyle::with_fill(color))
        .draw(canvas);

    let right = DISPLAY_WIDTH as i32;
    if snapshot.source == PowerSource::OnBattery {
        let mut s: String<8> = String::new();
        let _ = write!(s, "{:3}%", snapshot.level_percent);
        let style = MonoTextStyle::new(&FONT_6X10, Rgb565::WHITE);
        let _ = Text::with_baseline(&s, Point::new(right - 30, 5), style, Baseline::Top)
            .draw(canvas);
    } else if snapshot.usb_connected {
        let origin = Point::new(right - USB_ICON_WIDTH as i32 - 2, 5);
        draw_icon(canvas, &USB_ICON, USB_ICON_WIDTH, origin, Rgb565::WHITE);
    } else {
        let origin = Point::new(right - POWER_ICON_WIDTH as i32 - 2, 6);
        draw_icon(canvas, &POWER_ICON, POWER_ICON_WIDTH, origin, Rgb565::WHITE);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Pipeline
// ═══════════════════════════════════════════════════════════════════════════

pub struct FramePipeline {
    canvas: Canvas,
    /// Composition budget; longer frames count as overruns.
    budget: Ticks,
    last_duration: Ticks,
    frames: u32,
    overruns: u32,
    locked: bool,
}

impl FramePipeline {
    pub const fn new(budget: Ticks) -> Self {
        Self {
            canvas: Canvas::new(),
            budget,
            last_duration: 0,
            frames: 0,
            overruns: 0,
            locked: false,
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    /// Clear, draw the foreground application, overlay the status bar.
    pub fn compose<T: Telemetry + ?Sized>(
        &mut self,
        apps: &mut ApplicationManager<'_>,
        telemetry: &T,
        ctx: &FrameContext,
    ) {
        self.canvas.blank();
        apps.draw_foreground(&mut self.canvas, ctx);
        draw_status(&mut self.canvas, telemetry);
        self.frames = self.frames.wrapping_add(1);
    }

    /// Commit the canvas. A pending transition becomes a wipe and is
    /// cleared before the sink is called.
    pub fn commit<D: DisplaySink + ?Sized>(
        &mut self,
        display: &mut D,
        power: &mut PowerState,
    ) -> Result<(), Error> {
        match power.take_transition().wipe() {
            None => display.commit_frame(self.canvas.pixels()),
            Some(direction) => display.commit_frame_with_wipe(self.canvas.pixels(), direction),
        }
    }

    /// Commit the canvas without a wipe.
    pub fn commit_direct<D: DisplaySink + ?Sized>(&mut self, display: &mut D) -> Result<(), Error> {
        display.commit_frame(self.canvas.pixels())
    }

    /// Record how long composition took. A raw `end` below `start` means
    /// the counter wrapped during the measurement and the duration is
    /// reported as zero.
    pub fn record_duration(&mut self, start: Tick, end: Tick) -> Ticks {
        let duration = end.raw().saturating_sub(start.raw());
        if duration > self.budget {
            self.overruns = self.overruns.wrapping_add(1);
            warn!("frame: overrun, {} ticks", duration);
        }
        self.last_duration = duration;
        duration
    }

    pub fn last_duration(&self) -> Ticks {
        self.last_duration
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn overruns(&self) -> u32 {
        self.overruns
    }

    /// While locked the draw task leaves the canvas alone so an external
    /// client can write it.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}
