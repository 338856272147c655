//! Time-of-day face. Without an RTC the time is uptime since boot plus a
//! fixed offset, shown as 12-hour HH:MM with seconds and AM/PM.

use super::{Application, FrameContext};
use crate::config::DISPLAY_WIDTH;
use crate::frame::Canvas;
use core::fmt::Write;
use embedded_graphics::mono_font::ascii::{FONT_10X20, FONT_6X10};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Alignment, Text};
use heapless::String;

const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

/// Broken-down wall-clock time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl TimeOfDay {
    pub fn from_seconds(seconds: u32) -> Self {
        let s = seconds % SECONDS_PER_DAY;
        Self {
            hour: (s / 3600) as u8,
            minute: (s / 60 % 60) as u8,
            second: (s % 60) as u8,
        }
    }

    /// Hour on a 12-hour dial, 1-12.
    pub fn hour12(&self) -> u8 {
        match self.hour % 12 {
            0 => 12,
            h => h,
        }
    }

    pub fn pm(&self) -> bool {
        self.hour >= 12
    }
}

pub struct ClockApp {
    /// Seconds since midnight at boot.
    offset_seconds: u32,
}

impl ClockApp {
    pub const fn new(offset_seconds: u32) -> Self {
        Self { offset_seconds }
    }

    pub fn time_at(&self, uptime_ms: u32) -> TimeOfDay {
        TimeOfDay::from_seconds(self.offset_seconds.wrapping_add(uptime_ms / 1000))
    }
}

impl Application for ClockApp {
    fn name(&self) -> &'static str {
        "Clock"
    }

    fn draw(&mut self, canvas: &mut Canvas, ctx: &FrameContext) {
        let time = self.time_at(ctx.uptime_ms);
        let centre = (DISPLAY_WIDTH / 2) as i32;

        let mut hhmm: String<8> = String::new();
        let _ = write!(hhmm, "{:2}:{:02}", time.hour12(), time.minute);
        let big = MonoTextStyle::new(&FONT_10X20, Rgb565::WHITE);
        let _ = Text::with_alignment(&hhmm, Point::new(centre, 60), big, Alignment::Center)
            .draw(canvas);

        let mut secs: String<8> = String::new();
        let _ = write!(secs, "{:02} {}", time.second, if time.pm() { "PM" } else { "AM" });
        let small = MonoTextStyle::new(&FONT_6X10, Rgb565::CSS_LIGHT_GRAY);
        let _ = Text::with_alignment(&secs, Point::new(centre, 78), small, Alignment::Center)
            .draw(canvas);
    }
}
