//! Stopwatch. BTN1 starts and stops; a start after a stop resumes from
//! the banked time. Keeps counting while in the background.

use super::{AppEvent, Application, FrameContext, Lifecycle};
use crate::config::DISPLAY_WIDTH;
use crate::frame::Canvas;
use crate::input::ButtonId;
use core::fmt::Write;
use embedded_graphics::mono_font::ascii::{FONT_10X20, FONT_6X10};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Alignment, Text};
use heapless::String;

#[derive(Default)]
pub struct StopwatchApp {
    running: bool,
    /// Accumulated time of previous runs (ms).
    banked_ms: u32,
    /// Uptime when the current run started.
    started_at: u32,
    last_uptime: u32,
    toggle_pending: bool,
}

impl StopwatchApp {
    pub const fn new() -> Self {
        Self {
            running: false,
            banked_ms: 0,
            started_at: 0,
            last_uptime: 0,
            toggle_pending: false,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    /// Elapsed time as of the last processed frame.
    pub fn elapsed_ms(&self) -> u32 {
        self.elapsed_at(self.last_uptime)
    }

    pub fn elapsed_at(&self, uptime_ms: u32) -> u32 {
        if self.running {
            self.banked_ms
                .wrapping_add(uptime_ms.wrapping_sub(self.started_at))
        } else {
            self.banked_ms
        }
    }
}

impl Application for StopwatchApp {
    fn name(&self) -> &'static str {
        "Stopwatch"
    }

    fn initialize(&mut self) -> Lifecycle {
        Lifecycle::Running
    }

    fn process(&mut self, ctx: &FrameContext) {
        self.last_uptime = ctx.uptime_ms;
        if self.toggle_pending {
            self.toggle_pending = false;
            if self.running {
                self.banked_ms = self.elapsed_ms();
                self.running = false;
            } else {
                self.started_at = ctx.uptime_ms;
                self.running = true;
            }
        }
    }

    fn draw(&mut self, canvas: &mut Canvas, ctx: &FrameContext) {
        let ms = self.elapsed_at(ctx.uptime_ms);
        let centre = (DISPLAY_WIDTH / 2) as i32;

        let mut s: String<12> = String::new();
        let _ = write!(s, "{:02}:{:02}.{}", ms / 60_000 % 100, ms / 1000 % 60, ms / 100 % 10);
        let big = MonoTextStyle::new(&FONT_10X20, Rgb565::WHITE);
        let _ = Text::with_alignment(&s, Point::new(centre, 60), big, Alignment::Center)
            .draw(canvas);

        let hint = if self.running { "BTN1 stop" } else { "BTN1 start" };
        let small = MonoTextStyle::new(&FONT_6X10, Rgb565::CSS_GRAY);
        let _ = Text::with_alignment(hint, Point::new(centre, 90), small, Alignment::Center)
            .draw(canvas);
    }

    fn on_event(&mut self, event: AppEvent) {
        if event == AppEvent::ButtonPress(ButtonId::Btn1) {
            self.toggle_pending = true;
        }
    }
}
