//! Application-wide constants and boot-time configuration.
//!
//! All timing parameters, display geometry and protocol constants live
//! here so they can be tuned in one place. Nothing in here changes at
//! runtime: the kernel receives a [`BootConfig`] once, at construction.

use crate::error::Error;
use crate::tick::{Tick, Ticks};

// Timing

/// Length of one tick (ms). The tick timer fires once per period.
pub const TICK_PERIOD_MS: u64 = 1;

/// Button debounce window (ticks).
pub const DEBOUNCE_TICKS: Ticks = 25;

/// Draw task period (ticks). 33 ms ≈ 30 Hz.
pub const DRAW_INTERVAL_TICKS: Ticks = 33;

/// Housekeeping period while the screen is on (ticks).
pub const CORE_PROCESS_INTERVAL_TICKS: Ticks = 20;

/// Housekeeping period while the screen is off (ticks).
pub const CORE_STANDBY_INTERVAL_TICKS: Ticks = 250;

/// Enable automatic screen power-off after inactivity.
pub const AUTO_SCREEN_OFF_ENABLED: bool = true;

/// Inactivity before the screen is turned off (ticks).
pub const AUTO_SCREEN_OFF_TICKS: Ticks = 10_000;

// Display

/// Drawable width in pixels.
pub const DISPLAY_WIDTH: usize = 128;

/// Drawable height in pixels.
pub const DISPLAY_HEIGHT: usize = 128;

/// Bits per pixel of the frame buffer (RGB565).
pub const DISPLAY_BPP: u16 = 16;

/// Master contrast applied on every wake (0-15).
pub const DEFAULT_CONTRAST: u8 = 15;

// Kernel tables

/// Maximum number of installed applications.
pub const MAX_APPS: usize = 8;

/// Scheduler slots: housekeeping + draw.
pub const TASK_SLOTS: usize = 2;

/// Raw edges buffered between interrupt context and the next pass.
pub const EDGE_INBOX_DEPTH: usize = 16;

// USB diagnostics

/// USB VID/PID - use the "pid.codes" open-source test VID.
/// Replace with your own allocated VID/PID for production.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x0002;

/// USB device strings.
pub const USB_MANUFACTURER: &str = "oledwatch";
pub const USB_PRODUCT: &str = "OLED Watch";
pub const USB_SERIAL_NUMBER: &str = "000001";

/// USB HID polling interval (ms) for the diagnostics endpoint.
pub const USB_HID_POLL_MS: u8 = 10;

// GPIO pin assignments (nRF52840 custom board)
//
// These are logical names; actual `embassy_nrf::peripherals::*` types are
// selected in `main.rs`.  Adjust for your PCB.
//
//   BTN1 (action)     → P0.11
//   BTN2 (previous)   → P0.12
//   BTN3 (next)       → P0.24
//   BTN4 (screen off) → P0.25
//   OLED SCK / MOSI   → P0.19 / P0.20
//   OLED CS / DC      → P0.21 / P0.22
//   OLED RESET        → P0.23
//   OLED VCC enable   → P0.26
//   Battery divider   → P0.04 (AIN2)
//   Charger STAT      → P0.15 (low = charging)
//   VBUS sense        → P0.14 (high = external power)

/// Values fixed at system initialisation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootConfig {
    /// Minimum interval between two accepted edges on one button.
    pub debounce_window: Ticks,
    /// Draw task period.
    pub draw_interval: Ticks,
    /// Housekeeping period while the screen is on.
    pub core_interval: Ticks,
    /// Housekeeping period while the screen is off.
    pub core_standby_interval: Ticks,
    /// Inactivity before auto screen-off; `None` disables it.
    pub auto_off_interval: Option<Ticks>,
    /// Contrast applied on every wake, 0-15.
    pub contrast: u8,
}

impl BootConfig {
    pub const fn new() -> Self {
        Self {
            debounce_window: DEBOUNCE_TICKS,
            draw_interval: DRAW_INTERVAL_TICKS,
            core_interval: CORE_PROCESS_INTERVAL_TICKS,
            core_standby_interval: CORE_STANDBY_INTERVAL_TICKS,
            auto_off_interval: if AUTO_SCREEN_OFF_ENABLED {
                Some(AUTO_SCREEN_OFF_TICKS)
            } else {
                None
            },
            contrast: DEFAULT_CONTRAST,
        }
    }

    /// Every interval must be non-zero and strictly below half the tick
    /// range, otherwise deadline comparisons stop being wrap-safe.
    pub fn validate(&self) -> Result<(), Error> {
        let intervals = [
            Some(self.debounce_window),
            Some(self.draw_interval),
            Some(self.core_interval),
            Some(self.core_standby_interval),
            self.auto_off_interval,
        ];
        for interval in intervals.into_iter().flatten() {
            if interval == 0 || interval >= Tick::HALF_RANGE {
                return Err(Error::InvalidConfig);
            }
        }
        if self.contrast > crate::display::MAX_CONTRAST {
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::new()
    }
}
