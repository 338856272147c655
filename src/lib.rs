//! Core of the oledwatch firmware.
//!
//! Everything here is hardware-independent and runs on the host with a
//! plain `cargo test`; the embedded binary in `main.rs` only adds the
//! board glue (tick timer, GPIO, SPI panel, SAADC, USB).
//!
//! Usage: `cargo test` on the host, or
//! `cargo build --release --features embedded --target thumbv7em-none-eabihf`
//! for the watch.

#![cfg_attr(not(test), no_std)]

// Must come first so the log macros are visible in every module below.
#[macro_use]
mod fmt;

pub mod apps;
pub mod comms;
pub mod config;
pub mod display;
pub mod error;
pub mod frame;
pub mod input;
pub mod kernel;
pub mod power;
pub mod scheduler;
pub mod telemetry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tick;

pub use error::Error;
pub use kernel::{Kernel, Watchdog};
