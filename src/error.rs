//! Unified error type for the watch core.
//!
//! We avoid `alloc` - all error variants are fieldless and `Copy`.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

use core::fmt;

/// Top-level error type used across the firmware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Lookups
    /// An application index or frame-buffer offset lies outside the
    /// installed set / buffer.
    OutOfRange,

    // Registries
    /// The fixed application table is already full.
    RegistryFull,

    /// Applications can only be installed before boot.
    RegistrySealed,

    /// Every scheduler slot is already taken.
    TaskTableFull,

    // Configuration
    /// A boot-time interval is zero or too long to compare wrap-safely.
    InvalidConfig,

    // Display
    /// The display sink rejected a command.
    Display,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::OutOfRange => "index out of range",
            Error::RegistryFull => "application table full",
            Error::RegistrySealed => "application table sealed after boot",
            Error::TaskTableFull => "scheduler task table full",
            Error::InvalidConfig => "invalid boot configuration",
            Error::Display => "display command failed",
        };
        f.write_str(msg)
    }
}
