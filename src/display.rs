//! Display sink abstraction.
//!
//! The kernel talks to the panel exclusively through [`DisplaySink`]. The
//! firmware binary implements it for the SSD1351 over SPI; host tests use
//! the recording sink in [`crate::testing`].

use crate::error::Error;
use embedded_graphics::pixelcolor::Rgb565;

/// Highest master contrast level accepted by the panel.
pub const MAX_CONTRAST: u8 = 15;

/// Direction of the screen-wipe used when switching applications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WipeDirection {
    /// Towards the next application: new frame enters from the right.
    Forward,
    /// Towards the previous application: new frame enters from the left.
    Backward,
}

/// Commands the kernel issues to the panel.
///
/// Frames are passed row-major, `DISPLAY_WIDTH * DISPLAY_HEIGHT` pixels.
pub trait DisplaySink {
    /// Switch the panel supply rail on.
    fn power_on(&mut self) -> Result<(), Error>;
    /// Switch the panel supply rail off.
    fn power_off(&mut self) -> Result<(), Error>;
    fn display_on(&mut self) -> Result<(), Error>;
    fn display_off(&mut self) -> Result<(), Error>;
    /// Contrast, 0 to [`MAX_CONTRAST`].
    fn set_contrast(&mut self, level: u8) -> Result<(), Error>;
    fn clear(&mut self) -> Result<(), Error>;
    fn set_cursor(&mut self, x: u16, y: u16) -> Result<(), Error>;
    fn write_pixel(&mut self, color: Rgb565) -> Result<(), Error>;
    /// Replace the visible image with `frame`.
    fn commit_frame(&mut self, frame: &[Rgb565]) -> Result<(), Error>;
    /// Replace the visible image with `frame` using a wipe.
    fn commit_frame_with_wipe(
        &mut self,
        frame: &[Rgb565],
        direction: WipeDirection,
    ) -> Result<(), Error>;
}

impl<S: DisplaySink + ?Sized> DisplaySink for &mut S {
    fn power_on(&mut self) -> Result<(), Error> {
        (**self).power_on()
    }

    fn power_off(&mut self) -> Result<(), Error> {
        (**self).power_off()
    }

    fn display_on(&mut self) -> Result<(), Error> {
        (**self).display_on()
    }

    fn display_off(&mut self) -> Result<(), Error> {
        (**self).display_off()
    }

    fn set_contrast(&mut self, level: u8) -> Result<(), Error> {
        (**self).set_contrast(level)
    }

    fn clear(&mut self) -> Result<(), Error> {
        (**self).clear()
    }

    fn set_cursor(&mut self, x: u16, y: u16) -> Result<(), Error> {
        (**self).set_cursor(x, y)
    }

    fn write_pixel(&mut self, color: Rgb565) -> Result<(), Error> {
        (**self).write_pixel(color)
    }

    fn commit_frame(&mut self, frame: &[Rgb565]) -> Result<(), Error> {
        (**self).commit_frame(frame)
    }

    fn commit_frame_with_wipe(
        &mut self,
        frame: &[Rgb565],
        direction: WipeDirection,
    ) -> Result<(), Error> {
        (**self).commit_frame_with_wipe(frame, direction)
    }
}
