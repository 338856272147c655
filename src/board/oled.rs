//! SSD1351 128x128 RGB OLED on a write-only SPI bus.
//!
//! Chip select is tied low by the caller; the panel is the only device on
//! the bus. Pixels go out as big-endian RGB565 in the panel's 65k colour
//! mode.

use embedded_graphics::pixelcolor::raw::{RawData, RawU16};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use oledwatch::config::{DISPLAY_HEIGHT, DISPLAY_WIDTH};
use oledwatch::display::{DisplaySink, WipeDirection, MAX_CONTRAST};
use oledwatch::frame::FRAME_PIXELS;
use oledwatch::Error;

mod cmd {
    pub const SET_COLUMN: u8 = 0x15;
    pub const SET_ROW: u8 = 0x75;
    pub const WRITE_RAM: u8 = 0x5C;
    pub const REMAP: u8 = 0xA0;
    pub const START_LINE: u8 = 0xA1;
    pub const OFFSET: u8 = 0xA2;
    pub const MODE_NORMAL: u8 = 0xA6;
    pub const FUNCTION_SELECT: u8 = 0xAB;
    pub const DISPLAY_OFF: u8 = 0xAE;
    pub const DISPLAY_ON: u8 = 0xAF;
    pub const PHASE_LENGTH: u8 = 0xB1;
    pub const ENHANCE: u8 = 0xB2;
    pub const CLOCK_DIV: u8 = 0xB3;
    pub const VSL: u8 = 0xB4;
    pub const GPIO: u8 = 0xB5;
    pub const SECOND_PRECHARGE: u8 = 0xB6;
    pub const GRAYSCALE_LUT: u8 = 0xB8;
    pub const PRECHARGE: u8 = 0xBB;
    pub const VCOMH: u8 = 0xBE;
    pub const COLOUR_CONTRAST: u8 = 0xC1;
    pub const MASTER_CONTRAST: u8 = 0xC7;
    pub const MUX_RATIO: u8 = 0xCA;
    pub const COMMAND_LOCK: u8 = 0xFD;
}

/// Gamma table, 63 entries. The bottom of the curve is pulled down so
/// near-black stays black.
const GAMMA_LUT: [u8; 63] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x05, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10,
    0x11, 0x12, 0x13, 0x15, 0x17, 0x19, 0x1B, 0x1D, 0x1F, 0x21, 0x23, 0x25, 0x27, 0x2A, 0x2D,
    0x30, 0x33, 0x36, 0x39, 0x3C, 0x3F, 0x42, 0x45, 0x48, 0x4C, 0x50, 0x54, 0x58, 0x5C, 0x60,
    0x64, 0x68, 0x6C, 0x70, 0x74, 0x78, 0x7D, 0x82, 0x87, 0x8C, 0x91, 0x96, 0x9B, 0xA0, 0xA5,
    0xAA, 0xAF, 0xB4,
];

const LAST_COLUMN: u8 = (DISPLAY_WIDTH - 1) as u8;
const LAST_ROW: u8 = (DISPLAY_HEIGHT - 1) as u8;

/// Bands the new frame is revealed in during a wipe.
const WIPE_STEPS: usize = 8;
const WIPE_STEP_MS: u32 = 6;
/// Delay between contrast steps when fading the panel in or out.
const FADE_STEP_MS: u32 = 3;

pub struct Ssd1351<SPI, DC, RST, VCC, DELAY> {
    spi: SPI,
    dc: DC,
    rst: RST,
    vcc: VCC,
    delay: DELAY,
    contrast: u8,
}

impl<SPI, DC, RST, VCC, DELAY> Ssd1351<SPI, DC, RST, VCC, DELAY>
where
    SPI: SpiBus,
    DC: OutputPin,
    RST: OutputPin,
    VCC: OutputPin,
    DELAY: DelayNs,
{
    pub fn new(spi: SPI, dc: DC, rst: RST, vcc: VCC, delay: DELAY) -> Self {
        Self {
            spi,
            dc,
            rst,
            vcc,
            delay,
            contrast: MAX_CONTRAST,
        }
    }

    /// Reset pulse, then the full init sequence. Leaves the panel asleep
    /// with its RAM cleared and the high-voltage rail off.
    pub fn init(&mut self) -> Result<(), Error> {
        self.vcc.set_low().map_err(|_| Error::Display)?;
        self.rst.set_high().map_err(|_| Error::Display)?;
        self.delay.delay_ms(1);
        self.rst.set_low().map_err(|_| Error::Display)?;
        self.delay.delay_ms(10);
        self.rst.set_high().map_err(|_| Error::Display)?;
        self.delay.delay_ms(10);

        // Unlock the locked commands.
        self.command(cmd::COMMAND_LOCK, &[0x12])?;
        self.command(cmd::COMMAND_LOCK, &[0xB1])?;
        self.command(cmd::DISPLAY_OFF, &[])?;

        self.command(cmd::CLOCK_DIV, &[0xF0])?;
        self.command(cmd::MUX_RATIO, &[LAST_ROW])?;
        self.command(cmd::OFFSET, &[0x00])?;
        self.command(cmd::START_LINE, &[0x00])?;
        // 65k colour, COM split, scan bottom to top.
        self.command(cmd::REMAP, &[0x74])?;
        self.command(cmd::GPIO, &[0x00])?;
        self.command(cmd::FUNCTION_SELECT, &[0x01])?;
        self.command(cmd::VSL, &[0xA0, 0xB5, 0x55])?;

        self.command(cmd::COLOUR_CONTRAST, &[0xC8, 0x80, 0xC8])?;
        self.command(cmd::MASTER_CONTRAST, &[self.contrast])?;
        self.command(cmd::GRAYSCALE_LUT, &GAMMA_LUT)?;

        self.command(cmd::PHASE_LENGTH, &[0x32])?;
        self.command(cmd::ENHANCE, &[0xA4, 0x00, 0x00])?;
        self.command(cmd::PRECHARGE, &[0x17])?;
        self.command(cmd::SECOND_PRECHARGE, &[0x01])?;
        self.command(cmd::VCOMH, &[0x05])?;
        self.command(cmd::MODE_NORMAL, &[])?;

        self.clear()
    }

    fn command(&mut self, command: u8, args: &[u8]) -> Result<(), Error> {
        self.dc.set_low().map_err(|_| Error::Display)?;
        self.spi.write(&[command]).map_err(|_| Error::Display)?;
        self.spi.flush().map_err(|_| Error::Display)?;
        if args.is_empty() {
            return Ok(());
        }
        self.data(args)
    }

    fn data(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.dc.set_high().map_err(|_| Error::Display)?;
        self.spi.write(bytes).map_err(|_| Error::Display)?;
        self.spi.flush().map_err(|_| Error::Display)
    }

    /// Limit RAM writes to the given inclusive window and start a write.
    fn window(&mut self, x0: u8, y0: u8, x1: u8, y1: u8) -> Result<(), Error> {
        self.command(cmd::SET_COLUMN, &[x0, x1])?;
        self.command(cmd::SET_ROW, &[y0, y1])?;
        self.command(cmd::WRITE_RAM, &[])
    }

    /// Stream columns `x0..=x1` of every row of `frame` into the current
    /// window.
    fn write_columns(&mut self, frame: &[Rgb565], x0: usize, x1: usize) -> Result<(), Error> {
        let mut line = [0u8; DISPLAY_WIDTH * 2];
        for row in frame.chunks_exact(DISPLAY_WIDTH) {
            let mut n = 0;
            for &pixel in &row[x0..=x1] {
                line[n..n + 2].copy_from_slice(&RawU16::from(pixel).into_inner().to_be_bytes());
                n += 2;
            }
            self.data(&line[..n])?;
        }
        Ok(())
    }

    fn fade(&mut self, levels: impl Iterator<Item = u8>) -> Result<(), Error> {
        for level in levels {
            self.command(cmd::MASTER_CONTRAST, &[level])?;
            self.delay.delay_ms(FADE_STEP_MS);
        }
        Ok(())
    }

    fn check_frame(frame: &[Rgb565]) -> Result<(), Error> {
        if frame.len() != FRAME_PIXELS {
            return Err(Error::OutOfRange);
        }
        Ok(())
    }
}

impl<SPI, DC, RST, VCC, DELAY> DisplaySink for Ssd1351<SPI, DC, RST, VCC, DELAY>
where
    SPI: SpiBus,
    DC: OutputPin,
    RST: OutputPin,
    VCC: OutputPin,
    DELAY: DelayNs,
{
    /// Switch the high-voltage rail on. Panel RAM survives while it is off,
    /// so a frame committed beforehand is shown as soon as the display is on.
    fn power_on(&mut self) -> Result<(), Error> {
        self.vcc.set_high().map_err(|_| Error::Display)?;
        self.delay.delay_ms(1);
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), Error> {
        self.vcc.set_low().map_err(|_| Error::Display)
    }

    fn display_on(&mut self) -> Result<(), Error> {
        self.command(cmd::DISPLAY_ON, &[])?;
        let target = self.contrast;
        self.fade(0..=target)
    }

    fn display_off(&mut self) -> Result<(), Error> {
        let from = self.contrast;
        self.fade((0..=from).rev())?;
        self.command(cmd::DISPLAY_OFF, &[])
    }

    fn set_contrast(&mut self, level: u8) -> Result<(), Error> {
        if level > MAX_CONTRAST {
            return Err(Error::OutOfRange);
        }
        self.contrast = level;
        self.command(cmd::MASTER_CONTRAST, &[level])
    }

    fn clear(&mut self) -> Result<(), Error> {
        self.window(0, 0, LAST_COLUMN, LAST_ROW)?;
        let line = [0u8; DISPLAY_WIDTH * 2];
        for _ in 0..DISPLAY_HEIGHT {
            self.data(&line)?;
        }
        Ok(())
    }

    fn set_cursor(&mut self, x: u16, y: u16) -> Result<(), Error> {
        if usize::from(x) >= DISPLAY_WIDTH || usize::from(y) >= DISPLAY_HEIGHT {
            return Err(Error::OutOfRange);
        }
        self.window(x as u8, y as u8, LAST_COLUMN, LAST_ROW)
    }

    fn write_pixel(&mut self, color: Rgb565) -> Result<(), Error> {
        self.data(&RawU16::from(color).into_inner().to_be_bytes())
    }

    fn commit_frame(&mut self, frame: &[Rgb565]) -> Result<(), Error> {
        Self::check_frame(frame)?;
        self.window(0, 0, LAST_COLUMN, LAST_ROW)?;
        self.write_columns(frame, 0, DISPLAY_WIDTH - 1)
    }

    /// Reveal the new frame band by band. Forward enters from the right
    /// edge, backward from the left.
    fn commit_frame_with_wipe(
        &mut self,
        frame: &[Rgb565],
        direction: WipeDirection,
    ) -> Result<(), Error> {
        Self::check_frame(frame)?;
        let band = DISPLAY_WIDTH / WIPE_STEPS;
        for step in 0..WIPE_STEPS {
            let (x0, x1) = match direction {
                WipeDirection::Forward => {
                    let x1 = DISPLAY_WIDTH - 1 - step * band;
                    (x1 + 1 - band, x1)
                }
                WipeDirection::Backward => (step * band, step * band + band - 1),
            };
            self.window(x0 as u8, 0, x1 as u8, LAST_ROW)?;
            self.write_columns(frame, x0, x1)?;
            self.delay.delay_ms(WIPE_STEP_MS);
        }
        Ok(())
    }
}
