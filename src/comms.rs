//! Diagnostics packet protocol.
//!
//! Every packet is 64 bytes: byte 0 is the command, byte 1 the error code
//! of the response, the rest is a command-specific payload. Multi-byte
//! fields are little-endian. The handler answers every request with
//! exactly one packet carrying the same command byte.
//!
//! Display mirroring works on the frame buffer as big-endian RGB565 bytes
//! in 32-byte chunks addressed by byte offset.

use crate::config::{DISPLAY_BPP, DISPLAY_HEIGHT, DISPLAY_WIDTH};
use crate::display::DisplaySink;
use crate::error::Error;
use crate::kernel::{Kernel, Watchdog};
use crate::telemetry::Telemetry;

pub const PACKET_SIZE: usize = 64;

/// Frame-buffer bytes carried by one WRITEBUF / READBUF packet.
pub const DISPLAY_CHUNK_SIZE: usize = 32;

pub type Packet = [u8; PACKET_SIZE];

/// Vendor-defined HID report descriptor: one 64-byte input report and one
/// 64-byte output report, no report IDs.
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x06, 0x00, 0xFF, // Usage Page (Vendor Defined 0xFF00)
    0x09, 0x01, //       Usage (0x01)
    0xA1, 0x01, //       Collection (Application)
    0x15, 0x00, //         Logical Minimum (0)
    0x26, 0xFF, 0x00, //   Logical Maximum (255)
    0x75, 0x08, //         Report Size (8)
    0x95, PACKET_SIZE as u8, // Report Count
    0x09, 0x01, //         Usage (0x01)
    0x81, 0x02, //         Input (Data, Var, Abs)
    0x95, PACKET_SIZE as u8, // Report Count
    0x09, 0x01, //         Usage (0x01)
    0x91, 0x02, //         Output (Data, Var, Abs)
    0xC0, //             End Collection
];

/// Command codes.
pub mod cmd {
    pub const PING: u8 = 0x01;
    pub const RESET: u8 = 0x02;
    pub const SET_LED: u8 = 0x03;

    pub const GET_BATTERY_INFO: u8 = 0x10;
    pub const GET_CPU_INFO: u8 = 0x11;
    pub const GET_NEXT_MESSAGE: u8 = 0x12;

    pub const QUERY_DISPLAY: u8 = 0x20;
    pub const SET_DISPLAY_POWER: u8 = 0x21;
    pub const DISPLAY_LOCK: u8 = 0x22;
    pub const DISPLAY_UNLOCK: u8 = 0x23;
    pub const DISPLAY_WRITEBUF: u8 = 0x24;
    pub const DISPLAY_READBUF: u8 = 0x25;

    pub const QUERY_SENSORS: u8 = 0x30;
    pub const SET_SENSOR_ENABLE: u8 = 0x31;
    pub const GET_SENSOR_DATA: u8 = 0x32;

    pub const GET_DATETIME: u8 = 0x40;
    pub const SET_DATETIME: u8 = 0x41;

    pub const CLEAR_CALENDAR: u8 = 0x50;
    pub const ADD_CALENDAR_EVT: u8 = 0x51;
    pub const GET_CALENDAR_INFO: u8 = 0x52;
    pub const GET_CALENDAR_EVT: u8 = 0x53;
}

/// Response error codes.
pub mod err {
    pub const OK: u8 = 0x00;
    pub const UNKNOWN: u8 = 0x01;
    pub const OUT_OF_RAM: u8 = 0x10;
    pub const NOT_IMPLEMENTED: u8 = 0x11;
    pub const INVALID_INDEX: u8 = 0x12;
    pub const INVALID_PARAM: u8 = 0x13;
}

/// Bit 0 of the WRITEBUF state byte: commit the buffer after writing.
pub const WRITEBUF_COMMIT: u8 = 0x01;

/// Follow-up the transport must perform after sending the response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    None,
    Reset,
}

/// Response under construction.
struct Response(Packet);

impl Response {
    fn new(command: u8) -> Self {
        let mut packet = [0u8; PACKET_SIZE];
        packet[0] = command;
        Self(packet)
    }

    fn error(mut self, code: u8) -> Self {
        self.0[1] = code;
        self
    }

    fn put_u8(&mut self, at: usize, value: u8) {
        self.0[at] = value;
    }

    fn put_u16(&mut self, at: usize, value: u16) {
        self.0[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u32(&mut self, at: usize, value: u32) {
        self.0[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
}

fn get_u16(packet: &Packet, at: usize) -> u16 {
    u16::from_le_bytes([packet[at], packet[at + 1]])
}

/// Handle one request packet.
pub fn handle<D, T, W>(kernel: &mut Kernel<'_, D, T, W>, request: &Packet) -> (Packet, Action)
where
    D: DisplaySink,
    T: Telemetry,
    W: Watchdog,
{
    let command = request[0];
    let mut response = Response::new(command);
    let mut action = Action::None;

    match command {
        cmd::PING => {
            response.0[2..].copy_from_slice(&request[2..]);
        }
        cmd::RESET => {
            info!("comms: reset requested");
            action = Action::Reset;
        }
        cmd::GET_BATTERY_INFO => {
            let battery = kernel.telemetry().snapshot();
            response.put_u16(2, u16::from(battery.level_percent));
            response.put_u16(4, battery.millivolts);
            response.put_u8(6, battery.source.code());
            response.put_u8(7, battery.status.code());
            response.put_u8(8, u8::from(battery.usb_connected));
        }
        cmd::GET_CPU_INFO => {
            let frame = kernel.frame();
            response.put_u16(2, kernel.now().raw());
            response.put_u32(4, kernel.uptime_ticks());
            response.put_u32(8, frame.frames());
            response.put_u16(12, frame.last_duration());
            response.put_u32(14, frame.overruns());
            response.put_u32(18, kernel.debouncer().suppressed());
        }
        cmd::QUERY_DISPLAY => {
            response.put_u16(2, DISPLAY_WIDTH as u16);
            response.put_u16(4, DISPLAY_HEIGHT as u16);
            response.put_u16(6, DISPLAY_BPP);
            response.put_u16(8, u16::from(kernel.screen_on()));
        }
        cmd::SET_DISPLAY_POWER => match get_u16(request, 2) {
            0 => {
                kernel.set_screen_power(false);
            }
            1 => {
                kernel.set_screen_power(true);
            }
            _ => response = response.error(err::INVALID_PARAM),
        },
        cmd::DISPLAY_LOCK => kernel.lock_display(),
        cmd::DISPLAY_UNLOCK => kernel.unlock_display(),
        cmd::DISPLAY_WRITEBUF => {
            let state = request[2];
            let offset = usize::from(get_u16(request, 3));
            let chunk = &request[5..5 + DISPLAY_CHUNK_SIZE];
            response.put_u8(2, state);
            response.put_u16(3, offset as u16);
            match kernel.write_display(offset, chunk) {
                Ok(()) if state & WRITEBUF_COMMIT != 0 => {
                    if let Err(e) = kernel.commit_external() {
                        warn!("comms: external commit failed: {}", e);
                        response = response.error(err::UNKNOWN);
                    }
                }
                Ok(()) => {}
                Err(e) => response = response.error(error_code(e)),
            }
        }
        cmd::DISPLAY_READBUF => {
            let offset = usize::from(get_u16(request, 3));
            response.put_u8(2, request[2]);
            response.put_u16(3, offset as u16);
            let mut chunk = [0u8; DISPLAY_CHUNK_SIZE];
            match kernel.read_display(offset, &mut chunk) {
                Ok(()) => response.0[5..5 + DISPLAY_CHUNK_SIZE].copy_from_slice(&chunk),
                Err(e) => response = response.error(error_code(e)),
            }
        }
        cmd::SET_LED
        | cmd::GET_NEXT_MESSAGE
        | cmd::QUERY_SENSORS
        | cmd::SET_SENSOR_ENABLE
        | cmd::GET_SENSOR_DATA
        | cmd::GET_DATETIME
        | cmd::SET_DATETIME
        | cmd::CLEAR_CALENDAR
        | cmd::ADD_CALENDAR_EVT
        | cmd::GET_CALENDAR_INFO
        | cmd::GET_CALENDAR_EVT => {
            response = response.error(err::NOT_IMPLEMENTED);
        }
        _ => {
            debug!("comms: unknown command {=u8:#x}", command);
            response = response.error(err::UNKNOWN);
        }
    }

    if response.0[1] != err::OK {
        debug!("comms: command {=u8:#x} failed with {=u8:#x}", command, response.0[1]);
    }
    (response.0, action)
}

fn error_code(e: Error) -> u8 {
    match e {
        Error::OutOfRange => err::INVALID_INDEX,
        Error::InvalidConfig => err::INVALID_PARAM,
        Error::RegistryFull | Error::TaskTableFull => err::OUT_OF_RAM,
        Error::RegistrySealed | Error::Display => err::UNKNOWN,
    }
}
