//! Battery and power-source telemetry consumed by the status overlay.
//!
//! The kernel only reads telemetry. On the board a sampler task measures
//! the battery divider and charger pins and publishes a
//! [`BatterySnapshot`] into a [`SharedTelemetry`] cell; on the host tests
//! hand the kernel a plain snapshot.

use core::cell::Cell;
use critical_section::Mutex;

/// Where the device is drawing power from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerSource {
    #[default]
    OnBattery,
    Charging,
    Charged,
}

impl PowerSource {
    /// True when the device is externally powered.
    pub fn external(self) -> bool {
        !matches!(self, PowerSource::OnBattery)
    }

    /// Wire code used by the diagnostics protocol.
    pub fn code(self) -> u8 {
        match self {
            PowerSource::OnBattery => 0,
            PowerSource::Charging => 1,
            PowerSource::Charged => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BatteryStatus {
    Full,
    #[default]
    Normal,
    Low,
    Flat,
    Disconnected,
}

impl BatteryStatus {
    pub fn code(self) -> u8 {
        match self {
            BatteryStatus::Full => 0,
            BatteryStatus::Normal => 1,
            BatteryStatus::Low => 2,
            BatteryStatus::Flat => 3,
            BatteryStatus::Disconnected => 4,
        }
    }
}

/// Read-only view of the power subsystem.
pub trait Telemetry {
    /// Charge level, 0-100.
    fn battery_level_percent(&self) -> u8;
    fn power_source(&self) -> PowerSource;
    fn battery_status(&self) -> BatteryStatus;
    fn usb_connected(&self) -> bool;

    /// Raw battery voltage, when the source measures it.
    fn battery_millivolts(&self) -> u16 {
        0
    }

    /// Every field from a single read. Sources that update concurrently
    /// override this so a reader never mixes two samples.
    fn snapshot(&self) -> BatterySnapshot {
        BatterySnapshot {
            level_percent: self.battery_level_percent(),
            millivolts: self.battery_millivolts(),
            source: self.power_source(),
            status: self.battery_status(),
            usb_connected: self.usb_connected(),
        }
    }
}

/// One sample of the power subsystem.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatterySnapshot {
    pub level_percent: u8,
    pub millivolts: u16,
    pub source: PowerSource,
    pub status: BatteryStatus,
    pub usb_connected: bool,
}

impl BatterySnapshot {
    /// Snapshot derived from a battery voltage, charger state and VBUS.
    pub fn from_measurement(millivolts: u16, source: PowerSource, usb_connected: bool) -> Self {
        let level_percent = level_from_millivolts(millivolts);
        Self {
            level_percent,
            millivolts,
            source,
            status: status_for_level(millivolts, level_percent),
            usb_connected,
        }
    }
}

impl Telemetry for BatterySnapshot {
    fn battery_level_percent(&self) -> u8 {
        self.level_percent.min(100)
    }

    fn power_source(&self) -> PowerSource {
        self.source
    }

    fn battery_status(&self) -> BatteryStatus {
        self.status
    }

    fn usb_connected(&self) -> bool {
        self.usb_connected
    }

    fn battery_millivolts(&self) -> u16 {
        self.millivolts
    }

    fn snapshot(&self) -> BatterySnapshot {
        BatterySnapshot {
            level_percent: self.battery_level_percent(),
            ..*self
        }
    }
}

/// Snapshot cell shared between the battery sampler and the kernel.
pub struct SharedTelemetry {
    snapshot: Mutex<Cell<BatterySnapshot>>,
}

impl SharedTelemetry {
    pub const fn new() -> Self {
        Self {
            snapshot: Mutex::new(Cell::new(BatterySnapshot {
                level_percent: 0,
                millivolts: 0,
                source: PowerSource::OnBattery,
                status: BatteryStatus::Normal,
                usb_connected: false,
            })),
        }
    }

    pub fn publish(&self, snapshot: BatterySnapshot) {
        critical_section::with(|cs| self.snapshot.borrow(cs).set(snapshot));
    }

    pub fn get(&self) -> BatterySnapshot {
        critical_section::with(|cs| self.snapshot.borrow(cs).get())
    }
}

impl Default for SharedTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry for &SharedTelemetry {
    fn battery_level_percent(&self) -> u8 {
        self.get().battery_level_percent()
    }

    fn power_source(&self) -> PowerSource {
        self.get().source
    }

    fn battery_status(&self) -> BatteryStatus {
        self.get().status
    }

    fn usb_connected(&self) -> bool {
        self.get().usb_connected
    }

    fn battery_millivolts(&self) -> u16 {
        self.get().millivolts
    }

    fn snapshot(&self) -> BatterySnapshot {
        self.get().snapshot()
    }
}

/// Empty cell voltage (mV), maps to 0 %.
pub const BATTERY_EMPTY_MV: u16 = 3300;
/// Full cell voltage (mV), maps to 100 %.
pub const BATTERY_FULL_MV: u16 = 4200;
/// Below this the divider reads no cell at all.
pub const BATTERY_ABSENT_MV: u16 = 2500;

/// Linear map of a single-cell Li-Po voltage onto 0-100 %.
pub fn level_from_millivolts(millivolts: u16) -> u8 {
    let clamped = millivolts.clamp(BATTERY_EMPTY_MV, BATTERY_FULL_MV);
    let span = u32::from(BATTERY_FULL_MV - BATTERY_EMPTY_MV);
    (u32::from(clamped - BATTERY_EMPTY_MV) * 100 / span) as u8
}

pub fn status_for_level(millivolts: u16, level_percent: u8) -> BatteryStatus {
    if millivolts < BATTERY_ABSENT_MV {
        BatteryStatus::Disconnected
    } else if level_percent >= 95 {
        BatteryStatus::Full
    } else if level_percent >= 20 {
        BatteryStatus::Normal
    } else if level_percent >= 5 {
        BatteryStatus::Low
    } else {
        BatteryStatus::Flat
    }
}
