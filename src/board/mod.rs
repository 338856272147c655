//! Board glue for the nRF52840 watch: panel, buttons, battery, USB and
//! the hardware watchdog.

pub mod battery;
pub mod buttons;
pub mod oled;
pub mod usb;

use embassy_nrf::wdt::WatchdogHandle;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use oledwatch::comms::Packet;

/// Wakes the kernel loop early when an edge or a request arrives.
pub type WakeSignal = Signal<CriticalSectionRawMutex, ()>;

pub type PacketChannel = Channel<CriticalSectionRawMutex, Packet, 2>;

/// nRF WDT channel fed by the kernel's housekeeping task.
///
/// `None` when the WDT was already running with another configuration
/// (it survives a soft reset); feeding is then a no-op.
pub struct HardwareWatchdog(pub Option<WatchdogHandle>);

impl oledwatch::Watchdog for HardwareWatchdog {
    fn feed(&mut self) {
        if let Some(handle) = self.0.as_mut() {
            handle.pet();
        }
    }
}
