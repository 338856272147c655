//! Battery sampling.
//!
//! The cell is read through a 1:2 divider on AIN2. The charger STAT line
//! is low while charging and VBUS sense is high whenever USB power is
//! present.

use defmt::debug;
use embassy_nrf::gpio::Input;
use embassy_nrf::saadc::Saadc;
use embassy_time::{Duration, Ticker};
use oledwatch::telemetry::{BatterySnapshot, PowerSource, SharedTelemetry};

const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Full-scale input with gain 1/6 against the 0.6 V internal reference.
const FULL_SCALE_MV: u32 = 3600;
const RESOLUTION: u32 = 1 << 12;
const DIVIDER: u32 = 2;

fn millivolts(raw: i16) -> u16 {
    let raw = u32::from(raw.max(0) as u16);
    (raw * FULL_SCALE_MV * DIVIDER / RESOLUTION).min(u32::from(u16::MAX)) as u16
}

fn power_source(vbus: bool, charging: bool) -> PowerSource {
    match (vbus, charging) {
        (false, _) => PowerSource::OnBattery,
        (true, true) => PowerSource::Charging,
        (true, false) => PowerSource::Charged,
    }
}

#[embassy_executor::task]
pub async fn battery_task(
    mut saadc: Saadc<'static, 1>,
    charger_stat: Input<'static>,
    vbus_sense: Input<'static>,
    telemetry: &'static SharedTelemetry,
) -> ! {
    saadc.calibrate().await;
    let mut ticker = Ticker::every(SAMPLE_INTERVAL);

    loop {
        let mut buf = [0i16; 1];
        saadc.sample(&mut buf).await;

        let vbus = vbus_sense.is_high();
        let snapshot = BatterySnapshot::from_measurement(
            millivolts(buf[0]),
            power_source(vbus, charger_stat.is_low()),
            vbus,
        );
        debug!(
            "battery: {} mV, {}%, {}",
            snapshot.millivolts, snapshot.level_percent, snapshot.status
        );
        telemetry.publish(snapshot);

        ticker.next().await;
    }
}
