//! oledwatch firmware entry point (nRF52840).
//!
//! Spawns the interrupt-side tasks (tick, buttons, battery, USB) and then
//! runs the kernel loop on the main task: one scheduler pass, any pending
//! diagnostics requests, then sleep until the next task is due or an edge
//! or request wakes it early.

#![no_std]
#![no_main]

mod board;

use board::oled::Ssd1351;
use board::{battery, buttons, usb, HardwareWatchdog, PacketChannel, WakeSignal};
use defmt::{error, info, warn};
use embassy_executor::{SpawnToken, Spawner};
use embassy_futures::select::select;
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pin, Pull};
use embassy_nrf::spim::{self, Spim};
use embassy_nrf::{bind_interrupts, peripherals, saadc, wdt};
use embassy_time::{Delay, Duration, Ticker, Timer};
use oledwatch::apps::clock::ClockApp;
use oledwatch::apps::stopwatch::StopwatchApp;
use oledwatch::apps::ApplicationManager;
use oledwatch::comms::{self, Action};
use oledwatch::config::{BootConfig, TICK_PERIOD_MS};
use oledwatch::input::{ButtonId, EdgeInbox};
use oledwatch::telemetry::SharedTelemetry;
use oledwatch::tick::TickClock;
use oledwatch::Kernel;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    SPIM3 => spim::InterruptHandler<peripherals::SPI3>;
    SAADC => saadc::InterruptHandler;
});

static CLOCK: TickClock = TickClock::new();
static INBOX: EdgeInbox = EdgeInbox::new();
static TELEMETRY: SharedTelemetry = SharedTelemetry::new();
static WAKE: WakeSignal = WakeSignal::new();
static REQUESTS: PacketChannel = PacketChannel::new();
static RESPONSES: PacketChannel = PacketChannel::new();

static CLOCK_APP: StaticCell<ClockApp> = StaticCell::new();
static STOPWATCH_APP: StaticCell<StopwatchApp> = StaticCell::new();

/// Watchdog timeout in 32.768 kHz ticks (2 s).
const WDT_TIMEOUT_TICKS: u32 = 2 * 32_768;

/// Time given to the USB stack to send the reset response.
const RESET_GRACE_MS: u64 = 20;

#[embassy_executor::task]
async fn tick_task(clock: &'static TickClock) -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(TICK_PERIOD_MS));
    loop {
        ticker.next().await;
        clock.advance();
    }
}

fn spawn<S>(spawner: &Spawner, token: SpawnToken<S>, name: &str) {
    if spawner.spawn(token).is_err() {
        error!("boot: could not spawn {} task", name);
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_nrf::init(Default::default());
    info!("oledwatch starting");

    spawn(&spawner, tick_task(&CLOCK), "tick");

    // - Buttons ----------------------------------------------
    let button_pins = [
        (p.P0_11.degrade(), ButtonId::Btn1),
        (p.P0_12.degrade(), ButtonId::Btn2),
        (p.P0_24.degrade(), ButtonId::Btn3),
        (p.P0_25.degrade(), ButtonId::Btn4),
    ];
    for (pin, button) in button_pins {
        spawn(
            &spawner,
            buttons::button_task(pin, button, &CLOCK, &INBOX, &WAKE),
            "button",
        );
    }

    // - Battery ----------------------------------------------
    let mut adc_config = saadc::Config::default();
    adc_config.resolution = saadc::Resolution::_12BIT;
    let channel = saadc::ChannelConfig::single_ended(p.P0_04);
    let adc = saadc::Saadc::new(p.SAADC, Irqs, adc_config, [channel]);
    let charger_stat = Input::new(p.P0_15, Pull::Up);
    let vbus_sense = Input::new(p.P0_14, Pull::None);
    spawn(
        &spawner,
        battery::battery_task(adc, charger_stat, vbus_sense, &TELEMETRY),
        "battery",
    );

    // - USB diagnostics --------------------------------------
    let hid = usb::init(p.USBD);
    spawn(&spawner, usb::usb_device_task(hid.device), "usb");
    spawn(
        &spawner,
        usb::request_task(hid.reader, &REQUESTS, &WAKE),
        "usb requests",
    );
    spawn(
        &spawner,
        usb::response_task(hid.writer, &RESPONSES),
        "usb responses",
    );

    // - Panel ------------------------------------------------
    let mut spi_config = spim::Config::default();
    spi_config.frequency = spim::Frequency::M8;
    let spi = Spim::new_txonly(p.SPI3, Irqs, p.P0_19, p.P0_20, spi_config);
    // Only device on the bus: chip select stays asserted.
    let _cs = Output::new(p.P0_21, Level::Low, OutputDrive::Standard);
    let dc = Output::new(p.P0_22, Level::Low, OutputDrive::Standard);
    let rst = Output::new(p.P0_23, Level::High, OutputDrive::Standard);
    let vcc = Output::new(p.P0_26, Level::Low, OutputDrive::Standard);
    let mut panel = Ssd1351::new(spi, dc, rst, vcc, Delay);
    if let Err(e) = panel.init() {
        error!("oled: init failed: {}", e);
    }

    // - Watchdog ---------------------------------------------
    let mut wdt_config = wdt::Config::default();
    wdt_config.timeout_ticks = WDT_TIMEOUT_TICKS;
    wdt_config.run_during_debug_halt = false;
    let watchdog = match wdt::Watchdog::try_new(p.WDT, wdt_config) {
        Ok((_wdt, [handle])) => HardwareWatchdog(Some(handle)),
        Err(_) => {
            warn!("wdt: already running with another configuration");
            HardwareWatchdog(None)
        }
    };

    // - Applications -----------------------------------------
    let mut apps = ApplicationManager::new();
    if let Err(e) = apps.install(CLOCK_APP.init(ClockApp::new(0))) {
        error!("apps: clock not installed: {}", e);
    }
    if let Err(e) = apps.install(STOPWATCH_APP.init(StopwatchApp::new())) {
        error!("apps: stopwatch not installed: {}", e);
    }

    let mut kernel = match Kernel::with_watchdog(
        &CLOCK,
        &INBOX,
        BootConfig::new(),
        apps,
        panel,
        &TELEMETRY,
        watchdog,
    ) {
        Ok(kernel) => kernel,
        Err(e) => defmt::panic!("boot: kernel setup failed: {}", e),
    };
    kernel.boot();

    loop {
        kernel.run_pass();

        while let Ok(request) = REQUESTS.try_receive() {
            let (response, action) = comms::handle(&mut kernel, &request);
            RESPONSES.send(response).await;
            if action == Action::Reset {
                Timer::after_millis(RESET_GRACE_MS).await;
                cortex_m::peripheral::SCB::sys_reset();
            }
        }

        match kernel.next_wake() {
            Some(0) => {}
            Some(ticks) => {
                let sleep = Timer::after_millis(u64::from(ticks) * TICK_PERIOD_MS);
                select(sleep, WAKE.wait()).await;
            }
            None => WAKE.wait().await,
        }
    }
}
