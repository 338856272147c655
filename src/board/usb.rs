//! USB HID diagnostics endpoint.
//!
//! A single vendor-defined HID interface with 64-byte reports in both
//! directions. Every OUT report is one request packet for the kernel; the
//! kernel answers through the response channel.

use super::{PacketChannel, WakeSignal};
use defmt::{info, warn};
use embassy_nrf::usb::vbus_detect::HardwareVbusDetect;
use embassy_nrf::usb::Driver;
use embassy_nrf::{bind_interrupts, peripherals};
use embassy_usb::class::hid::{Config as HidConfig, HidReader, HidReaderWriter, HidWriter, State};
use embassy_usb::{Builder, Config, UsbDevice};
use oledwatch::comms::{Packet, PACKET_SIZE, REPORT_DESCRIPTOR};
use oledwatch::config;
use static_cell::StaticCell;

bind_interrupts!(struct Irqs {
    USBD => embassy_nrf::usb::InterruptHandler<peripherals::USBD>;
    CLOCK_POWER => embassy_nrf::usb::vbus_detect::InterruptHandler;
});

pub type UsbDriver = Driver<'static, peripherals::USBD, HardwareVbusDetect>;

static HID_STATE: StaticCell<State> = StaticCell::new();
static USB_CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_MSOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_CTRL_BUF: StaticCell<[u8; 128]> = StaticCell::new();

pub struct UsbHid {
    pub device: UsbDevice<'static, UsbDriver>,
    pub reader: HidReader<'static, UsbDriver, PACKET_SIZE>,
    pub writer: HidWriter<'static, UsbDriver, PACKET_SIZE>,
}

/// Build the USB device. Must be called exactly once.
pub fn init(usbd: peripherals::USBD) -> UsbHid {
    let driver = Driver::new(usbd, Irqs, HardwareVbusDetect::new(Irqs));

    let mut usb_config = Config::new(config::USB_VID, config::USB_PID);
    usb_config.manufacturer = Some(config::USB_MANUFACTURER);
    usb_config.product = Some(config::USB_PRODUCT);
    usb_config.serial_number = Some(config::USB_SERIAL_NUMBER);
    usb_config.max_power = 100; // mA
    usb_config.max_packet_size_0 = 64;

    let mut builder = Builder::new(
        driver,
        usb_config,
        USB_CONFIG_DESC.init([0u8; 256]),
        USB_BOS_DESC.init([0u8; 256]),
        USB_MSOS_DESC.init([0u8; 256]),
        USB_CTRL_BUF.init([0u8; 128]),
    );

    let hid_config = HidConfig {
        report_descriptor: REPORT_DESCRIPTOR,
        request_handler: None,
        poll_ms: config::USB_HID_POLL_MS,
        max_packet_size: PACKET_SIZE as u16,
    };
    let hid = HidReaderWriter::<_, PACKET_SIZE, PACKET_SIZE>::new(
        &mut builder,
        HID_STATE.init(State::new()),
        hid_config,
    );
    let (reader, writer) = hid.split();

    let device = builder.build();
    info!("usb: diagnostics HID interface initialised");

    UsbHid {
        device,
        reader,
        writer,
    }
}

#[embassy_executor::task]
pub async fn usb_device_task(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    device.run().await
}

/// OUT reports -> request channel.
#[embassy_executor::task]
pub async fn request_task(
    mut reader: HidReader<'static, UsbDriver, PACKET_SIZE>,
    requests: &'static PacketChannel,
    wake: &'static WakeSignal,
) -> ! {
    let mut packet: Packet = [0u8; PACKET_SIZE];
    loop {
        match reader.read(&mut packet).await {
            Ok(n) if n == PACKET_SIZE => {
                requests.send(packet).await;
                wake.signal(());
            }
            Ok(n) => warn!("usb: short request of {} bytes ignored", n),
            Err(_) => warn!("usb: read failed"),
        }
    }
}

/// Response channel -> IN reports.
#[embassy_executor::task]
pub async fn response_task(
    mut writer: HidWriter<'static, UsbDriver, PACKET_SIZE>,
    responses: &'static PacketChannel,
) -> ! {
    loop {
        let packet = responses.receive().await;
        if writer.write(&packet).await.is_err() {
            warn!("usb: response write failed");
        }
    }
}
