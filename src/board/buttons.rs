//! GPIO button edges.
//!
//! Four buttons, active-low with internal pull-up. Each one is watched by
//! its own task that timestamps every edge into the shared inbox and wakes
//! the kernel loop. Debouncing happens in the kernel, not here.

use super::WakeSignal;
use defmt::warn;
use embassy_nrf::gpio::{AnyPin, Input, Pull};
use oledwatch::input::{ButtonId, EdgeInbox};
use oledwatch::tick::TickClock;

#[embassy_executor::task(pool_size = 4)]
pub async fn button_task(
    pin: AnyPin,
    button: ButtonId,
    clock: &'static TickClock,
    inbox: &'static EdgeInbox,
    wake: &'static WakeSignal,
) -> ! {
    let mut input = Input::new(pin, Pull::Up);

    loop {
        input.wait_for_any_edge().await;
        let pressed = input.is_low();

        if !inbox.notify(clock, button, pressed) {
            warn!("buttons: inbox full, {} edge dropped", button);
        }
        wake.signal(());
    }
}
