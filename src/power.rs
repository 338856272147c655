//! Screen power state and the pending-transition flag.
//!
//! The screen has two states:
//! - On: draw task running, auto-off deadline armed
//! - Off: draw task stopped, housekeeping at the standby rate
//!
//! Hardware sequencing (panel rail, display-on command, contrast) is done
//! by the kernel; this module only tracks the state and the inactivity
//! deadline.

use crate::display::WipeDirection;
use crate::tick::{Tick, Ticks};

/// Wipe requested for the next committed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transition {
    #[default]
    None,
    Forward,
    Backward,
}

impl Transition {
    pub fn wipe(self) -> Option<WipeDirection> {
        match self {
            Transition::None => None,
            Transition::Forward => Some(WipeDirection::Forward),
            Transition::Backward => Some(WipeDirection::Backward),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerState {
    screen_on: bool,
    auto_off_deadline: Tick,
    transition: Transition,
    auto_off: Option<Ticks>,
}

impl PowerState {
    /// Screen off, nothing pending. `auto_off` is the inactivity period,
    /// `None` disables auto screen-off.
    pub const fn new(auto_off: Option<Ticks>) -> Self {
        Self {
            screen_on: false,
            auto_off_deadline: Tick::from_raw(0),
            transition: Transition::None,
            auto_off,
        }
    }

    pub fn screen_on(&self) -> bool {
        self.screen_on
    }

    pub(crate) fn set_screen_on(&mut self, on: bool) {
        self.screen_on = on;
    }

    pub fn auto_off_deadline(&self) -> Tick {
        self.auto_off_deadline
    }

    pub fn auto_off_enabled(&self) -> bool {
        self.auto_off.is_some()
    }

    /// Push the inactivity deadline out from `now`.
    pub fn reset_auto_off(&mut self, now: Tick) {
        if let Some(period) = self.auto_off {
            self.auto_off_deadline = now.wrapping_add(period);
        }
    }

    /// True when the screen is on, auto-off is enabled and the deadline
    /// has been reached.
    pub fn auto_off_due(&self, now: Tick) -> bool {
        self.screen_on && self.auto_off.is_some() && now.has_reached(self.auto_off_deadline)
    }

    /// Ticks until the auto-off deadline, if it is armed.
    pub fn until_auto_off(&self, now: Tick) -> Option<Ticks> {
        (self.screen_on && self.auto_off.is_some()).then(|| now.until(self.auto_off_deadline))
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    pub fn transition_pending(&self) -> bool {
        self.transition != Transition::None
    }

    /// Request a wipe for the next frame. Refused while another one is
    /// still pending.
    pub fn request_transition(&mut self, transition: Transition) -> bool {
        if self.transition_pending() {
            return false;
        }
        self.transition = transition;
        true
    }

    /// Consume the pending transition, leaving `None`.
    pub fn take_transition(&mut self) -> Transition {
        core::mem::take(&mut self.transition)
    }
}

impl Default for PowerState {
    fn default() -> Self {
        Self::new(None)
    }
}
