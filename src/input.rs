//! Button debouncing and the interrupt-to-kernel edge inbox.
//!
//! Four physical buttons (numbered 1-4 on the case):
//!   - BTN1 - application action
//!   - BTN2 - previous application
//!   - BTN3 - next application
//!   - BTN4 - screen off
//!
//! The pin-change interrupt does not run any kernel code. It stamps the
//! raw level with the current tick and pushes it into the [`EdgeInbox`];
//! the kernel drains the inbox on its next pass and feeds each edge to
//! the [`Debouncer`], which turns it into at most one [`ButtonEvent`].

use crate::config::EDGE_INBOX_DEPTH;
use crate::tick::{Tick, TickClock, Ticks};
use core::cell::{Cell, RefCell};
use critical_section::{CriticalSection, Mutex};
use heapless::Deque;

/// Number of physical buttons.
pub const BUTTON_COUNT: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonId {
    Btn1,
    Btn2,
    Btn3,
    Btn4,
}

impl ButtonId {
    pub const ALL: [ButtonId; BUTTON_COUNT] =
        [ButtonId::Btn1, ButtonId::Btn2, ButtonId::Btn3, ButtonId::Btn4];

    /// Zero-based slot.
    pub const fn index(self) -> usize {
        match self {
            ButtonId::Btn1 => 0,
            ButtonId::Btn2 => 1,
            ButtonId::Btn3 => 2,
            ButtonId::Btn4 => 3,
        }
    }

    /// Number printed on the case, 1-4.
    pub const fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(ButtonId::Btn1),
            2 => Some(ButtonId::Btn2),
            3 => Some(ButtonId::Btn3),
            4 => Some(ButtonId::Btn4),
            _ => None,
        }
    }
}

/// Raw pin-change notification, stamped in interrupt context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawEdge {
    pub button: ButtonId,
    /// Level after the change (`true` = pressed).
    pub pressed: bool,
    pub at: Tick,
}

/// Debounced semantic event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonEvent {
    Pressed(ButtonId),
    Released(ButtonId),
}

impl ButtonEvent {
    pub fn button(self) -> ButtonId {
        match self {
            ButtonEvent::Pressed(b) | ButtonEvent::Released(b) => b,
        }
    }
}

/// Debounce state of one button.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonState {
    pub pressed: bool,
    pub debouncing: bool,
    pub re_debounce_after: Tick,
}

/// Per-button debounce state machine.
pub struct Debouncer {
    buttons: [ButtonState; BUTTON_COUNT],
    window: Ticks,
    accepted: u32,
    suppressed: u32,
}

impl Debouncer {
    pub const fn new(window: Ticks) -> Self {
        Self {
            buttons: [ButtonState {
                pressed: false,
                debouncing: false,
                re_debounce_after: Tick::from_raw(0),
            }; BUTTON_COUNT],
            window,
            accepted: 0,
            suppressed: 0,
        }
    }

    /// Accept or suppress one raw edge.
    ///
    /// An edge inside the window of the last accepted edge on the same
    /// button is a bounce and produces nothing. Otherwise the new level is
    /// recorded, the window restarts at the edge's own tick, and exactly
    /// one event is returned.
    pub fn on_edge(&mut self, edge: RawEdge) -> Option<ButtonEvent> {
        let state = &mut self.buttons[edge.button.index()];
        if state.debouncing && !edge.at.has_reached(state.re_debounce_after) {
            self.suppressed = self.suppressed.wrapping_add(1);
            trace!("input: bounce on {} suppressed", edge.button);
            return None;
        }

        state.pressed = edge.pressed;
        state.debouncing = true;
        state.re_debounce_after = edge.at.wrapping_add(self.window);
        self.accepted = self.accepted.wrapping_add(1);

        Some(if edge.pressed {
            ButtonEvent::Pressed(edge.button)
        } else {
            ButtonEvent::Released(edge.button)
        })
    }

    /// Housekeeping: end every window whose deadline has passed, so a
    /// stale deadline can never lock a button out after the tick wraps.
    /// Returns how many windows were closed.
    pub fn expire(&mut self, now: Tick) -> usize {
        let mut closed = 0;
        for state in self.buttons.iter_mut() {
            if state.debouncing && now.has_reached(state.re_debounce_after) {
                state.debouncing = false;
                closed += 1;
            }
        }
        closed
    }

    pub fn state(&self, button: ButtonId) -> ButtonState {
        self.buttons[button.index()]
    }

    pub fn window(&self) -> Ticks {
        self.window
    }

    /// Edges turned into events since boot.
    pub fn accepted(&self) -> u32 {
        self.accepted
    }

    /// Edges rejected as bounces since boot.
    pub fn suppressed(&self) -> u32 {
        self.suppressed
    }
}

/// Queue of raw edges shared between interrupt and task context.
pub struct EdgeInbox {
    queue: Mutex<RefCell<Deque<RawEdge, EDGE_INBOX_DEPTH>>>,
    dropped: Mutex<Cell<u32>>,
}

impl EdgeInbox {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(RefCell::new(Deque::new())),
            dropped: Mutex::new(Cell::new(0)),
        }
    }

    /// Interrupt entry: stamp the level with the current tick and queue it
    /// in one critical section, so stamps are monotonic in queue order.
    /// Returns `false` if the inbox was full and the edge was dropped.
    pub fn notify(&self, clock: &TickClock, button: ButtonId, pressed: bool) -> bool {
        critical_section::with(|cs| {
            let edge = RawEdge {
                button,
                pressed,
                at: clock.now_cs(cs),
            };
            self.push_cs(cs, edge)
        })
    }

    /// Queue an already-stamped edge.
    pub fn push(&self, edge: RawEdge) -> bool {
        critical_section::with(|cs| self.push_cs(cs, edge))
    }

    fn push_cs(&self, cs: CriticalSection<'_>, edge: RawEdge) -> bool {
        let pushed = self.queue.borrow_ref_mut(cs).push_back(edge).is_ok();
        if !pushed {
            let dropped = self.dropped.borrow(cs);
            dropped.set(dropped.get().wrapping_add(1));
        }
        pushed
    }

    pub fn pop(&self) -> Option<RawEdge> {
        critical_section::with(|cs| self.queue.borrow_ref_mut(cs).pop_front())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.queue.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Edges lost to a full inbox since boot.
    pub fn dropped(&self) -> u32 {
        critical_section::with(|cs| self.dropped.borrow(cs).get())
    }
}

impl Default for EdgeInbox {
    fn default() -> Self {
        Self::new()
    }
}
