//! Monotonic tick clock - the sole time source of the firmware.
//!
//! The counter is 16 bits wide and wraps roughly every 65 s at 1 kHz.
//! Every comparison goes through modular subtraction, which stays correct
//! as long as the true distance between two compared ticks is below half
//! the counter range. All intervals in [`BootConfig`](crate::config::BootConfig)
//! are validated against that bound.

use core::cell::Cell;
use critical_section::{CriticalSection, Mutex};

/// A duration, in ticks.
pub type Ticks = u16;

/// A point on the wrapping tick counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Tick(u16);

impl Tick {
    /// Half the counter range: the longest distance that still compares
    /// correctly across a wrap.
    pub const HALF_RANGE: Ticks = 1 << 15;

    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// The tick `ticks` after this one, wrapping at the counter width.
    pub const fn wrapping_add(self, ticks: Ticks) -> Self {
        Self(self.0.wrapping_add(ticks))
    }

    /// Ticks elapsed from `earlier` to `self` (modular).
    pub const fn elapsed_since(self, earlier: Tick) -> Ticks {
        self.0.wrapping_sub(earlier.0)
    }

    /// True once `self` is at or past `deadline`.
    pub const fn has_reached(self, deadline: Tick) -> bool {
        self.0.wrapping_sub(deadline.0) < Self::HALF_RANGE
    }

    /// Ticks left until `deadline`, zero once it has been reached.
    pub const fn until(self, deadline: Tick) -> Ticks {
        if self.has_reached(deadline) {
            0
        } else {
            deadline.0.wrapping_sub(self.0)
        }
    }
}

/// `b - a` in the counter's modular arithmetic.
pub const fn elapsed(a: Tick, b: Tick) -> Ticks {
    b.elapsed_since(a)
}

/// Free-running counter advanced by the hardware tick interrupt.
///
/// Reads and writes happen inside a critical section so a 16-bit update
/// can never be observed half-written on narrower buses.
pub struct TickClock {
    count: Mutex<Cell<Tick>>,
}

impl TickClock {
    /// Counter starting at 1, like the hardware timer after reset.
    pub const fn new() -> Self {
        Self::starting_at(Tick(1))
    }

    pub const fn starting_at(start: Tick) -> Self {
        Self {
            count: Mutex::new(Cell::new(start)),
        }
    }

    pub fn now(&self) -> Tick {
        critical_section::with(|cs| self.now_cs(cs))
    }

    /// Read the counter inside a critical section the caller already holds.
    pub fn now_cs(&self, cs: CriticalSection<'_>) -> Tick {
        self.count.borrow(cs).get()
    }

    /// Tick interrupt body: advance by exactly one.
    pub fn advance(&self) -> Tick {
        self.advance_by(1)
    }

    pub fn advance_by(&self, ticks: Ticks) -> Tick {
        critical_section::with(|cs| {
            let count = self.count.borrow(cs);
            let next = count.get().wrapping_add(ticks);
            count.set(next);
            next
        })
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Extends the 16-bit tick into a 32-bit uptime.
///
/// `update` must be called at least once per half counter range; the
/// housekeeping task guarantees that.
#[derive(Clone, Copy, Debug)]
pub struct Uptime {
    last: Tick,
    total: u32,
}

impl Uptime {
    pub const fn new(start: Tick) -> Self {
        Self {
            last: start,
            total: 0,
        }
    }

    pub fn update(&mut self, now: Tick) -> u32 {
        self.total = self
            .total
            .wrapping_add(u32::from(now.elapsed_since(self.last)));
        self.last = now;
        self.total
    }

    pub fn ticks(&self) -> u32 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_unaffected_by_wrap() {
        for a in (0..=u16::MAX).step_by(7919).chain([u16::MAX]) {
            for distance in [0u16, 1, 25, 1000, Tick::HALF_RANGE - 1] {
                let start = Tick::from_raw(a);
                let end = start.wrapping_add(distance);
                assert_eq!(elapsed(start, end), distance);
            }
        }
    }

    #[test]
    fn elapsed_across_counter_maximum() {
        let start = Tick::from_raw(u16::MAX - 10);
        let end = start.wrapping_add(30);
        assert_eq!(end.raw(), 19);
        assert_eq!(elapsed(start, end), 30);
    }

    #[test]
    fn has_reached_is_wrap_safe() {
        let deadline = Tick::from_raw(u16::MAX - 5).wrapping_add(20);
        assert!(!Tick::from_raw(u16::MAX - 5).has_reached(deadline));
        assert!(!Tick::from_raw(u16::MAX).has_reached(deadline));
        assert!(Tick::from_raw(14).has_reached(deadline));
        assert!(Tick::from_raw(200).has_reached(deadline));
    }

    #[test]
    fn until_counts_down_to_zero() {
        let now = Tick::from_raw(65_530);
        let deadline = now.wrapping_add(12);
        assert_eq!(now.until(deadline), 12);
        assert_eq!(now.wrapping_add(5).until(deadline), 7);
        assert_eq!(now.wrapping_add(12).until(deadline), 0);
        assert_eq!(now.wrapping_add(400).until(deadline), 0);
    }

    #[test]
    fn clock_starts_at_one_and_wraps() {
        let clock = TickClock::new();
        assert_eq!(clock.now().raw(), 1);
        clock.advance();
        assert_eq!(clock.now().raw(), 2);

        let clock = TickClock::starting_at(Tick::from_raw(u16::MAX));
        assert_eq!(clock.advance().raw(), 0);
        assert_eq!(clock.advance_by(3).raw(), 3);
    }

    #[test]
    fn uptime_survives_several_wraps() {
        let clock = TickClock::starting_at(Tick::from_raw(60_000));
        let mut uptime = Uptime::new(clock.now());
        for _ in 0..10 {
            clock.advance_by(20_000);
            uptime.update(clock.now());
        }
        assert_eq!(uptime.ticks(), 200_000);
    }
}
