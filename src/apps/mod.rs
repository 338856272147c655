//! Installed applications and the foreground selection.
//!
//! Applications are installed once, before boot, into a fixed table.
//! Exactly one of them is foregrounded while the table is non-empty; it
//! alone is drawn and receives button events. Background applications
//! keep their state and are never reinitialised.

pub mod clock;
pub mod stopwatch;

pub use clock::ClockApp;
pub use stopwatch::StopwatchApp;

use crate::config::MAX_APPS;
use crate::error::Error;
use crate::frame::Canvas;
use crate::input::ButtonId;
use crate::power::{PowerState, Transition};
use crate::tick::Tick;
use heapless::Vec;

/// Event delivered to applications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AppEvent {
    ScreenOn,
    ScreenOff,
    ButtonPress(ButtonId),
    ButtonRelease(ButtonId),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Lifecycle {
    #[default]
    Idle,
    /// `process` is called once per frame cycle.
    Running,
}

/// Timing information for one frame cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameContext {
    pub now: Tick,
    /// Milliseconds since boot, extended past the tick wrap.
    pub uptime_ms: u32,
    /// Frames composed since boot.
    pub frame: u32,
}

/// Capability set of an installed application.
pub trait Application {
    fn name(&self) -> &'static str;

    /// Called once at boot. The returned lifecycle decides whether
    /// `process` is called.
    fn initialize(&mut self) -> Lifecycle {
        Lifecycle::Idle
    }

    /// Background work, once per frame cycle while Running.
    fn process(&mut self, _ctx: &FrameContext) {}

    /// Draw into the cleared canvas. Only called while foregrounded.
    fn draw(&mut self, canvas: &mut Canvas, ctx: &FrameContext);

    fn on_event(&mut self, _event: AppEvent) {}
}

/// One entry of the installed table.
pub struct ApplicationDescriptor<'a> {
    app: &'a mut dyn Application,
    lifecycle: Lifecycle,
}

impl<'a> ApplicationDescriptor<'a> {
    pub fn name(&self) -> &'static str {
        self.app.name()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }
}

pub struct ApplicationManager<'a> {
    apps: Vec<ApplicationDescriptor<'a>, MAX_APPS>,
    foreground: usize,
    sealed: bool,
}

impl<'a> ApplicationManager<'a> {
    pub const fn new() -> Self {
        Self {
            apps: Vec::new(),
            foreground: 0,
            sealed: false,
        }
    }

    /// Append an application. Only allowed before [`initialize_all`].
    ///
    /// [`initialize_all`]: ApplicationManager::initialize_all
    pub fn install(&mut self, app: &'a mut dyn Application) -> Result<usize, Error> {
        if self.sealed {
            return Err(Error::RegistrySealed);
        }
        let index = self.apps.len();
        self.apps
            .push(ApplicationDescriptor {
                app,
                lifecycle: Lifecycle::Idle,
            })
            .map_err(|_| Error::RegistryFull)?;
        Ok(index)
    }

    /// Initialise every installed application in order and seal the table.
    pub fn initialize_all(&mut self) {
        for entry in self.apps.iter_mut() {
            entry.lifecycle = entry.app.initialize();
            debug!("apps: {} initialised ({})", entry.app.name(), entry.lifecycle);
        }
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn foreground_index(&self) -> usize {
        self.foreground
    }

    pub fn name(&self, index: usize) -> Result<&'static str, Error> {
        self.apps.get(index).map(|e| e.name()).ok_or(Error::OutOfRange)
    }

    pub fn lifecycle(&self, index: usize) -> Result<Lifecycle, Error> {
        self.apps
            .get(index)
            .map(|e| e.lifecycle)
            .ok_or(Error::OutOfRange)
    }

    pub fn set_lifecycle(&mut self, index: usize, lifecycle: Lifecycle) -> Result<(), Error> {
        let entry = self.apps.get_mut(index).ok_or(Error::OutOfRange)?;
        entry.lifecycle = lifecycle;
        Ok(())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ApplicationDescriptor<'a>> {
        self.apps.iter()
    }

    /// Make `index` the foreground application. The outgoing application
    /// simply stops being drawn; the incoming one keeps its state.
    pub fn foreground(&mut self, index: usize) -> Result<(), Error> {
        if index >= self.apps.len() {
            return Err(Error::OutOfRange);
        }
        self.foreground = index;
        Ok(())
    }

    /// Move one application forward. No-op at the last one, and while a
    /// transition is still pending.
    pub fn next(&mut self, power: &mut PowerState) -> bool {
        if self.foreground + 1 >= self.apps.len() {
            return false;
        }
        self.switch_to(self.foreground + 1, Transition::Forward, power)
    }

    /// Move one application back. No-op at the first one, and while a
    /// transition is still pending.
    pub fn previous(&mut self, power: &mut PowerState) -> bool {
        if self.foreground == 0 || self.apps.is_empty() {
            return false;
        }
        self.switch_to(self.foreground - 1, Transition::Backward, power)
    }

    fn switch_to(&mut self, index: usize, transition: Transition, power: &mut PowerState) -> bool {
        if !power.request_transition(transition) {
            info!("apps: switch suppressed, transition in progress");
            return false;
        }
        self.foreground = index;
        debug!("apps: foreground -> {}", self.apps[index].app.name());
        true
    }

    /// Deliver `event` to every installed application.
    pub fn dispatch_global(&mut self, event: AppEvent) {
        for entry in self.apps.iter_mut() {
            entry.app.on_event(event);
        }
    }

    /// Deliver `event` to the foreground application only.
    pub fn dispatch_foreground(&mut self, event: AppEvent) {
        if let Some(entry) = self.apps.get_mut(self.foreground) {
            entry.app.on_event(event);
        }
    }

    /// Run `process` for every Running application.
    pub fn process_running(&mut self, ctx: &FrameContext) {
        for entry in self.apps.iter_mut() {
            if entry.lifecycle == Lifecycle::Running {
                entry.app.process(ctx);
            }
        }
    }

    /// Draw the foreground application. Returns `false` when no
    /// application is installed.
    pub fn draw_foreground(&mut self, canvas: &mut Canvas, ctx: &FrameContext) -> bool {
        match self.apps.get_mut(self.foreground) {
            Some(entry) => {
                entry.app.draw(canvas, ctx);
                true
            }
            None => false,
        }
    }
}

impl Default for ApplicationManager<'_> {
    fn default() -> Self {
        Self::new()
    }
}
