//! Root context: owns every core component and drives scheduler passes.
//!
//! Two task slots exist:
//! - `core`: drains the edge inbox, expires debounce windows, extends the
//!   uptime, checks auto-off and feeds the watchdog
//! - `draw`: the frame cycle; Runnable exactly while the screen is on
//!
//! Interrupt handlers only touch the [`TickClock`] and the [`EdgeInbox`].
//! Everything else is mutated from task context, through `&mut Kernel`.

#[cfg(test)]
mod tests;

use crate::apps::{AppEvent, ApplicationManager, FrameContext};
use crate::config::{BootConfig, TASK_SLOTS, TICK_PERIOD_MS};
use crate::display::DisplaySink;
use crate::error::Error;
use crate::frame::FramePipeline;
use crate::input::{ButtonEvent, ButtonId, Debouncer, EdgeInbox};
use crate::power::PowerState;
use crate::scheduler::{Resume, RunState, Scheduler, TaskId, Yield};
use crate::telemetry::Telemetry;
use crate::tick::{Tick, TickClock, Ticks, Uptime};

/// Hardware watchdog, fed once per housekeeping pass.
pub trait Watchdog {
    fn feed(&mut self);
}

impl Watchdog for () {
    fn feed(&mut self) {}
}

pub struct Kernel<'a, D, T, W = ()> {
    clock: &'a TickClock,
    inbox: &'a EdgeInbox,
    config: BootConfig,
    scheduler: Scheduler<Kernel<'a, D, T, W>, TASK_SLOTS>,
    core_task: TaskId,
    draw_task: TaskId,
    debouncer: Debouncer,
    power: PowerState,
    apps: ApplicationManager<'a>,
    frame: FramePipeline,
    display: D,
    telemetry: T,
    watchdog: W,
    uptime: Uptime,
    booted: bool,
}

impl<'a, D, T> Kernel<'a, D, T, ()>
where
    D: DisplaySink,
    T: Telemetry,
{
    pub fn new(
        clock: &'a TickClock,
        inbox: &'a EdgeInbox,
        config: BootConfig,
        apps: ApplicationManager<'a>,
        display: D,
        telemetry: T,
    ) -> Result<Self, Error> {
        Self::with_watchdog(clock, inbox, config, apps, display, telemetry, ())
    }
}

impl<'a, D, T, W> Kernel<'a, D, T, W>
where
    D: DisplaySink,
    T: Telemetry,
    W: Watchdog,
{
    pub fn with_watchdog(
        clock: &'a TickClock,
        inbox: &'a EdgeInbox,
        config: BootConfig,
        apps: ApplicationManager<'a>,
        display: D,
        telemetry: T,
        watchdog: W,
    ) -> Result<Self, Error> {
        config.validate()?;

        let mut scheduler = Scheduler::new();
        let core_task = scheduler.register("core", Self::core_task)?;
        let draw_task = scheduler.register("draw", Self::draw_task)?;

        Ok(Self {
            clock,
            inbox,
            config,
            scheduler,
            core_task,
            draw_task,
            debouncer: Debouncer::new(config.debounce_window),
            power: PowerState::new(config.auto_off_interval),
            apps,
            frame: FramePipeline::new(config.draw_interval),
            display,
            telemetry,
            watchdog,
            uptime: Uptime::new(clock.now()),
            booted: false,
        })
    }

    /// Initialise every application, start housekeeping and bring the
    /// screen up with the first application in the foreground.
    pub fn boot(&mut self) {
        if self.booted {
            return;
        }
        self.booted = true;
        self.apps.initialize_all();
        self.scheduler.start(self.core_task);
        self.wake_screen();
        info!(
            "kernel: booted, {} apps, draw every {} ticks",
            self.apps.len(),
            self.config.draw_interval
        );
    }

    /// One scheduler pass: drain pending edges, then give every due task
    /// one segment. Returns the number of segments run.
    pub fn run_pass(&mut self) -> usize {
        self.drain_inbox();

        let mut ran = 0;
        for id in self.scheduler.pass_order() {
            let Some((entry, resume)) = self.scheduler.dispatch(id, self.clock.now()) else {
                continue;
            };
            let yielded = entry(self, resume);
            self.scheduler.park(id, yielded, self.clock.now());
            ran += 1;
        }
        ran
    }

    /// Ticks the main loop may sleep before the next task is due. Zero
    /// while edges are waiting in the inbox.
    pub fn next_wake(&self) -> Option<Ticks> {
        if !self.inbox.is_empty() {
            return Some(0);
        }
        self.scheduler.next_wake(self.clock.now())
    }

    fn drain_inbox(&mut self) {
        while let Some(edge) = self.inbox.pop() {
            if let Some(event) = self.debouncer.on_edge(edge) {
                self.handle_event(event, edge.at);
            }
        }
    }

    /// Apply the dispatch policy to one debounced event.
    pub fn handle_event(&mut self, event: ButtonEvent, at: Tick) {
        match event {
            ButtonEvent::Pressed(button) => {
                self.power.reset_auto_off(at);
                if !self.power.screen_on() {
                    // The waking press is not forwarded.
                    self.wake_screen();
                    return;
                }
                match button {
                    ButtonId::Btn2 => {
                        self.apps.previous(&mut self.power);
                    }
                    ButtonId::Btn3 => {
                        self.apps.next(&mut self.power);
                    }
                    ButtonId::Btn4 => {
                        info!("power: screen off by button");
                        self.sleep_screen();
                    }
                    ButtonId::Btn1 => {}
                }
                self.apps.dispatch_foreground(AppEvent::ButtonPress(button));
            }
            ButtonEvent::Released(button) => {
                self.power.reset_auto_off(at);
                self.apps.dispatch_foreground(AppEvent::ButtonRelease(button));
            }
        }
    }

    /// ScreenOff -> ScreenOn. Renders and commits one frame before the
    /// panel is powered, then resumes the draw task. Returns `false` if the
    /// screen was already on.
    pub fn wake_screen(&mut self) -> bool {
        if self.power.screen_on() {
            return false;
        }
        let now = self.clock.now();

        // Never carry a wipe across the wake frame.
        self.power.take_transition();
        let ctx = self.frame_context(now);
        self.frame.compose(&mut self.apps, &self.telemetry, &ctx);
        sink_result(self.frame.commit_direct(&mut self.display), "wake frame");

        sink_result(self.display.power_on(), "power on");
        sink_result(self.display.display_on(), "display on");
        sink_result(self.display.set_contrast(self.config.contrast), "contrast");

        self.power.set_screen_on(true);
        self.scheduler.start(self.draw_task);
        self.apps.dispatch_global(AppEvent::ScreenOn);
        self.power.reset_auto_off(now);
        info!("power: screen on");
        true
    }

    /// ScreenOn -> ScreenOff. Returns `false` if the screen was already off.
    pub fn sleep_screen(&mut self) -> bool {
        if !self.power.screen_on() {
            return false;
        }
        self.scheduler.stop(self.draw_task);
        self.power.set_screen_on(false);
        sink_result(self.display.display_off(), "display off");
        sink_result(self.display.power_off(), "power off");
        self.apps.dispatch_global(AppEvent::ScreenOff);
        info!("power: screen off");
        true
    }

    fn frame_context(&mut self, now: Tick) -> FrameContext {
        let ticks = self.uptime.update(now);
        FrameContext {
            now,
            uptime_ms: ticks.wrapping_mul(TICK_PERIOD_MS as u32),
            frame: self.frame.frames(),
        }
    }

    fn core_task(k: &mut Self, _resume: Resume) -> Yield {
        let now = k.clock.now();
        k.drain_inbox();
        k.debouncer.expire(now);
        k.uptime.update(now);

        if k.power.auto_off_due(now) {
            info!("power: auto-off after inactivity");
            k.sleep_screen();
        }
        k.watchdog.feed();

        Yield::delay(if k.power.screen_on() {
            k.config.core_interval
        } else {
            k.config.core_standby_interval
        })
    }

    fn draw_task(k: &mut Self, _resume: Resume) -> Yield {
        if !k.frame.is_locked() {
            let start = k.clock.now();
            let ctx = k.frame_context(start);
            k.apps.process_running(&ctx);
            k.frame.compose(&mut k.apps, &k.telemetry, &ctx);
            sink_result(k.frame.commit(&mut k.display, &mut k.power), "frame");
            k.frame.record_duration(start, k.clock.now());
        }
        Yield::delay(k.config.draw_interval)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Diagnostics hooks
    // ═══════════════════════════════════════════════════════════════════════

    /// Stop the draw task from touching the frame buffer.
    pub fn lock_display(&mut self) {
        self.frame.lock();
    }

    pub fn unlock_display(&mut self) {
        self.frame.unlock();
    }

    pub fn display_locked(&self) -> bool {
        self.frame.is_locked()
    }

    pub fn write_display(&mut self, offset: usize, bytes: &[u8]) -> Result<(), Error> {
        self.frame.canvas_mut().write_bytes(offset, bytes)
    }

    pub fn read_display(&self, offset: usize, out: &mut [u8]) -> Result<(), Error> {
        self.frame.canvas().read_bytes(offset, out)
    }

    /// Push the frame buffer to the panel as written externally. Does
    /// nothing while the screen is off.
    pub fn commit_external(&mut self) -> Result<(), Error> {
        if !self.power.screen_on() {
            return Ok(());
        }
        self.frame.commit_direct(&mut self.display)
    }

    pub fn set_screen_power(&mut self, on: bool) -> bool {
        if on {
            self.wake_screen()
        } else {
            self.sleep_screen()
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    pub fn power(&self) -> &PowerState {
        &self.power
    }

    pub fn screen_on(&self) -> bool {
        self.power.screen_on()
    }

    pub fn apps(&self) -> &ApplicationManager<'a> {
        &self.apps
    }

    pub fn foreground(&mut self, index: usize) -> Result<(), Error> {
        self.apps.foreground(index)
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    pub fn frame(&self) -> &FramePipeline {
        &self.frame
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn telemetry(&self) -> &T {
        &self.telemetry
    }

    pub fn watchdog(&self) -> &W {
        &self.watchdog
    }

    pub fn uptime_ticks(&self) -> u32 {
        self.uptime.ticks()
    }

    pub fn core_state(&self) -> Option<RunState> {
        self.scheduler.state(self.core_task)
    }

    pub fn draw_state(&self) -> Option<RunState> {
        self.scheduler.state(self.draw_task)
    }

    /// Segments run by the draw task since boot.
    pub fn draw_runs(&self) -> u32 {
        self.scheduler.task(self.draw_task).map_or(0, |t| t.runs())
    }
}

/// Display failures inside the kernel are logged and dropped.
fn sink_result(result: Result<(), Error>, what: &'static str) {
    if let Err(e) = result {
        error!("display: {} failed: {}", what, e);
    }
}
