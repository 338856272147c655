//! Simulation doubles for host tests.
//!
//! Built for unit tests and behind the `testing` feature, which the
//! integration tests under `tests/` enable through the dev-dependency on
//! this crate. Firmware builds leave the module out.

use crate::apps::{AppEvent, Application, FrameContext, Lifecycle};
use crate::config::MAX_APPS;
use crate::display::{DisplaySink, WipeDirection};
use crate::error::Error;
use crate::frame::{Canvas, FRAME_PIXELS};
use core::cell::{Cell, RefCell};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use heapless::{HistoryBuffer, LinearMap, Vec};

/// Commands received by [`RecordingDisplay`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayCommand {
    PowerOn,
    PowerOff,
    DisplayOn,
    DisplayOff,
    SetContrast(u8),
    Clear,
    SetCursor(u16, u16),
    WritePixel(Rgb565),
    CommitFrame,
    CommitWipe(WipeDirection),
}

const COMMAND_HISTORY: usize = 256;

/// Display sink that records every command and keeps the last frame.
pub struct RecordingDisplay {
    commands: HistoryBuffer<DisplayCommand, COMMAND_HISTORY>,
    frame: [Rgb565; FRAME_PIXELS],
    commits: u32,
    wipes: u32,
    powered: bool,
    on: bool,
    fail_commits: bool,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self {
            commands: HistoryBuffer::new(),
            frame: [Rgb565::BLACK; FRAME_PIXELS],
            commits: 0,
            wipes: 0,
            powered: false,
            on: false,
            fail_commits: false,
        }
    }

    /// Recent commands, oldest first.
    pub fn commands(&self) -> impl Iterator<Item = DisplayCommand> + '_ {
        self.commands.oldest_ordered().copied()
    }

    pub fn count(&self, command: DisplayCommand) -> usize {
        self.commands().filter(|c| *c == command).count()
    }

    /// Position of the first matching command in the recent history.
    pub fn position(&self, command: DisplayCommand) -> Option<usize> {
        self.commands().position(|c| c == command)
    }

    pub fn forget(&mut self) {
        self.commands.clear();
    }

    /// Frames committed since construction, wipes included.
    pub fn commits(&self) -> u32 {
        self.commits
    }

    pub fn wipes(&self) -> u32 {
        self.wipes
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn last_frame(&self) -> &[Rgb565] {
        &self.frame
    }

    /// Make every following commit fail with [`Error::Display`].
    pub fn fail_commits(&mut self, fail: bool) {
        self.fail_commits = fail;
    }

    fn store(&mut self, frame: &[Rgb565]) -> Result<(), Error> {
        self.commits += 1;
        if self.fail_commits {
            return Err(Error::Display);
        }
        let n = frame.len().min(FRAME_PIXELS);
        self.frame[..n].copy_from_slice(&frame[..n]);
        Ok(())
    }
}

impl Default for RecordingDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for RecordingDisplay {
    fn power_on(&mut self) -> Result<(), Error> {
        self.commands.write(DisplayCommand::PowerOn);
        self.powered = true;
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), Error> {
        self.commands.write(DisplayCommand::PowerOff);
        self.powered = false;
        Ok(())
    }

    fn display_on(&mut self) -> Result<(), Error> {
        self.commands.write(DisplayCommand::DisplayOn);
        self.on = true;
        Ok(())
    }

    fn display_off(&mut self) -> Result<(), Error> {
        self.commands.write(DisplayCommand::DisplayOff);
        self.on = false;
        Ok(())
    }

    fn set_contrast(&mut self, level: u8) -> Result<(), Error> {
        self.commands.write(DisplayCommand::SetContrast(level));
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Error> {
        self.commands.write(DisplayCommand::Clear);
        self.frame.fill(Rgb565::BLACK);
        Ok(())
    }

    fn set_cursor(&mut self, x: u16, y: u16) -> Result<(), Error> {
        self.commands.write(DisplayCommand::SetCursor(x, y));
        Ok(())
    }

    fn write_pixel(&mut self, color: Rgb565) -> Result<(), Error> {
        self.commands.write(DisplayCommand::WritePixel(color));
        Ok(())
    }

    fn commit_frame(&mut self, frame: &[Rgb565]) -> Result<(), Error> {
        self.commands.write(DisplayCommand::CommitFrame);
        self.store(frame)
    }

    fn commit_frame_with_wipe(
        &mut self,
        frame: &[Rgb565],
        direction: WipeDirection,
    ) -> Result<(), Error> {
        self.commands.write(DisplayCommand::CommitWipe(direction));
        self.wipes += 1;
        self.store(frame)
    }
}

/// Something an application saw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Record {
    Initialize(&'static str),
    Event(&'static str, AppEvent),
    Process(&'static str),
    Draw(&'static str),
}

#[derive(Clone, Copy, Debug, Default)]
struct Cycles {
    process: usize,
    draw: usize,
}

const EVENT_CAPACITY: usize = 128;

/// Shared log written by every [`RecorderApp`].
///
/// Initialisation and events are kept in order; `process` and `draw`
/// calls are only counted since they happen every frame.
pub struct EventLog {
    records: RefCell<Vec<Record, EVENT_CAPACITY>>,
    cycles: RefCell<LinearMap<&'static str, Cycles, MAX_APPS>>,
    overflowed: Cell<bool>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            records: RefCell::new(Vec::new()),
            cycles: RefCell::new(LinearMap::new()),
            overflowed: Cell::new(false),
        }
    }

    fn push(&self, record: Record) {
        if self.records.borrow_mut().push(record).is_err() {
            self.overflowed.set(true);
        }
    }

    fn bump(&self, name: &'static str, f: impl FnOnce(&mut Cycles)) {
        let mut cycles = self.cycles.borrow_mut();
        if let Some(entry) = cycles.get_mut(&name) {
            f(entry);
            return;
        }
        let mut entry = Cycles::default();
        f(&mut entry);
        if cycles.insert(name, entry).is_err() {
            self.overflowed.set(true);
        }
    }

    pub fn count(&self, record: Record) -> usize {
        match record {
            Record::Process(name) => self.cycles.borrow().get(&name).map_or(0, |c| c.process),
            Record::Draw(name) => self.cycles.borrow().get(&name).map_or(0, |c| c.draw),
            _ => self.records.borrow().iter().filter(|r| **r == record).count(),
        }
    }

    /// Events delivered to `name`, in order.
    pub fn events_for(&self, name: &'static str) -> Vec<AppEvent, EVENT_CAPACITY> {
        self.records
            .borrow()
            .iter()
            .filter_map(|r| match r {
                Record::Event(n, e) if *n == name => Some(*e),
                _ => None,
            })
            .collect()
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed.get()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
        self.cycles.borrow_mut().clear();
        self.overflowed.set(false);
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Application that records everything it is asked to do and paints a
/// solid marker so tests can tell which application was drawn.
pub struct RecorderApp<'l> {
    name: &'static str,
    log: &'l EventLog,
    lifecycle: Lifecycle,
    marker: Rgb565,
}

impl<'l> RecorderApp<'l> {
    /// Marker rectangle drawn by every recorder.
    pub const MARKER: Rectangle = Rectangle::new(Point::new(10, 40), Size::new(20, 20));

    pub fn new(name: &'static str, log: &'l EventLog) -> Self {
        Self {
            name,
            log,
            lifecycle: Lifecycle::Idle,
            marker: Rgb565::MAGENTA,
        }
    }

    /// Ask to be processed every frame.
    pub fn running(mut self) -> Self {
        self.lifecycle = Lifecycle::Running;
        self
    }

    pub fn with_marker(mut self, marker: Rgb565) -> Self {
        self.marker = marker;
        self
    }
}

impl Application for RecorderApp<'_> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn initialize(&mut self) -> Lifecycle {
        self.log.push(Record::Initialize(self.name));
        self.lifecycle
    }

    fn process(&mut self, _ctx: &FrameContext) {
        self.log.bump(self.name, |c| c.process += 1);
    }

    fn draw(&mut self, canvas: &mut Canvas, _ctx: &FrameContext) {
        self.log.bump(self.name, |c| c.draw += 1);
        let _ = Self::MARKER
            .into_styled(PrimitiveStyle::with_fill(self.marker))
            .draw(canvas);
    }

    fn on_event(&mut self, event: AppEvent) {
        self.log.push(Record::Event(self.name, event));
    }
}
