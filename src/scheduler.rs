//! Cooperative task scheduler.
//!
//! A task is a plain function over the shared context `C` plus an explicit
//! resumption point. Each call runs one work segment and returns a
//! [`Yield`] naming the tick it wants to be woken at and the segment to
//! resume from. The scheduler never runs a Stopped task and never runs a
//! task before its deadline; it does not preempt anything.
//!
//! The scheduler only stores descriptors. The owner of the context drives
//! a pass by asking [`Scheduler::dispatch`] for each slot in
//! [`Scheduler::pass_order`], calling the returned entry with `&mut C` and
//! handing the result back to [`Scheduler::park`]. This keeps the borrow of
//! the context with the caller while the task body runs.

use crate::error::Error;
use crate::tick::{Tick, Ticks};
use heapless::Vec;

/// Handle returned by [`Scheduler::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(usize);

impl TaskId {
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunState {
    Stopped,
    Runnable,
}

/// Segment index a task body resumes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Resume(pub u8);

impl Resume {
    pub const START: Resume = Resume(0);
}

/// Cooperative yield point returned at the end of every segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Yield {
    /// Sleep for a number of ticks counted from the moment of yielding.
    Delay(Ticks, Resume),
    /// Sleep until an absolute tick.
    Until(Tick, Resume),
}

impl Yield {
    /// Delay and restart the body from its first segment.
    pub const fn delay(ticks: Ticks) -> Self {
        Yield::Delay(ticks, Resume::START)
    }
}

/// One work segment of a task body.
pub type TaskEntry<C> = fn(&mut C, Resume) -> Yield;

/// Scheduler-owned state of one task slot.
pub struct TaskDescriptor<C> {
    name: &'static str,
    entry: TaskEntry<C>,
    state: RunState,
    resume: Resume,
    wake_at: Option<Tick>,
    runs: u32,
}

impl<C> TaskDescriptor<C> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn resume_point(&self) -> Resume {
        self.resume
    }

    /// `None` means "due on the next pass".
    pub fn wake_at(&self) -> Option<Tick> {
        self.wake_at
    }

    /// Number of segments run so far.
    pub fn runs(&self) -> u32 {
        self.runs
    }

    fn is_due(&self, now: Tick) -> bool {
        self.state == RunState::Runnable && self.wake_at.map_or(true, |at| now.has_reached(at))
    }
}

/// Fixed table of `N` task slots, created once at init.
pub struct Scheduler<C, const N: usize> {
    tasks: Vec<TaskDescriptor<C>, N>,
    cursor: usize,
}

impl<C, const N: usize> Scheduler<C, N> {
    pub const fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cursor: 0,
        }
    }

    /// Add a task in the Stopped state.
    pub fn register(&mut self, name: &'static str, entry: TaskEntry<C>) -> Result<TaskId, Error> {
        let id = TaskId(self.tasks.len());
        self.tasks
            .push(TaskDescriptor {
                name,
                entry,
                state: RunState::Stopped,
                resume: Resume::START,
                wake_at: None,
                runs: 0,
            })
            .map_err(|_| Error::TaskTableFull)?;
        debug!("sched: registered task {} as slot {}", name, id.0);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskDescriptor<C>> {
        self.tasks.get(id.0)
    }

    pub fn state(&self, id: TaskId) -> Option<RunState> {
        self.task(id).map(TaskDescriptor::state)
    }

    /// Make a task Runnable. A task restarted from Stopped is due on the
    /// next pass; its old deadline may predate a counter wrap.
    pub fn start(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(id.0) {
            if task.state == RunState::Stopped {
                task.state = RunState::Runnable;
                task.wake_at = None;
                trace!("sched: start {}", task.name);
            }
        }
    }

    /// Stop a task. Takes effect the next time its slot is visited; a
    /// segment that is already running completes normally.
    pub fn stop(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(id.0) {
            if task.state == RunState::Runnable {
                task.state = RunState::Stopped;
                trace!("sched: stop {}", task.name);
            }
        }
    }

    /// Slot order for the next pass, rotating the starting slot so no
    /// task is always served first.
    pub fn pass_order(&mut self) -> impl Iterator<Item = TaskId> {
        let len = self.tasks.len();
        let start = if len == 0 { 0 } else { self.cursor % len };
        self.cursor = if len == 0 { 0 } else { (start + 1) % len };
        (0..len).map(move |step| TaskId((start + step) % len))
    }

    /// Claim one segment of `id` if it is Runnable and due at `now`.
    pub fn dispatch(&mut self, id: TaskId, now: Tick) -> Option<(TaskEntry<C>, Resume)> {
        let task = self.tasks.get_mut(id.0)?;
        if !task.is_due(now) {
            return None;
        }
        task.runs = task.runs.wrapping_add(1);
        Some((task.entry, task.resume))
    }

    /// Record the yield a segment returned. Leaves the run state alone, so
    /// a task stopped from inside its own segment stays Stopped.
    pub fn park(&mut self, id: TaskId, yielded: Yield, now: Tick) {
        if let Some(task) = self.tasks.get_mut(id.0) {
            let (wake_at, resume) = match yielded {
                Yield::Delay(ticks, resume) => (now.wrapping_add(ticks), resume),
                Yield::Until(at, resume) => (at, resume),
            };
            task.wake_at = Some(wake_at);
            task.resume = resume;
        }
    }

    /// Ticks until the earliest Runnable task is due, `None` when nothing
    /// is Runnable.
    pub fn next_wake(&self, now: Tick) -> Option<Ticks> {
        self.tasks
            .iter()
            .filter(|task| task.state == RunState::Runnable)
            .map(|task| task.wake_at.map_or(0, |at| now.until(at)))
            .min()
    }
}

impl<C, const N: usize> Default for Scheduler<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal context: a trace of (task, segment) pairs.
    struct Trace {
        log: Vec<(&'static str, u8), 64>,
    }

    impl Trace {
        fn new() -> Self {
            Self { log: Vec::new() }
        }
    }

    fn blink(ctx: &mut Trace, resume: Resume) -> Yield {
        let _ = ctx.log.push(("blink", resume.0));
        match resume.0 {
            0 => Yield::Delay(5, Resume(1)),
            _ => Yield::Delay(10, Resume::START),
        }
    }

    fn steady(ctx: &mut Trace, resume: Resume) -> Yield {
        let _ = ctx.log.push(("steady", resume.0));
        Yield::delay(3)
    }

    fn run_pass(sched: &mut Scheduler<Trace, 4>, ctx: &mut Trace, now: Tick) -> usize {
        let mut ran = 0;
        let order: Vec<TaskId, 4> = sched.pass_order().collect();
        for id in order {
            if let Some((entry, resume)) = sched.dispatch(id, now) {
                let yielded = entry(ctx, resume);
                sched.park(id, yielded, now);
                ran += 1;
            }
        }
        ran
    }

    #[test]
    fn registered_tasks_start_stopped() {
        let mut sched: Scheduler<Trace, 4> = Scheduler::new();
        let id = sched.register("blink", blink).unwrap();
        assert_eq!(sched.state(id), Some(RunState::Stopped));
        assert_eq!(sched.next_wake(Tick::from_raw(0)), None);

        let mut ctx = Trace::new();
        assert_eq!(run_pass(&mut sched, &mut ctx, Tick::from_raw(0)), 0);
        assert!(ctx.log.is_empty());
    }

    #[test]
    fn task_table_is_fixed_size() {
        let mut sched: Scheduler<Trace, 1> = Scheduler::new();
        assert!(sched.register("a", |_, _| Yield::delay(1)).is_ok());
        assert_eq!(
            sched.register("b", |_, _| Yield::delay(1)).err(),
            Some(Error::TaskTableFull)
        );
    }

    #[test]
    fn segments_resume_where_they_yielded() {
        let mut sched: Scheduler<Trace, 4> = Scheduler::new();
        let id = sched.register("blink", blink).unwrap();
        sched.start(id);
        let mut ctx = Trace::new();

        for raw in 0..=20u16 {
            run_pass(&mut sched, &mut ctx, Tick::from_raw(raw));
        }
        // t=0 seg0 -> wake 5 seg1 -> wake 15 seg0 -> wake 20 seg1
        assert_eq!(
            ctx.log.as_slice(),
            &[("blink", 0), ("blink", 1), ("blink", 0), ("blink", 1)]
        );
        assert_eq!(sched.task(id).unwrap().runs(), 4);
    }

    #[test]
    fn delays_are_honoured_across_wrap() {
        let mut sched: Scheduler<Trace, 4> = Scheduler::new();
        let id = sched.register("steady", steady).unwrap();
        sched.start(id);
        let mut ctx = Trace::new();

        let start = Tick::from_raw(u16::MAX - 4);
        for step in 0..10u16 {
            run_pass(&mut sched, &mut ctx, start.wrapping_add(step));
        }
        // Runs at +0, +3, +6, +9.
        assert_eq!(ctx.log.len(), 4);
    }

    #[test]
    fn stopped_task_is_skipped_and_restart_clears_deadline() {
        let mut sched: Scheduler<Trace, 4> = Scheduler::new();
        let a = sched.register("steady", steady).unwrap();
        sched.start(a);
        let mut ctx = Trace::new();

        run_pass(&mut sched, &mut ctx, Tick::from_raw(100));
        sched.stop(a);
        for raw in 101..200u16 {
            run_pass(&mut sched, &mut ctx, Tick::from_raw(raw));
        }
        assert_eq!(ctx.log.len(), 1);

        // Restart at a tick that sits "before" the stale deadline once wrapped.
        sched.start(a);
        assert_eq!(sched.task(a).unwrap().wake_at(), None);
        assert_eq!(run_pass(&mut sched, &mut ctx, Tick::from_raw(50)), 1);
    }

    #[test]
    fn stop_while_a_segment_runs_takes_effect_next_pass() {
        let mut sched: Scheduler<Trace, 4> = Scheduler::new();
        let id = sched.register("steady", steady).unwrap();
        sched.start(id);
        let mut ctx = Trace::new();

        let (entry, resume) = sched.dispatch(id, Tick::from_raw(0)).unwrap();
        let yielded = entry(&mut ctx, resume);
        // Stop lands between the segment and its yield being recorded.
        sched.stop(id);
        sched.park(id, yielded, Tick::from_raw(0));

        assert_eq!(ctx.log.len(), 1);
        assert_eq!(sched.state(id), Some(RunState::Stopped));
        assert_eq!(sched.task(id).unwrap().wake_at(), Some(Tick::from_raw(3)));
        assert!(sched.dispatch(id, Tick::from_raw(3)).is_none());
    }

    #[test]
    fn pass_order_rotates() {
        let mut sched: Scheduler<Trace, 4> = Scheduler::new();
        sched.register("a", steady).unwrap();
        sched.register("b", steady).unwrap();
        sched.register("c", steady).unwrap();

        let first: Vec<usize, 4> = sched.pass_order().map(TaskId::index).collect();
        let second: Vec<usize, 4> = sched.pass_order().map(TaskId::index).collect();
        assert_eq!(first.as_slice(), &[0, 1, 2]);
        assert_eq!(second.as_slice(), &[1, 2, 0]);
    }

    #[test]
    fn next_wake_reports_earliest_runnable() {
        let mut sched: Scheduler<Trace, 4> = Scheduler::new();
        let a = sched.register("blink", blink).unwrap();
        let b = sched.register("steady", steady).unwrap();
        sched.start(a);
        sched.start(b);
        assert_eq!(sched.next_wake(Tick::from_raw(0)), Some(0));

        let mut ctx = Trace::new();
        run_pass(&mut sched, &mut ctx, Tick::from_raw(0));
        assert_eq!(sched.next_wake(Tick::from_raw(1)), Some(2));
        sched.stop(b);
        assert_eq!(sched.next_wake(Tick::from_raw(1)), Some(4));
    }
}
