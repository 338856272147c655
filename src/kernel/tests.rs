//! Kernel scenarios on the host, driven tick by tick.
//!
//! Every test owns its clock and inbox, installs recorder applications
//! and advances time one tick per scheduler pass, like the board's main
//! loop does.

use super::*;
use crate::apps::{AppEvent, ApplicationManager};
use crate::display::WipeDirection;
use crate::error::Error;
use crate::frame::FRAME_BYTES;
use crate::power::Transition;
use crate::telemetry::{BatterySnapshot, BatteryStatus, PowerSource};
use crate::testing::{DisplayCommand, EventLog, Record, RecorderApp, RecordingDisplay};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;

type TestKernel<'a, W = ()> = Kernel<'a, RecordingDisplay, BatterySnapshot, W>;

fn battery() -> BatterySnapshot {
    BatterySnapshot {
        level_percent: 45,
        millivolts: 3700,
        source: PowerSource::OnBattery,
        status: BatteryStatus::Normal,
        usb_connected: false,
    }
}

fn boot<'a>(
    clock: &'a TickClock,
    inbox: &'a EdgeInbox,
    apps: ApplicationManager<'a>,
) -> TestKernel<'a> {
    let mut kernel = Kernel::new(
        clock,
        inbox,
        BootConfig::default(),
        apps,
        RecordingDisplay::new(),
        battery(),
    )
    .unwrap();
    kernel.boot();
    kernel
}

fn run_for<W: Watchdog>(kernel: &mut TestKernel<'_, W>, clock: &TickClock, ticks: u32) {
    for _ in 0..ticks {
        clock.advance();
        kernel.run_pass();
    }
}

fn edge(kernel: &mut TestKernel<'_>, clock: &TickClock, inbox: &EdgeInbox, b: ButtonId, pressed: bool) {
    assert!(inbox.notify(clock, b, pressed));
    kernel.run_pass();
}

/// Press, hold past the debounce window, release, settle.
fn tap(kernel: &mut TestKernel<'_>, clock: &TickClock, inbox: &EdgeInbox, b: ButtonId) {
    edge(kernel, clock, inbox, b, true);
    run_for(kernel, clock, 40);
    edge(kernel, clock, inbox, b, false);
    run_for(kernel, clock, 40);
}

fn marker_at(kernel: &TestKernel<'_>) -> Rgb565 {
    let p = RecorderApp::MARKER.center();
    kernel.display().last_frame()[p.y as usize * crate::config::DISPLAY_WIDTH + p.x as usize]
}

// ═══════════════════════════════════════════════════════════════════════════
// Boot and configuration
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn boot_renders_before_powering_the_panel() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let log = EventLog::new();
    let mut a = RecorderApp::new("a", &log);
    let mut b = RecorderApp::new("b", &log);
    let mut apps = ApplicationManager::new();
    apps.install(&mut a).unwrap();
    apps.install(&mut b).unwrap();

    let kernel = boot(&clock, &inbox, apps);

    let commands: std::vec::Vec<_> = kernel.display().commands().collect();
    assert_eq!(
        commands,
        [
            DisplayCommand::CommitFrame,
            DisplayCommand::PowerOn,
            DisplayCommand::DisplayOn,
            DisplayCommand::SetContrast(15),
        ]
    );
    assert!(kernel.screen_on());
    assert_eq!(kernel.core_state(), Some(RunState::Runnable));
    assert_eq!(kernel.draw_state(), Some(RunState::Runnable));
    assert_eq!(kernel.apps().foreground_index(), 0);
    for name in ["a", "b"] {
        assert_eq!(log.count(Record::Initialize(name)), 1);
        assert_eq!(log.count(Record::Event(name, AppEvent::ScreenOn)), 1);
    }
    assert_eq!(log.count(Record::Draw("a")), 1);
    assert_eq!(log.count(Record::Draw("b")), 0);
}

#[test]
fn invalid_config_is_rejected() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let config = BootConfig {
        draw_interval: 0,
        ..BootConfig::default()
    };
    let result = Kernel::new(
        &clock,
        &inbox,
        config,
        ApplicationManager::new(),
        RecordingDisplay::new(),
        battery(),
    );
    assert!(matches!(result, Err(Error::InvalidConfig)));
}

#[test]
fn boot_without_applications_still_draws_status() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let mut kernel = boot(&clock, &inbox, ApplicationManager::new());
    run_for(&mut kernel, &clock, 40);
    assert_eq!(kernel.display().last_frame()[0], Rgb565::CSS_SKY_BLUE);
}

// ═══════════════════════════════════════════════════════════════════════════
// Application switching
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn next_walks_to_the_last_application_and_stops() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let log = EventLog::new();
    let mut a = RecorderApp::new("a", &log).with_marker(Rgb565::RED);
    let mut b = RecorderApp::new("b", &log).with_marker(Rgb565::GREEN);
    let mut c = RecorderApp::new("c", &log).with_marker(Rgb565::BLUE);
    let mut d = RecorderApp::new("d", &log).with_marker(Rgb565::YELLOW);
    let mut apps = ApplicationManager::new();
    for app in [&mut a, &mut b, &mut c, &mut d] {
        apps.install(app).unwrap();
    }
    let mut kernel = boot(&clock, &inbox, apps);
    run_for(&mut kernel, &clock, 40);
    assert_eq!(marker_at(&kernel), Rgb565::RED);

    let markers = [Rgb565::GREEN, Rgb565::BLUE, Rgb565::YELLOW];
    for (expected, marker) in (1..=3).zip(markers) {
        tap(&mut kernel, &clock, &inbox, ButtonId::Btn3);
        assert_eq!(kernel.apps().foreground_index(), expected);
        assert_eq!(kernel.display().wipes(), expected as u32);
        assert_eq!(kernel.power().transition(), Transition::None);
        assert_eq!(marker_at(&kernel), marker);
    }
    assert_eq!(
        kernel.display().count(DisplayCommand::CommitWipe(WipeDirection::Forward)),
        3
    );

    tap(&mut kernel, &clock, &inbox, ButtonId::Btn3);
    assert_eq!(kernel.apps().foreground_index(), 3);
    assert_eq!(kernel.display().wipes(), 3);
    assert!(!kernel.power().transition_pending());
}

#[test]
fn previous_wipes_backward_and_clamps_at_first() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let log = EventLog::new();
    let mut a = RecorderApp::new("a", &log);
    let mut b = RecorderApp::new("b", &log);
    let mut apps = ApplicationManager::new();
    apps.install(&mut a).unwrap();
    apps.install(&mut b).unwrap();
    let mut kernel = boot(&clock, &inbox, apps);

    tap(&mut kernel, &clock, &inbox, ButtonId::Btn2);
    assert_eq!(kernel.apps().foreground_index(), 0);
    assert_eq!(kernel.display().wipes(), 0);

    tap(&mut kernel, &clock, &inbox, ButtonId::Btn3);
    tap(&mut kernel, &clock, &inbox, ButtonId::Btn2);
    assert_eq!(kernel.apps().foreground_index(), 0);
    assert_eq!(
        kernel.display().count(DisplayCommand::CommitWipe(WipeDirection::Backward)),
        1
    );
}

#[test]
fn switch_is_suppressed_while_a_wipe_is_pending() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let log = EventLog::new();
    let mut a = RecorderApp::new("a", &log);
    let mut b = RecorderApp::new("b", &log);
    let mut c = RecorderApp::new("c", &log);
    let mut apps = ApplicationManager::new();
    for app in [&mut a, &mut b, &mut c] {
        apps.install(app).unwrap();
    }
    let mut kernel = boot(&clock, &inbox, apps);
    run_for(&mut kernel, &clock, 1);

    let now = kernel.now();
    kernel.handle_event(ButtonEvent::Pressed(ButtonId::Btn3), now);
    kernel.handle_event(ButtonEvent::Pressed(ButtonId::Btn3), now);
    assert_eq!(kernel.apps().foreground_index(), 1);
    assert_eq!(kernel.power().transition(), Transition::Forward);

    run_for(&mut kernel, &clock, 40);
    assert_eq!(kernel.display().wipes(), 1);
    assert!(!kernel.power().transition_pending());

    let now = kernel.now();
    kernel.handle_event(ButtonEvent::Pressed(ButtonId::Btn3), now);
    assert_eq!(kernel.apps().foreground_index(), 2);
}

#[test]
fn failed_wipe_still_clears_the_transition() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let log = EventLog::new();
    let mut a = RecorderApp::new("a", &log);
    let mut b = RecorderApp::new("b", &log);
    let mut apps = ApplicationManager::new();
    apps.install(&mut a).unwrap();
    apps.install(&mut b).unwrap();
    let mut kernel = boot(&clock, &inbox, apps);

    kernel.display_mut().fail_commits(true);
    tap(&mut kernel, &clock, &inbox, ButtonId::Btn3);
    assert_eq!(kernel.display().wipes(), 1);
    assert!(!kernel.power().transition_pending());
    assert!(kernel.screen_on());

    kernel.display_mut().fail_commits(false);
    let commits = kernel.display().commits();
    run_for(&mut kernel, &clock, 40);
    assert!(kernel.display().commits() > commits);
    assert_eq!(kernel.display().wipes(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Input dispatch
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn presses_and_releases_reach_only_the_foreground() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let log = EventLog::new();
    let mut a = RecorderApp::new("a", &log);
    let mut b = RecorderApp::new("b", &log);
    let mut apps = ApplicationManager::new();
    apps.install(&mut a).unwrap();
    apps.install(&mut b).unwrap();
    let mut kernel = boot(&clock, &inbox, apps);

    tap(&mut kernel, &clock, &inbox, ButtonId::Btn1);
    assert_eq!(
        log.events_for("a").as_slice(),
        [
            AppEvent::ScreenOn,
            AppEvent::ButtonPress(ButtonId::Btn1),
            AppEvent::ButtonRelease(ButtonId::Btn1),
        ]
    );
    assert_eq!(log.events_for("b").as_slice(), [AppEvent::ScreenOn]);
}

#[test]
fn bounces_collapse_into_one_press() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let log = EventLog::new();
    let mut a = RecorderApp::new("a", &log);
    let mut apps = ApplicationManager::new();
    apps.install(&mut a).unwrap();
    let mut kernel = boot(&clock, &inbox, apps);
    run_for(&mut kernel, &clock, 50);

    inbox.notify(&clock, ButtonId::Btn1, true);
    clock.advance_by(2);
    inbox.notify(&clock, ButtonId::Btn1, false);
    clock.advance_by(2);
    inbox.notify(&clock, ButtonId::Btn1, true);
    kernel.run_pass();
    run_for(&mut kernel, &clock, 40);
    edge(&mut kernel, &clock, &inbox, ButtonId::Btn1, false);

    assert_eq!(kernel.debouncer().suppressed(), 2);
    assert_eq!(
        log.events_for("a").as_slice(),
        [
            AppEvent::ScreenOn,
            AppEvent::ButtonPress(ButtonId::Btn1),
            AppEvent::ButtonRelease(ButtonId::Btn1),
        ]
    );
}

#[test]
fn windows_expire_without_a_further_edge() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let mut kernel = boot(&clock, &inbox, ApplicationManager::new());

    edge(&mut kernel, &clock, &inbox, ButtonId::Btn1, true);
    assert!(kernel.debouncer().state(ButtonId::Btn1).debouncing);
    // Housekeeping runs every 20 ticks while on.
    run_for(&mut kernel, &clock, 50);
    assert!(!kernel.debouncer().state(ButtonId::Btn1).debouncing);
    assert!(kernel.debouncer().state(ButtonId::Btn1).pressed);
}

// ═══════════════════════════════════════════════════════════════════════════
// Screen power
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn inactivity_turns_the_screen_off_once() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let log = EventLog::new();
    let mut a = RecorderApp::new("a", &log);
    let mut b = RecorderApp::new("b", &log);
    let mut apps = ApplicationManager::new();
    apps.install(&mut a).unwrap();
    apps.install(&mut b).unwrap();
    let mut kernel = boot(&clock, &inbox, apps);

    run_for(&mut kernel, &clock, 9_990);
    assert!(kernel.screen_on());
    run_for(&mut kernel, &clock, 110);
    assert!(!kernel.screen_on());
    assert_eq!(kernel.draw_state(), Some(RunState::Stopped));
    assert_eq!(log.count(Record::Event("a", AppEvent::ScreenOff)), 1);
    assert_eq!(log.count(Record::Event("b", AppEvent::ScreenOff)), 1);
    assert_eq!(kernel.display().count(DisplayCommand::PowerOff), 1);

    let runs = kernel.draw_runs();
    let draws = log.count(Record::Draw("a"));
    run_for(&mut kernel, &clock, 2_000);
    assert_eq!(kernel.draw_runs(), runs);
    assert_eq!(log.count(Record::Draw("a")), draws);
    assert_eq!(log.count(Record::Event("a", AppEvent::ScreenOff)), 1);
}

#[test]
fn input_postpones_auto_off() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let mut kernel = boot(&clock, &inbox, ApplicationManager::new());

    run_for(&mut kernel, &clock, 9_000);
    tap(&mut kernel, &clock, &inbox, ButtonId::Btn1);
    run_for(&mut kernel, &clock, 9_000);
    assert!(kernel.screen_on());
    run_for(&mut kernel, &clock, 1_100);
    assert!(!kernel.screen_on());
}

#[test]
fn waking_press_is_swallowed() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let log = EventLog::new();
    let mut a = RecorderApp::new("a", &log);
    let mut b = RecorderApp::new("b", &log);
    let mut apps = ApplicationManager::new();
    apps.install(&mut a).unwrap();
    apps.install(&mut b).unwrap();
    let mut kernel = boot(&clock, &inbox, apps);

    tap(&mut kernel, &clock, &inbox, ButtonId::Btn4);
    assert!(!kernel.screen_on());
    assert_eq!(kernel.draw_state(), Some(RunState::Stopped));

    kernel.display_mut().forget();
    log.clear();

    // A Next press while off only wakes.
    edge(&mut kernel, &clock, &inbox, ButtonId::Btn3, true);
    assert!(kernel.screen_on());
    assert_eq!(kernel.draw_state(), Some(RunState::Runnable));
    assert_eq!(kernel.apps().foreground_index(), 0);
    assert!(!kernel.power().transition_pending());

    let display = kernel.display();
    let commit = display.position(DisplayCommand::CommitFrame).unwrap();
    let power_on = display.position(DisplayCommand::PowerOn).unwrap();
    assert!(commit < power_on);
    assert_eq!(log.events_for("a").as_slice(), [AppEvent::ScreenOn]);

    run_for(&mut kernel, &clock, 40);
    edge(&mut kernel, &clock, &inbox, ButtonId::Btn3, false);
    assert_eq!(
        log.events_for("a").as_slice(),
        [AppEvent::ScreenOn, AppEvent::ButtonRelease(ButtonId::Btn3)]
    );
}

#[test]
fn release_after_sleep_reaches_foreground() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let log = EventLog::new();
    let mut a = RecorderApp::new("a", &log);
    let mut apps = ApplicationManager::new();
    apps.install(&mut a).unwrap();
    let mut kernel = boot(&clock, &inbox, apps);
    log.clear();

    edge(&mut kernel, &clock, &inbox, ButtonId::Btn4, true);
    run_for(&mut kernel, &clock, 40);
    assert!(!kernel.screen_on());
    edge(&mut kernel, &clock, &inbox, ButtonId::Btn4, false);

    assert_eq!(
        log.events_for("a").as_slice(),
        [
            AppEvent::ScreenOff,
            AppEvent::ButtonPress(ButtonId::Btn4),
            AppEvent::ButtonRelease(ButtonId::Btn4),
        ]
    );
    // The release neither wakes the screen nor restarts drawing.
    assert!(!kernel.screen_on());
    assert_eq!(kernel.draw_state(), Some(RunState::Stopped));
}

#[test]
fn screen_transitions_are_idempotent() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let log = EventLog::new();
    let mut a = RecorderApp::new("a", &log);
    let mut apps = ApplicationManager::new();
    apps.install(&mut a).unwrap();
    let mut kernel = boot(&clock, &inbox, apps);

    assert!(!kernel.wake_screen());
    assert_eq!(log.count(Record::Event("a", AppEvent::ScreenOn)), 1);
    assert_eq!(kernel.display().count(DisplayCommand::PowerOn), 1);

    assert!(kernel.sleep_screen());
    assert!(!kernel.sleep_screen());
    assert!(!kernel.set_screen_power(false));
    assert_eq!(log.count(Record::Event("a", AppEvent::ScreenOff)), 1);
    assert_eq!(kernel.display().count(DisplayCommand::PowerOff), 1);

    assert!(kernel.set_screen_power(true));
    assert_eq!(log.count(Record::Event("a", AppEvent::ScreenOn)), 2);
}

#[test]
fn wake_discards_a_pending_transition() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let log = EventLog::new();
    let mut a = RecorderApp::new("a", &log);
    let mut b = RecorderApp::new("b", &log);
    let mut apps = ApplicationManager::new();
    apps.install(&mut a).unwrap();
    apps.install(&mut b).unwrap();
    let mut kernel = boot(&clock, &inbox, apps);

    let now = kernel.now();
    kernel.handle_event(ButtonEvent::Pressed(ButtonId::Btn3), now);
    kernel.sleep_screen();
    assert!(kernel.power().transition_pending());

    kernel.wake_screen();
    assert!(!kernel.power().transition_pending());
    run_for(&mut kernel, &clock, 40);
    assert_eq!(kernel.display().wipes(), 0);
}

#[test]
fn standby_survives_tick_wrap() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let log = EventLog::new();
    let mut a = RecorderApp::new("a", &log);
    let mut apps = ApplicationManager::new();
    apps.install(&mut a).unwrap();
    let mut kernel = boot(&clock, &inbox, apps);

    tap(&mut kernel, &clock, &inbox, ButtonId::Btn4);
    run_for(&mut kernel, &clock, 70_000);
    assert!(!kernel.screen_on());
    assert_eq!(kernel.draw_state(), Some(RunState::Stopped));
    assert!(kernel.uptime_ticks() >= 69_500);
    assert_eq!(log.count(Record::Event("a", AppEvent::ScreenOff)), 1);

    // The stale Btn4 window from before the wrap must not swallow this.
    edge(&mut kernel, &clock, &inbox, ButtonId::Btn4, true);
    assert!(kernel.screen_on());
}

// ═══════════════════════════════════════════════════════════════════════════
// Frame pipeline and diagnostics hooks
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn status_bar_reflects_battery_level() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let mut kernel = boot(&clock, &inbox, ApplicationManager::new());
    run_for(&mut kernel, &clock, 40);

    let frame = kernel.display().last_frame();
    assert_eq!(frame[57], Rgb565::CSS_SKY_BLUE);
    assert_eq!(frame[58], Rgb565::BLACK);
    assert_ne!(frame[57], Rgb565::CSS_ORANGE);
}

#[test]
fn locked_display_takes_external_frames() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let mut kernel = boot(&clock, &inbox, ApplicationManager::new());
    run_for(&mut kernel, &clock, 40);

    kernel.lock_display();
    assert!(kernel.display_locked());
    let commits = kernel.display().commits();
    kernel.write_display(0, &[0xF8, 0x00]).unwrap();
    run_for(&mut kernel, &clock, 100);
    assert_eq!(kernel.display().commits(), commits);

    kernel.commit_external().unwrap();
    assert_eq!(kernel.display().commits(), commits + 1);
    assert_eq!(kernel.display().last_frame()[0], Rgb565::RED);

    let mut out = [0u8; 2];
    kernel.read_display(0, &mut out).unwrap();
    assert_eq!(out, [0xF8, 0x00]);
    assert_eq!(
        kernel.write_display(FRAME_BYTES - 1, &[0, 0]),
        Err(Error::OutOfRange)
    );

    kernel.unlock_display();
    run_for(&mut kernel, &clock, 40);
    assert_eq!(kernel.display().last_frame()[0], Rgb565::CSS_SKY_BLUE);
}

#[test]
fn external_commit_is_ignored_while_off() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let mut kernel = boot(&clock, &inbox, ApplicationManager::new());
    kernel.sleep_screen();
    let commits = kernel.display().commits();
    assert_eq!(kernel.commit_external(), Ok(()));
    assert_eq!(kernel.display().commits(), commits);
}

#[test]
fn running_applications_are_processed_every_frame() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let log = EventLog::new();
    let mut a = RecorderApp::new("a", &log);
    let mut b = RecorderApp::new("b", &log).running();
    let mut apps = ApplicationManager::new();
    apps.install(&mut a).unwrap();
    apps.install(&mut b).unwrap();
    let mut kernel = boot(&clock, &inbox, apps);

    run_for(&mut kernel, &clock, 100);
    assert_eq!(log.count(Record::Process("a")), 0);
    assert_eq!(log.count(Record::Process("b")), kernel.draw_runs() as usize);
    assert_eq!(log.count(Record::Draw("b")), 0);
}

#[test]
fn idle_hint_tracks_earliest_task() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let mut kernel = boot(&clock, &inbox, ApplicationManager::new());

    kernel.run_pass();
    // core due in 20, draw in 33
    assert_eq!(kernel.next_wake(), Some(20));
    inbox.notify(&clock, ButtonId::Btn1, true);
    assert_eq!(kernel.next_wake(), Some(0));
    kernel.run_pass();

    kernel.sleep_screen();
    run_for(&mut kernel, &clock, 20);
    assert!(kernel.next_wake().unwrap() <= 250);
}

struct CountingDog(u32);

impl Watchdog for CountingDog {
    fn feed(&mut self) {
        self.0 += 1;
    }
}

#[test]
fn housekeeping_feeds_the_watchdog() {
    let clock = TickClock::new();
    let inbox = EdgeInbox::new();
    let mut kernel = Kernel::with_watchdog(
        &clock,
        &inbox,
        BootConfig::default(),
        ApplicationManager::new(),
        RecordingDisplay::new(),
        battery(),
        CountingDog(0),
    )
    .unwrap();
    kernel.boot();

    kernel.run_pass();
    run_for(&mut kernel, &clock, 100);
    // ticks 1, 21, 41, 61, 81, 101
    assert_eq!(kernel.watchdog().0, 6);
}
