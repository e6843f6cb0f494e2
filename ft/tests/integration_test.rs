//! Integration tests for frametimer
//!
//! These tests drive the public API end to end: scheduler, frame loop and
//! scenario replay.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use frametimer::frame::{FrameConfig, FrameLoop, UpdatePhase};
use frametimer::scenario::{Scenario, ScenarioError};
use frametimer::timer::{Scheduler, TimerClock, TimerHandle, TimerOptions, TimerStatus};
use tempfile::TempDir;

fn counter() -> (Rc<Cell<u32>>, impl FnMut(&mut Scheduler) + 'static) {
    let count = Rc::new(Cell::new(0));
    let c = count.clone();
    (count, move |_: &mut Scheduler| c.set(c.get() + 1))
}

// =============================================================================
// Scheduler Tests
// =============================================================================

#[test]
fn test_looping_timer_staged_before_first_tick() {
    let mut scheduler = Scheduler::new();
    let (count, cb) = counter();
    let mut handle = TimerHandle::INVALID;
    scheduler.set_timer(&mut handle, cb, 1.0, TimerOptions::looping());
    assert_eq!(scheduler.status(handle), Some(TimerStatus::Pending));

    assert!(scheduler.tick(2.5, 2.5, 1));

    // First expiry 1.0, catch-up covers 1.0 and 2.0, next expiry 3.0
    assert_eq!(count.get(), 2);
    assert_eq!(scheduler.status(handle), Some(TimerStatus::Active));
    assert_eq!(scheduler.time_remaining(handle), Some(0.5));
}

#[test]
fn test_zero_rate_leaves_no_record() {
    let mut scheduler = Scheduler::new();
    let (_count, cb) = counter();
    let mut handle = TimerHandle::INVALID;
    scheduler.set_timer(&mut handle, cb, 0.0, TimerOptions::default());

    assert!(!handle.is_valid());
    assert_eq!(scheduler.timer_count(), 0);
    assert!(!scheduler.clear(handle));
}

#[test]
fn test_handles_are_never_reused() {
    let mut scheduler = Scheduler::new();
    let mut seen = Vec::new();
    for _ in 0..50 {
        let mut handle = TimerHandle::INVALID;
        scheduler.set_timer(&mut handle, |_| {}, 1.0, TimerOptions::default());
        scheduler.clear(handle);
        seen.push(handle);
    }
    let mut sorted = seen.clone();
    sorted.dedup();
    assert_eq!(sorted.len(), seen.len());
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_stale_handle_does_not_touch_new_timer() {
    let mut scheduler = Scheduler::new();
    scheduler.tick(0.0, 0.0, 0);
    let (count, cb) = counter();

    let mut old = TimerHandle::INVALID;
    scheduler.set_timer(&mut old, |_| {}, 1.0, TimerOptions::default());
    scheduler.clear(old);

    let mut new = TimerHandle::INVALID;
    scheduler.set_timer(&mut new, cb, 1.0, TimerOptions::default());

    assert!(!scheduler.clear(old));
    assert!(!scheduler.pause(old));
    scheduler.tick(1.5, 1.5, 1);
    assert_eq!(count.get(), 1);
}

#[test]
fn test_self_pause_excludes_from_firing_until_resumed() {
    let mut scheduler = Scheduler::new();
    scheduler.tick(0.0, 0.0, 0);
    let count = Rc::new(Cell::new(0));
    let me = Rc::new(Cell::new(TimerHandle::INVALID));
    let (c, m) = (count.clone(), me.clone());
    let mut handle = TimerHandle::INVALID;
    scheduler.set_timer(
        &mut handle,
        move |s: &mut Scheduler| {
            c.set(c.get() + 1);
            s.pause(m.get());
        },
        0.5,
        TimerOptions::looping(),
    );
    me.set(handle);

    scheduler.tick(1.0, 1.0, 1);
    assert_eq!(count.get(), 1);
    assert!(scheduler.is_paused(handle));

    for step in 2..10 {
        scheduler.tick(1.0, 1.0, step);
    }
    assert_eq!(count.get(), 1);

    // Resumed at 9.0 with one period left
    assert!(scheduler.resume(handle));
    assert_eq!(scheduler.time_remaining(handle), Some(0.5));
    scheduler.tick(0.75, 0.75, 10);
    assert_eq!(count.get(), 2);
}

#[test]
fn test_callback_reschedules_itself_with_new_rate() {
    let mut scheduler = Scheduler::new();
    scheduler.tick(0.0, 0.0, 0);
    let fired_at = Rc::new(RefCell::new(Vec::new()));
    let handle = Rc::new(Cell::new(TimerHandle::INVALID));

    fn schedule(s: &mut Scheduler, handle: Rc<Cell<TimerHandle>>, fired_at: Rc<RefCell<Vec<f64>>>, rate: f64) {
        let mut h = handle.get();
        let (hh, ff) = (handle.clone(), fired_at.clone());
        s.set_timer(
            &mut h,
            move |s: &mut Scheduler| {
                ff.borrow_mut().push(s.current_time(TimerClock::Unscaled));
                if ff.borrow().len() < 3 {
                    schedule(s, hh.clone(), ff.clone(), rate * 2.0);
                }
            },
            rate,
            TimerOptions::default(),
        );
        handle.set(h);
    }

    schedule(&mut scheduler, handle.clone(), fired_at.clone(), 1.0);
    for step in 1..=20 {
        scheduler.tick(0.5, 0.5, step);
    }

    // 1.0, then +2.0 from 1.5, then +4.0 from 4.0
    assert_eq!(*fired_at.borrow(), vec![1.5, 4.0, 8.5]);
    assert_eq!(scheduler.timer_count(), 0);
}

// =============================================================================
// Frame Loop Tests
// =============================================================================

#[test]
fn test_frame_loop_drives_both_clocks() {
    let config = FrameConfig {
        delta: 0.125,
        time_scale: 0.5,
        ..Default::default()
    };
    let mut frames = FrameLoop::new(config).unwrap();
    let scaled_log = Rc::new(RefCell::new(Vec::new()));
    let unscaled_log = Rc::new(RefCell::new(Vec::new()));

    let (sl, ul) = (scaled_log.clone(), unscaled_log.clone());
    frames
        .register(UpdatePhase::Update, "setup", move |scheduler, frame| {
            if frame.step != 1 {
                return;
            }
            let sl = sl.clone();
            let ul = ul.clone();
            let mut a = TimerHandle::INVALID;
            let mut b = TimerHandle::INVALID;
            scheduler.set_timer(
                &mut a,
                move |_| sl.borrow_mut().push(()),
                0.25,
                TimerOptions::looping().with_clock(TimerClock::Scaled),
            );
            scheduler.set_timer(&mut b, move |_| ul.borrow_mut().push(()), 0.25, TimerOptions::looping());
        })
        .unwrap();

    let last = frames.run(32);
    assert_eq!(last.step, 32);
    assert_eq!(last.unscaled_time, 4.0);
    assert_eq!(last.time, 2.0);

    // Armed at step 1: unscaled expiries 0.375 + 0.25k below 4.0, scaled 0.3125 + 0.25k below 2.0
    assert_eq!(unscaled_log.borrow().len(), 15);
    assert_eq!(scaled_log.borrow().len(), 7);
}

#[test]
fn test_scheduler_outlives_frame_loop() {
    let mut frames = FrameLoop::new(FrameConfig::default()).unwrap();
    let mut handle = TimerHandle::INVALID;
    frames
        .scheduler_mut()
        .set_timer(&mut handle, |_| {}, 10.0, TimerOptions::default());
    frames.run(3);

    let scheduler = frames.into_scheduler();
    assert_eq!(scheduler.last_processed_step(), Some(3));
    assert_eq!(scheduler.status(handle), Some(TimerStatus::Active));
}

// =============================================================================
// Scenario Tests
// =============================================================================

const DEMO: &str = r#"
frames: 10
delta: 0.25
timers:
  - name: blink
    rate: 0.5
    loop: true
  - name: bomb
    rate: 1.0
    clock: scaled
  - name: now
    next-tick: true
actions:
  - { step: 2, op: time-scale, value: 0.0 }
  - { step: 6, op: time-scale, value: 1.0 }
  - { step: 8, op: clear, timer: blink }
"#;

#[test]
fn test_scenario_from_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("demo.yml");
    fs::write(&path, DEMO).unwrap();

    let scenario = Scenario::load(&path).unwrap();
    let report = scenario.run(&FrameConfig::default()).unwrap();

    assert_eq!(report.fire_steps("now"), vec![1]);
    // Unscaled 0.25 per step: due after 0.5, 1.0, 1.5, 2.0 -> steps 3, 5, 7; cleared at 8
    assert_eq!(report.fire_steps("blink"), vec![3, 5, 7]);
    // Scaled clock: 0.25, 0.5, frozen for steps 3..=6, then 0.75, 1.0, 1.25
    assert_eq!(report.fire_steps("bomb"), vec![9]);

    assert_eq!(report.final_status["blink"], None);
    assert_eq!(report.final_status["bomb"], None);
    assert_eq!(report.stats.total_fired, 5);
    assert_eq!(report.stats.total_cleared, 1);
}

#[test]
fn test_scenario_events_carry_clock_readings() {
    let report = Scenario::from_yaml(DEMO).unwrap().run(&FrameConfig::default()).unwrap();
    let bomb = report.events.iter().find(|e| e.timer == "bomb").unwrap();
    assert_eq!(bomb.step, 9);
    assert_eq!(bomb.scaled_time, 1.25);
    assert_eq!(bomb.unscaled_time, 2.25);
}

#[test]
fn test_scenario_missing_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let err = Scenario::load(temp_dir.path().join("missing.yml")).unwrap_err();
    assert!(matches!(err, ScenarioError::Read { .. }));
    assert!(err.to_string().contains("missing.yml"));
}

#[test]
fn test_scenario_bad_yaml() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("bad.yml");
    fs::write(&path, "frames: [1, 2\n").unwrap();
    assert!(matches!(Scenario::load(&path).unwrap_err(), ScenarioError::Parse { .. }));
}

#[test]
fn test_scenario_run_frames_override() {
    let report = Scenario::from_yaml(DEMO)
        .unwrap()
        .run_frames(&FrameConfig::default(), 4)
        .unwrap();
    assert_eq!(report.frames, 4);
    assert_eq!(report.fire_steps("blink"), vec![3]);
    assert_eq!(report.final_status["blink"], Some(TimerStatus::Active));
}

#[test]
fn test_bundled_demo_scenario_runs() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios").join("demo.yml");
    let scenario = Scenario::load(&path).unwrap();
    let report = scenario.run(&FrameConfig::default()).unwrap();

    assert_eq!(report.fire_steps("boot"), vec![1]);
    assert_eq!(report.fire_count("retry"), 1);
    assert!(report.fire_count("heartbeat") > 0);
    assert_eq!(report.final_status["spawn-wave"], None);
    assert_eq!(report.stats.total_fired as usize, report.events.len());
}
