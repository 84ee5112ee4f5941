//! Integration tests for the alarm clock

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

mod common;

use common::{Events, boot, prio, ticks};
use prios::{Priority, Scheduler};

mod ordering {
    use super::*;

    /// (wake tick, tick actually woken at)
    static WOKEN: Events<(u64, u64)> = Events::new();

    fn sleeper(scheduler: &'static Scheduler, wake_tick: usize) {
        scheduler.sleep_until(wake_tick as u64);
        WOKEN.push((wake_tick as u64, scheduler.now()));
    }

    #[test]
    fn sleepers_wake_in_tick_order_at_their_tick() {
        let scheduler = boot::<5>();
        for wake_tick in [50, 10, 30] {
            scheduler
                .create("sleeper", prio(40), sleeper, wake_tick)
                .unwrap();
        }
        let queued: Vec<u64> = scheduler
            .sleeping_tasks()
            .iter()
            .map(|t| t.wake_tick)
            .collect();
        assert_eq!(queued, [10, 30, 50]);

        // the idle task ticks the clock while we sleep
        scheduler.sleep_until(60);
        assert_eq!(WOKEN.get(), [(10, 10), (30, 30), (50, 50)]);
        assert!(scheduler.now() >= 60);
        assert!(scheduler.stats().idle_ticks >= 59);
    }
}

mod tie_break {
    use super::*;

    fn sleeper(scheduler: &'static Scheduler, wake_tick: usize) {
        scheduler.sleep_until(wake_tick as u64);
    }

    #[test]
    fn equal_wake_ticks_queue_by_priority() {
        let scheduler = boot::<5>();
        scheduler.create("late-low", prio(35), sleeper, 20).unwrap();
        scheduler.create("early", prio(33), sleeper, 10).unwrap();
        scheduler.create("late-high", prio(45), sleeper, 20).unwrap();
        let queued: Vec<_> = scheduler
            .sleeping_tasks()
            .iter()
            .map(|t| (t.wake_tick, t.name.to_string()))
            .collect();
        assert_eq!(
            queued,
            [
                (10, "early".to_string()),
                (20, "late-high".to_string()),
                (20, "late-low".to_string()),
            ]
        );
    }
}

mod wake_priority {
    use super::*;

    static EVENTS: Events<String> = Events::new();

    fn sleeper(scheduler: &'static Scheduler, wake_tick: usize) {
        scheduler.sleep_until(wake_tick as u64);
        EVENTS.push_name(scheduler);
    }

    fn worker(scheduler: &'static Scheduler, _arg: usize) {
        EVENTS.push_name(scheduler);
    }

    #[test]
    fn woken_task_queues_ahead_of_lower_priority_work() {
        let scheduler = boot::<4>();
        scheduler.create("high", prio(40), sleeper, 3).unwrap();
        scheduler.create("low", prio(10), worker, 0).unwrap();
        scheduler.set_priority(prio(50));

        ticks(scheduler, 3);
        // woken, but we still outrank it
        assert!(EVENTS.get().is_empty());
        let ready: Vec<_> = scheduler
            .ready_tasks()
            .iter()
            .map(|t| t.name.to_string())
            .collect();
        assert_eq!(ready, ["high", "low"]);

        scheduler.set_priority(Priority::MIN);
        assert_eq!(EVENTS.get(), ["high", "low"]);
    }
}

mod deferred {
    use super::*;

    static EVENTS: Events<String> = Events::new();

    fn sleeper(scheduler: &'static Scheduler, wake_tick: usize) {
        scheduler.sleep_until(wake_tick as u64);
        EVENTS.push_name(scheduler);
    }

    /// A timer interrupt that notes when its handler finishes
    fn tick_and_note(scheduler: &Scheduler) {
        scheduler.timer_interrupt();
        EVENTS.push("handler".to_string());
    }

    #[test]
    fn wake_in_interrupt_switches_once_on_return() {
        let scheduler = boot::<3>();
        scheduler.create("sleeper", prio(40), sleeper, 2).unwrap();

        scheduler.interrupt(tick_and_note);
        let before = scheduler.stats().context_switches;
        scheduler.interrupt(tick_and_note);
        EVENTS.push_name(scheduler);

        assert_eq!(EVENTS.get(), ["handler", "handler", "sleeper", "main"]);
        // into the sleeper, and back out when it exits
        assert_eq!(scheduler.stats().context_switches, before + 2);
    }
}

mod not_deferred {
    use super::*;

    static EVENTS: Events<String> = Events::new();

    fn sleeper(scheduler: &'static Scheduler, wake_tick: usize) {
        scheduler.sleep_until(wake_tick as u64);
        EVENTS.push_name(scheduler);
    }

    #[test]
    fn wake_of_a_lesser_task_does_not_switch() {
        let scheduler = boot::<3>();
        scheduler.create("sleeper", prio(40), sleeper, 1).unwrap();
        scheduler.set_priority(prio(50));

        let before = scheduler.stats().context_switches;
        ticks(scheduler, 1);
        EVENTS.push_name(scheduler);
        assert_eq!(scheduler.stats().context_switches, before);

        scheduler.sleep(1);
        assert_eq!(EVENTS.get(), ["main", "sleeper"]);
    }
}

#[test]
fn short_and_empty_sleeps() {
    let scheduler = boot::<2>();
    let start = scheduler.now();
    scheduler.sleep(0);
    scheduler.sleep(-5);
    // less than one 10 ms tick
    scheduler.sleep_ms(5);
    assert_eq!(scheduler.elapsed(start), 0);

    scheduler.sleep_ms(50);
    assert!(scheduler.elapsed(start) >= 5);
}

#[test]
fn huge_sleeps_saturate() {
    fn sleep_ms_max(scheduler: &'static Scheduler, _arg: usize) {
        scheduler.sleep_ms(u64::MAX);
    }
    fn sleep_max(scheduler: &'static Scheduler, _arg: usize) {
        scheduler.sleep(i64::MAX);
    }
    let scheduler = boot::<4>();
    ticks(scheduler, 3);
    scheduler.create("ms", prio(40), sleep_ms_max, 0).unwrap();
    scheduler.create("ticks", prio(40), sleep_max, 0).unwrap();
    let wakes: Vec<_> = scheduler
        .sleeping_tasks()
        .iter()
        .map(|t| (t.name.to_string(), t.wake_tick))
        .collect();
    assert_eq!(
        wakes,
        [
            ("ms".to_string(), 3 + u64::MAX / 1000),
            ("ticks".to_string(), 3 + i64::MAX as u64),
        ]
    );
}

#[test]
fn sleeping_task_is_blocked_until_due() {
    fn sleepy(scheduler: &'static Scheduler, _arg: usize) {
        scheduler.sleep_until(1_000);
    }
    let scheduler = boot::<3>();
    scheduler.create("sleepy", prio(40), sleepy, 0).unwrap();
    let sleeping = scheduler.sleeping_tasks();
    assert_eq!(sleeping.len(), 1);
    assert_eq!(sleeping[0].status, prios::Status::Blocked);
    assert_eq!(sleeping[0].wake_tick, 1_000);
    assert!(scheduler.ready_tasks().is_empty());
}

// End of File
