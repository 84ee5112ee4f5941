//! Integration tests for the scheduler core

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

mod common;

use common::{Events, boot, prio, ticks};
use prios::{BlockPool, Error, MAX_TASKS, Priority, Scheduler, Status, TaskRef};

mod ready_queue {
    use super::*;

    static EVENTS: Events<String> = Events::new();

    fn record(scheduler: &'static Scheduler, _arg: usize) {
        EVENTS.push_name(scheduler);
    }

    #[test]
    fn equal_priorities_run_in_creation_order() {
        let scheduler = boot::<4>();
        for name in ["first", "second", "third"] {
            scheduler
                .create(name, Priority::DEFAULT, record, 0)
                .unwrap();
        }
        // nobody outranked us, so nobody has run yet
        assert!(EVENTS.get().is_empty());
        let queued: Vec<_> = scheduler
            .ready_tasks()
            .iter()
            .map(|t| t.name.to_string())
            .collect();
        assert_eq!(queued, ["first", "second", "third"]);

        scheduler.yield_now();
        assert_eq!(EVENTS.get(), ["first", "second", "third"]);
        assert!(scheduler.ready_tasks().is_empty());
    }
}

mod create_preempts {
    use super::*;

    static EVENTS: Events<String> = Events::new();

    fn record(scheduler: &'static Scheduler, _arg: usize) {
        EVENTS.push_name(scheduler);
    }

    #[test]
    fn higher_priority_child_runs_before_create_returns() {
        let scheduler = boot::<3>();
        scheduler.create("child", prio(40), record, 0).unwrap();
        EVENTS.push_name(scheduler);
        scheduler.create("sibling", prio(20), record, 0).unwrap();
        EVENTS.push_name(scheduler);
        assert_eq!(EVENTS.get(), ["child", "main", "main"]);
    }
}

#[test]
fn yielding_alone_keeps_the_cpu() {
    let scheduler = boot::<2>();
    let me = scheduler.tid();
    let before = scheduler.stats().context_switches;
    for _ in 0..3 {
        scheduler.yield_now();
        assert_eq!(scheduler.tid(), me);
        assert!(scheduler.ready_tasks().is_empty());
    }
    assert_eq!(scheduler.stats().context_switches, before);
}

#[test]
fn boot_and_idle_identities() {
    let scheduler = boot::<2>();
    assert_eq!(scheduler.tid().get(), 1);
    assert_eq!(scheduler.name().as_str(), "main");
    let tasks = scheduler.tasks();
    let names: Vec<_> = tasks.iter().map(|t| (t.id.get(), t.name.as_str())).collect();
    assert_eq!(names, [(1, "main"), (2, "idle")]);
    assert_eq!(tasks[1].priority, Priority::MIN);
}

mod priorities {
    use super::*;

    static EVENTS: Events<String> = Events::new();

    fn record(scheduler: &'static Scheduler, _arg: usize) {
        EVENTS.push_name(scheduler);
    }

    #[test]
    fn set_priority_round_trips() {
        let scheduler = boot::<2>();
        scheduler.set_priority(prio(10));
        assert_eq!(scheduler.priority(), prio(10));
        scheduler.set_priority(Priority::MAX);
        assert_eq!(scheduler.priority(), Priority::MAX);
    }

    #[test]
    fn lowering_below_a_ready_task_yields() {
        let scheduler = boot::<3>();
        scheduler.create("worker", prio(20), record, 0).unwrap();
        assert!(EVENTS.get().is_empty());
        scheduler.set_priority(prio(10));
        EVENTS.push_name(scheduler);
        assert_eq!(EVENTS.get(), ["worker", "main"]);
    }
}

mod teardown {
    use std::sync::Mutex;

    use super::*;

    static WORKER: Mutex<Option<TaskRef>> = Mutex::new(None);

    fn worker(scheduler: &'static Scheduler, _arg: usize) {
        *WORKER.lock().unwrap() = Some(scheduler.current());
    }

    fn nothing(_scheduler: &'static Scheduler, _arg: usize) {}

    #[test]
    fn block_is_released_at_the_next_decision() {
        // one block for idle, one for workers
        let scheduler = boot::<2>();
        scheduler.create("worker", prio(40), worker, 0).unwrap();
        let handle = WORKER.lock().unwrap().expect("worker never ran");

        // it has exited, but nothing has been scheduled since
        assert_eq!(scheduler.status_of(handle), Some(Status::Dying));
        assert_eq!(
            scheduler.create("second", prio(40), nothing, 0),
            Err(Error::OutOfMemory)
        );

        scheduler.yield_now();
        assert_eq!(scheduler.status_of(handle), None);
        assert!(scheduler.create("second", prio(40), nothing, 0).is_ok());
    }
}

mod stale {
    use std::sync::Mutex;

    use super::*;

    static WORKER: Mutex<Option<TaskRef>> = Mutex::new(None);

    fn worker(scheduler: &'static Scheduler, _arg: usize) {
        *WORKER.lock().unwrap() = Some(scheduler.current());
    }

    #[test]
    #[should_panic(expected = "stale handle")]
    fn unblocking_a_reaped_task_is_fatal() {
        let scheduler = boot::<2>();
        scheduler.create("worker", prio(40), worker, 0).unwrap();
        let handle = WORKER.lock().unwrap().expect("worker never ran");
        scheduler.yield_now();
        assert_eq!(scheduler.status_of(handle), None);
        scheduler.unblock(handle);
    }
}

#[test]
fn full_task_table_is_out_of_memory() {
    fn never_runs(_scheduler: &'static Scheduler, _arg: usize) {}

    let pool: &'static BlockPool<32> = Box::leak(Box::default());
    let scheduler: &'static Scheduler = Box::leak(Box::new(Scheduler::new(pool)));
    scheduler.init();
    scheduler.start().unwrap();
    // main and idle hold the first two slots
    for _ in 2..MAX_TASKS {
        scheduler.create("filler", prio(10), never_runs, 0).unwrap();
    }
    assert_eq!(scheduler.tasks().len(), MAX_TASKS);
    assert_eq!(pool.available(), 1);
    assert_eq!(
        scheduler.create("one-more", prio(10), never_runs, 0),
        Err(Error::OutOfMemory)
    );
    assert_eq!(pool.available(), 1);
}

mod create_in_interrupt {
    use super::*;

    static EVENTS: Events<String> = Events::new();

    fn record(scheduler: &'static Scheduler, _arg: usize) {
        EVENTS.push_name(scheduler);
    }

    #[test]
    fn handler_creates_through_its_argument() {
        let scheduler = boot::<3>();
        scheduler.interrupt(|scheduler| {
            scheduler.create("urgent", prio(40), record, 0).unwrap();
            EVENTS.push("handler".to_string());
        });
        EVENTS.push_name(scheduler);
        assert_eq!(EVENTS.get(), ["handler", "urgent", "main"]);
    }
}

mod slices {
    use super::*;

    static EVENTS: Events<String> = Events::new();

    /// Does eight units of work, with a timer tick after each
    fn busy(scheduler: &'static Scheduler, _arg: usize) {
        for _ in 0..8 {
            EVENTS.push_name(scheduler);
            ticks(scheduler, 1);
        }
    }

    #[test]
    fn equal_priorities_take_turns() {
        let scheduler = boot::<4>();
        scheduler.set_priority(prio(50));
        scheduler.create("a", prio(40), busy, 0).unwrap();
        scheduler.create("b", prio(40), busy, 0).unwrap();
        scheduler.set_priority(Priority::DEFAULT);

        let expected: Vec<&str> = ["a", "b", "a", "b"]
            .iter()
            .flat_map(|name| [*name; 4])
            .collect();
        assert_eq!(EVENTS.get(), expected);
    }
}

mod running {
    use super::*;

    static COUNTS: Events<usize> = Events::new();

    fn count_running(scheduler: &Scheduler) {
        let running = scheduler
            .tasks()
            .iter()
            .filter(|t| t.status == Status::Running)
            .count();
        COUNTS.push(running);
    }

    fn worker(scheduler: &'static Scheduler, _arg: usize) {
        count_running(scheduler);
        scheduler.yield_now();
        count_running(scheduler);
    }

    #[test]
    fn exactly_one_task_is_running() {
        let scheduler = boot::<4>();
        count_running(scheduler);
        scheduler.create("one", prio(40), worker, 0).unwrap();
        count_running(scheduler);
        scheduler.create("two", Priority::DEFAULT, worker, 0).unwrap();
        scheduler.yield_now();
        count_running(scheduler);
        scheduler.yield_now();
        count_running(scheduler);
        assert!(COUNTS.get().iter().all(|n| *n == 1));
        assert_eq!(COUNTS.get().len(), 8);
    }
}

#[test]
fn time_slices_are_accounted() {
    let scheduler = boot::<2>();
    let before = scheduler.stats();
    ticks(scheduler, 3);
    let after = scheduler.stats();
    assert_eq!(after.kernel_ticks, before.kernel_ticks + 3);
    assert_eq!(after.user_ticks, 0);
    assert_eq!(scheduler.now(), 3);
    scheduler.print_stats();
}

#[test]
#[should_panic(expected = "unblocked task")]
fn unblocking_a_running_task_is_fatal() {
    let scheduler = boot::<2>();
    scheduler.unblock(scheduler.current());
}

#[test]
#[should_panic(expected = "from an interrupt handler")]
fn blocking_in_an_interrupt_is_fatal() {
    let scheduler = boot::<2>();
    scheduler.interrupt(|scheduler| scheduler.block());
}

#[test]
#[should_panic(expected = "interrupts enabled")]
fn blocking_with_interrupts_enabled_is_fatal() {
    let scheduler = boot::<2>();
    scheduler.block();
}

#[test]
fn out_of_range_priorities_are_rejected() {
    assert_eq!(Priority::try_from(64), Err(Error::InvalidPriority(64)));
    assert_eq!(Priority::try_from(0), Ok(Priority::MIN));
}

// End of File
