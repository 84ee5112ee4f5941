//! Contains the [`Scheduler`] type
//!
//! A strict priority scheduler for a single CPU. The highest priority Ready
//! task always runs; tasks of equal priority take turns, one time slice
//! each. When nothing is Ready the idle task runs.
//!
//! All scheduler state is protected by masking interrupts. Interrupt handlers
//! never switch tasks directly: they ask for a yield, and
//! [`Scheduler::interrupt`] performs it as the handler finishes.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    ptr::NonNull,
    sync::atomic::{AtomicPtr, Ordering},
};

use crate::{
    Error,
    arch::{Context, Cpu, IntrLevel, Launch, Port},
    block::{BlockAllocator, TaskBlock},
    sync::Semaphore,
    task::{Priority, Status, Task, TaskEntryFn, TaskId, TaskInfo, TaskName, TaskRef},
    wait_list::{Link, Links, Membership, WaitList},
};

/// How many tasks can exist at once, including the boot and idle tasks
pub const MAX_TASKS: usize = 32;

/// The location of the [`Scheduler`] that was most recently initialised
///
/// Interrupt handlers and the free functions in this crate find the
/// scheduler through this.
pub(crate) static SCHEDULER_PTR: AtomicPtr<Scheduler> = AtomicPtr::new(core::ptr::null_mut());

/// Tunable scheduler parameters
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct Config {
    /// How many timer ticks a task may run before it has to let a task of
    /// equal priority have a go
    pub time_slice: u32,
    /// How many timer ticks there are per second
    pub tick_hz: u32,
}

impl Config {
    /// Four tick time slices, with a 100 Hz tick
    pub const DEFAULT: Config = Config {
        time_slice: 4,
        tick_hz: 100,
    };
}

impl Default for Config {
    fn default() -> Self {
        Config::DEFAULT
    }
}

/// Where the timer ticks went
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct Stats {
    /// Ticks that arrived while the idle task was running
    pub idle_ticks: u64,
    /// Ticks that arrived while any other task was running
    pub kernel_ticks: u64,
    /// Ticks spent in user programs. There are none, so this stays at zero.
    pub user_ticks: u64,
    /// How many times we switched from one task to another
    pub context_switches: u64,
}

/// An occupied slot in the task table
#[derive(Copy, Clone)]
struct Entry {
    task: NonNull<Task>,
    /// The block `task` lives in, unless it is the boot task
    block: Option<NonNull<TaskBlock>>,
}

/// Every task that exists, indexed by slot
pub(crate) struct TaskTable {
    entries: [Option<Entry>; MAX_TASKS],
}

impl TaskTable {
    const fn new() -> TaskTable {
        TaskTable {
            entries: [None; MAX_TASKS],
        }
    }

    /// Find a free slot
    fn vacant(&self) -> Option<usize> {
        self.entries.iter().position(Option::is_none)
    }

    fn insert(&mut self, slot: usize, entry: Entry) {
        assert!(self.entries[slot].is_none(), "task slot {} in use", slot);
        self.entries[slot] = Some(entry);
    }

    fn remove(&mut self, slot: usize) -> Entry {
        match self.entries[slot].take() {
            Some(entry) => entry,
            None => panic!("no task in slot {}", slot),
        }
    }

    /// Look up a slot that might be empty
    fn try_get(&self, slot: usize) -> Option<&Task> {
        let entry = self.entries.get(slot)?.as_ref()?;
        // SAFETY: an entry's task stays valid until the entry is removed, and
        // we only hand out references while the caller holds the table
        Some(unsafe { entry.task.as_ref() })
    }

    /// Look up a slot that must be occupied
    pub(crate) fn get(&self, slot: usize) -> &Task {
        match self.try_get(slot) {
            Some(task) => task,
            None => panic!("no task in slot {}", slot),
        }
    }

    /// Look up a slot that must be occupied, mutably
    pub(crate) fn get_mut(&mut self, slot: usize) -> &mut Task {
        match self.entries[slot].as_mut() {
            // SAFETY: as for `try_get`, and we hold the table mutably
            Some(entry) => unsafe { entry.task.as_mut() },
            None => panic!("no task in slot {}", slot),
        }
    }

    /// Build a table over some free-standing tasks, in slot order
    #[cfg(test)]
    pub(crate) fn from_tasks(tasks: &mut [Task]) -> TaskTable {
        let mut table = TaskTable::new();
        for (slot, task) in tasks.iter_mut().enumerate() {
            table.insert(
                slot,
                Entry {
                    task: NonNull::from(task),
                    block: None,
                },
            );
        }
        table
    }

    /// Every occupied slot, lowest first
    fn occupied(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| entry.is_some().then_some(slot))
    }
}

impl Links for TaskTable {
    fn link(&self, slot: usize) -> &Link {
        &self.get(slot).link
    }

    fn link_mut(&mut self, slot: usize) -> &mut Link {
        &mut self.get_mut(slot).link
    }
}

/// Ready queue order: higher priority first
pub(crate) fn by_priority(tasks: &TaskTable, a: usize, b: usize) -> bool {
    tasks.get(a).priority > tasks.get(b).priority
}

/// Everything protected by the interrupt mask
pub(crate) struct State {
    pub(crate) tasks: TaskTable,
    /// Tasks waiting for the CPU
    ready: WaitList,
    /// Tasks waiting for a timer tick, earliest first
    pub(crate) sleeping: WaitList,
    /// The slot of the Running task
    pub(crate) current: usize,
    /// The slot of the idle task, once it has started
    pub(crate) idle: Option<usize>,
    /// The slot of the task we booted on
    boot: Option<usize>,
    /// Tasks that have died, whose blocks we can release at the next
    /// scheduling decision
    graveyard: heapless::Vec<usize, MAX_TASKS>,
    next_id: u32,
    /// Ticks since the running task was switched in
    slice_ticks: u32,
    /// Set inside an interrupt handler to yield when it returns
    yield_on_return: bool,
    pub(crate) ticks: u64,
    stats: Stats,
}

impl State {
    const fn new() -> State {
        State {
            tasks: TaskTable::new(),
            ready: WaitList::new(Membership::Ready),
            sleeping: WaitList::new(Membership::Sleeping),
            current: 0,
            idle: None,
            boot: None,
            graveyard: heapless::Vec::new(),
            next_id: 1,
            slice_ticks: 0,
            yield_on_return: false,
            ticks: 0,
            stats: Stats {
                idle_ticks: 0,
                kernel_ticks: 0,
                user_ticks: 0,
                context_switches: 0,
            },
        }
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = TaskId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// The Running task, checked for sanity
    pub(crate) fn current_task(&self) -> &Task {
        let task = self.tasks.get(self.current);
        check_running(task);
        task
    }

    /// The Running task, checked for sanity, mutably
    pub(crate) fn current_task_mut(&mut self) -> &mut Task {
        let task = self.tasks.get_mut(self.current);
        check_running(task);
        task
    }

    pub(crate) fn current_is_idle(&self) -> bool {
        self.idle == Some(self.current)
    }

    /// Turn a handle into a slot, insisting the task still exists
    fn resolve(&self, task: TaskRef) -> usize {
        match self.tasks.try_get(task.slot) {
            Some(t) if t.id() == task.id => task.slot,
            _ => panic!("stale handle for task {}", task.id),
        }
    }

    /// Move a Blocked task onto the ready queue
    pub(crate) fn make_ready(&mut self, slot: usize) {
        let task = self.tasks.get_mut(slot);
        assert!(
            task.status == Status::Blocked,
            "unblocked task {} which is {}",
            task.id(),
            task.status
        );
        task.status = Status::Ready;
        self.ready.insert_ordered(&mut self.tasks, slot, by_priority);
    }

    /// Pick who runs next, taking them off the ready queue
    fn next_to_run(&mut self) -> usize {
        match self.ready.pop_front(&mut self.tasks) {
            Some(slot) => slot,
            None => match self.idle {
                Some(slot) => slot,
                None => panic!("nothing to run, and no idle task"),
            },
        }
    }

    fn snapshot(&self, slots: impl Iterator<Item = usize>) -> heapless::Vec<TaskInfo, MAX_TASKS> {
        slots.map(|slot| self.tasks.get(slot).info()).collect()
    }
}

fn check_running(task: &Task) {
    assert!(
        task.is_intact(),
        "task {} has a corrupted canary (stack overflow?)",
        task.id()
    );
    assert!(
        task.status == Status::Running,
        "current task {} is {}",
        task.id(),
        task.status
    );
}

/// A priority task scheduler for one CPU
///
/// ```rust,ignore
/// static POOL: BlockPool<8> = BlockPool::new();
/// static SCHEDULER: Scheduler = Scheduler::new(&POOL);
///
/// SCHEDULER.init();
/// SCHEDULER.start()?;
/// SCHEDULER.create("blinky", Priority::DEFAULT, blinky, 0)?;
/// ```
pub struct Scheduler {
    cpu: Cpu,
    blocks: &'static dyn BlockAllocator,
    config: Config,
    /// The boot task has no block, so its metadata lives here
    boot_task: UnsafeCell<MaybeUninit<Task>>,
    state: UnsafeCell<State>,
}

/// SAFETY: the state is only touched with interrupts masked, on one CPU.
unsafe impl Sync for Scheduler {}

impl Scheduler {
    /// Build a scheduler that takes task blocks from `blocks`
    pub const fn new(blocks: &'static dyn BlockAllocator) -> Scheduler {
        Scheduler::with_config(blocks, Config::DEFAULT)
    }

    /// Build a scheduler with non-default parameters
    pub const fn with_config(blocks: &'static dyn BlockAllocator, config: Config) -> Scheduler {
        assert!(config.time_slice > 0, "the time slice must be at least one tick");
        assert!(config.tick_hz > 0, "the tick rate must be at least 1 Hz");
        Scheduler {
            cpu: Cpu::new(),
            blocks,
            config,
            boot_task: UnsafeCell::new(MaybeUninit::uninit()),
            state: UnsafeCell::new(State::new()),
        }
    }

    /// Get our parameters
    pub fn config(&self) -> Config {
        self.config
    }

    pub(crate) fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Get at the scheduler state
    ///
    /// # Safety
    ///
    /// Interrupts must be masked, and the reference must be dropped before
    /// anything that might switch tasks.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn state(&self) -> &mut State {
        assert!(
            !self.cpu.interrupts_enabled(),
            "scheduler state touched with interrupts enabled"
        );
        // SAFETY: interrupts are masked, so nothing else is looking
        unsafe { &mut *self.state.get() }
    }

    /// Run `f` on the state with interrupts masked
    ///
    /// `f` must not switch tasks.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let old = self.cpu.disable_interrupts();
        // SAFETY: masked, and `f` gets the only reference
        let result = f(unsafe { self.state() });
        self.cpu.set_interrupt_level(old);
        result
    }

    /// Get the handle to the global scheduler
    pub(crate) fn get_scheduler() -> Option<&'static Scheduler> {
        // Get our stashed pointer
        let scheduler_ptr = SCHEDULER_PTR.load(Ordering::Acquire);
        // Are we initialised?
        if scheduler_ptr.is_null() {
            None
        } else {
            // SAFETY: Only [`Scheduler::init`] writes to [`SCHEDULER_PTR`] and
            // it always sets it to a valid `&'static Scheduler`.
            Some(unsafe { &*scheduler_ptr })
        }
    }

    /// Turn the code that is running right now into the first task
    ///
    /// Masks interrupts. The boot task is called "main", has ID 1 and
    /// runs at [`Priority::DEFAULT`]. Call this once, before anything else.
    pub fn init(&'static self) {
        let _ = self.cpu.disable_interrupts();
        // SAFETY: just masked
        let state = unsafe { self.state() };
        assert!(state.boot.is_none(), "Tried to initialise the scheduler twice!");

        let Some(slot) = state.tasks.vacant() else {
            panic!("no room in the task table");
        };
        let id = state.allocate_id();
        // SAFETY: nothing else can see the boot task yet, and init only runs once
        let task = unsafe {
            (*self.boot_task.get()).write(Task::new(id, "main", Priority::DEFAULT, None, 0))
        };
        task.status = Status::Running;
        // SAFETY: we are the boot context and interrupts are masked
        unsafe { self.cpu.adopt_boot_context(&mut task.context) };
        state.tasks.insert(
            slot,
            Entry {
                task: NonNull::from(task),
                block: None,
            },
        );
        state.current = slot;
        state.boot = Some(slot);

        SCHEDULER_PTR.store(self as *const Scheduler as *mut Scheduler, Ordering::Release);
        info!("Scheduler running as {}", id);
    }

    /// Start the idle task and enable interrupts
    ///
    /// Returns once the idle task is up, which requires one task block.
    pub fn start(&'static self) -> Result<(), Error> {
        let started = Semaphore::new(0);
        self.create(
            "idle",
            Priority::MIN,
            idle_task,
            &started as *const Semaphore as usize,
        )?;
        self.cpu.enable_interrupts();
        started.down(self);
        info!("Scheduler started");
        Ok(())
    }

    /// Create a new task which calls `entry(scheduler, arg)`
    ///
    /// The task starts Ready. If it outranks the caller, it runs before this
    /// function returns.
    pub fn create(
        &'static self,
        name: &str,
        priority: Priority,
        entry: TaskEntryFn,
        arg: usize,
    ) -> Result<TaskId, Error> {
        let old = self.cpu.disable_interrupts();
        // SAFETY: just masked
        let result = unsafe { self.spawn(name, priority, entry, arg) };
        self.cpu.set_interrupt_level(old);
        let id = result?;
        self.preempt_for(priority);
        Ok(id)
    }

    /// Allocate, build and ready a task
    ///
    /// # Safety
    ///
    /// Interrupts must be masked.
    unsafe fn spawn(
        &'static self,
        name: &str,
        priority: Priority,
        entry: TaskEntryFn,
        arg: usize,
    ) -> Result<TaskId, Error> {
        // SAFETY: our caller masked interrupts
        let state = unsafe { self.state() };
        let Some(slot) = state.tasks.vacant() else {
            warn!("Task table full, cannot create {}", name);
            return Err(Error::OutOfMemory);
        };
        let Some(block) = self.blocks.allocate() else {
            warn!("No task block for {}", name);
            return Err(Error::OutOfMemory);
        };
        let id = state.allocate_id();

        // SAFETY: the allocator gave us this block, so nothing else uses it,
        // and it is big enough and aligned for a Task
        let (task, stack_top) = unsafe {
            let block = block.as_ref();
            let task = block.metadata();
            task.write(Task::new(id, name, priority, Some(entry), arg));
            (&mut *task, block.top())
        };
        let launch = Launch {
            entry: task_entry,
            args: [self as *const Scheduler as usize, slot],
        };
        // SAFETY: the stack above the metadata is ours, and big enough
        unsafe { self.cpu.init_context(&mut task.context, stack_top, launch) };

        state.tasks.insert(
            slot,
            Entry {
                task: NonNull::from(task),
                block: Some(block),
            },
        );
        state.make_ready(slot);
        info!(
            "Created {} '{}' at {}",
            id,
            state.tasks.get(slot).name().as_str(),
            priority
        );
        Ok(id)
    }

    /// Put the running task to sleep until someone calls [`unblock`](Self::unblock)
    ///
    /// Interrupts must be masked, and this must not be called from an
    /// interrupt handler. The caller is not put on any list; keeping track
    /// of it is the caller's job.
    pub fn block(&self) {
        assert!(
            !self.cpu.in_interrupt(),
            "block() called from an interrupt handler"
        );
        assert!(
            !self.cpu.interrupts_enabled(),
            "block() called with interrupts enabled"
        );
        // SAFETY: checked above
        unsafe { self.schedule(Status::Blocked) };
    }

    /// Make a Blocked task Ready
    ///
    /// This never preempts the caller, even if `task` outranks it. Callers
    /// that want that follow up with their own yield.
    pub fn unblock(&self, task: TaskRef) {
        self.with_state(|state| {
            let slot = state.resolve(task);
            state.make_ready(slot);
            trace!("Unblocked {}", task.id);
        });
    }

    /// Let the CPU go to the most deserving Ready task, which might be us
    pub fn yield_now(&self) {
        assert!(
            !self.cpu.in_interrupt(),
            "yield_now() called from an interrupt handler"
        );
        self.yield_current();
    }

    /// Requeue the running task and pick again
    ///
    /// Also used on the way out of an interrupt handler.
    fn yield_current(&self) {
        let old = self.cpu.disable_interrupts();
        {
            // SAFETY: masked, and the borrow ends before we switch
            let state = unsafe { self.state() };
            if !state.current_is_idle() {
                let slot = state.current;
                state.ready.insert_ordered(&mut state.tasks, slot, by_priority);
            }
        }
        // SAFETY: masked
        unsafe { self.schedule(Status::Ready) };
        self.cpu.set_interrupt_level(old);
    }

    /// End the running task
    ///
    /// Its block is given back at the next scheduling decision. Returning
    /// from a task's entry function does the same thing.
    pub fn exit(&self) -> ! {
        assert!(
            !self.cpu.in_interrupt(),
            "exit() called from an interrupt handler"
        );
        let _ = self.cpu.disable_interrupts();
        info!("{} exiting", self.with_state(|state| state.current_task().id()));
        // SAFETY: masked
        unsafe { self.schedule(Status::Dying) };
        unreachable!("a dying task was resumed");
    }

    /// Set the running task's status and switch to whoever should run next
    ///
    /// # Safety
    ///
    /// Interrupts must be masked. If `status` is `Ready`, the running task
    /// must already be back on the ready queue (or be the idle task).
    unsafe fn schedule(&self, status: Status) {
        assert!(
            !self.cpu.interrupts_enabled(),
            "scheduling with interrupts enabled"
        );

        let (from, to) = {
            // SAFETY: masked, and the borrow ends before we switch
            let state = unsafe { self.state() };
            self.reap(state);

            let prev = state.current;
            let prev_id = {
                let task = state.current_task_mut();
                task.status = status;
                task.id()
            };

            let next = state.next_to_run();
            let next_task = state.tasks.get_mut(next);
            assert!(
                next_task.is_intact(),
                "task {} has a corrupted canary (stack overflow?)",
                next_task.id()
            );
            next_task.status = Status::Running;
            let next_id = next_task.id();
            state.slice_ticks = 0;

            if next == prev {
                return;
            }

            debug!("Switch {} -> {}", prev_id, next_id);
            state.stats.context_switches += 1;
            state.current = next;

            let from = if status == Status::Dying {
                if state.boot != Some(prev) && state.graveyard.push(prev).is_err() {
                    unreachable!("more dead tasks than slots");
                }
                None
            } else {
                Some(&mut state.tasks.get_mut(prev).context as *mut Context)
            };
            (from, &state.tasks.get(next).context as *const Context)
        };

        // SAFETY: both contexts live in the task table until reaped, and a
        // task is only reaped after we have switched away from it
        unsafe { self.cpu.switch(from, to) };
    }

    /// Give back the blocks of any tasks that have died
    fn reap(&self, state: &mut State) {
        while let Some(slot) = state.graveyard.pop() {
            let mut entry = state.tasks.remove(slot);
            trace!("Reaping slot {}", slot);
            // SAFETY: we switched away from the task when it died, and it
            // left the table just now, so nobody can switch to it again
            unsafe { self.cpu.release_context(&mut entry.task.as_mut().context) };
            if let Some(block) = entry.block {
                // SAFETY: the block came from our allocator, and its task will
                // never run again
                unsafe { self.blocks.release(block) };
            }
        }
    }

    /// Yield to a task of priority `woken` that has just become Ready, if it
    /// outranks the running task
    ///
    /// In an interrupt handler the yield happens when the handler returns.
    pub(crate) fn preempt_for(&self, woken: Priority) {
        let in_interrupt = self.cpu.in_interrupt();
        let outranked = self.with_state(|state| {
            let outranked = woken > state.current_task().priority;
            if outranked && in_interrupt {
                state.yield_on_return = true;
            }
            outranked
        });
        if outranked && !in_interrupt {
            self.yield_now();
        }
    }

    /// Change the running task's priority
    ///
    /// Yields straight away if that leaves a Ready task that outranks us.
    pub fn set_priority(&self, priority: Priority) {
        let outranked = self.with_state(|state| {
            state.current_task_mut().priority = priority;
            state
                .ready
                .front()
                .is_some_and(|front| state.tasks.get(front).priority > priority)
        });
        if outranked {
            self.yield_now();
        }
    }

    /// Get the running task's priority
    pub fn priority(&self) -> Priority {
        self.with_state(|state| state.current_task().priority)
    }

    /// Get a handle to the running task
    pub fn current(&self) -> TaskRef {
        self.with_state(|state| TaskRef {
            slot: state.current,
            id: state.current_task().id(),
        })
    }

    /// Get the running task's ID
    pub fn tid(&self) -> TaskId {
        self.with_state(|state| state.current_task().id())
    }

    /// Get the running task's ID, without checking it is sane
    pub(crate) fn current_id(&self) -> TaskId {
        self.with_state(|state| {
            state
                .tasks
                .try_get(state.current)
                .map_or(TaskId::invalid(), Task::id)
        })
    }

    /// Get the running task's name
    pub fn name(&self) -> TaskName {
        self.with_state(|state| state.current_task().name().clone())
    }

    /// What state is a task in? `None` once it has been reclaimed.
    pub fn status_of(&self, task: TaskRef) -> Option<Status> {
        self.with_state(|state| {
            state
                .tasks
                .try_get(task.slot)
                .filter(|t| t.id() == task.id)
                .map(|t| t.status)
        })
    }

    /// Snapshot every task, in table order
    pub fn tasks(&self) -> heapless::Vec<TaskInfo, MAX_TASKS> {
        self.with_state(|state| state.snapshot(state.tasks.occupied()))
    }

    /// Snapshot the ready queue, front first
    pub fn ready_tasks(&self) -> heapless::Vec<TaskInfo, MAX_TASKS> {
        self.with_state(|state| state.snapshot(state.ready.iter(&state.tasks)))
    }

    /// Snapshot the sleep queue, next to wake first
    pub fn sleeping_tasks(&self) -> heapless::Vec<TaskInfo, MAX_TASKS> {
        self.with_state(|state| state.snapshot(state.sleeping.iter(&state.tasks)))
    }

    /// Get the tick accounting
    pub fn stats(&self) -> Stats {
        self.with_state(|state| state.stats)
    }

    /// Log the tick accounting
    pub fn print_stats(&self) {
        let (stats, ticks, ready, sleeping) = self.with_state(|state| {
            (
                state.stats,
                state.ticks,
                state.ready.len(),
                state.sleeping.len(),
            )
        });
        info!(
            "Timer: {} ticks. Tasks: {} idle ticks, {} kernel ticks, {} user ticks",
            ticks,
            stats.idle_ticks,
            stats.kernel_ticks,
            stats.user_ticks
        );
        info!(
            "Scheduler: {} context switches, {} ready, {} sleeping",
            stats.context_switches,
            ready,
            sleeping
        );
    }

    /// Always 0, until someone writes the MLFQ scheduler
    pub fn nice(&self) -> i32 {
        0
    }

    /// Does nothing, until someone writes the MLFQ scheduler
    pub fn set_nice(&self, _nice: i32) {}

    /// Always 0, until someone writes the MLFQ scheduler
    pub fn load_avg(&self) -> i32 {
        0
    }

    /// Always 0, until someone writes the MLFQ scheduler
    pub fn recent_cpu(&self) -> i32 {
        0
    }

    /// Account for one timer tick, and end the running task's time slice if
    /// it is used up
    ///
    /// Call from an interrupt handler.
    pub fn tick(&self) {
        assert!(self.cpu.in_interrupt(), "tick() called outside an interrupt handler");
        self.with_state(|state| {
            if state.current_is_idle() {
                state.stats.idle_ticks += 1;
            } else {
                state.stats.kernel_ticks += 1;
            }
            state.slice_ticks += 1;
            if state.slice_ticks >= self.config.time_slice {
                state.yield_on_return = true;
            }
        });
    }

    /// Run `handler` as an interrupt handler
    ///
    /// Interrupts are masked while it runs. If it asked for a yield, the
    /// yield happens after it returns.
    pub fn interrupt<F>(&'static self, handler: F)
    where
        F: FnOnce(&'static Scheduler),
    {
        let old = self.cpu.disable_interrupts();
        assert!(
            old == IntrLevel::On,
            "interrupt delivered with interrupts masked"
        );
        self.cpu.begin_interrupt();
        // SAFETY: masked
        unsafe { self.state() }.yield_on_return = false;

        handler(self);

        self.cpu.end_interrupt();
        // SAFETY: masked
        let yield_now = core::mem::take(&mut unsafe { self.state() }.yield_on_return);
        if yield_now {
            trace!("Yield on interrupt return");
            self.yield_current();
        }
        self.cpu.set_interrupt_level(old);
    }

    /// The body of the timer interrupt: count the tick, wake any sleepers
    /// that are due, and do the time slice accounting
    pub fn timer_interrupt(&self) {
        let now = self.with_state(|state| {
            state.ticks += 1;
            state.ticks
        });
        self.wake_due(now);
        self.tick();
    }
}

/// Where every task except the boot task starts
///
/// The port arranges for us to be called with the scheduler's address and
/// our slot in the task table.
extern "C-unwind" fn task_entry(scheduler: usize, slot: usize) -> ! {
    // SAFETY: `spawn` passed us the address of a `&'static Scheduler`
    let scheduler: &'static Scheduler = unsafe { &*(scheduler as *const Scheduler) };
    let Some((entry, arg)) = scheduler.with_state(|state| state.tasks.get(slot).entry()) else {
        panic!("task in slot {} has no entry function", slot);
    };
    scheduler.cpu.enable_interrupts();
    entry(scheduler, arg);
    scheduler.exit();
}

/// Runs when nothing else can
///
/// `arg` is the address of the semaphore [`Scheduler::start`] waits on.
fn idle_task(scheduler: &'static Scheduler, arg: usize) {
    // SAFETY: `start` keeps the semaphore alive until we have raised it, and
    // we never touch it again after that
    let started = unsafe { &*(arg as *const Semaphore) };
    scheduler.with_state(|state| state.idle = Some(state.current));
    started.up(scheduler);

    loop {
        let _ = scheduler.cpu.disable_interrupts();
        scheduler.block();
        scheduler.cpu.wait_for_interrupt();
        // No timer hardware here, so every wake-up is a tick
        #[cfg(not(target_os = "none"))]
        scheduler.interrupt(Scheduler::timer_interrupt);
    }
}


// End of File
