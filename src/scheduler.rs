//! Preemptive round-robin scheduler.
//!
//! Tasks live in a fixed arena (`[Task; MAX_TASKS]`, indexed by `TaskId`)
//! rather than behind individual heap allocations or raw pointers, so the
//! run/wait/sleep "queues" are just small fixed-capacity index rings over
//! that arena. A context switch is nothing more than copying the current
//! [`CpuState`] frame out of the interrupt frame into the outgoing task's
//! saved context and the incoming task's saved context back in -- the same
//! frame shape the interrupt dispatcher already produces.

use crate::config::{MAX_TASKS, SCHEDULER_QUANTUM_TICKS};
use crate::cpu_state::CpuState;
use crate::task::{Priority, Task, TaskId, TaskState};
use spin::Mutex;

/// Fixed-capacity FIFO ring of task ids, used for the ready queues.
struct IndexQueue {
    buf: [TaskId; MAX_TASKS],
    head: usize,
    len: usize,
}

impl IndexQueue {
    const fn new() -> Self {
        IndexQueue {
            buf: [0; MAX_TASKS],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, id: TaskId) {
        debug_assert!(self.len < MAX_TASKS, "ready queue overflow");
        if self.len >= MAX_TASKS {
            return;
        }
        let tail = (self.head + self.len) % MAX_TASKS;
        self.buf[tail] = id;
        self.len += 1;
    }

    fn pop(&mut self) -> Option<TaskId> {
        if self.len == 0 {
            return None;
        }
        let id = self.buf[self.head];
        self.head = (self.head + 1) % MAX_TASKS;
        self.len -= 1;
        Some(id)
    }

    #[allow(dead_code)]
    fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub struct Scheduler {
    tasks: [Task; MAX_TASKS],
    /// One ready ring per priority tier, high tier drained first.
    run_high: IndexQueue,
    run_normal: IndexQueue,
    run_low: IndexQueue,
    /// Tasks parked waiting on an external event, woken explicitly by `wake`.
    wait: IndexQueue,
    current: Option<TaskId>,
    idle: Option<TaskId>,
    quantum_remaining: u32,
    now: u64,
}

impl Scheduler {
    pub const fn new() -> Self {
        const EMPTY: Task = Task::empty(0);
        let mut tasks = [EMPTY; MAX_TASKS];
        let mut i = 0;
        while i < MAX_TASKS {
            tasks[i] = Task::empty(i as TaskId);
            i += 1;
        }
        Scheduler {
            tasks,
            run_high: IndexQueue::new(),
            run_normal: IndexQueue::new(),
            run_low: IndexQueue::new(),
            wait: IndexQueue::new(),
            current: None,
            idle: None,
            quantum_remaining: SCHEDULER_QUANTUM_TICKS,
            now: 0,
        }
    }

    fn run_queue(&mut self, priority: Priority) -> &mut IndexQueue {
        match priority {
            Priority::High => &mut self.run_high,
            Priority::Normal => &mut self.run_normal,
            Priority::Low => &mut self.run_low,
        }
    }

    fn free_slot(&self) -> Option<TaskId> {
        self.tasks.iter().find(|t| t.state == TaskState::Free).map(|t| t.id)
    }

    /// Create a new ready task. Returns `None` if the task table is full.
    pub fn spawn(&mut self, entry: extern "C" fn() -> !, priority: Priority) -> Option<TaskId> {
        let id = self.free_slot()?;
        self.tasks[id as usize].spawn(entry, priority);
        self.run_queue(priority).push(id);
        Some(id)
    }

    /// Register the idle task: run whenever no other task is ready. Unlike
    /// `spawn`, the idle task is never placed on a ready ring -- `pick_next`
    /// falls back to it directly, so a ring entry would just be an extra
    /// (incorrect) turn in the low-priority round robin.
    pub fn set_idle(&mut self, entry: extern "C" fn() -> !) -> TaskId {
        let id = self.free_slot().expect("idle task must fit in task table");
        self.tasks[id as usize].spawn(entry, Priority::Low);
        self.idle = Some(id);
        id
    }

    fn pick_next(&mut self) -> TaskId {
        if let Some(id) = self.run_high.pop() {
            return id;
        }
        if let Some(id) = self.run_normal.pop() {
            return id;
        }
        if let Some(id) = self.run_low.pop() {
            return id;
        }
        self.idle.expect("scheduler has no idle task to fall back on")
    }

    /// Copy the live frame into the current task's saved context, pick the
    /// next ready task, and overwrite the frame with its saved context. The
    /// caller's interrupt return then resumes execution as the new task.
    pub fn reschedule(&mut self, frame: &mut CpuState) {
        if let Some(cur) = self.current {
            self.tasks[cur as usize].context = *frame;
            if self.tasks[cur as usize].state == TaskState::Running {
                self.tasks[cur as usize].state = TaskState::Ready;
                let priority = self.tasks[cur as usize].priority;
                if Some(cur) != self.idle {
                    self.run_queue(priority).push(cur);
                }
            }
        }

        let next = self.pick_next();
        self.tasks[next as usize].state = TaskState::Running;
        *frame = self.tasks[next as usize].context;
        self.current = Some(next);
        self.quantum_remaining = SCHEDULER_QUANTUM_TICKS;
    }

    /// Drive one timer tick: wake due sleepers, and preempt at quantum end.
    pub fn on_tick(&mut self, frame: &mut CpuState) {
        self.now += 1;

        let mut woken: [Option<(TaskId, Priority)>; MAX_TASKS] = [None; MAX_TASKS];
        let mut woken_len = 0;
        for t in self.tasks.iter_mut() {
            // The wait queue also parks tasks in the Sleeping state with
            // wake_at == 0, which never matches `<= self.now` once ticks
            // have advanced past zero; they're excluded from timed wakeup.
            if t.state == TaskState::Sleeping && t.wake_at != 0 && t.wake_at <= self.now {
                t.state = TaskState::Ready;
                woken[woken_len] = Some((t.id, t.priority));
                woken_len += 1;
            }
        }
        for entry in &woken[..woken_len] {
            let (id, priority) = entry.unwrap();
            self.run_queue(priority).push(id);
        }

        if self.quantum_remaining == 0 {
            self.reschedule(frame);
        } else {
            self.quantum_remaining -= 1;
            if self.quantum_remaining == 0 {
                self.reschedule(frame);
            }
        }
    }

    /// Put the current task to sleep for `ticks` timer ticks and force an
    /// immediate reschedule.
    pub fn sleep_current(&mut self, ticks: u64, frame: &mut CpuState) {
        if let Some(cur) = self.current {
            self.tasks[cur as usize].state = TaskState::Sleeping;
            self.tasks[cur as usize].wake_at = self.now + ticks;
        }
        self.reschedule(frame);
    }

    /// Park the current task on the wait queue (blocked on an external
    /// event) and force an immediate reschedule. Distinct from
    /// `sleep_current`'s `Sleeping` state: a `Blocked` task has no wake
    /// deadline and is only woken by an explicit `wake(id)`.
    pub fn block_current(&mut self, frame: &mut CpuState) -> Option<TaskId> {
        let cur = self.current?;
        self.tasks[cur as usize].state = TaskState::Blocked;
        self.wait.push(cur);
        self.reschedule(frame);
        Some(cur)
    }

    /// Wake a specific task off the wait queue back onto its priority's
    /// ready queue. A no-op unless `id` is actually parked `Blocked` on the
    /// wait queue -- in particular this never disturbs a task parked
    /// `Sleeping` via `sleep_current`, even if both share a numeric id
    /// across calls.
    pub fn wake(&mut self, id: TaskId) {
        if self.tasks[id as usize].state != TaskState::Blocked {
            return;
        }
        let mut rest = IndexQueue::new();
        let mut found = false;
        while let Some(w) = self.wait.pop() {
            if w == id {
                found = true;
                continue;
            }
            rest.push(w);
        }
        self.wait = rest;
        if !found {
            return;
        }
        self.tasks[id as usize].state = TaskState::Ready;
        let priority = self.tasks[id as usize].priority;
        self.run_queue(priority).push(id);
    }

    /// Suspend a task without tearing it down; it is not eligible to run
    /// until `resume` moves it back to `Ready`. Callers driving `frame`
    /// must be stopping the current task, since a non-current task has no
    /// frame to reschedule away from.
    pub fn stop_current(&mut self, frame: &mut CpuState) -> Option<TaskId> {
        let cur = self.current?;
        self.tasks[cur as usize].state = TaskState::Stopped;
        self.reschedule(frame);
        Some(cur)
    }

    /// Resume a `Stopped` task back onto its priority's ready queue.
    pub fn resume(&mut self, id: TaskId) {
        if self.tasks[id as usize].state != TaskState::Stopped {
            return;
        }
        self.tasks[id as usize].state = TaskState::Ready;
        let priority = self.tasks[id as usize].priority;
        self.run_queue(priority).push(id);
    }

    /// Terminate the current task: Running -> Zombie, and force an
    /// immediate reschedule. A zombie holds its slot (and its stack) until
    /// `reap` reclaims it; `reschedule` never requeues a non-`Running`
    /// task, so a zombie never runs again.
    pub fn exit_current(&mut self, frame: &mut CpuState) -> Option<TaskId> {
        let cur = self.current?;
        self.tasks[cur as usize].state = TaskState::Zombie;
        self.reschedule(frame);
        Some(cur)
    }

    /// Reclaim a zombie's slot so a future `spawn` can reuse it. Returns
    /// `false` if `id` is not currently a zombie.
    pub fn reap(&mut self, id: TaskId) -> bool {
        if self.tasks[id as usize].state != TaskState::Zombie {
            return false;
        }
        self.tasks[id as usize] = Task::empty(id);
        true
    }

    pub fn current_task(&self) -> Option<TaskId> {
        self.current
    }

    pub fn task_state(&self, id: TaskId) -> TaskState {
        self.tasks[id as usize].state
    }

    pub fn ticks(&self) -> u64 {
        self.now
    }
}

static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());

pub fn spawn(entry: extern "C" fn() -> !, priority: Priority) -> Option<TaskId> {
    SCHEDULER.lock().spawn(entry, priority)
}

pub fn set_idle(entry: extern "C" fn() -> !) -> TaskId {
    SCHEDULER.lock().set_idle(entry)
}

/// Called from the timer interrupt handler on every tick.
pub fn on_tick(frame: &mut CpuState) {
    SCHEDULER.lock().on_tick(frame);
}

pub fn yield_now(frame: &mut CpuState) {
    SCHEDULER.lock().reschedule(frame);
}

pub fn sleep_current(ticks: u64, frame: &mut CpuState) {
    SCHEDULER.lock().sleep_current(ticks, frame);
}

pub fn wake(id: TaskId) {
    SCHEDULER.lock().wake(id);
}

pub fn block_current(frame: &mut CpuState) -> Option<TaskId> {
    SCHEDULER.lock().block_current(frame)
}

pub fn stop_current(frame: &mut CpuState) -> Option<TaskId> {
    SCHEDULER.lock().stop_current(frame)
}

pub fn resume(id: TaskId) {
    SCHEDULER.lock().resume(id);
}

pub fn exit_current(frame: &mut CpuState) -> Option<TaskId> {
    SCHEDULER.lock().exit_current(frame)
}

pub fn reap(id: TaskId) -> bool {
    SCHEDULER.lock().reap(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn task_a() -> ! {
        loop {}
    }
    extern "C" fn task_b() -> ! {
        loop {}
    }
    extern "C" fn idle() -> ! {
        loop {}
    }

    #[test]
    fn round_robin_alternates_ready_tasks() {
        let mut s = Scheduler::new();
        s.set_idle(idle);
        let a = s.spawn(task_a, Priority::Normal).unwrap();
        let b = s.spawn(task_b, Priority::Normal).unwrap();

        let mut frame = CpuState::zeroed();
        s.reschedule(&mut frame);
        assert_eq!(s.current_task(), Some(a));
        s.reschedule(&mut frame);
        assert_eq!(s.current_task(), Some(b));
        s.reschedule(&mut frame);
        assert_eq!(s.current_task(), Some(a));
    }

    #[test]
    fn higher_priority_preempts_ready_order() {
        let mut s = Scheduler::new();
        s.set_idle(idle);
        let low = s.spawn(task_a, Priority::Low).unwrap();
        let high = s.spawn(task_b, Priority::High).unwrap();
        let mut frame = CpuState::zeroed();

        // High tier is picked ahead of low even though low was spawned first,
        // and keeps being picked across reschedules while it's the only
        // ready high task.
        s.reschedule(&mut frame);
        assert_eq!(s.current_task(), Some(high));
        s.reschedule(&mut frame);
        assert_eq!(s.current_task(), Some(high));

        // Only once high blocks does low get a turn.
        s.block_current(&mut frame);
        assert_eq!(s.current_task(), Some(low));
    }

    #[test]
    fn blocked_and_sleeping_tasks_are_independent() {
        // A task parked via block_current must not be woken by the timed
        // sleep sweep, and a task parked via sleep_current must not be
        // disturbed by a wake() aimed at a different, blocked task.
        let mut s = Scheduler::new();
        s.set_idle(idle);
        let a = s.spawn(task_a, Priority::Normal).unwrap();
        let b = s.spawn(task_b, Priority::Normal).unwrap();
        let mut frame = CpuState::zeroed();

        s.reschedule(&mut frame); // current = a
        s.block_current(&mut frame); // a -> Blocked, current = b
        assert_eq!(s.task_state(a), TaskState::Blocked);

        s.sleep_current(5, &mut frame); // b -> Sleeping, current = idle
        assert_eq!(s.task_state(b), TaskState::Sleeping);

        for _ in 0..10 {
            s.on_tick(&mut frame);
        }
        // b's timed sleep elapsed and woke it (Ready or since-scheduled
        // Running); a is untouched by the tick sweep, still Blocked.
        assert_ne!(s.task_state(b), TaskState::Sleeping);
        assert_eq!(s.task_state(a), TaskState::Blocked);

        // wake(b) while b is no longer Blocked must not disturb a.
        s.wake(b);
        assert_eq!(s.task_state(a), TaskState::Blocked);

        s.wake(a);
        assert_eq!(s.task_state(a), TaskState::Ready);
    }

    #[test]
    fn wake_is_noop_unless_actually_blocked_on_wait_queue() {
        let mut s = Scheduler::new();
        s.set_idle(idle);
        let a = s.spawn(task_a, Priority::Normal).unwrap();
        // a is Ready, never blocked -- wake must leave it alone.
        s.wake(a);
        assert_eq!(s.task_state(a), TaskState::Ready);
    }

    #[test]
    fn exit_transitions_to_zombie_and_reap_frees_the_slot() {
        let mut s = Scheduler::new();
        s.set_idle(idle);
        let a = s.spawn(task_a, Priority::Normal).unwrap();
        let mut frame = CpuState::zeroed();
        s.reschedule(&mut frame);
        assert_eq!(s.current_task(), Some(a));

        s.exit_current(&mut frame);
        assert_eq!(s.task_state(a), TaskState::Zombie);
        // A zombie is never requeued, even across further reschedules.
        s.reschedule(&mut frame);
        s.reschedule(&mut frame);
        assert_eq!(s.task_state(a), TaskState::Zombie);

        assert!(s.reap(a));
        assert_eq!(s.task_state(a), TaskState::Free);
        // Reaping an already-free slot is a no-op, not a panic.
        assert!(!s.reap(a));
    }

    #[test]
    fn stop_and_resume_round_trip() {
        let mut s = Scheduler::new();
        s.set_idle(idle);
        let a = s.spawn(task_a, Priority::Normal).unwrap();
        let mut frame = CpuState::zeroed();
        s.reschedule(&mut frame);
        s.stop_current(&mut frame);
        assert_eq!(s.task_state(a), TaskState::Stopped);
        s.resume(a);
        assert_eq!(s.task_state(a), TaskState::Ready);
    }

    #[test]
    fn sleeping_task_wakes_after_requested_ticks() {
        let mut s = Scheduler::new();
        s.set_idle(idle);
        let a = s.spawn(task_a, Priority::Normal).unwrap();
        let mut frame = CpuState::zeroed();
        s.reschedule(&mut frame); // current = a
        s.sleep_current(3, &mut frame); // current = idle now
        assert_eq!(s.task_state(a), TaskState::Sleeping);

        s.on_tick(&mut frame);
        s.on_tick(&mut frame);
        assert_eq!(s.task_state(a), TaskState::Sleeping);
        s.on_tick(&mut frame);
        assert_eq!(s.task_state(a), TaskState::Ready);
    }

    #[test]
    fn quantum_expiry_forces_preemption() {
        let mut s = Scheduler::new();
        s.set_idle(idle);
        let a = s.spawn(task_a, Priority::Normal).unwrap();
        let b = s.spawn(task_b, Priority::Normal).unwrap();
        let mut frame = CpuState::zeroed();
        s.reschedule(&mut frame);
        assert_eq!(s.current_task(), Some(a));
        for _ in 0..SCHEDULER_QUANTUM_TICKS {
            s.on_tick(&mut frame);
        }
        assert_eq!(s.current_task(), Some(b));
    }

    #[test]
    fn block_and_wake_round_trip() {
        let mut s = Scheduler::new();
        s.set_idle(idle);
        let a = s.spawn(task_a, Priority::Normal).unwrap();
        let mut frame = CpuState::zeroed();
        s.reschedule(&mut frame);
        assert_eq!(s.current_task(), Some(a));
        s.block_current(&mut frame);
        assert_eq!(s.task_state(a), TaskState::Blocked);
        s.wake(a);
        assert_eq!(s.task_state(a), TaskState::Ready);
    }
}
