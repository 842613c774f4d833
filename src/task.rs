//! Task control block: the unit the scheduler moves between its queues.

use crate::cpu_state::CpuState;
use crate::gdt::{KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR};

pub type TaskId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    /// Parked on a timed sleep, woken by `Scheduler::on_tick` at `wake_at`.
    Sleeping,
    /// Parked on the wait queue for an external event, woken by `Scheduler::wake`.
    Blocked,
    /// Suspended by an external request (e.g. a debugger or job control),
    /// not eligible to run until explicitly resumed.
    Stopped,
    /// Exited, awaiting `Scheduler::reap` to reclaim its slot.
    Zombie,
    /// A slot not currently holding a task.
    Free,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
}

#[derive(Clone, Copy)]
pub struct Task {
    pub id: TaskId,
    pub state: TaskState,
    pub priority: Priority,
    pub context: CpuState,
    /// Absolute tick at which a sleeping task becomes ready again.
    pub wake_at: u64,
    pub stack: [u8; crate::config::TASK_STACK_SIZE],
}

impl Task {
    pub const fn empty(id: TaskId) -> Self {
        Task {
            id,
            state: TaskState::Free,
            priority: Priority::Normal,
            context: CpuState::zeroed(),
            wake_at: 0,
            stack: [0; crate::config::TASK_STACK_SIZE],
        }
    }

    pub fn spawn(&mut self, entry: extern "C" fn() -> !, priority: Priority) {
        let stack_top = (self.stack.as_ptr() as u64) + crate::config::TASK_STACK_SIZE as u64;
        let stack_top = stack_top & !0xF; // 16-byte align before entry
        self.context = CpuState::new_task(entry as u64, stack_top, KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR);
        self.state = TaskState::Ready;
        self.priority = priority;
        self.wake_at = 0;
    }
}
