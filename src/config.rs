//! Compile-time kernel tunables, gathered in one place.

/// Timer interrupt frequency in Hz, used to program the PIT / APIC timer.
pub const TIMER_FREQUENCY_HZ: u32 = 100;

/// PIT input clock frequency; divisor = PIT_BASE_FREQUENCY_HZ / TIMER_FREQUENCY_HZ.
pub const PIT_BASE_FREQUENCY_HZ: u32 = 1_193_182;

/// Size of the kernel heap in bytes.
pub const HEAP_SIZE: usize = 256 * 1024;

/// Minimum allocation granularity of the heap's free-list allocator.
pub const HEAP_MIN_BLOCK_SIZE: usize = 16;

/// Size of each dedicated IST stack (double fault, NMI, machine check).
pub const IST_STACK_SIZE: usize = 4096 * 4;

/// Maximum frames tracked by a single zone's bitmap (zone covers at most this many 4 KiB frames).
pub const MAX_FRAMES_PER_ZONE: usize = 1 << 20;

/// Physical page size.
pub const PAGE_SIZE: usize = 4096;

/// Buddy allocator order bounds (order k covers 2^k bytes).
pub const BUDDY_MIN_ORDER: u32 = 12;
pub const BUDDY_MAX_ORDER: u32 = 21;
pub const BUDDY_NUM_ORDERS: usize = (BUDDY_MAX_ORDER - BUDDY_MIN_ORDER + 1) as usize;

/// Capacity of each zone's buddy free-block node pool.
pub const BUDDY_POOL_CAPACITY: usize = 16384;

/// Zone boundaries.
pub const ZONE_DMA_LIMIT: u64 = 16 * 1024 * 1024;
pub const ZONE_NORMAL_LIMIT: u64 = 4 * 1024 * 1024 * 1024;

/// Scheduler quantum, in timer ticks.
pub const SCHEDULER_QUANTUM_TICKS: u32 = 5;

/// Maximum path resolution depth for the VFS (symlink/mount traversal guard).
pub const VFS_MAX_PATH_DEPTH: usize = 40;

/// Minimum ramfs file buffer capacity before doubling kicks in.
pub const RAMFS_MIN_CAPACITY: usize = 64;

/// Maximum number of open file descriptors per table.
pub const MAX_FILE_DESCRIPTORS: usize = 256;

/// Maximum number of tasks the scheduler can track simultaneously.
pub const MAX_TASKS: usize = 64;

/// Per-task kernel stack size.
pub const TASK_STACK_SIZE: usize = 16 * 1024;
