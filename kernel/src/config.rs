//! Build-time configuration for the kernel.
//!
//! Centralizes every capacity and memory-map constant the rest of the
//! kernel is sized against. Single-target (STM32F407, Cortex-M4, no FPU
//! lazy-stacking) the way the original scheduler config was; there is no
//! per-board `cfg` switching here.

/// Kernel tick period in milliseconds.
pub const KERNEL_TICK_PERIOD_MS: u32 = 1;

/// Core clock, used by the SysTick reload calculation.
pub const CORE_CLOCK_MHZ: u32 = 16;

/// Maximum number of concurrent tasks the TCB table can hold.
pub const MAX_TASKS: usize = 16;

/// Number of distinct priority levels; 0 is highest.
pub const NUM_PRIORITIES: u8 = 16;

/// Maximum number of mutexes.
pub const MAX_MUTEXES: usize = 4;

/// Maximum number of counting semaphores.
pub const MAX_SEMAPHORES: usize = 4;

/// Maximum waiters a single mutex can queue. Set above `MAX_TASKS - 1` so
/// every other task in the system can queue on one mutex without the
/// queue-full fail-open behavior ever triggering in practice.
pub const MAX_MUTEX_QUEUE_SIZE: usize = MAX_TASKS - 1;

/// Maximum waiters a single semaphore can queue.
pub const MAX_SEMAPHORE_QUEUE_SIZE: usize = MAX_TASKS - 1;

/// Size of the scheduler's own (MSP) stack in bytes.
pub const SIZE_SCHEDULER_STACK: u32 = 1024;

/// Default per-task stack size requested from the heap allocator at
/// creation time. One 1024-B sub-region; tasks needing more ask
/// `create_task` for a larger size explicitly.
pub const DEFAULT_TASK_STACK_SIZE: u32 = 1024;

/// SRAM base and size for the whole part, matching the teacher's memory map.
pub const SRAM_START: u32 = 0x2000_0000;
pub const SRAM_SIZE: u32 = 128 * 1024;
pub const SRAM_END: u32 = SRAM_START + SRAM_SIZE;

/// Base of the MPU-managed heap partition: five SRAM sub-windows that back
/// task stacks and `mallocFromHeap` allocations. Sits just above the fixed
/// 4 KiB the kernel reserves for its own statics and MSP stack at
/// `SRAM_START`.
pub const HEAP_PARTITION_BASE: u32 = SRAM_START + 0x1000;

/// Default xPSR value for a freshly seeded task stack frame (Thumb bit set).
pub const DUMMY_XPSR: u32 = 0x0100_0000;

/// LR value seeded into a new task frame: return to Thread mode using PSP.
pub const INITIAL_EXC_RETURN: u32 = 0xFFFF_FFFD;

/// Task handler ABI. Tasks never return; doing so is undefined behavior.
pub type TaskHandler = unsafe extern "C" fn();
