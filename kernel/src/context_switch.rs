//! PendSV-driven context switch.
//!
//! The teacher declared `switch_sp_to_psp`/`PendSV_Handler` as external C
//! symbols but never shipped the assembly backing them. This module
//! replaces that shim with a native `#[naked]` handler, in the style of
//! the bern-rtos Cortex-M scheduler: the naked function only moves
//! registers around the hardware-pushed exception frame and calls into a
//! plain Rust function (`select_next_task`) to do the actual bookkeeping
//! (runtime accounting, scheduler pick, MPU reprogramming).
//!
//! Lazy FPU stacking is disabled at boot (see `systick::scheduler_init`),
//! so unlike the bern-rtos original there is no FPU-used check: every
//! switch saves and restores the integer register file only.

use core::arch::asm;
use core::ptr::{read_volatile, write_volatile};

use crate::config::{DUMMY_XPSR, INITIAL_EXC_RETURN, TaskHandler};
use crate::mpu;
use crate::task::{TaskState, TaskTable};

/// Number of words the software-saved half of a frame occupies: R4-R11 and
/// LR, pushed by the handler itself below the hardware frame.
const SOFTWARE_FRAME_WORDS: usize = 9;

/// Seeds a brand-new task's stack with the frame `PendSV`'s epilogue
/// expects to find: R4-R11 and LR below the hardware-restored R0-R3, R12,
/// LR, PC, xPSR. `stack_top` must be 8-byte aligned and point one past the
/// last usable word.
///
/// Grounded in `init_task_stack` in both the teacher and the C original:
/// PC is the entry point, LR is a poison value (tasks never return), xPSR
/// sets the Thumb bit, and the saved exception-return LR selects
/// "Thread mode, use PSP, no FPU frame".
pub fn init_task_stack(stack_top: *mut u32, entry: TaskHandler) -> u32 {
    unsafe {
        let mut sp = stack_top;

        // Hardware-restored frame, highest address first: xPSR, PC, LR, R12, R3..R0.
        sp = sp.offset(-1);
        write_volatile(sp, DUMMY_XPSR);
        sp = sp.offset(-1);
        write_volatile(sp, entry as usize as u32);
        sp = sp.offset(-1);
        write_volatile(sp, 0xFFFF_FFFF); // LR: poison, a task must never return
        sp = sp.offset(-1);
        write_volatile(sp, 0); // R12
        for _ in 0..3 {
            sp = sp.offset(-1);
            write_volatile(sp, 0); // R3, R2, R1
        }
        sp = sp.offset(-1);
        write_volatile(sp, 0); // R0

        // Software-saved frame, immediately below the hardware frame: the
        // exception-return LR sits adjacent to R0 (it is the last word
        // `ldmia r0!, {r4-r11, lr}` loads), then R11..R4 below it. This must
        // mirror the register order `PendSV`'s `stmdb`/`ldmia` pair uses, or
        // the first dispatch of this task loads garbage into `lr` and the
        // closing `bx lr` jumps to nowhere.
        sp = sp.offset(-1);
        write_volatile(sp, INITIAL_EXC_RETURN);
        for _ in 0..8 {
            sp = sp.offset(-1);
            write_volatile(sp, 0); // R4..R11
        }

        sp as u32
    }
}

const SCB_ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
const ICSR_PENDSVSET: u32 = 1 << 28;

/// Requests a context switch on exit from the current exception/handler,
/// or immediately if called from thread mode. Equivalent to the teacher's
/// `schedule()`.
pub fn request_switch() {
    unsafe {
        let icsr = read_volatile(SCB_ICSR);
        write_volatile(SCB_ICSR, icsr | ICSR_PENDSVSET);
    }
}

/// Called from the naked `PendSV` trampoline with the outgoing task's
/// saved stack pointer. Accounts runtime, asks the scheduler for the next
/// task, reprograms the MPU for it, and returns its saved stack pointer.
///
/// `table` and `scheduler` are passed in rather than reached for globally
/// so this function stays unit-testable; the real trampoline closes over
/// `crate::state::KERNEL`.
pub fn select_next_task(
    table: &mut TaskTable,
    scheduler: &mut crate::scheduler::Scheduler,
    current_index: usize,
    outgoing_sp: u32,
) -> (usize, u32) {
    table.tasks[current_index].sp = outgoing_sp;
    table.tasks[current_index].runtime = table.tasks[current_index].runtime.wrapping_add(1);

    let next_index = scheduler
        .next_task(table)
        .unwrap_or(current_index);

    mpu::apply_mask(table.tasks[next_index].srd);
    (next_index, table.tasks[next_index].sp)
}

/// The real trampoline: saves R4-R11 and the exception LR below the
/// hardware frame, hands the stack pointer to `pendsv_switch` (a
/// `#[no_mangle]` Rust function provided by `state.rs` that closes over
/// the global kernel state and calls `select_next_task`), then restores
/// the new task's register file and returns into it.
///
/// No FPU register handling: lazy stacking is disabled at boot, so the
/// hardware frame is always the plain 8-word frame and `tst lr, #0x10` is
/// unnecessary.
#[unsafe(no_mangle)]
#[naked]
pub unsafe extern "C" fn PendSV() {
    unsafe {
        asm!(
            "mrs r0, psp",
            "stmdb r0!, {{r4-r11, lr}}",
            "bl pendsv_switch",
            "ldmia r0!, {{r4-r11, lr}}",
            "msr psp, r0",
            "bx lr",
            options(noreturn),
        );
    }
}

/// Bootstraps the very first task: loads its pre-seeded frame directly
/// without going through the save half of `PendSV`, then returns into it
/// with `PSP` selected as the active stack pointer (`EXC_RETURN` bit 2
/// set via `CONTROL.SPSEL`).
pub fn start_first_task(sp: u32) -> ! {
    unsafe {
        asm!(
            "msr psp, r0",
            "movs r1, #2",
            "msr control, r1",
            "isb",
            "ldmia r0!, {{r4-r11, lr}}",
            "pop {{r0-r3, r12, lr}}",
            "pop {{pc}}",
            in("r0") sp,
            options(noreturn),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use crate::task::Tcb;

    #[test]
    fn select_next_task_accounts_runtime_and_reprograms_mpu() {
        let mut table = TaskTable::new();
        table.tasks[0] = Tcb { state: TaskState::Ready, ..Tcb::invalid() };
        table.tasks[0].priority = 1;
        table.tasks[0].current_priority = 1;
        table.tasks[1] = Tcb { state: TaskState::Ready, ..Tcb::invalid() };
        table.tasks[1].priority = 1;
        table.tasks[1].current_priority = 1;

        let mut scheduler = Scheduler::new();
        let (next_index, next_sp) = select_next_task(&mut table, &mut scheduler, 0, 0x2000_1000);

        assert_eq!(table.tasks[0].sp, 0x2000_1000);
        assert_eq!(table.tasks[0].runtime, 1);
        assert_eq!(next_index, 1);
        assert_eq!(next_sp, table.tasks[1].sp);
    }
}
