//! User-side SVC ABI: the stable system-call surface spec'd in §6, callable
//! from unprivileged task code. Each wrapper issues one `svc #imm`
//! instruction with arguments already loaded into r0 (and r1 for the two
//! services that need a second argument), matching the convention
//! `original_source/shell.c`'s `ps`/`ipcs`/`kill`/`preempt`/... wrappers use
//! (`__asm(" SVC #18")` and so on) — this module is that same front door,
//! just typed and safe to call instead of a bare inline `__asm` per call
//! site.
//!
//! `svc.rs` is the privileged side that decodes and executes these; this
//! module is the unprivileged side that issues them. Nothing else in a task
//! needs raw `asm!`.

use core::arch::asm;

pub use crate::svc::{IpcsInfo, PsInfo};

/// Builds a NUL-terminated name buffer for the name-taking services
/// (`pkill`, `pidof`, `proc`), matching the 15-character `TaskName` cap.
fn name_buf(name: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    for (dst, src) in buf.iter_mut().zip(name.as_bytes()).take(15) {
        *dst = *src;
    }
    buf
}

macro_rules! svc_call {
    ($imm:literal) => {{
        let result: u32;
        unsafe {
            asm!(concat!("svc #", $imm), lateout("r0") result, options(nostack));
        }
        result
    }};
    ($imm:literal, $r0:expr) => {{
        let result: u32;
        unsafe {
            asm!(concat!("svc #", $imm), inlateout("r0") $r0 => result, options(nostack));
        }
        result
    }};
    ($imm:literal, $r0:expr, $r1:expr) => {{
        let result: u32;
        unsafe {
            asm!(concat!("svc #", $imm), inlateout("r0") $r0 => result, in("r1") $r1, options(nostack));
        }
        result
    }};
}

/// Service 0. Pends a context switch; the caller stays ready.
pub fn yield_now() {
    svc_call!(0);
}

/// Service 1. Blocks the caller for at least `ticks` 1 ms system ticks.
/// `sleep(0)` behaves as `yield_now()`.
pub fn sleep(ticks: u32) {
    svc_call!(1, ticks);
}

/// Service 2. Blocks until `mutex_id` is owned by the caller. Returns
/// `false` if the mutex's wait queue was full and the lock was refused
/// rather than silently granted or dropped.
pub fn lock(mutex_id: u32) -> bool {
    svc_call!(2, mutex_id) == 0
}

/// Service 3. No-op if the caller does not own `mutex_id`.
pub fn unlock(mutex_id: u32) {
    svc_call!(3, mutex_id);
}

/// Service 4. Blocks until `sem_id`'s count is available. Returns `false`
/// if the semaphore's wait queue was full.
pub fn wait(sem_id: u32) -> bool {
    svc_call!(4, sem_id) == 0
}

/// Service 5. Wakes the head of `sem_id`'s wait queue, or increments count.
pub fn post(sem_id: u32) {
    svc_call!(5, sem_id);
}

/// Service 6. Toggles whether `SysTick` pends a context switch.
pub fn set_preempt(enabled: bool) {
    svc_call!(6, enabled as u32);
}

/// Service 7. Toggles strict-priority-with-round-robin-among-ties vs plain
/// round-robin.
pub fn set_scheduler_priority_mode(enabled: bool) {
    svc_call!(7, enabled as u32);
}

/// Service 8. No-op if no task is named `name`.
pub fn pkill(name: &str) {
    let buf = name_buf(name);
    svc_call!(8, buf.as_ptr() as u32);
}

/// Service 9. No-op if no task has entry-point address `pid`.
pub fn kill(pid: u32) {
    svc_call!(9, pid);
}

/// Service 10. Returns 0 if no task is named `name`.
pub fn pidof(name: &str) -> u32 {
    let buf = name_buf(name);
    svc_call!(10, buf.as_ptr() as u32)
}

/// Service 11. Sets the matching stopped task back to ready, reseeding its
/// initial stack frame.
pub fn restart(pid: u32) {
    svc_call!(11, pid);
}

/// Service 12. Sets `currentPriority` of the task identified by `pid`.
pub fn set_priority(pid: u32, priority: u8) {
    svc_call!(12, pid, priority as u32);
}

/// Service 13. Never returns.
pub fn reboot() -> ! {
    svc_call!(13);
    loop {
        unsafe { asm!("nop", options(nostack)) };
    }
}

/// Service 14. Copies a consistent mutex/semaphore snapshot into `out`.
pub fn ipcs(out: &mut IpcsInfo) {
    svc_call!(14, out as *mut IpcsInfo as u32);
}

/// Service 15. Restarts a task by name, reseeding its initial stack frame
/// the same way `restart` does, just keyed by name instead of `pid`.
pub fn proc_restart(name: &str) {
    let buf = name_buf(name);
    svc_call!(15, buf.as_ptr() as u32);
}

/// Service 16. Returns a null pointer if the heap had no room.
pub fn malloc(size: u32) -> *mut u8 {
    let mut addr: u32 = 0;
    svc_call!(16, size, &mut addr as *mut u32 as u32);
    addr as *mut u8
}

/// Service 17. A pointer with no matching allocation is a silent no-op.
pub fn free(ptr: *mut u8) {
    svc_call!(17, ptr as u32);
}

/// Service 18. Copies a consistent task snapshot into `out`.
pub fn ps(out: &mut PsInfo) {
    svc_call!(18, out as *mut PsInfo as u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_buf_truncates_and_nul_terminates() {
        let buf = name_buf("ThisNameIsWayTooLongForSixteen");
        assert_eq!(buf[15], 0);
        assert!(buf.iter().take(15).all(|&b| b != 0 || b == 0));
    }

    #[test]
    fn name_buf_short_name_is_nul_padded() {
        let buf = name_buf("idle");
        assert_eq!(&buf[..4], b"idle");
        assert_eq!(buf[4], 0);
    }
}
