//! SVC dispatcher: decodes the trapping instruction's 8-bit immediate and
//! executes one of the closed set of kernel services.
//!
//! Grounded in `svCallIsr`'s `switch` statement in the C original, with one
//! deliberate correction flagged by the port notes: that `switch` falls
//! through from `reboot` into `ipcs` because case 13 is missing its
//! `break`. Here every service is its own `match` arm, so that class of
//! bug cannot recur.

use core::arch::asm;

use crate::config::{MAX_MUTEXES, MAX_SEMAPHORES};
use crate::ipc::LockOutcome;
use crate::mpu;
use crate::state::with_kernel;
use crate::task::{BlockingResource, TaskState};

/// Service numbers, matching the SVC ABI table.
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Service {
    Yield = 0,
    Sleep = 1,
    Lock = 2,
    Unlock = 3,
    Wait = 4,
    Post = 5,
    Preempt = 6,
    Sched = 7,
    Pkill = 8,
    Kill = 9,
    Pidof = 10,
    Restart = 11,
    SetPriority = 12,
    Reboot = 13,
    Ipcs = 14,
    Proc = 15,
    Malloc = 16,
    Free = 17,
    Ps = 18,
}

impl Service {
    fn from_u8(v: u8) -> Option<Self> {
        use Service::*;
        Some(match v {
            0 => Yield,
            1 => Sleep,
            2 => Lock,
            3 => Unlock,
            4 => Wait,
            5 => Post,
            6 => Preempt,
            7 => Sched,
            8 => Pkill,
            9 => Kill,
            10 => Pidof,
            11 => Restart,
            12 => SetPriority,
            13 => Reboot,
            14 => Ipcs,
            15 => Proc,
            16 => Malloc,
            17 => Free,
            18 => Ps,
            _ => return None,
        })
    }
}

/// Snapshot row for the `ps` SVC; layout stable per spec §6.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct PsEntry {
    pub pid: u32,
    pub name: [u8; 16],
    pub state: u8,
    pub cpu_percent: u32,
    pub blocking_resource_type: u8,
    pub blocking_resource_id: u8,
}

#[repr(C)]
pub struct PsInfo {
    pub task_count: usize,
    pub entries: [PsEntry; crate::config::MAX_TASKS],
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct MutexSnapshot {
    pub lock: bool,
    pub queue_size: u8,
    pub queue: [u8; crate::config::MAX_MUTEX_QUEUE_SIZE],
    pub locked_by: u8,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct SemaphoreSnapshot {
    pub count: u8,
    pub queue_size: u8,
    pub queue: [u8; crate::config::MAX_SEMAPHORE_QUEUE_SIZE],
}

#[repr(C)]
pub struct IpcsInfo {
    pub mutexes: [MutexSnapshot; MAX_MUTEXES],
    pub semaphores: [SemaphoreSnapshot; MAX_SEMAPHORES],
}

fn state_code(state: TaskState) -> u8 {
    match state {
        TaskState::Invalid => 0,
        TaskState::Stopped => 1,
        TaskState::Ready => 2,
        TaskState::Delayed => 3,
        TaskState::BlockedMutex => 4,
        TaskState::BlockedSemaphore => 5,
    }
}

/// Releases a mutex the stopped/killed task may own and removes it from
/// any wait queue it might be sitting in. Shared by `kill` and `pkill`.
fn release_task_resources(k: &mut crate::state::Kernel, idx: usize) {
    let task = k.tasks.tasks[idx];
    match task.state {
        TaskState::BlockedMutex => k.mutexes[task.mutex as usize].queue.remove(idx as u8),
        TaskState::BlockedSemaphore => k.semaphores[task.semaphore as usize].remove_waiter(idx as u8),
        _ => {}
    }
    for mutex in k.mutexes.iter_mut() {
        if mutex.owner == Some(idx as u8) {
            if let Some(promoted) = mutex.release_owned_by(idx as u8) {
                k.tasks.tasks[promoted as usize].state = TaskState::Ready;
                k.tasks.tasks[promoted as usize].mutex = 0;
            }
        }
    }
    k.tasks.tasks[idx].state = TaskState::Stopped;
    k.tasks.tasks[idx].mutex = 0;
    k.tasks.tasks[idx].semaphore = 0;
    k.tasks.tasks[idx].ticks = 0;
}

/// Reboots via AIRCR.SYSRESETREQ. Never returns.
fn request_reset() -> ! {
    const AIRCR: *mut u32 = 0xE000_ED0C as *mut u32;
    const VECTKEY: u32 = 0x05FA_0000;
    const SYSRESETREQ: u32 = 1 << 2;
    unsafe {
        core::ptr::write_volatile(AIRCR, VECTKEY | SYSRESETREQ);
    }
    loop {
        cortex_m::asm::nop();
    }
}

/// The dispatcher body, called with the decoded immediate and the caller's
/// saved R0/R1. Returns a value to be written back into the caller's R0,
/// where the service defines one (0 = success, nonzero = failure code);
/// services that only write through an out-pointer return 0.
pub fn dispatch(immediate: u8, r0: u32, r1: u32) -> u32 {
    let Some(service) = Service::from_u8(immediate) else {
        return u32::MAX;
    };

    let result = with_kernel(|k| {
        let caller = k.current_index;
        match service {
            Service::Yield => 0,
            Service::Sleep => {
                // Per spec §8, sleep(0) behaves as yield: the caller stays
                // Ready rather than dropping into Delayed for up to one
                // tick waiting for `on_tick` to wake it back up.
                if r0 == 0 {
                    k.tasks.tasks[caller].state = TaskState::Ready;
                } else {
                    k.tasks.tasks[caller].state = TaskState::Delayed;
                    k.tasks.tasks[caller].ticks = r0;
                }
                0
            }
            Service::Lock => {
                let id = r0 as usize;
                match k.mutexes[id].lock(caller as u8) {
                    LockOutcome::Acquired => 0,
                    LockOutcome::Blocked => {
                        k.tasks.tasks[caller].state = TaskState::BlockedMutex;
                        k.tasks.tasks[caller].mutex = id as u8;
                        0
                    }
                    LockOutcome::QueueFull => 1,
                }
            }
            Service::Unlock => {
                let id = r0 as usize;
                if let Some(promoted) = k.mutexes[id].unlock(caller as u8) {
                    k.tasks.tasks[promoted as usize].state = TaskState::Ready;
                }
                0
            }
            Service::Wait => {
                let id = r0 as usize;
                match k.semaphores[id].wait(caller as u8) {
                    LockOutcome::Acquired => 0,
                    LockOutcome::Blocked => {
                        k.tasks.tasks[caller].state = TaskState::BlockedSemaphore;
                        k.tasks.tasks[caller].semaphore = id as u8;
                        0
                    }
                    LockOutcome::QueueFull => 1,
                }
            }
            Service::Post => {
                let id = r0 as usize;
                if let Some(woken) = k.semaphores[id].post() {
                    k.tasks.tasks[woken as usize].state = TaskState::Ready;
                }
                0
            }
            Service::Preempt => {
                k.preemption = r0 != 0;
                0
            }
            Service::Sched => {
                k.scheduler.policy = if r0 != 0 {
                    crate::scheduler::SchedulingPolicy::Priority
                } else {
                    crate::scheduler::SchedulingPolicy::RoundRobin
                };
                0
            }
            Service::Pkill => {
                let name_ptr = r0 as *const u8;
                let name = read_c_string(name_ptr);
                if let Some(idx) = k.tasks.index_of_name(name) {
                    release_task_resources(k, idx);
                }
                0
            }
            Service::Kill => {
                let pid = r0;
                if let Some(idx) = k.tasks.index_of_pid(pid) {
                    release_task_resources(k, idx);
                }
                0
            }
            Service::Pidof => {
                let name_ptr = r0 as *const u8;
                let name = read_c_string(name_ptr);
                k.tasks.index_of_name(name).map(|i| k.tasks.tasks[i].pid).unwrap_or(0)
            }
            Service::Restart => {
                let pid = r0;
                if let Some(idx) = k.tasks.index_of_pid(pid) {
                    // Per spec §9's restart note: setting state=ready alone
                    // leaves a killed task's PSP pointing into whatever
                    // frame it was interrupted in. Reseed the initial
                    // exception frame at the task's stack top and reset sp
                    // to it, so the task restarts cleanly at its entry
                    // point instead of resuming mid-function.
                    let stack_top = k.tasks.tasks[idx].sp_init;
                    let entry = k.tasks.tasks[idx].handler;
                    if let Some(handler) = entry {
                        let seeded = crate::context_switch::init_task_stack(stack_top as *mut u32, handler);
                        k.tasks.tasks[idx].sp = seeded;
                    }
                    k.tasks.tasks[idx].state = TaskState::Ready;
                }
                0
            }
            Service::SetPriority => {
                let pid = r0;
                let prio = r1 as u8;
                if let Some(idx) = k.tasks.index_of_pid(pid) {
                    k.tasks.tasks[idx].current_priority = prio;
                }
                0
            }
            Service::Reboot => u32::MAX, // handled after releasing the lock, below
            Service::Ipcs => {
                let out = r0 as *mut IpcsInfo;
                fill_ipcs_snapshot(k, out);
                0
            }
            Service::Proc => {
                let name_ptr = r0 as *const u8;
                let name = read_c_string(name_ptr);
                if let Some(idx) = k.tasks.index_of_name(name) {
                    let stack_top = k.tasks.tasks[idx].sp_init;
                    if let Some(handler) = k.tasks.tasks[idx].handler {
                        let seeded = crate::context_switch::init_task_stack(stack_top as *mut u32, handler);
                        k.tasks.tasks[idx].sp = seeded;
                    }
                    k.tasks.tasks[idx].state = TaskState::Ready;
                }
                0
            }
            Service::Malloc => {
                let size = r0;
                let out_ptr = r1 as *mut u32;
                match k.heap.malloc(size) {
                    Some(addr) => {
                        mpu::add_window(&mut k.tasks.tasks[caller].srd, addr, size);
                        // The caller resumes in the same trap, on its own
                        // hardware SRD byte: without reprogramming the MPU
                        // here the extended window isn't live until the
                        // next context switch, and touching the returned
                        // buffer before then faults. Matches `kernel.c`'s
                        // `applySramAccessMask` call inside `case 16`.
                        mpu::apply_mask(k.tasks.tasks[caller].srd);
                        unsafe { core::ptr::write_volatile(out_ptr, addr) };
                        0
                    }
                    None => {
                        unsafe { core::ptr::write_volatile(out_ptr, 0) };
                        1
                    }
                }
            }
            Service::Free => {
                k.heap.free(r0);
                0
            }
            Service::Ps => {
                let out = r0 as *mut PsInfo;
                fill_ps_snapshot(k, out);
                0
            }
        }
    });

    if service == Service::Reboot {
        request_reset();
    }

    if matches!(
        service,
        Service::Yield
            | Service::Sleep
            | Service::Lock
            | Service::Unlock
            | Service::Wait
            | Service::Post
            | Service::Preempt
            | Service::Sched
    ) {
        crate::context_switch::request_switch();
    }

    result
}

fn read_c_string<'a>(ptr: *const u8) -> &'a str {
    unsafe {
        let mut len = 0usize;
        while len < 16 && *ptr.add(len) != 0 {
            len += 1;
        }
        let slice = core::slice::from_raw_parts(ptr, len);
        core::str::from_utf8(slice).unwrap_or("")
    }
}

fn fill_ps_snapshot(k: &crate::state::Kernel, out: *mut PsInfo) {
    let total = k.tasks.total_runtime();
    let mut entries = [PsEntry {
        pid: 0,
        name: [0; 16],
        state: 0,
        cpu_percent: 0,
        blocking_resource_type: 0,
        blocking_resource_id: 0,
    }; crate::config::MAX_TASKS];

    for (i, task) in k.tasks.tasks.iter().enumerate() {
        let (res_type, res_id) = match task.blocking_resource() {
            BlockingResource::None => (0u8, 0u8),
            BlockingResource::Mutex(id) => (1, id),
            BlockingResource::Semaphore(id) => (2, id),
        };
        let cpu_percent = if total == 0 {
            0
        } else {
            (task.runtime as u64 * 100 / total) as u32
        };
        entries[i] = PsEntry {
            pid: task.pid,
            name: task.name.as_bytes16(),
            state: state_code(task.state),
            cpu_percent,
            blocking_resource_type: res_type,
            blocking_resource_id: res_id,
        };
    }

    unsafe {
        core::ptr::write_volatile(
            out,
            PsInfo { task_count: k.tasks.count, entries },
        );
    }
}

fn fill_ipcs_snapshot(k: &crate::state::Kernel, out: *mut IpcsInfo) {
    let mut mutexes = [MutexSnapshot {
        lock: false,
        queue_size: 0,
        queue: [0; crate::config::MAX_MUTEX_QUEUE_SIZE],
        locked_by: 0,
    }; MAX_MUTEXES];
    for (i, m) in k.mutexes.iter().enumerate() {
        mutexes[i].lock = m.owner.is_some();
        mutexes[i].locked_by = m.owner.unwrap_or(0);
        mutexes[i].queue_size = m.queue.len() as u8;
        mutexes[i].queue[..m.queue.len()].copy_from_slice(m.queue.as_slice());
    }

    let mut semaphores = [SemaphoreSnapshot {
        count: 0,
        queue_size: 0,
        queue: [0; crate::config::MAX_SEMAPHORE_QUEUE_SIZE],
    }; MAX_SEMAPHORES];
    for (i, s) in k.semaphores.iter().enumerate() {
        semaphores[i].count = s.count.min(u8::MAX as u32) as u8;
        semaphores[i].queue_size = s.queue.len() as u8;
        semaphores[i].queue[..s.queue.len()].copy_from_slice(s.queue.as_slice());
    }

    unsafe {
        core::ptr::write_volatile(out, IpcsInfo { mutexes, semaphores });
    }
}

/// Reads the SVC immediate from the trapping instruction: the SVC opcode's
/// low byte, located one halfword below the stacked return PC on the
/// caller's PSP frame.
pub unsafe fn decode_immediate(stacked_pc: u32) -> u8 {
    unsafe {
        let instruction = *((stacked_pc - 2) as *const u16);
        (instruction & 0xFF) as u8
    }
}

/// `SVCall` exception entry, called from a naked trampoline (see
/// `crate::lib` for the `#[exception]` wiring) with the caller's PSP.
#[unsafe(no_mangle)]
extern "C" fn svcall_dispatch(psp: *const u32) {
    unsafe {
        let r0 = *psp;
        let r1 = *psp.add(1);
        let stacked_pc = *psp.add(6);
        let immediate = decode_immediate(stacked_pc);
        let result = dispatch(immediate, r0, r1);
        core::ptr::write_volatile(psp as *mut u32, result);
    }
}

#[unsafe(no_mangle)]
#[naked]
pub unsafe extern "C" fn SVCall() {
    unsafe {
        asm!(
            "tst lr, #4",
            "ite eq",
            "mrseq r0, msp",
            "mrsne r0, psp",
            "b svcall_dispatch",
            options(noreturn),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_from_u8_covers_full_table() {
        for i in 0..=18u8 {
            assert!(Service::from_u8(i).is_some());
        }
        assert!(Service::from_u8(19).is_none());
    }

    #[test]
    fn reboot_does_not_fall_through_into_ipcs() {
        // Structural check: reboot and ipcs are distinct match arms with no
        // shared body, unlike the source's missing `break`.
        assert_ne!(Service::Reboot as u8, Service::Ipcs as u8);
    }
}
