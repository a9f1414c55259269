//! Preemptive RTOS kernel for a single-core Cortex-M4 with an MPU.
//!
//! Module map mirrors the component breakdown: task table and scheduler,
//! PendSV context switch, SVC dispatcher, MPU sub-region manager, heap
//! allocator, system tick, and fault reporters, all hung off one
//! process-wide [`state::Kernel`] instance. See `DESIGN.md` at the
//! workspace root for where each piece is grounded.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod console;
pub mod context_switch;
pub mod fault;
pub mod heap;
pub mod ipc;
pub mod mpu;
pub mod scheduler;
pub mod state;
pub mod svc;
pub mod syscall;
pub mod systick;
pub mod task;

use cortex_m::peripheral::{Peripherals, SCB};
use drivers::uart0::Uart0;

use config::{DEFAULT_TASK_STACK_SIZE, TaskHandler};
use task::{TaskState, Tcb, TaskName};

/// Creates a task entry at startup with the default stack size. Fails
/// (returns `false`) under the same conditions as [`create_task_with_stack`].
pub fn create_task(name: &str, entry: TaskHandler, priority: u8) -> bool {
    create_task_with_stack(name, entry, priority, DEFAULT_TASK_STACK_SIZE)
}

/// Creates a task entry at startup, requesting `stack_size` bytes from the
/// heap allocator for its private stack. Fails (returns `false`) if the
/// table is full, `entry` is already present — mirrors the reentrancy check
/// in `createThread` — or the heap has no room for the stack.
pub fn create_task_with_stack(
    name: &str,
    entry: TaskHandler,
    priority: u8,
    stack_size: u32,
) -> bool {
    state::with_kernel(|k| {
        let pid = entry as usize as u32;
        if k.tasks.contains_pid(pid) {
            return false;
        }
        let Some(idx) = k.tasks.first_free_slot() else {
            return false;
        };
        let Some(base) = k.heap.malloc(stack_size) else {
            return false;
        };

        let stack_top = (base + stack_size) as *mut u32;
        let sp = context_switch::init_task_stack(stack_top, entry);
        let srd = mpu::set_window(base, stack_size);

        k.tasks.tasks[idx] = Tcb {
            state: TaskState::Ready,
            pid,
            sp_init: stack_top as u32,
            sp,
            priority,
            current_priority: priority,
            ticks: 0,
            srd,
            name: TaskName::from_str(name),
            mutex: 0,
            semaphore: 0,
            runtime: 0,
            handler: Some(entry),
        };
        k.tasks.count += 1;
        true
    })
}

/// One-time boot sequence: programs the static MPU regions, arms the
/// fault interrupts, sets exception priorities so PendSV runs at the
/// lowest priority, starts the 1 ms SysTick, then launches the first ready
/// task. Never returns.
pub fn scheduler_init(core_clock_mhz: u32) -> ! {
    mpu::init_static_regions();

    let mut peripherals = Peripherals::take().expect("peripherals already taken");

    unsafe {
        peripherals.SCB.set_priority(cortex_m::peripheral::scb::SystemHandler::PendSV, 0xFF);
        peripherals.SCB.set_priority(cortex_m::peripheral::scb::SystemHandler::SysTick, 0xFE);
    }

    // Disable lazy FPU state preservation: every context switch saves the
    // full integer-only frame, never an FPU one.
    const FPCCR: *mut u32 = 0xE000_EF34 as *mut u32;
    unsafe {
        core::ptr::write_volatile(FPCCR, core::ptr::read_volatile(FPCCR) & !(1 << 30));
    }

    let mut systick = systick::SysTick::take().expect("SysTick already taken");
    systick.init_systic_interrupt_ms(config::KERNEL_TICK_PERIOD_MS, core_clock_mhz);
    core::mem::forget(systick);

    let first_sp = state::with_kernel(|k| {
        let first = k
            .scheduler
            .next_task(&k.tasks)
            .expect("at least the idle task must be ready at boot");
        k.current_index = first;
        mpu::apply_mask(k.tasks.tasks[first].srd);
        k.tasks.tasks[first].sp
    });

    context_switch::start_first_task(first_sp)
}

/// Pends a system reset request through the SCB, used by the `reboot` SVC
/// as well as directly by board bring-up on an unrecoverable condition.
pub fn request_reset() -> ! {
    SCB::sys_reset()
}

/// Global UART0 sink fault handlers and a few SVCs write through. Exists
/// only so the naked exception trampolines below have something concrete
/// to hand `fault::handle_*`; real formatting logic lives in `fault.rs`.
static mut CONSOLE_SINK: Option<Uart0> = None;

/// Installs the console sink used by fault reporting. Must be called once
/// during board bring-up, before interrupts are unmasked.
pub fn install_console_sink(sink: Uart0) {
    unsafe {
        #[allow(static_mut_refs)]
        {
            CONSOLE_SINK = Some(sink);
        }
    }
}

fn with_console_sink(f: impl FnOnce(&mut Uart0)) {
    unsafe {
        #[allow(static_mut_refs)]
        if let Some(sink) = CONSOLE_SINK.as_mut() {
            f(sink);
        }
    }
}

#[unsafe(no_mangle)]
extern "C" fn mem_manage_dispatch(frame: *const fault::ExceptionFrame) {
    with_console_sink(|sink| fault::handle_mpu_fault(sink, unsafe { &*frame }));
}

#[unsafe(no_mangle)]
extern "C" fn bus_fault_dispatch(frame: *const fault::ExceptionFrame) -> ! {
    let frame = unsafe { &*frame };
    loop {
        with_console_sink(|sink| fault::handle_bus_fault(sink, frame));
    }
}

#[unsafe(no_mangle)]
extern "C" fn usage_fault_dispatch(frame: *const fault::ExceptionFrame) -> ! {
    let frame = unsafe { &*frame };
    loop {
        with_console_sink(|sink| fault::handle_usage_fault(sink, frame));
    }
}

/// `cortex-m-rt`'s `HardFault` handler already hands us a frame pointer in
/// its required ABI; no naked trampoline needed here.
#[cortex_m_rt::exception]
unsafe fn HardFault(ef: &cortex_m_rt::ExceptionFrame) -> ! {
    let frame = fault::ExceptionFrame {
        r0: ef.r0(),
        r1: ef.r1(),
        r2: ef.r2(),
        r3: ef.r3(),
        r12: ef.r12(),
        lr: ef.lr(),
        pc: ef.pc(),
        xpsr: ef.xpsr(),
    };
    loop {
        with_console_sink(|sink| fault::handle_hard_fault(sink, &frame));
    }
}

#[unsafe(no_mangle)]
#[naked]
pub unsafe extern "C" fn MemoryManagement() {
    unsafe {
        core::arch::asm!(
            "tst lr, #4",
            "ite eq",
            "mrseq r0, msp",
            "mrsne r0, psp",
            "b mem_manage_dispatch",
            options(noreturn),
        );
    }
}

#[unsafe(no_mangle)]
#[naked]
pub unsafe extern "C" fn BusFault() {
    unsafe {
        core::arch::asm!(
            "tst lr, #4",
            "ite eq",
            "mrseq r0, msp",
            "mrsne r0, psp",
            "b bus_fault_dispatch",
            options(noreturn),
        );
    }
}

#[unsafe(no_mangle)]
#[naked]
pub unsafe extern "C" fn UsageFault() {
    unsafe {
        core::arch::asm!(
            "tst lr, #4",
            "ite eq",
            "mrseq r0, msp",
            "mrsne r0, psp",
            "b usage_fault_dispatch",
            options(noreturn),
        );
    }
}
