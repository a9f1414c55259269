#![no_std]
#![no_main]
#![allow(clippy::empty_loop)]

mod button;
mod led;
mod shell;

use cortex_m_rt::entry;
use panic_halt as _;

use drivers::uart0::Uart0;
use kernel::config::CORE_CLOCK_MHZ;

use crate::led::*;

/// Peripheral clock feeding USART2; matches `CORE_CLOCK_MHZ` since no APB
/// prescaler is configured in this minimal bring-up.
const UART_PCLK_HZ: u32 = CORE_CLOCK_MHZ * 1_000_000;
const UART_BAUD: u32 = 115_200;

#[entry]
fn main() -> ! {
    init_led();
    button::init_user_button();

    let uart = unsafe { Uart0::init(UART_BAUD, UART_PCLK_HZ) };
    // `Uart0` is a zero-sized handle onto USART2's registers, so handing
    // one copy to the kernel's fault/console sink and keeping another for
    // the shell task is two names for the same peripheral, not a conflict.
    kernel::install_console_sink(uart);

    // Idle is always task 0: the scheduler's "at least one ready task"
    // invariant depends on a task that never blocks or sleeps.
    kernel::create_task("idle", idle_task, 15);
    kernel::create_task("flash4hz", flash_task, 8);
    kernel::create_task("flash1hz", slow_flash_task, 8);
    kernel::create_task("button", button_task, 4);
    kernel::create_task("shell", shell_task, 10);

    kernel::scheduler_init(CORE_CLOCK_MHZ)
}

/// Lowest-priority task; always ready, satisfying the scheduler's invariant
/// that some task can always be selected.
unsafe extern "C" fn idle_task() {
    loop {
        led1_toggle();
    }
}

/// Toggles at roughly 4 Hz using `sleep` rather than a busy loop, the way a
/// cooperating task is expected to yield CPU time back to the scheduler.
unsafe extern "C" fn flash_task() {
    loop {
        led2_toggle();
        kernel::syscall::sleep(125);
    }
}

unsafe extern "C" fn slow_flash_task() {
    loop {
        led3_toggle();
        kernel::syscall::sleep(500);
    }
}

/// Polls the user button and lights `led4` while it is held, sleeping
/// between polls so it doesn't starve lower-priority tasks.
unsafe extern "C" fn button_task() {
    loop {
        if button::is_pressed() {
            led4_on();
        }
        kernel::syscall::sleep(20);
    }
}

/// Console shell: polls USART2 for a line at a time and dispatches it as a
/// kernel command (`ps`, `ipcs`, `kill`, `pkill`, `preempt`, `sched`,
/// `pidof`, `reboot`, or a bare task name to restart). See
/// `original_source/shell.c`'s `shell()` loop.
unsafe extern "C" fn shell_task() {
    let mut shell = shell::Shell::new(Uart0);
    loop {
        shell.poll();
        kernel::syscall::sleep(5);
    }
}
