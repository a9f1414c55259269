//! Fault handlers: MPU fault is recoverable (report, then resume via
//! PendSV), hard/bus/usage faults are not (report, then halt).
//!
//! Grounded in `mpuFaultIsr`/`hardFaultIsr`/`busFaultIsr`/`usageFaultIsr` in
//! `faults.c`, minus the `hexToString`/`putsUart0` hand-rolled formatting —
//! this writes through `console::ConsoleSink` with `core::fmt::Write`
//! instead.

use core::fmt::Write as _;
use core::ptr::{read_volatile, write_volatile};

use crate::console::Console;

const NVIC_SYS_HND_CTRL: *mut u32 = 0xE000_ED24 as *mut u32;
const MEMFAULTACT: u32 = 1 << 0;
const MMFAR: *const u32 = 0xE000_ED34 as *const u32;
const CFSR: *const u32 = 0xE000_ED28 as *const u32;
const HFSR: *const u32 = 0xE000_ED2C as *const u32;

/// The hardware-pushed exception frame, read back out of the PSP/MSP for
/// reporting. Matches R0-R3, R12, LR, PC, xPSR in stack order.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct ExceptionFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

fn report_frame<S: crate::console::ConsoleSink>(sink: &mut S, label: &str, frame: &ExceptionFrame) {
    let mut console = Console::new(sink);
    let _ = writeln!(console, "{label}: r0={:#010x} r1={:#010x} r2={:#010x} r3={:#010x}",
        frame.r0, frame.r1, frame.r2, frame.r3);
    let _ = writeln!(console, "  r12={:#010x} lr={:#010x} pc={:#010x} xpsr={:#010x}",
        frame.r12, frame.lr, frame.pc, frame.xpsr);
}

/// Recoverable: reports the faulting frame and fault-status registers,
/// clears the memory-fault-active bit, and pends a context switch so the
/// scheduler moves past the faulting task. Whether that task should
/// instead be force-stopped is left open (see spec §9) — this preserves
/// the source's behavior of simply continuing to schedule it.
pub fn handle_mpu_fault<S: crate::console::ConsoleSink>(sink: &mut S, frame: &ExceptionFrame) {
    report_frame(sink, "MPU FAULT", frame);
    unsafe {
        let mut console = Console::new(sink);
        let _ = writeln!(console, "  mmfar={:#010x} cfsr={:#010x}", read_volatile(MMFAR), read_volatile(CFSR));
        let ctrl = read_volatile(NVIC_SYS_HND_CTRL);
        write_volatile(NVIC_SYS_HND_CTRL, ctrl & !MEMFAULTACT);
    }
    crate::context_switch::request_switch();
}

/// Non-recoverable: report and loop forever.
pub fn handle_hard_fault<S: crate::console::ConsoleSink>(sink: &mut S, frame: &ExceptionFrame) -> ! {
    report_frame(sink, "HARD FAULT", frame);
    unsafe {
        let mut console = Console::new(sink);
        let _ = writeln!(console, "  hfsr={:#010x}", read_volatile(HFSR));
    }
    loop {
        cortex_m::asm::nop();
    }
}

pub fn handle_bus_fault<S: crate::console::ConsoleSink>(sink: &mut S, frame: &ExceptionFrame) -> ! {
    report_frame(sink, "BUS FAULT", frame);
    unsafe {
        let mut console = Console::new(sink);
        let _ = writeln!(console, "  cfsr={:#010x}", read_volatile(CFSR));
    }
    loop {
        cortex_m::asm::nop();
    }
}

pub fn handle_usage_fault<S: crate::console::ConsoleSink>(sink: &mut S, frame: &ExceptionFrame) -> ! {
    report_frame(sink, "USAGE FAULT", frame);
    unsafe {
        let mut console = Console::new(sink);
        let _ = writeln!(console, "  cfsr={:#010x}", read_volatile(CFSR));
    }
    loop {
        cortex_m::asm::nop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BufSink {
        buf: [u8; 256],
        len: usize,
    }

    impl crate::console::ConsoleSink for BufSink {
        fn write_byte(&mut self, byte: u8) {
            if self.len < self.buf.len() {
                self.buf[self.len] = byte;
                self.len += 1;
            }
        }
    }

    #[test]
    fn mpu_fault_report_includes_register_values() {
        let mut sink = BufSink { buf: [0; 256], len: 0 };
        let frame = ExceptionFrame { r0: 1, r1: 2, r2: 3, r3: 4, r12: 5, lr: 6, pc: 7, xpsr: 8 };
        report_frame(&mut sink, "MPU FAULT", &frame);
        let text = core::str::from_utf8(&sink.buf[..sink.len]).unwrap();
        assert!(text.contains("r0=0x00000001"));
        assert!(text.contains("pc=0x00000007"));
    }
}
