//! Line-oriented console shell, polled from a dedicated task.
//!
//! This is the external, UI-adjacent collaborator the SVC surface exists
//! to serve (out of scope for the kernel itself per spec §1) — ported from
//! `original_source/shell.c`'s `shell()` loop: poll for a received byte,
//! accumulate a line, split it into whitespace-separated fields, and
//! dispatch the recognized commands through the same SVC front door any
//! other task uses (`kernel::syscall`). Unlike the C original's
//! `parseFields`/`isCommand`/`getFieldString` hand-rolled tokenizer, this
//! uses `str::split_whitespace`, but the command set and dispatch shape
//! match `shell.c` line for line.

use core::fmt::Write as _;

use drivers::uart0::Uart0;
use kernel::console::Console;
use kernel::syscall::{self, IpcsInfo, PsInfo};

const LINE_CAPACITY: usize = 64;

/// Accumulates bytes from the UART into a line buffer and dispatches
/// complete lines as shell commands.
pub struct Shell {
    uart: Uart0,
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl Shell {
    pub fn new(uart: Uart0) -> Self {
        Shell { uart, buf: [0; LINE_CAPACITY], len: 0 }
    }

    /// Non-blocking poll: consumes at most one received byte per call, the
    /// way the source's task loop interleaves `kbhitUart0()` with other
    /// work rather than blocking the whole task on a read.
    pub fn poll(&mut self) {
        if !self.uart.kbhit() {
            return;
        }
        let byte = self.uart.read_byte();
        match byte {
            b'\r' | b'\n' => {
                self.uart.write_byte(b'\r');
                self.uart.write_byte(b'\n');
                self.dispatch_line();
                self.len = 0;
            }
            0x08 | 0x7F => {
                // Backspace/DEL: erase the last character both in the
                // buffer and on the terminal.
                if self.len > 0 {
                    self.len -= 1;
                    self.uart.write_byte(0x08);
                    self.uart.write_byte(b' ');
                    self.uart.write_byte(0x08);
                }
            }
            b => {
                if self.len < LINE_CAPACITY {
                    self.buf[self.len] = b;
                    self.len += 1;
                    self.uart.write_byte(b);
                }
            }
        }
    }

    /// Copies the accumulated line out of `self.buf` into an owned
    /// stack buffer, decoupled from `self` so the dispatch below is free
    /// to take `&mut self` (for `cmd_ps`/`cmd_ipcs`'s console writes)
    /// without fighting the borrow checker over a slice still aliasing
    /// `self.buf`.
    fn dispatch_line(&mut self) {
        let mut line_buf = [0u8; LINE_CAPACITY];
        let len = self.len;
        line_buf[..len].copy_from_slice(&self.buf[..len]);
        let line = core::str::from_utf8(&line_buf[..len]).unwrap_or("");

        let mut fields = line.split_whitespace();
        let Some(command) = fields.next() else { return };
        let arg1 = fields.next();

        match command {
            "reboot" => syscall::reboot(),
            "ps" => self.cmd_ps(),
            "ipcs" => self.cmd_ipcs(),
            "kill" => {
                if let Some(pid) = arg1.and_then(|s| s.parse::<u32>().ok()) {
                    syscall::kill(pid);
                }
            }
            "pkill" => {
                if let Some(name) = arg1 {
                    syscall::pkill(name);
                }
            }
            "preempt" => match arg1 {
                Some("on") => syscall::set_preempt(true),
                Some("off") => syscall::set_preempt(false),
                _ => {}
            },
            "sched" => match arg1 {
                Some("prio") => syscall::set_scheduler_priority_mode(true),
                Some("rr") => syscall::set_scheduler_priority_mode(false),
                _ => {}
            },
            "pidof" => {
                if let Some(name) = arg1 {
                    let pid = syscall::pidof(name);
                    let mut console = Console::new(&mut self.uart);
                    let _ = writeln!(console, "{pid}");
                }
            }
            name => {
                // Bare name: restart that task in place, matching
                // `shell.c`'s fallthrough `proc(name)` call.
                syscall::proc_restart(name);
            }
        }
    }

    fn cmd_ps(&mut self) {
        let mut info = PsInfo { task_count: 0, entries: [zero_ps_entry(); kernel::config::MAX_TASKS] };
        syscall::ps(&mut info);
        let mut console = Console::new(&mut self.uart);
        let _ = writeln!(console, "PID         Name            State  CPU%  Blocking");
        for entry in info.entries.iter().take(info.task_count) {
            let name_len = entry.name.iter().position(|&b| b == 0).unwrap_or(15);
            let name = core::str::from_utf8(&entry.name[..name_len]).unwrap_or("?");
            let state = state_name(entry.state);
            let blocking: &str = match entry.blocking_resource_type {
                1 => "mutex",
                2 => "semaphore",
                _ => "none",
            };
            let _ = writeln!(
                console,
                "{:#010x}  {:<14} {:<7} {:<5} {} {}",
                entry.pid, name, state, entry.cpu_percent, blocking, entry.blocking_resource_id
            );
        }
    }

    fn cmd_ipcs(&mut self) {
        let mut info = IpcsInfo {
            mutexes: [zero_mutex_snapshot(); kernel::config::MAX_MUTEXES],
            semaphores: [zero_semaphore_snapshot(); kernel::config::MAX_SEMAPHORES],
        };
        syscall::ipcs(&mut info);
        let mut console = Console::new(&mut self.uart);
        let _ = writeln!(console, "Mutexes:");
        for (i, m) in info.mutexes.iter().enumerate() {
            let _ = write!(console, "  {i}: locked={} lockedBy={} queue=[", m.lock, m.locked_by);
            for (j, waiter) in m.queue[..m.queue_size as usize].iter().enumerate() {
                if j > 0 {
                    let _ = write!(console, ", ");
                }
                let _ = write!(console, "{waiter}");
            }
            let _ = writeln!(console, "]");
        }
        let _ = writeln!(console, "Semaphores:");
        for (i, s) in info.semaphores.iter().enumerate() {
            let _ = write!(console, "  {i}: count={} queue=[", s.count);
            for (j, waiter) in s.queue[..s.queue_size as usize].iter().enumerate() {
                if j > 0 {
                    let _ = write!(console, ", ");
                }
                let _ = write!(console, "{waiter}");
            }
            let _ = writeln!(console, "]");
        }
    }
}

/// Maps a `ps` snapshot's numeric state code back to a name, mirroring
/// `TaskState`'s variant order in `kernel::svc::state_code`.
fn state_name(code: u8) -> &'static str {
    match code {
        0 => "invalid",
        1 => "stopped",
        2 => "ready",
        3 => "delayed",
        4 => "blk-mtx",
        5 => "blk-sem",
        _ => "?",
    }
}

fn zero_ps_entry() -> kernel::svc::PsEntry {
    kernel::svc::PsEntry {
        pid: 0,
        name: [0; 16],
        state: 0,
        cpu_percent: 0,
        blocking_resource_type: 0,
        blocking_resource_id: 0,
    }
}

fn zero_mutex_snapshot() -> kernel::svc::MutexSnapshot {
    kernel::svc::MutexSnapshot {
        lock: false,
        queue_size: 0,
        queue: [0; kernel::config::MAX_MUTEX_QUEUE_SIZE],
        locked_by: 0,
    }
}

fn zero_semaphore_snapshot() -> kernel::svc::SemaphoreSnapshot {
    kernel::svc::SemaphoreSnapshot {
        count: 0,
        queue_size: 0,
        queue: [0; kernel::config::MAX_SEMAPHORE_QUEUE_SIZE],
    }
}
