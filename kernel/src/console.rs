//! Console sink abstraction.
//!
//! The kernel never talks to a UART register directly; fault handlers and
//! the `shell`/`ps`/`ipcs` commands format through whatever implements
//! `ConsoleSink`, which `drivers::uart0` implements for the real board. A
//! test build can substitute a buffering sink instead.

use core::fmt;

/// A byte sink a `core::fmt::Write` adapter can target. Kept separate from
/// `fmt::Write` itself so callers that only need to push raw bytes (the
/// fault handlers, which must not allocate or format floating state) don't
/// pull in the formatting machinery.
pub trait ConsoleSink {
    fn write_byte(&mut self, byte: u8);

    fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(b);
        }
    }
}

/// Adapts any `ConsoleSink` to `core::fmt::Write`, so kernel code can use
/// `write!`/`writeln!` against it.
pub struct Console<'a, S: ConsoleSink> {
    sink: &'a mut S,
}

impl<'a, S: ConsoleSink> Console<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        Console { sink }
    }
}

impl<'a, S: ConsoleSink> fmt::Write for Console<'a, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.sink.write_bytes(s.as_bytes());
        Ok(())
    }
}

impl ConsoleSink for drivers::uart0::Uart0 {
    fn write_byte(&mut self, byte: u8) {
        drivers::uart0::Uart0::write_byte(self, byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write as _;

    struct BufSink {
        buf: [u8; 64],
        len: usize,
    }

    impl ConsoleSink for BufSink {
        fn write_byte(&mut self, byte: u8) {
            if self.len < self.buf.len() {
                self.buf[self.len] = byte;
                self.len += 1;
            }
        }
    }

    #[test]
    fn formats_through_sink() {
        let mut sink = BufSink { buf: [0; 64], len: 0 };
        {
            let mut console = Console::new(&mut sink);
            write!(console, "pid={}", 7).unwrap();
        }
        assert_eq!(&sink.buf[..sink.len], b"pid=7");
    }
}
