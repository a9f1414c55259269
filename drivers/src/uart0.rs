#![allow(dead_code)]

/// # UART0 Console Driver
///
/// Minimal polling USART2 driver used as the kernel's console sink: fault
/// handlers and the `ps`/`ipcs`/shell SVCs write ASCII through it. Transmit
/// is non-blocking from the caller's point of view — `write_byte` spins on
/// the transmit-data-register-empty flag, which is acceptable because it is
/// only ever called from already-privileged fault/SVC context, never from
/// a time-critical ISR.
use crate::read_write::{reg_read_bit_value, reg_write_bit, reg_write_value};
use crate::stm32f407_registers::USART2_BASE;

const USART_SR_OFFSET: u32 = 0x00;
const USART_DR_OFFSET: u32 = 0x04;
const USART_BRR_OFFSET: u32 = 0x08;
const USART_CR1_OFFSET: u32 = 0x0C;

const USART_SR_RXNE_BIT: u32 = 5;
const USART_SR_TXE_BIT: u32 = 7;
const USART_CR1_UE_BIT: u32 = 13;
const USART_CR1_TE_BIT: u32 = 3;
const USART_CR1_RE_BIT: u32 = 2;

/// Function name: reg
///
/// Description:
/// Computes the address of a USART2 register from its byte offset.
///
/// # Parameters
/// - `offset`: Byte offset from `USART2_BASE`.
///
/// # Return
/// - A raw pointer to the register.
fn reg(offset: u32) -> *mut u32 {
    (USART2_BASE + offset) as *mut u32
}

/// UART0 console handle. Zero-sized; all state lives in the peripheral, so
/// it is freely `Copy` — a second handle is just another name for the same
/// USART2 registers, not a second piece of hardware.
#[derive(Copy, Clone)]
pub struct Uart0;

impl Uart0 {
    /// Function name: init
    ///
    /// Description:
    /// Enables USART2 with the given baud rate, assuming `pclk_hz` is the
    /// peripheral clock feeding it. Only transmit and receive are enabled;
    /// no flow control, no interrupts.
    ///
    /// # Safety
    /// Caller must ensure USART2's GPIO alternate-function pins are already
    /// configured and the peripheral clock is enabled in RCC.
    ///
    /// # Parameters
    /// - `baud`: Desired baud rate in bits per second.
    /// - `pclk_hz`: Peripheral clock frequency feeding USART2.
    ///
    /// # Return
    /// - A `Uart0` handle.
    pub unsafe fn init(baud: u32, pclk_hz: u32) -> Self {
        unsafe {
            let brr = pclk_hz / baud;
            reg_write_value(reg(USART_BRR_OFFSET), brr);
            reg_write_bit(reg(USART_CR1_OFFSET), USART_CR1_TE_BIT, true);
            reg_write_bit(reg(USART_CR1_OFFSET), USART_CR1_RE_BIT, true);
            reg_write_bit(reg(USART_CR1_OFFSET), USART_CR1_UE_BIT, true);
        }
        Uart0
    }
}

impl Uart0 {
    /// Function name: write_byte
    ///
    /// Description:
    /// Spins until the transmit data register is empty, then writes one
    /// byte to USART2_DR. Public so callers outside the kernel crate (e.g.
    /// a `ConsoleSink` impl) can drive it without reaching into registers
    /// themselves.
    ///
    /// # Parameters
    /// - `byte`: The byte to transmit.
    ///
    /// # Return
    /// - None
    pub fn write_byte(&mut self, byte: u8) {
        unsafe {
            while !reg_read_bit_value(reg(USART_SR_OFFSET), USART_SR_TXE_BIT) {}
            reg_write_value(reg(USART_DR_OFFSET), byte as u32);
        }
    }

    /// Function name: kbhit
    ///
    /// Description:
    /// Non-blocking check for a received byte waiting in USART2_DR,
    /// mirroring the C original's `kbhitUart0`.
    ///
    /// # Return
    /// - `true` if a byte is available to read.
    pub fn kbhit(&self) -> bool {
        unsafe { reg_read_bit_value(reg(USART_SR_OFFSET), USART_SR_RXNE_BIT) }
    }

    /// Function name: read_byte
    ///
    /// Description:
    /// Spins until the receive-data-register-not-empty flag is set, then
    /// returns the received byte.
    ///
    /// # Return
    /// - The received byte.
    pub fn read_byte(&mut self) -> u8 {
        unsafe {
            while !reg_read_bit_value(reg(USART_SR_OFFSET), USART_SR_RXNE_BIT) {}
            core::ptr::read_volatile(reg(USART_DR_OFFSET)) as u8
        }
    }

    /// Writes an ASCII string byte-by-byte, matching `putsUart0`.
    pub fn puts(&mut self, s: &str) {
        for b in s.as_bytes() {
            self.write_byte(*b);
        }
    }
}
