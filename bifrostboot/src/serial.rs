/* ================== Serial (QEMU `-serial stdio`) ================== */
//! COM1 output. Unlike the firmware console it keeps working after boot
//! services are gone, so it carries the last lines before the jump.

use core::fmt;
use spin::Mutex;
use uart_16550::SerialPort;

const COM1: u16 = 0x3F8;

static PORT: Mutex<Option<SerialPort>> = Mutex::new(None);

/// Programs the UART once; later calls are no-ops.
pub fn init() {
    let mut slot = PORT.lock();
    if slot.is_some() {
        return;
    }
    // SAFETY: COM1 sits at the legacy base on every machine this runs on and
    // the firmware console does not drive it.
    let mut port = unsafe { SerialPort::new(COM1) };
    port.init();
    *slot = Some(port);
}

/// Borrowed port that sends `\n` as `\r\n`.
pub struct Com1<'a>(&'a mut SerialPort);

impl fmt::Write for Com1<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            if b == b'\n' {
                let _ = self.0.send(b'\r');
            }
            let _ = self.0.send(b);
        }
        Ok(())
    }
}

/// Runs `f` with the port if [`init`] has run.
pub fn with_port<R>(f: impl FnOnce(&mut Com1<'_>) -> R) -> Option<R> {
    let mut slot = PORT.lock();
    slot.as_mut().map(|port| f(&mut Com1(port)))
}
