//! COM1, the only output this kernel has.

use core::fmt;
use spin::Mutex;
use uart_16550::SerialPort;

const COM1_BASE: u16 = 0x3F8;

static COM1: Mutex<Option<SerialPort>> = Mutex::new(None);

/// # Safety
/// COM1 must exist at the legacy I/O base and nothing else may drive it.
pub unsafe fn init() {
    let mut port = unsafe { SerialPort::new(COM1_BASE) };
    port.init();
    *COM1.lock() = Some(port);
}

/// `fmt::Write` sink over COM1 with `\n` sent as `\r\n`. Writes before
/// [`init`] are dropped.
pub struct Console;

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut com1 = COM1.lock();
        let Some(port) = com1.as_mut() else {
            return Ok(());
        };
        for b in s.bytes() {
            if b == b'\n' {
                let _ = port.send(b'\r');
            }
            let _ = port.send(b);
        }
        Ok(())
    }
}
