//! `log` backend for the boot stage.
//!
//! Lines go to COM1 and, while boot services are up, to the firmware text
//! console. Nothing here allocates: a log line between map collection and
//! the exit call must not change the memory map.

use core::fmt::Write;
use core::sync::atomic::{AtomicBool, Ordering};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

static CONSOLE: AtomicBool = AtomicBool::new(false);
static LOGGER: BootLogger = BootLogger;

pub struct BootLogger;

impl Log for BootLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        #[cfg(target_arch = "x86_64")]
        crate::serial::with_port(|port| {
            let _ = writeln!(port, "[{}] {}", record.level(), record.args());
        });
        if CONSOLE.load(Ordering::Acquire) {
            uefi::system::with_stdout(|out| {
                let _ = writeln!(out, "[{}] {}", record.level(), record.args());
            });
        }
    }

    fn flush(&self) {}
}

pub fn init() -> Result<(), SetLoggerError> {
    #[cfg(target_arch = "x86_64")]
    crate::serial::init();
    CONSOLE.store(true, Ordering::Release);
    log::set_logger(&LOGGER)?;
    log::set_max_level(if cfg!(feature = "verbose-log") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    Ok(())
}

/// Stops console output for good. Called right before the first exit
/// attempt; after that only serial is safe.
pub fn detach_console() {
    CONSOLE.store(false, Ordering::Release);
}
