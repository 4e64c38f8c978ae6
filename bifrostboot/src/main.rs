#![cfg_attr(target_os = "uefi", no_std)]
#![cfg_attr(target_os = "uefi", no_main)]

#[cfg(target_os = "uefi")]
use bifrostboot::{
    BootConfig, BootController, BootFailure, cpu, firmware::efi::UefiFirmware, logger,
};
#[cfg(target_os = "uefi")]
use log::{error, info};
#[cfg(target_os = "uefi")]
use uefi::{boot, prelude::*};

#[cfg(target_os = "uefi")]
#[global_allocator]
static ALLOCATOR: uefi::allocator::Allocator = uefi::allocator::Allocator;

#[cfg(target_os = "uefi")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    error!("[panic] {}", info);
    cpu::halt()
}

/* =================================== Entry =================================== */
#[cfg(target_os = "uefi")]
#[entry]
fn main() -> Status {
    let _ = uefi::system::with_stdout(|out| out.clear());
    if logger::init().is_err() {
        cpu::halt();
    }
    info!("=== Bifrost boot ===");

    let mut fw = unsafe { UefiFirmware::new(boot::image_handle()) };
    match BootController::new(&mut fw, BootConfig::default()).run() {
        Ok(handoff) => {
            info!("jumping to kernel @ {:#x}", handoff.entry_point());
            unsafe { handoff.jump() }
        }
        Err(failure) => die(&failure),
    }
}

#[cfg(target_os = "uefi")]
#[cold]
fn die(failure: &BootFailure) -> ! {
    // Leave the message on screen a moment; after a failed exit call even
    // the stall service is off limits.
    if failure.reached.boot_services_unrestricted() {
        boot::stall(1_000_000);
    }
    cpu::halt()
}

#[cfg(not(target_os = "uefi"))]
fn main() {
    eprintln!("bifrostboot is a UEFI application; build it with --target x86_64-unknown-uefi");
    std::process::exit(1);
}
