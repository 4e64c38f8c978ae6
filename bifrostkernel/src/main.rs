#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg_attr(not(target_os = "none"), allow(dead_code))]
mod report;
#[cfg(target_os = "none")]
mod serial;

/// Must match the address in linker.ld and the loader's preferred base.
#[cfg_attr(not(target_os = "none"), allow(dead_code))]
const LINK_BASE: u64 = 0x10_0000;

#[cfg(target_os = "none")]
mod entry {
    use bootinfo::BootInfo;
    use core::fmt::Write;
    use core::panic::PanicInfo;

    use super::LINK_BASE;
    use crate::report::{Verdict, report};
    use crate::serial::{self, Console};

    #[unsafe(no_mangle)]
    #[unsafe(link_section = ".text._start")]
    pub extern "sysv64" fn _start(info: &'static BootInfo) -> ! {
        x86_64::instructions::interrupts::disable();
        unsafe {
            serial::init();
        }
        let _ = writeln!(Console, "[BIFROST] Kernel starts.");

        match report(info, LINK_BASE, &mut Console) {
            Ok(Verdict::Accepted) => {}
            Ok(Verdict::Relocated { .. }) | Err(_) => {
                let _ = writeln!(Console, "[BIFROST] halting.");
            }
        }
        halt()
    }

    fn halt() -> ! {
        loop {
            x86_64::instructions::hlt();
        }
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        let _ = writeln!(Console, "\n*** KERNEL PANIC ***\n{}", info);
        halt()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("bifrostkernel runs on bare metal; build it with --target x86_64-unknown-none");
    std::process::exit(1);
}
