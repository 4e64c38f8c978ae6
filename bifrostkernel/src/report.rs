//! Reading back what the boot stage handed over.

use bootinfo::{BootInfo, MemoryKind};
use core::fmt::{self, Write};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Verdict {
    Accepted,
    /// The image is not where it was linked; absolute addresses in it are wrong.
    Relocated { loaded_at: u64 },
}

/// Writes a summary of `info` to `out` and decides whether this image can run.
pub fn report(info: &BootInfo, link_base: u64, out: &mut impl Write) -> Result<Verdict, fmt::Error> {
    let fb = &info.framebuffer;
    writeln!(
        out,
        "[BIFROST] framebuffer {:#x} {}x{} pitch {} bpp {} ({} KiB)",
        fb.base,
        fb.width,
        fb.height,
        fb.pitch,
        fb.bpp,
        fb.byte_len() >> 10
    )?;
    match info.rsdp() {
        Some(addr) => writeln!(out, "[BIFROST] rsdp {:#x}", addr)?,
        None => writeln!(out, "[BIFROST] rsdp none")?,
    }
    writeln!(
        out,
        "[BIFROST] {} memory regions ({} acpi, {} mmio), {} KiB usable",
        info.memory_regions().len(),
        info.regions_of(MemoryKind::Acpi).count(),
        info.regions_of(MemoryKind::Mmio).count(),
        info.usable_bytes() >> 10
    )?;
    let top = info
        .regions_of(MemoryKind::Usable)
        .map(|r| r.end())
        .max()
        .unwrap_or(0);
    writeln!(out, "[BIFROST] usable memory ends at {:#x}", top)?;
    writeln!(
        out,
        "[BIFROST] image at {:#x}, {} bytes",
        info.kernel_base, info.kernel_size
    )?;

    if info.kernel_relocated(link_base) {
        writeln!(
            out,
            "[BIFROST] rejected: loaded at {:#x} but linked for {:#x}",
            info.kernel_base, link_base
        )?;
        return Ok(Verdict::Relocated {
            loaded_at: info.kernel_base,
        });
    }
    writeln!(out, "[BIFROST] contract accepted")?;
    Ok(Verdict::Accepted)
}
