//! Platform resource discovery: display geometry and the ACPI root pointer.

use bootinfo::Framebuffer;
use core::fmt;
use log::{info, warn};
use uefi::table::cfg::{ACPI_GUID, ACPI2_GUID};
use uefi::{Guid, Status};

use crate::firmware::{ConfigEntry, Firmware};

/// Every mode the boot stage accepts is 32 bits per pixel.
pub const FRAMEBUFFER_BPP: u8 = 32;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DisplayError {
    NotFound(Status),
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(s) => write!(f, "graphics output not available ({:?})", s),
        }
    }
}

/// Where the hardware description came from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HardwareDescription {
    /// ACPI 2.0+ RSDP (XSDT capable).
    Acpi2(u64),
    /// ACPI 1.0 RSDP.
    Acpi1(u64),
}

impl HardwareDescription {
    pub fn address(self) -> u64 {
        match self {
            Self::Acpi2(a) | Self::Acpi1(a) => a,
        }
    }
}

/// Reads the active graphics mode. There is no fallback video path.
pub fn discover_display<F: Firmware>(fw: &mut F) -> Result<Framebuffer, DisplayError> {
    let mode = fw.graphics_mode().map_err(DisplayError::NotFound)?;
    let fb = Framebuffer {
        base: mode.framebuffer_base,
        width: mode.width,
        height: mode.height,
        pitch: mode.pixels_per_scanline * (FRAMEBUFFER_BPP as u32 / 8),
        bpp: FRAMEBUFFER_BPP,
        _pad: [0; 3],
    };
    info!(
        "framebuffer: {}x{} @ {:#018x} (pitch {})",
        fb.width, fb.height, fb.base, fb.pitch
    );
    Ok(fb)
}

/// Looks for the ACPI RSDP in the configuration table.
///
/// An ACPI 2.0 entry wins wherever it sits in the table; the 1.0 entry is
/// used only when no 2.0 entry exists. Absence is not an error.
pub fn discover_hardware_description<F: Firmware>(fw: &F) -> Option<HardwareDescription> {
    let found = find_rsdp(&fw.configuration_tables());
    match found {
        Some(hd) => info!("RSDP found @ {:#018x} ({:?})", hd.address(), hd),
        None => warn!("RSDP not found"),
    }
    found
}

pub fn find_rsdp(tables: &[ConfigEntry]) -> Option<HardwareDescription> {
    let by_guid = |g: Guid| tables.iter().find(|e| e.guid == g).map(|e| e.address);
    by_guid(ACPI2_GUID)
        .map(HardwareDescription::Acpi2)
        .or_else(|| by_guid(ACPI_GUID).map(HardwareDescription::Acpi1))
}
