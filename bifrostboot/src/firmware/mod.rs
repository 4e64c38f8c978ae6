//! The firmware services port.
//!
//! Every firmware interaction the boot stage performs is a method here. The
//! real adapter is `efi::UefiFirmware`; tests drive the same controller
//! with `fake::FakeFirmware`.

use alloc::vec::Vec;
use core::ptr::NonNull;
use uefi::{CStr16, Guid, Status};

#[cfg(test)]
pub mod fake;
#[cfg(target_os = "uefi")]
pub mod efi;

/// Geometry of the active graphics mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct GraphicsMode {
    pub framebuffer_base: u64,
    pub width: u32,
    pub height: u32,
    pub pixels_per_scanline: u32,
}

/// One entry of the system table's configuration table list.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ConfigEntry {
    pub guid: Guid,
    pub address: u64,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Placement {
    /// Exactly this physical address.
    Fixed(u64),
    Anywhere,
}

/// Answer to a memory map query made with no buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MapSizing {
    pub map_size: usize,
    pub desc_size: usize,
}

/// What a filled memory map query reports besides the descriptors.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MapMeta {
    /// Bytes of the buffer actually written.
    pub map_size: usize,
    pub desc_size: usize,
    pub key: MapKey,
    pub version: u32,
}

/// Token tying an exit call to one memory map snapshot.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MapKey(pub usize);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OpenFailure {
    /// No simple file system on the boot device, or its root would not open.
    NoFilesystem(Status),
    /// The path did not open as a regular file.
    Open(Status),
}

/// An open kernel file. Dropping it closes the file and the volume root.
pub trait FirmwareFile {
    fn size(&mut self) -> Result<u64, Status>;

    /// One read into `dst`; returns the bytes transferred.
    fn read(&mut self, dst: &mut [u8]) -> Result<usize, Status>;
}

/// Boot-services-backed operations. None of these may be called once
/// [`Firmware::exit_boot_services`] has succeeded.
pub trait Firmware {
    type File: FirmwareFile;

    fn graphics_mode(&mut self) -> Result<GraphicsMode, Status>;

    fn configuration_tables(&self) -> Vec<ConfigEntry>;

    fn open_file(&mut self, path: &CStr16) -> Result<Self::File, OpenFailure>;

    fn allocate_pages(&mut self, placement: Placement, pages: usize) -> Result<NonNull<u8>, Status>;

    fn memory_map_size(&mut self) -> Result<MapSizing, Status>;

    /// Pool memory for the descriptor buffer. It is never handed back, the
    /// free itself would change the map.
    fn allocate_map_buffer(&mut self, bytes: usize) -> Result<&'static mut [u8], Status>;

    fn memory_map(&mut self, buf: &mut [u8]) -> Result<MapMeta, Status>;

    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), Status>;
}
