//! The boot contract.
//!
//! [`BootInfo`] is the only thing that crosses from the boot stage into the
//! kernel. There is no encoding step on either side: the loader fills the
//! structure in place and hands the kernel its physical address, so the field
//! order, widths and padding below are an ABI. The offsets are pinned by the
//! compile-time assertions at the bottom of this file.
#![cfg_attr(not(test), no_std)]

use core::mem::{offset_of, size_of};

/// Number of memory map slots in the contract.
pub const MAX_MEMORY_MAP_ENTRIES: usize = 256;

/// Allocation granule used for region lengths.
pub const PAGE_SIZE: u64 = 4096;

#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MemoryKind {
    /// Free RAM the kernel may take.
    Usable = 1,
    Reserved = 2,
    /// ACPI tables and ACPI NVS.
    Acpi = 3,
    Mmio = 4,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Framebuffer {
    /// Physical address of the linear framebuffer.
    pub base: u64,
    pub width: u32,
    pub height: u32,
    /// Bytes per scanline; may exceed `width * bpp / 8`.
    pub pitch: u32,
    pub bpp: u8,
    pub _pad: [u8; 3],
}

impl Framebuffer {
    pub const EMPTY: Self = Self {
        base: 0,
        width: 0,
        height: 0,
        pitch: 0,
        bpp: 0,
        _pad: [0; 3],
    };

    /// Bytes covered by the visible scanlines.
    pub const fn byte_len(&self) -> u64 {
        self.pitch as u64 * self.height as u64
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryMapEntry {
    pub base: u64,
    /// Length in bytes.
    pub length: u64,
    pub kind: MemoryKind,
    pub _pad: u32,
}

impl MemoryMapEntry {
    pub const EMPTY: Self = Self {
        base: 0,
        length: 0,
        kind: MemoryKind::Reserved,
        _pad: 0,
    };

    pub const fn new(base: u64, length: u64, kind: MemoryKind) -> Self {
        Self {
            base,
            length,
            kind,
            _pad: 0,
        }
    }

    pub const fn end(&self) -> u64 {
        self.base.saturating_add(self.length)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct BootInfo {
    pub framebuffer: Framebuffer,
    pub memory_map: [MemoryMapEntry; MAX_MEMORY_MAP_ENTRIES],
    /// Populated prefix of `memory_map`.
    pub memory_map_count: u32,
    pub _pad: u32,
    /// Physical address of the ACPI RSDP, 0 when the firmware published none.
    pub acpi_rsdp: u64,
    /// Physical address the kernel image was actually loaded at.
    pub kernel_base: u64,
    /// Size of the kernel image in bytes.
    pub kernel_size: u64,
}

impl BootInfo {
    pub const EMPTY: Self = Self {
        framebuffer: Framebuffer::EMPTY,
        memory_map: [MemoryMapEntry::EMPTY; MAX_MEMORY_MAP_ENTRIES],
        memory_map_count: 0,
        _pad: 0,
        acpi_rsdp: 0,
        kernel_base: 0,
        kernel_size: 0,
    };

    /// The populated memory map entries.
    ///
    /// A count larger than the capacity is clamped rather than trusted.
    pub fn memory_regions(&self) -> &[MemoryMapEntry] {
        let n = (self.memory_map_count as usize).min(MAX_MEMORY_MAP_ENTRIES);
        &self.memory_map[..n]
    }

    pub fn rsdp(&self) -> Option<u64> {
        (self.acpi_rsdp != 0).then_some(self.acpi_rsdp)
    }

    pub fn regions_of(&self, kind: MemoryKind) -> impl Iterator<Item = &MemoryMapEntry> {
        self.memory_regions().iter().filter(move |r| r.kind == kind)
    }

    /// Total bytes of [`MemoryKind::Usable`] memory.
    pub fn usable_bytes(&self) -> u64 {
        self.regions_of(MemoryKind::Usable)
            .fold(0u64, |acc, r| acc.saturating_add(r.length))
    }

    /// Was the kernel placed somewhere other than `link_base`?
    pub fn kernel_relocated(&self, link_base: u64) -> bool {
        self.kernel_base != link_base
    }
}

/* ================== ABI ================== */
pub const FRAMEBUFFER_SIZE: usize = 24;
pub const MEMORY_MAP_ENTRY_SIZE: usize = 24;
pub const BOOT_INFO_SIZE: usize = 6200;

pub const OFFSET_MEMORY_MAP: usize = 24;
pub const OFFSET_MEMORY_MAP_COUNT: usize = 6168;
pub const OFFSET_ACPI_RSDP: usize = 6176;
pub const OFFSET_KERNEL_BASE: usize = 6184;
pub const OFFSET_KERNEL_SIZE: usize = 6192;

const _: () = assert!(size_of::<Framebuffer>() == FRAMEBUFFER_SIZE);
const _: () = assert!(size_of::<MemoryMapEntry>() == MEMORY_MAP_ENTRY_SIZE);
const _: () = assert!(size_of::<MemoryKind>() == 4);
const _: () = assert!(size_of::<BootInfo>() == BOOT_INFO_SIZE);
const _: () = assert!(offset_of!(BootInfo, memory_map) == OFFSET_MEMORY_MAP);
const _: () = assert!(offset_of!(BootInfo, memory_map_count) == OFFSET_MEMORY_MAP_COUNT);
const _: () = assert!(offset_of!(BootInfo, acpi_rsdp) == OFFSET_ACPI_RSDP);
const _: () = assert!(offset_of!(BootInfo, kernel_base) == OFFSET_KERNEL_BASE);
const _: () = assert!(offset_of!(BootInfo, kernel_size) == OFFSET_KERNEL_SIZE);
