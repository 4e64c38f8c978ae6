//! Assembling the [`BootInfo`] handed to the kernel.
//!
//! The builder owns the contract while the boot stage is still gathering
//! facts and gives out a shared `'static` reference once, at [`finish`].
//! Nothing can write to it after that.
//!
//! [`finish`]: BootInfoBuilder::finish

use alloc::boxed::Box;
use bootinfo::{BootInfo, Framebuffer, MAX_MEMORY_MAP_ENTRIES, MemoryMapEntry};

pub struct BootInfoBuilder {
    info: Box<BootInfo>,
}

impl BootInfoBuilder {
    /// Allocates the contract. Must happen before the memory map is taken,
    /// the allocation itself lands in the map.
    pub fn new() -> Self {
        Self {
            info: Box::new(BootInfo::EMPTY),
        }
    }

    pub fn set_framebuffer(&mut self, fb: Framebuffer) {
        self.info.framebuffer = fb;
    }

    pub fn set_acpi_rsdp(&mut self, rsdp: Option<u64>) {
        self.info.acpi_rsdp = rsdp.unwrap_or(0);
    }

    pub fn set_kernel(&mut self, base: u64, size: u64) {
        self.info.kernel_base = base;
        self.info.kernel_size = size;
    }

    pub fn clear_memory_map(&mut self) {
        self.info.memory_map_count = 0;
    }

    /// Appends a region; `false` once the map is full and the entry was dropped.
    pub fn push_region(&mut self, entry: MemoryMapEntry) -> bool {
        let n = self.info.memory_map_count as usize;
        if n >= MAX_MEMORY_MAP_ENTRIES {
            return false;
        }
        self.info.memory_map[n] = entry;
        self.info.memory_map_count += 1;
        true
    }

    pub fn memory_map_len(&self) -> usize {
        self.info.memory_map_count as usize
    }

    #[cfg(test)]
    pub fn peek(&self) -> &BootInfo {
        &self.info
    }

    /// Freezes the contract. The backing allocation is leaked on purpose: it
    /// has to outlive the boot stage.
    pub fn finish(self) -> &'static BootInfo {
        Box::leak(self.info)
    }
}

impl Default for BootInfoBuilder {
    fn default() -> Self {
        Self::new()
    }
}
