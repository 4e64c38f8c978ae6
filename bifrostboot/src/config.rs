use uefi::{CStr16, cstr16};

/// Build-time knobs for a boot.
#[derive(Debug, Clone, Copy)]
pub struct BootConfig {
    /// Kernel image on the boot volume.
    pub kernel_path: &'static CStr16,
    /// Physical address the kernel is linked for.
    pub preferred_load_base: u64,
    /// Spare descriptor slots added to the map buffer.
    pub map_headroom_descriptors: usize,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            kernel_path: cstr16!(r"\EFI\BOOT\kernel.bin"),
            preferred_load_base: 0x10_0000,
            map_headroom_descriptors: 2,
        }
    }
}
