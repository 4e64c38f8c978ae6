//! [`Firmware`] on top of real UEFI boot services.
//!
//! Most calls go through the `uefi` crate's safe wrappers. The memory map
//! query and the exit call use the raw boot services table: the wrappers size
//! and own their buffers and retry the exit internally, while the boot stage
//! needs the raw key and control over the single retry.

use alloc::vec::Vec;
use core::ptr::{self, NonNull};
use core::slice;
use uefi::boot::{self, AllocateType, MemoryType, OpenProtocolAttributes, OpenProtocolParams};
use uefi::proto::console::gop::GraphicsOutput;
use uefi::proto::media::file::{Directory, File, FileAttribute, FileInfo, FileMode, RegularFile};
use uefi::{CStr16, Handle, Status};

use super::{
    ConfigEntry, Firmware, FirmwareFile, GraphicsMode, MapKey, MapMeta, MapSizing, OpenFailure,
    Placement,
};

pub struct UefiFirmware {
    image: Handle,
}

impl UefiFirmware {
    /// # Safety
    /// Boot services must be active, and only one instance may exist.
    pub unsafe fn new(image: Handle) -> Self {
        Self { image }
    }
}

/// Kernel file plus the volume root it was opened from. Field order is drop
/// order: the file closes first, then the root.
pub struct UefiFile {
    file: RegularFile,
    _root: Directory,
}

impl FirmwareFile for UefiFile {
    fn size(&mut self) -> Result<u64, Status> {
        let info = self
            .file
            .get_boxed_info::<FileInfo>()
            .map_err(|e| e.status())?;
        Ok(info.file_size())
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<usize, Status> {
        self.file.read(dst).map_err(|e| e.status())
    }
}

/// The raw boot services table, for the calls the safe wrappers do not fit.
macro_rules! raw_boot_services {
    () => {{
        let st = uefi::table::system_table_raw().ok_or(Status::NOT_READY)?;
        // SAFETY: the system table and its boot services table stay valid
        // until exit_boot_services succeeds, after which this port is unused.
        unsafe { st.as_ref().boot_services.as_ref() }.ok_or(Status::NOT_READY)?
    }};
}

impl Firmware for UefiFirmware {
    type File = UefiFile;

    fn graphics_mode(&mut self) -> Result<GraphicsMode, Status> {
        let handle = boot::get_handle_for_protocol::<GraphicsOutput>().map_err(|e| e.status())?;
        // Non-exclusive: an exclusive open would disconnect the text console.
        let mut gop = unsafe {
            boot::open_protocol::<GraphicsOutput>(
                OpenProtocolParams {
                    handle,
                    agent: self.image,
                    controller: None,
                },
                OpenProtocolAttributes::GetProtocol,
            )
        }
        .map_err(|e| e.status())?;

        let info = gop.current_mode_info();
        let (width, height) = info.resolution();
        let stride = info.stride();
        let base = gop.frame_buffer().as_mut_ptr() as u64;
        Ok(GraphicsMode {
            framebuffer_base: base,
            width: width as u32,
            height: height as u32,
            pixels_per_scanline: stride as u32,
        })
    }

    fn configuration_tables(&self) -> Vec<ConfigEntry> {
        uefi::system::with_config_table(|entries| {
            entries
                .iter()
                .map(|e| ConfigEntry {
                    guid: e.guid,
                    address: e.address as u64,
                })
                .collect()
        })
    }

    fn open_file(&mut self, path: &CStr16) -> Result<UefiFile, OpenFailure> {
        let mut sfs = boot::get_image_file_system(self.image)
            .map_err(|e| OpenFailure::NoFilesystem(e.status()))?;
        let mut root = sfs
            .open_volume()
            .map_err(|e| OpenFailure::NoFilesystem(e.status()))?;
        let file = root
            .open(path, FileMode::Read, FileAttribute::empty())
            .map_err(|e| OpenFailure::Open(e.status()))?
            .into_regular_file()
            .ok_or(OpenFailure::Open(Status::INVALID_PARAMETER))?;
        Ok(UefiFile { file, _root: root })
    }

    fn allocate_pages(&mut self, placement: Placement, pages: usize) -> Result<NonNull<u8>, Status> {
        let ty = match placement {
            Placement::Fixed(addr) => AllocateType::Address(addr),
            Placement::Anywhere => AllocateType::AnyPages,
        };
        boot::allocate_pages(ty, MemoryType::LOADER_DATA, pages).map_err(|e| e.status())
    }

    fn memory_map_size(&mut self) -> Result<MapSizing, Status> {
        let bs = raw_boot_services!();
        let mut map_size = 0usize;
        let mut key = 0usize;
        let mut desc_size = 0usize;
        let mut version = 0u32;
        let status = unsafe {
            (bs.get_memory_map)(
                &mut map_size,
                ptr::null_mut(),
                &mut key,
                &mut desc_size,
                &mut version,
            )
        };
        if status != Status::BUFFER_TOO_SMALL && status.is_error() {
            return Err(status);
        }
        Ok(MapSizing {
            map_size,
            desc_size,
        })
    }

    fn allocate_map_buffer(&mut self, bytes: usize) -> Result<&'static mut [u8], Status> {
        let p = boot::allocate_pool(MemoryType::LOADER_DATA, bytes).map_err(|e| e.status())?;
        // SAFETY: fresh pool allocation of `bytes`, never freed.
        Ok(unsafe { slice::from_raw_parts_mut(p.as_ptr(), bytes) })
    }

    fn memory_map(&mut self, buf: &mut [u8]) -> Result<MapMeta, Status> {
        let bs = raw_boot_services!();
        let mut map_size = buf.len();
        let mut key = 0usize;
        let mut desc_size = 0usize;
        let mut version = 0u32;
        let status = unsafe {
            (bs.get_memory_map)(
                &mut map_size,
                buf.as_mut_ptr().cast(),
                &mut key,
                &mut desc_size,
                &mut version,
            )
        };
        if status.is_error() {
            return Err(status);
        }
        Ok(MapMeta {
            map_size,
            desc_size,
            key: MapKey(key),
            version,
        })
    }

    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), Status> {
        crate::logger::detach_console();
        let bs = raw_boot_services!();
        let status = unsafe { (bs.exit_boot_services)(self.image.as_ptr(), key.0) };
        if status.is_error() {
            return Err(status);
        }
        Ok(())
    }
}
