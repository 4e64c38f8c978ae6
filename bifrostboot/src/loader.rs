//! Loading the flat kernel image into physical memory.
//!
//! The image has no header and no relocations. It goes to the preferred base
//! when that range is free; otherwise anywhere the firmware has room, and
//! the caller learns the real address from [`LoadedKernel::base`].

use bootinfo::PAGE_SIZE;
use core::fmt;
use core::slice;
use log::{info, warn};
use uefi::{CStr16, Status};

use crate::firmware::{Firmware, FirmwareFile, OpenFailure, Placement};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoadError {
    NoFilesystem(Status),
    OpenFailed(Status),
    /// Metadata query failed, or reported an empty or unaddressable file.
    InfoFailed(Status),
    AllocFailed(Status),
    ReadFailed(ReadFailure),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReadFailure {
    Firmware(Status),
    Short { expected: usize, read: usize },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFilesystem(s) => write!(f, "no filesystem on boot device ({:?})", s),
            Self::OpenFailed(s) => write!(f, "failed to open kernel image ({:?})", s),
            Self::InfoFailed(s) => write!(f, "failed to get kernel file info ({:?})", s),
            Self::AllocFailed(s) => write!(f, "failed to allocate memory for kernel ({:?})", s),
            Self::ReadFailed(ReadFailure::Firmware(s)) => {
                write!(f, "failed to read kernel ({:?})", s)
            }
            Self::ReadFailed(ReadFailure::Short { expected, read }) => {
                write!(f, "short kernel read: {} of {} bytes", read, expected)
            }
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LoadedKernel {
    /// Physical address of the first byte, which is also the entry point.
    pub base: u64,
    pub size: u64,
    /// The preferred base was occupied and the fallback placement was used.
    pub relocated: bool,
}

#[inline]
pub fn pages_for(bytes: usize) -> usize {
    bytes.div_ceil(PAGE_SIZE as usize)
}

/// Opens `path` on the boot volume and reads it whole into fresh pages.
///
/// The file and the volume root are closed on every path out of here,
/// success or not, because the handle is dropped.
pub fn load_kernel<F: Firmware>(
    fw: &mut F,
    path: &CStr16,
    preferred_base: u64,
) -> Result<LoadedKernel, LoadError> {
    let mut file = fw.open_file(path).map_err(|e| match e {
        OpenFailure::NoFilesystem(s) => LoadError::NoFilesystem(s),
        OpenFailure::Open(s) => LoadError::OpenFailed(s),
    })?;

    let size = file.size().map_err(LoadError::InfoFailed)?;
    let size = usize::try_from(size).map_err(|_| LoadError::InfoFailed(Status::BAD_BUFFER_SIZE))?;
    if size == 0 {
        return Err(LoadError::InfoFailed(Status::END_OF_FILE));
    }
    let pages = pages_for(size);

    let (dst, relocated) = match fw.allocate_pages(Placement::Fixed(preferred_base), pages) {
        Ok(p) => (p, false),
        Err(first) => {
            warn!(
                "preferred kernel base {:#x} unavailable ({:?}), allocating anywhere",
                preferred_base, first
            );
            let p = fw
                .allocate_pages(Placement::Anywhere, pages)
                .map_err(LoadError::AllocFailed)?;
            (p, true)
        }
    };

    // SAFETY: the firmware just handed us `pages` whole pages at `dst`.
    let buf = unsafe { slice::from_raw_parts_mut(dst.as_ptr(), size) };
    let read = file
        .read(buf)
        .map_err(|s| LoadError::ReadFailed(ReadFailure::Firmware(s)))?;
    if read != size {
        return Err(LoadError::ReadFailed(ReadFailure::Short {
            expected: size,
            read,
        }));
    }
    drop(file);

    let base = dst.as_ptr() as u64;
    info!("kernel loaded @ {:#018x} ({} bytes)", base, size);
    Ok(LoadedKernel {
        base,
        size: size as u64,
        relocated,
    })
}
