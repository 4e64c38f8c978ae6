//! Memory map collection.
//!
//! The snapshot taken here is the last thing that may touch firmware memory
//! bookkeeping before the exit call: the key it returns goes stale on the
//! next allocation or free. So the buffer is sized with headroom for the map
//! growth its own allocation causes, and it is kept (never freed) so a
//! re-collection after a failed exit can reuse it.

use bootinfo::{MAX_MEMORY_MAP_ENTRIES, MemoryKind, MemoryMapEntry, PAGE_SIZE};
use core::fmt;
use core::mem::size_of;
use log::{debug, info};
use uefi::Status;
use uefi::boot::MemoryType;
use uefi::mem::memory_map::{
    MemoryDescriptor, MemoryMap, MemoryMapKey, MemoryMapMeta, MemoryMapRef,
};

use crate::contract::BootInfoBuilder;
use crate::firmware::{Firmware, MapKey, MapMeta};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MapError {
    QueryFailed(Status),
    AllocFailed(Status),
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueryFailed(s) => write!(f, "memory map query failed ({:?})", s),
            Self::AllocFailed(s) => write!(f, "memory map buffer allocation failed ({:?})", s),
        }
    }
}

/// Result of one collection.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MapSnapshot {
    /// Entries written into the contract.
    pub count: usize,
    /// Descriptors the firmware reported, including any beyond capacity.
    pub reported: usize,
    pub key: MapKey,
    pub version: u32,
}

/// Folds a firmware memory type into the four kinds the kernel cares about.
pub fn classify(ty: MemoryType) -> MemoryKind {
    match ty {
        MemoryType::CONVENTIONAL | MemoryType::BOOT_SERVICES_CODE | MemoryType::BOOT_SERVICES_DATA => {
            MemoryKind::Usable
        }
        MemoryType::ACPI_RECLAIM | MemoryType::ACPI_NON_VOLATILE => MemoryKind::Acpi,
        MemoryType::MMIO | MemoryType::MMIO_PORT_SPACE => MemoryKind::Mmio,
        _ => MemoryKind::Reserved,
    }
}

pub struct MapCollector {
    headroom_descriptors: usize,
    buffer: Option<&'static mut [u8]>,
}

impl MapCollector {
    pub fn new(headroom_descriptors: usize) -> Self {
        Self {
            headroom_descriptors,
            buffer: None,
        }
    }

    /// Queries the map and rewrites the contract's memory map from it.
    ///
    /// The returned key is only good for an exit call made before any other
    /// firmware allocation.
    pub fn collect<F: Firmware>(
        &mut self,
        fw: &mut F,
        contract: &mut BootInfoBuilder,
    ) -> Result<MapSnapshot, MapError> {
        let sizing = fw.memory_map_size().map_err(MapError::QueryFailed)?;

        // Headroom only matters when we allocate; reusing the old buffer
        // does not grow the map.
        let have = self.buffer.as_ref().map_or(0, |b| b.len());
        if have < sizing.map_size {
            let needed = sizing
                .map_size
                .saturating_add(self.headroom_descriptors.saturating_mul(sizing.desc_size));
            debug!("[mmap] allocating {} byte buffer (had {})", needed, have);
            let buf = fw.allocate_map_buffer(needed).map_err(MapError::AllocFailed)?;
            self.buffer = Some(buf);
        }
        let Some(buf) = self.buffer.as_deref_mut() else {
            return Err(MapError::AllocFailed(Status::OUT_OF_RESOURCES));
        };

        let meta = fw.memory_map(buf).map_err(MapError::QueryFailed)?;
        let snapshot = convert(&buf[..meta.map_size.min(buf.len())], &meta, contract)?;
        info!(
            "memory map: {} entries ({} reported, key {:#x}, version {})",
            snapshot.count, snapshot.reported, snapshot.key.0, snapshot.version
        );
        Ok(snapshot)
    }
}

fn convert(
    raw: &[u8],
    meta: &MapMeta,
    contract: &mut BootInfoBuilder,
) -> Result<MapSnapshot, MapError> {
    if meta.desc_size < size_of::<MemoryDescriptor>() {
        return Err(MapError::QueryFailed(Status::INCOMPATIBLE_VERSION));
    }
    // The key stays in `MapMeta`; the view only needs the layout.
    let map = MemoryMapRef::new(
        raw,
        MemoryMapMeta {
            map_size: meta.map_size,
            desc_size: meta.desc_size,
            map_key: MemoryMapKey::default(),
            desc_version: meta.version,
        },
    )
    .map_err(|_| MapError::QueryFailed(Status::BAD_BUFFER_SIZE))?;

    contract.clear_memory_map();
    for desc in map.entries().take(MAX_MEMORY_MAP_ENTRIES) {
        let length = desc.page_count.saturating_mul(PAGE_SIZE);
        contract.push_region(MemoryMapEntry::new(desc.phys_start, length, classify(desc.ty)));
    }

    Ok(MapSnapshot {
        count: contract.memory_map_len(),
        reported: map.len(),
        key: meta.key,
        version: meta.version,
    })
}
