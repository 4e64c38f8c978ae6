//! In-memory stand-in for UEFI boot services.
//!
//! Map keys behave like the real thing: every change to the region list
//! (page or pool allocation, or simulated firmware churn) bumps the key, and
//! an exit call with an old key fails. Calls are logged in order, and any
//! call after a successful exit panics.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::mem::size_of;
use core::ptr::{self, NonNull};
use uefi::boot::MemoryType;
use uefi::mem::memory_map::MemoryDescriptor;
use uefi::{CStr16, Status};

use super::{
    ConfigEntry, Firmware, FirmwareFile, GraphicsMode, MapKey, MapMeta, MapSizing, OpenFailure,
    Placement,
};
use uefi::table::cfg::ACPI2_GUID;

/// Stride real firmware commonly reports, larger than the descriptor struct.
pub const FAKE_DESC_SIZE: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GraphicsMode,
    ConfigurationTables,
    OpenFile,
    FileSize,
    FileRead(usize),
    FileClose,
    AllocatePages(Placement, usize),
    MemoryMapSize,
    AllocateMapBuffer(usize),
    MemoryMap,
    ExitBootServices(MapKey),
}

#[derive(Debug, Copy, Clone)]
pub struct Region {
    pub ty: MemoryType,
    pub phys_start: u64,
    pub pages: u64,
}

impl Region {
    pub fn new(ty: MemoryType, phys_start: u64, pages: u64) -> Self {
        Self {
            ty,
            phys_start,
            pages,
        }
    }
}

type CallLog = Rc<RefCell<Vec<Call>>>;

pub struct FakeFirmware {
    pub graphics: Option<GraphicsMode>,
    pub config_tables: Vec<ConfigEntry>,

    pub filesystem: bool,
    pub kernel: Option<Vec<u8>>,
    pub info_status: Option<Status>,
    pub read_status: Option<Status>,
    pub short_read_by: usize,

    pub fixed_pages_free: bool,
    pub any_pages_free: bool,
    pub pool_free: bool,

    pub regions: Vec<Region>,
    pub desc_size: usize,
    pub map_size_status: Option<Status>,
    /// Descriptors a pool allocation adds to the map.
    pub growth_per_pool_alloc: usize,
    /// Exit calls that find the map changed under them.
    pub stale_key_on_exit: usize,
    /// Map size queries fail with this once an exit call has failed.
    pub map_status_after_failed_exit: Option<Status>,

    key: usize,
    failed_exits: usize,
    exited: Cell<bool>,
    calls: CallLog,
    open: Rc<Cell<usize>>,
}

impl FakeFirmware {
    pub fn new() -> Self {
        Self {
            graphics: Some(GraphicsMode {
                framebuffer_base: 0x8000_0000,
                width: 1024,
                height: 768,
                pixels_per_scanline: 1024,
            }),
            config_tables: vec![ConfigEntry {
                guid: ACPI2_GUID,
                address: 0x7FB7_E014,
            }],
            filesystem: true,
            kernel: Some((0..8192u32).map(|i| i as u8).collect()),
            info_status: None,
            read_status: None,
            short_read_by: 0,
            fixed_pages_free: true,
            any_pages_free: true,
            pool_free: true,
            regions: vec![
                Region::new(MemoryType::CONVENTIONAL, 0, 0x9F),
                Region::new(MemoryType::RESERVED, 0x9_F000, 0x61),
                Region::new(MemoryType::CONVENTIONAL, 0x10_0000, 0x7F00),
                Region::new(MemoryType::BOOT_SERVICES_DATA, 0x800_0000, 0x800),
                Region::new(MemoryType::RUNTIME_SERVICES_CODE, 0x7F00_0000, 0x40),
                Region::new(MemoryType::ACPI_RECLAIM, 0x7FB0_0000, 0x10),
                Region::new(MemoryType::ACPI_NON_VOLATILE, 0x7FC0_0000, 0x20),
                Region::new(MemoryType::MMIO, 0xFEC0_0000, 1),
            ],
            desc_size: FAKE_DESC_SIZE,
            map_size_status: None,
            growth_per_pool_alloc: 1,
            stale_key_on_exit: 0,
            map_status_after_failed_exit: None,
            key: 1,
            failed_exits: 0,
            exited: Cell::new(false),
            calls: Rc::new(RefCell::new(Vec::new())),
            open: Rc::new(Cell::new(0)),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn calls_matching(&self, pred: impl Fn(&Call) -> bool) -> Vec<Call> {
        self.calls.borrow().iter().filter(|c| pred(c)).cloned().collect()
    }

    /// Files opened and not yet closed.
    pub fn open_files(&self) -> usize {
        self.open.get()
    }

    pub fn current_key(&self) -> MapKey {
        MapKey(self.key)
    }

    pub fn has_exited(&self) -> bool {
        self.exited.get()
    }

    fn record(&self, call: Call) {
        assert!(
            !self.exited.get(),
            "{:?} after boot services were exited",
            call
        );
        self.calls.borrow_mut().push(call);
    }

    fn change_map(&mut self, region: Region) {
        self.regions.push(region);
        self.key += 1;
    }

    fn leak_pages(pages: usize) -> NonNull<u8> {
        let mem: &'static mut [u8] = Box::leak(vec![0u8; pages * 4096].into_boxed_slice());
        NonNull::new(mem.as_mut_ptr()).expect("leaked allocation is non-null")
    }
}

impl Default for FakeFirmware {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FakeFile {
    data: Vec<u8>,
    info_status: Option<Status>,
    read_status: Option<Status>,
    short_by: usize,
    calls: CallLog,
    open: Rc<Cell<usize>>,
}

impl FirmwareFile for FakeFile {
    fn size(&mut self) -> Result<u64, Status> {
        self.calls.borrow_mut().push(Call::FileSize);
        match self.info_status {
            Some(s) => Err(s),
            None => Ok(self.data.len() as u64),
        }
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<usize, Status> {
        self.calls.borrow_mut().push(Call::FileRead(dst.len()));
        if let Some(s) = self.read_status {
            return Err(s);
        }
        let n = dst.len().min(self.data.len()).saturating_sub(self.short_by);
        dst[..n].copy_from_slice(&self.data[..n]);
        Ok(n)
    }
}

impl Drop for FakeFile {
    fn drop(&mut self) {
        self.calls.borrow_mut().push(Call::FileClose);
        self.open.set(self.open.get() - 1);
    }
}

impl Firmware for FakeFirmware {
    type File = FakeFile;

    fn graphics_mode(&mut self) -> Result<GraphicsMode, Status> {
        self.record(Call::GraphicsMode);
        self.graphics.ok_or(Status::NOT_FOUND)
    }

    fn configuration_tables(&self) -> Vec<ConfigEntry> {
        self.record(Call::ConfigurationTables);
        self.config_tables.clone()
    }

    fn open_file(&mut self, _path: &CStr16) -> Result<FakeFile, OpenFailure> {
        self.record(Call::OpenFile);
        if !self.filesystem {
            return Err(OpenFailure::NoFilesystem(Status::UNSUPPORTED));
        }
        let data = self.kernel.clone().ok_or(OpenFailure::Open(Status::NOT_FOUND))?;
        self.open.set(self.open.get() + 1);
        Ok(FakeFile {
            data,
            info_status: self.info_status,
            read_status: self.read_status,
            short_by: self.short_read_by,
            calls: Rc::clone(&self.calls),
            open: Rc::clone(&self.open),
        })
    }

    fn allocate_pages(&mut self, placement: Placement, pages: usize) -> Result<NonNull<u8>, Status> {
        self.record(Call::AllocatePages(placement, pages));
        let free = match placement {
            Placement::Fixed(_) => self.fixed_pages_free,
            Placement::Anywhere => self.any_pages_free,
        };
        if !free {
            return Err(match placement {
                Placement::Fixed(_) => Status::NOT_FOUND,
                Placement::Anywhere => Status::OUT_OF_RESOURCES,
            });
        }
        let mem = Self::leak_pages(pages);
        let phys = match placement {
            Placement::Fixed(addr) => addr,
            Placement::Anywhere => mem.as_ptr() as u64,
        };
        self.change_map(Region::new(MemoryType::LOADER_DATA, phys, pages as u64));
        Ok(mem)
    }

    fn memory_map_size(&mut self) -> Result<MapSizing, Status> {
        self.record(Call::MemoryMapSize);
        if let Some(s) = self.map_size_status {
            return Err(s);
        }
        if let Some(s) = self.map_status_after_failed_exit.filter(|_| self.failed_exits > 0) {
            return Err(s);
        }
        Ok(MapSizing {
            map_size: self.regions.len() * self.desc_size,
            desc_size: self.desc_size,
        })
    }

    fn allocate_map_buffer(&mut self, bytes: usize) -> Result<&'static mut [u8], Status> {
        self.record(Call::AllocateMapBuffer(bytes));
        if !self.pool_free {
            return Err(Status::OUT_OF_RESOURCES);
        }
        for _ in 0..self.growth_per_pool_alloc {
            self.change_map(Region::new(MemoryType::LOADER_DATA, 0x4000_0000, 1));
        }
        // pool memory is 8-byte aligned
        let words: &'static mut [u64] = Box::leak(vec![0u64; bytes.div_ceil(8)].into_boxed_slice());
        // SAFETY: `words` spans at least `bytes` bytes and is never freed.
        Ok(unsafe { core::slice::from_raw_parts_mut(words.as_mut_ptr().cast::<u8>(), bytes) })
    }

    fn memory_map(&mut self, buf: &mut [u8]) -> Result<MapMeta, Status> {
        self.record(Call::MemoryMap);
        let needed = self.regions.len() * self.desc_size;
        if buf.len() < needed || self.desc_size < size_of::<MemoryDescriptor>() {
            return Err(Status::BUFFER_TOO_SMALL);
        }
        for (i, r) in self.regions.iter().enumerate() {
            let desc = MemoryDescriptor {
                ty: r.ty,
                phys_start: r.phys_start,
                page_count: r.pages,
                ..MemoryDescriptor::default()
            };
            let at = buf[i * self.desc_size..].as_mut_ptr().cast::<MemoryDescriptor>();
            // SAFETY: bounds checked against `needed` above.
            unsafe { ptr::write_unaligned(at, desc) };
        }
        Ok(MapMeta {
            map_size: needed,
            desc_size: self.desc_size,
            key: MapKey(self.key),
            version: 1,
        })
    }

    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), Status> {
        self.record(Call::ExitBootServices(key));
        if self.stale_key_on_exit > 0 {
            self.stale_key_on_exit -= 1;
            self.change_map(Region::new(MemoryType::BOOT_SERVICES_DATA, 0x5000_0000, 1));
        }
        if key.0 != self.key {
            self.failed_exits += 1;
            return Err(Status::INVALID_PARAMETER);
        }
        self.exited.set(true);
        Ok(())
    }
}
