//! The boot sequence.
//!
//! ```text
//! Init -> Discovered -> KernelLoaded -> MapCollected -> Exited -> Jumped
//!   \________\______________\______________\_____________-> Failed
//! ```
//!
//! The order is fixed by the map key: collection must be the last firmware
//! step before the exit call. Once the exit call succeeds the firmware port
//! is never touched again; [`Handoff`] does not even hold it.

use bootinfo::BootInfo;
use core::fmt;
use log::{debug, error, info, warn};
use uefi::Status;

use crate::config::BootConfig;
use crate::contract::BootInfoBuilder;
use crate::cpu;
use crate::discovery::{
    DisplayError, HardwareDescription, discover_display, discover_hardware_description,
};
use crate::firmware::Firmware;
use crate::loader::{LoadError, load_kernel};
use crate::memmap::{MapCollector, MapError};

/// Exit calls per boot: the first one and a single retry after re-collecting
/// the map.
pub const EXIT_ATTEMPTS: usize = 2;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BootState {
    Init,
    Discovered,
    KernelLoaded,
    MapCollected,
    Exited,
    Jumped,
    Failed,
}

impl BootState {
    /// The next state on the success path; `None` for terminal states.
    pub fn successor(self) -> Option<BootState> {
        match self {
            Self::Init => Some(Self::Discovered),
            Self::Discovered => Some(Self::KernelLoaded),
            Self::KernelLoaded => Some(Self::MapCollected),
            Self::MapCollected => Some(Self::Exited),
            Self::Exited => Some(Self::Jumped),
            Self::Jumped | Self::Failed => None,
        }
    }

    /// Any boot service may still be called after failing in this state.
    ///
    /// A failure at `MapCollected` always follows a failed exit call, after
    /// which only the map query and the exit call itself are allowed.
    pub fn boot_services_unrestricted(self) -> bool {
        matches!(self, Self::Init | Self::Discovered | Self::KernelLoaded)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BootError {
    Display(DisplayError),
    Load(LoadError),
    Map(MapError),
    /// The exit call failed on the retry too.
    ExitFailed(Status),
}

impl From<DisplayError> for BootError {
    fn from(e: DisplayError) -> Self {
        Self::Display(e)
    }
}

impl From<LoadError> for BootError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

impl From<MapError> for BootError {
    fn from(e: MapError) -> Self {
        Self::Map(e)
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Display(e) => e.fmt(f),
            Self::Load(e) => e.fmt(f),
            Self::Map(e) => e.fmt(f),
            Self::ExitFailed(s) => write!(f, "exit boot services failed after retry ({:?})", s),
        }
    }
}

/// A failed boot: the last state reached and what stopped it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootFailure {
    pub reached: BootState,
    pub error: BootError,
}

impl fmt::Display for BootFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {:?})", self.error, self.reached)
    }
}

/// Boot services are gone; all that is left is the jump.
#[derive(Debug)]
pub struct Handoff {
    info: &'static BootInfo,
    entry: u64,
}

impl Handoff {
    pub fn entry_point(&self) -> u64 {
        self.entry
    }

    #[cfg(test)]
    pub fn boot_info(&self) -> &'static BootInfo {
        self.info
    }

    /// Calls the kernel with the contract's address as its only argument.
    ///
    /// # Safety
    /// `entry_point` must hold executable kernel code expecting a
    /// `*const BootInfo`, and boot services must already be exited.
    pub unsafe fn jump(self) -> ! {
        debug!("[state] {:?} -> {:?}", BootState::Exited, BootState::Jumped);
        cpu::disable_interrupts();
        enter_kernel(self.entry, self.info);
        // the kernel is not supposed to come back
        cpu::halt()
    }
}

#[cfg(target_arch = "x86_64")]
type KernelEntry = unsafe extern "sysv64" fn(*const BootInfo);
#[cfg(not(target_arch = "x86_64"))]
type KernelEntry = unsafe extern "C" fn(*const BootInfo);

#[inline(never)]
unsafe fn enter_kernel(entry: u64, info: *const BootInfo) {
    let entry: KernelEntry = core::mem::transmute(entry as usize);
    entry(info);
}

pub struct BootController<'fw, F: Firmware> {
    fw: &'fw mut F,
    config: BootConfig,
    state: BootState,
}

impl<'fw, F: Firmware> BootController<'fw, F> {
    pub fn new(fw: &'fw mut F, config: BootConfig) -> Self {
        Self {
            fw,
            config,
            state: BootState::Init,
        }
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    /// Runs the sequence up to and including the exit call.
    pub fn run(mut self) -> Result<Handoff, BootFailure> {
        match self.drive() {
            Ok(handoff) => Ok(handoff),
            Err(error) => {
                let reached = self.state;
                self.state = BootState::Failed;
                error!("[fatal] {} (after {:?})", error, reached);
                Err(BootFailure { reached, error })
            }
        }
    }

    fn advance(&mut self, next: BootState) {
        debug_assert_eq!(self.state.successor(), Some(next));
        debug!("[state] {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn drive(&mut self) -> Result<Handoff, BootError> {
        let mut contract = BootInfoBuilder::new();

        // ---- discovery ----
        let fb = discover_display(&mut *self.fw)?;
        contract.set_framebuffer(fb);
        let hd = discover_hardware_description(&*self.fw);
        contract.set_acpi_rsdp(hd.map(HardwareDescription::address));
        self.advance(BootState::Discovered);

        // ---- kernel image ----
        let kernel = load_kernel(
            &mut *self.fw,
            self.config.kernel_path,
            self.config.preferred_load_base,
        )?;
        if kernel.relocated {
            warn!(
                "kernel placed at {:#x} instead of {:#x}; a position-dependent image will refuse to run",
                kernel.base, self.config.preferred_load_base
            );
        }
        contract.set_kernel(kernel.base, kernel.size);
        self.advance(BootState::KernelLoaded);

        // ---- memory map: last firmware step before exit ----
        let mut collector = MapCollector::new(self.config.map_headroom_descriptors);
        let mut snapshot = collector.collect(&mut *self.fw, &mut contract)?;
        self.advance(BootState::MapCollected);

        info!("exiting boot services");
        let mut attempt = 1;
        loop {
            match self.fw.exit_boot_services(snapshot.key) {
                Ok(()) => break,
                Err(status) if attempt < EXIT_ATTEMPTS => {
                    warn!(
                        "exit boot services failed ({:?}), re-collecting memory map",
                        status
                    );
                    snapshot = collector.collect(&mut *self.fw, &mut contract)?;
                    attempt += 1;
                }
                Err(status) => return Err(BootError::ExitFailed(status)),
            }
        }
        self.advance(BootState::Exited);

        Ok(Handoff {
            info: contract.finish(),
            entry: kernel.base,
        })
    }
}
