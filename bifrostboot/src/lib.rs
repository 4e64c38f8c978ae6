//! Bifrost boot stage.
//!
//! Runs inside UEFI, gathers what the kernel needs into a [`bootinfo::BootInfo`],
//! loads a flat kernel image, leaves boot services and jumps. Everything that
//! touches firmware goes through [`firmware::Firmware`] so the sequencing in
//! [`controller`] runs unchanged against `firmware::efi::UefiFirmware` on
//! hardware and against a fake in host tests.
#![cfg_attr(not(test), no_std)]
#![allow(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod config;
pub mod contract;
pub mod controller;
pub mod cpu;
pub mod discovery;
pub mod firmware;
pub mod loader;
pub mod memmap;

#[cfg(target_os = "uefi")]
pub mod logger;
#[cfg(all(target_os = "uefi", target_arch = "x86_64"))]
pub mod serial;

#[cfg(test)]
mod testing;

pub use config::BootConfig;
pub use controller::{BootController, BootError, BootFailure, BootState, Handoff};
