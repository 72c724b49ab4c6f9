//! Privilege transitions and virtual memory for a small x86_64 kernel.
//!
//! The hardware-facing pieces (table loads, entry stubs, PIC, control
//! registers) only exist on the bare-metal target. Everything else runs
//! against the [`process::Kernel`] and [`memory::paging::PageTable`] seams
//! and is tested on the host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod drivers;
pub mod interrupts;
pub mod kernel;
pub mod memory;
pub mod process;
pub mod syscalls;

#[cfg(test)]
mod testutil;
