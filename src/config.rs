//! # Kernel Configuration
//!
//! Compile-time knobs shared by the trap path and the memory manager.
//!
//! | Constant                  | Meaning                                        |
//! |---------------------------|------------------------------------------------|
//! | `TICK_NUM`                | Timer ticks between heartbeat log lines        |
//! | `REGION_INDEX_THRESHOLD`  | Region count at which the tree index is built  |
//! | `USER_BASE..USER_TOP`     | Window user regions must live in               |
//! | `KERNEL_STACK_SIZE`       | Boot kernel stack referenced by the TSS        |
//!
//! Feature flags (`Cargo.toml`):
//! - `trace-syscall`: log every system call at trace level

use log::LevelFilter;

pub const LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Heartbeat modulus for the timer vector.
pub const TICK_NUM: u64 = 100;

/// Below this many regions a linear scan of the sorted list beats keeping a
/// tree index up to date.
pub const REGION_INDEX_THRESHOLD: usize = 32;

pub const PAGE_SIZE: u64 = 4096;

pub const USER_BASE: u64 = 0x0000_0000_0020_0000;
/// Exclusive; kept one 64 KiB block short of the canonical hole so every
/// address up to and including it is a valid `VirtAddr`.
pub const USER_TOP: u64 = 0x0000_7fff_ffff_0000;

pub const KERNEL_STACK_PAGES: usize = 4;
pub const KERNEL_STACK_SIZE: usize = KERNEL_STACK_PAGES * PAGE_SIZE as usize;

pub const KERNEL_HEAP_SIZE: usize = 4 * 1024 * 1024;

#[inline]
pub const fn page_round_up(addr: u64) -> u64 {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}
