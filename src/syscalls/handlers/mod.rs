//! # System Call Handlers
//!
//! ## Modules
//!
//! - `process`: lifecycle (exit, fork, wait, exec, clone, yield, kill, getpid)
//! - `time`: tick counter and sleep
//! - `memory`: program break and demand-paged mappings
//! - `io`: console output and address-space dump
//!
//! ## Handler Signature
//!
//! Each handler takes the kernel plus its already-decoded arguments:
//! ```ignore
//! fn sys_kill<K: Kernel + ?Sized>(kernel: &mut K, pid: Pid) -> SyscallResult
//! ```

pub mod io;
pub mod memory;
pub mod process;
pub mod time;
