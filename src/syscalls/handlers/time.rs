//! # Time System Call Handlers
//!
//! Time is measured in timer ticks since boot; the heartbeat period is
//! `TICK_NUM` ticks.

use crate::process::Kernel;
use crate::syscalls::dispatcher::SyscallResult;

/// Ticks since boot.
pub fn sys_gettime<K: Kernel + ?Sized>(kernel: &mut K) -> SyscallResult {
    Ok(kernel.ticks().get() as usize)
}

/// Blocks the caller for `ticks` timer ticks; it is woken by the timer list.
pub fn sys_sleep<K: Kernel + ?Sized>(kernel: &mut K, ticks: u32) -> SyscallResult {
    kernel.sleep(ticks)
}
