//! # Console System Call Handlers
//!
//! - `sys_putc`: one byte to the kernel console
//! - `sys_pgdir`: log the caller's regions and resident pages

use crate::process::Kernel;
use crate::syscalls::dispatcher::{SyscallError, SyscallResult};

pub fn sys_putc<K: Kernel + ?Sized>(kernel: &mut K, byte: u8) -> SyscallResult {
    kernel.console_putc(byte);
    Ok(0)
}

pub fn sys_pgdir<K: Kernel + ?Sized>(kernel: &mut K) -> SyscallResult {
    let process = kernel.current().ok_or(SyscallError::NoProcess)?;
    match process.address_space() {
        Some(mm) => mm.dump(),
        None => log::info!("kernel thread: no user address space"),
    }
    Ok(0)
}
