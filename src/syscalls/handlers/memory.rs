//! # Memory System Call Handlers
//!
//! All calls act on the caller's address space and only change regions;
//! pages arrive later through demand paging.
//!
//! | Call     | Arguments             | Returns                 |
//! |----------|-----------------------|-------------------------|
//! | brk      | new break (0 queries) | current break           |
//! | mmap     | hint, len, flags      | start of the new region |
//! | munmap   | addr, len             | 0                       |
//! | shmem    | hint, len, flags      | start of the new region |
//!
//! `flags` uses the region bits (read 1, write 2, exec 4); read access is
//! always granted.
//!
//! `brk`, `mmap` and `shmem` hand the address back in `rax`. They do not
//! write it through an out-pointer in the first argument, so user stubs
//! that pass a `*_store` pointer there must read `rax` instead.

use x86_64::VirtAddr;

use crate::config::{page_round_up, PAGE_SIZE, USER_BASE, USER_TOP};
use crate::memory::mm::AddressSpace;
use crate::memory::vma::VmFlags;
use crate::process::Kernel;
use crate::syscalls::dispatcher::{SyscallError, SyscallResult};

fn with_space<K, F>(kernel: &mut K, op: F) -> SyscallResult
where
    K: Kernel + ?Sized,
    F: FnOnce(&mut AddressSpace) -> SyscallResult,
{
    let process = kernel.current().ok_or(SyscallError::NoProcess)?;
    let mm = process.address_space().ok_or(SyscallError::InvalidArgument)?;
    op(mm)
}

fn user_addr(addr: u64) -> Result<VirtAddr, SyscallError> {
    if addr >= USER_TOP {
        return Err(SyscallError::InvalidArgument);
    }
    Ok(VirtAddr::new(addr))
}

fn map_flags(raw: u32) -> Result<VmFlags, SyscallError> {
    let flags = VmFlags::from_bits(raw).ok_or(SyscallError::InvalidArgument)?;
    Ok((flags - VmFlags::SHARE) | VmFlags::READ)
}

pub fn sys_brk<K: Kernel + ?Sized>(kernel: &mut K, addr: u64) -> SyscallResult {
    with_space(kernel, |mm| {
        if addr == 0 {
            return Ok(mm.heap_bounds().1.as_u64() as usize);
        }
        let brk = mm.brk(user_addr(addr)?)?;
        Ok(brk.as_u64() as usize)
    })
}

fn map<K: Kernel + ?Sized>(kernel: &mut K, hint: u64, len: u64, flags: VmFlags) -> SyscallResult {
    let hint = match hint {
        0 => None,
        addr => Some(user_addr(addr)?),
    };
    with_space(kernel, |mm| {
        let start = mm.map(hint, len, flags)?;
        Ok(start.as_u64() as usize)
    })
}

pub fn sys_mmap<K: Kernel + ?Sized>(kernel: &mut K, hint: u64, len: u64, flags: u32) -> SyscallResult {
    map(kernel, hint, len, map_flags(flags)?)
}

pub fn sys_shmem<K: Kernel + ?Sized>(kernel: &mut K, hint: u64, len: u64, flags: u32) -> SyscallResult {
    map(kernel, hint, len, map_flags(flags)? | VmFlags::SHARE)
}

pub fn sys_munmap<K: Kernel + ?Sized>(kernel: &mut K, addr: u64, len: u64) -> SyscallResult {
    if len == 0 || len > USER_TOP || addr >= USER_TOP {
        return Err(SyscallError::InvalidArgument);
    }
    let start = addr & !(PAGE_SIZE - 1);
    let end = page_round_up(addr + len);
    if start < USER_BASE || end > USER_TOP {
        return Err(SyscallError::InvalidArgument);
    }
    with_space(kernel, |mm| {
        mm.unmap_range(VirtAddr::new(start), VirtAddr::new(end))?;
        Ok(0)
    })
}
