use crate::interrupts::trapframe::TrapFrame;
use crate::process::{Kernel, Pid};
use crate::syscalls::dispatcher::{SyscallError, SyscallResult};

pub fn sys_exit<K: Kernel + ?Sized>(kernel: &mut K, status: i32) -> SyscallResult {
    kernel.exit(status)
}

/// The child resumes on the parent's interrupted user stack.
pub fn sys_fork<K: Kernel + ?Sized>(kernel: &mut K, tf: &TrapFrame) -> SyscallResult {
    kernel.fork(0, tf.rsp, tf)
}

pub fn sys_wait<K: Kernel + ?Sized>(kernel: &mut K, pid: Pid, status_store: u64) -> SyscallResult {
    kernel.wait(pid, status_store)
}

pub fn sys_exec<K: Kernel + ?Sized>(
    kernel: &mut K,
    name: u64,
    len: u64,
    binary: u64,
    size: u64,
) -> SyscallResult {
    if name == 0 || binary == 0 {
        return Err(SyscallError::InvalidArgument);
    }
    kernel.exec(name, len, binary, size)
}

/// A zero `stack` shares the caller's interrupted stack.
pub fn sys_clone<K: Kernel + ?Sized>(
    kernel: &mut K,
    clone_flags: u32,
    stack: u64,
    tf: &TrapFrame,
) -> SyscallResult {
    let stack = if stack == 0 { tf.rsp } else { stack };
    kernel.fork(clone_flags, stack, tf)
}

pub fn sys_exit_thread<K: Kernel + ?Sized>(kernel: &mut K, status: i32) -> SyscallResult {
    kernel.exit_thread(status)
}

pub fn sys_yield<K: Kernel + ?Sized>(kernel: &mut K) -> SyscallResult {
    kernel.yield_now()
}

pub fn sys_kill<K: Kernel + ?Sized>(kernel: &mut K, pid: Pid) -> SyscallResult {
    kernel.kill(pid)
}

pub fn sys_getpid<K: Kernel + ?Sized>(kernel: &mut K) -> SyscallResult {
    let process = kernel.current().ok_or(SyscallError::NoProcess)?;
    Ok(process.pid() as usize)
}
