//! # Process and Kernel Services
//!
//! The trap path does not own processes, the scheduler, or devices. It
//! reaches them through the two traits below, which the kernel binary
//! implements for the real machine and the tests implement with mocks.

use core::ptr::NonNull;

use x86_64::VirtAddr;

use crate::interrupts::timer::Ticks;
use crate::interrupts::trapframe::TrapFrame;
use crate::memory::mm::AddressSpace;
use crate::syscalls::dispatcher::SyscallResult;

pub type Pid = i32;

/// Exit status of a process terminated by the kernel.
pub const KILLED_STATUS: i32 = -9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDevice {
    Serial,
    Keyboard,
}

pub trait Process {
    fn pid(&self) -> Pid;

    fn name(&self) -> &str;

    /// Frame of the trap currently being handled on this process's behalf,
    /// if any.
    fn trap_frame(&self) -> Option<NonNull<TrapFrame>>;

    fn set_trap_frame(&mut self, tf: Option<NonNull<TrapFrame>>);

    fn need_resched(&self) -> bool;

    fn is_killed(&self) -> bool;

    /// `None` for kernel threads.
    fn address_space(&mut self) -> Option<&mut AddressSpace>;
}

pub trait Kernel {
    /// The process the trap interrupted, or `None` before the first process
    /// runs.
    fn current(&mut self) -> Option<&mut dyn Process>;

    fn ticks(&self) -> &Ticks;

    /// Linear address that caused the last page fault (CR2).
    fn fault_address(&self) -> VirtAddr;

    fn end_of_interrupt(&mut self, vector: u8);

    fn read_input(&mut self, device: InputDevice) -> Option<u8>;

    fn stdin_write(&mut self, byte: u8);

    fn console_putc(&mut self, byte: u8);

    /// Expires sleeping timers. The only place a reschedule gets requested.
    fn run_timer_list(&mut self);

    fn schedule(&mut self);

    fn exit(&mut self, status: i32) -> SyscallResult;

    fn fork(&mut self, clone_flags: u32, stack: u64, tf: &TrapFrame) -> SyscallResult;

    fn wait(&mut self, pid: Pid, status_store: u64) -> SyscallResult;

    fn exec(&mut self, name: u64, len: u64, binary: u64, size: u64) -> SyscallResult;

    fn exit_thread(&mut self, status: i32) -> SyscallResult;

    fn yield_now(&mut self) -> SyscallResult;

    fn sleep(&mut self, ticks: u32) -> SyscallResult;

    fn kill(&mut self, pid: Pid) -> SyscallResult;
}
