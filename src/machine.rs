//! The single-CPU machine behind the trap path: the boot idle process, its
//! address space over the active page table, and the PIC, UART and
//! keyboard ports.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use core::cell::UnsafeCell;
use core::ptr::NonNull;

use x86_64::instructions::port::Port;
use x86_64::registers::control::Cr2;
use x86_64::VirtAddr;

use rustos_kernel::drivers::ps2_keyboard::{self, ScancodeDecoder};
use rustos_kernel::interrupts::pic;
use rustos_kernel::interrupts::timer::Ticks;
use rustos_kernel::interrupts::TrapFrame;
use rustos_kernel::memory::paging::OffsetPageDirectory;
use rustos_kernel::memory::AddressSpace;
use rustos_kernel::process::{InputDevice, Kernel, Pid, Process};
use rustos_kernel::syscalls::{SyscallError, SyscallResult};

use crate::serial;

const STDIN_CAPACITY: usize = 256;

pub struct IdleProcess {
    tf: Option<NonNull<TrapFrame>>,
    mm: AddressSpace,
}

impl Process for IdleProcess {
    fn pid(&self) -> Pid {
        0
    }

    fn name(&self) -> &str {
        "idle"
    }

    fn trap_frame(&self) -> Option<NonNull<TrapFrame>> {
        self.tf
    }

    fn set_trap_frame(&mut self, tf: Option<NonNull<TrapFrame>>) {
        self.tf = tf;
    }

    fn need_resched(&self) -> bool {
        false
    }

    fn is_killed(&self) -> bool {
        false
    }

    fn address_space(&mut self) -> Option<&mut AddressSpace> {
        Some(&mut self.mm)
    }
}

pub struct BootKernel {
    idle: IdleProcess,
    ticks: Ticks,
    keyboard: ScancodeDecoder,
    stdin: VecDeque<u8>,
}

impl BootKernel {
    /// # Safety
    /// All physical memory must be mapped at `phys_offset`.
    pub unsafe fn new(phys_offset: VirtAddr) -> Self {
        let pgdir = OffsetPageDirectory::active(phys_offset);
        Self {
            idle: IdleProcess {
                tf: None,
                mm: AddressSpace::with_page_table(Box::new(pgdir)),
            },
            ticks: Ticks::new(),
            keyboard: ScancodeDecoder::new(),
            stdin: VecDeque::with_capacity(STDIN_CAPACITY),
        }
    }

    pub fn address_space(&mut self) -> &mut AddressSpace {
        &mut self.idle.mm
    }

    pub fn stdin_pop(&mut self) -> Option<u8> {
        self.stdin.pop_front()
    }
}

impl Kernel for BootKernel {
    fn current(&mut self) -> Option<&mut dyn Process> {
        Some(&mut self.idle)
    }

    fn ticks(&self) -> &Ticks {
        &self.ticks
    }

    fn fault_address(&self) -> VirtAddr {
        Cr2::read().unwrap_or(VirtAddr::zero())
    }

    fn end_of_interrupt(&mut self, vector: u8) {
        pic::end_of_interrupt(vector);
    }

    fn read_input(&mut self, device: InputDevice) -> Option<u8> {
        match device {
            InputDevice::Serial => serial::try_receive(),
            InputDevice::Keyboard => {
                let mut status = Port::<u8>::new(ps2_keyboard::STATUS_PORT);
                let mut data = Port::<u8>::new(ps2_keyboard::DATA_PORT);
                let scancode = unsafe {
                    if status.read() & ps2_keyboard::STATUS_OUTPUT_FULL == 0 {
                        return None;
                    }
                    data.read()
                };
                self.keyboard.process(scancode)
            }
        }
    }

    fn stdin_write(&mut self, byte: u8) {
        if self.stdin.len() == STDIN_CAPACITY {
            self.stdin.pop_front();
        }
        self.stdin.push_back(byte);
    }

    fn console_putc(&mut self, byte: u8) {
        serial::putc(byte);
    }

    fn run_timer_list(&mut self) {}

    fn schedule(&mut self) {}

    fn exit(&mut self, status: i32) -> SyscallResult {
        log::warn!("idle process asked to exit with {}", status);
        Err(SyscallError::PermissionDenied)
    }

    fn fork(&mut self, _clone_flags: u32, _stack: u64, _tf: &TrapFrame) -> SyscallResult {
        Err(SyscallError::NotImplemented)
    }

    fn wait(&mut self, _pid: Pid, _status_store: u64) -> SyscallResult {
        Err(SyscallError::NoChild)
    }

    fn exec(&mut self, _name: u64, _len: u64, _binary: u64, _size: u64) -> SyscallResult {
        Err(SyscallError::NotImplemented)
    }

    fn exit_thread(&mut self, status: i32) -> SyscallResult {
        self.exit(status)
    }

    fn yield_now(&mut self) -> SyscallResult {
        Ok(0)
    }

    fn sleep(&mut self, _ticks: u32) -> SyscallResult {
        Err(SyscallError::NotImplemented)
    }

    fn kill(&mut self, pid: Pid) -> SyscallResult {
        match pid {
            0 => Err(SyscallError::PermissionDenied),
            _ => Err(SyscallError::NoProcess),
        }
    }
}

/// Home of the machine state the trap handler runs against.
pub struct KernelCell(UnsafeCell<Option<BootKernel>>);

// Single CPU. A nested trap runs to completion before the trap it
// interrupted resumes, so the borrows never overlap in time.
unsafe impl Sync for KernelCell {}

impl KernelCell {
    pub const fn empty() -> Self {
        Self(UnsafeCell::new(None))
    }

    /// # Safety
    /// Must run before interrupts are enabled.
    pub unsafe fn install(&self, kernel: BootKernel) {
        *self.0.get() = Some(kernel);
    }

    /// # Safety
    /// Caller must not hold another borrow across a point where it could
    /// be re-entered, other than a trap.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get(&self) -> Option<&mut BootKernel> {
        (*self.0.get()).as_mut()
    }
}
