//! # Trap Dispatcher
//!
//! Every vector lands in [`trap`] with the frame the entry stub built.
//!
//! ```text
//! trap(tf)
//!  ├─ remember current->tf, point it at tf     (FrameChain)
//!  ├─ classify tf.trapno and handle it         (dispatch)
//!  ├─ put current->tf back                     (FrameChain drop)
//!  └─ returning to user mode?
//!       ├─ killed       -> exit(KILLED_STATUS)
//!       └─ need_resched -> schedule()
//! ```
//!
//! Failures that cannot be pinned on a user process are fatal. Everything
//! else costs at most the offending process.

use core::fmt;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

use x86_64::registers::rflags::RFlags;
use x86_64::structures::idt::PageFaultErrorCode;

use crate::interrupts::gdt::{KERNEL_CS, KERNEL_DS, USER_CS, USER_DS};
use crate::interrupts::idt::{T_PGFLT, T_SWITCH_TOK, T_SWITCH_TOU, T_SYSCALL};
use crate::interrupts::pic::InterruptIndex;
use crate::interrupts::timer::Ticks;
use crate::interrupts::trapframe::TrapFrame;
use crate::memory::pgfault::{handle_page_fault, FaultDescription, FaultError};
use crate::process::{InputDevice, Kernel, KILLED_STATUS};
use crate::syscalls;

const IOPL_MASK: RFlags = RFlags::IOPL_HIGH.union(RFlags::IOPL_LOW);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapKind {
    PageFault,
    Syscall,
    Timer,
    Serial,
    Keyboard,
    Disk,
    SwitchToUser,
    SwitchToKernel,
    Other(u8),
}

impl TrapKind {
    pub fn classify(vector: u8) -> Self {
        match vector {
            T_PGFLT => Self::PageFault,
            T_SYSCALL => Self::Syscall,
            T_SWITCH_TOU => Self::SwitchToUser,
            T_SWITCH_TOK => Self::SwitchToKernel,
            _ => match InterruptIndex::from_vector(vector) {
                Some(InterruptIndex::Timer) => Self::Timer,
                Some(InterruptIndex::Com1) => Self::Serial,
                Some(InterruptIndex::Keyboard) => Self::Keyboard,
                Some(InterruptIndex::Ide1 | InterruptIndex::Ide2) => Self::Disk,
                None => Self::Other(vector),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapError {
    PageFault(FaultError),
    /// No handler for this vector.
    Unhandled,
}

impl fmt::Display for TrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageFault(err) => write!(f, "page fault: {}", err),
            Self::Unhandled => f.write_str("unhandled trap"),
        }
    }
}

/// Points the current process at the trap being handled and puts the
/// previous frame pointer back when dropped, unwinding included. Derefs to
/// the kernel so dispatch runs through it.
struct FrameChain<'a, K: Kernel + ?Sized> {
    kernel: &'a mut K,
    saved: Option<Option<NonNull<TrapFrame>>>,
}

impl<'a, K: Kernel + ?Sized> FrameChain<'a, K> {
    fn enter(kernel: &'a mut K, tf: &mut TrapFrame) -> Self {
        let saved = kernel.current().map(|process| {
            let previous = process.trap_frame();
            process.set_trap_frame(Some(NonNull::from(tf)));
            previous
        });
        Self { kernel, saved }
    }
}

impl<K: Kernel + ?Sized> Deref for FrameChain<'_, K> {
    type Target = K;

    fn deref(&self) -> &K {
        self.kernel
    }
}

impl<K: Kernel + ?Sized> DerefMut for FrameChain<'_, K> {
    fn deref_mut(&mut self) -> &mut K {
        self.kernel
    }
}

impl<K: Kernel + ?Sized> Drop for FrameChain<'_, K> {
    fn drop(&mut self) {
        if let Some(previous) = self.saved.take() {
            if let Some(process) = self.kernel.current() {
                process.set_trap_frame(previous);
            }
        }
    }
}

/// Handles one trap. Called by the entry stub with interrupts disabled.
pub fn trap<K: Kernel + ?Sized>(kernel: &mut K, tf: &mut TrapFrame) {
    let from_user = !tf.in_kernel();
    {
        let mut chain = FrameChain::enter(kernel, tf);
        if let Err(err) = dispatch(&mut *chain, tf) {
            handle_failure(&mut *chain, tf, err);
        }
    }

    if !from_user {
        return;
    }
    let Some(process) = kernel.current() else {
        return;
    };
    let (killed, resched) = (process.is_killed(), process.need_resched());
    if killed {
        exit_killed(kernel);
    } else if resched {
        kernel.schedule();
    }
}

fn dispatch<K: Kernel + ?Sized>(kernel: &mut K, tf: &mut TrapFrame) -> Result<(), TrapError> {
    match TrapKind::classify(tf.vector()) {
        TrapKind::PageFault => page_fault(kernel, tf).map_err(TrapError::PageFault),
        TrapKind::Syscall => {
            syscalls::syscall(kernel, tf);
            Ok(())
        }
        TrapKind::Timer => {
            let ticks = kernel.ticks().increment();
            kernel.run_timer_list();
            kernel.end_of_interrupt(tf.vector());
            if Ticks::is_heartbeat(ticks) {
                log::info!("{} ticks", ticks);
            }
            Ok(())
        }
        TrapKind::Serial => {
            forward_input(kernel, InputDevice::Serial, tf.vector());
            Ok(())
        }
        TrapKind::Keyboard => {
            forward_input(kernel, InputDevice::Keyboard, tf.vector());
            Ok(())
        }
        TrapKind::Disk => {
            kernel.end_of_interrupt(tf.vector());
            Ok(())
        }
        TrapKind::SwitchToUser => {
            if tf.in_kernel() {
                tf.set_selectors(USER_CS, USER_DS);
                // user code may touch I/O ports while it runs on this frame
                tf.rflags |= IOPL_MASK.bits();
            }
            Ok(())
        }
        TrapKind::SwitchToKernel => {
            if !tf.in_kernel() {
                tf.set_selectors(KERNEL_CS, KERNEL_DS);
                tf.rflags &= !IOPL_MASK.bits();
            }
            Ok(())
        }
        TrapKind::Other(_) => Err(TrapError::Unhandled),
    }
}

fn forward_input<K: Kernel + ?Sized>(kernel: &mut K, device: InputDevice, vector: u8) {
    if let Some(byte) = kernel.read_input(device) {
        kernel.stdin_write(byte);
    }
    kernel.end_of_interrupt(vector);
}

fn page_fault<K: Kernel + ?Sized>(kernel: &mut K, tf: &TrapFrame) -> Result<(), FaultError> {
    let addr = kernel.fault_address();
    let code = PageFaultErrorCode::from_bits_truncate(tf.err);
    log::debug!("page fault at {:#x}: {}", addr.as_u64(), FaultDescription(code));

    let process = kernel.current().ok_or(FaultError::NoPageTable)?;
    let mm = process.address_space().ok_or(FaultError::NoPageTable)?;
    handle_page_fault(mm, addr, code)
}

fn exit_killed<K: Kernel + ?Sized>(kernel: &mut K) {
    if let Err(err) = kernel.exit(KILLED_STATUS) {
        log::error!("exit of killed process failed: {}", err);
    }
}

/// Kills the offending user process, or panics when there is none to
/// blame.
fn handle_failure<K: Kernel + ?Sized>(kernel: &mut K, tf: &TrapFrame, err: TrapError) {
    let in_kernel = tf.in_kernel();
    let has_process = kernel.current().is_some();

    match err {
        TrapError::PageFault(fault) => {
            let addr = kernel.fault_address();
            let code = PageFaultErrorCode::from_bits_truncate(tf.err);
            log::error!(
                "unhandled page fault at {:#x}: {} ({})",
                addr.as_u64(),
                FaultDescription(code),
                fault
            );
            log::error!("{}", tf);
            if !has_process {
                panic!("handle pgfault failed. {}", fault);
            }
            if in_kernel {
                panic!("handle pgfault failed in kernel mode. {}", fault);
            }
        }
        TrapError::Unhandled => {
            log::error!("{}", tf);
            if in_kernel || !has_process {
                panic!("unexpected trap in kernel.");
            }
            log::error!("unhandled trap.");
        }
    }

    if let Some(process) = kernel.current() {
        log::error!("killed by kernel: pid {} ({})", process.pid(), process.name());
    }
    exit_killed(kernel);
}
