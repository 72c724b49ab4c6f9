//! # Vector Table
//!
//! Every one of the 256 vectors points at its generic entry stub (see
//! `entry.rs`), so every trap reaches [`crate::interrupts::trap::trap`] with
//! the same frame layout.
//!
//! | Vector      | Gate      | DPL | Notes                              |
//! |-------------|-----------|-----|------------------------------------|
//! | 0-31        | interrupt | 0   | CPU exceptions, #DF on its IST     |
//! | 32-47       | interrupt | 0   | PIC IRQs                           |
//! | 120 / 121   | interrupt | 3   | switch to user / switch to kernel  |
//! | 0x80        | trap      | 3   | system call                        |
//!
//! A DPL 0 vector raised with `int n` from user mode is itself a general
//! protection fault, which is the intended behaviour. The reserved vectors
//! 9, 15, 22-27 and 31 are never raised by a long-mode CPU and stay
//! non-present.

use x86_64::structures::idt::{Entry, EntryOptions, InterruptDescriptorTable};
use x86_64::{PrivilegeLevel, VirtAddr};

use crate::interrupts::gdt::{DOUBLE_FAULT_IST_INDEX, KERNEL_CS};
use crate::interrupts::pic::IRQ_OFFSET;

pub const T_DIVIDE: u8 = 0;
pub const T_BREAKPOINT: u8 = 3;
pub const T_DOUBLE_FAULT: u8 = 8;
pub const T_GPFLT: u8 = 13;
pub const T_PGFLT: u8 = 14;
pub const T_SWITCH_TOU: u8 = 120;
pub const T_SWITCH_TOK: u8 = 121;
pub const T_SYSCALL: u8 = 0x80;

const EXCEPTION_NAMES: [&str; 20] = [
    "Divide error",
    "Debug",
    "Non-Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "BOUND Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack Fault",
    "General Protection",
    "Page Fault",
    "(unknown trap)",
    "x87 FPU Floating-Point Error",
    "Alignment Check",
    "Machine-Check",
    "SIMD Floating-Point Exception",
];

pub fn trap_name(vector: u8) -> &'static str {
    match vector {
        v if usize::from(v) < EXCEPTION_NAMES.len() => EXCEPTION_NAMES[usize::from(v)],
        T_SYSCALL => "System call",
        T_SWITCH_TOU => "Switch to user",
        T_SWITCH_TOK => "Switch to kernel",
        v if (IRQ_OFFSET..IRQ_OFFSET + 16).contains(&v) => "Hardware Interrupt",
        _ => "(unknown trap)",
    }
}

/// Points `gate` at `handler` with the kernel code selector. The gate
/// starts out DPL 0 with interrupts disabled.
fn bind<F>(gate: &mut Entry<F>, handler: u64) -> &mut EntryOptions {
    unsafe {
        gate.set_handler_addr(VirtAddr::new(handler))
            .set_code_selector(KERNEL_CS)
    }
}

macro_rules! bind_exceptions {
    ($idt:ident, $entry:ident, $($vector:literal => $field:ident),* $(,)?) => {
        $( bind(&mut $idt.$field, $entry($vector)); )*
    };
}

pub struct VectorTable {
    idt: InterruptDescriptorTable,
}

const _: () = assert!(core::mem::size_of::<InterruptDescriptorTable>() == 256 * 16);

impl VectorTable {
    /// Binds vector `v` to `entry(v)`, kernel-only, then opens the syscall
    /// and mode-switch vectors to user mode.
    pub fn new(entry: impl Fn(u8) -> u64) -> Self {
        let mut idt = InterruptDescriptorTable::new();

        bind_exceptions!(idt, entry,
            0 => divide_error,
            1 => debug,
            2 => non_maskable_interrupt,
            3 => breakpoint,
            4 => overflow,
            5 => bound_range_exceeded,
            6 => invalid_opcode,
            7 => device_not_available,
            10 => invalid_tss,
            11 => segment_not_present,
            12 => stack_segment_fault,
            13 => general_protection_fault,
            14 => page_fault,
            16 => x87_floating_point,
            17 => alignment_check,
            18 => machine_check,
            19 => simd_floating_point,
            20 => virtualization,
            21 => cp_protection_exception,
            28 => hv_injection_exception,
            29 => vmm_communication_exception,
            30 => security_exception,
        );
        unsafe {
            bind(&mut idt.double_fault, entry(T_DOUBLE_FAULT)).set_stack_index(DOUBLE_FAULT_IST_INDEX);
        }

        for (offset, gate) in idt.slice_mut(IRQ_OFFSET..=u8::MAX).iter_mut().enumerate() {
            bind(gate, entry(IRQ_OFFSET + offset as u8));
        }

        bind(&mut idt[T_SYSCALL], entry(T_SYSCALL))
            .set_privilege_level(PrivilegeLevel::Ring3)
            .disable_interrupts(false);
        for vector in [T_SWITCH_TOU, T_SWITCH_TOK] {
            bind(&mut idt[vector], entry(vector)).set_privilege_level(PrivilegeLevel::Ring3);
        }

        Self { idt }
    }

    #[cfg(target_os = "none")]
    pub fn load(&'static self) {
        self.idt.load();
    }
}

/// The CPU's view of one gate, decoded from the loaded table.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawGate {
    pub handler: u64,
    pub selector: u16,
    /// IST slot plus one, 0 for none.
    pub ist: u8,
    /// 0xE interrupt gate, 0xF trap gate.
    pub kind: u8,
    pub dpl: u8,
    pub present: bool,
}

#[cfg(test)]
impl VectorTable {
    pub(crate) fn table(&self) -> &InterruptDescriptorTable {
        &self.idt
    }

    pub(crate) fn raw_gate(&self, vector: u8) -> RawGate {
        let base = &self.idt as *const InterruptDescriptorTable as *const [u8; 16];
        let b = unsafe { *base.add(usize::from(vector)) };
        let word = |i: usize| u64::from(u16::from_le_bytes([b[i], b[i + 1]]));
        let high = u64::from(u32::from_le_bytes([b[8], b[9], b[10], b[11]]));
        RawGate {
            handler: word(0) | word(6) << 16 | high << 32,
            selector: word(2) as u16,
            ist: b[4] & 0b111,
            kind: b[5] & 0xF,
            dpl: (b[5] >> 5) & 0b11,
            present: b[5] & 0x80 != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESERVED: [u8; 9] = [9, 15, 22, 23, 24, 25, 26, 27, 31];

    fn fake_entry(vector: u8) -> u64 {
        0xffff_8000_0010_0000 + 16 * u64::from(vector)
    }

    #[test]
    fn every_vector_is_bound_to_its_stub() {
        let table = VectorTable::new(fake_entry);
        for vector in (0..=255u8).filter(|v| !RESERVED.contains(v)) {
            let gate = table.raw_gate(vector);
            assert!(gate.present, "vector {}", vector);
            assert_eq!(gate.handler, fake_entry(vector));
            assert_eq!(gate.selector, KERNEL_CS.0);
        }
        for vector in RESERVED {
            assert!(!table.raw_gate(vector).present, "vector {}", vector);
        }
    }

    #[test]
    fn only_syscall_and_switch_vectors_are_user_callable() {
        let table = VectorTable::new(fake_entry);
        for vector in 0..=255u8 {
            let expected = match vector {
                T_SYSCALL | T_SWITCH_TOU | T_SWITCH_TOK => 3,
                _ => 0,
            };
            assert_eq!(table.raw_gate(vector).dpl, expected, "vector {}", vector);
        }
        assert_eq!(table.raw_gate(T_SYSCALL).kind, 0xF);
        assert_eq!(table.raw_gate(T_SWITCH_TOU).kind, 0xE);
        assert_eq!(table.raw_gate(T_PGFLT).kind, 0xE);
    }

    #[test]
    fn double_fault_runs_on_its_own_stack() {
        let table = VectorTable::new(fake_entry);
        assert_eq!(table.raw_gate(T_DOUBLE_FAULT).ist, DOUBLE_FAULT_IST_INDEX as u8 + 1);
        assert_eq!(table.raw_gate(T_PGFLT).ist, 0);
        assert_eq!(table.table().page_fault.handler_addr().as_u64(), fake_entry(T_PGFLT));
    }

    #[test]
    fn names_cover_exceptions_irqs_and_syscall() {
        assert_eq!(trap_name(T_PGFLT), "Page Fault");
        assert_eq!(trap_name(T_SYSCALL), "System call");
        assert_eq!(trap_name(IRQ_OFFSET + 1), "Hardware Interrupt");
        assert_eq!(trap_name(15), "(unknown trap)");
        assert_eq!(trap_name(200), "(unknown trap)");
    }
}
