//! # Trap Frame
//!
//! Register snapshot built on the interrupted stack by the entry stub in
//! `entry.rs`. The stub pushes, from high to low addresses:
//!
//! ```text
//! ss, rsp, rflags, cs, rip        <- pushed by the CPU
//! error code                      <- CPU, or a zero pushed by the stub
//! vector number
//! r15 .. rdi                      <- general registers
//! ds, es
//! ```
//!
//! so the struct below lists the same fields from low to high. Keep both in
//! sync; the size assertion catches a field added on one side only.

use core::fmt;

use x86_64::registers::rflags::RFlags;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

use crate::interrupts::idt;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneralRegs {
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rax: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub es: u64,
    pub ds: u64,
    pub regs: GeneralRegs,
    pub trapno: u64,
    pub err: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

const _: () = assert!(core::mem::size_of::<TrapFrame>() == 24 * 8);

impl TrapFrame {
    /// Frame as it would look for `vector` raised while running with the
    /// given code and data selectors.
    pub fn new(vector: u8, cs: SegmentSelector, ds: SegmentSelector) -> Self {
        Self {
            es: u64::from(ds.0),
            ds: u64::from(ds.0),
            trapno: u64::from(vector),
            cs: u64::from(cs.0),
            ss: u64::from(ds.0),
            rflags: RFlags::INTERRUPT_FLAG.bits(),
            ..Self::default()
        }
    }

    pub fn vector(&self) -> u8 {
        self.trapno as u8
    }

    pub fn code_selector(&self) -> SegmentSelector {
        SegmentSelector(self.cs as u16)
    }

    /// Privilege level the trap was taken from.
    pub fn privilege_level(&self) -> PrivilegeLevel {
        self.code_selector().rpl()
    }

    pub fn in_kernel(&self) -> bool {
        self.privilege_level() == PrivilegeLevel::Ring0
    }

    pub fn flags(&self) -> RFlags {
        RFlags::from_bits_truncate(self.rflags)
    }

    pub fn iopl(&self) -> u8 {
        ((self.rflags & (RFlags::IOPL_HIGH | RFlags::IOPL_LOW).bits()) >> 12) as u8
    }

    /// Rewrites the selectors so the return lands in `cs` with every data
    /// and stack selector set to `ds`.
    pub fn set_selectors(&mut self, cs: SegmentSelector, ds: SegmentSelector) {
        self.cs = u64::from(cs.0);
        self.ds = u64::from(ds.0);
        self.es = u64::from(ds.0);
        self.ss = u64::from(ds.0);
    }
}

impl fmt::Display for TrapFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.regs;
        writeln!(f, "trapframe at {:p}", self)?;
        for (name, value) in [
            ("rdi", r.rdi),
            ("rsi", r.rsi),
            ("rdx", r.rdx),
            ("rcx", r.rcx),
            ("rax", r.rax),
            ("r8", r.r8),
            ("r9", r.r9),
            ("r10", r.r10),
            ("r11", r.r11),
            ("rbx", r.rbx),
            ("rbp", r.rbp),
            ("r12", r.r12),
            ("r13", r.r13),
            ("r14", r.r14),
            ("r15", r.r15),
        ] {
            writeln!(f, "  {:<4} {:#018x}", name, value)?;
        }
        writeln!(f, "  ds   {:#06x}", self.ds)?;
        writeln!(f, "  es   {:#06x}", self.es)?;
        writeln!(f, "  trap {:#010x} {}", self.trapno, idt::trap_name(self.vector()))?;
        writeln!(f, "  err  {:#018x}", self.err)?;
        writeln!(f, "  rip  {:#018x}", self.rip)?;
        writeln!(f, "  cs   {:#06x}", self.cs)?;
        writeln!(f, "  flag {:#018x}", self.rflags)?;
        writeln!(f, "  rsp  {:#018x}", self.rsp)?;
        writeln!(f, "  ss   {:#06x}", self.ss)?;
        write!(f, " ")?;
        for (name, _) in self.flags().iter_names() {
            write!(f, " {}", name)?;
        }
        write!(f, " IOPL={}", self.iopl())
    }
}
