//! # Segment Table and Task State
//!
//! The GDT layout is fixed; the selectors below encode it and the trap path
//! compares against them, so entries must never be reordered:
//!
//! | Index | Selector | Entry        |
//! |-------|----------|--------------|
//! | 0     | 0x00     | null         |
//! | 1     | 0x08     | kernel code  |
//! | 2     | 0x10     | kernel data  |
//! | 3     | 0x1b     | user code    |
//! | 4     | 0x23     | user data    |
//! | 5-6   | 0x28     | TSS          |
//!
//! The TSS supplies `rsp0`, the stack the CPU switches to when a trap raises
//! the privilege level, and the IST stack used by the double fault gate.

use core::cell::UnsafeCell;

use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::{PrivilegeLevel, VirtAddr};

pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

pub const KERNEL_CS: SegmentSelector = SegmentSelector::new(1, PrivilegeLevel::Ring0);
pub const KERNEL_DS: SegmentSelector = SegmentSelector::new(2, PrivilegeLevel::Ring0);
pub const USER_CS: SegmentSelector = SegmentSelector::new(3, PrivilegeLevel::Ring3);
pub const USER_DS: SegmentSelector = SegmentSelector::new(4, PrivilegeLevel::Ring3);
pub const TSS_SELECTOR: SegmentSelector = SegmentSelector::new(5, PrivilegeLevel::Ring0);

/// The task-state segment. Its ring-0 stack pointer is rewritten on every
/// process switch while the GDT keeps pointing at it.
pub struct TaskState {
    inner: UnsafeCell<TaskStateSegment>,
}

// Written only from ring 0 with interrupts masked, on the single CPU.
unsafe impl Sync for TaskState {}

impl TaskState {
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(TaskStateSegment::new()),
        }
    }

    /// Stack loaded by the CPU on the next user -> kernel transition.
    pub fn set_kernel_stack(&self, top: VirtAddr) {
        unsafe {
            (*self.inner.get()).privilege_stack_table[0] = top;
        }
    }

    pub fn kernel_stack(&self) -> VirtAddr {
        unsafe { (*self.inner.get()).privilege_stack_table[0] }
    }

    pub fn set_interrupt_stack(&self, index: u16, top: VirtAddr) {
        unsafe {
            (*self.inner.get()).interrupt_stack_table[usize::from(index)] = top;
        }
    }

    pub fn interrupt_stack(&self, index: u16) -> VirtAddr {
        unsafe { (*self.inner.get()).interrupt_stack_table[usize::from(index)] }
    }

    fn as_ptr(&self) -> *const TaskStateSegment {
        self.inner.get()
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SegmentTable {
    gdt: GlobalDescriptorTable,
    tss: &'static TaskState,
}

impl SegmentTable {
    pub fn new(tss: &'static TaskState) -> Self {
        let mut gdt = GlobalDescriptorTable::new();

        let kernel_code = gdt.append(Descriptor::kernel_code_segment());
        let kernel_data = gdt.append(Descriptor::kernel_data_segment());
        let user_code = gdt.append(Descriptor::user_code_segment());
        let user_data = gdt.append(Descriptor::user_data_segment());
        // The TSS lives in a 'static TaskState, so the descriptor never dangles.
        let tss_selector = gdt.append(unsafe { Descriptor::tss_segment_unchecked(tss.as_ptr()) });

        debug_assert_eq!(kernel_code, KERNEL_CS);
        debug_assert_eq!(kernel_data, KERNEL_DS);
        debug_assert_eq!(user_code, USER_CS);
        debug_assert_eq!(user_data, USER_DS);
        debug_assert_eq!(tss_selector, TSS_SELECTOR);

        Self { gdt, tss }
    }

    pub fn task_state(&self) -> &'static TaskState {
        self.tss
    }

    /// Loads the GDT, resets the data selectors, reloads `cs`/`ss` and loads
    /// the task register.
    ///
    /// # Safety
    /// Must run once, with interrupts disabled, before any trap can occur.
    #[cfg(target_os = "none")]
    pub unsafe fn load(&'static self) {
        use x86_64::instructions::segmentation::{Segment, DS, ES, FS, GS};
        use x86_64::instructions::tables::load_tss;

        self.gdt.load();

        FS::set_reg(SegmentSelector(0));
        GS::set_reg(SegmentSelector(0));
        ES::set_reg(KERNEL_DS);
        DS::set_reg(KERNEL_DS);

        // cs and ss only reload on a control transfer, so return to the next
        // instruction through a hand-built interrupt frame.
        core::arch::asm!(
            "mov {tmp}, rsp",
            "push {ss}",
            "push {tmp}",
            "pushfq",
            "push {cs}",
            "lea {tmp}, [rip + 2f]",
            "push {tmp}",
            "iretq",
            "2:",
            ss = in(reg) u64::from(KERNEL_DS.0),
            cs = in(reg) u64::from(KERNEL_CS.0),
            tmp = out(reg) _,
        );

        load_tss(TSS_SELECTOR);
    }
}
