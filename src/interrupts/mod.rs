//! Privilege transitions: descriptor tables, the saved register frame and
//! the trap dispatcher.

pub mod gdt;
pub mod idt;
pub mod pic;
pub mod timer;
pub mod trap;
pub mod trapframe;

#[cfg(target_os = "none")]
pub mod entry;

pub use trap::trap;
pub use trapframe::TrapFrame;

use gdt::{SegmentTable, TaskState};
use idt::VectorTable;

/// The GDT and IDT, built together so the gates always refer to the code
/// selector of the table that is loaded next to them.
pub struct DescriptorTables {
    segments: SegmentTable,
    vectors: VectorTable,
}

impl DescriptorTables {
    /// `entry(v)` is the address of the stub for vector `v`.
    pub fn build(tss: &'static TaskState, entry: impl Fn(u8) -> u64) -> Self {
        Self {
            segments: SegmentTable::new(tss),
            vectors: VectorTable::new(entry),
        }
    }

    pub fn task_state(&self) -> &'static TaskState {
        self.segments.task_state()
    }

    pub fn vectors(&self) -> &VectorTable {
        &self.vectors
    }

    /// # Safety
    /// See [`SegmentTable::load`].
    #[cfg(target_os = "none")]
    pub unsafe fn install(&'static self) {
        self.segments.load();
        self.vectors.load();
        log::info!("descriptor tables loaded");
    }
}
