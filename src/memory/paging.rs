//! # Page Tables
//!
//! The address space talks to hardware translation only through the
//! [`PageTable`] trait. [`OffsetPageDirectory`] implements it over the
//! bootloader's complete physical-memory mapping; tests use an in-memory
//! table instead.

use core::fmt;

use x86_64::structures::paging::mapper::{FlagUpdateError, MapToError, UnmapError};
use x86_64::structures::paging::{
    FrameAllocator, Mapper, OffsetPageTable, Page, PageTable as X86PageTable, PageTableFlags,
    PhysFrame, Size4KiB,
};
use x86_64::{PhysAddr, VirtAddr};

use crate::config::PAGE_SIZE;
use crate::memory::frame::GlobalFrameAllocator;

/// Software bit marking a present page as write-protected until its first
/// write fault.
pub const COPY_ON_WRITE: PageTableFlags = PageTableFlags::BIT_9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingError {
    OutOfMemory,
    AlreadyMapped,
    NotMapped,
    HugePage,
}

impl fmt::Display for PagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::OutOfMemory => "no free physical frame",
            Self::AlreadyMapped => "page already mapped",
            Self::NotMapped => "page not mapped",
            Self::HugePage => "address covered by a huge page",
        };
        f.write_str(text)
    }
}

pub trait PageTable {
    /// Physical address of the top-level table.
    fn root(&self) -> PhysAddr;

    /// Flags of the leaf entry translating `addr`, if it is present.
    fn lookup(&self, addr: VirtAddr) -> Option<PageTableFlags>;

    /// Backs `page` with a fresh zero-filled frame.
    fn map_zeroed(&mut self, page: Page<Size4KiB>, flags: PageTableFlags) -> Result<(), PagingError>;

    fn set_flags(&mut self, page: Page<Size4KiB>, flags: PageTableFlags) -> Result<(), PagingError>;

    fn unmap(&mut self, page: Page<Size4KiB>) -> Result<(), PagingError>;

    /// Unmaps every present page in `[start, end)` and returns how many
    /// there were.
    fn unmap_range(&mut self, start: VirtAddr, end: VirtAddr) -> usize {
        let mut unmapped = 0;
        let mut addr = start.align_down(PAGE_SIZE);
        while addr < end {
            if self.lookup(addr).is_some()
                && self.unmap(Page::containing_address(addr)).is_ok()
            {
                unmapped += 1;
            }
            addr += PAGE_SIZE;
        }
        unmapped
    }

    /// Number of present pages in `[start, end)`.
    fn mapped_pages(&self, start: VirtAddr, end: VirtAddr) -> usize {
        let mut count = 0;
        let mut addr = start.align_down(PAGE_SIZE);
        while addr < end {
            if self.lookup(addr).is_some() {
                count += 1;
            }
            addr += PAGE_SIZE;
        }
        count
    }
}

/// A four-level table reached through the physical-memory window at
/// `phys_offset`.
pub struct OffsetPageDirectory {
    p4: PhysFrame<Size4KiB>,
    phys_offset: VirtAddr,
}

impl OffsetPageDirectory {
    /// The table currently loaded in CR3.
    ///
    /// # Safety
    /// All physical memory must be mapped at `phys_offset`.
    #[cfg(target_os = "none")]
    pub unsafe fn active(phys_offset: VirtAddr) -> Self {
        let (p4, _) = x86_64::registers::control::Cr3::read();
        Self { p4, phys_offset }
    }

    fn table_at(&self, frame: PhysAddr) -> *mut X86PageTable {
        (self.phys_offset + frame.as_u64()).as_mut_ptr()
    }

    fn mapper(&mut self) -> OffsetPageTable<'_> {
        let table = unsafe { &mut *self.table_at(self.p4.start_address()) };
        unsafe { OffsetPageTable::new(table, self.phys_offset) }
    }
}

impl PageTable for OffsetPageDirectory {
    fn root(&self) -> PhysAddr {
        self.p4.start_address()
    }

    fn lookup(&self, addr: VirtAddr) -> Option<PageTableFlags> {
        let mut table = unsafe { &*self.table_at(self.p4.start_address()) };
        for index in [addr.p4_index(), addr.p3_index(), addr.p2_index()] {
            let entry = &table[index];
            let flags = entry.flags();
            if !flags.contains(PageTableFlags::PRESENT) {
                return None;
            }
            if flags.contains(PageTableFlags::HUGE_PAGE) {
                return Some(flags);
            }
            table = unsafe { &*self.table_at(entry.addr()) };
        }
        let flags = table[addr.p1_index()].flags();
        flags.contains(PageTableFlags::PRESENT).then_some(flags)
    }

    fn map_zeroed(&mut self, page: Page<Size4KiB>, flags: PageTableFlags) -> Result<(), PagingError> {
        let mut frames = GlobalFrameAllocator;
        let frame = frames.allocate_frame().ok_or(PagingError::OutOfMemory)?;
        unsafe {
            let bytes: *mut u8 = (self.phys_offset + frame.start_address().as_u64()).as_mut_ptr();
            core::ptr::write_bytes(bytes, 0, PAGE_SIZE as usize);
        }

        let flush = unsafe { self.mapper().map_to(page, frame, flags, &mut frames) }.map_err(
            |err| match err {
                MapToError::FrameAllocationFailed => PagingError::OutOfMemory,
                MapToError::PageAlreadyMapped(_) => PagingError::AlreadyMapped,
                MapToError::ParentEntryHugePage => PagingError::HugePage,
            },
        )?;
        flush.flush();
        Ok(())
    }

    fn set_flags(&mut self, page: Page<Size4KiB>, flags: PageTableFlags) -> Result<(), PagingError> {
        let flush = unsafe { self.mapper().update_flags(page, flags) }.map_err(|err| match err {
            FlagUpdateError::PageNotMapped => PagingError::NotMapped,
            FlagUpdateError::ParentEntryHugePage => PagingError::HugePage,
        })?;
        flush.flush();
        Ok(())
    }

    fn unmap(&mut self, page: Page<Size4KiB>) -> Result<(), PagingError> {
        // TODO: hand the frame back once the frame allocator can free.
        let (_frame, flush) = self.mapper().unmap(page).map_err(|err| match err {
            UnmapError::ParentEntryHugePage => PagingError::HugePage,
            UnmapError::PageNotMapped | UnmapError::InvalidFrameAddress(_) => PagingError::NotMapped,
        })?;
        flush.flush();
        Ok(())
    }
}
