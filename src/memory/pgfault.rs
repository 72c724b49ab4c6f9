//! # Demand Paging
//!
//! Resolves a page fault against the faulting process's regions. The
//! resolver only reports; whether a failure kills the process or the
//! kernel is the trap dispatcher's call.
//!
//! | Access           | Needs             | Present page            |
//! |------------------|-------------------|-------------------------|
//! | write            | WRITE             | copy-on-write bit only  |
//! | instruction fetch| EXEC              | never legal             |
//! | read             | READ or EXEC      | never legal             |

use core::fmt;

use x86_64::structures::idt::PageFaultErrorCode;
use x86_64::structures::paging::{Page, PageTableFlags};
use x86_64::VirtAddr;

use crate::memory::mm::AddressSpace;
use crate::memory::paging::{PagingError, COPY_ON_WRITE};
use crate::memory::vma::VmFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultError {
    /// No region covers the address.
    NoRegion,
    /// The region or the existing mapping forbids this access.
    AccessDenied,
    OutOfMemory,
    /// The space has no page table to map into.
    NoPageTable,
    Paging(PagingError),
}

impl From<PagingError> for FaultError {
    fn from(err: PagingError) -> Self {
        match err {
            PagingError::OutOfMemory => Self::OutOfMemory,
            other => Self::Paging(other),
        }
    }
}

impl fmt::Display for FaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRegion => f.write_str("no region covers the address"),
            Self::AccessDenied => f.write_str("access not permitted"),
            Self::OutOfMemory => f.write_str("out of memory"),
            Self::NoPageTable => f.write_str("address space has no page table"),
            Self::Paging(err) => write!(f, "paging error: {}", err),
        }
    }
}

/// One-line summary of a fault for the log, e.g. `U/W [protection fault]`.
pub struct FaultDescription(pub PageFaultErrorCode);

impl fmt::Display for FaultDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.0;
        write!(
            f,
            "{}/{} [{}]",
            if code.contains(PageFaultErrorCode::USER_MODE) { 'U' } else { 'K' },
            if code.contains(PageFaultErrorCode::CAUSED_BY_WRITE) { 'W' } else { 'R' },
            if code.contains(PageFaultErrorCode::PROTECTION_VIOLATION) {
                "protection fault"
            } else {
                "no page found"
            }
        )
    }
}

fn access_permitted(flags: VmFlags, code: PageFaultErrorCode) -> bool {
    if code.contains(PageFaultErrorCode::CAUSED_BY_WRITE) {
        flags.contains(VmFlags::WRITE)
    } else if code.contains(PageFaultErrorCode::PROTECTION_VIOLATION) {
        false
    } else if code.contains(PageFaultErrorCode::INSTRUCTION_FETCH) {
        flags.contains(VmFlags::EXEC)
    } else {
        flags.intersects(VmFlags::READ | VmFlags::EXEC)
    }
}

pub fn handle_page_fault(
    mm: &mut AddressSpace,
    addr: VirtAddr,
    code: PageFaultErrorCode,
) -> Result<(), FaultError> {
    let region = mm.find(addr).ok_or(FaultError::NoRegion)?;
    let flags = region.flags();
    if !access_permitted(flags, code) {
        return Err(FaultError::AccessDenied);
    }

    let mut perm = PageTableFlags::USER_ACCESSIBLE | PageTableFlags::PRESENT;
    if flags.contains(VmFlags::WRITE) {
        perm |= PageTableFlags::WRITABLE;
    }

    let page = Page::containing_address(addr);
    let pgdir = mm.page_table_mut().ok_or(FaultError::NoPageTable)?;
    match pgdir.lookup(page.start_address()) {
        None => pgdir.map_zeroed(page, perm)?,
        Some(current)
            if current.contains(COPY_ON_WRITE)
                && code.contains(PageFaultErrorCode::CAUSED_BY_WRITE) =>
        {
            pgdir.set_flags(page, (current - COPY_ON_WRITE) | PageTableFlags::WRITABLE)?
        }
        Some(_) => return Err(FaultError::AccessDenied),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::vma::Region;
    use crate::testutil::MockPageTable;
    use alloc::boxed::Box;

    fn va(addr: u64) -> VirtAddr {
        VirtAddr::new(addr)
    }

    fn space(frames: usize) -> AddressSpace {
        let mut mm = AddressSpace::with_page_table(Box::new(MockPageTable::new(frames)));
        let rw = VmFlags::READ | VmFlags::WRITE;
        let rx = VmFlags::READ | VmFlags::EXEC;
        mm.insert(Region::with_flags(va(0x1000), va(0x2000), rw).unwrap());
        mm.insert(Region::with_flags(va(0x3000), va(0x4000), rx).unwrap());
        mm
    }

    const WRITE: PageFaultErrorCode = PageFaultErrorCode::CAUSED_BY_WRITE;
    const READ: PageFaultErrorCode = PageFaultErrorCode::empty();

    #[test]
    fn write_to_writable_region_maps_a_user_page() {
        let mut mm = space(4);
        assert_eq!(handle_page_fault(&mut mm, va(0x1500), WRITE | PageFaultErrorCode::USER_MODE), Ok(()));
        let flags = mm.page_table().unwrap().lookup(va(0x1000)).unwrap();
        assert!(flags.contains(
            PageTableFlags::PRESENT | PageTableFlags::USER_ACCESSIBLE | PageTableFlags::WRITABLE
        ));
    }

    #[test]
    fn write_to_read_exec_region_is_denied() {
        let mut mm = space(4);
        assert_eq!(handle_page_fault(&mut mm, va(0x3500), WRITE), Err(FaultError::AccessDenied));
        assert!(mm.page_table().unwrap().lookup(va(0x3000)).is_none());
    }

    #[test]
    fn address_outside_every_region_has_no_region() {
        let mut mm = space(4);
        assert_eq!(handle_page_fault(&mut mm, va(0x5000), READ), Err(FaultError::NoRegion));
    }

    #[test]
    fn read_of_exec_region_maps_read_only_page() {
        let mut mm = space(4);
        assert_eq!(handle_page_fault(&mut mm, va(0x3008), READ), Ok(()));
        let flags = mm.page_table().unwrap().lookup(va(0x3000)).unwrap();
        assert!(!flags.contains(PageTableFlags::WRITABLE));
    }

    #[test]
    fn read_fault_on_present_page_is_never_legal() {
        let mut mm = space(4);
        let code = PageFaultErrorCode::PROTECTION_VIOLATION;
        assert_eq!(handle_page_fault(&mut mm, va(0x1000), code), Err(FaultError::AccessDenied));
    }

    #[test]
    fn fetch_needs_exec() {
        let mut mm = space(4);
        let fetch = PageFaultErrorCode::INSTRUCTION_FETCH;
        assert_eq!(handle_page_fault(&mut mm, va(0x1000), fetch), Err(FaultError::AccessDenied));
        assert_eq!(handle_page_fault(&mut mm, va(0x3000), fetch), Ok(()));
    }

    #[test]
    fn copy_on_write_page_becomes_writable() {
        let mut mm = space(4);
        let page = Page::containing_address(va(0x1000));
        let shared = PageTableFlags::PRESENT | PageTableFlags::USER_ACCESSIBLE | COPY_ON_WRITE;
        mm.page_table_mut().unwrap().map_zeroed(page, shared).unwrap();

        let code = WRITE | PageFaultErrorCode::PROTECTION_VIOLATION;
        assert_eq!(handle_page_fault(&mut mm, va(0x1010), code), Ok(()));
        let flags = mm.page_table().unwrap().lookup(va(0x1000)).unwrap();
        assert!(flags.contains(PageTableFlags::WRITABLE));
        assert!(!flags.contains(COPY_ON_WRITE));

        // a second protection fault on the now-writable page is a real violation
        assert_eq!(handle_page_fault(&mut mm, va(0x1010), code), Err(FaultError::AccessDenied));
    }

    #[test]
    fn allocation_failure_is_out_of_memory() {
        let mut mm = space(0);
        assert_eq!(handle_page_fault(&mut mm, va(0x1500), WRITE), Err(FaultError::OutOfMemory));
    }

    #[test]
    fn space_without_page_table_cannot_map() {
        let mut mm = AddressSpace::new();
        let rw = VmFlags::READ | VmFlags::WRITE;
        mm.insert(Region::with_flags(va(0x1000), va(0x2000), rw).unwrap());
        assert_eq!(handle_page_fault(&mut mm, va(0x1000), WRITE), Err(FaultError::NoPageTable));
    }

    #[test]
    fn description_names_mode_access_and_cause() {
        let code = PageFaultErrorCode::USER_MODE | WRITE;
        assert_eq!(format!("{}", FaultDescription(code)), "U/W [no page found]");
        let code = PageFaultErrorCode::PROTECTION_VIOLATION;
        assert_eq!(format!("{}", FaultDescription(code)), "K/R [protection fault]");
    }
}
