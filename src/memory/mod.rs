//! Virtual memory: physical frames, the page-table seam, user regions and
//! the page-fault resolver.

pub mod frame;
pub mod mm;
pub mod paging;
pub mod pgfault;
pub mod vma;

pub use mm::AddressSpace;
pub use pgfault::{handle_page_fault, FaultError};
pub use vma::{Region, VmError, VmFlags};
