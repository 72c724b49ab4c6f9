//! # Virtual Memory Regions
//!
//! A region is a half-open range `[start, end)` of user virtual addresses
//! with one set of access rights. Regions are created free-standing and
//! then handed to an [`AddressSpace`](super::mm::AddressSpace), which
//! records itself as the owner.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use x86_64::VirtAddr;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VmFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
        const SHARE = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// Empty or inverted bounds, or flag bits outside [`VmFlags`].
    InvalidArgument,
    /// The range collides with an existing region.
    Overlap,
    /// No gap in the user window is large enough.
    NoSpace,
    NotFound,
    OutOfMemory,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::InvalidArgument => "invalid region bounds or flags",
            Self::Overlap => "range overlaps an existing region",
            Self::NoSpace => "no unmapped area large enough",
            Self::NotFound => "no such region",
            Self::OutOfMemory => "out of memory",
        };
        f.write_str(text)
    }
}

/// Identity of an address space, stored in each region it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpaceId(u64);

impl SpaceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a region inside one address space. Only meaningful for the
/// space that returned it, and only until that region is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    start: VirtAddr,
    end: VirtAddr,
    flags: VmFlags,
    pub(crate) owner: Option<SpaceId>,
}

impl Region {
    pub fn new(start: VirtAddr, end: VirtAddr, flags: u32) -> Result<Self, VmError> {
        let flags = VmFlags::from_bits(flags).ok_or(VmError::InvalidArgument)?;
        Self::with_flags(start, end, flags)
    }

    pub fn with_flags(start: VirtAddr, end: VirtAddr, flags: VmFlags) -> Result<Self, VmError> {
        if start >= end {
            return Err(VmError::InvalidArgument);
        }
        Ok(Self {
            start,
            end,
            flags,
            owner: None,
        })
    }

    pub fn start(&self) -> VirtAddr {
        self.start
    }

    pub fn end(&self) -> VirtAddr {
        self.end
    }

    pub fn flags(&self) -> VmFlags {
        self.flags
    }

    pub fn owner(&self) -> Option<SpaceId> {
        self.owner
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn contains(&self, addr: VirtAddr) -> bool {
        self.start <= addr && addr < self.end
    }

    pub fn overlaps(&self, start: VirtAddr, end: VirtAddr) -> bool {
        self.start < end && start < self.end
    }

    pub(crate) fn set_end(&mut self, end: VirtAddr) {
        debug_assert!(self.start < end);
        self.end = end;
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |flag: VmFlags, c: char| if self.flags.contains(flag) { c } else { '-' };
        write!(
            f,
            "[{:#x}, {:#x}) {}{}{}{}",
            self.start.as_u64(),
            self.end.as_u64(),
            bit(VmFlags::READ, 'r'),
            bit(VmFlags::WRITE, 'w'),
            bit(VmFlags::EXEC, 'x'),
            bit(VmFlags::SHARE, 's'),
        )
    }
}
