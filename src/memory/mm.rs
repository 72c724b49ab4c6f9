//! # Address Space
//!
//! The set of regions of one process plus the page table they are demand
//! paged into.
//!
//! ## Lookup structures
//!
//! ```text
//! slots:  [Some(r0), None, Some(r2), Some(r3)]   arena, ids are indices
//! list:   [r2, r0, r3]                           sorted by start
//! index:  {r2.start: r2, r0.start: r0, ...}      only once len >= 32
//! cache:  r0                                     last region found
//! ```
//!
//! `find` tries the cache, then the index when it exists, then the list.
//! Whichever answers, the result is the same region. The index is never
//! dropped again once built.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::cell::Cell;

use x86_64::VirtAddr;

use crate::config::{page_round_up, PAGE_SIZE, REGION_INDEX_THRESHOLD, USER_BASE, USER_TOP};
use crate::memory::paging::PageTable;
use crate::memory::vma::{Region, RegionId, SpaceId, VmError, VmFlags};

pub struct AddressSpace {
    id: SpaceId,
    slots: Vec<Option<Region>>,
    free: Vec<usize>,
    list: Vec<RegionId>,
    index: Option<BTreeMap<VirtAddr, RegionId>>,
    cache: Cell<Option<RegionId>>,
    pgdir: Option<Box<dyn PageTable>>,
    brk_start: VirtAddr,
    brk: VirtAddr,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self {
            id: SpaceId::next(),
            slots: Vec::new(),
            free: Vec::new(),
            list: Vec::new(),
            index: None,
            cache: Cell::new(None),
            pgdir: None,
            brk_start: VirtAddr::zero(),
            brk: VirtAddr::zero(),
        }
    }

    pub fn with_page_table(pgdir: Box<dyn PageTable>) -> Self {
        let mut mm = Self::new();
        mm.pgdir = Some(pgdir);
        mm
    }

    pub fn id(&self) -> SpaceId {
        self.id
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    pub fn page_table(&self) -> Option<&dyn PageTable> {
        self.pgdir.as_deref()
    }

    pub fn page_table_mut(&mut self) -> Option<&mut (dyn PageTable + 'static)> {
        self.pgdir.as_deref_mut()
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Regions in ascending address order.
    pub fn regions(&self) -> impl Iterator<Item = &Region> + '_ {
        self.list.iter().filter_map(move |id| self.region(*id))
    }

    /// Adds `region`, which must not overlap any region already present.
    pub fn insert(&mut self, mut region: Region) -> RegionId {
        debug_assert!(
            self.find_intersection(region.start(), region.end()).is_none(),
            "region {} overlaps an existing region",
            region
        );

        region.owner = Some(self.id);
        let start = region.start();
        let id = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(region);
                RegionId(slot)
            }
            None => {
                self.slots.push(Some(region));
                RegionId(self.slots.len() - 1)
            }
        };

        let position = self.list.partition_point(|other| self.start_of(*other) < start);
        self.list.insert(position, id);

        if let Some(index) = self.index.as_mut() {
            index.insert(start, id);
        } else if self.list.len() >= REGION_INDEX_THRESHOLD {
            self.build_index();
        }
        id
    }

    fn build_index(&mut self) {
        let index = self
            .list
            .iter()
            .map(|id| (self.start_of(*id), *id))
            .collect::<BTreeMap<_, _>>();
        self.index = Some(index);
    }

    fn start_of(&self, id: RegionId) -> VirtAddr {
        self.region(id).map_or(VirtAddr::zero(), Region::start)
    }

    pub fn find(&self, addr: VirtAddr) -> Option<&Region> {
        self.find_id(addr).and_then(|id| self.region(id))
    }

    pub fn find_id(&self, addr: VirtAddr) -> Option<RegionId> {
        if let Some(id) = self.cache.get() {
            if self.region(id).is_some_and(|region| region.contains(addr)) {
                return Some(id);
            }
        }

        let found = match &self.index {
            Some(index) => index
                .range(..=addr)
                .next_back()
                .map(|(_, id)| *id)
                .filter(|id| self.region(*id).is_some_and(|region| region.contains(addr))),
            None => self
                .list
                .iter()
                .copied()
                .find(|id| self.region(*id).is_some_and(|region| region.contains(addr))),
        };

        if found.is_some() {
            self.cache.set(found);
        }
        found
    }

    /// First region overlapping `[start, end)`.
    pub fn find_intersection(&self, start: VirtAddr, end: VirtAddr) -> Option<&Region> {
        let first = self.list.partition_point(|id| {
            self.region(*id).is_some_and(|region| region.end() <= start)
        });
        self.list[first..]
            .iter()
            .filter_map(|id| self.region(*id))
            .take_while(|region| region.start() < end)
            .find(|region| region.overlaps(start, end))
    }

    /// Detaches a region. Pages it had mapped are left alone.
    pub fn remove(&mut self, id: RegionId) -> Option<Region> {
        let mut region = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        self.list.retain(|other| *other != id);
        if let Some(index) = self.index.as_mut() {
            index.remove(&region.start());
        }
        if self.cache.get() == Some(id) {
            self.cache.set(None);
        }
        region.owner = None;
        Some(region)
    }

    /// Moves the end of a region, refusing to grow into its neighbour.
    pub fn extend(&mut self, id: RegionId, end: VirtAddr) -> Result<(), VmError> {
        let region = self.region(id).ok_or(VmError::NotFound)?;
        if end <= region.start() {
            return Err(VmError::InvalidArgument);
        }
        let old_end = region.end();
        if end > old_end && self.find_intersection(old_end, end).is_some() {
            return Err(VmError::Overlap);
        }
        if end < old_end {
            if let Some(pgdir) = self.pgdir.as_deref_mut() {
                pgdir.unmap_range(end, old_end);
            }
        }
        if let Some(Some(region)) = self.slots.get_mut(id.0) {
            region.set_end(end);
        }
        Ok(())
    }

    /// Removes `[start, end)` from every region it touches, splitting
    /// regions that straddle it, and unmaps the pages that were backing it.
    pub fn unmap_range(&mut self, start: VirtAddr, end: VirtAddr) -> Result<(), VmError> {
        if start >= end {
            return Err(VmError::InvalidArgument);
        }
        let touched: Vec<RegionId> = self
            .list
            .iter()
            .copied()
            .filter(|id| self.region(*id).is_some_and(|region| region.overlaps(start, end)))
            .collect();

        for id in touched {
            let Some(region) = self.remove(id) else {
                continue;
            };
            if region.start() < start {
                self.insert(Region::with_flags(region.start(), start, region.flags())?);
            }
            if end < region.end() {
                self.insert(Region::with_flags(end, region.end(), region.flags())?);
            }
            if let Some(pgdir) = self.pgdir.as_deref_mut() {
                pgdir.unmap_range(region.start().max(start), region.end().min(end));
            }
        }
        Ok(())
    }

    /// Lowest gap of `len` bytes inside the user window.
    pub fn get_unmapped_area(&self, len: u64) -> Option<VirtAddr> {
        if len == 0 || len > USER_TOP {
            return None;
        }
        let len = page_round_up(len);
        let mut candidate = USER_BASE;
        for region in self.regions() {
            let (start, end) = (region.start().as_u64(), region.end().as_u64());
            if end <= candidate {
                continue;
            }
            if start >= candidate && start - candidate >= len {
                break;
            }
            candidate = page_round_up(end);
        }
        (candidate.checked_add(len)? <= USER_TOP).then(|| VirtAddr::new(candidate))
    }

    /// Adds a demand-paged region at `addr`, or at the first gap that fits
    /// when no address is given.
    pub fn map(&mut self, addr: Option<VirtAddr>, len: u64, flags: VmFlags) -> Result<VirtAddr, VmError> {
        if len == 0 || len > USER_TOP {
            return Err(VmError::InvalidArgument);
        }
        let start = match addr {
            Some(addr) => addr.align_down(PAGE_SIZE),
            None => self.get_unmapped_area(len).ok_or(VmError::NoSpace)?,
        };
        let end = page_round_up(start.as_u64().checked_add(len).ok_or(VmError::InvalidArgument)?);
        if start.as_u64() < USER_BASE || end > USER_TOP {
            return Err(VmError::InvalidArgument);
        }
        let end = VirtAddr::new(end);
        if self.find_intersection(start, end).is_some() {
            return Err(VmError::Overlap);
        }
        self.insert(Region::with_flags(start, end, flags)?);
        Ok(start)
    }

    pub fn set_heap_start(&mut self, start: VirtAddr) {
        let start = VirtAddr::new(page_round_up(start.as_u64()));
        self.brk_start = start;
        self.brk = start;
    }

    pub fn heap_bounds(&self) -> (VirtAddr, VirtAddr) {
        (self.brk_start, self.brk)
    }

    /// Moves the program break. Requests below the heap start leave it
    /// where it is; the current break is returned either way.
    pub fn brk(&mut self, requested: VirtAddr) -> Result<VirtAddr, VmError> {
        if requested < self.brk_start {
            return Ok(self.brk);
        }
        let rounded = page_round_up(requested.as_u64());
        if rounded >= USER_TOP {
            return Err(VmError::InvalidArgument);
        }
        let new_brk = VirtAddr::new(rounded);
        let old_brk = self.brk;
        if new_brk < old_brk {
            self.unmap_range(new_brk, old_brk)?;
        } else if new_brk > old_brk {
            // keep one guard page free above the heap
            if self.find_intersection(old_brk, new_brk + PAGE_SIZE).is_some() {
                return Err(VmError::Overlap);
            }
            let heap_flags = VmFlags::READ | VmFlags::WRITE;
            let tail = if old_brk > self.brk_start {
                self.find_id(old_brk - 1u64).filter(|id| {
                    self.region(*id)
                        .is_some_and(|region| region.end() == old_brk && region.flags() == heap_flags)
                })
            } else {
                None
            };
            match tail {
                Some(id) => self.extend(id, new_brk)?,
                None => {
                    self.insert(Region::with_flags(old_brk, new_brk, heap_flags)?);
                }
            }
        }
        self.brk = new_brk;
        Ok(new_brk)
    }

    /// Logs every region and how many of its pages are resident.
    pub fn dump(&self) {
        log::info!(
            "address space {:?}: {} regions{}",
            self.id,
            self.len(),
            if self.is_indexed() { ", indexed" } else { "" }
        );
        for region in self.regions() {
            let resident = self
                .page_table()
                .map_or(0, |pgdir| pgdir.mapped_pages(region.start(), region.end()));
            log::info!("  {} {} pages resident", region, resident);
        }
        if let Some(pgdir) = self.page_table() {
            log::info!("  root {:#x}", pgdir.root().as_u64());
        }
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        let Some(pgdir) = self.pgdir.as_deref_mut() else {
            return;
        };
        for id in &self.list {
            if let Some(Some(region)) = self.slots.get(id.0) {
                pgdir.unmap_range(region.start(), region.end());
            }
        }
    }
}
