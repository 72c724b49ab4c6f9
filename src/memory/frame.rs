//! # Physical Frame Allocator
//!
//! Bump allocator over the largest usable region of the boot memory map.
//! Frames are never returned; page teardown only drops the mapping.

use core::sync::atomic::{AtomicU64, Ordering};

use bootloader_api::info::{MemoryRegion, MemoryRegionKind};
use x86_64::structures::paging::{FrameAllocator, PhysFrame, Size4KiB};
use x86_64::PhysAddr;

use crate::config::PAGE_SIZE;

/// Frames below this stay with the bootloader and legacy devices.
const LOW_MEMORY_LIMIT: u64 = 16 * 1024 * 1024;

pub struct BumpFrames {
    next: AtomicU64,
    end: AtomicU64,
}

impl BumpFrames {
    pub const fn empty() -> Self {
        Self {
            next: AtomicU64::new(0),
            end: AtomicU64::new(0),
        }
    }

    pub fn reset(&self, start: u64, end: u64) {
        self.end.store(end, Ordering::Release);
        self.next.store(start, Ordering::Release);
    }

    pub fn allocate(&self) -> Option<PhysFrame<Size4KiB>> {
        loop {
            let current = self.next.load(Ordering::Relaxed);
            let frame_addr = (current + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
            let next_frame = frame_addr + PAGE_SIZE;

            if next_frame > self.end.load(Ordering::Relaxed) {
                return None;
            }

            match self.next.compare_exchange_weak(
                current,
                next_frame,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(PhysFrame::containing_address(PhysAddr::new(frame_addr))),
                Err(_) => continue,
            }
        }
    }

    pub fn remaining(&self) -> u64 {
        let next = self.next.load(Ordering::Relaxed);
        self.end.load(Ordering::Relaxed).saturating_sub(next) / PAGE_SIZE
    }
}

static FRAMES: BumpFrames = BumpFrames::empty();

pub struct GlobalFrameAllocator;

unsafe impl FrameAllocator<Size4KiB> for GlobalFrameAllocator {
    fn allocate_frame(&mut self) -> Option<PhysFrame<Size4KiB>> {
        FRAMES.allocate()
    }
}

pub fn free_frames() -> u64 {
    FRAMES.remaining()
}

/// Largest usable `(start, end)` range, clipped above low memory.
fn pick_range(regions: impl Iterator<Item = (u64, u64)>) -> Option<(u64, u64)> {
    let (start, end) = regions.max_by_key(|(start, end)| end - start)?;
    let start = start.max(LOW_MEMORY_LIMIT);
    (start + PAGE_SIZE <= end).then_some((start, end))
}

/// # Safety
/// `regions` must be the boot memory map. Must be called once, before any
/// page is demand-mapped.
pub unsafe fn init(regions: &[MemoryRegion]) -> Result<(), &'static str> {
    let usable = regions
        .iter()
        .filter(|region| region.kind == MemoryRegionKind::Usable)
        .map(|region| (region.start, region.end));
    let (start, end) = pick_range(usable).ok_or("No usable memory found")?;

    FRAMES.reset(start, end);
    log::info!(
        "frame allocator: {:#x}..{:#x} ({} frames)",
        start,
        end,
        FRAMES.remaining()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_hands_out_aligned_frames_until_exhausted() {
        let frames = BumpFrames::empty();
        frames.reset(0x10_0800, 0x10_3000);
        assert_eq!(frames.allocate().map(|f| f.start_address().as_u64()), Some(0x10_1000));
        assert_eq!(frames.allocate().map(|f| f.start_address().as_u64()), Some(0x10_2000));
        assert_eq!(frames.allocate(), None);
        assert_eq!(frames.remaining(), 0);
    }

    #[test]
    fn picks_the_largest_region_above_low_memory() {
        let regions = [(0x1000, 0x9_f000), (0x10_0000, 0x800_0000), (0x900_0000, 0x980_0000)];
        assert_eq!(
            pick_range(regions.into_iter()),
            Some((LOW_MEMORY_LIMIT, 0x800_0000))
        );
        assert_eq!(pick_range([(0x1000, 0x2000)].into_iter()), None);
        assert_eq!(pick_range(core::iter::empty()), None);
    }
}
