//! # Physical Frame Allocator
//!
//! A [`Bitmap`] over every 4 KiB frame of the 32-bit physical address space.
//! All frames start unavailable; the boot memory map then releases the
//! usable RAM above the kernel image.
//!
//! Every frame handed out is written through the kernel's identity window
//! (page directories, page tables, zeroed `mmap` pages), so only RAM below
//! [`KERNEL_WINDOW_END`] is managed.

use kernel_info::boot::BootMemoryMap;
use kernel_info::memory::KERNEL_WINDOW_END;
use kernel_memory_addresses::{PAGE_SIZE, PAGES_PER_ADDRESS_SPACE, PhysicalAddress, PhysicalPage};
use kernel_vmem::bitmap::Bitmap;
use kernel_vmem::{FrameAlloc, FrameAllocError};
use log::{debug, trace};

/// Bitmap-backed frame allocator (`true` = frame available).
pub struct BitmapFrameAlloc {
    frames: Bitmap,
    /// Lowest index that may be available; the search starts here.
    hint: usize,
}

impl Default for BitmapFrameAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl BitmapFrameAlloc {
    /// An allocator with no available frames.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: Bitmap::new(PAGES_PER_ADDRESS_SPACE, false),
            hint: 0,
        }
    }

    /// Seed from the boot memory map.
    ///
    /// Usable regions become available, except frame 0, every frame below
    /// `reserved_end` (the end of the kernel image) and every frame at or
    /// above [`KERNEL_WINDOW_END`]. Partial frames at region edges are
    /// skipped.
    #[must_use]
    pub fn from_memory_map(map: &BootMemoryMap<'_>, reserved_end: PhysicalAddress) -> Self {
        let mut alloc = Self::new();
        let floor = reserved_end.as_usize().div_ceil(PAGE_SIZE as usize).max(1);
        let ceiling = (KERNEL_WINDOW_END / PAGE_SIZE) as usize;
        let mut unmanaged = 0;
        for region in map.usable() {
            let first = usize::try_from(region.base.div_ceil(u64::from(PAGE_SIZE)))
                .unwrap_or(usize::MAX)
                .max(floor);
            let end = usize::try_from(region.end_clipped() / u64::from(PAGE_SIZE))
                .unwrap_or(PAGES_PER_ADDRESS_SPACE)
                .min(PAGES_PER_ADDRESS_SPACE);
            unmanaged += end.saturating_sub(first.max(ceiling));
            let end = end.min(ceiling);
            if first < end {
                alloc.release_range(first, end - first);
            }
        }
        debug!(
            "frames: {} available ({} KiB) from {} usable region(s)",
            alloc.available_frames(),
            alloc.available_frames() * (PAGE_SIZE as usize / 1024),
            map.usable().count()
        );
        if unmanaged > 0 {
            debug!("frames: {unmanaged} usable frame(s) above the identity window left unmanaged");
        }
        alloc
    }

    /// Make `count` frames from frame index `first` available.
    pub fn release_range(&mut self, first: usize, count: usize) {
        let count = count.min(PAGES_PER_ADDRESS_SPACE.saturating_sub(first));
        if self.frames.set_range(first, count, true).is_ok() {
            self.hint = self.hint.min(first);
        }
    }

    #[must_use]
    pub fn available_frames(&self) -> usize {
        self.frames.count_trues()
    }
}

impl FrameAlloc for BitmapFrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage> {
        let index = self.frames.get_next_true(self.hint)?;
        self.frames.set_bit(index, false).ok()?;
        self.hint = index + 1;
        let frame = PhysicalPage::from_index(index);
        trace!("frames: alloc {frame}");
        Some(frame)
    }

    fn free_4k(&mut self, frame: PhysicalPage) -> Result<(), FrameAllocError> {
        let index = frame.index();
        match self.frames.get(index) {
            None => Err(FrameAllocError::OutOfRange(frame)),
            Some(true) => Err(FrameAllocError::DoubleFree(frame)),
            Some(false) => {
                self.frames
                    .set_bit(index, true)
                    .map_err(|_| FrameAllocError::OutOfRange(frame))?;
                self.hint = self.hint.min(index);
                trace!("frames: free {frame}");
                Ok(())
            }
        }
    }

    fn reserve_4k(&mut self, frame: PhysicalPage) -> Result<(), FrameAllocError> {
        self.frames
            .set_bit(frame.index(), false)
            .map_err(|_| FrameAllocError::OutOfRange(frame))
    }

    fn is_available(&self, frame: PhysicalPage) -> bool {
        self.frames.get(frame.index()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::boot::{MemoryRegion, MemoryRegionKind};
    use kernel_info::memory::PHYS_LOAD;

    fn map_fixture() -> [MemoryRegion; 3] {
        [
            MemoryRegion::new(0, 0x9_F000, MemoryRegionKind::Usable),
            MemoryRegion::new(0x9_F000, 0x6_1000, MemoryRegionKind::Reserved),
            MemoryRegion::new(0x10_0000, 0x40_0800, MemoryRegionKind::Usable),
        ]
    }

    #[test]
    fn seeds_usable_frames_above_kernel() {
        let regions = map_fixture();
        let alloc = BitmapFrameAlloc::from_memory_map(
            &BootMemoryMap::new(&regions),
            PhysicalAddress::new(0x20_0000),
        );
        // [0x200, 0x500) from the high region; the low region is below the kernel end.
        assert_eq!(alloc.available_frames(), 0x300);
        assert!(!alloc.is_available(PhysicalPage::from_index(0x1FF)));
        assert!(alloc.is_available(PhysicalPage::from_index(0x200)));
        assert!(!alloc.is_available(PhysicalPage::from_index(0x500)));
    }

    #[test]
    fn frame_zero_is_never_available() {
        let regions = map_fixture();
        let map = BootMemoryMap::new(&regions);
        let alloc = BitmapFrameAlloc::from_memory_map(&map, PhysicalAddress::zero());
        assert!(!alloc.is_available(PhysicalPage::from_index(0)));
        assert!(alloc.is_available(PhysicalPage::from_index(1)));
    }

    #[test]
    fn alloc_free_reuses_lowest() {
        let mut alloc = BitmapFrameAlloc::new();
        alloc.release_range(10, 4);
        let a = alloc.alloc_4k().unwrap();
        let b = alloc.alloc_4k().unwrap();
        assert_eq!((a.index(), b.index()), (10, 11));
        alloc.free_4k(a).unwrap();
        assert_eq!(alloc.alloc_4k(), Some(a));
        let last = PhysicalPage::from_index(13);
        assert_eq!(alloc.free_4k(last), Err(FrameAllocError::DoubleFree(last)));
    }

    #[test]
    fn ram_above_identity_window_is_not_managed() {
        let regions = [MemoryRegion::new(0x0FF0_0000, 0x20_0000, MemoryRegionKind::Usable)];
        let mut alloc = BitmapFrameAlloc::from_memory_map(
            &BootMemoryMap::new(&regions),
            PhysicalAddress::new(PHYS_LOAD),
        );
        assert_eq!(alloc.available_frames(), 0x100);
        assert!(alloc.is_available(PhysicalPage::from_index(0xFFFF)));
        assert!(!alloc.is_available(PhysicalPage::from_index(0x1_0000)));

        let mut last = None;
        while let Some(frame) = alloc.alloc_4k() {
            last = Some(frame);
        }
        assert_eq!(last, Some(PhysicalPage::from_index(0xFFFF)));
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut alloc = BitmapFrameAlloc::new();
        alloc.release_range(5, 1);
        assert!(alloc.alloc_4k().is_some());
        assert!(alloc.alloc_4k().is_none());
    }

    #[test]
    fn reserve_is_idempotent() {
        let mut alloc = BitmapFrameAlloc::new();
        alloc.release_range(0x100, 2);
        let f = PhysicalPage::from_index(0x100);
        alloc.reserve_4k(f).unwrap();
        alloc.reserve_4k(f).unwrap();
        assert_eq!(alloc.available_frames(), 1);
        assert_eq!(alloc.alloc_4k(), Some(PhysicalPage::from_index(0x101)));
    }
}
