//! # Boot Memory Map
//!
//! The boot loader hands the kernel a list of physical memory regions
//! (multiboot2 `mmap` tag). The kernel seeds its physical frame allocator
//! from the [`MemoryRegionKind::Usable`] entries.

use kernel_memory_addresses::PhysicalAddress;

/// Region classification, numbered like the multiboot2 memory map.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemoryRegionKind {
    /// RAM the kernel may hand out.
    Usable = 1,
    Reserved = 2,
    AcpiReclaimable = 3,
    AcpiNvs = 4,
    BadMemory = 5,
}

impl MemoryRegionKind {
    /// Map a raw multiboot2 type; unknown values are treated as reserved.
    #[must_use]
    pub const fn from_multiboot(raw: u32) -> Self {
        match raw {
            1 => Self::Usable,
            3 => Self::AcpiReclaimable,
            4 => Self::AcpiNvs,
            5 => Self::BadMemory,
            _ => Self::Reserved,
        }
    }
}

/// One physical memory region.
///
/// Lengths are 64-bit because firmware reports regions above 4 GiB;
/// those are clipped by [`MemoryRegion::end_clipped`].
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u64,
    pub length: u64,
    pub kind: MemoryRegionKind,
}

impl MemoryRegion {
    #[must_use]
    pub const fn new(base: u64, length: u64, kind: MemoryRegionKind) -> Self {
        Self { base, length, kind }
    }

    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self.kind, MemoryRegionKind::Usable)
    }

    /// Start of the region, or `None` if it lies entirely above 4 GiB.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn start(&self) -> Option<PhysicalAddress> {
        if self.base > u32::MAX as u64 {
            None
        } else {
            Some(PhysicalAddress::new(self.base as u32))
        }
    }

    /// Exclusive end of the region, clipped to the 32-bit physical space.
    #[must_use]
    pub const fn end_clipped(&self) -> u64 {
        let end = self.base.saturating_add(self.length);
        if end > 1 << 32 { 1 << 32 } else { end }
    }
}

/// The memory map passed from the boot loader.
#[derive(Copy, Clone, Debug)]
pub struct BootMemoryMap<'a> {
    regions: &'a [MemoryRegion],
}

impl<'a> BootMemoryMap<'a> {
    #[must_use]
    pub const fn new(regions: &'a [MemoryRegion]) -> Self {
        Self { regions }
    }

    #[must_use]
    pub const fn regions(&self) -> &'a [MemoryRegion] {
        self.regions
    }

    /// Usable RAM regions in boot-loader order.
    pub fn usable(&self) -> impl Iterator<Item = &'a MemoryRegion> + 'a {
        self.regions.iter().filter(|r| r.is_usable())
    }

    /// Total usable bytes below 4 GiB.
    #[must_use]
    pub fn usable_bytes(&self) -> u64 {
        self.usable()
            .map(|r| r.end_clipped().saturating_sub(r.base.min(1 << 32)))
            .sum()
    }
}
