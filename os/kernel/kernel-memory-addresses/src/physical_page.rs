use crate::{MemoryAddress, PAGE_SHIFT, PAGES_PER_ADDRESS_SPACE, PhysicalAddress};
use core::fmt;

/// Physical 4 KiB frame base.
///
/// A `PhysicalPage` represents the **page-aligned base** of a physical frame.
/// Its [`index`](Self::index) is the frame number stored in page-table
/// entries and used as the bit position in the physical frame bitmap.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let frame = PhysicalPage::from_index(0x300);
/// assert_eq!(frame.base().as_u32(), 0x0030_0000);
/// assert_eq!(frame.join(0x10).as_u32(), 0x0030_0010);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage(MemoryAddress);

impl PhysicalPage {
    /// Frame that contains `pa` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing(pa: PhysicalAddress) -> Self {
        Self(pa.0.align_down())
    }

    /// Frame with frame number `index`.
    ///
    /// ### Debug assertions
    /// - Asserts `index < PAGES_PER_ADDRESS_SPACE`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_index(index: usize) -> Self {
        debug_assert!(index < PAGES_PER_ADDRESS_SPACE);
        Self(MemoryAddress::new((index as u32) << PAGE_SHIFT))
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress(self.0)
    }

    /// Frame number (`base >> 12`).
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0.page_index()
    }

    #[inline]
    #[must_use]
    pub const fn join(self, offset: u32) -> PhysicalAddress {
        debug_assert!(offset < crate::PAGE_SIZE);
        PhysicalAddress::new(self.0.as_u32() | offset)
    }
}

impl fmt::Display for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage(0x{:08X})", self.0.as_u32())
    }
}
