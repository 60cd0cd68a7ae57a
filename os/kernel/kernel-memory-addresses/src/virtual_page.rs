use crate::{MemoryAddress, PAGE_SHIFT, PAGES_PER_ADDRESS_SPACE, VirtualAddress};
use core::fmt;

/// Virtual 4 KiB page base.
///
/// ### Invariants
/// - The low 12 bits of the base are always zero.
/// - [`index`](Self::index) is the flattened `directory * 1024 + table`
///   position of the page, in `0..PAGES_PER_ADDRESS_SPACE`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(MemoryAddress);

impl VirtualPage {
    /// Page that contains `va` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing(va: VirtualAddress) -> Self {
        Self(va.0.align_down())
    }

    /// Page at flattened index `index`.
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
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress(self.0)
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0.page_index()
    }

    /// Combine with an in-page offset to form a full address.
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u32) -> VirtualAddress {
        debug_assert!(offset < crate::PAGE_SIZE);
        VirtualAddress::new(self.0.as_u32() | offset)
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage(0x{:08X})", self.0.as_u32())
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
