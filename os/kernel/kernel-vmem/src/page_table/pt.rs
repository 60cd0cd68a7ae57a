//! # Page Table (PT)
//!
//! - [`TableIndex`]: index type for VA bits `[21:12]`.
//! - [`PageTableEntry`]: a leaf entry mapping one 4 KiB frame.
//! - [`PageTable`]: a 4 KiB-aligned array of 1024 entries.
//!
//! After modifying active mappings the caller must perform any required
//! TLB maintenance.

use crate::PageEntryBits;
use kernel_memory_addresses::{ENTRIES_PER_TABLE, PhysicalPage, VirtualAddress};

/// Index into a Page Table (VA bits `[21:12]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new(va.parts().table_index())
    }

    /// ### Debug assertions
    /// - Asserts `v < 1024`.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES_PER_TABLE);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// A single Page Table entry (PTE).
///
/// A present entry maps exactly one 4 KiB frame. The [`frame`](Self::frame)
/// is only meaningful while the entry is present; the zero entry is
/// returned for absent lookups.
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PageTableEntry(PageEntryBits);

impl PageTableEntry {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// A present 4 KiB leaf.
    #[inline]
    #[must_use]
    pub const fn make_4k(frame: PhysicalPage, flags: PageEntryBits) -> Self {
        Self(flags.with_present(true).with_large_page(false).with_frame(frame))
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    #[inline]
    #[must_use]
    pub const fn is_writable(self) -> bool {
        self.0.writable()
    }

    #[inline]
    #[must_use]
    pub const fn is_user(self) -> bool {
        self.0.user_access()
    }

    /// `true` if the entry borrows its frame instead of owning it.
    #[inline]
    #[must_use]
    pub const fn is_alias(self) -> bool {
        self.0.alias()
    }

    #[inline]
    #[must_use]
    pub const fn frame(self) -> PhysicalPage {
        self.0.frame()
    }

    /// The mapped frame and flags, if present.
    #[inline]
    #[must_use]
    pub const fn page_4k(self) -> Option<(PhysicalPage, PageEntryBits)> {
        if self.is_present() {
            Some((self.0.frame(), self.0))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }

    /// No validation is performed.
    #[inline]
    #[must_use]
    pub const fn from_raw(v: u32) -> Self {
        Self(PageEntryBits::from_bits(v))
    }
}

/// The Page Table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRIES_PER_TABLE],
}

impl PageTable {
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageTableEntry::zero(); ENTRIES_PER_TABLE],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PageTableEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PageTableEntry) {
        self.entries[i.as_usize()] = e;
    }

    pub fn zero(&mut self) {
        self.entries.fill(PageTableEntry::zero());
    }

    /// Present entries in index order.
    pub fn present(&self) -> impl Iterator<Item = PageTableEntry> + '_ {
        self.entries.iter().copied().filter(|e| e.is_present())
    }
}

const _: () = assert!(size_of::<PageTable>() == 4096);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pte_4k_leaf() {
        let frame = PhysicalPage::from_index(0x5555);
        let e = PageTableEntry::make_4k(frame, PageEntryBits::new_leaf(false, true, false));
        let (p, fl) = e.page_4k().unwrap();
        assert_eq!(p.base().as_u32(), 0x0555_5000);
        assert!(!fl.large_page());
        assert!(fl.user_access());
        assert!(!fl.writable());
        assert!(!e.is_alias());
        assert_eq!(PageTableEntry::from_raw(e.raw()), e);
    }

    #[test]
    fn zero_entry_is_absent() {
        assert!(PageTableEntry::zero().page_4k().is_none());
        assert_eq!(PageTableEntry::default().raw(), 0);
    }
}
