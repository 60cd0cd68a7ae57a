//! # Page Directory (PD)
//!
//! - [`DirectoryIndex`]: index type for virtual-address bits `[31:22]`.
//! - [`PageDirectoryEntry`]: points to a [`PageTable`](super::pt::PageTable).
//! - [`PageDirectory`]: a 4 KiB-aligned array of 1024 entries; its physical
//!   address is the CR3 value of the address space.

use crate::PageEntryBits;
use kernel_memory_addresses::{ENTRIES_PER_TABLE, PhysicalPage, VirtualAddress};

/// Index into the Page Directory (VA bits `[31:22]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DirectoryIndex(u16);

impl DirectoryIndex {
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new(va.parts().directory_index())
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

/// A single Page Directory entry (PDE).
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PageDirectoryEntry(PageEntryBits);

impl PageDirectoryEntry {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// Link to the page table in `table`.
    ///
    /// Directory entries are always writable; the leaf decides. `user`
    /// must be set if any page below is user-accessible.
    #[inline]
    #[must_use]
    pub const fn make_table(table: PhysicalPage, user: bool) -> Self {
        Self(
            PageEntryBits::new_kernel_rw()
                .with_user_access(user)
                .with_frame(table),
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    /// The page table frame, if present.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> Option<PhysicalPage> {
        if self.is_present() {
            Some(self.0.frame())
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn with_user_access(self, user: bool) -> Self {
        Self(self.0.with_user_access(user))
    }
}

/// The Page Directory: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PageDirectoryEntry; ENTRIES_PER_TABLE],
}

impl PageDirectory {
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageDirectoryEntry::zero(); ENTRIES_PER_TABLE],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: DirectoryIndex) -> PageDirectoryEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: DirectoryIndex, e: PageDirectoryEntry) {
        self.entries[i.as_usize()] = e;
    }

    pub fn zero(&mut self) {
        self.entries.fill(PageDirectoryEntry::zero());
    }

    /// Present entries with their index.
    pub fn present(&self) -> impl Iterator<Item = (DirectoryIndex, PhysicalPage)> + '_ {
        self.entries.iter().enumerate().filter_map(|(i, e)| {
            #[allow(clippy::cast_possible_truncation)]
            e.next_table().map(|t| (DirectoryIndex::new(i as u16), t))
        })
    }
}

const _: () = assert!(size_of::<PageDirectory>() == 4096);
