//! # 32-bit x86 Paging Structures
//!
//! Without PAE the walk has two levels, each a 4 KiB frame of 1024 32-bit
//! entries:
//!
//! ```text
//!  CR3 → Page Directory ─(PDE)→ Page Table ─(PTE)→ 4 KiB frame
//! ```
//!
//! - [`pd`]: the directory and its entries (one per 4 MiB of address space).
//! - [`pt`]: the tables and their leaf entries.

pub mod pd;
pub mod pt;

use crate::page_table::pd::DirectoryIndex;
use crate::page_table::pt::TableIndex;
use kernel_memory_addresses::VirtualAddress;

/// Split a virtual address into its directory and table indices.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (DirectoryIndex, TableIndex) {
    (DirectoryIndex::from(va), TableIndex::from(va))
}

/// Split a flattened page index (`dir * 1024 + table`) into its two indices.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn split_page_index(index: usize) -> (DirectoryIndex, TableIndex) {
    (
        DirectoryIndex::new((index / kernel_memory_addresses::ENTRIES_PER_TABLE) as u16),
        TableIndex::new((index % kernel_memory_addresses::ENTRIES_PER_TABLE) as u16),
    )
}
