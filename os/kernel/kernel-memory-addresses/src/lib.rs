//! # Virtual and Physical Memory Address Types (32-bit x86)
//!
//! Strongly typed wrappers for raw 32-bit addresses and 4 KiB page bases used
//! by the paging and memory management code.
//!
//! ## Overview
//!
//! The types prevent mixing virtual and physical addresses at compile time
//! while remaining zero-cost wrappers around `u32` values.
//!
//! | Concept | Description |
//! |----------|-------------|
//! | [`MemoryAddress`] | A raw 32-bit address, either physical or virtual. |
//! | [`VirtualAddress`] / [`VirtualPage`] | Virtual (page-table translated) memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage`] | Physical memory or MMIO regions. |
//! | [`VirtualAddressParts`] | The two-level lookup key of a virtual address. |
//!
//! ## Two-level decomposition
//!
//! Without PAE, x86 translates a 32-bit virtual address through a page
//! directory and one page table:
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | Directory | Table | Offset |
//! ```
//!
//! Both indices select one of [`ENTRIES_PER_TABLE`] entries; the offset
//! selects a byte inside the 4 KiB page.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0040_3123);
//! let parts = va.parts();
//! assert_eq!(parts.directory_index(), 1);
//! assert_eq!(parts.table_index(), 3);
//! assert_eq!(parts.offset(), 0x123);
//!
//! let (page, off) = va.split();
//! assert_eq!(page.index(), 0x403);
//! assert_eq!(page.join(off), va);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod memory_address;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use crate::memory_address::MemoryAddress;
pub use crate::physical_address::PhysicalAddress;
pub use crate::physical_page::PhysicalPage;
pub use crate::virtual_address::{VirtualAddress, VirtualAddressParts};
pub use crate::virtual_page::VirtualPage;

/// Size of a page (virtual) or frame (physical) in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// log2 of [`PAGE_SIZE`]; the number of offset bits in an address.
pub const PAGE_SHIFT: u32 = 12;

/// Number of entries in a page directory and in a page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Number of 4 KiB pages in a full 32-bit address space.
pub const PAGES_PER_ADDRESS_SPACE: usize = ENTRIES_PER_TABLE * ENTRIES_PER_TABLE;

/// Number of pages needed to cover `bytes` bytes starting at a page boundary.
///
/// ```rust
/// # use kernel_memory_addresses::pages_spanning;
/// assert_eq!(pages_spanning(0), 0);
/// assert_eq!(pages_spanning(1), 1);
/// assert_eq!(pages_spanning(4096), 1);
/// assert_eq!(pages_spanning(4097), 2);
/// ```
#[inline]
#[must_use]
pub const fn pages_spanning(bytes: usize) -> usize {
    bytes.div_ceil(PAGE_SIZE as usize)
}

const _: () = {
    assert!(1 << PAGE_SHIFT == PAGE_SIZE);
    assert!(PAGES_PER_ADDRESS_SPACE << PAGE_SHIFT == 1 << 32);
};
