//! # Virtual Memory Support
//!
//! 32-bit x86 paging for the kernel and its user processes.
//!
//! ## What you get
//! - A [`PagingTable`] owning one page directory and the page tables below it,
//!   together with a bitmap of the virtual pages it has handed out.
//! - A page-granular [`Bitmap`](bitmap::Bitmap) (`true` = available), shared
//!   with the physical frame allocator.
//! - Typed [`PageDirectory`](page_table::pd::PageDirectory) /
//!   [`PageTable`](page_table::pt::PageTable) views and the raw
//!   [`PageEntryBits`] layout.
//! - The seams the rest of the kernel plugs into: [`FrameAlloc`] (physical
//!   frames), [`PhysMapper`] (touching physical memory) and [`AliasMapper`]
//!   (borrowing user buffers into kernel space).
//!
//! ## x86 Virtual Address → Physical Address Walk
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | Directory | Table | Offset |
//! ```
//!
//! CR3 holds the physical address of the page directory. Each present
//! directory entry points at a page table covering 4 MiB; each present table
//! entry maps one 4 KiB frame. The offset selects the byte within it.
//!
//! ## Ownership of frames
//!
//! A mapping either **owns** its frame (it came from the frame allocator and
//! goes back there on unmap) or is an **alias** of memory owned elsewhere:
//! a user buffer lent to the kernel for I/O, or identity-mapped device
//! memory. Aliases occupy a virtual slot but never touch the frame allocator.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

extern crate alloc;

pub mod bitmap;
mod page_entry_bits;
pub mod page_table;
mod paging_table;

pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::pd::{PageDirectory, PageDirectoryEntry};
pub use crate::page_table::pt::{PageTable, PageTableEntry};
pub use crate::paging_table::{PagingError, PagingTable};

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

/// Errors reported by a [`FrameAlloc`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameAllocError {
    #[error("frame {0} is outside the managed physical range")]
    OutOfRange(PhysicalPage),
    #[error("frame {0} was freed while already available")]
    DoubleFree(PhysicalPage),
}

/// Physical 4 KiB frame allocator.
///
/// The implementation decides where frames come from (boot memory map,
/// bitmap, test pool). Returned frames are 4 KiB aligned by construction.
pub trait FrameAlloc {
    /// Take one available frame, marking it in use. `None` on out-of-memory.
    fn alloc_4k(&mut self) -> Option<PhysicalPage>;

    /// Return a frame to the pool.
    ///
    /// # Errors
    /// Fails if the frame is not managed or already available.
    fn free_4k(&mut self, frame: PhysicalPage) -> Result<(), FrameAllocError>;

    /// Mark a specific frame in use. Reserving a frame that is already in
    /// use is not an error.
    ///
    /// # Errors
    /// Fails if the frame is not managed by this allocator.
    fn reserve_4k(&mut self, frame: PhysicalPage) -> Result<(), FrameAllocError>;

    /// Whether `frame` is currently available.
    fn is_available(&self, frame: PhysicalPage) -> bool;
}

/// Converts physical addresses to *temporarily* usable references in the
/// current virtual address space.
///
/// - **Kernel**: the low window is identity-mapped, so `pa` is its own VA.
/// - **Tests**: a vector of aligned frames stands in for RAM.
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// - `pa` must be mapped writable in the current address space.
    /// - Lifetime `'a` is not checked; the mapping must remain valid for it.
    /// - `T` must match the bytes at `pa` and no other live reference may
    ///   alias them.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// Typed access to paging structures through a [`PhysMapper`].
#[allow(clippy::mut_from_ref)]
pub(crate) trait PhysMapperExt: PhysMapper {
    #[inline(always)]
    fn pd_mut(&self, page: PhysicalPage) -> &mut PageDirectory {
        // SAFETY: callers only pass frames that hold a page directory.
        unsafe { self.phys_to_mut::<PageDirectory>(page.base()) }
    }

    #[inline(always)]
    fn pt_mut(&self, page: PhysicalPage) -> &mut PageTable {
        // SAFETY: callers only pass frames that hold a page table.
        unsafe { self.phys_to_mut::<PageTable>(page.base()) }
    }
}

impl<M: PhysMapper + ?Sized> PhysMapperExt for M {}

/// Errors from borrowing or returning an aliased range.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AliasError {
    #[error("user address {0} is not mapped")]
    NotMapped(VirtualAddress),
    #[error("no contiguous kernel virtual range of {pages} pages")]
    OutOfVirtualSpace { pages: usize },
    #[error("no source address space to alias from")]
    NoSourceSpace,
    #[error("empty alias request")]
    Empty,
    #[error(transparent)]
    Paging(#[from] PagingError),
}

/// Lends a user buffer to the kernel by mapping the same frames at a kernel
/// virtual address.
///
/// Ranges are expressed as a page-aligned base plus a byte length; the same
/// `(base, length)` pair passed to [`map_user_range_to_kernel`] must be
/// passed to [`unmap_kernel_range`] with the returned base.
///
/// [`map_user_range_to_kernel`]: AliasMapper::map_user_range_to_kernel
/// [`unmap_kernel_range`]: AliasMapper::unmap_kernel_range
pub trait AliasMapper {
    /// Map `length` bytes starting at the page-aligned `user` address into
    /// kernel space and return the kernel base.
    ///
    /// # Errors
    /// Fails if a user page is absent or no kernel range is free.
    fn map_user_range_to_kernel(
        &mut self,
        user: VirtualAddress,
        length: usize,
    ) -> Result<VirtualAddress, AliasError>;

    /// Undo a mapping returned by
    /// [`map_user_range_to_kernel`](Self::map_user_range_to_kernel).
    ///
    /// # Errors
    /// Fails if the range is not (entirely) mapped.
    fn unmap_kernel_range(&mut self, kernel: VirtualAddress, length: usize)
    -> Result<(), AliasError>;
}
