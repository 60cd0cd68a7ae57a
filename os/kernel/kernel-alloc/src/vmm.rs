//! # Virtual Memory Manager
//!
//! [`Vmm`] pairs one [`PagingTable`] with the physical frame allocator for
//! the duration of an operation: anonymous mappings (`mmap`/`munmap`),
//! identity maps of device memory and the kernel image, and aliases of user
//! buffers into kernel space ([`AliasMapper`]).
//!
//! # Example
#![cfg_attr(feature = "arena", doc = "```rust")]
#![cfg_attr(not(feature = "arena"), doc = "```rust,ignore")]
//! use kernel_alloc::{frame_alloc::BitmapFrameAlloc, phys_mapper::ArenaPhysMapper, vmm::Vmm};
//! use kernel_memory_addresses::VirtualAddress;
//! use kernel_vmem::PagingTable;
//!
//! let ram = ArenaPhysMapper::with_frames(16);
//! let mut frames = BitmapFrameAlloc::new();
//! frames.release_range(1, 15);
//! let mut space = PagingTable::new(&ram, &mut frames).unwrap();
//!
//! let mut vmm = Vmm::new(&mut space, &mut frames);
//! let va = vmm.mmap(VirtualAddress::new(0x0040_0000), 100, true, true).unwrap();
//! assert!(vmm.translate(va).is_some());
//! vmm.munmap(va, 100).unwrap();
//! ```

use alloc::vec::Vec;
use kernel_info::memory::{ALIAS_WINDOW_END, ALIAS_WINDOW_START};
use kernel_memory_addresses::{
    PAGE_SIZE, PAGES_PER_ADDRESS_SPACE, PhysicalAddress, PhysicalPage, VirtualAddress, VirtualPage,
    pages_spanning,
};
use kernel_vmem::{AliasError, AliasMapper, FrameAlloc, PagingError, PagingTable, PhysMapper};
use log::{debug, error, trace};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmmError {
    #[error("no contiguous virtual range of {pages} pages")]
    OutOfVirtualSpace { pages: usize },
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid range")]
    InvalidRange,
    #[error(transparent)]
    Paging(PagingError),
}

impl From<PagingError> for VmmError {
    fn from(e: PagingError) -> Self {
        match e {
            PagingError::OutOfFrames => Self::OutOfMemory,
            other => Self::Paging(other),
        }
    }
}

/// Operations on one address space, borrowing the frame allocator.
///
/// A `Vmm` built [`with_source`](Self::with_source) can alias pages of that
/// other space into its own.
pub struct Vmm<'a, 'm, M: PhysMapper, A: FrameAlloc> {
    space: &'a mut PagingTable<'m, M>,
    alloc: &'a mut A,
    source: Option<&'a PagingTable<'m, M>>,
}

impl<'a, 'm, M: PhysMapper, A: FrameAlloc> Vmm<'a, 'm, M, A> {
    pub const fn new(space: &'a mut PagingTable<'m, M>, alloc: &'a mut A) -> Self {
        Self {
            space,
            alloc,
            source: None,
        }
    }

    /// Use `source` as the address space user ranges are aliased from.
    #[must_use]
    pub const fn with_source(mut self, source: &'a PagingTable<'m, M>) -> Self {
        self.source = Some(source);
        self
    }

    /// Translate VA→PA if mapped.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.space.get_phys_from_virtual(va)
    }

    /// Map `length` bytes of fresh, zeroed memory at the first free virtual
    /// range at or after `hint`.
    ///
    /// # Errors
    /// - [`VmmError::InvalidRange`] for a zero length.
    /// - [`VmmError::OutOfVirtualSpace`] if no range of that many pages is free.
    /// - [`VmmError::OutOfMemory`] if frames run out; pages mapped so far are
    ///   unmapped again.
    pub fn mmap(
        &mut self,
        hint: VirtualAddress,
        length: usize,
        writable: bool,
        user: bool,
    ) -> Result<VirtualAddress, VmmError> {
        let pages = pages_spanning(length);
        if pages == 0 {
            return Err(VmmError::InvalidRange);
        }
        let base = self
            .space
            .page_get_next_virtual_chunk(hint.page().index(), pages)
            .ok_or(VmmError::OutOfVirtualSpace { pages })?;
        let first = base.page().index();

        for i in 0..pages {
            let va = VirtualPage::from_index(first + i).base();
            if let Err(e) = self.map_fresh(va, writable, user) {
                self.rollback(first, i);
                return Err(e);
            }
        }
        debug!("vmm: mapped {pages} page(s) at {base}");
        Ok(base)
    }

    fn map_fresh(
        &mut self,
        va: VirtualAddress,
        writable: bool,
        user: bool,
    ) -> Result<(), VmmError> {
        let frame = self.alloc.alloc_4k().ok_or(VmmError::OutOfMemory)?;
        // SAFETY: the frame was just taken from the allocator; nobody else refers to it.
        let bytes = unsafe {
            self.space
                .mapper()
                .phys_to_mut::<[u8; PAGE_SIZE as usize]>(frame.base())
        };
        bytes.fill(0);

        if let Err(e) = self
            .space
            .assign_page_table_entry(self.alloc, frame.base(), va, writable, user)
        {
            if let Err(free) = self.alloc.free_4k(frame) {
                error!("vmm: could not return {frame} after failed map: {free}");
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn rollback(&mut self, first: usize, mapped: usize) {
        if mapped == 0 {
            return;
        }
        if let Err(e) = self
            .space
            .unassign_page_table_entries(self.alloc, first, mapped)
        {
            error!("vmm: rollback of {mapped} page(s) at {first:#x} failed: {e}");
        }
    }

    /// Unmap the pages covering `length` bytes from `addr`. Owned frames go
    /// back to the allocator.
    ///
    /// # Errors
    /// - [`VmmError::InvalidRange`] for a zero length or a range that wraps.
    /// - [`VmmError::Paging`] if a page in the range is absent; nothing is
    ///   unmapped then.
    pub fn munmap(&mut self, addr: VirtualAddress, length: usize) -> Result<(), VmmError> {
        if length == 0 {
            return Err(VmmError::InvalidRange);
        }
        let span = length
            .checked_add(addr.offset() as usize)
            .ok_or(VmmError::InvalidRange)?;
        let pages = pages_spanning(span);
        self.space
            .unassign_page_table_entries(self.alloc, addr.page().index(), pages)?;
        debug!("vmm: unmapped {pages} page(s) at {}", addr.page());
        Ok(())
    }

    /// Identity-map the frames covering `size` bytes from `pa` as alias
    /// entries. Page 0 is skipped, as are pages that already map their own
    /// frame; the range is cut at the end of the address space.
    ///
    /// Returns the number of pages newly mapped.
    ///
    /// # Errors
    /// - [`PagingError::AlreadyMapped`] (as [`VmmError::Paging`]) if a page
    ///   in the range maps a different frame; nothing is mapped then.
    /// - [`VmmError::OutOfMemory`] if a page table cannot be allocated.
    pub fn identity_map(
        &mut self,
        pa: PhysicalAddress,
        size: usize,
        writable: bool,
    ) -> Result<usize, VmmError> {
        let first = pa.page().index();
        let end = first
            .saturating_add(pages_spanning(size.saturating_add(pa.offset() as usize)))
            .min(PAGES_PER_ADDRESS_SPACE);

        let pages = first.max(1)..end;

        for i in pages.clone() {
            let va = VirtualPage::from_index(i).base();
            let entry = self.space.check_vmap_contents(va);
            if entry.is_present() && entry.frame() != PhysicalPage::from_index(i) {
                return Err(PagingError::AlreadyMapped(va).into());
            }
        }

        let mut mapped = 0;
        for i in pages {
            let va = VirtualPage::from_index(i).base();
            if self.space.check_vmap_contents(va).is_present() {
                continue;
            }
            self.space.assign_alias_entry(
                self.alloc,
                PhysicalPage::from_index(i).base(),
                va,
                writable,
            )?;
            mapped += 1;
        }
        debug!("vmm: identity-mapped {mapped} page(s) from {pa}");
        Ok(mapped)
    }
}

/// Aliases are placed in `[ALIAS_WINDOW_START, ALIAS_WINDOW_END)` of this
/// `Vmm`'s space, the user pages are looked up in the source space.
impl<M: PhysMapper, A: FrameAlloc> AliasMapper for Vmm<'_, '_, M, A> {
    fn map_user_range_to_kernel(
        &mut self,
        user: VirtualAddress,
        length: usize,
    ) -> Result<VirtualAddress, AliasError> {
        let source = self.source.ok_or(AliasError::NoSourceSpace)?;
        let pages = pages_spanning(length.saturating_add(user.offset() as usize));
        if pages == 0 {
            return Err(AliasError::Empty);
        }
        let first = user.page().index();
        if first.checked_add(pages).is_none_or(|end| end > PAGES_PER_ADDRESS_SPACE) {
            return Err(AliasError::NotMapped(user));
        }

        let mut frames = Vec::with_capacity(pages);
        for i in first..first + pages {
            let va = VirtualPage::from_index(i).base();
            let pa = source
                .get_phys_from_virtual(va)
                .ok_or(AliasError::NotMapped(va))?;
            frames.push(pa.page());
        }

        let window = VirtualAddress::new(ALIAS_WINDOW_START).page().index()
            ..VirtualAddress::new(ALIAS_WINDOW_END).page().index();
        let kernel = self
            .space
            .page_get_next_virtual_chunk(window.start, pages)
            .filter(|base| base.page().index() + pages <= window.end)
            .ok_or(AliasError::OutOfVirtualSpace { pages })?;
        let start = kernel.page().index();
        for (i, frame) in frames.iter().enumerate() {
            let va = VirtualPage::from_index(start + i).base();
            if let Err(e) = self
                .space
                .assign_alias_entry(self.alloc, frame.base(), va, true)
            {
                self.rollback(start, i);
                return Err(e.into());
            }
        }
        trace!("vmm: aliased {pages} user page(s) {user} at {kernel}");
        Ok(kernel.page().join(user.offset()))
    }

    fn unmap_kernel_range(
        &mut self,
        kernel: VirtualAddress,
        length: usize,
    ) -> Result<(), AliasError> {
        let pages = pages_spanning(length.saturating_add(kernel.offset() as usize));
        if pages == 0 {
            return Err(AliasError::Empty);
        }
        self.space
            .unassign_page_table_entries(self.alloc, kernel.page().index(), pages)?;
        trace!("vmm: dropped alias of {pages} page(s) at {}", kernel.page());
        Ok(())
    }
}
