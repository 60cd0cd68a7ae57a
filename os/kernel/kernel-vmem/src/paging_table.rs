//! # Paging Table (one 32-bit address space)
//!
//! A [`PagingTable`] owns a page directory, the page tables it links to, and a
//! bitmap of which virtual pages are still available for allocation.
//!
//! ## Highlights
//!
//! - [`PagingTable::assign_page_table_entry`] installs an owned mapping and
//!   reserves both the virtual slot and the physical frame.
//! - [`PagingTable::assign_alias_entry`] installs a borrowed mapping; the
//!   frame is left alone.
//! - [`PagingTable::unassign_page_table_entries`] removes a whole range or
//!   nothing at all, and releases page tables that become empty.
//! - [`PagingTable::release`] tears the space down and returns every owned
//!   frame.
//!
//! ## Design
//!
//! - Page-table frames come from the caller's [`FrameAlloc`] on demand and
//!   are zeroed through the [`PhysMapper`] before they are linked.
//! - The physical allocator is injected per call; the virtual bitmap is owned
//!   by the space. Mutating both under one lock is the caller's job.
//! - Virtual page 0 is never handed out, so address 0 stays unmapped.
//!
//! ## Safety
//!
//! - Mutating the active address space requires TLB maintenance; unmapping
//!   issues `invlpg` on bare-metal x86 builds.
//! - The provided `PhysMapper` must yield **writable** references to table
//!   frames.

use crate::bitmap::{Bitmap, BitmapError};
use crate::page_table::pd::{DirectoryIndex, PageDirectory, PageDirectoryEntry};
use crate::page_table::pt::{PageTable, PageTableEntry, TableIndex};
use crate::page_table::{split_indices, split_page_index};
use crate::{FrameAlloc, FrameAllocError, PageEntryBits, PhysMapper, PhysMapperExt};
use alloc::vec;
use alloc::vec::Vec;
use kernel_memory_addresses::{
    ENTRIES_PER_TABLE, PAGES_PER_ADDRESS_SPACE, PhysicalAddress, PhysicalPage, VirtualAddress,
    VirtualPage,
};
use log::{debug, error, trace};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PagingError {
    /// The flattened page index has no present mapping.
    #[error("page {0:#x} is not mapped")]
    NotPresent(usize),
    #[error("{0} is already mapped")]
    AlreadyMapped(VirtualAddress),
    #[error("virtual page 0 cannot be mapped")]
    NullPage,
    #[error("out of physical frames for paging structures")]
    OutOfFrames,
    #[error("page range {start:#x}+{count} is outside the address space")]
    OutOfRange { start: usize, count: usize },
    #[error(transparent)]
    Frame(#[from] FrameAllocError),
}

impl From<BitmapError> for PagingError {
    fn from(e: BitmapError) -> Self {
        Self::OutOfRange {
            start: e.start,
            count: e.count,
        }
    }
}

/// Handle to a single, concrete address space.
///
/// Dropping a `PagingTable` without calling [`release`](Self::release) leaks
/// its frames.
pub struct PagingTable<'m, M: PhysMapper> {
    directory: PhysicalPage,
    mapper: &'m M,
    /// `true` = virtual page available.
    virtual_pages: Bitmap,
    /// Present entries per directory slot.
    occupancy: Vec<u16>,
}

impl<'m, M: PhysMapper> PagingTable<'m, M> {
    /// Allocate and zero a page directory.
    ///
    /// # Errors
    /// [`PagingError::OutOfFrames`] if no frame is available.
    pub fn new<A: FrameAlloc>(mapper: &'m M, frames: &mut A) -> Result<Self, PagingError> {
        let directory = frames.alloc_4k().ok_or(PagingError::OutOfFrames)?;
        mapper.pd_mut(directory).zero();

        let mut virtual_pages = Bitmap::new(PAGES_PER_ADDRESS_SPACE, true);
        virtual_pages.set_bit(0, false)?;

        debug!("paging: new address space, directory at {directory}");
        Ok(Self {
            directory,
            mapper,
            virtual_pages,
            occupancy: vec![0; ENTRIES_PER_TABLE],
        })
    }

    /// Physical address of the page directory (the CR3 value).
    #[inline]
    #[must_use]
    pub const fn get_page_table_addr(&self) -> PhysicalAddress {
        self.directory.base()
    }

    /// The mapper this space reaches its tables through.
    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    /// Load CR3 with this address space's directory.
    ///
    /// # Safety
    /// The currently executing code, its stack, and the kernel data it
    /// touches next must be mapped identically in this space.
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    #[inline]
    pub unsafe fn activate(&self) {
        let cr3 = self.directory.base().as_u32();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn directory(&self) -> &mut PageDirectory {
        self.mapper.pd_mut(self.directory)
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn table(&self, frame: PhysicalPage) -> &mut PageTable {
        self.mapper.pt_mut(frame)
    }

    /// Base of the first run of `n_pages` available virtual pages at or
    /// after page `start_index`.
    #[must_use]
    pub fn page_get_next_virtual_chunk(
        &self,
        start_index: usize,
        n_pages: usize,
    ) -> Option<VirtualAddress> {
        self.virtual_pages
            .get_next_trues(start_index, n_pages)
            .map(|i| VirtualPage::from_index(i).base())
    }

    /// Base of the first available virtual page containing or following
    /// `start`.
    #[must_use]
    pub fn page_get_next_virtual_addr(&self, start: VirtualAddress) -> Option<VirtualAddress> {
        self.virtual_pages
            .get_next_true(start.page().index())
            .map(|i| VirtualPage::from_index(i).base())
    }

    /// Whether virtual page `index` is still available for allocation.
    #[must_use]
    pub fn is_virtual_page_available(&self, index: usize) -> bool {
        self.virtual_pages.get(index).unwrap_or(false)
    }

    /// Number of virtual pages still available.
    #[must_use]
    pub fn available_virtual_pages(&self) -> usize {
        self.virtual_pages.count_trues()
    }

    /// Number of present page-table entries.
    #[must_use]
    pub fn mapped_pages(&self) -> usize {
        self.occupancy.iter().map(|&n| usize::from(n)).sum()
    }

    /// Whether directory slot `index` links a page table. Out-of-range
    /// indices are reported absent.
    #[must_use]
    pub fn dir_entry_present(&self, index: usize) -> bool {
        #[allow(clippy::cast_possible_truncation)]
        let present = index < ENTRIES_PER_TABLE
            && self
                .directory()
                .get(DirectoryIndex::new(index as u16))
                .is_present();
        present
    }

    fn entry(&self, va: VirtualAddress) -> PageTableEntry {
        let (di, ti) = split_indices(va);
        self.directory()
            .get(di)
            .next_table()
            .map_or_else(PageTableEntry::zero, |t| self.table(t).get(ti))
    }

    /// Translate `va`; the in-page offset is carried over.
    #[must_use]
    pub fn get_phys_from_virtual(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let (frame, _) = self.entry(va).page_4k()?;
        Some(frame.join(va.offset()))
    }

    /// The entry that maps `va`, or the zero entry when absent.
    #[must_use]
    pub fn check_vmap_contents(&self, va: VirtualAddress) -> PageTableEntry {
        self.entry(va)
    }

    /// Install an owned 4 KiB mapping `va → pa`.
    ///
    /// Reserves the virtual slot and the frame. Both addresses are truncated
    /// to their page.
    ///
    /// # Errors
    /// - [`PagingError::AlreadyMapped`] if `va` is present; nothing changes.
    /// - [`PagingError::NullPage`] for virtual page 0.
    /// - [`PagingError::OutOfFrames`] if a page table is needed and none is free.
    pub fn assign_page_table_entry<A: FrameAlloc>(
        &mut self,
        frames: &mut A,
        pa: PhysicalAddress,
        va: VirtualAddress,
        writable: bool,
        user: bool,
    ) -> Result<(), PagingError> {
        self.assign(frames, pa, va, PageEntryBits::new_leaf(writable, user, false))
    }

    /// Install an alias mapping `va → pa` for kernel use. The frame stays
    /// owned by whoever owned it before.
    ///
    /// # Errors
    /// As [`assign_page_table_entry`](Self::assign_page_table_entry).
    pub fn assign_alias_entry<A: FrameAlloc>(
        &mut self,
        frames: &mut A,
        pa: PhysicalAddress,
        va: VirtualAddress,
        writable: bool,
    ) -> Result<(), PagingError> {
        self.assign(frames, pa, va, PageEntryBits::new_leaf(writable, false, true))
    }

    fn assign<A: FrameAlloc>(
        &mut self,
        frames: &mut A,
        pa: PhysicalAddress,
        va: VirtualAddress,
        flags: PageEntryBits,
    ) -> Result<(), PagingError> {
        let page = va.page();
        if page.index() == 0 {
            return Err(PagingError::NullPage);
        }
        if self.entry(va).is_present() {
            return Err(PagingError::AlreadyMapped(page.base()));
        }

        let (di, ti) = split_indices(va);
        let table = self.ensure_table(frames, di, flags.user_access())?;

        let frame = pa.page();
        if !flags.alias()
            && let Err(e) = frames.reserve_4k(frame)
        {
            self.release_table_if_empty(frames, di);
            return Err(e.into());
        }

        self.table(table).set(ti, PageTableEntry::make_4k(frame, flags));
        self.occupancy[di.as_usize()] += 1;
        self.virtual_pages.set_bit(page.index(), false)?;

        trace!(
            "paging: {} -> {} ({}{}{})",
            page.base(),
            frame.base(),
            if flags.writable() { "w" } else { "r" },
            if flags.user_access() { "u" } else { "k" },
            if flags.alias() { ", alias" } else { "" },
        );
        Ok(())
    }

    /// The page table for directory slot `di`, allocating and linking a
    /// zeroed one if absent.
    fn ensure_table<A: FrameAlloc>(
        &mut self,
        frames: &mut A,
        di: DirectoryIndex,
        user: bool,
    ) -> Result<PhysicalPage, PagingError> {
        let pde = self.directory().get(di);
        if let Some(table) = pde.next_table() {
            if user && !pde.flags().user_access() {
                self.directory().set(di, pde.with_user_access(true));
            }
            return Ok(table);
        }

        let table = frames.alloc_4k().ok_or(PagingError::OutOfFrames)?;
        self.table(table).zero();
        self.directory()
            .set(di, PageDirectoryEntry::make_table(table, user));
        trace!("paging: page table {table} linked at directory slot {}", di.as_usize());
        Ok(table)
    }

    fn release_table_if_empty<A: FrameAlloc>(&mut self, frames: &mut A, di: DirectoryIndex) {
        if self.occupancy[di.as_usize()] != 0 {
            return;
        }
        if let Some(table) = self.directory().get(di).next_table() {
            self.directory().set(di, PageDirectoryEntry::zero());
            if let Err(e) = frames.free_4k(table) {
                error!("paging: failed to release page table {table}: {e}");
            }
            trace!("paging: page table {table} released from directory slot {}", di.as_usize());
        }
    }

    /// Unmap `n_pages` pages starting at flattened page index `start_idx`
    /// (`directory * 1024 + table`).
    ///
    /// The range is validated before anything changes. On success owned
    /// frames go back to `frames`, the entries are zeroed, the virtual pages
    /// become available again and emptied page tables are released.
    ///
    /// # Errors
    /// - [`PagingError::OutOfRange`] if the range leaves the address space.
    /// - [`PagingError::NotPresent`] naming the first absent page.
    ///
    /// In both cases nothing is mutated.
    pub fn unassign_page_table_entries<A: FrameAlloc>(
        &mut self,
        frames: &mut A,
        start_idx: usize,
        n_pages: usize,
    ) -> Result<(), PagingError> {
        let end = start_idx
            .checked_add(n_pages)
            .filter(|&end| end <= PAGES_PER_ADDRESS_SPACE)
            .ok_or(PagingError::OutOfRange {
                start: start_idx,
                count: n_pages,
            })?;

        if let Some(missing) = (start_idx..end)
            .find(|&i| !self.entry(VirtualPage::from_index(i).base()).is_present())
        {
            return Err(PagingError::NotPresent(missing));
        }

        for i in start_idx..end {
            let (di, ti) = split_page_index(i);
            let Some(table) = self.directory().get(di).next_table() else {
                continue;
            };
            let entry = self.table(table).get(ti);
            if !entry.is_alias()
                && let Err(e) = frames.free_4k(entry.frame())
            {
                error!("paging: page {i:#x} owned frame {} could not be freed: {e}", entry.frame());
            }
            self.table(table).set(ti, PageTableEntry::zero());
            invalidate_page(VirtualPage::from_index(i).base());

            self.occupancy[di.as_usize()] -= 1;
            self.release_table_if_empty(frames, di);
        }

        self.virtual_pages.set_range(start_idx, n_pages, true)?;
        trace!("paging: unmapped {n_pages} page(s) from {:#x}", start_idx);
        Ok(())
    }

    /// Mark `n_pages` virtual pages from `start_idx` unavailable without
    /// mapping them.
    ///
    /// # Errors
    /// [`PagingError::OutOfRange`] if the range leaves the address space.
    pub fn reserve_virtual_range(
        &mut self,
        start_idx: usize,
        n_pages: usize,
    ) -> Result<(), PagingError> {
        self.virtual_pages.set_range(start_idx, n_pages, false)?;
        Ok(())
    }

    /// Tear down the address space: every owned frame, every page table and
    /// the directory go back to `frames`. Alias frames are left alone.
    pub fn release<A: FrameAlloc>(self, frames: &mut A) {
        let mut owned = 0usize;
        let tables: Vec<PhysicalPage> = self.directory().present().map(|(_, t)| t).collect();
        for table in tables {
            for entry in self.table(table).present().filter(|e| !e.is_alias()) {
                match frames.free_4k(entry.frame()) {
                    Ok(()) => owned += 1,
                    Err(e) => error!("paging: release could not free {}: {e}", entry.frame()),
                }
            }
            if let Err(e) = frames.free_4k(table) {
                error!("paging: release could not free page table {table}: {e}");
            }
        }
        if let Err(e) = frames.free_4k(self.directory) {
            error!("paging: release could not free directory {}: {e}", self.directory);
        }
        debug!(
            "paging: released address space {} ({owned} owned frame(s))",
            self.directory
        );
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
#[inline]
fn invalidate_page(va: VirtualAddress) {
    // SAFETY: invlpg only drops a TLB entry.
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va.as_u32(), options(nostack, preserves_flags));
    }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
#[inline]
const fn invalidate_page(_: VirtualAddress) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestFrames, TestPhys};

    fn setup(n: usize) -> (TestPhys, TestFrames) {
        let phys = TestPhys::with_frames(n);
        let frames = TestFrames::new(&phys);
        (phys, frames)
    }

    #[test]
    fn new_space_reserves_page_zero() {
        let (phys, mut frames) = setup(8);
        let pt = PagingTable::new(&phys, &mut frames).unwrap();
        assert_eq!(pt.get_page_table_addr(), PhysicalAddress::new(0));
        assert!(!pt.is_virtual_page_available(0));
        assert_eq!(pt.page_get_next_virtual_chunk(0, 4), Some(VirtualAddress::new(0x1000)));
        assert_eq!(
            pt.page_get_next_virtual_addr(VirtualAddress::new(0x10)),
            Some(VirtualAddress::new(0x1000))
        );
        assert!(!frames.is_available(PhysicalPage::from_index(0)));
    }

    #[test]
    fn disjoint_assignments_translate_exactly() {
        let (phys, mut frames) = setup(16);
        let mut pt = PagingTable::new(&phys, &mut frames).unwrap();

        let pairs = [
            (0x0040_0000, 0x0030_0000),
            (0x0040_1000, 0x0050_0000),
            (0x1000_0000, 0x0060_0000),
        ];
        for &(va, pa) in &pairs {
            pt.assign_page_table_entry(
                &mut frames,
                PhysicalAddress::new(pa),
                VirtualAddress::new(va),
                true,
                false,
            )
            .unwrap();
        }
        for &(va, pa) in &pairs {
            assert_eq!(
                pt.get_phys_from_virtual(VirtualAddress::new(va + 0x123)),
                Some(PhysicalAddress::new(pa + 0x123))
            );
            assert!(!frames.is_available(PhysicalAddress::new(pa).page()));
        }
        assert!(pt.dir_entry_present(1));
        assert!(pt.dir_entry_present(0x40));
        assert!(!pt.dir_entry_present(2));
        assert!(!pt.dir_entry_present(5000));
        assert_eq!(pt.mapped_pages(), 3);
        assert_eq!(pt.get_phys_from_virtual(VirtualAddress::new(0x0040_2000)), None);
    }

    #[test]
    fn assign_then_unassign_restores_both_bitmaps() {
        let (phys, mut frames) = setup(16);
        let mut pt = PagingTable::new(&phys, &mut frames).unwrap();
        let free_before = frames.map.count_trues();
        let virt_before = pt.available_virtual_pages();

        let va = VirtualAddress::new(0x0080_0000);
        let frame = frames.alloc_4k().unwrap();
        pt.assign_page_table_entry(&mut frames, frame.base(), va, true, true)
            .unwrap();
        assert!(pt.dir_entry_present(2));
        assert!(pt.check_vmap_contents(va).is_user());

        pt.unassign_page_table_entries(&mut frames, va.page().index(), 1)
            .unwrap();
        assert_eq!(frames.map.count_trues(), free_before);
        assert_eq!(pt.available_virtual_pages(), virt_before);
        assert!(!pt.dir_entry_present(2));
        assert_eq!(pt.check_vmap_contents(va), PageTableEntry::zero());
    }

    #[test]
    fn unassign_over_hole_changes_nothing() {
        let (phys, mut frames) = setup(16);
        let mut pt = PagingTable::new(&phys, &mut frames).unwrap();
        let base = VirtualAddress::new(0x0100_0000);
        for (off, pa) in [(0u32, 0x0070_0000u32), (0x2000, 0x0070_1000)] {
            pt.assign_page_table_entry(
                &mut frames,
                PhysicalAddress::new(pa),
                base + off,
                true,
                false,
            )
            .unwrap();
        }
        let frames_before = frames.map.clone();
        let virt_before = pt.available_virtual_pages();

        let start = base.page().index();
        assert_eq!(
            pt.unassign_page_table_entries(&mut frames, start, 3),
            Err(PagingError::NotPresent(start + 1))
        );
        assert!(frames.map == frames_before);
        assert_eq!(pt.available_virtual_pages(), virt_before);
        assert!(pt.check_vmap_contents(base).is_present());
        assert!(pt.check_vmap_contents(base + 0x2000).is_present());
    }

    #[test]
    fn overwrite_is_rejected() {
        let (phys, mut frames) = setup(16);
        let mut pt = PagingTable::new(&phys, &mut frames).unwrap();
        let va = VirtualAddress::new(0x0040_0000);
        pt.assign_page_table_entry(&mut frames, PhysicalAddress::new(0x9000), va, true, false)
            .unwrap();
        assert_eq!(
            pt.assign_page_table_entry(
                &mut frames,
                PhysicalAddress::new(0xA000),
                va + 5,
                true,
                false
            ),
            Err(PagingError::AlreadyMapped(va))
        );
        assert!(frames.is_available(PhysicalPage::from_index(0xA)));
        assert_eq!(
            pt.get_phys_from_virtual(va),
            Some(PhysicalAddress::new(0x9000))
        );
    }

    #[test]
    fn page_zero_cannot_be_mapped() {
        let (phys, mut frames) = setup(8);
        let mut pt = PagingTable::new(&phys, &mut frames).unwrap();
        assert_eq!(
            pt.assign_page_table_entry(
                &mut frames,
                PhysicalAddress::new(0x5000),
                VirtualAddress::new(0x10),
                true,
                false
            ),
            Err(PagingError::NullPage)
        );
        assert!(!pt.dir_entry_present(0));
    }

    #[test]
    fn alias_unmap_keeps_frame_reserved() {
        let (phys, mut frames) = setup(16);
        let mut pt = PagingTable::new(&phys, &mut frames).unwrap();
        let owned = frames.alloc_4k().unwrap();
        let va = VirtualAddress::new(0x0200_0000);
        pt.assign_alias_entry(&mut frames, owned.base(), va, true).unwrap();
        assert!(pt.check_vmap_contents(va).is_alias());

        pt.unassign_page_table_entries(&mut frames, va.page().index(), 1)
            .unwrap();
        assert!(!frames.is_available(owned));
    }

    #[test]
    fn out_of_frames_for_table() {
        let (phys, mut frames) = setup(1);
        let mut pt = PagingTable::new(&phys, &mut frames).unwrap();
        assert_eq!(
            pt.assign_page_table_entry(
                &mut frames,
                PhysicalAddress::new(0x0030_0000),
                VirtualAddress::new(0x0040_0000),
                true,
                false
            ),
            Err(PagingError::OutOfFrames)
        );
        assert_eq!(pt.mapped_pages(), 0);
    }

    #[test]
    fn unassign_range_validation() {
        let (phys, mut frames) = setup(8);
        let mut pt = PagingTable::new(&phys, &mut frames).unwrap();
        assert!(matches!(
            pt.unassign_page_table_entries(&mut frames, PAGES_PER_ADDRESS_SPACE - 1, 2),
            Err(PagingError::OutOfRange { .. })
        ));
        assert_eq!(pt.unassign_page_table_entries(&mut frames, 10, 0), Ok(()));
    }

    #[test]
    fn reserved_range_is_skipped_by_chunk_search() {
        let (phys, mut frames) = setup(8);
        let mut pt = PagingTable::new(&phys, &mut frames).unwrap();
        pt.reserve_virtual_range(0, 0x1_0000).unwrap();
        assert_eq!(
            pt.page_get_next_virtual_chunk(0, 2),
            Some(VirtualAddress::new(0x1000_0000))
        );
    }

    #[test]
    fn release_returns_every_owned_frame() {
        let (phys, mut frames) = setup(32);
        let free_at_start = frames.map.count_trues();
        let mut pt = PagingTable::new(&phys, &mut frames).unwrap();
        for i in 0..3u32 {
            let f = frames.alloc_4k().unwrap();
            let va = VirtualAddress::new(0x0040_0000 + i * 0x40_0000);
            pt.assign_page_table_entry(&mut frames, f.base(), va, true, true)
                .unwrap();
        }
        let borrowed = frames.alloc_4k().unwrap();
        pt.assign_alias_entry(&mut frames, borrowed.base(), VirtualAddress::new(0x0100_0000), true)
            .unwrap();

        pt.release(&mut frames);
        assert_eq!(frames.map.count_trues(), free_at_start - 1);
        assert!(!frames.is_available(borrowed));
    }
}
