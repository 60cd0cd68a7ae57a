use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalPage;

/// Represents a single 32-bit x86 paging entry in its raw bitfield form.
///
/// The same layout serves page-directory entries (pointing at a page table)
/// and page-table entries (mapping one 4 KiB frame); fields that only make
/// sense for one of the two are ignored by hardware in the other.
///
/// ### Bit layout (non-PAE)
///
/// | Bits  | Name / Mnemonic | Meaning |
/// |-------|-----------------|---------|
/// | 0     | `P`             | Valid entry if set |
/// | 1     | `RW`            | Writable if set |
/// | 2     | `US`            | User-mode accessible if set |
/// | 3     | `PWT`           | Write-through caching |
/// | 4     | `PCD`           | Disable caching |
/// | 5     | `A`             | Accessed |
/// | 6     | `D`             | Dirty (PTE only) |
/// | 7     | `PS` / `PAT`    | 4 MiB page (PDE) / PAT index (PTE) |
/// | 8     | `G`             | Global (PTE only) |
/// | 9     | alias           | OS: the frame is borrowed, not owned |
/// | 10–11 | OS avail        | Reserved for OS use |
/// | 12–31 | `frame`         | Physical frame number |
///
/// ### Alias entries
/// The kernel marks mappings of frames it does not own (user buffers borrowed
/// for I/O, identity-mapped device memory) with the `alias` bit. Tearing such
/// an entry down never returns the frame to the physical allocator.
///
/// ### Example
/// ```rust
/// # use kernel_memory_addresses::PhysicalPage;
/// # use kernel_vmem::PageEntryBits;
/// let e = PageEntryBits::new_kernel_rw().with_frame(PhysicalPage::from_index(0x123));
/// assert!(e.present());
/// assert_eq!(e.frame().index(), 0x123);
/// assert_eq!(e.into_bits(), 0x0012_3003);
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    pub present: bool,

    /// Writable (RW, bit 1).
    ///
    /// For a PDE this is ANDed with the PTE's bit over the walk.
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU.
    pub accessed: bool,

    /// Dirty (D, bit 6). Set by the CPU on first write through a PTE.
    pub dirty: bool,

    /// PS in a PDE (4 MiB page, unused here); PAT in a PTE.
    pub large_page: bool,

    /// Global (G, bit 8). Survives CR3 reloads when CR4.PGE is set.
    pub global_translation: bool,

    /// OS bit 9: the mapped frame is not owned by this entry.
    pub alias: bool,

    /// OS-available (bits 10..=11).
    #[bits(2)]
    pub os_available: u8,

    /// Physical frame number (bits 12..=31).
    #[bits(20)]
    frame_number: u32,
}

impl PageEntryBits {
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> PhysicalPage {
        PhysicalPage::from_index(self.frame_number() as usize)
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn set_frame(&mut self, frame: PhysicalPage) {
        self.set_frame_number(frame.index() as u32);
    }

    #[inline]
    #[must_use]
    pub const fn with_frame(mut self, frame: PhysicalPage) -> Self {
        self.set_frame(frame);
        self
    }

    /// Present, writable, supervisor-only.
    #[inline]
    #[must_use]
    pub const fn new_kernel_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// Leaf flags for an owned or aliased 4 KiB page.
    #[inline]
    #[must_use]
    pub const fn new_leaf(writable: bool, user: bool, alias: bool) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(writable)
            .with_user_access(user)
            .with_alias(alias)
    }
}
