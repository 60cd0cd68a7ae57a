use crate::{MemoryAddress, VirtualPage};
use bitfield_struct::bitfield;
use core::fmt;
use core::ops::{Add, AddAssign};

/// Virtual memory address.
///
/// A thin wrapper around [`MemoryAddress`] that denotes **virtual** addresses.
/// It carries the *kind* of address at the type level so virtual and physical
/// values are never mixed by accident.
///
/// ### Semantics
/// - [`VirtualAddress::parts`] yields the directory/table/offset lookup key.
/// - [`VirtualAddress::split`] yields the containing [`VirtualPage`] and the
///   in-page offset; [`VirtualPage::join`] reverses it.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0x1000_0042);
/// let (vp, off) = va.split();
/// assert_eq!(vp.base().as_u32(), 0x1000_0000);
/// assert_eq!(off, 0x42);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(pub(crate) MemoryAddress);

/// The two-level lookup key of a 32-bit virtual address.
///
/// | Bits    | Field             |
/// |---------|-------------------|
/// | 0–11    | `offset`          |
/// | 12–21   | `table_index`     |
/// | 22–31   | `directory_index` |
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct VirtualAddressParts {
    /// Byte offset inside the 4 KiB page.
    #[bits(12)]
    pub offset: u16,

    /// Index into the page table selected by the directory entry.
    #[bits(10)]
    pub table_index: u16,

    /// Index into the page directory.
    #[bits(10)]
    pub directory_index: u16,
}

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn from_parts(parts: VirtualAddressParts) -> Self {
        Self::new(parts.into_bits())
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0.as_u32()
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0.as_usize()
    }

    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.as_u32() == 0
    }

    /// Decompose into directory index, table index and page offset.
    #[inline]
    #[must_use]
    pub const fn parts(self) -> VirtualAddressParts {
        VirtualAddressParts::from_bits(self.as_u32())
    }

    #[inline]
    #[must_use]
    pub const fn page(self) -> VirtualPage {
        VirtualPage::containing(self)
    }

    /// Byte offset inside the containing page.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.0.page_offset()
    }

    #[inline]
    #[must_use]
    pub const fn split(self) -> (VirtualPage, u32) {
        (self.page(), self.offset())
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:08X})", self.as_u32())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u32())
    }
}

impl From<u32> for VirtualAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl From<VirtualPage> for VirtualAddress {
    #[inline]
    fn from(value: VirtualPage) -> Self {
        value.base()
    }
}

impl Add<u32> for VirtualAddress {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}
