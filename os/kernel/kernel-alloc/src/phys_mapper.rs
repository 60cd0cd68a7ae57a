//! # Physical Mappers
//!
//! [`PhysMapper`] implementations for the two places paging code runs:
//!
//! - [`IdentityPhysMapper`]: the kernel identity-maps its low window, so a
//!   physical address is also its own virtual address.
//! - [`ArenaPhysMapper`] (feature `arena`): a heap-backed block of simulated
//!   RAM for hosted builds, where physical address `n * 4096` is the `n`-th
//!   frame of the arena.
//!
//! ## Example
#![cfg_attr(feature = "arena", doc = "```rust")]
#![cfg_attr(not(feature = "arena"), doc = "```rust,ignore")]
//! use kernel_alloc::phys_mapper::ArenaPhysMapper;
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! let ram = ArenaPhysMapper::with_frames(4);
//! ram.write(PhysicalAddress::new(0x1ffe), b"hi!!");
//! let mut buf = [0u8; 4];
//! ram.read(PhysicalAddress::new(0x1ffe), &mut buf);
//! assert_eq!(&buf, b"hi!!");
//! ```

use kernel_info::memory::KERNEL_WINDOW_END;
use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] for the kernel's identity-mapped window.
///
/// # Safety
/// - The referenced physical range must lie inside the identity-mapped
///   window of the active address space.
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        debug_assert!(pa.as_u32() < KERNEL_WINDOW_END, "{pa} is outside the identity window");
        let va = core::ptr::with_exposed_provenance_mut::<T>(pa.as_usize());
        // SAFETY: Caller must ensure the physical address is valid and identity-mapped.
        unsafe { &mut *va }
    }
}

#[cfg(any(test, feature = "arena"))]
pub use arena::ArenaPhysMapper;

#[cfg(any(test, feature = "arena"))]
mod arena {
    use alloc::boxed::Box;
    use alloc::vec::Vec;
    use core::cell::UnsafeCell;
    use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};
    use kernel_vmem::PhysMapper;

    #[repr(C, align(4096))]
    struct Frame([u8; PAGE_SIZE as usize]);

    /// Simulated physical RAM.
    pub struct ArenaPhysMapper {
        frames: Box<[UnsafeCell<Frame>]>,
    }

    impl ArenaPhysMapper {
        /// `n` zeroed frames covering physical `[0, n * 4096)`.
        #[must_use]
        pub fn with_frames(n: usize) -> Self {
            let frames: Vec<_> = (0..n)
                .map(|_| UnsafeCell::new(Frame([0; PAGE_SIZE as usize])))
                .collect();
            Self {
                frames: frames.into_boxed_slice(),
            }
        }

        #[must_use]
        pub fn frame_count(&self) -> usize {
            self.frames.len()
        }

        fn byte_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
            let (frame, off) = pa.split();
            // SAFETY: `off` < 4096 keeps the pointer inside the frame.
            unsafe { self.frames[frame.index()].get().cast::<u8>().add(off as usize) }
        }

        /// Copy `bytes` into RAM starting at `pa`; may cross frame boundaries.
        ///
        /// # Panics
        /// If the range leaves the arena.
        pub fn write(&self, pa: PhysicalAddress, bytes: &[u8]) {
            for (i, b) in bytes.iter().enumerate() {
                // SAFETY: single-byte write inside an owned frame.
                unsafe { self.byte_ptr(pa + offset(i)).write(*b) }
            }
        }

        /// Copy RAM starting at `pa` into `buf`; may cross frame boundaries.
        ///
        /// # Panics
        /// If the range leaves the arena.
        pub fn read(&self, pa: PhysicalAddress, buf: &mut [u8]) {
            for (i, b) in buf.iter_mut().enumerate() {
                // SAFETY: single-byte read inside an owned frame.
                *b = unsafe { self.byte_ptr(pa + offset(i)).read() };
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn offset(i: usize) -> u32 {
        i as u32
    }

    impl PhysMapper for ArenaPhysMapper {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            debug_assert!(pa.offset() as usize + size_of::<T>() <= PAGE_SIZE as usize);
            // SAFETY: The caller promises `T` matches the bytes in the frame.
            unsafe { &mut *self.byte_ptr(pa).cast::<T>() }
        }
    }
}
