//! # Memory Layout
//!
//! The 32-bit address space is split at [`KERNEL_WINDOW_END`]: the kernel
//! identity-maps the low window, user processes allocate above it.

use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress};

/// End (exclusive) of the kernel's identity-mapped window.
pub const KERNEL_WINDOW_END: u32 = 256 * 1024 * 1024; // 256 MiB

/// First virtual address handed out to user processes.
pub const USER_BASE: u32 = KERNEL_WINDOW_END;

/// Number of pages in the kernel window; reserved in every user address space.
pub const KERNEL_WINDOW_PAGES: usize = (KERNEL_WINDOW_END / PAGE_SIZE) as usize;

/// Where the kernel image is placed in *physical* memory by the boot loader.
pub const PHYS_LOAD: u32 = 0x0010_0000; // 1 MiB

/// Device memory (APIC, framebuffer) the kernel identity-maps on request.
/// Device mappings outside the kernel window must start here.
pub const DEVICE_WINDOW_START: u32 = 0xF000_0000;

/// Kernel virtual range that user buffers are aliased into while a read is
/// in flight. It lies above the identity window: an alias never occupies a
/// slot the kernel may later identity-map.
pub const ALIAS_WINDOW_START: u32 = USER_BASE;

/// End (exclusive) of the alias window.
pub const ALIAS_WINDOW_END: u32 = DEVICE_WINDOW_START;

/// The user base as a typed address.
#[must_use]
pub const fn user_base() -> VirtualAddress {
    VirtualAddress::new(USER_BASE)
}

const _: () = {
    assert!(KERNEL_WINDOW_END.is_multiple_of(PAGE_SIZE));
    assert!(PHYS_LOAD < KERNEL_WINDOW_END);
    assert!(DEVICE_WINDOW_START > USER_BASE);
    assert!(ALIAS_WINDOW_START >= KERNEL_WINDOW_END);
    assert!(ALIAS_WINDOW_END <= DEVICE_WINDOW_START);
};
