//! # Kernel Configuration and Boot Interface
//!
//! This crate holds the memory layout constants and the boot hand-off data
//! shared by the kernel's memory and scheduling subsystems.
//!
//! ## Architecture
//!
//! ### Boot Information ([`boot`])
//! * **Memory Map**: typed physical regions reported by the boot loader,
//!   used to seed the physical frame allocator.
//!
//! ### Memory Layout ([`memory`])
//! * **Kernel Window**: the low 256 MiB are identity-mapped for the kernel.
//! * **User Space**: user allocations start at [`memory::USER_BASE`]. In the
//!   kernel's own space the same range is the alias window for I/O buffers.
//! * **Device Window**: high MMIO is identity-mapped on request.
//!
//! ```text
//! Virtual Address Space Layout (32-bit):
//!
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │   Page 0 (never handed out)     │
//!             ├─────────────────────────────────┤
//!             │   Kernel Window (identity)      │
//!             │   image, heap, low RAM          │
//! USER_BASE   ├─────────────────────────────────┤ 0x1000_0000 (256 MiB)
//!             │   User Space / kernel aliases   │
//!             │     (per-process mappings)      │
//! DEVICE_WIN  ├─────────────────────────────────┤ 0xF000_0000
//!             │   Device MMIO (identity)        │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kernel_info::memory::{KERNEL_WINDOW_PAGES, USER_BASE};
//! assert_eq!(KERNEL_WINDOW_PAGES * 4096, USER_BASE as usize);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
