//! # Kernel Memory Allocation and Virtual Memory Management
//!
//! Physical frame allocation and per-address-space virtual memory
//! management for the 32-bit kernel.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Virtual Memory Manager (VMM)         │
//! │    • mmap / munmap of anonymous memory              │
//! │    • Identity maps of RAM and device memory         │
//! │    • Aliasing user buffers into kernel space        │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Physical Mapper                        │
//! │    • Identity window (kernel)                       │
//! │    • Arena of simulated RAM (hosted tests)          │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │           Physical Frame Allocator                  │
//! │    • 4 KiB frames, one bit each                     │
//! │    • Seeded from the boot memory map                │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Layout Integration
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │ page 0 (never mapped)           │
//! 0x0000_1000 ├─────────────────────────────────┤
//!             │ Kernel window, identity-mapped  │
//!             │  (kernel image at PHYS_LOAD)    │
//! USER_BASE   ├─────────────────────────────────┤
//!             │ User mappings                   │
//! DEVICE_WIN  ├─────────────────────────────────┤
//!             │ Device memory (identity)        │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! Nothing in here locks. The kernel keeps the frame allocator and every
//! address space behind one lock and hands out a [`vmm::Vmm`] for the
//! duration of a single operation.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod frame_alloc;
pub mod phys_mapper;
pub mod vmm;
