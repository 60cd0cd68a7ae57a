//! # Kernel synchronization primitives
//!
//! The kernel runs on a single core with cooperative scheduling, so these
//! primitives mostly guard against re-entry from interrupt context:
//!
//! * [`SpinLock`] serializes access to the kernel state (process table,
//!   physical frame bitmap, address spaces, I/O queue).
//! * [`SyncOnceCell`] publishes a value exactly once; it backs the global
//!   logger and the result slots of I/O operations.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;
mod sync_once_cell;

pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
