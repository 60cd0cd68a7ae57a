//! # Kernel
//!
//! The glue between paging and I/O: processes with their own address
//! spaces, the `read`/`mmap`/`munmap`/`exit` system calls and the scheduler
//! tick that drives outstanding reads.
//!
//! ## Address spaces
//!
//! ```text
//! kernel space                          process space
//! ┌───────────────┐ 0x0000_0000        ┌───────────────┐
//! │ identity map  │                    │ (reserved)    │
//! │ image + RAM   │                    │               │
//! ├───────────────┤ USER_BASE          ├───────────────┤
//! │ read aliases ◀┼── same frames ─────┼ mmap'd memory │
//! └───────────────┘                    └───────────────┘
//! ```
//!
//! A read aliases the process's buffer into kernel space so the device can
//! write to it; the alias is dropped when the read ends.
//!
//! ## Flow of a read
//! 1. [`Kernel::sys_read`] builds an [`IoRead`](kernel_io::IoRead), queues it
//!    and parks the process ([`WaitingReason::FileReading`]).
//! 2. Every [`Kernel::tick`] polls the queue.
//! 3. When the read ends the process wakes with the result in
//!    [`Process::last_io`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod error;
pub mod init;
mod kernel_state;
mod process;
pub mod syscall;

pub use crate::error::KernelError;
pub use crate::kernel_state::Kernel;
pub use crate::process::{Process, WaitingReason};
