//! # Kernel I/O
//!
//! Non-blocking file I/O driven by the scheduler.
//!
//! An [`IoOperation`] is a small state machine. The scheduler polls it with
//! `state()` once per tick and calls `do_op()` when it reports
//! [`IoState::Ready`]; neither call ever waits on hardware. Progress is only
//! ever observed by the next poll.
//!
//! ```text
//! syscall ──▶ IoRead::new ──▶ IoQueue::submit
//!                                 │
//!          tick ──▶ IoQueue::poll_all ──▶ state()/do_op() per operation
//!                                 │
//!                                 └──▶ Completion { process_id, fd, result }
//! ```
//!
//! Reads go through a kernel alias of the user's buffer
//! ([`kernel_vmem::AliasMapper`]); the device boundary is [`FileDevice`].
//!
//! ## Features
//! - `async-read` (default): try [`FileDevice::async_read_issue`] first and
//!   fall back to a synchronous read. Without it every read is synchronous.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod device;
mod error;
mod operation;
pub mod queue;
mod read;
mod result;
mod state;

pub use crate::device::{AsyncIssue, Fd, FileDevice, Whence};
pub use crate::error::{DeviceError, IoError};
pub use crate::operation::IoOperation;
pub use crate::queue::{Completion, IoQueue, IoQueueEntry, ProcessId};
pub use crate::read::IoRead;
pub use crate::result::{IoResult, ResultSlot};
pub use crate::state::IoState;

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use alloc::collections::BTreeSet;
    use alloc::vec::Vec;
    use kernel_memory_addresses::VirtualAddress;
    use kernel_vmem::{AliasError, AliasMapper};

    /// Hands out fake kernel bases and records every request.
    #[derive(Default)]
    pub struct FakeMapper {
        /// `(user base, length)` per map request.
        pub mapped: Vec<(VirtualAddress, usize)>,
        /// `(kernel base, length)` currently mapped.
        pub live: Vec<(VirtualAddress, usize)>,
        pub unmapped: Vec<(VirtualAddress, usize)>,
        pub fail: bool,
        pub(crate) next: u32,
    }

    impl AliasMapper for FakeMapper {
        fn map_user_range_to_kernel(
            &mut self,
            user: VirtualAddress,
            length: usize,
        ) -> Result<VirtualAddress, AliasError> {
            if self.fail {
                return Err(AliasError::NotMapped(user));
            }
            let base = VirtualAddress::new(0xC000_0000 + self.next * 0x10_0000);
            self.next += 1;
            self.mapped.push((user, length));
            self.live.push((base, length));
            Ok(base)
        }

        fn unmap_kernel_range(
            &mut self,
            kernel: VirtualAddress,
            length: usize,
        ) -> Result<(), AliasError> {
            let pos = self
                .live
                .iter()
                .position(|&l| l == (kernel, length))
                .ok_or(AliasError::NotMapped(kernel))?;
            self.live.remove(pos);
            self.unmapped.push((kernel, length));
            Ok(())
        }
    }

    /// Scripted device: one response for every issue, one shared ready count.
    pub struct FakeDevice {
        pub busy: BTreeSet<Fd>,
        pub issue: AsyncIssue,
        pub ready: usize,
        pub ready_error: Option<DeviceError>,
        pub sync_result: Result<usize, DeviceError>,
        pub seek_error: Option<DeviceError>,
        pub issued: usize,
        pub sync_reads: usize,
        pub seeks: Vec<(Fd, i64, Whence)>,
    }

    impl Default for FakeDevice {
        fn default() -> Self {
            Self {
                busy: BTreeSet::new(),
                issue: AsyncIssue::Accepted,
                ready: 0,
                ready_error: None,
                sync_result: Ok(0),
                seek_error: None,
                issued: 0,
                sync_reads: 0,
                seeks: Vec::new(),
            }
        }
    }

    impl FileDevice for FakeDevice {
        fn device_busy(&self, fd: Fd) -> bool {
            self.busy.contains(&fd)
        }

        fn async_read_issue(
            &mut self,
            _fd: Fd,
            _kernel_buf: VirtualAddress,
            _count: usize,
        ) -> Result<AsyncIssue, DeviceError> {
            self.issued += 1;
            Ok(self.issue)
        }

        fn async_bytes_ready(&self, _fd: Fd) -> Result<usize, DeviceError> {
            self.ready_error.map_or(Ok(self.ready), Err)
        }

        fn seek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<u64, DeviceError> {
            self.seeks.push((fd, offset, whence));
            self.seek_error.map_or(Ok(0), Err)
        }

        fn synchronous_read(
            &mut self,
            _fd: Fd,
            _kernel_buf: VirtualAddress,
            _count: usize,
        ) -> Result<usize, DeviceError> {
            self.sync_reads += 1;
            self.sync_result
        }
    }
}
