//! # I/O queue
//!
//! Outstanding operations in submission order. Each scheduler tick calls
//! [`IoQueue::poll_all`], which polls every operation, issues the ones that
//! became ready and hands back the ones that ended.
//!
//! Operations on one file descriptor share a stream position, so only the
//! oldest pending operation per descriptor is polled. When it ends, the
//! next one on that descriptor is polled in the same pass.

use crate::device::{Fd, FileDevice};
use crate::error::IoError;
use crate::operation::IoOperation;
use crate::result::IoResult;
use crate::state::IoState;
use alloc::collections::{BTreeSet, VecDeque};
use alloc::vec::Vec;
use core::fmt;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::AliasMapper;
use log::{debug, error, trace};

/// Identifies the process an operation was issued for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

/// One queued operation. The queue owns the operation, not the buffer it
/// reads into.
#[derive(Debug)]
pub struct IoQueueEntry {
    pub process_id: ProcessId,
    pub op: IoOperation,
}

/// An operation that reached `Done` or `Error`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Completion {
    pub process_id: ProcessId,
    pub fd: Fd,
    pub result: IoResult,
}

impl Completion {
    fn of(entry: &IoQueueEntry) -> Self {
        let result = entry.op.result().get().unwrap_or_else(|| {
            error!(
                "io: {} op on {} ended without a result",
                entry.process_id,
                entry.op.fd()
            );
            Err(IoError::Cancelled)
        });
        Self {
            process_id: entry.process_id,
            fd: entry.op.fd(),
            result,
        }
    }
}

#[derive(Debug, Default)]
pub struct IoQueue {
    entries: VecDeque<IoQueueEntry>,
}

impl IoQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IoQueueEntry> {
        self.entries.iter()
    }

    /// Number of queued operations issued for `process_id`.
    #[must_use]
    pub fn pending_for(&self, process_id: ProcessId) -> usize {
        self.entries
            .iter()
            .filter(|e| e.process_id == process_id)
            .count()
    }

    /// Whether a queued operation of `process_id` borrows user pages inside
    /// `length` bytes from `addr`. Such pages must stay mapped until it ends.
    #[must_use]
    pub fn borrows_user_range(
        &self,
        process_id: ProcessId,
        addr: VirtualAddress,
        length: usize,
    ) -> bool {
        self.entries
            .iter()
            .any(|e| e.process_id == process_id && e.op.borrows_user_range(addr, length))
    }

    /// Append an operation.
    pub fn submit(&mut self, process_id: ProcessId, op: impl Into<IoOperation>) {
        let op = op.into();
        trace!("io: {process_id} queued op on {}", op.fd());
        self.entries.push_back(IoQueueEntry { process_id, op });
    }

    /// Poll every operation once in FIFO order; issue those that are ready.
    ///
    /// Finished operations leave the queue and are returned in the order
    /// they finished.
    pub fn poll_all<D, A>(&mut self, device: &mut D, mapper: &mut A) -> Vec<Completion>
    where
        D: FileDevice + ?Sized,
        A: AliasMapper + ?Sized,
    {
        let mut claimed = BTreeSet::new();
        let mut done = Vec::new();
        let mut i = 0;
        while let Some(entry) = self.entries.get_mut(i) {
            let fd = entry.op.fd();
            if !claimed.insert(fd) {
                i += 1;
                continue;
            }

            let mut state = entry.op.state(device, mapper);
            if state == IoState::Ready {
                state = entry.op.do_op(device, mapper);
            }
            if !state.is_terminal() {
                i += 1;
                continue;
            }

            claimed.remove(&fd);
            if let Some(entry) = self.entries.remove(i) {
                done.push(Completion::of(&entry));
            }
        }

        if !done.is_empty() {
            debug!("io: {} op(s) finished, {} pending", done.len(), self.entries.len());
        }
        done
    }

    /// Cancel and remove every operation of `process_id`.
    pub fn cancel_process<A: AliasMapper + ?Sized>(
        &mut self,
        process_id: ProcessId,
        mapper: &mut A,
    ) -> Vec<Completion> {
        self.cancel_where(mapper, |e| e.process_id == process_id)
    }

    /// Cancel and remove every operation on `fd`.
    pub fn cancel_fd<A: AliasMapper + ?Sized>(
        &mut self,
        fd: Fd,
        mapper: &mut A,
    ) -> Vec<Completion> {
        self.cancel_where(mapper, |e| e.op.fd() == fd)
    }

    fn cancel_where<A, F>(&mut self, mapper: &mut A, matches: F) -> Vec<Completion>
    where
        A: AliasMapper + ?Sized,
        F: Fn(&IoQueueEntry) -> bool,
    {
        let mut cancelled = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for mut entry in self.entries.drain(..) {
            if matches(&entry) {
                entry.op.cancel(mapper);
                cancelled.push(Completion::of(&entry));
            } else {
                kept.push_back(entry);
            }
        }
        self.entries = kept;
        if !cancelled.is_empty() {
            debug!("io: cancelled {} op(s)", cancelled.len());
        }
        cancelled
    }
}
