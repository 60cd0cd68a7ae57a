//! Per-process bookkeeping: the address space and what the process waits on.

use kernel_info::memory::KERNEL_WINDOW_PAGES;
use kernel_io::{IoResult, ProcessId};
use kernel_vmem::{FrameAlloc, PagingError, PagingTable, PhysMapper};

/// Why a process is not runnable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum WaitingReason {
    #[default]
    NotWaiting,
    /// A read was issued and is in flight.
    FileReading,
    /// A read is queued behind a busy device.
    DevBusy,
}

pub struct Process<'m, M: PhysMapper> {
    pid: ProcessId,
    space: PagingTable<'m, M>,
    waiting: WaitingReason,
    last_io: Option<IoResult>,
}

impl<'m, M: PhysMapper> Process<'m, M> {
    /// A process with an empty address space. The kernel window is reserved
    /// so that user mappings land at or above `USER_BASE`.
    pub(crate) fn new<A: FrameAlloc>(
        pid: ProcessId,
        mapper: &'m M,
        frames: &mut A,
    ) -> Result<Self, PagingError> {
        let mut space = PagingTable::new(mapper, frames)?;
        if let Err(e) = space.reserve_virtual_range(0, KERNEL_WINDOW_PAGES) {
            space.release(frames);
            return Err(e);
        }
        Ok(Self {
            pid,
            space,
            waiting: WaitingReason::NotWaiting,
            last_io: None,
        })
    }

    #[must_use]
    pub const fn pid(&self) -> ProcessId {
        self.pid
    }

    #[must_use]
    pub const fn space(&self) -> &PagingTable<'m, M> {
        &self.space
    }

    pub(crate) const fn space_mut(&mut self) -> &mut PagingTable<'m, M> {
        &mut self.space
    }

    #[must_use]
    pub const fn waiting(&self) -> WaitingReason {
        self.waiting
    }

    #[must_use]
    pub fn is_runnable(&self) -> bool {
        self.waiting == WaitingReason::NotWaiting
    }

    /// Outcome of the most recently completed read.
    #[must_use]
    pub const fn last_io(&self) -> Option<IoResult> {
        self.last_io
    }

    pub(crate) const fn wait_for(&mut self, reason: WaitingReason) {
        self.waiting = reason;
    }

    pub(crate) fn wake(&mut self, result: IoResult) {
        self.waiting = WaitingReason::NotWaiting;
        self.last_io = Some(result);
    }

    pub(crate) fn release<A: FrameAlloc>(self, frames: &mut A) {
        self.space.release(frames);
    }
}

impl<M: PhysMapper> core::fmt::Debug for Process<'_, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("cr3", &self.space.get_page_table_addr())
            .field("waiting", &self.waiting)
            .field("last_io", &self.last_io)
            .finish()
    }
}
