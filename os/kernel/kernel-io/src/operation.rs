use crate::device::{Fd, FileDevice};
use crate::read::IoRead;
use crate::result::ResultSlot;
use crate::state::IoState;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::AliasMapper;

/// A pollable I/O operation.
///
/// Every variant follows the same protocol: [`state`](Self::state) polls for
/// progress, [`do_op`](Self::do_op) issues the work once the operation is
/// `Ready`, and [`cancel`](Self::cancel) abandons it.
#[derive(Debug)]
#[non_exhaustive]
pub enum IoOperation {
    Read(IoRead),
}

impl IoOperation {
    #[must_use]
    pub const fn fd(&self) -> Fd {
        match self {
            Self::Read(read) => read.fd(),
        }
    }

    #[must_use]
    pub const fn current_state(&self) -> IoState {
        match self {
            Self::Read(read) => read.current_state(),
        }
    }

    #[must_use]
    pub const fn result(&self) -> &ResultSlot {
        match self {
            Self::Read(read) => read.result(),
        }
    }

    /// Whether the operation still borrows user pages inside `length` bytes
    /// from `addr`.
    #[must_use]
    pub fn borrows_user_range(&self, addr: VirtualAddress, length: usize) -> bool {
        match self {
            Self::Read(read) => read.borrows_user_range(addr, length),
        }
    }

    pub fn state<D, A>(&mut self, device: &mut D, mapper: &mut A) -> IoState
    where
        D: FileDevice + ?Sized,
        A: AliasMapper + ?Sized,
    {
        match self {
            Self::Read(read) => read.state(device, mapper),
        }
    }

    pub fn do_op<D, A>(&mut self, device: &mut D, mapper: &mut A) -> IoState
    where
        D: FileDevice + ?Sized,
        A: AliasMapper + ?Sized,
    {
        match self {
            Self::Read(read) => read.do_op(device, mapper),
        }
    }

    pub fn cancel<A: AliasMapper + ?Sized>(&mut self, mapper: &mut A) -> bool {
        match self {
            Self::Read(read) => read.cancel(mapper),
        }
    }
}

impl From<IoRead> for IoOperation {
    fn from(read: IoRead) -> Self {
        Self::Read(read)
    }
}
