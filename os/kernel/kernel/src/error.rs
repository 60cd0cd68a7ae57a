use kernel_alloc::vmm::VmmError;
use crate::process::WaitingReason;
use kernel_io::ProcessId;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_qemu::LoggerError;
use kernel_vmem::{AliasError, PagingError};

/// Why a kernel entry point refused a request. None of these stop the kernel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    #[error("no such process: {0}")]
    NoSuchProcess(ProcessId),
    #[error("the kernel is not initialized")]
    NotInitialized,
    #[error("the kernel is already initialized")]
    AlreadyInitialized,
    #[error("unknown system call {0}")]
    UnknownSyscall(u32),
    #[error("{pid} cannot make system calls while waiting ({waiting:?})")]
    NotRunnable { pid: ProcessId, waiting: WaitingReason },
    #[error("{pid} has a read in flight into the pages at {addr}")]
    BufferInUse { pid: ProcessId, addr: VirtualAddress },
    #[error("{base}+{size:#x} is neither in the kernel window nor the device window")]
    NotDeviceMemory { base: PhysicalAddress, size: usize },
    #[error(transparent)]
    Vmm(#[from] VmmError),
    #[error(transparent)]
    Paging(#[from] PagingError),
    #[error(transparent)]
    Alias(#[from] AliasError),
    #[error(transparent)]
    Logger(#[from] LoggerError),
}
