use crate::device::Fd;
use kernel_vmem::AliasError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("{0} is not open")]
    BadDescriptor(Fd),
    #[error("transfer on {0} failed")]
    Io(Fd),
    #[error("seek on {0} left the file")]
    InvalidSeek(Fd),
}

/// Why an I/O operation ended in the error state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IoError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Alias(#[from] AliasError),
    #[error("device reported {reported} bytes for a {requested}-byte read")]
    Overrun { requested: usize, reported: usize },
    #[error("operation was cancelled")]
    Cancelled,
}
