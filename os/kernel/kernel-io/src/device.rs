//! The device side of a file read.

use crate::error::DeviceError;
use core::fmt;
use kernel_memory_addresses::VirtualAddress;

/// File descriptor as seen by the device layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fd(pub u32);

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd {}", self.0)
    }
}

/// Reference point of a [`FileDevice::seek`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// Outcome of [`FileDevice::async_read_issue`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AsyncIssue {
    /// The device cannot read asynchronously; read synchronously instead.
    NotSupported,
    /// The read was started; progress shows up in
    /// [`FileDevice::async_bytes_ready`].
    Accepted,
    /// The data was already buffered and has been copied. The stream
    /// position has not moved.
    Immediate(usize),
}

/// Device operations an I/O operation drives.
///
/// Buffers are kernel virtual addresses; the device writes through them
/// directly.
pub trait FileDevice {
    /// Whether the device behind `fd` is still serving an earlier request.
    fn device_busy(&self, fd: Fd) -> bool;

    /// Start reading `count` bytes into `kernel_buf`.
    ///
    /// # Errors
    /// Fails if `fd` is not open or the device rejects the request.
    fn async_read_issue(
        &mut self,
        fd: Fd,
        kernel_buf: VirtualAddress,
        count: usize,
    ) -> Result<AsyncIssue, DeviceError>;

    /// Bytes of the accepted asynchronous read that have arrived so far.
    ///
    /// # Errors
    /// Fails if `fd` is not open or the transfer failed.
    fn async_bytes_ready(&self, fd: Fd) -> Result<usize, DeviceError>;

    /// Move the stream position and return the new absolute position.
    ///
    /// # Errors
    /// Fails if `fd` is not open or the target position is invalid.
    fn seek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<u64, DeviceError>;

    /// Read up to `count` bytes into `kernel_buf`, advancing the stream
    /// position, and return the number of bytes read.
    ///
    /// # Errors
    /// Fails if `fd` is not open or the device reports an error.
    fn synchronous_read(
        &mut self,
        fd: Fd,
        kernel_buf: VirtualAddress,
        count: usize,
    ) -> Result<usize, DeviceError>;
}
