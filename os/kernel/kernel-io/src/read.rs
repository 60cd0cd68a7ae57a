//! # Asynchronous file read
//!
//! An [`IoRead`] copies `count` bytes from a file into a buffer owned by a
//! user process. The device only sees kernel addresses, so construction
//! aliases the user pages into kernel space; the alias lives until the read
//! ends in `Done` or `Error`, or until it is cancelled.
//!
//! The alias covers `offset_in_page + count` bytes from the page-aligned
//! user base. The kernel buffer handed to the device is the alias base plus
//! the same in-page offset, and the identical span is unmapped at the end.

#[cfg(feature = "async-read")]
use crate::device::AsyncIssue;
use crate::device::{Fd, FileDevice, Whence};
use crate::error::IoError;
use crate::result::{IoResult, ResultSlot};
use crate::state::IoState;
use kernel_memory_addresses::{VirtualAddress, pages_spanning};
use kernel_vmem::{AliasError, AliasMapper};
use log::{debug, error, trace, warn};

/// A kernel-space alias of the user buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct KernelAlias {
    /// Page-aligned kernel base.
    base: VirtualAddress,
    /// Bytes mapped from `base`.
    span: usize,
}

#[derive(Debug)]
pub struct IoRead {
    fd: Fd,
    user_buf: VirtualAddress,
    kernel_buf: VirtualAddress,
    count: usize,
    alias: Option<KernelAlias>,
    state: IoState,
    result: ResultSlot,
}

impl IoRead {
    /// Prepare a read of `count` bytes from `fd` into `user_buf`.
    ///
    /// A zero-byte read maps nothing.
    ///
    /// # Errors
    /// Any [`AliasError`] from mapping the user buffer; nothing stays mapped.
    pub fn new<A: AliasMapper + ?Sized>(
        fd: Fd,
        user_buf: VirtualAddress,
        count: usize,
        result: ResultSlot,
        mapper: &mut A,
    ) -> Result<Self, AliasError> {
        let (kernel_buf, alias) = if count == 0 {
            (VirtualAddress::zero(), None)
        } else {
            let offset = user_buf.offset();
            let span = count.checked_add(offset as usize).ok_or(AliasError::NotMapped(user_buf))?;
            let base = mapper.map_user_range_to_kernel(user_buf.page().base(), span)?;
            (base + offset, Some(KernelAlias { base, span }))
        };

        trace!("io: read of {count} byte(s) on {fd} into {user_buf} (kernel {kernel_buf})");
        Ok(Self {
            fd,
            user_buf,
            kernel_buf,
            count,
            alias,
            state: IoState::NotStarted,
            result,
        })
    }

    #[inline]
    #[must_use]
    pub const fn fd(&self) -> Fd {
        self.fd
    }

    #[inline]
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Whether the user pages this read still borrows intersect the pages
    /// covering `length` bytes from `addr`.
    ///
    /// A read that holds no alias (zero bytes, or already ended) borrows
    /// nothing.
    #[must_use]
    pub fn borrows_user_range(&self, addr: VirtualAddress, length: usize) -> bool {
        let Some(alias) = self.alias else {
            return false;
        };
        let first = self.user_buf.page().index();
        let end = first.saturating_add(pages_spanning(alias.span));

        let other = addr.page().index();
        let other_end =
            other.saturating_add(pages_spanning(length.saturating_add(addr.offset() as usize)));
        length != 0 && first < other_end && other < end
    }

    /// Where the device writes, while the alias exists.
    #[must_use]
    pub fn kernel_buffer(&self) -> Option<VirtualAddress> {
        self.alias.map(|_| self.kernel_buf)
    }

    /// Whether the user buffer is still aliased into kernel space.
    #[must_use]
    pub const fn holds_alias(&self) -> bool {
        self.alias.is_some()
    }

    /// The last state, without polling.
    #[inline]
    #[must_use]
    pub const fn current_state(&self) -> IoState {
        self.state
    }

    #[inline]
    #[must_use]
    pub const fn result(&self) -> &ResultSlot {
        &self.result
    }

    /// Poll for progress.
    ///
    /// - `NotStarted` becomes `Ready` once the device is idle; a zero-byte
    ///   read is ready right away.
    /// - `InProgress` becomes `Done` once exactly `count` bytes have arrived.
    ///   The stream is then advanced by `count`.
    /// - Terminal states are returned unchanged.
    pub fn state<D, A>(&mut self, device: &mut D, mapper: &mut A) -> IoState
    where
        D: FileDevice + ?Sized,
        A: AliasMapper + ?Sized,
    {
        match self.state {
            IoState::NotStarted => {
                if self.count == 0 || !device.device_busy(self.fd) {
                    self.state = IoState::Ready;
                    trace!("io: read on {} ready", self.fd);
                }
            }
            IoState::InProgress => match device.async_bytes_ready(self.fd) {
                Ok(n) if n == self.count => {
                    let outcome = Self::advance(device, self.fd, n);
                    self.finish(mapper, outcome);
                }
                Ok(n) if n > self.count => self.finish(
                    mapper,
                    Err(IoError::Overrun {
                        requested: self.count,
                        reported: n,
                    }),
                ),
                Ok(n) => trace!("io: read on {}: {n}/{} byte(s)", self.fd, self.count),
                Err(e) => self.finish(mapper, Err(e.into())),
            },
            IoState::Ready | IoState::Done | IoState::Error => {}
        }
        self.state
    }

    /// Issue the read. Only acts in `Ready`; never blocks.
    pub fn do_op<D, A>(&mut self, device: &mut D, mapper: &mut A) -> IoState
    where
        D: FileDevice + ?Sized,
        A: AliasMapper + ?Sized,
    {
        if self.state != IoState::Ready {
            return self.state;
        }
        if self.count == 0 {
            self.finish(mapper, Ok(0));
            return self.state;
        }

        #[cfg(feature = "async-read")]
        match device.async_read_issue(self.fd, self.kernel_buf, self.count) {
            Ok(AsyncIssue::NotSupported) => {
                trace!("io: {} has no async read, reading synchronously", self.fd);
                self.read_synchronously(device, mapper);
            }
            Ok(AsyncIssue::Accepted) => {
                self.state = IoState::InProgress;
                trace!("io: read on {} in progress", self.fd);
            }
            Ok(AsyncIssue::Immediate(n)) if n > self.count => self.finish(
                mapper,
                Err(IoError::Overrun {
                    requested: self.count,
                    reported: n,
                }),
            ),
            Ok(AsyncIssue::Immediate(n)) => {
                trace!("io: {n} byte(s) already buffered on {}", self.fd);
                let outcome = Self::advance(device, self.fd, n);
                self.finish(mapper, outcome);
            }
            Err(e) => self.finish(mapper, Err(e.into())),
        }

        #[cfg(not(feature = "async-read"))]
        self.read_synchronously(device, mapper);

        self.state
    }

    /// Abandon the read: the alias is dropped and the result becomes
    /// [`IoError::Cancelled`]. Returns `false` if the read had already ended.
    pub fn cancel<A: AliasMapper + ?Sized>(&mut self, mapper: &mut A) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.finish(mapper, Err(IoError::Cancelled));
        true
    }

    fn read_synchronously<D, A>(&mut self, device: &mut D, mapper: &mut A)
    where
        D: FileDevice + ?Sized,
        A: AliasMapper + ?Sized,
    {
        let outcome = device
            .synchronous_read(self.fd, self.kernel_buf, self.count)
            .map_err(IoError::from);
        self.finish(mapper, outcome);
    }

    /// Move the stream past `n` bytes that were delivered without a
    /// position update.
    fn advance<D: FileDevice + ?Sized>(device: &mut D, fd: Fd, n: usize) -> IoResult {
        device.seek(fd, i64::try_from(n).unwrap_or(i64::MAX), Whence::Cur)?;
        Ok(n)
    }

    fn finish<A: AliasMapper + ?Sized>(&mut self, mapper: &mut A, outcome: IoResult) {
        self.release_alias(mapper);
        match outcome {
            Ok(n) => {
                self.state = IoState::Done;
                debug!("io: read of {n} byte(s) on {} done", self.fd);
            }
            Err(e) => {
                self.state = IoState::Error;
                warn!("io: read on {} failed: {e}", self.fd);
            }
        }
        self.result.resolve(outcome);
    }

    fn release_alias<A: AliasMapper + ?Sized>(&mut self, mapper: &mut A) {
        if let Some(alias) = self.alias.take()
            && let Err(e) = mapper.unmap_kernel_range(alias.base, alias.span)
        {
            error!(
                "io: could not drop kernel alias {}+{} of {}: {e}",
                alias.base, alias.span, self.user_buf
            );
        }
    }
}

impl Drop for IoRead {
    fn drop(&mut self) {
        if let Some(alias) = self.alias {
            error!(
                "io: read on {} dropped in {:?}, leaking kernel alias {}+{}",
                self.fd, self.state, alias.base, alias.span
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::AsyncIssue;
    use crate::error::DeviceError;
    use crate::test_support::{FakeDevice, FakeMapper};

    fn read(fd: u32, buf: u32, count: usize, mapper: &mut FakeMapper) -> IoRead {
        IoRead::new(Fd(fd), VirtualAddress::new(buf), count, ResultSlot::new(), mapper).unwrap()
    }

    #[cfg(feature = "async-read")]
    #[test]
    fn construction_maps_offset_plus_count() {
        let mut mapper = FakeMapper::default();
        let op = read(3, 0x1000_0FF6, 100, &mut mapper);
        assert_eq!(mapper.mapped, vec![(VirtualAddress::new(0x1000_0000), 4186)]);
        let kbuf = op.kernel_buffer().unwrap();
        assert_eq!(kbuf.offset(), 0xFF6);
        let kbase = mapper.live[0].0;
        assert_eq!(kbuf.page().base(), kbase);

        let mut device = FakeDevice::default();
        device.issue = AsyncIssue::Immediate(100);
        let mut op = op;
        assert_eq!(op.state(&mut device, &mut mapper), IoState::Ready);
        assert_eq!(op.do_op(&mut device, &mut mapper), IoState::Done);
        assert_eq!(mapper.unmapped, vec![(kbase, 4186)]);
        assert!(mapper.live.is_empty());
    }

    #[test]
    fn zero_byte_read_touches_nothing() {
        let mut mapper = FakeMapper::default();
        let mut device = FakeDevice::default();
        device.busy.insert(Fd(1));
        let mut op = read(1, 0x1000_0000, 0, &mut mapper);
        assert!(mapper.mapped.is_empty());
        assert_eq!(op.kernel_buffer(), None);

        assert_eq!(op.state(&mut device, &mut mapper), IoState::Ready);
        assert_eq!(op.do_op(&mut device, &mut mapper), IoState::Done);
        assert_eq!(op.state(&mut device, &mut mapper), IoState::Done);
        assert_eq!(op.result().get(), Some(Ok(0)));
        assert_eq!(device.issued, 0);
        assert_eq!(device.sync_reads, 0);
        assert!(device.seeks.is_empty());
    }

    #[test]
    fn waits_while_device_busy() {
        let mut mapper = FakeMapper::default();
        let mut device = FakeDevice::default();
        device.busy.insert(Fd(2));
        let mut op = read(2, 0x1000_0000, 16, &mut mapper);

        assert_eq!(op.state(&mut device, &mut mapper), IoState::NotStarted);
        assert_eq!(op.do_op(&mut device, &mut mapper), IoState::NotStarted);
        assert_eq!(device.issued, 0);

        device.busy.clear();
        assert_eq!(op.state(&mut device, &mut mapper), IoState::Ready);
        op.cancel(&mut mapper);
    }

    #[cfg(feature = "async-read")]
    #[test]
    fn immediate_read_seeks_and_finishes_in_one_step() {
        let mut mapper = FakeMapper::default();
        let mut device = FakeDevice::default();
        device.issue = AsyncIssue::Immediate(40);
        let mut op = read(5, 0x1000_0000, 64, &mut mapper);
        op.state(&mut device, &mut mapper);

        assert_eq!(op.do_op(&mut device, &mut mapper), IoState::Done);
        assert_eq!(device.seeks, vec![(Fd(5), 40, Whence::Cur)]);
        assert_eq!(op.result().get(), Some(Ok(40)));
        assert!(!op.holds_alias());
    }

    #[cfg(feature = "async-read")]
    #[test]
    fn accepted_read_completes_on_exact_count() {
        let mut mapper = FakeMapper::default();
        let mut device = FakeDevice::default();
        device.issue = AsyncIssue::Accepted;
        let mut op = read(4, 0x1000_0010, 512, &mut mapper);
        op.state(&mut device, &mut mapper);
        assert_eq!(op.do_op(&mut device, &mut mapper), IoState::InProgress);

        device.ready = 100;
        assert_eq!(op.state(&mut device, &mut mapper), IoState::InProgress);
        assert!(op.holds_alias());
        assert!(device.seeks.is_empty());

        device.ready = 512;
        assert_eq!(op.state(&mut device, &mut mapper), IoState::Done);
        assert_eq!(device.seeks, vec![(Fd(4), 512, Whence::Cur)]);
        assert_eq!(mapper.unmapped.len(), 1);
        assert_eq!(op.result().get(), Some(Ok(512)));

        device.ready = 0;
        assert_eq!(op.state(&mut device, &mut mapper), IoState::Done);
        assert_eq!(device.seeks.len(), 1);
    }

    #[cfg(feature = "async-read")]
    #[test]
    fn unsupported_async_falls_back_to_sync_read() {
        let mut mapper = FakeMapper::default();
        let mut device = FakeDevice::default();
        device.issue = AsyncIssue::NotSupported;
        device.sync_result = Ok(7);
        let mut op = read(6, 0x1000_0000, 32, &mut mapper);
        op.state(&mut device, &mut mapper);

        assert_eq!(op.do_op(&mut device, &mut mapper), IoState::Done);
        assert_eq!(device.sync_reads, 1);
        assert!(device.seeks.is_empty());
        assert_eq!(op.result().get(), Some(Ok(7)));
        assert!(mapper.live.is_empty());
    }

    #[cfg(feature = "async-read")]
    #[test]
    fn device_errors_end_in_error_state() {
        let mut mapper = FakeMapper::default();
        let mut device = FakeDevice::default();
        device.issue = AsyncIssue::Accepted;
        let mut op = read(7, 0x1000_0000, 8, &mut mapper);
        op.state(&mut device, &mut mapper);
        op.do_op(&mut device, &mut mapper);

        device.ready_error = Some(DeviceError::Io(Fd(7)));
        assert_eq!(op.state(&mut device, &mut mapper), IoState::Error);
        assert_eq!(op.result().get(), Some(Err(IoError::Device(DeviceError::Io(Fd(7))))));
        assert!(mapper.live.is_empty());
        assert!(!op.cancel(&mut mapper));
    }

    #[cfg(feature = "async-read")]
    #[test]
    fn overrun_is_an_error() {
        let mut mapper = FakeMapper::default();
        let mut device = FakeDevice::default();
        device.issue = AsyncIssue::Accepted;
        let mut op = read(8, 0x1000_0000, 8, &mut mapper);
        op.state(&mut device, &mut mapper);
        op.do_op(&mut device, &mut mapper);

        device.ready = 9;
        assert_eq!(op.state(&mut device, &mut mapper), IoState::Error);
        assert_eq!(
            op.result().get(),
            Some(Err(IoError::Overrun {
                requested: 8,
                reported: 9
            }))
        );
    }

    #[test]
    fn cancel_releases_alias_once() {
        let mut mapper = FakeMapper::default();
        let mut op = read(9, 0x1000_0000, 8, &mut mapper);
        assert!(op.cancel(&mut mapper));
        assert!(!op.cancel(&mut mapper));
        assert_eq!(mapper.unmapped.len(), 1);
        assert_eq!(op.current_state(), IoState::Error);
        assert_eq!(op.result().get(), Some(Err(IoError::Cancelled)));
    }

    #[test]
    fn failed_alias_maps_nothing() {
        let mut mapper = FakeMapper {
            fail: true,
            ..FakeMapper::default()
        };
        let buf = VirtualAddress::new(0x1000_0000);
        assert_eq!(
            IoRead::new(Fd(1), buf, 4, ResultSlot::new(), &mut mapper).unwrap_err(),
            AliasError::NotMapped(buf)
        );
        assert!(mapper.live.is_empty());
    }

    #[cfg(feature = "async-read")]
    #[test]
    fn immediate_overrun_ends_in_error_without_seeking() {
        let mut mapper = FakeMapper::default();
        let mut device = FakeDevice::default();
        device.issue = AsyncIssue::Immediate(9);
        let mut op = read(10, 0x1000_0000, 8, &mut mapper);
        op.state(&mut device, &mut mapper);

        assert_eq!(op.do_op(&mut device, &mut mapper), IoState::Error);
        assert_eq!(
            op.result().get(),
            Some(Err(IoError::Overrun {
                requested: 8,
                reported: 9
            }))
        );
        assert!(device.seeks.is_empty());
        assert!(!op.holds_alias());
        assert!(mapper.live.is_empty());
    }

    #[test]
    fn failed_sync_read_ends_in_error() {
        let mut mapper = FakeMapper::default();
        let mut device = FakeDevice::default();
        device.issue = AsyncIssue::NotSupported;
        device.sync_result = Err(DeviceError::Io(Fd(11)));
        let mut op = read(11, 0x1000_0004, 16, &mut mapper);
        op.state(&mut device, &mut mapper);

        assert_eq!(op.do_op(&mut device, &mut mapper), IoState::Error);
        assert_eq!(device.sync_reads, 1);
        assert_eq!(
            op.result().get(),
            Some(Err(IoError::Device(DeviceError::Io(Fd(11)))))
        );
        assert_eq!(mapper.unmapped.len(), 1);
        assert!(mapper.live.is_empty());
    }

    #[cfg(feature = "async-read")]
    #[test]
    fn failed_seek_after_completion_ends_in_error() {
        let mut mapper = FakeMapper::default();
        let mut device = FakeDevice::default();
        device.issue = AsyncIssue::Accepted;
        let mut op = read(12, 0x1000_0000, 32, &mut mapper);
        op.state(&mut device, &mut mapper);
        assert_eq!(op.do_op(&mut device, &mut mapper), IoState::InProgress);

        device.ready = 32;
        device.seek_error = Some(DeviceError::InvalidSeek(Fd(12)));
        assert_eq!(op.state(&mut device, &mut mapper), IoState::Error);
        assert_eq!(device.seeks, vec![(Fd(12), 32, Whence::Cur)]);
        assert_eq!(
            op.result().get(),
            Some(Err(IoError::Device(DeviceError::InvalidSeek(Fd(12)))))
        );
        assert!(mapper.live.is_empty());
    }

    #[test]
    fn borrowed_pages_follow_the_alias() {
        let mut mapper = FakeMapper::default();
        // 0x1000_1FF0 + 0x20 touches pages 0x1000_1000 and 0x1000_2000
        let mut op = read(13, 0x1000_1FF0, 0x20, &mut mapper);
        assert!(op.borrows_user_range(VirtualAddress::new(0x1000_2000), 1));
        assert!(op.borrows_user_range(VirtualAddress::new(0x1000_0FFF), 2));
        assert!(!op.borrows_user_range(VirtualAddress::new(0x1000_0000), 0x1000));
        assert!(!op.borrows_user_range(VirtualAddress::new(0x1000_3000), 0x1000));
        assert!(!op.borrows_user_range(VirtualAddress::new(0x1000_1000), 0));

        op.cancel(&mut mapper);
        assert!(!op.borrows_user_range(VirtualAddress::new(0x1000_1000), 0x1000));
        assert!(!read(14, 0x1000_1000, 0, &mut mapper)
            .borrows_user_range(VirtualAddress::new(0x1000_1000), 0x1000));
    }
}
