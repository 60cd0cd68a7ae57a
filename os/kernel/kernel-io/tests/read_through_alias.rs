//! A read whose destination crosses a page edge, aliased by the real VMM
//! over simulated RAM.

use kernel_alloc::frame_alloc::BitmapFrameAlloc;
use kernel_alloc::phys_mapper::ArenaPhysMapper;
use kernel_alloc::vmm::Vmm;
use kernel_io::{AsyncIssue, DeviceError, Fd, FileDevice, IoRead, IoState, ResultSlot, Whence};
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::info::{ALIAS_WINDOW_START, KERNEL_WINDOW_PAGES, user_base};
use kernel_vmem::{FrameAlloc, PagingTable};

/// Accepts every read and delivers whatever the test says has arrived.
#[derive(Default)]
struct Disk {
    pos: i64,
    pending: Option<(VirtualAddress, usize)>,
    delivered: usize,
}

impl FileDevice for Disk {
    fn device_busy(&self, _fd: Fd) -> bool {
        false
    }

    fn async_read_issue(
        &mut self,
        _fd: Fd,
        kernel_buf: VirtualAddress,
        count: usize,
    ) -> Result<AsyncIssue, DeviceError> {
        self.pending = Some((kernel_buf, count));
        Ok(AsyncIssue::Accepted)
    }

    fn async_bytes_ready(&self, _fd: Fd) -> Result<usize, DeviceError> {
        Ok(self.delivered)
    }

    fn seek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<u64, DeviceError> {
        assert_eq!(whence, Whence::Cur);
        self.pos += offset;
        u64::try_from(self.pos).map_err(|_| DeviceError::InvalidSeek(fd))
    }

    fn synchronous_read(
        &mut self,
        fd: Fd,
        _kernel_buf: VirtualAddress,
        _count: usize,
    ) -> Result<usize, DeviceError> {
        Err(DeviceError::Io(fd))
    }
}

fn write_virtual(
    ram: &ArenaPhysMapper,
    space: &PagingTable<'_, ArenaPhysMapper>,
    va: VirtualAddress,
    bytes: &[u8],
) {
    for (i, b) in (0u32..).zip(bytes) {
        let pa = space.get_phys_from_virtual(va + i).expect("mapped");
        ram.write(pa, &[*b]);
    }
}

fn read_virtual(
    ram: &ArenaPhysMapper,
    space: &PagingTable<'_, ArenaPhysMapper>,
    va: VirtualAddress,
    len: u32,
) -> Vec<u8> {
    (0..len)
        .map(|i| {
            let mut b = [0u8];
            ram.read(space.get_phys_from_virtual(va + i).expect("mapped"), &mut b);
            b[0]
        })
        .collect()
}

#[cfg(feature = "async-read")]
#[test]
fn device_data_lands_in_user_buffer() {
    let ram = ArenaPhysMapper::with_frames(64);
    let mut frames = BitmapFrameAlloc::new();
    frames.release_range(1, 63);
    let mut kernel = PagingTable::new(&ram, &mut frames).unwrap();
    let mut user = PagingTable::new(&ram, &mut frames).unwrap();
    user.reserve_virtual_range(0, KERNEL_WINDOW_PAGES).unwrap();

    let region = Vmm::new(&mut user, &mut frames)
        .mmap(user_base(), 2 * 4096, true, true)
        .unwrap();
    let buf = region + (4096 - 10);

    let slot = ResultSlot::new();
    let mut op = IoRead::new(
        Fd(3),
        buf,
        100,
        slot.clone(),
        &mut Vmm::new(&mut kernel, &mut frames).with_source(&user),
    )
    .unwrap();
    assert_eq!(kernel.mapped_pages(), 2);

    let mut disk = Disk::default();
    let mut vmm = Vmm::new(&mut kernel, &mut frames).with_source(&user);
    assert_eq!(op.state(&mut disk, &mut vmm), IoState::Ready);
    assert_eq!(op.do_op(&mut disk, &mut vmm), IoState::InProgress);
    drop(vmm);

    let (kbuf, count) = disk.pending.expect("read was issued");
    assert_eq!(count, 100);
    assert_eq!(kbuf.offset(), 4096 - 10);
    assert!(kbuf.as_u32() >= ALIAS_WINDOW_START);
    let data: Vec<u8> = (0u8..100).collect();
    write_virtual(&ram, &kernel, kbuf, &data);
    disk.delivered = 100;

    let mut vmm = Vmm::new(&mut kernel, &mut frames).with_source(&user);
    assert_eq!(op.state(&mut disk, &mut vmm), IoState::Done);
    drop(vmm);

    assert_eq!(slot.get(), Some(Ok(100)));
    assert_eq!(disk.pos, 100);
    assert_eq!(kernel.mapped_pages(), 0);
    assert_eq!(read_virtual(&ram, &user, buf, 100), data);

    let frame = user.get_phys_from_virtual(buf).unwrap().page();
    assert!(!frames.is_available(frame));
}

#[test]
fn unmapped_destination_is_rejected() {
    let ram = ArenaPhysMapper::with_frames(8);
    let mut frames = BitmapFrameAlloc::new();
    frames.release_range(1, 7);
    let mut kernel = PagingTable::new(&ram, &mut frames).unwrap();
    let user = PagingTable::new(&ram, &mut frames).unwrap();

    let result = IoRead::new(
        Fd(1),
        user_base(),
        16,
        ResultSlot::new(),
        &mut Vmm::new(&mut kernel, &mut frames).with_source(&user),
    );
    assert!(result.is_err());
    assert_eq!(kernel.mapped_pages(), 0);
}
