//! # Kernel state
//!
//! Everything the system calls and the scheduler tick touch: the physical
//! frame allocator, the kernel address space, the process table and the I/O
//! queue. It lives behind one lock (see [`crate::init`]), so the frame bitmap
//! and every virtual-page bitmap change under the same lock.

use crate::error::KernelError;
use crate::process::{Process, WaitingReason};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use kernel_alloc::frame_alloc::BitmapFrameAlloc;
use kernel_alloc::vmm::Vmm;
use kernel_info::boot::BootMemoryMap;
use kernel_info::memory::{DEVICE_WINDOW_START, KERNEL_WINDOW_END, PHYS_LOAD, user_base};
use kernel_io::{Completion, Fd, FileDevice, IoQueue, IoRead, IoState, ProcessId, ResultSlot};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::{FrameAlloc, PagingTable, PhysMapper};
use log::{debug, info, warn};

pub struct Kernel<'m, M: PhysMapper> {
    mapper: &'m M,
    frames: BitmapFrameAlloc,
    space: PagingTable<'m, M>,
    processes: BTreeMap<ProcessId, Process<'m, M>>,
    next_pid: u32,
    io: IoQueue,
}

impl<'m, M: PhysMapper> Kernel<'m, M> {
    /// Bring up memory management.
    ///
    /// Frames are seeded from `memory_map`, keeping everything below
    /// `kernel_end` for the kernel image. The kernel address space
    /// identity-maps the image and all usable RAM inside the kernel window.
    ///
    /// # Errors
    /// [`KernelError::Vmm`] or [`KernelError::Paging`] if frames run out.
    pub fn boot(
        mapper: &'m M,
        memory_map: &BootMemoryMap<'_>,
        kernel_end: PhysicalAddress,
    ) -> Result<Self, KernelError> {
        let mut frames = BitmapFrameAlloc::from_memory_map(memory_map, kernel_end);
        let mut space = PagingTable::new(mapper, &mut frames)?;

        let mut vmm = Vmm::new(&mut space, &mut frames);
        let image = PhysicalAddress::new(PHYS_LOAD);
        let image_len = kernel_end.as_usize().saturating_sub(image.as_usize());
        let mut identity = vmm.identity_map(image, image_len, true)?;

        for region in memory_map.usable() {
            let Some(start) = region.start() else { continue };
            if start.as_u32() >= KERNEL_WINDOW_END {
                continue;
            }
            let end = region.end_clipped().min(u64::from(KERNEL_WINDOW_END));
            let len = usize::try_from(end - u64::from(start.as_u32())).unwrap_or(usize::MAX);
            identity += vmm.identity_map(start, len, true)?;
        }

        info!(
            "kernel: {} page(s) identity-mapped, {} frame(s) free",
            identity,
            frames.available_frames()
        );
        Ok(Self {
            mapper,
            frames,
            space,
            processes: BTreeMap::new(),
            next_pid: 1,
            io: IoQueue::new(),
        })
    }

    /// Identity-map device memory (framebuffer, APIC) into the kernel space.
    ///
    /// The range must lie inside the kernel window or at or above
    /// `DEVICE_WINDOW_START`; the user and alias range in between is refused.
    ///
    /// # Errors
    /// - [`KernelError::NotDeviceMemory`] for a range outside both windows.
    /// - [`KernelError::Vmm`] if a page in the range maps another frame or a
    ///   page table cannot be allocated.
    pub fn map_device(&mut self, base: PhysicalAddress, size: usize) -> Result<usize, KernelError> {
        let start = u64::from(base.as_u32());
        let end = start.saturating_add(u64::try_from(size).unwrap_or(u64::MAX));
        let in_window = end <= u64::from(KERNEL_WINDOW_END);
        if !in_window && start < u64::from(DEVICE_WINDOW_START) {
            warn!("kernel: refusing device mapping {base}+{size:#x}");
            return Err(KernelError::NotDeviceMemory { base, size });
        }
        let mapped = Vmm::new(&mut self.space, &mut self.frames)
            .identity_map(base, size, true)
            .inspect_err(|e| warn!("kernel: device window {base}+{size:#x} not mapped: {e}"))?;
        debug!("kernel: device window {base}+{size:#x} mapped ({mapped} new page(s))");
        Ok(mapped)
    }

    #[must_use]
    pub const fn kernel_space(&self) -> &PagingTable<'m, M> {
        &self.space
    }

    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.frames.available_frames()
    }

    #[must_use]
    pub fn process(&self, pid: ProcessId) -> Option<&Process<'m, M>> {
        self.processes.get(&pid)
    }

    pub fn processes(&self) -> impl Iterator<Item = &Process<'m, M>> {
        self.processes.values()
    }

    #[must_use]
    pub fn pending_io(&self) -> usize {
        self.io.len()
    }

    /// Translate a user address of `pid`.
    #[must_use]
    pub fn translate(&self, pid: ProcessId, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.processes.get(&pid)?.space().get_phys_from_virtual(va)
    }

    /// Create a process with an empty address space.
    ///
    /// # Errors
    /// [`KernelError::Paging`] if no frame is left for its page directory.
    pub fn spawn_process(&mut self) -> Result<ProcessId, KernelError> {
        let pid = ProcessId(self.next_pid);
        let process = Process::new(pid, self.mapper, &mut self.frames)?;
        self.next_pid += 1;
        info!(
            "kernel: spawned {pid}, directory at {}",
            process.space().get_page_table_addr()
        );
        self.processes.insert(pid, process);
        Ok(pid)
    }

    /// Map `length` bytes of zeroed, user-accessible memory into `pid`.
    /// `hint` is where the search for a free range starts; hints inside the
    /// kernel window start at `USER_BASE`.
    ///
    /// # Errors
    /// [`KernelError::NoSuchProcess`] or the [`KernelError::Vmm`] failure.
    pub fn sys_mmap(
        &mut self,
        pid: ProcessId,
        hint: VirtualAddress,
        length: usize,
        writable: bool,
    ) -> Result<VirtualAddress, KernelError> {
        let process = self
            .processes
            .get_mut(&pid)
            .ok_or(KernelError::NoSuchProcess(pid))?;
        let hint = hint.max(user_base());
        let va = Vmm::new(process.space_mut(), &mut self.frames)
            .mmap(hint, length, writable, true)
            .inspect_err(|e| warn!("kernel: {pid} mmap of {length} byte(s) failed: {e}"))?;
        Ok(va)
    }

    /// Unmap `length` bytes at `addr` from `pid`.
    ///
    /// Pages a queued read of `pid` still writes into stay mapped.
    ///
    /// # Errors
    /// [`KernelError::NoSuchProcess`], [`KernelError::BufferInUse`] or the
    /// [`KernelError::Vmm`] failure; nothing is unmapped on error.
    pub fn sys_munmap(
        &mut self,
        pid: ProcessId,
        addr: VirtualAddress,
        length: usize,
    ) -> Result<(), KernelError> {
        let process = self
            .processes
            .get_mut(&pid)
            .ok_or(KernelError::NoSuchProcess(pid))?;
        if self.io.borrows_user_range(pid, addr, length) {
            warn!("kernel: {pid} munmap at {addr} overlaps a read in flight");
            return Err(KernelError::BufferInUse { pid, addr });
        }
        Vmm::new(process.space_mut(), &mut self.frames)
            .munmap(addr, length)
            .inspect_err(|e| warn!("kernel: {pid} munmap at {addr} failed: {e}"))?;
        Ok(())
    }

    /// Queue a read of `count` bytes from `fd` into `buf` of `pid` and park
    /// the process until it completes.
    ///
    /// The returned slot receives the outcome; the process also sees it in
    /// [`Process::last_io`] once woken.
    ///
    /// # Errors
    /// [`KernelError::NoSuchProcess`], or [`KernelError::Alias`] if the
    /// buffer is not mapped in `pid`.
    pub fn sys_read(
        &mut self,
        pid: ProcessId,
        fd: Fd,
        buf: VirtualAddress,
        count: usize,
    ) -> Result<ResultSlot, KernelError> {
        let process = self
            .processes
            .get_mut(&pid)
            .ok_or(KernelError::NoSuchProcess(pid))?;

        let slot = ResultSlot::new();
        let mut vmm = Vmm::new(&mut self.space, &mut self.frames).with_source(process.space());
        let read = IoRead::new(fd, buf, count, slot.clone(), &mut vmm)
            .inspect_err(|e| warn!("kernel: {pid} read into {buf} rejected: {e}"))?;

        self.io.submit(pid, read);
        process.wait_for(WaitingReason::FileReading);
        Ok(slot)
    }

    /// Poll the I/O queue once and wake the processes whose reads ended.
    pub fn tick<D: FileDevice + ?Sized>(&mut self, device: &mut D) -> Vec<Completion> {
        let mut vmm = Vmm::new(&mut self.space, &mut self.frames);
        let done = self.io.poll_all(device, &mut vmm);

        for completion in &done {
            if let Some(process) = self.processes.get_mut(&completion.process_id) {
                process.wake(completion.result);
            }
        }
        for entry in self.io.iter() {
            if let Some(process) = self.processes.get_mut(&entry.process_id) {
                process.wait_for(match entry.op.current_state() {
                    IoState::NotStarted => WaitingReason::DevBusy,
                    _ => WaitingReason::FileReading,
                });
            }
        }
        done
    }

    /// End `pid`: cancel its I/O, then return its address space to the
    /// frame allocator.
    ///
    /// # Errors
    /// [`KernelError::NoSuchProcess`] if `pid` does not exist.
    pub fn sys_exit(&mut self, pid: ProcessId) -> Result<(), KernelError> {
        let process = self
            .processes
            .remove(&pid)
            .ok_or(KernelError::NoSuchProcess(pid))?;

        let cancelled = self
            .io
            .cancel_process(pid, &mut Vmm::new(&mut self.space, &mut self.frames));
        process.release(&mut self.frames);
        info!(
            "kernel: {pid} exited ({} read(s) cancelled, {} frame(s) free)",
            cancelled.len(),
            self.frames.available_frames()
        );
        Ok(())
    }

    /// Whether `frame` is free in the physical allocator.
    #[must_use]
    pub fn is_frame_free(&self, frame: kernel_memory_addresses::PhysicalPage) -> bool {
        self.frames.is_available(frame)
    }
}
