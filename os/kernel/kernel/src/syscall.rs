//! System call numbers and dispatch.

use crate::error::KernelError;
use crate::kernel_state::Kernel;
use kernel_io::{Fd, ProcessId};
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::PhysMapper;
use log::{trace, warn};

/// Returned in `eax` when a call fails.
pub const SYSCALL_ERROR: u32 = u32::MAX;

/// System call numbers (i386 Linux numbering).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum Sysno {
    /// `exit()`.
    Exit = 1,
    /// `read(fd, buf, count)`; the byte count arrives when the process wakes.
    Read = 3,
    /// `mmap(hint, length, writable)`; returns the mapped address.
    Mmap = 90,
    /// `munmap(addr, length)`.
    Munmap = 91,
}

impl TryFrom<u32> for Sysno {
    type Error = KernelError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Exit),
            3 => Ok(Self::Read),
            90 => Ok(Self::Mmap),
            91 => Ok(Self::Munmap),
            other => Err(KernelError::UnknownSyscall(other)),
        }
    }
}

impl<M: PhysMapper> Kernel<'_, M> {
    /// Entry from the `int 0x80` handler with `eax` and `ebx`/`ecx`/`edx`.
    ///
    /// Only runnable processes may call in; a process parked on a read gets
    /// [`SYSCALL_ERROR`].
    pub fn syscall(&mut self, pid: ProcessId, sysno: u32, arg0: u32, arg1: u32, arg2: u32) -> u32 {
        trace!("syscall: {pid} #{sysno} ({arg0:#x}, {arg1:#x}, {arg2:#x})");
        match self.dispatch(pid, sysno, arg0, arg1, arg2) {
            Ok(ret) => ret,
            Err(e) => {
                warn!("syscall: {pid} #{sysno} failed: {e}");
                SYSCALL_ERROR
            }
        }
    }

    fn dispatch(
        &mut self,
        pid: ProcessId,
        sysno: u32,
        arg0: u32,
        arg1: u32,
        arg2: u32,
    ) -> Result<u32, KernelError> {
        let sysno = Sysno::try_from(sysno)?;
        let process = self.process(pid).ok_or(KernelError::NoSuchProcess(pid))?;
        if !process.is_runnable() {
            return Err(KernelError::NotRunnable {
                pid,
                waiting: process.waiting(),
            });
        }

        let len = |v: u32| usize::try_from(v).unwrap_or(usize::MAX);
        match sysno {
            Sysno::Exit => self.sys_exit(pid).map(|()| 0),
            Sysno::Read => self
                .sys_read(pid, Fd(arg0), VirtualAddress::new(arg1), len(arg2))
                .map(|_| 0),
            Sysno::Mmap => self
                .sys_mmap(pid, VirtualAddress::new(arg0), len(arg1), arg2 != 0)
                .map(VirtualAddress::as_u32),
            Sysno::Munmap => self
                .sys_munmap(pid, VirtualAddress::new(arg0), len(arg1))
                .map(|()| 0),
        }
    }
}
