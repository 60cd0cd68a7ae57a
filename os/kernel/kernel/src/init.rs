//! Boot-time setup and the global kernel instance.

use crate::error::KernelError;
use crate::kernel_state::Kernel;
use kernel_alloc::phys_mapper::IdentityPhysMapper;
use kernel_info::boot::BootMemoryMap;
use kernel_memory_addresses::PhysicalAddress;
use kernel_qemu::QemuLogger;
use kernel_sync::{SpinLock, SyncOnceCell};
use log::{LevelFilter, info};

pub type KernelInstance = Kernel<'static, IdentityPhysMapper>;

static IDENTITY: IdentityPhysMapper = IdentityPhysMapper;
static KERNEL: SyncOnceCell<SpinLock<KernelInstance>> = SyncOnceCell::new();

/// Install the QEMU debug-port logger.
///
/// # Errors
/// [`KernelError::Logger`] if a logger is already installed.
pub fn init_logging(level: LevelFilter) -> Result<(), KernelError> {
    QemuLogger::new(level).init()?;
    info!("Kernel reporting to QEMU!");
    Ok(())
}

/// Build the global kernel from the boot memory map.
///
/// # Safety
/// Physical memory below the kernel window end must be reachable at its own
/// address: paging is off, or the active tables identity-map it.
///
/// # Errors
/// [`KernelError::AlreadyInitialized`] on a second call, or the boot failure.
pub unsafe fn init_kernel(
    memory_map: &BootMemoryMap<'_>,
    kernel_end: PhysicalAddress,
) -> Result<(), KernelError> {
    if KERNEL.is_initialized() {
        return Err(KernelError::AlreadyInitialized);
    }
    info!(
        "Initializing memory management ({} KiB usable) ...",
        memory_map.usable_bytes() / 1024
    );
    let kernel = Kernel::boot(&IDENTITY, memory_map, kernel_end)?;
    KERNEL
        .set(SpinLock::new(kernel))
        .map_err(|_| KernelError::AlreadyInitialized)
}

/// Run `f` with the kernel locked.
///
/// # Errors
/// [`KernelError::NotInitialized`] before [`init_kernel`] succeeded.
#[inline]
pub fn with_kernel<R>(f: impl FnOnce(&mut KernelInstance) -> R) -> Result<R, KernelError> {
    let kernel = KERNEL.get().ok_or(KernelError::NotInitialized)?;
    Ok(kernel.with_lock(f))
}
