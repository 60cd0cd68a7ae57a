//! # QEMU Debug Console
//!
//! Log sink for kernels running under QEMU. Bytes written to I/O port `0x402`
//! show up on the host when QEMU runs with `-debugcon`:
//!
//! ```bash
//! qemu-system-i386 -kernel kernel.bin -debugcon stdio
//! ```
//!
//! ## Components
//!
//! * [`QemuLogger`]: a `log::Log` implementation; install it once during
//!   early boot and use the `log` macros everywhere else.
//! * [`qemu_trace!`]: formatted output that bypasses the `log` facade, for
//!   code that runs before the logger is installed.
//!
//! ## Features
//!
//! * `enabled` (default): writes go to the debug port. Without it every
//!   write is a no-op.
//!
//! The port write only exists on bare-metal x86 targets (`target_os = "none"`).
//! Host builds (unit tests) compile the sink as a no-op so that installing the
//! logger never executes a privileged instruction.
//!
//! ```rust,no_run
//! use kernel_qemu::QemuLogger;
//! use log::{LevelFilter, info};
//!
//! QemuLogger::new(LevelFilter::Debug).init().expect("logger initialization");
//! info!("paging enabled");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::{LoggerError, QemuLogger};

#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    #[cfg(all(
        feature = "enabled",
        target_os = "none",
        any(target_arch = "x86", target_arch = "x86_64")
    ))]
    mod port {
        /// QEMU's `-debugcon` port.
        const QEMU_DEBUG_PORT: u16 = 0x402;

        #[inline]
        pub fn putc(c: u8) {
            // SAFETY: ring 0; the debug port has no side effects besides output.
            unsafe {
                core::arch::asm!(
                    "out dx, al",
                    in("dx") QEMU_DEBUG_PORT,
                    in("al") c,
                    options(nomem, nostack, preserves_flags)
                );
            }
        }
    }

    #[cfg(not(all(
        feature = "enabled",
        target_os = "none",
        any(target_arch = "x86", target_arch = "x86_64")
    )))]
    mod port {
        #[inline]
        pub const fn putc(_: u8) {}
    }

    /// `fmt::Write` adapter over the debug port.
    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            s.bytes().for_each(port::putc);
            Ok(())
        }
    }

    #[inline]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best-effort output.
        let _ = fmt::write(&mut QemuSink, args);
    }
}

/// Formatted write straight to the debug port.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
