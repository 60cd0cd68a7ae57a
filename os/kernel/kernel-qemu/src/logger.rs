use crate::qemu_trace;
use kernel_sync::SyncOnceCell;
use log::{LevelFilter, Log, Metadata, Record};

static LOGGER: SyncOnceCell<QemuLogger> = SyncOnceCell::new();

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoggerError {
    #[error("the QEMU logger was already initialized")]
    AlreadyInitialized,
    #[error("a different logger is already installed")]
    OtherLoggerInstalled,
}

#[derive(Debug)]
pub struct QemuLogger {
    max_level: LevelFilter,
}

impl QemuLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Install as the global logger. Call this once during early init.
    ///
    /// # Errors
    /// Fails if this or another logger was installed before.
    pub fn init(self) -> Result<(), LoggerError> {
        let max_level = self.max_level;
        LOGGER
            .set(self)
            .map_err(|_| LoggerError::AlreadyInitialized)?;
        let logger = LOGGER.get().ok_or(LoggerError::AlreadyInitialized)?;
        log::set_logger(logger).map_err(|_| LoggerError::OtherLoggerInstalled)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for QemuLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // "[LEVEL] target: message"
        qemu_trace!(
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_rejected() {
        assert_eq!(QemuLogger::new(LevelFilter::Info).init(), Ok(()));
        assert_eq!(
            QemuLogger::new(LevelFilter::Trace).init(),
            Err(LoggerError::AlreadyInitialized)
        );
        assert!(log::logger().enabled(&Metadata::builder().level(log::Level::Info).build()));
        assert!(!log::logger().enabled(&Metadata::builder().level(log::Level::Debug).build()));
        log::info!("logged into the void on the host");
    }
}
