//! The write-once cell an operation reports its outcome through.

use crate::error::IoError;
use alloc::sync::Arc;
use kernel_sync::SyncOnceCell;
use log::error;

/// Bytes read, or why the operation failed.
pub type IoResult = Result<usize, IoError>;

/// Shared handle to an operation's outcome.
///
/// The issuer keeps one clone and the operation another; the operation
/// resolves it exactly once when it reaches a terminal state.
#[derive(Clone, Default)]
pub struct ResultSlot(Arc<SyncOnceCell<IoResult>>);

impl ResultSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The outcome, once resolved.
    #[must_use]
    pub fn get(&self) -> Option<IoResult> {
        self.0.get().copied()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.0.is_initialized()
    }

    /// Store the outcome. A second write is dropped and logged.
    pub(crate) fn resolve(&self, result: IoResult) {
        if let Err(rejected) = self.0.set(result) {
            error!("io: result slot written twice, dropped {rejected:?}");
        }
    }
}

impl core::fmt::Debug for ResultSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("ResultSlot").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_outcome() {
        let slot = ResultSlot::new();
        let issuer = slot.clone();
        assert_eq!(issuer.get(), None);
        slot.resolve(Ok(12));
        slot.resolve(Err(IoError::Cancelled));
        assert!(issuer.is_resolved());
        assert_eq!(issuer.get(), Some(Ok(12)));
    }
}
