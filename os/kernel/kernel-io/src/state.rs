/// Progress of an I/O operation.
///
/// ```text
/// NotStarted ──device idle──▶ Ready ──do_op──▶ InProgress ──bytes arrived──▶ Done
///                               │                   │
///                               └──sync/immediate──▶ Done
///          any non-terminal state ──failure/cancel──▶ Error
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IoState {
    NotStarted,
    Ready,
    InProgress,
    Done,
    Error,
}

impl IoState {
    /// `Done` and `Error` never change again.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}
