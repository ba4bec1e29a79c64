//! Flow errors. Each one ends the current step; none of them ends the orchestrator.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("permissions denied")]
    PermissionDenied,
    #[error("Wi-Fi Aware is not available")]
    ServiceUnavailable,
    #[error("Wi-Fi Aware session not available")]
    NoSession,
    #[error("failed to attach to Wi-Fi Aware session")]
    AttachFailed,
    #[error("session terminated")]
    SessionTerminated,
    #[error("Wi-Fi RTT is not available")]
    RangingUnavailable,
    #[error("RTT ranging failed: {0}")]
    RangingRequestFailed(i32),
    #[error("no peer to range")]
    NoPeer,
}

impl FlowError {
    /// Whether this error ends the periodic ranging loop.
    /// A request-level ranging failure is retried on the next tick.
    pub fn stops_ranging(&self) -> bool {
        matches!(
            self,
            FlowError::PermissionDenied
                | FlowError::RangingUnavailable
                | FlowError::NoPeer
                | FlowError::SessionTerminated
        )
    }

    /// Errors raised by a ranging attempt, shown on the ranging result line.
    pub fn is_ranging(&self) -> bool {
        matches!(
            self,
            FlowError::RangingUnavailable | FlowError::RangingRequestFailed(_) | FlowError::NoPeer
        )
    }
}
