//! Presentation-agnostic status output.

/// Which display line an update is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusLine {
    Status,
    PeerInfo,
    RangingResult,
}

/// Receives human-readable status text. An empty string clears the line.
pub trait StatusSink: Send + Sync {
    fn report(&self, line: StatusLine, text: &str);
}
