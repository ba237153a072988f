//! Read-only projections published to the embedding application

use serde::{Deserialize, Serialize};

/// Where the stream currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamStatus {
    /// No stream has been started this session.
    #[default]
    Idle,

    /// A prompt has been sent and chunks are being accepted.
    Streaming,

    /// The done marker matched; `<CLOSE_REQ>` has been sent.
    CloseRequested,

    /// The remote confirmed termination with `<CLOSE_ACC>`.
    Closed,

    /// The resend bound was hit; the stream will not advance on its own.
    Stalled,
}

impl StreamStatus {
    /// Whether a new `start()` makes sense from this state.
    ///
    /// Channel readiness itself belongs to the transport collaborator; this
    /// only reflects protocol progress.
    pub fn accepts_start(self) -> bool {
        !matches!(self, StreamStatus::Streaming)
    }
}

/// Snapshot of the reconstructed stream, published after every state change.
#[derive(Debug, Clone, Serialize)]
pub struct TextSnapshot {
    /// The reconstructed text so far.
    pub text: String,

    /// The next offset the stream must continue from.
    pub expected_offset: usize,

    /// Protocol progress.
    pub status: StreamStatus,
}

/// Snapshot of the session's diagnostic logs.
///
/// The system log traces every sent and received frame; the error log holds
/// resend-failure diagnostics. Both render directly in a UI, which is why
/// they are part of the data model rather than `tracing` output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogSnapshot {
    pub system: Vec<String>,
    pub error: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_an_active_stream_rejects_start() {
        assert!(StreamStatus::Idle.accepts_start());
        assert!(StreamStatus::Closed.accepts_start());
        assert!(StreamStatus::Stalled.accepts_start());
        assert!(StreamStatus::CloseRequested.accepts_start());
        assert!(!StreamStatus::Streaming.accepts_start());
    }
}
