//! The stream reassembly state machine
//!
//! [`StreamReassembler`] is the protocol core: it owns all per-session state
//! and decides, for every inbound frame, whether to extend the accumulated
//! text, request a resend, or conclude the stream. It is synchronous and
//! performs no I/O; callers send whatever [`Outbound`] frame a call returns.
//!
//! The whole decision for one frame happens inside a single
//! `handle_frame` invocation against state that was updated within that same
//! invocation. There is deliberately no shared or deferred state for a
//! handler to read stale.

use tracing::{debug, trace, warn};

use crate::types::{Frame, Outbound, StreamStatus};
use crate::{LogSnapshot, TextSnapshot};

/// Resend observations of one offset tolerated before the stream is
/// declared stalled.
pub const DEFAULT_MAX_RESEND_ATTEMPTS: usize = 8;

/// Per-session protocol state, owned exclusively by the reassembler.
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    /// The next offset the stream must continue from. Starts at 0 and only
    /// advances, and only when an accepted chunk's start equals it.
    expected_offset: usize,

    /// The reconstructed stream so far. Grows by append only.
    text: String,

    /// Every expected offset a mismatch was observed against, in
    /// observation order. Distinguishes first-time from repeated mismatches.
    offset_history: Vec<usize>,

    /// Sent/received trace plus lifecycle notes, in event order.
    system_log: Vec<String>,

    /// Resend-failure diagnostics.
    error_log: Vec<String>,

    status: StreamStatus,
}

impl StreamState {
    pub fn expected_offset(&self) -> usize {
        self.expected_offset
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn offset_history(&self) -> &[usize] {
        &self.offset_history
    }

    pub fn system_log(&self) -> &[String] {
        &self.system_log
    }

    pub fn error_log(&self) -> &[String] {
        &self.error_log
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    /// How often `offset` has mismatched so far.
    fn mismatch_count(&self, offset: usize) -> usize {
        self.offset_history.iter().filter(|&&seen| seen == offset).count()
    }
}

/// The protocol core.
///
/// One instance per channel. `start` opens a fresh session; `handle_frame`
/// is the single entry point for inbound data, invoked once per frame in
/// arrival order.
#[derive(Debug)]
pub struct StreamReassembler {
    state: StreamState,
    max_resend_attempts: usize,
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self { state: StreamState::default(), max_resend_attempts: DEFAULT_MAX_RESEND_ATTEMPTS }
    }

    /// Override the resend bound. `0` is treated as unbounded.
    pub fn with_max_resend_attempts(mut self, attempts: usize) -> Self {
        self.max_resend_attempts = attempts;
        self
    }

    /// Begin a new stream: discard all prior state and emit the prompt.
    ///
    /// Always produces a clean session regardless of what the previous one
    /// looked like.
    pub fn start(&mut self, prompt: &str) -> Outbound {
        self.state = StreamState { status: StreamStatus::Streaming, ..StreamState::default() };
        debug!("stream started");
        self.emit(Outbound::Prompt { text: prompt.to_string() })
    }

    /// Process one inbound frame, returning the outbound frame to send, if
    /// any.
    ///
    /// Never fails: malformed input degrades to the plain-text fallback and
    /// offset mismatches are answered with a resend request. The only
    /// advancing path is a chunk whose start equals the expected offset.
    pub fn handle_frame(&mut self, raw: &str) -> Option<Outbound> {
        self.state.system_log.push(format!("Received: {raw}"));

        match Frame::parse(raw) {
            Frame::Done { offset } => {
                if offset != self.state.expected_offset {
                    // The sender believes it is finished but we have a gap.
                    debug!(
                        done = offset,
                        expected = self.state.expected_offset,
                        "done marker disagrees with expected offset"
                    );
                    self.request_resend()
                } else {
                    trace!(offset, "stream fully received, requesting close");
                    self.state.status = StreamStatus::CloseRequested;
                    Some(self.emit(Outbound::CloseRequest))
                }
            }
            Frame::Chunk { start, end, content } => {
                if start == self.state.expected_offset {
                    self.accept_chunk(end, &content);
                    None
                } else {
                    self.reject_chunk(start)
                }
            }
            Frame::CloseAccepted => {
                trace!("remote confirmed stream termination");
                self.state.status = StreamStatus::Closed;
                self.state.system_log.push("Stream closed by remote".to_string());
                None
            }
            Frame::Plain { text } => {
                // Legacy path for non-conforming senders: strip an optional
                // leading tag, append the rest, never touch the offset.
                let payload = match text.split_once(':') {
                    Some((_tag, payload)) => payload,
                    None => text.as_str(),
                };
                self.state.text.push_str(payload);
                None
            }
        }
    }

    /// The only path that advances the stream.
    fn accept_chunk(&mut self, end: usize, content: &str) {
        trace!(from = self.state.expected_offset, to = end, "chunk accepted");
        self.state.text.push_str(content);
        // A chunk claiming end < start must never rewind the stream.
        self.state.expected_offset = end.max(self.state.expected_offset);
        if self.state.status == StreamStatus::Stalled {
            // A late correct chunk un-stalls the stream.
            self.state
                .system_log
                .push(format!("Stream resumed at offset {}", self.state.expected_offset));
            self.state.status = StreamStatus::Streaming;
        }
    }

    /// Record a mismatched chunk and decide whether to keep asking.
    fn reject_chunk(&mut self, start: usize) -> Option<Outbound> {
        let expected = self.state.expected_offset;
        let prior = self.state.mismatch_count(expected);
        self.state.offset_history.push(expected);

        if prior == 0 {
            debug!(start, expected, "chunk out of order, resend pending");
            self.state.system_log.push(format!("Resend pending for offset {expected}"));
        } else {
            // The same offset keeps mismatching: the resend is likely stuck.
            debug!(start, expected, attempts = prior + 1, "repeated mismatch");
            self.state.error_log.push(format!("Resend {expected}"));
        }

        if self.max_resend_attempts > 0 && prior + 1 >= self.max_resend_attempts {
            warn!(expected, attempts = prior + 1, "resend bound hit, stream stalled");
            self.state
                .error_log
                .push(format!("Stalled at offset {expected} after {} resends", prior + 1));
            self.state.status = StreamStatus::Stalled;
            return None;
        }

        self.request_resend()
    }

    /// Ask the sender to resume from the expected offset, unless the stream
    /// has already been declared stalled.
    fn request_resend(&mut self) -> Option<Outbound> {
        if self.state.status == StreamStatus::Stalled {
            self.state.system_log.push(format!(
                "Resend suppressed for offset {} (stalled)",
                self.state.expected_offset
            ));
            return None;
        }
        Some(self.emit(Outbound::Resend { offset: self.state.expected_offset }))
    }

    /// Record a transport-level error reported by the channel collaborator.
    ///
    /// The core never owns reconnection; the error is only made visible in
    /// the session's system log.
    pub fn note_channel_error(&mut self, error: impl std::fmt::Display) {
        self.state.system_log.push(format!("Channel error: {error}"));
    }

    fn emit(&mut self, frame: Outbound) -> Outbound {
        self.state.system_log.push(format!("Sent: {frame}"));
        frame
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// Projection of the reconstructed stream for publication.
    pub fn snapshot(&self) -> TextSnapshot {
        TextSnapshot {
            text: self.state.text.clone(),
            expected_offset: self.state.expected_offset,
            status: self.state.status,
        }
    }

    /// Projection of the diagnostic logs for publication.
    pub fn log_snapshot(&self) -> LogSnapshot {
        LogSnapshot { system: self.state.system_log.clone(), error: self.state.error_log.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming() -> StreamReassembler {
        let mut r = StreamReassembler::new();
        r.start("prompt");
        r
    }

    #[test]
    fn in_order_chunks_accumulate() {
        let mut r = streaming();

        assert_eq!(r.handle_frame("0:5 hello"), None);
        assert_eq!(r.state().text(), "hello");
        assert_eq!(r.state().expected_offset(), 5);

        assert_eq!(r.handle_frame("5:11  world"), None);
        assert_eq!(r.state().text(), "hello world");
        assert_eq!(r.state().expected_offset(), 11);
    }

    #[test]
    fn mismatched_chunk_leaves_state_untouched_and_requests_resend() {
        let mut r = streaming();
        r.handle_frame("0:5 hello");

        let out = r.handle_frame("3:8 xyz");
        assert_eq!(out, Some(Outbound::Resend { offset: 5 }));
        assert_eq!(r.state().text(), "hello");
        assert_eq!(r.state().expected_offset(), 5);
        assert_eq!(r.state().offset_history(), &[5]);
    }

    #[test]
    fn repeated_mismatch_is_classified_on_second_occurrence() {
        let mut r = streaming();
        r.handle_frame("0:5 hello");

        r.handle_frame("3:8 xyz");
        assert!(r.state().error_log().is_empty(), "first mismatch is only pending");
        assert!(r.state().system_log().iter().any(|line| line == "Resend pending for offset 5"));

        r.handle_frame("3:8 xyz");
        assert_eq!(r.state().error_log(), &["Resend 5".to_string()]);
        assert_eq!(r.state().offset_history(), &[5, 5]);
    }

    #[test]
    fn done_at_expected_offset_requests_close() {
        let mut r = streaming();
        r.handle_frame("0:5 hello");

        let out = r.handle_frame("<DONE:5>");
        assert_eq!(out, Some(Outbound::CloseRequest));
        assert_eq!(r.state().status(), StreamStatus::CloseRequested);
    }

    #[test]
    fn done_beyond_expected_offset_requests_resend() {
        let mut r = streaming();
        r.handle_frame("0:5 hello");

        let out = r.handle_frame("<DONE:11>");
        assert_eq!(out, Some(Outbound::Resend { offset: 5 }));
        assert_eq!(r.state().status(), StreamStatus::Streaming);
        // Done mismatches are not recorded as chunk mismatches.
        assert!(r.state().offset_history().is_empty());
    }

    #[test]
    fn full_out_of_order_scenario_recovers() {
        let mut r = streaming();

        assert_eq!(r.handle_frame("0:5 hello"), None);
        assert_eq!(r.handle_frame("3:8 xyz"), Some(Outbound::Resend { offset: 5 }));
        assert_eq!(r.state().text(), "hello");
        assert_eq!(r.state().expected_offset(), 5);

        assert_eq!(r.handle_frame("5:11  world"), None);
        assert_eq!(r.state().text(), "hello world");
        assert_eq!(r.state().expected_offset(), 11);

        assert_eq!(r.handle_frame("<DONE:11>"), Some(Outbound::CloseRequest));
        assert_eq!(r.handle_frame("<CLOSE_ACC>"), None);
        assert_eq!(r.state().status(), StreamStatus::Closed);
    }

    #[test]
    fn legacy_tagged_text_appends_payload_only() {
        let mut r = streaming();

        assert_eq!(r.handle_frame("notes:hi there"), None);
        assert_eq!(r.state().text(), "hi there");
        assert_eq!(r.state().expected_offset(), 0);
    }

    #[test]
    fn legacy_untagged_text_appends_verbatim() {
        let mut r = streaming();

        assert_eq!(r.handle_frame("raw payload"), None);
        assert_eq!(r.state().text(), "raw payload");
        assert_eq!(r.state().expected_offset(), 0);
    }

    #[test]
    fn start_always_resets() {
        let mut r = streaming();
        r.handle_frame("0:5 hello");
        r.handle_frame("3:8 xyz");

        let out = r.start("again");
        assert_eq!(out, Outbound::Prompt { text: "again".into() });
        assert_eq!(r.state().text(), "");
        assert_eq!(r.state().expected_offset(), 0);
        assert!(r.state().offset_history().is_empty());
        assert!(r.state().error_log().is_empty());
        assert_eq!(r.state().status(), StreamStatus::Streaming);
        assert_eq!(r.state().system_log(), &["Sent: again".to_string()]);
    }

    #[test]
    fn resend_bound_stalls_the_stream() {
        let mut r = StreamReassembler::new().with_max_resend_attempts(3);
        r.start("prompt");
        r.handle_frame("0:5 hello");

        assert!(r.handle_frame("9:12 abc").is_some());
        assert!(r.handle_frame("9:12 abc").is_some());
        // Third observation of the same expected offset hits the bound.
        assert_eq!(r.handle_frame("9:12 abc"), None);
        assert_eq!(r.state().status(), StreamStatus::Stalled);

        // Once stalled, neither chunk nor done mismatches emit resends.
        assert_eq!(r.handle_frame("9:12 abc"), None);
        assert_eq!(r.handle_frame("<DONE:12>"), None);
    }

    #[test]
    fn late_correct_chunk_unstalls() {
        let mut r = StreamReassembler::new().with_max_resend_attempts(2);
        r.start("prompt");
        r.handle_frame("0:5 hello");
        r.handle_frame("9:12 abc");
        r.handle_frame("9:12 abc");
        assert_eq!(r.state().status(), StreamStatus::Stalled);

        assert_eq!(r.handle_frame("5:8 abc"), None);
        assert_eq!(r.state().status(), StreamStatus::Streaming);
        assert_eq!(r.state().text(), "helloabc");
        assert_eq!(r.state().expected_offset(), 8);
    }

    #[test]
    fn every_frame_is_traced_in_the_system_log() {
        let mut r = streaming();
        r.handle_frame("0:5 hello");
        r.handle_frame("<DONE:5>");

        assert_eq!(
            r.state().system_log(),
            &[
                "Sent: prompt".to_string(),
                "Received: 0:5 hello".to_string(),
                "Received: <DONE:5>".to_string(),
                "Sent: <CLOSE_REQ>".to_string(),
            ]
        );
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn expected_offset_never_decreases(frames in prop::collection::vec(".*", 0..40)) {
                let mut r = StreamReassembler::new();
                r.start("prompt");
                let mut last = 0;
                for raw in &frames {
                    r.handle_frame(raw);
                    let offset = r.state().expected_offset();
                    prop_assert!(offset >= last, "offset went backwards: {last} -> {offset}");
                    last = offset;
                }
            }

            #[test]
            fn contiguous_chunks_reconstruct_the_source(
                pieces in prop::collection::vec("[a-zA-Z ]{1,12}", 1..20)
            ) {
                let mut r = StreamReassembler::new();
                r.start("prompt");

                let mut offset = 0;
                let mut expected = String::new();
                for piece in &pieces {
                    let end = offset + piece.chars().count();
                    prop_assert_eq!(r.handle_frame(&format!("{offset}:{end} {piece}")), None);
                    expected.push_str(piece);
                    offset = end;
                }

                prop_assert_eq!(r.state().text(), expected.as_str());
                prop_assert_eq!(r.state().expected_offset(), offset);
                prop_assert_eq!(
                    r.handle_frame(&format!("<DONE:{offset}>")),
                    Some(Outbound::CloseRequest)
                );
            }
        }
    }
}
