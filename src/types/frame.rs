//! Protocol frame types and their text wire encoding
//!
//! Every message exchanged over the channel is plain text. Inbound text is
//! classified into a [`Frame`] with a fixed precedence: done marker, then
//! indexed chunk, then the close-accepted literal, then the plain-text
//! fallback. Classification is total; malformed input degrades to
//! [`Frame::Plain`] rather than failing.

use std::fmt;

/// Literal sent by the remote side to confirm stream termination.
pub const CLOSE_ACCEPTED: &str = "<CLOSE_ACC>";

/// Literal sent by this side to request stream termination.
pub const CLOSE_REQUEST: &str = "<CLOSE_REQ>";

/// One inbound protocol message.
///
/// This is the fundamental unit that flows through the reassembler. All
/// stream state transitions are driven by matching on this enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A slice of the stream covering offsets `[start, end)`.
    Chunk { start: usize, end: usize, content: String },

    /// Sender's claim that nothing follows beyond `offset`.
    Done { offset: usize },

    /// Remote confirmation that the stream is terminated.
    CloseAccepted,

    /// Legacy or unrecognized payload with no offset metadata.
    Plain { text: String },
}

impl Frame {
    /// Classify a raw inbound message.
    ///
    /// Precedence is fixed: `Done` before `Chunk` before the
    /// [`CLOSE_ACCEPTED`] literal before `Plain`. Never fails.
    pub fn parse(raw: &str) -> Frame {
        if let Some(offset) = parse_done(raw) {
            return Frame::Done { offset };
        }
        if let Some(frame) = parse_chunk(raw) {
            return frame;
        }
        if raw == CLOSE_ACCEPTED {
            return Frame::CloseAccepted;
        }
        Frame::Plain { text: raw.to_string() }
    }
}

/// Match the exact pattern `<DONE:{digits}>`, nothing more.
fn parse_done(raw: &str) -> Option<usize> {
    let digits = raw.strip_prefix("<DONE:")?.strip_suffix('>')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Match `{start}:{end} {content}`.
///
/// The segment before the first `:` is the start offset; the remainder
/// splits on the first space into the end offset and the content (which may
/// itself contain `:` and spaces). If either offset is not an integer the
/// message is not a chunk.
fn parse_chunk(raw: &str) -> Option<Frame> {
    let (start_str, rest) = raw.split_once(':')?;
    let start = start_str.parse().ok()?;
    let (end_str, content) = match rest.split_once(' ') {
        Some((end_str, content)) => (end_str, content),
        None => (rest, ""),
    };
    let end = end_str.parse().ok()?;
    Some(Frame::Chunk { start, end, content: content.to_string() })
}

/// One outbound protocol message.
///
/// `Display` produces the wire encoding, so sending is always
/// `channel.send(outbound.to_string())`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Ask the sender to resume transmission from `offset`.
    Resend { offset: usize },

    /// Signal that the stream is fully received and may be closed.
    CloseRequest,

    /// The user's initial prompt, sent verbatim once per session.
    Prompt { text: String },
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outbound::Resend { offset } => write!(f, "<INDEX:{offset}>"),
            Outbound::CloseRequest => f.write_str(CLOSE_REQUEST),
            Outbound::Prompt { text } => f.write_str(text),
        }
    }
}
