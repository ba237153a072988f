//! Channel trait for the transport collaborator

use crate::Result;

/// Trait for the bidirectional message channel the stream arrives on.
///
/// Channels abstract over the actual transport (a websocket, a pipe, a
/// scripted replay) and own its lifecycle entirely: connecting,
/// reconnecting, authentication and stall detection all happen behind this
/// trait. The reassembly core only consumes frames in arrival order and
/// hands back frames to send.
#[async_trait::async_trait]
pub trait Channel: Send + 'static {
    /// Receive the next inbound raw text frame.
    ///
    /// Returns:
    /// - `Ok(Some(raw))` - Next frame, in arrival order, delivered exactly once
    /// - `Ok(None)` - Transport closed (normal termination)
    /// - `Err(e)` - Transport-level error; the driver logs it and retries
    ///
    /// # Cancel safety
    ///
    /// The driver polls `recv` inside a `tokio::select!` alongside its
    /// control commands, so an in-flight `recv` future may be dropped at
    /// any await point and called again. Implementations must not dequeue
    /// a frame before their last await; a frame taken out of the transport
    /// by a future that is then dropped is lost for good.
    async fn recv(&mut self) -> Result<Option<String>>;

    /// Enqueue one outbound text frame for delivery.
    ///
    /// No delivery guarantee is assumed; the protocol recovers from loss
    /// through its own resend requests.
    async fn send(&mut self, frame: String) -> Result<()>;
}
