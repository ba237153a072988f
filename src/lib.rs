//! Client-side reassembly of ordered text streams.
//!
//! Restitch reconstructs a single text stream that a remote sender delivers
//! as indexed, possibly out-of-order or duplicated chunks over a
//! bidirectional message channel, negotiating completion and signaling
//! resends along the way.
//!
//! # Features
//!
//! - **Total frame parsing**: malformed input degrades to a plain-text
//!   fallback, never an error
//! - **Gap and duplicate detection**: out-of-order chunks trigger
//!   `<INDEX:{offset}>` resend requests anchored at the last confirmed
//!   offset
//! - **Completion negotiation**: `<DONE:{offset}>` / `<CLOSE_REQ>` /
//!   `<CLOSE_ACC>` handshake
//! - **Transport-agnostic**: any `Channel` implementation supplies frames;
//!   the crate ships a scripted one for tests and offline work
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use restitch::{ScriptedChannel, Session};
//!
//! #[tokio::main]
//! async fn main() -> restitch::Result<()> {
//!     let channel =
//!         ScriptedChannel::new(["0:5 hello", "5:11  world", "<DONE:11>", "<CLOSE_ACC>"])
//!             .hold_until_send();
//!
//!     let session = Session::attach(channel);
//!     session.start("Write me a thread about business strategies.").await?;
//!
//!     let mut updates = session.text_updates();
//!     while let Some(snapshot) = updates.next().await {
//!         println!("{} (next offset {})", snapshot.text, snapshot.expected_offset);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The protocol core, [`StreamReassembler`], is synchronous and I/O-free;
//! it can be driven directly when no async runtime is wanted.

// Core types and error handling
mod error;
mod reassembler;
pub mod types;

// Session architecture
pub mod channel;
pub mod channels;
pub mod driver;
mod session;

// Core exports
pub use error::*;
pub use reassembler::{DEFAULT_MAX_RESEND_ATTEMPTS, StreamReassembler, StreamState};
pub use types::*;

// Session exports
pub use channel::Channel;
pub use channels::ScriptedChannel;
pub use driver::{Command, Driver, DriverChannels};
pub use session::Session;
