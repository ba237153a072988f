//! Core protocol and projection types

mod frame;
mod snapshot;

pub use frame::{CLOSE_ACCEPTED, CLOSE_REQUEST, Frame, Outbound};
pub use snapshot::{LogSnapshot, StreamStatus, TextSnapshot};
