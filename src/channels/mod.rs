//! Bundled [`Channel`](crate::channel::Channel) implementations

pub mod scripted;

pub use scripted::ScriptedChannel;
