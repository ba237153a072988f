//! Driver spawns and manages the session task

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::channel::Channel;
use crate::reassembler::StreamReassembler;
use crate::types::{LogSnapshot, TextSnapshot};

/// Control messages from the session handle to the session task.
#[derive(Debug)]
pub enum Command {
    /// Reset the stream state and send the prompt.
    Start { prompt: String },
}

/// Result of spawning the session task
pub struct DriverChannels {
    /// Receiver for reconstructed-text snapshots
    pub text: watch::Receiver<Option<Arc<TextSnapshot>>>,
    /// Receiver for diagnostic log snapshots
    pub logs: watch::Receiver<Arc<LogSnapshot>>,
    /// Sender for control commands
    pub commands: mpsc::Sender<Command>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
}

/// Driver spawns the single task that owns the channel and the reassembler.
///
/// The task is the one logical thread of control for all protocol state:
/// it pulls inbound frames in arrival order, runs each through the
/// reassembler, sends whatever the reassembler asks for, and publishes
/// immutable snapshots over watch channels. Nothing else ever touches the
/// stream state, so no locking exists anywhere in the crate.
pub struct Driver;

impl Driver {
    /// Spawn the session task for the given channel.
    ///
    /// Returns watch receivers for text and logs, the command sender, and a
    /// cancellation token for graceful shutdown.
    pub fn spawn<C>(channel: C) -> DriverChannels
    where
        C: Channel,
    {
        let (text_tx, text_rx) = watch::channel(None);
        let (log_tx, log_rx) = watch::channel(Arc::new(LogSnapshot::default()));
        let (command_tx, command_rx) = mpsc::channel(8);

        let cancel = CancellationToken::new();
        let cancel_task = cancel.clone();

        tokio::spawn(async move {
            Self::session_task(channel, command_rx, text_tx, log_tx, cancel_task).await;
        });

        DriverChannels { text: text_rx, logs: log_rx, commands: command_tx, cancel }
    }

    /// Session task - feeds inbound frames through the reassembler and
    /// sends its outbound frames.
    async fn session_task<C>(
        mut channel: C,
        mut commands: mpsc::Receiver<Command>,
        text_tx: watch::Sender<Option<Arc<TextSnapshot>>>,
        log_tx: watch::Sender<Arc<LogSnapshot>>,
        cancel: CancellationToken,
    ) where
        C: Channel,
    {
        info!("Session task started");
        let mut reassembler = StreamReassembler::new();
        let mut frame_count = 0u64;
        let mut error_count = 0u32;
        const MAX_ERRORS: u32 = 10;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Session task cancelled");
                    break;
                }
                command = commands.recv() => {
                    let Some(Command::Start { prompt }) = command else {
                        debug!("Command sender dropped, shutting down");
                        break;
                    };
                    let outbound = reassembler.start(&prompt);
                    if let Err(e) = channel.send(outbound.to_string()).await {
                        warn!("Failed to send prompt: {e}");
                        reassembler.note_channel_error(&e);
                    }
                    if !Self::publish(&reassembler, &text_tx, &log_tx) {
                        break;
                    }
                }
                inbound = channel.recv() => match inbound {
                    Ok(Some(raw)) => {
                        frame_count += 1;
                        error_count = 0; // Reset error count on success
                        trace!(frame = frame_count, raw = %raw, "Inbound frame");

                        if let Some(outbound) = reassembler.handle_frame(&raw) {
                            if let Err(e) = channel.send(outbound.to_string()).await {
                                warn!("Failed to send {outbound}: {e}");
                                reassembler.note_channel_error(&e);
                            }
                        }
                        if !Self::publish(&reassembler, &text_tx, &log_tx) {
                            debug!("Snapshot receiver dropped, shutting down");
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Channel closed after {frame_count} frames");
                        Self::publish(&reassembler, &text_tx, &log_tx);
                        break;
                    }
                    Err(e) => {
                        // Channel error - don't crash on transient failures
                        error_count += 1;
                        error!("Channel error ({error_count}/{MAX_ERRORS}): {e}");
                        reassembler.note_channel_error(&e);
                        Self::publish(&reassembler, &text_tx, &log_tx);

                        if error_count >= MAX_ERRORS {
                            error!("Too many channel errors, shutting down");
                            break;
                        }

                        // Exponential backoff: 100ms, 200ms, 400ms, ...
                        let backoff =
                            std::time::Duration::from_millis(50 * (1 << error_count.min(5)));
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        info!("Session task ended (processed {frame_count} frames)");
    }

    /// Publish current snapshots. Returns false when the text receiver is
    /// gone and the task should shut down.
    fn publish(
        reassembler: &StreamReassembler,
        text_tx: &watch::Sender<Option<Arc<TextSnapshot>>>,
        log_tx: &watch::Sender<Arc<LogSnapshot>>,
    ) -> bool {
        let _ = log_tx.send(Arc::new(reassembler.log_snapshot()));
        text_tx.send(Some(Arc::new(reassembler.snapshot()))).is_ok()
    }
}
