//! Scripted channel for tests and offline development

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::Result;
use crate::channel::Channel;

/// A [`Channel`] that replays a fixed inbound script and records every
/// outbound frame.
///
/// Stands in for the real transport in tests and offline development, the
/// same way a recorded session stands in for a live one. By default the
/// script plays immediately; [`hold_until_send`](Self::hold_until_send)
/// makes it wait for the first outbound frame, which models a server that
/// only starts streaming once it has received the prompt.
pub struct ScriptedChannel {
    script: VecDeque<String>,
    sent: Arc<Mutex<Vec<String>>>,
    pace: Option<Duration>,
    gate: Option<watch::Receiver<bool>>,
    gate_tx: watch::Sender<bool>,
}

impl ScriptedChannel {
    /// Create a channel that will deliver `script` in order, then report
    /// the transport as closed.
    pub fn new<I, S>(script: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (gate_tx, _) = watch::channel(false);
        Self {
            script: script.into_iter().map(Into::into).collect(),
            sent: Arc::new(Mutex::new(Vec::new())),
            pace: None,
            gate: None,
            gate_tx,
        }
    }

    /// Delay each delivered frame by `interval`.
    pub fn paced(mut self, interval: Duration) -> Self {
        self.pace = Some(interval);
        self
    }

    /// Hold the script back until the first outbound frame has been sent.
    pub fn hold_until_send(mut self) -> Self {
        self.gate = Some(self.gate_tx.subscribe());
        self
    }

    /// Handle to the outbound frame log. Clones observe later sends.
    pub fn sent(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }
}

#[async_trait::async_trait]
impl Channel for ScriptedChannel {
    // Cancel-safe: the script is only dequeued after the last await.
    async fn recv(&mut self) -> Result<Option<String>> {
        if let Some(gate) = &mut self.gate {
            // Sender lives on self, so this cannot observe a closed channel.
            let _ = gate.wait_for(|opened| *opened).await;
        }
        if let Some(pace) = self.pace {
            tokio::time::sleep(pace).await;
        }
        let frame = self.script.pop_front();
        if frame.is_none() {
            debug!("script exhausted, reporting channel closed");
        }
        Ok(frame)
    }

    async fn send(&mut self, frame: String) -> Result<()> {
        debug!(frame = %frame, "recording outbound frame");
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(frame);
        let _ = self.gate_tx.send(true);
        Ok(())
    }
}
