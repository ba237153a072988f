//! Session handle over a running stream

use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::driver::{Command, Driver};
use crate::types::{LogSnapshot, StreamStatus, TextSnapshot};
use crate::{ProtocolError, Result};

/// Handle to one reassembly session over a channel.
///
/// Attaching spawns the session task; dropping the handle cancels it. All
/// accessors are read-only projections of the task's state. Readiness of
/// the underlying transport stays with the channel collaborator.
///
/// ```rust,no_run
/// use futures::StreamExt;
/// use restitch::{ScriptedChannel, Session};
///
/// #[tokio::main]
/// async fn main() -> restitch::Result<()> {
///     let channel =
///         ScriptedChannel::new(["0:5 hello", "<DONE:5>", "<CLOSE_ACC>"]).hold_until_send();
///     let session = Session::attach(channel);
///     session.start("Write me a thread about business strategies.").await?;
///
///     let mut updates = session.text_updates();
///     while let Some(snapshot) = updates.next().await {
///         println!("{}", snapshot.text);
///     }
///     Ok(())
/// }
/// ```
pub struct Session {
    /// Text snapshot watch receiver
    text: watch::Receiver<Option<Arc<TextSnapshot>>>,

    /// Log snapshot watch receiver
    logs: watch::Receiver<Arc<LogSnapshot>>,

    /// Command path into the session task
    commands: mpsc::Sender<Command>,

    /// Cancellation token for stopping the task
    cancel: CancellationToken,
}

impl Session {
    /// Attach to a channel and spawn the session task.
    pub fn attach<C>(channel: C) -> Self
    where
        C: Channel,
    {
        info!("Attaching session");
        let channels = Driver::spawn(channel);
        Self {
            text: channels.text,
            logs: channels.logs,
            commands: channels.commands,
            cancel: channels.cancel,
        }
    }

    /// Begin a new stream: reset all state and send `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::SessionClosed`] when the session task has
    /// already shut down.
    pub async fn start(&self, prompt: impl Into<String>) -> Result<()> {
        self.commands
            .send(Command::Start { prompt: prompt.into() })
            .await
            .map_err(|_| ProtocolError::SessionClosed)
    }

    /// Subscribe to reconstructed-text snapshots.
    ///
    /// Latest-value semantics: a slow consumer observes the most recent
    /// snapshot, not every intermediate one.
    pub fn text_updates(&self) -> BoxStream<'static, Arc<TextSnapshot>> {
        WatchStream::new(self.text.clone()).filter_map(|opt| async move { opt }).boxed()
    }

    /// Subscribe to diagnostic log snapshots.
    pub fn log_updates(&self) -> BoxStream<'static, Arc<LogSnapshot>> {
        WatchStream::new(self.logs.clone()).boxed()
    }

    /// The reconstructed text so far.
    pub fn current_text(&self) -> String {
        self.text.borrow().as_ref().map(|snapshot| snapshot.text.clone()).unwrap_or_default()
    }

    /// Current protocol progress.
    pub fn status(&self) -> StreamStatus {
        self.text.borrow().as_ref().map(|snapshot| snapshot.status).unwrap_or_default()
    }

    /// The sent/received trace and lifecycle notes.
    pub fn system_log(&self) -> Vec<String> {
        self.logs.borrow().system.clone()
    }

    /// Resend-failure diagnostics.
    pub fn error_log(&self) -> Vec<String> {
        self.logs.borrow().error.clone()
    }

    /// Wait until the remote side confirms stream termination.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Timeout`] when `timeout` elapses first, or
    /// [`ProtocolError::SessionClosed`] when the session task ends without
    /// the stream reaching [`StreamStatus::Closed`].
    pub async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        let mut text = self.text.clone();
        let closed = text.wait_for(|snapshot| {
            matches!(snapshot, Some(s) if s.status == StreamStatus::Closed)
        });

        match tokio::time::timeout(timeout, closed).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(ProtocolError::SessionClosed),
            Err(_) => Err(ProtocolError::Timeout { duration: timeout }),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!("Dropping session");
        // Cancel the task on drop for clean shutdown
        self.cancel.cancel();
    }
}
