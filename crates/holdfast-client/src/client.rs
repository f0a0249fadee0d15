use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::session::{Command, SessionDriver, SessionEvent};
use crate::transport::{ReqwestTransport, Transport};

enum Lifecycle {
    Idle,
    Running { commands: mpsc::UnboundedSender<Command> },
    Ended,
}

/// Handle to one long-polling session. Construct with [`LongPollClient::new`],
/// begin with [`start`](LongPollClient::start), and tear down with
/// [`end`](LongPollClient::end).
///
/// Each client owns at most one session over its lifetime: `start` may be
/// called once, and once `end` has run the client is permanently finished.
/// A terminated session never comes back.
pub struct LongPollClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    lifecycle: Mutex<Lifecycle>,
}

impl LongPollClient {
    pub fn new(config: ClientConfig) -> Result<Self, SessionError> {
        let transport = Arc::new(ReqwestTransport::new(config.response_timeout())?);
        Ok(Self::with_transport(config, transport))
    }

    pub(crate) fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Begins the session and returns the event stream (started / update /
    /// channel-lost). Errors if already started or already ended.
    pub fn start(&self) -> Result<mpsc::UnboundedReceiver<SessionEvent>, SessionError> {
        let mut lifecycle = self.lifecycle.lock();
        match &*lifecycle {
            Lifecycle::Running { .. } => return Err(SessionError::AlreadyStarted),
            Lifecycle::Ended => return Err(SessionError::SessionInvalid),
            Lifecycle::Idle => {}
        }
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let driver = SessionDriver::new(
            self.config.clone(),
            self.transport.clone(),
            command_rx,
            command_tx.downgrade(),
            event_tx,
        );
        tokio::spawn(driver.run());
        *lifecycle = Lifecycle::Running {
            commands: command_tx,
        };
        Ok(event_rx)
    }

    /// Terminates the session. Errors if never started; calling it again
    /// after it has run is a no-op.
    pub fn end(&self) -> Result<(), SessionError> {
        let mut lifecycle = self.lifecycle.lock();
        match &*lifecycle {
            Lifecycle::Idle => Err(SessionError::NotStarted),
            Lifecycle::Ended => Ok(()),
            Lifecycle::Running { commands } => {
                // The driver aborts pending work even if it already exited
                // and the send fails.
                let _ = commands.send(Command::Terminate);
                *lifecycle = Lifecycle::Ended;
                Ok(())
            }
        }
    }

    /// Forces recovery: aborts everything pending and recreates the session
    /// after the retry delay.
    pub fn restart(&self) -> Result<(), SessionError> {
        let lifecycle = self.lifecycle.lock();
        match &*lifecycle {
            Lifecycle::Idle => Err(SessionError::NotStarted),
            Lifecycle::Ended => Err(SessionError::SessionInvalid),
            Lifecycle::Running { commands } => {
                let _ = commands.send(Command::Restart);
                Ok(())
            }
        }
    }

    /// Sends one update outside the channel and resolves with the decoded
    /// response payload. Independent of channel state, except that it is
    /// rejected once the session has ended.
    pub async fn send_update(&self, payload: impl Into<String>) -> Result<String, SessionError> {
        let commands = {
            let lifecycle = self.lifecycle.lock();
            match &*lifecycle {
                Lifecycle::Idle => return Err(SessionError::NotStarted),
                Lifecycle::Ended => return Err(SessionError::SessionInvalid),
                Lifecycle::Running { commands } => commands.clone(),
            }
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .send(Command::SendUpdate {
                payload: payload.into(),
                reply: reply_tx,
            })
            .map_err(|_| SessionError::SessionInvalid)?;
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => {
                debug!(
                    target = "holdfast::client",
                    "driver dropped an update reply"
                );
                Err(SessionError::Aborted)
            }
        }
    }
}
