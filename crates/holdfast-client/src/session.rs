//! The session actor: owns the session id and both request queues, sequences
//! create → poll → poll → … → terminate, and drives recovery after failures.
//!
//! All mutable state lives inside [`SessionDriver`], which runs as a single
//! spawned task consuming a command channel. Transport calls run as
//! short-lived spawned tasks that report completions back over the same
//! channel, so state transitions are interleaved, never concurrent.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::protocol::{
    self, CREATE_PATH, POLL_PATH, TERMINATE_PATH, UPDATE_PATH,
};
use crate::request::{PendingRequest, RequestId, RequestKind, RequestQueues, UpdateReply};
use crate::transport::{Transport, TransportResponse};

/// Server-assigned identity of one long-polling channel.
///
/// `START` means "no session yet" and `INVALID` means "session permanently
/// ended"; every other value is an active id. `INVALID` never reverts to an
/// active id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionId(u64);

impl SessionId {
    pub const START: SessionId = SessionId(0);
    pub const INVALID: SessionId = SessionId(u64::MAX);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_active(&self) -> bool {
        *self != Self::START && *self != Self::INVALID
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::START => f.write_str("start"),
            Self::INVALID => f.write_str("invalid"),
            Self(id) => write!(f, "{id}"),
        }
    }
}

/// What the session surfaces to its owner while running.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// A create call succeeded; the channel is up and polling.
    Started { session: SessionId },
    /// A poll returned a payload (possibly empty, meaning "no new data").
    Update { payload: String },
    /// The channel failed; pending work was aborted and a recreate is
    /// scheduled after the retry delay.
    ChannelLost { error: SessionError },
}

pub(crate) enum Command {
    Restart,
    Terminate,
    SendUpdate {
        payload: String,
        reply: UpdateReply,
    },
    /// Fired by the retry timer after a channel failure.
    Retry,
    /// A transport task finished its round trip.
    Completed {
        id: RequestId,
        kind: RequestKind,
        result: Result<TransportResponse, SessionError>,
    },
}

pub(crate) struct SessionDriver {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    commands: mpsc::UnboundedReceiver<Command>,
    // Weak, so the facade's sender is the only thing keeping the command
    // channel open: dropping the client closes it and the loop below ends.
    command_tx: mpsc::WeakUnboundedSender<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
    session: SessionId,
    queues: RequestQueues,
}

impl SessionDriver {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        commands: mpsc::UnboundedReceiver<Command>,
        command_tx: mpsc::WeakUnboundedSender<Command>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            transport,
            commands,
            command_tx,
            events,
            session: SessionId::START,
            queues: RequestQueues::default(),
        }
    }

    /// Runs the channel state machine until terminate completes or the
    /// owning client is dropped.
    pub async fn run(mut self) {
        info!(
            target = "holdfast::session",
            base_url = %self.config.base_url(),
            "session starting"
        );
        self.issue_create();

        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Restart => {
                    info!(target = "holdfast::session", "restart requested");
                    self.abort_pending();
                    self.session = SessionId::START;
                    self.schedule_retry();
                }
                Command::Terminate => {
                    if self.terminate() {
                        break;
                    }
                }
                Command::SendUpdate { payload, reply } => {
                    if self.session == SessionId::INVALID {
                        let _ = reply.send(Err(SessionError::SessionInvalid));
                    } else {
                        self.issue_update(payload, reply);
                    }
                }
                Command::Retry => {
                    // A terminate may have landed while the timer ran.
                    if self.session == SessionId::INVALID {
                        continue;
                    }
                    self.issue_create();
                }
                Command::Completed { id, kind, result } => {
                    if self.complete(id, kind, result) {
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        info!(target = "holdfast::session", "session driver exiting");
    }

    /// Owner dropped or terminate finished; nothing else may stay in flight.
    /// An issued terminate call is the one request allowed to run to
    /// completion, since its outcome can no longer reach the command channel
    /// once the facade's sender is gone.
    async fn shutdown(&mut self) {
        for reply in self.queues.abort_updates() {
            let _ = reply.send(Err(SessionError::Aborted));
        }
        match self.queues.take_pending_channel() {
            Some(request) if request.kind == RequestKind::Terminate => {
                let _ = request.task.await;
            }
            Some(request) => {
                request.abort();
            }
            None => {}
        }
    }

    /// Handles terminate: aborts everything pending and, when a session is
    /// active, issues the terminate call. Returns true when the actor should
    /// exit immediately (no call was needed).
    fn terminate(&mut self) -> bool {
        for reply in self.queues.abort_updates() {
            let _ = reply.send(Err(SessionError::Aborted));
        }
        if !self.session.is_active() {
            debug!(
                target = "holdfast::session",
                session = %self.session,
                "terminate without an active session is a no-op"
            );
            self.queues.abort_channel();
            return true;
        }
        let old = self.session;
        self.session = SessionId::INVALID;
        info!(target = "holdfast::session", session = %old, "terminating session");
        // add_channel evicts an in-flight poll, so its response cannot race
        // the teardown.
        self.issue_channel(RequestKind::Terminate, TERMINATE_PATH, protocol::encode_session(old));
        false
    }

    /// Routes one transport completion. Returns true when the actor should
    /// exit (terminate round trip finished).
    fn complete(
        &mut self,
        id: RequestId,
        kind: RequestKind,
        result: Result<TransportResponse, SessionError>,
    ) -> bool {
        let request = match kind {
            RequestKind::Update => self.queues.take_update(id),
            _ => self.queues.take_channel(id),
        };
        let Some(request) = request else {
            // Superseded: the request was evicted or aborted before its
            // completion arrived.
            debug!(
                target = "holdfast::session",
                request = %id,
                ?kind,
                "dropping completion for a request no longer pending"
            );
            return false;
        };

        if kind == RequestKind::Terminate {
            // Outcome already logged by the transport task; the teardown
            // round trip is done, so the actor can exit.
            return true;
        }

        // A late response must never resurrect a terminated session.
        if self.session == SessionId::INVALID {
            warn!(
                target = "holdfast::session",
                request = %id,
                ?kind,
                "completion arrived for a terminated session"
            );
            if let Some(reply) = request.reply {
                let _ = reply.send(Err(SessionError::StaleSession));
            }
            return false;
        }

        match kind {
            RequestKind::Create => match flatten(result).and_then(|response| {
                protocol::parse_session_id(&response.body)
            }) {
                Ok(session) => {
                    self.session = session;
                    info!(target = "holdfast::session", %session, "session created");
                    self.emit(SessionEvent::Started { session });
                    self.issue_poll();
                }
                Err(error) => self.fail_channel(error),
            },
            RequestKind::Poll => match flatten(result)
                .and_then(|response| protocol::decode_poll_payload(&response.body))
            {
                Ok(payload) => {
                    debug!(
                        target = "holdfast::session",
                        bytes = payload.len(),
                        "poll returned"
                    );
                    self.emit(SessionEvent::Update { payload });
                    self.issue_poll();
                }
                Err(error) => self.fail_channel(error),
            },
            RequestKind::Update => {
                let reply = request.reply;
                match flatten(result) {
                    Ok(response) => {
                        let payload = protocol::decode_payload(&response.body).to_string();
                        if let Some(reply) = reply {
                            let _ = reply.send(Ok(payload));
                        }
                    }
                    Err(error) => {
                        // The caller hears about its own failed write before
                        // the generic recovery runs.
                        if let Some(reply) = reply {
                            let _ = reply.send(Err(error.clone()));
                        }
                        self.fail_channel(error);
                    }
                }
            }
            RequestKind::Terminate => unreachable!("handled above"),
        }
        false
    }

    /// The uniform failure path: abort everything pending, reset the session
    /// id, surface the loss, and schedule a recreate.
    fn fail_channel(&mut self, error: SessionError) {
        warn!(target = "holdfast::session", %error, "channel failed; scheduling recreate");
        self.abort_pending();
        self.session = SessionId::START;
        self.emit(SessionEvent::ChannelLost { error });
        self.schedule_retry();
    }

    fn abort_pending(&mut self) {
        self.queues.abort_channel();
        for reply in self.queues.abort_updates() {
            let _ = reply.send(Err(SessionError::Aborted));
        }
    }

    fn schedule_retry(&self) {
        let tx = self.command_tx.clone();
        let delay = self.config.retry_delay();
        tokio::spawn(async move {
            sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Retry);
            }
        });
    }

    fn issue_create(&mut self) {
        self.issue_channel(RequestKind::Create, CREATE_PATH, String::new());
    }

    fn issue_poll(&mut self) {
        self.issue_channel(
            RequestKind::Poll,
            POLL_PATH,
            protocol::encode_session(self.session),
        );
    }

    fn issue_channel(&mut self, kind: RequestKind, path: &str, body: String) {
        match self.spawn_call(kind, path, body) {
            Ok(request) => self.queues.add_channel(request),
            Err(error) => self.fail_channel(error),
        }
    }

    fn issue_update(&mut self, payload: String, reply: UpdateReply) {
        let body = protocol::encode_update(self.session, &payload);
        match self.spawn_call(RequestKind::Update, UPDATE_PATH, body) {
            Ok(mut request) => {
                request.reply = Some(reply);
                self.queues.add_update(request);
            }
            Err(error) => {
                let _ = reply.send(Err(error.clone()));
                self.fail_channel(error);
            }
        }
    }

    /// Spawns the transport round trip for one request. The task reports
    /// back over the command channel; aborting the task is how a request is
    /// cancelled.
    fn spawn_call(
        &self,
        kind: RequestKind,
        path: &str,
        body: String,
    ) -> Result<PendingRequest, SessionError> {
        let url = self
            .config
            .base_url()
            .join(path)
            .map_err(|err| SessionError::Dispatch(format!("cannot build endpoint url: {err}")))?;
        let id = RequestId::next();
        debug!(
            target = "holdfast::session",
            request = %id,
            ?kind,
            %url,
            "issuing request"
        );
        let transport = self.transport.clone();
        let tx = self.command_tx.clone();
        let task = tokio::spawn(async move {
            let result = transport.post(url, body).await;
            if kind == RequestKind::Terminate {
                // The host is shutting down; recovery would be meaningless,
                // so a failed terminate is logged only. Logging happens here
                // because the command channel may already be closed.
                match &result {
                    Ok(response) if response.is_success() => {
                        info!(target = "holdfast::session", "session terminated");
                    }
                    Ok(response) => {
                        warn!(
                            target = "holdfast::session",
                            status = %response.status,
                            "terminate call failed"
                        );
                    }
                    Err(error) => {
                        warn!(target = "holdfast::session", %error, "terminate call failed");
                    }
                }
            }
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Completed { id, kind, result });
            }
        });
        Ok(PendingRequest {
            id,
            kind,
            task,
            reply: None,
        })
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

/// Collapses "the call failed" and "the call returned a non-success status"
/// into the error side.
fn flatten(result: Result<TransportResponse, SessionError>) -> Result<TransportResponse, SessionError> {
    let response = result?;
    if response.is_success() {
        Ok(response)
    } else {
        Err(SessionError::HttpStatus(response.status))
    }
}
