use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::SessionError;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-lifetime unique identity of one transport call. Completions are
/// correlated back to their request by this id, never by object identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Create,
    Poll,
    Terminate,
    Update,
}

pub(crate) type UpdateReply = oneshot::Sender<Result<String, SessionError>>;

/// One in-flight transport call. Dropping the handle detaches the task, so
/// cancellation is always an explicit `abort`.
pub(crate) struct PendingRequest {
    pub id: RequestId,
    pub kind: RequestKind,
    pub task: JoinHandle<()>,
    pub reply: Option<UpdateReply>,
}

impl PendingRequest {
    pub fn abort(mut self) -> Option<UpdateReply> {
        self.task.abort();
        self.reply.take()
    }
}

/// The two in-flight collections: channel calls (create/poll/terminate) are
/// mutually exclusive, updates are FIFO and unbounded.
#[derive(Default)]
pub(crate) struct RequestQueues {
    channel: Option<PendingRequest>,
    updates: VecDeque<PendingRequest>,
}

impl RequestQueues {
    /// Stores a channel request, first aborting and evicting any existing
    /// one. Uniform for create, poll, and terminate: issuing terminate must
    /// cancel an in-flight poll so its response cannot race a recreation.
    pub fn add_channel(&mut self, request: PendingRequest) {
        if let Some(existing) = self.channel.take() {
            existing.abort();
        }
        self.channel = Some(request);
    }

    pub fn add_update(&mut self, request: PendingRequest) {
        self.updates.push_back(request);
    }

    /// Removes the channel request if the id matches. A miss means the
    /// completion belongs to a superseded request and must be ignored.
    pub fn take_channel(&mut self, id: RequestId) -> Option<PendingRequest> {
        if self.channel.as_ref().is_some_and(|request| request.id == id) {
            self.channel.take()
        } else {
            None
        }
    }

    pub fn take_update(&mut self, id: RequestId) -> Option<PendingRequest> {
        let index = self.updates.iter().position(|request| request.id == id)?;
        self.updates.remove(index)
    }

    pub fn channel_kind(&self) -> Option<RequestKind> {
        self.channel.as_ref().map(|request| request.kind)
    }

    /// Removes whatever channel request is pending, matched or not. Used at
    /// driver shutdown, where the caller decides between awaiting a
    /// terminate and aborting anything else.
    pub fn take_pending_channel(&mut self) -> Option<PendingRequest> {
        self.channel.take()
    }

    pub fn abort_channel(&mut self) {
        if let Some(request) = self.channel.take() {
            request.abort();
        }
    }

    /// Aborts every pending update and hands back the reply channels so the
    /// callers can be failed.
    pub fn abort_updates(&mut self) -> Vec<UpdateReply> {
        self.updates
            .drain(..)
            .filter_map(PendingRequest::abort)
            .collect()
    }
}
