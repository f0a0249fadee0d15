//! Client-side session manager for a bidirectional long-polling protocol
//! layered on plain HTTP.
//!
//! A [`LongPollClient`] turns a sequence of independent POST calls into the
//! illusion of a persistent, ordered, recoverable channel: at most one
//! channel call (create/poll/terminate) is ever in flight, transient
//! failures are recovered by re-establishing the session after a fixed
//! retry delay, and independent update calls are multiplexed without
//! disturbing the channel.

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod request;
pub mod session;
pub mod transport;

pub use client::LongPollClient;
pub use config::ClientConfig;
pub use error::SessionError;
pub use request::{RequestId, RequestKind};
pub use session::{SessionEvent, SessionId};
pub use transport::{Transport, TransportResponse};

#[cfg(test)]
mod tests;
