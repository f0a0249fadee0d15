//! Body framing for the long-polling wire protocol.
//!
//! Requests and responses are CRLF-framed plain text. Every response starts
//! with a header/echo line whose content is opaque here; it is skipped, not
//! validated.

use crate::error::SessionError;
use crate::session::SessionId;

pub const CREATE_PATH: &str = "lpcreate";
pub const POLL_PATH: &str = "lp";
pub const TERMINATE_PATH: &str = "lpterminate";
pub const UPDATE_PATH: &str = "update";

const SESSION_HEADER: &str = "session-id";
const CRLF: &str = "\r\n";

/// Body of a poll or terminate call.
pub fn encode_session(session: SessionId) -> String {
    format!("{SESSION_HEADER}: {}{CRLF}", session.value())
}

/// Body of an update call: the session line followed by the payload.
pub fn encode_update(session: SessionId, payload: &str) -> String {
    format!("{SESSION_HEADER}: {}{CRLF}{payload}{CRLF}", session.value())
}

/// Extracts the session id a create response assigns. It sits on the second
/// line, which must read exactly `session-id: <int>`: one colon, one space.
pub fn parse_session_id(body: &str) -> Result<SessionId, SessionError> {
    let line = body.split(CRLF).nth(1).ok_or_else(|| {
        SessionError::Protocol("create response is missing the session id line".into())
    })?;
    let value = line
        .strip_prefix("session-id: ")
        .ok_or_else(|| SessionError::Protocol(format!("malformed session id line {line:?}")))?;
    let id = value
        .parse::<u64>()
        .map_err(|_| SessionError::Protocol(format!("malformed session id value {value:?}")))?;
    let session = SessionId::new(id);
    if !session.is_active() {
        return Err(SessionError::Protocol(format!(
            "server assigned reserved session id {id}"
        )));
    }
    Ok(session)
}

/// Everything after the first line and its CRLF. A body without a CRLF has
/// no payload.
pub fn decode_payload(body: &str) -> &str {
    match body.split_once(CRLF) {
        Some((_, payload)) => payload,
        None => "",
    }
}

/// Decodes a poll response. Empty means "no new data" and is valid; anything
/// else must be well-formed JSON, since a malformed payload is
/// indistinguishable from a broken channel.
pub fn decode_poll_payload(body: &str) -> Result<String, SessionError> {
    let payload = decode_payload(body);
    if payload.is_empty() {
        return Ok(String::new());
    }
    serde_json::from_str::<serde_json::Value>(payload)
        .map_err(|err| SessionError::Protocol(format!("malformed poll payload: {err}")))?;
    Ok(payload.to_string())
}
