use std::time::Duration;

use url::Url;

use crate::error::SessionError;

/// Wait before recreating a session after a channel failure.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Per-call response ceiling. Longer than the server's poll hold (5000 ms)
/// so a slow-but-alive poll is not mistaken for a dead connection.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Clone, Debug)]
pub struct ClientConfig {
    base_url: Url,
    retry_delay: Duration,
    response_timeout: Duration,
}

impl ClientConfig {
    pub fn new(server_base_url: impl AsRef<str>) -> Result<Self, SessionError> {
        let mut base = server_base_url.as_ref().trim().to_string();
        if base.is_empty() {
            return Err(SessionError::InvalidConfig(
                "server base url cannot be empty".into(),
            ));
        }
        if !base.contains("://") {
            let inferred_scheme = infer_scheme(&base);
            base = format!("{inferred_scheme}{base}");
        }
        // The endpoint paths are joined onto the base, so the final path
        // segment must not be swallowed by Url::join.
        if !base.ends_with('/') {
            base.push('/');
        }
        let parsed = Url::parse(&base)
            .map_err(|err| SessionError::InvalidConfig(format!("invalid server url: {err}")))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(SessionError::InvalidConfig(format!(
                    "unsupported server url scheme '{other}'"
                )));
            }
        }
        Ok(Self {
            base_url: parsed,
            retry_delay: RETRY_DELAY,
            response_timeout: RESPONSE_TIMEOUT,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

fn infer_scheme(base: &str) -> &'static str {
    let authority = base.split('/').next().unwrap_or(base);
    let host = if let Some(v6) = authority.strip_prefix('[') {
        v6.split(']').next().unwrap_or(v6).to_ascii_lowercase()
    } else {
        authority.split(':').next().unwrap_or(authority).to_ascii_lowercase()
    };
    let private_172 = host
        .strip_prefix("172.")
        .and_then(|rest| rest.split('.').next())
        .and_then(|octet| octet.parse::<u8>().ok())
        .is_some_and(|octet| (16..32).contains(&octet));
    if host == "localhost"
        || host == "0.0.0.0"
        || host == "::1"
        || host.starts_with("127.")
        || host.starts_with("10.")
        || host.starts_with("192.168.")
        || private_172
    {
        "http://"
    } else {
        "https://"
    }
}
