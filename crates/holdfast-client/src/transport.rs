use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::error::SessionError;

/// One finished HTTP round trip. Status judgement belongs to the session
/// manager, not the transport.
#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// The HTTP primitive the session manager drives. Implementations must
/// enforce the configured response timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, url: Url, body: String) -> Result<TransportResponse, SessionError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(response_timeout: Duration) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(response_timeout)
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(&self, url: Url, body: String) -> Result<TransportResponse, SessionError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(TransportResponse { status, body })
    }
}
