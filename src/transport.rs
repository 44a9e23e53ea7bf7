use std::{sync::RwLock, time::Duration};

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Method, StatusCode};

use crate::{ClientOptions, ErrorKind, Result, RetryError, TransportError};

const RELEASE_BYTE_BUDGET: usize = 64 * 1024;
const RELEASE_TIME_BUDGET: Duration = Duration::from_millis(100);

/// Everything needed to send one attempt; re-sent unchanged on every retry.
#[derive(Clone, Debug)]
pub struct RequestParts {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl RequestParts {
    /// Request with no headers, query or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
        }
    }
}

/// A response whose connection can be handed back before the next attempt.
#[async_trait]
pub trait TransportResponse: Send + Sized + 'static {
    /// Status code the retry loop matches against `RetryOptions::statuses`.
    fn status(&self) -> StatusCode;

    /// Drains a bounded prefix of the body, then closes it.
    ///
    /// Must return promptly even if the peer keeps streaming.
    async fn release(self);
}

/// The HTTP client the retry loop drives.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Response: TransportResponse;

    async fn send(&self, request: &RequestParts)
        -> std::result::Result<Self::Response, TransportError>;

    /// Releases the connection pool. Called once by the owning client.
    fn close(&self) {}
}

#[async_trait]
impl TransportResponse for reqwest::Response {
    fn status(&self) -> StatusCode {
        reqwest::Response::status(self)
    }

    async fn release(mut self) {
        // A short body read to the end hands the connection back to the pool;
        // anything longer or slower is dropped and its connection discarded.
        let drain = async {
            let mut read = 0;
            while read <= RELEASE_BYTE_BUDGET {
                match self.chunk().await {
                    Ok(Some(chunk)) => read += chunk.len(),
                    Ok(None) | Err(_) => break,
                }
            }
        };
        let _ = tokio::time::timeout(RELEASE_TIME_BUDGET, drain).await;
    }
}

/// Default transport backed by a shared `reqwest::Client` pool.
#[derive(Debug)]
pub struct ReqwestTransport {
    http: RwLock<Option<reqwest::Client>>,
    raise_for_status: bool,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::from_client(reqwest::Client::new())
    }
}

impl ReqwestTransport {
    /// Wraps an existing client; its timeouts and pool settings apply to every attempt.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self {
            http: RwLock::new(Some(http)),
            raise_for_status: false,
        }
    }

    /// Builds a client with the per-attempt timeout from `options`.
    pub fn from_options(options: &ClientOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout_ms) = options.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let http = builder
            .build()
            .map_err(|err| RetryError::InvalidConfig(format!("http client: {err}")))?;
        Ok(Self::from_client(http).raise_for_status(options.raise_for_status))
    }

    /// Turns 4xx/5xx responses into [`ErrorKind::Status`] errors.
    pub fn raise_for_status(mut self, enabled: bool) -> Self {
        self.raise_for_status = enabled;
        self
    }

    fn client(&self) -> Option<reqwest::Client> {
        self.http
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    type Response = reqwest::Response;

    async fn send(
        &self,
        request: &RequestParts,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        let http = self
            .client()
            .ok_or_else(|| TransportError::new(ErrorKind::Closed, "transport is closed"))?;

        let mut builder = http
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;

        if self.raise_for_status {
            let rejected = response.error_for_status_ref().err();
            if let Some(err) = rejected {
                response.release().await;
                return Err(err.into());
            }
        }

        Ok(response)
    }

    fn close(&self) {
        let mut http = self
            .http
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *http = None;
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;

    use super::{RequestParts, ReqwestTransport, Transport};
    use crate::{ClientOptions, ErrorKind};

    #[tokio::test]
    async fn closed_transport_refuses_to_send() {
        let transport = ReqwestTransport::default();
        transport.close();

        let err = transport
            .send(&RequestParts::new(Method::GET, "http://127.0.0.1:9/"))
            .await
            .expect_err("closed transport must not send");
        assert_eq!(err.kind(), ErrorKind::Closed);
    }

    #[tokio::test]
    async fn invalid_url_is_a_builder_error() {
        let transport = ReqwestTransport::from_options(&ClientOptions::default())
            .expect("client must build");

        let err = transport
            .send(&RequestParts::new(Method::GET, "not a url"))
            .await
            .expect_err("invalid url must fail");
        assert_eq!(err.kind(), ErrorKind::Builder);
        assert!(err.downcast_ref::<reqwest::Error>().is_some());
    }
}
