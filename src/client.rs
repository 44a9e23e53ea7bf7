use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use reqwest::Method;
use tokio::time::sleep;

use crate::{
    request::RequestBuilder,
    transport::{RequestParts, ReqwestTransport, Transport, TransportResponse},
    ClientOptions, ExponentialRetry, Result, RetryError, RetryOptions, RetryStrategy,
};

struct Shared<T: Transport> {
    transport: T,
    closed: AtomicBool,
}

impl<T: Transport> Shared<T> {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.transport.close();

            #[cfg(feature = "tracing")]
            tracing::debug!("retry client transport closed");
        }
    }
}

impl<T: Transport> Drop for Shared<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// HTTP client that reissues failed requests according to [`RetryOptions`]
/// and a [`RetryStrategy`].
///
/// Clones share one transport. The transport is closed exactly once, by
/// [`RetryClient::close`] or when the last clone is dropped.
pub struct RetryClient<T: Transport = ReqwestTransport> {
    shared: Arc<Shared<T>>,
    options: RetryOptions,
    strategy: Arc<dyn RetryStrategy>,
}

impl<T: Transport> Clone for RetryClient<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            options: self.options.clone(),
            strategy: Arc::clone(&self.strategy),
        }
    }
}

impl<T: Transport> fmt::Debug for RetryClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryClient")
            .field("options", &self.options)
            .field("strategy", &self.strategy)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Default for RetryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryClient {
    /// Creates a client over a default `reqwest::Client` with default retry options.
    pub fn new() -> Self {
        Self::with_transport(ReqwestTransport::default())
    }

    /// Creates a client sharing the pool of an existing `reqwest::Client`.
    pub fn from_reqwest(http: reqwest::Client) -> Self {
        Self::with_transport(ReqwestTransport::from_client(http))
    }

    /// Creates a client from transport settings and client-level retry options.
    pub fn from_options(options: ClientOptions) -> Result<Self> {
        let transport = ReqwestTransport::from_options(&options)?;
        Ok(Self::with_transport(transport).with_options(options.retry))
    }
}

impl<T: Transport> RetryClient<T> {
    /// Creates a client over a custom transport.
    pub fn with_transport(transport: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                closed: AtomicBool::new(false),
            }),
            options: RetryOptions::default(),
            strategy: Arc::new(ExponentialRetry::default()),
        }
    }

    /// Sets the retry options used by requests that do not supply their own.
    pub fn with_options(mut self, options: RetryOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the backoff strategy.
    pub fn with_strategy<S>(mut self, strategy: S) -> Self
    where
        S: RetryStrategy + 'static,
    {
        self.strategy = Arc::new(strategy);
        self
    }

    /// Client-level retry options.
    pub fn retry_options(&self) -> &RetryOptions {
        &self.options
    }

    /// Backoff strategy shared by every request of this client.
    pub fn strategy(&self) -> &dyn RetryStrategy {
        self.strategy.as_ref()
    }

    /// Starts a request with an arbitrary method.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_, T> {
        RequestBuilder::new(self, RequestParts::new(method, url))
    }

    /// Starts a `GET` request.
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::GET, url)
    }

    /// Starts a `POST` request.
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::POST, url)
    }

    /// Starts a `PUT` request.
    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::PUT, url)
    }

    /// Starts a `PATCH` request.
    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::PATCH, url)
    }

    /// Starts a `DELETE` request.
    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::DELETE, url)
    }

    /// Starts a `HEAD` request.
    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::HEAD, url)
    }

    /// Starts an `OPTIONS` request.
    pub fn options(&self, url: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::OPTIONS, url)
    }

    /// Closes the transport for this client and all its clones.
    ///
    /// Idempotent; later requests fail with [`RetryError::Closed`].
    pub fn close(&self) {
        self.shared.close();
    }

    /// Whether [`RetryClient::close`] has been called on this client or a clone.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Runs the attempt loop for one logical request.
    ///
    /// Returns the first response whose status is not retryable, or the last
    /// response or error once the strategy's schedule is used up.
    pub(crate) async fn execute(
        &self,
        request: &RequestParts,
        options: &RetryOptions,
    ) -> Result<T::Response> {
        if self.is_closed() {
            return Err(RetryError::Closed);
        }

        let mut timeouts = self.strategy.timeouts(options.attempts).enumerate().peekable();

        while let Some((index, delay)) = timeouts.next() {
            if index > 0 {
                self.wait_before_retry(index, delay).await;
            }
            let is_last = timeouts.peek().is_none();

            match self.shared.transport.send(request).await {
                Ok(response) => {
                    let status = response.status();
                    if !options.is_retryable_status(status) {
                        return Ok(response);
                    }
                    if is_last {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            attempts = index + 1,
                            %status,
                            "retries exhausted, returning last response"
                        );
                        return Ok(response);
                    }

                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt = index, %status, "retryable status");

                    response.release().await;
                }
                Err(err) => {
                    if !options.is_retryable_error(err.kind()) {
                        return Err(RetryError::Transport(err));
                    }
                    if is_last {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            attempts = index + 1,
                            error = %err,
                            "retries exhausted, returning last error"
                        );
                        return Err(RetryError::Transport(err));
                    }

                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt = index, error = %err, "retryable transport error");
                }
            }
        }

        Err(RetryError::InvalidConfig(
            "retry strategy produced an empty timeout sequence".to_owned(),
        ))
    }

    /// Sleeps for `delay` seconds before attempt `attempt`.
    async fn wait_before_retry(&self, attempt: usize, delay: f64) {
        let delay = Duration::try_from_secs_f64(delay.max(0.0)).unwrap_or(Duration::MAX);

        #[cfg(feature = "tracing")]
        tracing::debug!("retrying request (attempt {}) after {:?}", attempt, delay);

        #[cfg(not(feature = "tracing"))]
        let _ = attempt;

        sleep(delay).await;
    }
}
