//! `retry-http` reissues failed HTTP requests according to a configurable
//! policy while reusing one `reqwest` connection pool.
//!
//! - [`RetryOptions`] decides which statuses and transport error kinds are retried.
//! - A [`RetryStrategy`] ([`ExponentialRetry`], [`RandomRetry`], [`ListRetry`],
//!   [`FixedRetry`]) decides how long to wait before each attempt.
//! - [`RetryClient`] runs the attempt loop.
//!
//! ```no_run
//! use retry_http::{RetryClient, RetryOptions};
//!
//! # async fn run() -> retry_http::Result<()> {
//! let client = RetryClient::new();
//! let response = client
//!     .get("https://example.com/ping")
//!     .retry_options(RetryOptions::new(5))
//!     .await?;
//! println!("{}", response.status());
//! client.close();
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod options;
mod request;
mod strategy;
mod transport;

pub use client::RetryClient;
pub use error::{ErrorKind, RetryError, TransportError};
pub use options::{ClientOptions, RetryOptions};
pub use request::RequestBuilder;
pub use strategy::{
    ExponentialRetry, FixedRetry, ListRetry, RandomRetry, RetryStrategy, Timeouts,
};
pub use transport::{RequestParts, ReqwestTransport, Transport, TransportResponse};

pub use reqwest::{Method, StatusCode};

pub type Result<T> = std::result::Result<T, RetryError>;
