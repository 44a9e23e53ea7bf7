use std::{error::Error as StdError, fmt};

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// Strategy bounds or client construction settings were rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Error raised by the transport, forwarded unchanged from the last attempt.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Request body could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),
    /// Request issued after [`crate::RetryClient::close`].
    #[error("client is closed")]
    Closed,
}

/// Closed classification of transport failures.
///
/// `RetryOptions::exceptions` is a set of these; membership decides whether a
/// failed attempt is retried.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// The attempt exceeded the transport's timeout.
    Timeout,
    /// Connection could not be established.
    Connect,
    /// Request could not be sent.
    Request,
    /// Request or response body failed mid-stream.
    Body,
    /// Response could not be decoded.
    Decode,
    /// Redirect policy rejected the response.
    Redirect,
    /// Response status was turned into an error (`raise_for_status`).
    Status,
    /// Request could not be built, e.g. an invalid URL.
    Builder,
    /// Transport was closed.
    Closed,
    /// Anything the transport could not classify.
    Other,
}

impl ErrorKind {
    /// Classifies a `reqwest` error.
    pub fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect
        } else if err.is_status() {
            Self::Status
        } else if err.is_redirect() {
            Self::Redirect
        } else if err.is_builder() {
            Self::Builder
        } else if err.is_body() {
            Self::Body
        } else if err.is_decode() {
            Self::Decode
        } else if err.is_request() {
            Self::Request
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Redirect => "redirect",
            Self::Status => "status",
            Self::Builder => "builder",
            Self::Closed => "closed",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Failure of a single attempt, carrying its [`ErrorKind`] and the original
/// error raised by the transport.
#[derive(Debug)]
pub struct TransportError {
    kind: ErrorKind,
    source: Box<dyn StdError + Send + Sync>,
}

impl TransportError {
    /// Wraps an error raised by a [`crate::Transport`] implementation.
    pub fn new(kind: ErrorKind, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    /// Classification matched against `RetryOptions::exceptions`.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the original error if it is of type `E`.
    ///
    /// For the default transport this is a [`reqwest::Error`].
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }

    /// Consumes the error, returning the transport's original error.
    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync> {
        self.source
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(ErrorKind::classify(&err), err)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.source)
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}
