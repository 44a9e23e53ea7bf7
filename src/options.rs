use std::collections::HashSet;

use reqwest::StatusCode;

use crate::ErrorKind;

/// Decides which outcomes of an attempt are retried and how many times.
///
/// Per-request options replace the client default as a whole; fields are
/// never merged.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryOptions {
    /// Maximum number of retries after the initial attempt.
    pub attempts: u32,
    /// Response statuses that trigger another attempt.
    pub statuses: HashSet<StatusCode>,
    /// Transport error kinds that trigger another attempt.
    pub exceptions: HashSet<ErrorKind>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryOptions {
    /// Retries every 5xx status up to `attempts` times; no error kind is retried.
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts,
            statuses: server_errors(),
            exceptions: HashSet::new(),
        }
    }

    /// Replaces the retryable status set.
    pub fn with_statuses<I>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = StatusCode>,
    {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// Replaces the retryable transport error kinds.
    pub fn with_exceptions<I>(mut self, exceptions: I) -> Self
    where
        I: IntoIterator<Item = ErrorKind>,
    {
        self.exceptions = exceptions.into_iter().collect();
        self
    }

    /// Whether a response with `status` is retried.
    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.statuses.contains(&status)
    }

    /// Whether a transport error of `kind` is retried.
    pub fn is_retryable_error(&self, kind: ErrorKind) -> bool {
        self.exceptions.contains(&kind)
    }
}

fn server_errors() -> HashSet<StatusCode> {
    (500..=599)
        .filter_map(|code| StatusCode::from_u16(code).ok())
        .collect()
}

/// Configures the default reqwest transport and the client-level retry options.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds, enforced by the transport.
    pub timeout_ms: Option<u64>,
    /// Turn 4xx/5xx responses into [`ErrorKind::Status`] transport errors.
    pub raise_for_status: bool,
    /// Retry options used when a request does not supply its own.
    pub retry: RetryOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            raise_for_status: false,
            retry: RetryOptions::default(),
        }
    }
}
