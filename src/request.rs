use std::{
    fmt,
    future::{Future, IntoFuture},
    pin::Pin,
};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Method,
};
use serde::Serialize;

use crate::{
    transport::{RequestParts, Transport},
    Result, RetryClient, RetryError, RetryOptions,
};

/// A request being prepared on a [`RetryClient`].
///
/// Finish it with [`RequestBuilder::send`] or by awaiting it directly.
#[must_use = "a request does nothing until it is sent or awaited"]
pub struct RequestBuilder<'a, T: Transport> {
    client: &'a RetryClient<T>,
    parts: RequestParts,
    options: Option<RetryOptions>,
    error: Option<RetryError>,
}

impl<T: Transport> fmt::Debug for RequestBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.parts.method)
            .field("url", &self.parts.url)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'a, T: Transport> RequestBuilder<'a, T> {
    pub(crate) fn new(client: &'a RetryClient<T>, parts: RequestParts) -> Self {
        Self {
            client,
            parts,
            options: None,
            error: None,
        }
    }

    /// Method this request will be sent with.
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Appends a header; an invalid name or value fails the request at send time.
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: fmt::Display,
        V: TryInto<HeaderValue>,
        V::Error: fmt::Display,
    {
        if self.error.is_some() {
            return self;
        }
        match (key.try_into(), value.try_into()) {
            (Ok(key), Ok(value)) => {
                self.parts.headers.append(key, value);
            }
            (Err(err), _) => self.error = Some(RetryError::Encode(format!("header name: {err}"))),
            (_, Err(err)) => self.error = Some(RetryError::Encode(format!("header value: {err}"))),
        }
        self
    }

    /// Merges `headers` into the request, replacing existing values.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.parts.headers.extend(headers);
        self
    }

    /// Appends query string pairs.
    pub fn query<K, V, I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.parts.query.extend(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.to_string())),
        );
        self
    }

    /// Sets a raw body, re-sent on every attempt.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.parts.body = Some(body.into());
        self
    }

    /// Serializes `body` as JSON and sets `Content-Type: application/json`
    /// unless a content type was already given.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        match serde_json::to_vec(body) {
            Ok(bytes) => {
                if !self.parts.headers.contains_key(CONTENT_TYPE) {
                    self.parts
                        .headers
                        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                self.parts.body = Some(bytes);
            }
            Err(err) => {
                self.error
                    .get_or_insert(RetryError::Encode(format!("json body: {err}")));
            }
        }
        self
    }

    /// Overrides the client's retry options for this request only.
    pub fn retry_options(mut self, options: RetryOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Sends the request, retrying per the effective options.
    pub async fn send(self) -> Result<T::Response> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let options = self.options.as_ref().unwrap_or(self.client.retry_options());
        self.client.execute(&self.parts, options).await
    }
}

impl<'a, T: Transport> IntoFuture for RequestBuilder<'a, T> {
    type Output = Result<T::Response>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{header::CONTENT_TYPE, Method};

    use crate::{RetryClient, RetryError, RetryOptions};

    #[test]
    fn json_sets_body_and_content_type() {
        let client = RetryClient::new();
        let builder = client
            .post("http://localhost/items")
            .json(&serde_json::json!({"name": "Kit"}));

        assert_eq!(builder.parts.method, Method::POST);
        assert_eq!(
            builder.parts.headers.get(CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(&b"application/json"[..])
        );
        assert_eq!(
            builder.parts.body.as_deref(),
            Some(&br#"{"name":"Kit"}"#[..])
        );
    }

    #[test]
    fn query_pairs_are_collected_in_order() {
        let client = RetryClient::new();
        let builder = client
            .get("http://localhost/items")
            .query([("page", 2), ("size", 50)]);

        assert_eq!(
            builder.parts.query,
            vec![
                ("page".to_owned(), "2".to_owned()),
                ("size".to_owned(), "50".to_owned())
            ]
        );
    }

    #[test]
    fn retry_options_override_is_kept_per_request() {
        let client = RetryClient::new().with_options(RetryOptions::new(1));
        let builder = client
            .get("http://localhost/")
            .retry_options(RetryOptions::new(5));

        assert_eq!(builder.options.map(|o| o.attempts), Some(5));
        assert_eq!(client.retry_options().attempts, 1);
    }

    #[tokio::test]
    async fn invalid_header_fails_before_sending() {
        let client = RetryClient::new();

        let err = client
            .get("http://127.0.0.1:9/")
            .header("bad header", "value")
            .send()
            .await
            .expect_err("invalid header name must fail");

        assert!(matches!(err, RetryError::Encode(_)));
    }
}
