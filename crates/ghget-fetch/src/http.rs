use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A response whose body has not been read yet.
pub struct StreamResponse<E> {
    pub status: u16,
    pub body: BoxStream<'static, std::result::Result<Bytes, E>>,
}

/// Asynchronous HTTP client abstraction.
///
/// This trait provides the minimal interface needed by the release client
/// and the downloader. Implementations handle their own redirect following
/// and timeout configuration. A non-success status is not an error at this
/// level; callers inspect `status`.
///
/// # Implementations
///
/// - [`ReqwestClient`]: Production implementation using `reqwest`
/// - Fake implementations for testing
pub trait HttpClient: Send + Sync {
    /// Error type for transport failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send a GET request and buffer the whole body.
    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = std::result::Result<HttpResponse, Self::Error>> + Send;

    /// Send a GET request and return the body as a stream.
    fn stream(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = std::result::Result<StreamResponse<Self::Error>, Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use std::time::Duration;

    use futures_util::StreamExt;

    use super::*;
    use crate::error::{FetchError, Result};

    /// Production HTTP client implementation using reqwest.
    #[derive(Clone)]
    pub struct ReqwestClient {
        client: reqwest::Client,
        request_timeout: Option<Duration>,
    }

    impl ReqwestClient {
        /// Create a new ReqwestClient with default configuration.
        pub fn new() -> Result<Self> {
            Self::with_timeout(None)
        }

        /// `timeout` bounds buffered requests and connection setup. Streamed
        /// downloads are not bounded as a whole.
        pub fn with_timeout(timeout: Option<Duration>) -> Result<Self> {
            let mut builder = reqwest::Client::builder();
            if let Some(timeout) = timeout {
                builder = builder.connect_timeout(timeout);
            }
            let client = builder.build().map_err(FetchError::network)?;
            Ok(Self {
                client,
                request_timeout: timeout,
            })
        }

        fn request(&self, url: &str, headers: &[(String, String)]) -> reqwest::RequestBuilder {
            let mut request = self.client.get(url);
            for (key, value) in headers {
                request = request.header(key, value);
            }
            request
        }
    }

    fn collect_headers(map: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
        map.iter()
            .filter_map(|(key, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (key.as_str().to_string(), v.to_string()))
            })
            .collect()
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn get(
            &self,
            url: &str,
            headers: &[(String, String)],
        ) -> std::result::Result<HttpResponse, Self::Error> {
            let mut request = self.request(url, headers);
            if let Some(timeout) = self.request_timeout {
                request = request.timeout(timeout);
            }

            let response = request.send().await?;
            let status = response.status().as_u16();
            let headers = collect_headers(response.headers());
            let body = response.bytes().await?;

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }

        async fn stream(
            &self,
            url: &str,
            headers: &[(String, String)],
        ) -> std::result::Result<StreamResponse<Self::Error>, Self::Error> {
            let response = self.request(url, headers).send().await?;
            let status = response.status().as_u16();
            let body = response.bytes_stream().map(|chunk| chunk.map(Bytes::from));

            Ok(StreamResponse {
                status,
                body: Box::pin(body),
            })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = HttpResponse {
            status: 200,
            headers: vec![("ETag".into(), "\"abc\"".into())],
            body: Bytes::new(),
        };
        assert_eq!(response.header("etag"), Some("\"abc\""));
        assert_eq!(response.header("x-missing"), None);
        assert!(response.is_success());
    }
}
