use std::future::Future;
use std::ops::RangeInclusive;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use http::{HeaderMap, StatusCode};

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Status line and headers of a response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status:  StatusCode,
    pub headers: HeaderMap,
}

/// A response whose body has not been read yet.
///
/// Dropping it without polling `body` abandons the transfer.
pub struct Response<E> {
    pub head: ResponseHead,
    pub body: BoxStream<'static, Result<Bytes, E>>,
}

impl<E> std::fmt::Debug for Response<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response").field("head", &self.head).finish_non_exhaustive()
    }
}

/// Asynchronous HTTP client abstraction.
///
/// Implementations own their redirect, proxy and timeout policy; the engine
/// only needs header checks and streamed bodies. Any status is returned as a
/// response, never as an error.
///
/// # Implementations
///
/// - [`ReqwestClient`]: Production implementation using `reqwest`
/// - Mock implementations for testing
pub trait HttpClient: Send + Sync + 'static {
    /// Transport-level failure: DNS, connect, TLS, timeout, reset.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Issue a `HEAD` request.
    fn head(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<ResponseHead, Self::Error>> + Send;

    /// Issue a `GET`, restricted to the inclusive byte `range` when given.
    fn get(
        &self,
        url: &str,
        range: Option<RangeInclusive<u64>>,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<Response<Self::Error>, Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;
    use crate::core::range_header;
    use futures_util::StreamExt;

    /// Production HTTP client implementation using reqwest.
    #[derive(Debug, Clone, Default)]
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        /// Create a client with reqwest's default configuration.
        pub fn new() -> Self { Self::default() }

        /// Wrap a prebuilt client carrying proxy and timeout policy.
        pub fn from_client(client: reqwest::Client) -> Self { Self { client } }

        fn with_headers(mut request: reqwest::RequestBuilder, headers: &[(String, String)]) -> reqwest::RequestBuilder {
            for (key, value) in headers {
                request = request.header(key.as_str(), value.as_str());
            }
            request
        }
    }

    impl From<reqwest::Client> for ReqwestClient {
        fn from(client: reqwest::Client) -> Self { Self::from_client(client) }
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn head(&self, url: &str, headers: &[(String, String)]) -> Result<ResponseHead, Self::Error> {
            let response = Self::with_headers(self.client.head(url), headers).send().await?;
            Ok(ResponseHead {
                status:  response.status(),
                headers: response.headers().clone(),
            })
        }

        async fn get(
            &self,
            url: &str,
            range: Option<RangeInclusive<u64>>,
            headers: &[(String, String)],
        ) -> Result<Response<Self::Error>, Self::Error> {
            let mut request = Self::with_headers(self.client.get(url), headers);
            if let Some(range) = range {
                request = request.header(http::header::RANGE, range_header(*range.start(), *range.end()));
            }

            let response = request.send().await?;
            let head = ResponseHead {
                status:  response.status(),
                headers: response.headers().clone(),
            };
            let body = response.bytes_stream().map(|chunk| chunk.map(Bytes::from));
            Ok(Response { head, body: Box::pin(body) })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;
