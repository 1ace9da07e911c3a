//! HTTP Transport Utilities
//!
//! This module provides the hyper plumbing shared by the sidecar's two
//! servers, the fallback forwarder and the client.
//!
//! # Components
//!
//! - **[`HttpTransport`]**: JSON body parsing and response construction
//! - **[`HttpPoster`]**: outbound JSON `POST` with a per-call timeout
//! - **[`HyperRequest`]** / **[`HyperResponse`]**: type aliases for hyper messages
//!
//! # Example
//!
//! ```
//! use fexec_common::transport::http::HttpTransport;
//! use fexec_common::FallbackUpdateAck;
//! use hyper::StatusCode;
//!
//! let response = HttpTransport::json_response(StatusCode::OK, &FallbackUpdateAck::ok());
//! assert_eq!(response.status(), StatusCode::OK);
//! ```

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::protocol::error::{FexecError, Result};

/// Type alias for Hyper incoming requests
pub type HyperRequest = Request<Incoming>;

/// Type alias for Hyper responses with full body
pub type HyperResponse = Response<Full<Bytes>>;

/// HTTP transport utility functions
pub struct HttpTransport;

impl HttpTransport {
    /// Reads a whole request body.
    pub async fn read_body(req: HyperRequest) -> Result<Bytes> {
        Ok(req
            .into_body()
            .collect()
            .await
            .map_err(|e| FexecError::Transport(format!("Failed to read request body: {}", e)))?
            .to_bytes())
    }

    /// Parses a JSON document from raw body bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use fexec_common::transport::http::HttpTransport;
    /// use fexec_common::InvocationRequest;
    /// use hyper::body::Bytes;
    ///
    /// let body = Bytes::from(r#"{"Handler":"isprime.handler","Params":{"n":"7"}}"#);
    /// let request: InvocationRequest = HttpTransport::parse_json(&body).unwrap();
    /// assert_eq!(request.handler, "isprime.handler");
    /// ```
    pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
        serde_json::from_slice(body).map_err(FexecError::JsonSerialization)
    }

    /// Creates a JSON response with the given status.
    pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HyperResponse {
        let body = serde_json::to_vec(body).unwrap_or_default();
        Self::bytes_response(status, Bytes::from(body))
    }

    /// Creates a JSON response from an already serialized body.
    pub fn bytes_response(status: StatusCode, body: Bytes) -> HyperResponse {
        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    /// Creates a response with no body.
    pub fn empty_response(status: StatusCode) -> HyperResponse {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }
}

/// Outbound HTTP client for JSON posts.
///
/// Wraps a pooled hyper client so repeated posts reuse connections. Every
/// call is bounded by the timeout passed to [`HttpPoster::post_json`],
/// covering connect, send and reading the response body.
#[derive(Clone)]
pub struct HttpPoster {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpPoster {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client }
    }

    /// Posts `body` to `url` and returns the response status and body.
    ///
    /// # Errors
    ///
    /// - [`FexecError::Timeout`] if the exchange does not finish within `timeout`
    /// - [`FexecError::Transport`] if the request cannot be built or sent
    pub async fn post_json(&self, url: &str, body: Bytes, timeout: Duration) -> Result<(StatusCode, Bytes)> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(url)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(body))
            .map_err(|e| FexecError::Transport(format!("Failed to build request: {}", e)))?;

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| FexecError::Transport(format!("HTTP request failed: {}", e)))?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| FexecError::Transport(format!("Failed to read response: {}", e)))?
                .to_bytes();
            Ok((status, body))
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| FexecError::Timeout(timeout.as_millis() as u64))?
    }
}

impl Default for HttpPoster {
    fn default() -> Self {
        Self::new()
    }
}
