use fexec_common::protocol::error::{FexecError, Result};
use fexec_common::protocol::{FallbackUpdate, FallbackUpdateAck, InvocationRequest, InvocationResponse};
use fexec_common::transport::{Bytes, HttpPoster};
use std::time::Duration;

/// Default time a call may take, handler execution included.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one sidecar endpoint.
///
/// The same client type talks to either endpoint: [`ExecutorClient::invoke`]
/// against the invocation server, [`ExecutorClient::update_fallback`]
/// against the fallback listener.
#[derive(Clone)]
pub struct ExecutorClient {
    base_url: String,
    poster: HttpPoster,
    timeout: Duration,
}

impl ExecutorClient {
    /// Creates a client for the endpoint at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`FexecError::Config`] if `base_url` does not start with
    /// `http://`. The sidecar speaks plain HTTP only.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        if !base_url.starts_with("http://") {
            return Err(FexecError::Config(format!(
                "Invalid endpoint '{}': must start with http://",
                base_url
            )));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            poster: HttpPoster::new(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Invokes a handler and returns the executor's response.
    ///
    /// A handler failure is not an error here: it comes back as a response
    /// with `success == false`.
    pub async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationResponse> {
        let url = format!("{}/invoke", self.base_url);
        let body = Bytes::from(serde_json::to_vec(request)?);

        tracing::debug!("Invoking {} at {}", request.handler, url);
        let (status, body) = self.poster.post_json(&url, body, self.timeout).await?;

        serde_json::from_slice(&body).map_err(|e| {
            FexecError::Transport(format!("Unexpected {} response from {}: {}", status, url, e))
        })
    }

    /// Replaces the fallback address list held by a sidecar.
    pub async fn update_fallback(&self, addresses: Vec<String>) -> Result<FallbackUpdateAck> {
        let url = format!("{}/", self.base_url);
        let body = Bytes::from(serde_json::to_vec(&FallbackUpdate::new(addresses))?);

        let (status, body) = self.poster.post_json(&url, body, self.timeout).await?;
        if !status.is_success() {
            return Err(FexecError::Transport(format!(
                "Fallback update rejected by {} with status {}",
                url, status
            )));
        }

        Ok(serde_json::from_slice(&body)?)
    }
}
