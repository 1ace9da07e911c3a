//! Invocation Server
//!
//! HTTP endpoint that runs handlers for callers and, when the reply to a
//! caller cannot be written because the connection was reset, hands the
//! finished response to [`FallbackDelivery`].
//!
//! # Architecture
//!
//! - One tokio task per connection, keep-alive disabled: a connection carries
//!   exactly one invocation.
//! - The invocation itself runs in a detached task that also drops a copy of
//!   the encoded response into the connection's reply slot. If hyper then
//!   fails to write the reply because the peer is gone, the connection task
//!   takes the response from the slot and forwards it.
//! - A failing request never stops the accept loop.
//!
//! # Example
//!
//! ```no_run
//! use fexec_server::fallback::{FallbackAddressStore, FallbackDelivery};
//! use fexec_server::http_server::InvocationServer;
//! use fexec_server::registry::HandlerRegistry;
//! use fexec_server::Executor;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let executor = Arc::new(Executor::new(Arc::new(HandlerRegistry::standard()), serde_json::json!({})));
//!     let delivery = Arc::new(FallbackDelivery::new(FallbackAddressStore::default()));
//!     let server = InvocationServer::new(executor, delivery);
//!     server.run("0.0.0.0:8080".parse().unwrap()).await.unwrap();
//! }
//! ```

use fexec_common::protocol::error::{FexecError, Result};
use fexec_common::transport::{Bytes, HttpTransport, HyperRequest, HyperResponse};
use fexec_common::{InvocationRequest, InvocationResponse};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::error::Error as StdError;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::executor::Executor;
use crate::fallback::FallbackDelivery;

/// Any request path containing this marker is an invocation
/// (`/invoke`, `/invoke/func2`, ...).
pub const INVOKE_MARKER: &str = "invoke";

/// Where a connection's computed response is parked until the reply is known
/// to have been written.
type ReplySlot = Arc<Mutex<Option<oneshot::Sender<Bytes>>>>;

pub struct InvocationServer {
    executor: Arc<Executor>,
    delivery: Arc<FallbackDelivery>,
}

impl InvocationServer {
    pub fn new(executor: Arc<Executor>, delivery: Arc<FallbackDelivery>) -> Self {
        Self { executor, delivery }
    }

    /// Binds `addr` and serves until the listener fails.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| FexecError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves invocations on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        tracing::info!(
            "Invocation server listening on {}",
            listener
                .local_addr()
                .map_err(|e| FexecError::Transport(format!("Failed to get local address: {}", e)))?
        );

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            tokio::task::spawn(Self::handle_connection(
                Arc::clone(&self.executor),
                Arc::clone(&self.delivery),
                stream,
                peer,
            ));
        }
    }

    async fn handle_connection(
        executor: Arc<Executor>,
        delivery: Arc<FallbackDelivery>,
        stream: TcpStream,
        peer: SocketAddr,
    ) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let slot: ReplySlot = Arc::new(Mutex::new(Some(reply_tx)));

        let io = TokioIo::new(stream);
        let service = service_fn(move |req| {
            let executor = Arc::clone(&executor);
            let slot = Arc::clone(&slot);
            async move { Self::handle_request(executor, slot, req).await }
        });

        let served = http1::Builder::new()
            .keep_alive(false)
            .serve_connection(io, service)
            .await;

        let Err(err) = served else {
            return;
        };
        if !is_peer_gone(&err) {
            tracing::error!("Error serving connection from {}: {}", peer, err);
            return;
        }

        // The slot's sender is dropped without a value when no invocation
        // was started on this connection.
        match reply_rx.await {
            Ok(payload) => {
                tracing::warn!(
                    "Reply to {} failed ({}); container seems to have migrated, forwarding result",
                    peer,
                    err
                );
                let outcome = delivery.deliver(payload).await;
                tracing::debug!("Fallback delivery for {}: {:?}", peer, outcome);
            }
            Err(_) => tracing::debug!("{} disconnected before sending a request: {}", peer, err),
        }
    }

    async fn handle_request(
        executor: Arc<Executor>,
        slot: ReplySlot,
        req: HyperRequest,
    ) -> std::result::Result<HyperResponse, FexecError> {
        if !req.uri().path().contains(INVOKE_MARKER) {
            return Ok(HttpTransport::empty_response(StatusCode::NOT_FOUND));
        }
        if req.method() != Method::POST {
            return Ok(HttpTransport::empty_response(StatusCode::METHOD_NOT_ALLOWED));
        }

        let body = HttpTransport::read_body(req).await?;
        let request: InvocationRequest = match HttpTransport::parse_json(&body) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Rejected malformed invocation: {}", e);
                return Ok(HttpTransport::json_response(
                    StatusCode::BAD_REQUEST,
                    &InvocationResponse::failure(None),
                ));
            }
        };

        tracing::debug!("Invoking {}", request.handler);
        let reply = slot.lock().take();

        // Detached so the result survives the caller going away mid-call.
        let invocation = tokio::task::spawn(async move {
            let response = executor.invoke(request).await;
            let payload = encode(&response);
            if let Some(reply) = reply {
                let _ = reply.send(payload.clone());
            }
            payload
        });

        let payload = invocation.await.map_err(|e| FexecError::Execution(e.to_string()))?;
        Ok(HttpTransport::bytes_response(StatusCode::OK, payload))
    }
}

fn encode(response: &InvocationResponse) -> Bytes {
    match serde_json::to_vec(response) {
        Ok(body) => Bytes::from(body),
        Err(e) => {
            tracing::error!("Failed to encode response: {}", e);
            Bytes::from_static(br#"{"Success":false}"#)
        }
    }
}

/// Whether a connection error means the peer vanished (reset or closed
/// under us) rather than a protocol problem.
fn is_peer_gone(err: &hyper::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionAborted
            );
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::FallbackAddressStore;
    use crate::registry::HandlerRegistry;
    use serde_json::json;
    use std::time::Duration;

    async fn start_test_server() -> SocketAddr {
        let executor = Arc::new(Executor::new(Arc::new(HandlerRegistry::standard()), json!({})));
        let delivery = Arc::new(FallbackDelivery::new(FallbackAddressStore::new(
            "/nonexistent/fallback.txt",
        )));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(InvocationServer::new(executor, delivery).serve(listener));
        addr
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_invoke_isprime() {
        let addr = start_test_server().await;
        let response = client()
            .post(format!("http://{}/invoke", addr))
            .body(r#"{"Handler":"isprime.handler","HandlerDir":"/app","Params":{"n":"17"},"ReturnOutput":false}"#)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: InvocationResponse = response.json().await.unwrap();
        assert!(body.success);
        assert_eq!(body.result_value().unwrap(), Some(json!({"IsPrime": true})));
    }

    #[tokio::test]
    async fn test_function_suffixed_path_is_accepted() {
        let addr = start_test_server().await;
        let response = client()
            .post(format!("http://{}/invoke/func2", addr))
            .body(r#"{"Handler":"isprime.handler","Params":{"n":"18"}}"#)
            .send()
            .await
            .unwrap();

        let body: InvocationResponse = response.json().await.unwrap();
        assert_eq!(body.result_value().unwrap(), Some(json!({"IsPrime": false})));
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let addr = start_test_server().await;
        let response = client()
            .post(format!("http://{}/run", addr))
            .body("{}")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_get_is_rejected() {
        let addr = start_test_server().await;
        let response = client().get(format!("http://{}/invoke", addr)).send().await.unwrap();
        assert_eq!(response.status(), 405);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let addr = start_test_server().await;
        let response = client()
            .post(format!("http://{}/invoke", addr))
            .body("{not json")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: InvocationResponse = response.json().await.unwrap();
        assert!(!body.success);
    }

    #[test]
    fn test_encode_is_wire_shape() {
        let response = InvocationResponse::success(Some("9".into()), &json!(1)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&encode(&response)).unwrap();
        assert_eq!(value["Success"], true);
        assert_eq!(value["Result"], "1");
        assert_eq!(value["Id"], "9");
    }
}
