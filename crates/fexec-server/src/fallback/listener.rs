//! Fallback Listener
//!
//! Accepts fallback address list updates from the platform and writes them
//! to the [`FallbackAddressStore`]. Any path is accepted; only `POST` is.
//!
//! # Responses
//!
//! | Situation              | Status | Body                |
//! |------------------------|--------|---------------------|
//! | List stored            | 200    | `{"Success":true}`  |
//! | Body is not an update  | 400    | `{"Success":false}` |
//! | Store write failed     | 500    | `{"Success":false}` |
//! | Method other than POST | 405    | empty               |
//!
//! Only a list that was actually stored is acknowledged with success. A
//! malformed body or a failed write leaves the previous list in place and
//! says so, instead of acknowledging an update that did not happen.

use fexec_common::protocol::error::{FexecError, Result};
use fexec_common::protocol::{FallbackUpdate, FallbackUpdateAck};
use fexec_common::transport::{HttpTransport, HyperRequest, HyperResponse};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::store::FallbackAddressStore;

pub struct FallbackListener {
    store: Arc<FallbackAddressStore>,
}

impl FallbackListener {
    pub fn new(store: FallbackAddressStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Binds `addr` and serves until the listener fails.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| FexecError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves updates on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        tracing::info!(
            "Fallback listener on {}",
            listener
                .local_addr()
                .map_err(|e| FexecError::Transport(format!("Failed to get local address: {}", e)))?
        );

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Failed to accept fallback connection: {}", e);
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let store = Arc::clone(&self.store);

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let store = Arc::clone(&store);
                    async move { Self::handle_request(store, req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::debug!("Error serving fallback connection from {}: {}", peer, err);
                }
            });
        }
    }

    async fn handle_request(
        store: Arc<FallbackAddressStore>,
        req: HyperRequest,
    ) -> std::result::Result<HyperResponse, FexecError> {
        if req.method() != Method::POST {
            return Ok(HttpTransport::empty_response(StatusCode::METHOD_NOT_ALLOWED));
        }

        let body = HttpTransport::read_body(req).await?;
        let update: FallbackUpdate = match HttpTransport::parse_json(&body) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!("Rejected malformed fallback update: {}", e);
                return Ok(HttpTransport::json_response(
                    StatusCode::BAD_REQUEST,
                    &FallbackUpdateAck::failed(),
                ));
            }
        };

        let addresses = update.fallback_addresses;
        let written = tokio::task::spawn_blocking(move || {
            let written = store.replace(&addresses);
            (written, addresses)
        })
        .await
        .map_err(|e| FexecError::Io(std::io::Error::other(e)))?;

        match written {
            (Ok(_), addresses) => {
                tracing::info!("Fallback nodes acquired: {:?}", addresses);
                Ok(HttpTransport::json_response(StatusCode::OK, &FallbackUpdateAck::ok()))
            }
            (Err(e), _) => {
                tracing::error!("Failed to store fallback nodes: {}", e);
                Ok(HttpTransport::json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &FallbackUpdateAck::failed(),
                ))
            }
        }
    }
}
