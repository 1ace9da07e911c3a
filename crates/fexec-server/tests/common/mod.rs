//! Helpers shared by the sidecar integration tests.

#![allow(dead_code)]

use fexec_common::transport::{Bytes, HttpTransport, HyperRequest, HyperResponse};
use fexec_common::FallbackUpdateAck;
use fexec_server::registry::{BuiltinLoader, HandlerRegistry, Module};
use fexec_server::{ExecutorConfig, Sidecar};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

/// How long the `slow.handler` test handler takes.
pub const SLOW_HANDLER: Duration = Duration::from_millis(500);

// ============================================================================
// Sidecar
// ============================================================================

pub struct RunningSidecar {
    pub invoke_addr: SocketAddr,
    pub fallback_addr: SocketAddr,
}

impl RunningSidecar {
    pub fn invoke_url(&self) -> String {
        format!("http://{}", self.invoke_addr)
    }

    pub fn fallback_url(&self) -> String {
        format!("http://{}", self.fallback_addr)
    }
}

/// Registry with the standard modules plus a few test handlers.
pub fn test_registry() -> HandlerRegistry {
    HandlerRegistry::new(BuiltinLoader::standard().with_module("testing", || {
        Module::new("testing")
            .with_function("context", |_, context| Ok(context.clone()))
            .with_function("fail", |_, _| Err("refused".into()))
    }).with_module("slow", || {
        Module::new("slow").with_function("handler", |params, _| {
            std::thread::sleep(SLOW_HANDLER);
            Ok(json!({ "Echo": params.clone() }))
        })
    }))
}

/// Starts a sidecar on ephemeral ports using `fallback_file`.
pub async fn start_sidecar(fallback_file: &Path) -> RunningSidecar {
    let invocation = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let fallback = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let running = RunningSidecar {
        invoke_addr: invocation.local_addr().unwrap(),
        fallback_addr: fallback.local_addr().unwrap(),
    };

    let config = ExecutorConfig::new()
        .with_fallback_file(fallback_file)
        .with_delivery_timeout(Duration::from_millis(500))
        .with_context(json!({"tenant": "acme"}));
    let sidecar = Sidecar::new(config).with_registry(Arc::new(test_registry()));
    tokio::spawn(sidecar.serve(invocation, fallback));

    running
}

// ============================================================================
// Fallback node stand-in
// ============================================================================

/// A fake fallback node that records every request it receives.
pub struct Recorder {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<(String, Bytes)>>>,
}

impl Recorder {
    /// Address as it would appear in a fallback list.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// `(path, body)` of every request received so far.
    pub fn received(&self) -> Vec<(String, Bytes)> {
        self.received.lock().unwrap().clone()
    }

    /// Waits until at least `count` requests arrived.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.received.lock().unwrap().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.received.lock().unwrap().len() >= count
    }
}

pub async fn start_recorder() -> Recorder {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));

    let store = Arc::clone(&received);
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let service = service_fn(move |req: HyperRequest| {
                    let store = Arc::clone(&store);
                    async move {
                        let path = req.uri().path().to_string();
                        let body = HttpTransport::read_body(req).await.unwrap_or_default();
                        store.lock().unwrap().push((path, body));
                        Ok::<HyperResponse, Infallible>(HttpTransport::json_response(
                            StatusCode::OK,
                            &FallbackUpdateAck::ok(),
                        ))
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    Recorder { addr, received }
}

/// An address nothing listens on.
pub fn unreachable_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

// ============================================================================
// Migrating caller
// ============================================================================

/// Sends an invocation, then resets the connection while the handler runs,
/// the way a caller looks to the sidecar after the container moved.
pub async fn invoke_and_reset(addr: SocketAddr, body: &str) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "POST /invoke HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        addr,
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();

    // Let the sidecar read the request before tearing the connection down.
    tokio::time::sleep(SLOW_HANDLER / 5).await;

    socket2::SockRef::from(&stream)
        .set_linger(Some(Duration::ZERO))
        .unwrap();
    drop(stream);
}
