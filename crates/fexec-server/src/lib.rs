//! fexec Server
//!
//! The function executor sidecar. It resolves handlers by name, runs them
//! with caller parameters and a fixed execution context, and makes sure a
//! finished result is not lost when the container migrates while the reply
//! is in flight.
//!
//! # Components
//!
//! - **[`registry`]**: handler lookup with a process-lifetime module cache
//! - **[`capture`]**: standard stream capture around a single call
//! - **[`executor`]**: runs one invocation and shapes its response
//! - **[`http_server`]**: the invocation endpoint
//! - **[`fallback`]**: address store, update listener and result forwarding
//! - **[`sidecar`]**: runs both endpoints together
//!
//! # Example
//!
//! ```no_run
//! use fexec_server::{ExecutorConfig, Sidecar};
//!
//! #[tokio::main]
//! async fn main() -> fexec_common::Result<()> {
//!     let config = ExecutorConfig::new().with_context_from_env()?;
//!     Sidecar::new(config).run().await
//! }
//! ```

pub mod capture;
pub mod config;
pub mod executor;
pub mod fallback;
pub mod http_server;
pub mod registry;
pub mod sidecar;

pub use config::ExecutorConfig;
pub use executor::Executor;
pub use http_server::InvocationServer;
pub use registry::HandlerRegistry;
pub use sidecar::Sidecar;
