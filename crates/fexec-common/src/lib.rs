//! fexec Common Types and Transport
//!
//! This crate provides the wire protocol and HTTP transport helpers shared by
//! the fexec function executor sidecar, its client and its command-line tool.
//!
//! # Overview
//!
//! The sidecar runs next to a function container and exposes two endpoints:
//!
//! - **Invocation endpoint**: resolves a `module.function` handler, invokes it
//!   and replies with an [`InvocationResponse`]
//! - **Fallback listener**: receives the ordered list of fallback nodes the
//!   response is forwarded to when the original caller connection is lost
//!   because the container migrated
//!
//! # Components
//!
//! - [`protocol`] - Request/response types and the error taxonomy
//! - [`transport`] - hyper helpers for JSON bodies and outbound posts
//!
//! # Example
//!
//! ```
//! use fexec_common::{InvocationRequest, InvocationResponse};
//! use serde_json::json;
//!
//! let request = InvocationRequest::new("isprime.handler", json!({"n": "17"}));
//! let response = InvocationResponse::success(request.id.clone(), &json!({"IsPrime": true})).unwrap();
//! assert!(response.success);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
