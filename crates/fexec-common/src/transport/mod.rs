//! fexec Transport Layer
//!
//! Both sidecar endpoints speak JSON over HTTP/1.1. This module holds the
//! hyper helpers they share and the outbound poster used to forward results
//! to fallback nodes.

pub mod http;

pub use hyper::body::Bytes;
pub use http::{HttpPoster, HttpTransport, HyperRequest, HyperResponse};
