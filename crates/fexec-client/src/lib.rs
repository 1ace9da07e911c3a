//! fexec Client
//!
//! Async client for the sidecar's invocation endpoint and fallback listener.

pub mod client;

pub use client::ExecutorClient;
