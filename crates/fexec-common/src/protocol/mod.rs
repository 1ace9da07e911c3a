pub mod error;
pub mod fallback;
pub mod invocation;

#[cfg(test)]
mod tests;

pub use error::{FexecError, Result};
pub use fallback::{FallbackUpdate, FallbackUpdateAck, DEFAULT_RECEIVE_PORT, RECEIVE_PATH};
pub use invocation::{HandlerReference, InvocationRequest, InvocationResponse};
