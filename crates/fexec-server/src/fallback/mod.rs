//! Migration fallback
//!
//! - [`store`]: the persisted fallback address list
//! - [`listener`]: endpoint the orchestrator pushes new lists to
//! - [`delivery`]: forwards a result the caller can no longer receive

pub mod delivery;
pub mod listener;
pub mod store;

pub use delivery::{DeliveryOutcome, FallbackDelivery, DEFAULT_ATTEMPT_TIMEOUT};
pub use listener::FallbackListener;
pub use store::{FallbackAddressStore, DEFAULT_FALLBACK_FILE};
