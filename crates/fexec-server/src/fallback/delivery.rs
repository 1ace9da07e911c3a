use fexec_common::protocol::error::{FexecError, Result};
use fexec_common::protocol::{DEFAULT_RECEIVE_PORT, RECEIVE_PATH};
use fexec_common::transport::{Bytes, HttpPoster};
use std::net::{Ipv6Addr, SocketAddr};
use std::time::Duration;

use super::store::FallbackAddressStore;

/// Default bound on one forwarding attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3);

/// How a forwarding run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A fallback node accepted the result after `attempts` tries.
    Delivered { address: String, attempts: usize },
    /// Every listed node failed, or none was listed. The result is lost.
    Exhausted { attempts: usize },
}

/// Forwards results whose original caller has gone away.
///
/// The address list is re-read from the store on every run, so an update
/// received by the fallback listener applies to the next delivery.
pub struct FallbackDelivery {
    store: FallbackAddressStore,
    poster: HttpPoster,
    receive_port: u16,
    attempt_timeout: Duration,
}

impl FallbackDelivery {
    pub fn new(store: FallbackAddressStore) -> Self {
        Self {
            store,
            poster: HttpPoster::new(),
            receive_port: DEFAULT_RECEIVE_PORT,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Port used for addresses that do not name one.
    pub fn with_receive_port(mut self, port: u16) -> Self {
        self.receive_port = port;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// URL a result is posted to for `address`.
    ///
    /// A bare host gets the configured receive port; `host:port` is used as
    /// given.
    pub fn receive_url(&self, address: &str) -> String {
        if has_port(address) {
            format!("http://{}{}", address, RECEIVE_PATH)
        } else if address.parse::<Ipv6Addr>().is_ok() {
            format!("http://[{}]:{}{}", address, self.receive_port, RECEIVE_PATH)
        } else {
            format!("http://{}:{}{}", address, self.receive_port, RECEIVE_PATH)
        }
    }

    /// Tries each listed node in order until one accepts `payload`.
    ///
    /// Never fails: an exhausted list is reported through the outcome.
    pub async fn deliver(&self, payload: Bytes) -> DeliveryOutcome {
        let addresses = match self.store.load() {
            Ok(addresses) => addresses,
            Err(e) => {
                tracing::error!("Cannot read fallback addresses from {}: {}", self.store.path().display(), e);
                Vec::new()
            }
        };

        if addresses.is_empty() {
            tracing::warn!("No fallback nodes known; result dropped");
            return DeliveryOutcome::Exhausted { attempts: 0 };
        }

        for (index, address) in addresses.iter().enumerate() {
            match self.attempt(address, payload.clone()).await {
                Ok(()) => {
                    tracing::info!("Result delivered to fallback node {}", address);
                    return DeliveryOutcome::Delivered {
                        address: address.clone(),
                        attempts: index + 1,
                    };
                }
                Err(e) => tracing::warn!("{}", e),
            }
        }

        tracing::error!("All {} fallback nodes failed; result dropped", addresses.len());
        DeliveryOutcome::Exhausted {
            attempts: addresses.len(),
        }
    }

    /// One attempt. Any HTTP response counts as accepted.
    async fn attempt(&self, address: &str, payload: Bytes) -> Result<()> {
        let url = self.receive_url(address);
        match self.poster.post_json(&url, payload, self.attempt_timeout).await {
            Ok((status, _)) => {
                if !status.is_success() {
                    tracing::warn!("Fallback node {} answered {}", address, status);
                }
                Ok(())
            }
            Err(e) => Err(FexecError::FallbackDelivery {
                address: address.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

fn has_port(address: &str) -> bool {
    if address.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match address.rsplit_once(':') {
        Some((host, port)) => !host.contains(':') && port.parse::<u16>().is_ok(),
        None => false,
    }
}
