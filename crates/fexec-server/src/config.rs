use fexec_common::protocol::error::{FexecError, Result};
use fexec_common::protocol::DEFAULT_RECEIVE_PORT;
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::fallback::{DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_FALLBACK_FILE};

/// Default invocation port. The fallback listener uses the next one.
pub const DEFAULT_PORT: u16 = 8080;

/// Environment variable holding the execution context as JSON.
pub const CONTEXT_ENV: &str = "CONTEXT";

/// Sidecar settings.
///
/// # Example
///
/// ```
/// use fexec_server::ExecutorConfig;
///
/// let config = ExecutorConfig::new().with_port(9000);
/// assert_eq!(config.fallback_listener_addr().unwrap().port(), 9001);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    pub host: IpAddr,
    pub port: u16,
    pub fallback_file: PathBuf,
    /// Port used for fallback addresses that do not name one
    pub receive_port: u16,
    /// Bound on one forwarding attempt
    pub delivery_timeout: Duration,
    /// Value handed to every handler call
    pub context: Value,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            fallback_file: PathBuf::from(DEFAULT_FALLBACK_FILE),
            receive_port: DEFAULT_RECEIVE_PORT,
            delivery_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            context: Value::Object(Default::default()),
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_fallback_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.fallback_file = path.into();
        self
    }

    pub fn with_receive_port(mut self, port: u16) -> Self {
        self.receive_port = port;
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Loads the context from the `CONTEXT` environment variable.
    pub fn with_context_from_env(self) -> Result<Self> {
        Ok(self.with_context(context_from_env()?))
    }

    pub fn invocation_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Fallback listener address: same host, invocation port + 1.
    ///
    /// Port 0 (pick any) stays 0 for both endpoints.
    pub fn fallback_listener_addr(&self) -> Result<SocketAddr> {
        let port = match self.port {
            0 => 0,
            port => port.checked_add(1).ok_or_else(|| {
                FexecError::Config(format!("Port {} leaves no room for the fallback listener", port))
            })?,
        };
        Ok(SocketAddr::new(self.host, port))
    }

    /// Checks the settings before anything is bound.
    pub fn validate(&self) -> Result<()> {
        self.fallback_listener_addr()?;
        if self.delivery_timeout.is_zero() {
            return Err(FexecError::Config("Delivery timeout must be positive".into()));
        }
        if self.fallback_file.as_os_str().is_empty() {
            return Err(FexecError::Config("Fallback file path is empty".into()));
        }
        Ok(())
    }
}

/// Reads the execution context from `CONTEXT`.
pub fn context_from_env() -> Result<Value> {
    parse_context(std::env::var(CONTEXT_ENV).ok().as_deref())
}

/// Parses a raw context value. Absent or blank means an empty mapping.
pub fn parse_context(raw: Option<&str>) -> Result<Value> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Value::Object(Default::default())),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| FexecError::Config(format!("{} is not valid JSON: {}", CONTEXT_ENV, e))),
    }
}
