//! Client configuration.
//!
//! Everything has a default, so an empty JSON object is a valid config:
//!
//! ```
//! use crudfs_client::config::ClientConfig;
//!
//! let config = ClientConfig::from_json_str(r#"{ "server_addr": "10.0.0.2:19876" }"#).unwrap();
//! assert_eq!(config.server_addr, "10.0.0.2:19876");
//! assert_eq!(config.table_oid, 0);
//! assert!(config.io_timeout().is_none());
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CrudError, Result};
use crate::protocol::TABLE_OID;

/// Default object store address.
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:19876";

/// Environment variable overriding `server_addr`.
pub const ENV_SERVER_ADDR: &str = "CRUD_SERVER_ADDR";

/// Environment variable setting `io_timeout_ms`.
pub const ENV_IO_TIMEOUT_MS: &str = "CRUD_IO_TIMEOUT_MS";

/// Connection and session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// `host:port` of the object store, resolved once per connection.
    pub server_addr: String,
    /// OID the file table lives at when no format has run in this session.
    pub table_oid: u32,
    /// Per-exchange deadline in milliseconds. Absent means wait forever.
    pub io_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            table_oid: TABLE_OID,
            io_timeout_ms: None,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CrudError::Config(e.to_string()))
    }

    /// Read and parse a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CrudError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Defaults overridden by `CRUD_SERVER_ADDR` and `CRUD_IO_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ENV_SERVER_ADDR) {
            self.server_addr = addr;
        }
        if let Some(ms) = lookup(ENV_IO_TIMEOUT_MS) {
            let ms = ms.trim().parse::<u64>().map_err(|e| {
                CrudError::Config(format!("{}={:?}: {}", ENV_IO_TIMEOUT_MS, ms, e))
            })?;
            self.io_timeout_ms = Some(ms);
        }
        Ok(self)
    }

    /// Per-exchange deadline, if any.
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }
}
