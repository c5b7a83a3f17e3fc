//! Connection configuration knobs

use serde::{Deserialize, Serialize};

/// Tunables a connection consumes when building requests. Loading these
/// from the environment or a properties file is the caller's concern; the
/// struct is the narrow contract the core reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub user: String,
    pub database: Option<String>,
    /// Blocking-exchange timeout consumed by the transport; `None` waits
    /// indefinitely.
    pub operation_timeout_secs: Option<u64>,
    pub fetch_size: i32,
    pub batch_size: i16,
    pub traversal_depth: i16,
    /// 0 means no edge prefetch limit.
    pub edge_fetch_size: i16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            database: None,
            operation_timeout_secs: None,
            fetch_size: 1000,
            batch_size: 50,
            traversal_depth: 3,
            edge_fetch_size: 0,
        }
    }
}
