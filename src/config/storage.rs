//! Trade journal configuration.

use serde::Deserialize;

/// Where terminal trade attempts are journaled.
///
/// Only execution outcomes are written; quotes and snapshots never are.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub enabled: bool,
    /// SQLite database file, created if missing.
    pub path: Option<String>,
    /// Pool size; the journal writes at most once per settled trade.
    pub max_connections: Option<u32>,
}
