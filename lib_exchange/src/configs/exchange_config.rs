//! # Exchange Configuration
//!
//! Explicit configuration context for one exchange. It is built once at
//! startup (defaults, then an optional JSON file) and passed by reference to
//! every constructor that needs it; nothing in the crate reads global state.
//!
//! ```json
//! {
//!   "name": "sensors",
//!   "ring": { "capacity": 4096, "overflow": "file", "expireAfterMs": 60000 },
//!   "socket": { "pendingQueueCapacity": 1024 },
//!   "persistence": { "dir": "./spill", "prefix": "sensors", "fileCount": 8 }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::ring_store::{OverflowPolicy, RING_MAX_CAPACITY};
use crate::core::rules::DEFAULT_MAX_RULES_PER_PHASE;
use crate::core::socket::DEFAULT_PENDING_QUEUE_CAPACITY;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Ring store section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RingConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
    /// Added to the publish time to stamp each slot's expiry. 0 disables stamping.
    pub expire_after_ms: u64,
    pub max_rules_per_phase: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            overflow: OverflowPolicy::None,
            expire_after_ms: 0,
            max_rules_per_phase: DEFAULT_MAX_RULES_PER_PHASE,
        }
    }
}

/// Socket section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocketConfig {
    pub pending_queue_capacity: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            pending_queue_capacity: DEFAULT_PENDING_QUEUE_CAPACITY,
        }
    }
}

/// Overflow spill section, required by the `file` overflow policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceConfig {
    pub dir: PathBuf,
    pub prefix: String,
    pub ext: String,
    /// Produced files retained on disk; older ones are deleted.
    pub file_count: usize,
    /// Payload bytes per produced file before splitting. 0 keeps a batch in one file.
    pub file_size: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./spill"),
            prefix: "exchange".to_string(),
            ext: "col".to_string(),
            file_count: 8,
            file_size: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExchangeConfig {
    pub name: String,
    pub ring: RingConfig,
    pub socket: SocketConfig,
    pub persistence: Option<PersistenceConfig>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            name: "exchange".to_string(),
            ring: RingConfig::default(),
            socket: SocketConfig::default(),
            persistence: None,
        }
    }
}

impl ExchangeConfig {
    /// Parses and validates a JSON document. Missing fields take defaults.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: ExchangeConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        log::debug!("Loaded exchange configuration from {}", path.display());
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring.capacity == 0 || self.ring.capacity >= RING_MAX_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "ring.capacity must be in 1..{}, got {}",
                RING_MAX_CAPACITY, self.ring.capacity
            )));
        }
        if self.ring.max_rules_per_phase == 0 {
            return Err(ConfigError::Invalid("ring.maxRulesPerPhase must be positive".to_string()));
        }
        if self.socket.pending_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "socket.pendingQueueCapacity must be positive".to_string(),
            ));
        }
        match &self.persistence {
            None if self.ring.overflow == OverflowPolicy::File => Err(ConfigError::Invalid(
                "ring.overflow = file requires a persistence section".to_string(),
            )),
            Some(p) if p.file_count == 0 => Err(ConfigError::Invalid(
                "persistence.fileCount must be positive".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
