use clap::Parser;
use lib_exchange::{ConfigError, ExchangeConfig, OverflowPolicy, PersistenceConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "MQTT exchange buffering server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "EXCHANGE_PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "EXCHANGE_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "EXCHANGE_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "EXCHANGE_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "EXCHANGE_NAME", help = "Name of the exchange, used in log lines.")]
    pub name: Option<String>,

    #[clap(long, env = "EXCHANGE_CAPACITY", help = "Ring buffer capacity in messages.")]
    pub capacity: Option<usize>,

    #[clap(long, env = "EXCHANGE_OVERFLOW", help = "Overflow policy when the ring is full (none, drop, return, file).")]
    pub overflow: Option<OverflowPolicy>,

    #[clap(long, env = "EXCHANGE_EXPIRE_AFTER_MS", help = "Expiry stamped on each message, in milliseconds after publish. 0 disables.")]
    pub expire_after_ms: Option<u64>,

    #[clap(long, env = "EXCHANGE_PENDING_QUEUE_CAPACITY", help = "Maximum sends queued behind the in-flight one.")]
    pub pending_queue_capacity: Option<usize>,

    #[clap(long, env = "EXCHANGE_SPILL_DIR", help = "Directory for spilled batches (file overflow policy).")]
    pub spill_dir: Option<PathBuf>,

    #[clap(long, env = "EXCHANGE_SPILL_PREFIX", help = "File name prefix for spilled batches.")]
    pub spill_prefix: Option<String>,

    #[clap(long, env = "EXCHANGE_SPILL_FILE_COUNT", help = "Spilled files retained on disk.")]
    pub spill_file_count: Option<usize>,

    #[clap(long, env = "EXCHANGE_SPILL_FILE_SIZE", help = "Payload bytes per spilled file before splitting. 0 keeps a batch in one file.")]
    pub spill_file_size: Option<u64>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            name: other.name.or(self.name),
            capacity: other.capacity.or(self.capacity),
            overflow: other.overflow.or(self.overflow),
            expire_after_ms: other.expire_after_ms.or(self.expire_after_ms),
            pending_queue_capacity: other.pending_queue_capacity.or(self.pending_queue_capacity),
            spill_dir: other.spill_dir.or(self.spill_dir),
            spill_prefix: other.spill_prefix.or(self.spill_prefix),
            spill_file_count: other.spill_file_count.or(self.spill_file_count),
            spill_file_size: other.spill_file_size.or(self.spill_file_size),
        }
    }

    fn defaults() -> Config {
        let exchange = ExchangeConfig::default();
        Config {
            port: Some(9003),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            name: Some(exchange.name),
            capacity: Some(exchange.ring.capacity),
            overflow: Some(exchange.ring.overflow),
            expire_after_ms: Some(exchange.ring.expire_after_ms),
            pending_queue_capacity: Some(exchange.socket.pending_queue_capacity),
            ..Default::default()
        }
    }

    /// Builds the library configuration from the merged settings. A spill
    /// section is produced when any spill option is set or the overflow
    /// policy is `file`.
    pub fn exchange_config(&self) -> Result<ExchangeConfig, ConfigError> {
        let mut config = ExchangeConfig::default();
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(capacity) = self.capacity {
            config.ring.capacity = capacity;
        }
        if let Some(overflow) = self.overflow {
            config.ring.overflow = overflow;
        }
        if let Some(expire_after_ms) = self.expire_after_ms {
            config.ring.expire_after_ms = expire_after_ms;
        }
        if let Some(pending) = self.pending_queue_capacity {
            config.socket.pending_queue_capacity = pending;
        }

        let wants_spill = config.ring.overflow == OverflowPolicy::File
            || self.spill_dir.is_some()
            || self.spill_prefix.is_some()
            || self.spill_file_count.is_some()
            || self.spill_file_size.is_some();
        if wants_spill {
            let mut spill = PersistenceConfig {
                prefix: config.name.clone(),
                ..Default::default()
            };
            if let Some(dir) = &self.spill_dir {
                spill.dir = dir.clone();
            }
            if let Some(prefix) = &self.spill_prefix {
                spill.prefix = prefix.clone();
            }
            if let Some(count) = self.spill_file_count {
                spill.file_count = count;
            }
            if let Some(size) = self.spill_file_size {
                spill.file_size = size;
            }
            config.persistence = Some(spill);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Layers built-in defaults, the optional JSON file and CLI/env overrides.
pub fn load_config() -> Config {
    // 1. Load defaults
    let default_config = Config::defaults();

    // 2. Load from config file (server_exchange.conf) if present.
    //    Allow overriding default config file path with CLI arg.
    let cli_args = Config::parse();

    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("server_exchange.conf"));

    let mut current_config = default_config;

    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
                Ok(file_config) => current_config = current_config.merge(file_config),
                Err(e) => log::warn!(
                    "Failed to parse config file {}: {}. Falling back to other sources.",
                    config_file_path.display(),
                    e
                ),
            },
            Err(e) => log::warn!(
                "Failed to read config file {}: {}. Falling back to other sources.",
                config_file_path.display(),
                e
            ),
        }
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    // 3. Override with environment variables and CLI arguments
    current_config.merge(cli_args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_win() {
        let file = Config {
            capacity: Some(64),
            overflow: Some(OverflowPolicy::Drop),
            ..Default::default()
        };
        let cli = Config {
            capacity: Some(128),
            ..Default::default()
        };
        let merged = Config::defaults().merge(file).merge(cli);
        assert_eq!(merged.capacity, Some(128));
        assert_eq!(merged.overflow, Some(OverflowPolicy::Drop));
        assert_eq!(merged.port, Some(9003));
    }

    #[test]
    fn file_policy_gets_spill_section() {
        let config = Config {
            overflow: Some(OverflowPolicy::File),
            spill_file_count: Some(2),
            ..Config::defaults()
        };
        let exchange = config.exchange_config().unwrap();
        let spill = exchange.persistence.unwrap();
        assert_eq!(spill.file_count, 2);
        assert_eq!(spill.prefix, "exchange");
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let config = Config {
            capacity: Some(0),
            ..Config::defaults()
        };
        assert!(config.exchange_config().is_err());
    }

    #[test]
    fn parses_camel_case_file() {
        let file: Config = serde_json::from_str(r#"{ "port": 7000, "overflow": "return", "spillDir": "/tmp/x" }"#).unwrap();
        assert_eq!(file.port, Some(7000));
        assert_eq!(file.overflow, Some(OverflowPolicy::Return));
        assert_eq!(file.spill_dir, Some(PathBuf::from("/tmp/x")));
    }
}
