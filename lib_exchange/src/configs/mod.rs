//! # Configuration Modules
//!
//! Explicit configuration context objects, deserialized from JSON.

/// Ring, socket and persistence settings for one exchange.
pub mod exchange_config;
