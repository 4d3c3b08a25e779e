//! Message-buffering core of an MQTT exchange.
//!
//! Producers publish keyed messages through an [`ExchangeSocket`]; the bound
//! [`ExchangeCore`] deduplicates them and buffers them in a [`RingStore`] with
//! a configurable overflow policy. Consumers pull by key or by key range.

pub mod configs;
pub mod core;
pub mod error;
#[cfg(feature = "loggers")]
pub mod loggers;

pub use crate::configs::exchange_config::{ConfigError, ExchangeConfig, PersistenceConfig, RingConfig, SocketConfig};
pub use crate::core::dedup::DedupIndex;
pub use crate::core::exchange::{ExchangeCore, PublishAck};
pub use crate::core::message::{Message, MessageKind, PullRequest, PullResponse};
pub use crate::core::persistence::{
    read_columnar_file, BatchWriter, ColumnarFileWriter, FileDescriptor, PersistenceBridge, SpillTicket, WriteBatch,
};
pub use crate::core::ring_store::{EnqueueOutcome, OverflowPolicy, RingStore, RING_MAX_CAPACITY};
pub use crate::core::rules::{FnRule, HookMask, HookPhase, MonotonicKeys, PayloadLimit, Rule, RuleEngine, RuleError, StoreView};
pub use crate::core::socket::{ExchangeSocket, SendTicket};
pub use crate::error::{ExchangeError, Result};
