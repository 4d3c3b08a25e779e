//! # Exchange Core
//!
//! Glue between a socket's `DedupIndex` and one `RingStore`. Publishes are
//! deduplicated on the way in and overflow evictions are removed from the
//! index on the way out, so the index never serves a message that has left
//! the live buffer through an overflow path.

use std::sync::Arc;

use crate::configs::exchange_config::ExchangeConfig;
use crate::core::dedup::{dedup_key, DedupIndex};
use crate::core::message::Message;
use crate::core::persistence::{PersistenceBridge, SpillTicket};
use crate::core::ring_store::{EnqueueOutcome, RingStore};
use crate::core::rules::{HookMask, Rule};
use crate::error::{ExchangeError, Result};

/// Successful publish result, handed back to the `send` caller.
#[derive(Debug)]
pub struct PublishAck {
    pub key: u64,
    pub outcome: EnqueueOutcome,
}

impl PublishAck {
    /// Messages returned by a `Return`-policy overflow, if this publish caused one.
    pub fn returned(&self) -> &[Message] {
        match &self.outcome {
            EnqueueOutcome::Returned(messages) => messages.as_slice(),
            _ => &[],
        }
    }

    /// Takes the spill ticket out of a `File`-policy overflow, if any.
    pub fn into_spill(self) -> Option<SpillTicket> {
        match self.outcome {
            EnqueueOutcome::Spilled { ticket, .. } => Some(ticket),
            _ => None,
        }
    }

    pub fn overflowed(&self) -> bool {
        !matches!(self.outcome, EnqueueOutcome::Stored)
    }
}

pub struct ExchangeCore {
    name: String,
    store: RingStore,
}

impl ExchangeCore {
    pub fn new(name: impl Into<String>, store: RingStore) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    /// Builds the store, and the persistence bridge when configured, from an
    /// already validated configuration.
    pub fn from_config(config: &ExchangeConfig) -> Result<Arc<Self>> {
        let bridge = config.persistence.as_ref().map(PersistenceBridge::from_config);
        let store = RingStore::from_config(&config.ring, bridge)?;
        log::info!(
            "Exchange '{}' ready: capacity={}, overflow={:?}",
            config.name,
            config.ring.capacity,
            config.ring.overflow
        );
        Ok(Arc::new(Self::new(&config.name, store)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &RingStore {
        &self.store
    }

    pub fn add_rule(&self, rule: Arc<dyn Rule>, mask: HookMask) -> Result<()> {
        self.store.add_rule(rule, mask)
    }

    /// Expiry stamp for a message published now; 0 when expiry is disabled.
    fn expiry_stamp(&self) -> u64 {
        match self.store.expire_after_ms() {
            0 => 0,
            after => (chrono::Utc::now().timestamp_millis().max(0) as u64).saturating_add(after),
        }
    }

    /// # Handle Publish
    ///
    /// 1. Reject a key whose low 32 bits are already indexed.
    /// 2. Index the message.
    /// 3. Enqueue it into the ring store; on failure the index entry is
    ///    withdrawn and the message dropped, along with the entries of any
    ///    messages the failed overflow already took out of the buffer.
    /// 4. Withdraw index entries for every key the enqueue evicted.
    pub fn handle_publish(&self, dedup: &DedupIndex, message: Message) -> Result<PublishAck> {
        let key = message.key;

        if !dedup.insert(message.clone()) {
            log::error!("[{}] duplicate key {}, overwrite is not allowed", self.name, key);
            return Err(ExchangeError::DuplicateKey { key });
        }

        let outcome = match self.store.enqueue_tracked(message, self.expiry_stamp()) {
            Ok(outcome) => outcome,
            Err(failure) => {
                dedup.remove(key);
                if !failure.lost_keys.is_empty() {
                    dedup.remove_many(&failure.lost_keys);
                }
                log::error!("[{}] enqueue of key {} failed: {}", self.name, key, failure.error);
                return Err(failure.error);
            }
        };

        let mut evicted = outcome.evicted_keys();
        evicted.retain(|k| dedup_key(*k) != dedup_key(key));
        if !evicted.is_empty() {
            log::debug!("[{}] {} keys left the buffer on overflow", self.name, evicted.len());
            dedup.remove_many(&evicted);
        }

        log::trace!("[{}] published key {}", self.name, key);
        Ok(PublishAck { key, outcome })
    }

    /// # Handle Pull
    ///
    /// `count == 1` is served from the dedup index; larger counts read
    /// consecutive messages from the ring store starting at `key`.
    pub fn handle_pull(&self, dedup: &DedupIndex, key: u64, count: u32) -> Result<Vec<Message>> {
        match count {
            0 => Err(ExchangeError::InvalidArgument("pull count must be at least 1".to_string())),
            1 => dedup
                .get(key)
                .map(|m| vec![m])
                .ok_or_else(|| ExchangeError::NotFound(format!("key {} is not indexed", key))),
            n => self.store.search_by_key_count(key, n as usize),
        }
    }

    /// Inclusive key-range read. See `RingStore::search_range_fuzzy`.
    pub fn pull_range(&self, start: u64, end: u64) -> Result<Vec<Message>> {
        self.store.search_range_fuzzy(start, end)
    }

    /// Drains the store, returning its oldest `count` messages, and clears
    /// the dedup index.
    pub fn consume(&self, dedup: &DedupIndex, count: usize) -> Result<Vec<Message>> {
        let messages = self.store.get_and_clear(count)?;
        dedup.clear();
        log::debug!("[{}] consumed {} messages", self.name, messages.len());
        Ok(messages)
    }
}
