//! # Dedup Index
//!
//! Hash index from message key to the buffered message, owned by an
//! `ExchangeSocket` and consulted by its exchange node.
//!
//! Entries are keyed by the **low 32 bits** of the 64-bit message key, so two
//! keys that differ only in their high half collide: the second one is
//! rejected as a duplicate even though the full keys differ.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::message::Message;

/// Index key for a full message key.
pub fn dedup_key(key: u64) -> u32 {
    key as u32
}

#[derive(Debug, Default)]
pub struct DedupIndex {
    entries: Mutex<HashMap<u32, Message>>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, Message>> {
        self.entries.lock().expect("DedupIndex lock poisoned")
    }

    /// Inserts `message` unless its truncated key is already present.
    /// Returns `false` on a duplicate, leaving the existing entry in place.
    pub fn insert(&self, message: Message) -> bool {
        let mut entries = self.lock();
        let slot = dedup_key(message.key);
        if entries.contains_key(&slot) {
            return false;
        }
        entries.insert(slot, message);
        true
    }

    pub fn contains(&self, key: u64) -> bool {
        self.lock().contains_key(&dedup_key(key))
    }

    pub fn get(&self, key: u64) -> Option<Message> {
        self.lock().get(&dedup_key(key)).cloned()
    }

    pub fn remove(&self, key: u64) -> Option<Message> {
        self.lock().remove(&dedup_key(key))
    }

    pub fn remove_many(&self, keys: &[u64]) {
        let mut entries = self.lock();
        for key in keys {
            entries.remove(&dedup_key(*key));
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Full keys of the indexed messages, ascending.
    pub fn keys(&self) -> Vec<u64> {
        let mut keys: Vec<u64> = self.lock().values().map(|m| m.key).collect();
        keys.sort_unstable();
        keys
    }
}
