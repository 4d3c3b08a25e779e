//! # Ring Store
//!
//! Fixed-capacity circular buffer of keyed messages with a configurable
//! overflow policy and four rule hook phases.
//!
//! ## Bookkeeping
//!
//! `head` is the slot of the oldest message, `tail` the slot the next enqueue
//! writes, and `size` the number of live messages. At all times
//! `tail == (head + size) % capacity` and a slot is occupied iff its logical
//! offset from `head` is below `size`.
//!
//! ## Overflow
//!
//! When an enqueue finds the store full:
//!
//! | Policy   | Behavior                                                          |
//! |----------|-------------------------------------------------------------------|
//! | `None`   | fail with `BufferFull`                                            |
//! | `Drop`   | release every buffered message, then insert                       |
//! | `Return` | move every buffered message out to the caller, then insert        |
//! | `File`   | hand the whole batch to the persistence bridge, then insert       |
//!
//! The store is internally synchronized; every operation takes the store lock
//! for its whole duration, rule evaluation included.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::configs::exchange_config::RingConfig;
use crate::core::message::Message;
use crate::core::persistence::{FileDescriptor, PersistenceBridge, SpillTicket};
use crate::core::rules::{HookMask, HookPhase, Rule, RuleEngine, StoreView, DEFAULT_MAX_RULES_PER_PHASE};
use crate::error::{ExchangeError, Result};

/// Exclusive upper bound on ring store capacity.
pub const RING_MAX_CAPACITY: usize = 1 << 20;

/// A failed enqueue. `lost_keys` left the buffer before the failure.
#[derive(Debug)]
pub(crate) struct EnqueueFailure {
    pub(crate) error: ExchangeError,
    pub(crate) lost_keys: Vec<u64>,
}

impl From<ExchangeError> for EnqueueFailure {
    fn from(error: ExchangeError) -> Self {
        Self { error, lost_keys: Vec::new() }
    }
}

/// What an enqueue does when the store is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    #[default]
    None,
    Drop,
    Return,
    File,
}

impl FromStr for OverflowPolicy {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(OverflowPolicy::None),
            "drop" => Ok(OverflowPolicy::Drop),
            "return" => Ok(OverflowPolicy::Return),
            "file" => Ok(OverflowPolicy::File),
            other => Err(ExchangeError::InvalidArgument(format!(
                "unknown overflow policy '{}', expected none, drop, return or file",
                other
            ))),
        }
    }
}

/// Result of a successful enqueue.
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// Inserted without overflow.
    Stored,
    /// Store was full; the listed keys were released before inserting.
    Dropped(Vec<u64>),
    /// Store was full; the former contents, oldest first, now belong to the caller.
    Returned(Vec<Message>),
    /// Store was full; the former contents were handed to the persistence
    /// bridge. `ticket` resolves once the write completes.
    Spilled { keys: Vec<u64>, ticket: SpillTicket },
}

impl EnqueueOutcome {
    /// Keys that left the store because of this enqueue.
    pub fn evicted_keys(&self) -> Vec<u64> {
        match self {
            EnqueueOutcome::Stored => Vec::new(),
            EnqueueOutcome::Dropped(keys) => keys.clone(),
            EnqueueOutcome::Returned(messages) => messages.iter().map(|m| m.key).collect(),
            EnqueueOutcome::Spilled { keys, .. } => keys.clone(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    message: Message,
    expires_at: u64,
}

struct RingState {
    slots: Vec<Option<Slot>>,
    head: usize,
    tail: usize,
    size: usize,
    capacity: usize,
    rules: RuleEngine,
}

impl RingState {
    fn new(capacity: usize, max_rules_per_phase: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            size: 0,
            capacity,
            rules: RuleEngine::new(max_rules_per_phase),
        }
    }

    fn slot_of(&self, offset: usize) -> usize {
        (self.head + offset) % self.capacity
    }

    fn at(&self, offset: usize) -> Option<&Slot> {
        self.slots[self.slot_of(offset)].as_ref()
    }

    fn key_at(&self, offset: usize) -> u64 {
        self.at(offset).map(|s| s.message.key).unwrap_or_default()
    }

    fn live(&self) -> impl Iterator<Item = &Slot> + '_ {
        (0..self.size).filter_map(move |i| self.at(i))
    }

    fn view(&self) -> StoreView {
        StoreView {
            size: self.size,
            capacity: self.capacity,
            head: self.head,
            tail: self.tail,
            newest_key: self.size.checked_sub(1).map(|last| self.key_at(last)),
        }
    }

    fn push(&mut self, slot: Slot) -> usize {
        let at = self.tail;
        self.slots[at] = Some(slot);
        self.tail = (self.tail + 1) % self.capacity;
        self.size += 1;
        at
    }

    fn pop(&mut self) -> Option<Slot> {
        if self.size == 0 {
            return None;
        }
        let slot = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity;
        self.size -= 1;
        slot
    }

    /// Moves every live message out, oldest first, and resets the bookkeeping.
    fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.size);
        while let Some(slot) = self.pop() {
            out.push(slot.message);
        }
        self.head = 0;
        self.tail = 0;
        out
    }

    /// First logical offset whose key does not satisfy `pred`. Keys must be
    /// ascending over the live window.
    fn partition_point(&self, pred: impl Fn(u64) -> bool) -> usize {
        let (mut lo, mut hi) = (0, self.size);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if pred(self.key_at(mid)) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    fn clone_range(&self, from: usize, to: usize) -> Vec<Message> {
        (from..to).filter_map(|i| self.at(i)).map(|s| s.message.clone()).collect()
    }
}

/// A bounded, rule-guarded circular buffer of messages.
pub struct RingStore {
    state: Mutex<RingState>,
    policy: OverflowPolicy,
    expire_after_ms: u64,
    bridge: Option<PersistenceBridge>,
}

impl RingStore {
    /// Creates a store with no persistence bridge. `File` policy is rejected
    /// here; use `with_persistence` for it.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Result<Self> {
        Self::build(capacity, policy, 0, DEFAULT_MAX_RULES_PER_PHASE, None)
    }

    /// Creates a `File`-policy store whose overflow batches go to `bridge`.
    pub fn with_persistence(capacity: usize, bridge: PersistenceBridge) -> Result<Self> {
        Self::build(
            capacity,
            OverflowPolicy::File,
            0,
            DEFAULT_MAX_RULES_PER_PHASE,
            Some(bridge),
        )
    }

    /// Creates a store from its configuration section.
    pub fn from_config(config: &RingConfig, bridge: Option<PersistenceBridge>) -> Result<Self> {
        Self::build(
            config.capacity,
            config.overflow,
            config.expire_after_ms,
            config.max_rules_per_phase,
            bridge,
        )
    }

    fn build(
        capacity: usize,
        policy: OverflowPolicy,
        expire_after_ms: u64,
        max_rules_per_phase: usize,
        bridge: Option<PersistenceBridge>,
    ) -> Result<Self> {
        if capacity == 0 || capacity >= RING_MAX_CAPACITY {
            return Err(ExchangeError::InvalidArgument(format!(
                "ring capacity {} is outside 1..{}",
                capacity, RING_MAX_CAPACITY
            )));
        }
        if policy == OverflowPolicy::File && bridge.is_none() {
            return Err(ExchangeError::InvalidArgument(
                "file overflow policy requires a persistence bridge".to_string(),
            ));
        }

        log::debug!(
            "Ring store created: capacity={}, overflow={:?}, expire_after_ms={}",
            capacity,
            policy,
            expire_after_ms
        );
        Ok(Self {
            state: Mutex::new(RingState::new(capacity, max_rules_per_phase)),
            policy,
            expire_after_ms,
            bridge,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RingState> {
        self.state.lock().expect("RingStore lock poisoned")
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn len(&self) -> usize {
        self.lock().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot index of the oldest message.
    pub fn head(&self) -> usize {
        self.lock().head
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn expire_after_ms(&self) -> u64 {
        self.expire_after_ms
    }

    /// Snapshot of the bookkeeping, as rules see it.
    pub fn view(&self) -> StoreView {
        self.lock().view()
    }

    /// Keys of the live messages, oldest first.
    pub fn keys(&self) -> Vec<u64> {
        self.lock().live().map(|s| s.message.key).collect()
    }

    /// Expiry timestamp recorded for `key`, if it is buffered.
    pub fn expiry_of(&self, key: u64) -> Option<u64> {
        self.lock().live().find(|s| s.message.key == key).map(|s| s.expires_at)
    }

    /// Files produced so far by the persistence bridge, oldest first.
    pub fn produced_files(&self) -> Vec<FileDescriptor> {
        self.bridge.as_ref().map(PersistenceBridge::produced_files).unwrap_or_default()
    }

    /// Attaches `rule` to every phase in `mask`. See `RuleEngine::add_rule`.
    pub fn add_rule(&self, rule: Arc<dyn Rule>, mask: HookMask) -> Result<()> {
        self.lock().rules.add_rule(rule, mask)
    }

    /// # Enqueue
    ///
    /// 1. Pre-enqueue rules run; a failure aborts with nothing changed.
    /// 2. If full, the overflow policy runs (see module docs).
    /// 3. The message is written at `tail`.
    /// 4. Post-enqueue rules run. Their failures are logged and do not undo
    ///    the insert.
    pub fn enqueue(&self, message: Message, expires_at: u64) -> Result<EnqueueOutcome> {
        self.enqueue_tracked(message, expires_at).map_err(|f| f.error)
    }

    /// `enqueue`, keeping the keys an overflow already removed from the
    /// buffer when the enqueue then fails.
    pub(crate) fn enqueue_tracked(
        &self,
        message: Message,
        expires_at: u64,
    ) -> std::result::Result<EnqueueOutcome, EnqueueFailure> {
        let mut state = self.lock();

        let view = state.view();
        state.rules.evaluate(HookPhase::PreEnqueue, &view, Some(&message))?;

        let outcome = if state.size == state.capacity {
            self.overflow(&mut state)?
        } else {
            EnqueueOutcome::Stored
        };

        let at = state.push(Slot { message, expires_at });

        let view = state.view();
        let stored = state.slots[at].as_ref().map(|s| &s.message);
        if let Err(e) = state.rules.evaluate(HookPhase::PostEnqueue, &view, stored) {
            log::warn!("Post-enqueue rule failed, message kept: {}", e);
        }

        Ok(outcome)
    }

    fn overflow(&self, state: &mut RingState) -> std::result::Result<EnqueueOutcome, EnqueueFailure> {
        match self.policy {
            OverflowPolicy::None => {
                log::error!("Ring buffer is full ({} slots), overwrite is not allowed", state.capacity);
                Err(ExchangeError::BufferFull.into())
            }
            OverflowPolicy::Drop => {
                let keys: Vec<u64> = state.drain().into_iter().map(|m| m.key).collect();
                log::warn!("Ring buffer full, dropped {} buffered messages", keys.len());
                Ok(EnqueueOutcome::Dropped(keys))
            }
            OverflowPolicy::Return => {
                let messages = state.drain();
                log::debug!("Ring buffer full, returning {} messages to caller", messages.len());
                Ok(EnqueueOutcome::Returned(messages))
            }
            OverflowPolicy::File => {
                let bridge = self.bridge.as_ref().ok_or_else(|| {
                    ExchangeError::PersistenceDispatchFailed("no persistence bridge configured".to_string())
                })?;
                let messages = state.drain();
                let keys: Vec<u64> = messages.iter().map(|m| m.key).collect();
                let ticket = match bridge.dispatch(messages) {
                    Ok(ticket) => ticket,
                    Err(error) => {
                        log::error!("Ring buffer full, {} messages lost: {}", keys.len(), error);
                        return Err(EnqueueFailure { error, lost_keys: keys });
                    }
                };
                log::debug!("Ring buffer full, spilled {} messages to persistence", keys.len());
                Ok(EnqueueOutcome::Spilled { keys, ticket })
            }
        }
    }

    /// # Dequeue
    ///
    /// Pre-dequeue rules run with no message. The oldest message is removed,
    /// then post-dequeue rules run on it; their failures are logged only.
    pub fn dequeue(&self) -> Result<Message> {
        let mut state = self.lock();

        let view = state.view();
        state.rules.evaluate(HookPhase::PreDequeue, &view, None)?;

        let slot = state.pop().ok_or(ExchangeError::BufferEmpty)?;

        let view = state.view();
        if let Err(e) = state.rules.evaluate(HookPhase::PostDequeue, &view, Some(&slot.message)) {
            log::warn!("Post-dequeue rule failed: {}", e);
        }
        Ok(slot.message)
    }

    /// Linear search of the live window for an exact key.
    pub fn search_by_key(&self, key: u64) -> Option<Message> {
        self.lock()
            .live()
            .find(|s| s.message.key == key)
            .map(|s| s.message.clone())
    }

    /// # Fuzzy Range Search
    ///
    /// Returns every buffered message with `start <= key <= end`, in key
    /// order, using binary search over the ascending live window.
    ///
    /// Only valid while `head == 0`, i.e. before any dequeue has rotated the
    /// window; otherwise fails with `InvalidArgument`.
    pub fn search_range_fuzzy(&self, start: u64, end: u64) -> Result<Vec<Message>> {
        if start > end {
            return Err(ExchangeError::InvalidArgument(format!(
                "range start {} is after end {}",
                start, end
            )));
        }

        let state = self.lock();
        if state.head != 0 {
            return Err(ExchangeError::InvalidArgument(format!(
                "range search requires head at slot 0, head is {}",
                state.head
            )));
        }
        if state.size == 0 {
            return Err(ExchangeError::NotFound("ring buffer is empty".to_string()));
        }

        let first = state.key_at(0);
        let last = state.key_at(state.size - 1);
        if start > last || end < first {
            return Err(ExchangeError::NotFound(format!(
                "range [{}, {}] is outside buffered keys [{}, {}]",
                start, end, first, last
            )));
        }

        let from = state.partition_point(|k| k < start);
        let to = state.partition_point(|k| k <= end);
        if from >= to {
            return Err(ExchangeError::NotFound(format!("no keys buffered in [{}, {}]", start, end)));
        }
        Ok(state.clone_range(from, to))
    }

    /// # Search By Key And Count
    ///
    /// Locates `key`, then returns up to `count` consecutive messages starting
    /// there. The result is cut short at the newest message.
    pub fn search_by_key_count(&self, key: u64, count: usize) -> Result<Vec<Message>> {
        let state = self.lock();
        if count == 0 || count > state.size {
            return Err(ExchangeError::InvalidArgument(format!(
                "count {} is outside 1..={}",
                count, state.size
            )));
        }

        let pos = (0..state.size)
            .find(|i| state.key_at(*i) == key)
            .ok_or_else(|| ExchangeError::NotFound(format!("key {} is not buffered", key)))?;

        let to = (pos + count).min(state.size);
        Ok(state.clone_range(pos, to))
    }

    /// # Get And Clear
    ///
    /// Empties the store, handing back the oldest `count` messages. Anything
    /// beyond `count` is released.
    pub fn get_and_clear(&self, count: usize) -> Result<Vec<Message>> {
        let mut state = self.lock();
        if count == 0 || count > state.size {
            return Err(ExchangeError::InvalidArgument(format!(
                "count {} is outside 1..={}",
                count, state.size
            )));
        }

        let mut messages = state.drain();
        if messages.len() > count {
            log::debug!("get_and_clear released {} messages past the requested count", messages.len() - count);
            messages.truncate(count);
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rules::{FnRule, RuleError};

    fn store(capacity: usize, policy: OverflowPolicy) -> RingStore {
        RingStore::new(capacity, policy).unwrap()
    }

    fn fill(store: &RingStore, keys: &[u64]) {
        for k in keys {
            store.enqueue(Message::publish(*k, "t", "x"), 0).unwrap();
        }
    }

    #[test]
    fn rejects_bad_capacity() {
        assert!(RingStore::new(0, OverflowPolicy::None).is_err());
        assert!(RingStore::new(RING_MAX_CAPACITY, OverflowPolicy::None).is_err());
        assert!(matches!(
            RingStore::new(4, OverflowPolicy::File),
            Err(ExchangeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("DROP".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Drop);
        assert_eq!("file".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::File);
        assert!("overwrite".parse::<OverflowPolicy>().is_err());
    }

    #[test]
    fn fifo_and_wraparound() {
        let s = store(3, OverflowPolicy::None);
        fill(&s, &[1, 2, 3]);
        assert_eq!(s.dequeue().unwrap().key, 1);
        fill(&s, &[4]);

        let view = s.view();
        assert_eq!((view.head, view.tail, view.size), (1, 1, 3));
        assert_eq!(s.keys(), vec![2, 3, 4]);
        assert_eq!(s.dequeue().unwrap().key, 2);
        assert_eq!(s.dequeue().unwrap().key, 3);
        assert_eq!(s.dequeue().unwrap().key, 4);
        assert_eq!(s.dequeue().unwrap_err(), ExchangeError::BufferEmpty);
    }

    #[test]
    fn none_policy_fails_when_full() {
        let s = store(2, OverflowPolicy::None);
        fill(&s, &[1, 2]);
        let err = s.enqueue(Message::publish(3, "t", "x"), 0).unwrap_err();
        assert_eq!(err, ExchangeError::BufferFull);
        assert_eq!(s.keys(), vec![1, 2]);
    }

    #[test]
    fn drop_policy_releases_batch() {
        let s = store(2, OverflowPolicy::Drop);
        fill(&s, &[1, 2]);
        let outcome = s.enqueue(Message::publish(3, "t", "x"), 0).unwrap();
        assert!(matches!(&outcome, EnqueueOutcome::Dropped(keys) if keys == &vec![1, 2]));
        assert_eq!(s.keys(), vec![3]);
        assert_eq!(s.head(), 0);
    }

    #[test]
    fn return_policy_hands_batch_back() {
        let s = store(3, OverflowPolicy::Return);
        fill(&s, &[1, 2, 3]);
        s.dequeue().unwrap();
        fill(&s, &[4]);

        let outcome = s.enqueue(Message::publish(5, "t", "x"), 0).unwrap();
        match outcome {
            EnqueueOutcome::Returned(messages) => {
                assert_eq!(messages.iter().map(|m| m.key).collect::<Vec<_>>(), vec![2, 3, 4]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(s.keys(), vec![5]);
    }

    #[test]
    fn range_search() {
        let s = store(8, OverflowPolicy::None);
        fill(&s, &[10, 20, 30, 40, 50]);

        let keys = |r: Vec<Message>| r.iter().map(|m| m.key).collect::<Vec<_>>();
        assert_eq!(keys(s.search_range_fuzzy(15, 45).unwrap()), vec![20, 30, 40]);
        assert_eq!(keys(s.search_range_fuzzy(10, 50).unwrap()), vec![10, 20, 30, 40, 50]);
        assert_eq!(keys(s.search_range_fuzzy(30, 30).unwrap()), vec![30]);
        assert!(matches!(s.search_range_fuzzy(5, 9), Err(ExchangeError::NotFound(_))));
        assert!(matches!(s.search_range_fuzzy(60, 70), Err(ExchangeError::NotFound(_))));
        assert!(matches!(s.search_range_fuzzy(21, 29), Err(ExchangeError::NotFound(_))));
        assert!(matches!(s.search_range_fuzzy(45, 15), Err(ExchangeError::InvalidArgument(_))));
    }

    #[test]
    fn range_search_requires_unrotated_window() {
        let s = store(8, OverflowPolicy::None);
        fill(&s, &[10, 20, 30]);
        s.dequeue().unwrap();
        assert!(matches!(s.search_range_fuzzy(10, 30), Err(ExchangeError::InvalidArgument(_))));
    }

    #[test]
    fn key_count_search_truncates_at_newest() {
        let s = store(8, OverflowPolicy::None);
        fill(&s, &[1, 2, 3, 4]);
        let got = s.search_by_key_count(3, 4).unwrap();
        assert_eq!(got.iter().map(|m| m.key).collect::<Vec<_>>(), vec![3, 4]);
        assert!(matches!(s.search_by_key_count(3, 5), Err(ExchangeError::InvalidArgument(_))));
        assert!(matches!(s.search_by_key_count(9, 2), Err(ExchangeError::NotFound(_))));
        assert_eq!(s.search_by_key(2).unwrap().key, 2);
        assert!(s.search_by_key(9).is_none());
    }

    #[test]
    fn get_and_clear_empties_store() {
        let s = store(8, OverflowPolicy::None);
        fill(&s, &[1, 2, 3, 4]);
        let got = s.get_and_clear(2).unwrap();
        assert_eq!(got.iter().map(|m| m.key).collect::<Vec<_>>(), vec![1, 2]);
        assert!(s.is_empty());
        assert!(s.get_and_clear(1).is_err());
    }

    #[test]
    fn pre_enqueue_rejection_leaves_store_untouched() {
        let s = store(4, OverflowPolicy::None);
        s.add_rule(
            Arc::new(FnRule::new(
                |_, data: Option<&Message>, _| data.map(|m| m.key == 13).unwrap_or(false),
                |_, _, _| Err(RuleError::new("unlucky")),
            )),
            HookMask::PRE_ENQUEUE,
        )
        .unwrap();

        fill(&s, &[12]);
        let err = s.enqueue(Message::publish(13, "t", "x"), 0).unwrap_err();
        assert!(matches!(err, ExchangeError::RuleRejected { phase: HookPhase::PreEnqueue, .. }));
        assert_eq!(s.keys(), vec![12]);
    }

    #[test]
    fn post_hook_failures_do_not_undo() {
        let s = store(4, OverflowPolicy::None);
        s.add_rule(
            Arc::new(FnRule::new(|_, _, _| true, |_, _, _| Err(RuleError::new("audit down")))),
            HookMask::POST_ENQUEUE | HookMask::POST_DEQUEUE,
        )
        .unwrap();

        fill(&s, &[1]);
        assert_eq!(s.len(), 1);
        assert_eq!(s.dequeue().unwrap().key, 1);
    }

    #[test]
    fn pre_dequeue_rules_see_no_message() {
        let s = store(4, OverflowPolicy::None);
        s.add_rule(
            Arc::new(FnRule::new(
                |_, _, _| true,
                |view: &StoreView, data: Option<&Message>, _| {
                    if data.is_some() || view.size == 0 {
                        Err(RuleError::new("unexpected"))
                    } else {
                        Ok(())
                    }
                },
            )),
            HookMask::PRE_DEQUEUE,
        )
        .unwrap();

        fill(&s, &[1]);
        assert_eq!(s.dequeue().unwrap().key, 1);
    }

    #[test]
    fn pre_dequeue_rejection_leaves_store_unchanged() {
        let s = store(4, OverflowPolicy::None);
        fill(&s, &[1, 2]);
        s.add_rule(
            Arc::new(FnRule::new(|_, _, _| true, |_, _, _| Err(RuleError::new("paused")))),
            HookMask::PRE_DEQUEUE,
        )
        .unwrap();

        let err = s.dequeue().unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::RuleRejected { phase: HookPhase::PreDequeue, .. }
        ));
        assert_eq!(s.len(), 2);
        assert_eq!(s.keys(), vec![1, 2]);
        assert_eq!(s.head(), 0);
    }

    #[test]
    fn records_expiry() {
        let s = store(4, OverflowPolicy::None);
        s.enqueue(Message::publish(1, "t", "x"), 1_500).unwrap();
        assert_eq!(s.expiry_of(1), Some(1_500));
        assert_eq!(s.expiry_of(2), None);
    }
}
