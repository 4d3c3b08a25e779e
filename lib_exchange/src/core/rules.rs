//! # Rule Hooks
//!
//! A ring store carries four ordered rule lists, one per lifecycle phase of
//! enqueue/dequeue. Each rule is a `(matches, apply)` pair:
//!
//! - rules run in registration order,
//! - a rule whose `matches` returns `false` is skipped,
//! - the first `apply` failure stops evaluation of that phase and becomes the
//!   error of the enclosing operation.
//!
//! Rules are evaluated while the store lock is held, so they see a consistent
//! `StoreView` but must not call back into the store.

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use thiserror::Error;

use crate::core::message::Message;
use crate::error::{ExchangeError, Result};

/// Default upper bound on rules per phase.
pub const DEFAULT_MAX_RULES_PER_PHASE: usize = 16;

/// The four extension points of a ring store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    PreEnqueue,
    PostEnqueue,
    PreDequeue,
    PostDequeue,
}

impl HookPhase {
    pub const ALL: [HookPhase; 4] = [
        HookPhase::PreEnqueue,
        HookPhase::PostEnqueue,
        HookPhase::PreDequeue,
        HookPhase::PostDequeue,
    ];

    fn index(self) -> usize {
        match self {
            HookPhase::PreEnqueue => 0,
            HookPhase::PostEnqueue => 1,
            HookPhase::PreDequeue => 2,
            HookPhase::PostDequeue => 3,
        }
    }

    fn bit(self) -> u8 {
        1 << self.index()
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookPhase::PreEnqueue => "pre-enqueue",
            HookPhase::PostEnqueue => "post-enqueue",
            HookPhase::PreDequeue => "pre-dequeue",
            HookPhase::PostDequeue => "post-dequeue",
        };
        f.write_str(name)
    }
}

/// Set of phases a rule is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HookMask(u8);

impl HookMask {
    pub const NONE: HookMask = HookMask(0);
    pub const PRE_ENQUEUE: HookMask = HookMask(1);
    pub const POST_ENQUEUE: HookMask = HookMask(1 << 1);
    pub const PRE_DEQUEUE: HookMask = HookMask(1 << 2);
    pub const POST_DEQUEUE: HookMask = HookMask(1 << 3);
    pub const ALL: HookMask = HookMask(0b1111);

    pub fn contains(self, phase: HookPhase) -> bool {
        self.0 & phase.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 & Self::ALL.0 == 0
    }

    /// Phases in this mask, in evaluation order.
    pub fn phases(self) -> impl Iterator<Item = HookPhase> {
        HookPhase::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl BitOr for HookMask {
    type Output = HookMask;

    fn bitor(self, rhs: HookMask) -> HookMask {
        HookMask(self.0 | rhs.0)
    }
}

impl From<HookPhase> for HookMask {
    fn from(phase: HookPhase) -> Self {
        HookMask(phase.bit())
    }
}

/// Read-only snapshot of ring store bookkeeping handed to rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreView {
    pub size: usize,
    pub capacity: usize,
    pub head: usize,
    pub tail: usize,
    /// Key of the most recently enqueued live message.
    pub newest_key: Option<u64>,
}

impl StoreView {
    pub fn is_full(&self) -> bool {
        self.size == self.capacity
    }
}

/// Failure reported by a rule action.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RuleError(pub String);

impl RuleError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// A pluggable rule evaluated at one or more hook phases.
///
/// `data` is the message being enqueued or the message just dequeued; it is
/// `None` for the pre-dequeue phase, where no message has been chosen yet.
pub trait Rule: Send + Sync {
    fn matches(&self, store: &StoreView, data: Option<&Message>, phase: HookPhase) -> bool;

    fn apply(&self, store: &StoreView, data: Option<&Message>, phase: HookPhase) -> std::result::Result<(), RuleError>;
}

/// Adapts a pair of closures into a `Rule`.
pub struct FnRule<M, A> {
    matcher: M,
    action: A,
}

impl<M, A> FnRule<M, A>
where
    M: Fn(&StoreView, Option<&Message>, HookPhase) -> bool + Send + Sync,
    A: Fn(&StoreView, Option<&Message>, HookPhase) -> std::result::Result<(), RuleError> + Send + Sync,
{
    pub fn new(matcher: M, action: A) -> Self {
        Self { matcher, action }
    }
}

impl<M, A> Rule for FnRule<M, A>
where
    M: Fn(&StoreView, Option<&Message>, HookPhase) -> bool + Send + Sync,
    A: Fn(&StoreView, Option<&Message>, HookPhase) -> std::result::Result<(), RuleError> + Send + Sync,
{
    fn matches(&self, store: &StoreView, data: Option<&Message>, phase: HookPhase) -> bool {
        (self.matcher)(store, data, phase)
    }

    fn apply(&self, store: &StoreView, data: Option<&Message>, phase: HookPhase) -> std::result::Result<(), RuleError> {
        (self.action)(store, data, phase)
    }
}

/// Rejects enqueues whose key is not strictly greater than the newest buffered key.
///
/// Range search assumes monotonically increasing keys; attach this at
/// pre-enqueue to enforce that assumption.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicKeys;

impl Rule for MonotonicKeys {
    fn matches(&self, store: &StoreView, data: Option<&Message>, phase: HookPhase) -> bool {
        phase == HookPhase::PreEnqueue && data.is_some() && store.newest_key.is_some()
    }

    fn apply(&self, store: &StoreView, data: Option<&Message>, _phase: HookPhase) -> std::result::Result<(), RuleError> {
        match (data, store.newest_key) {
            (Some(msg), Some(newest)) if msg.key <= newest => Err(RuleError::new(format!(
                "key {} does not follow newest key {}",
                msg.key, newest
            ))),
            _ => Ok(()),
        }
    }
}

/// Rejects messages whose payload exceeds `max_bytes`.
#[derive(Debug, Clone, Copy)]
pub struct PayloadLimit {
    pub max_bytes: usize,
}

impl Rule for PayloadLimit {
    fn matches(&self, _store: &StoreView, data: Option<&Message>, _phase: HookPhase) -> bool {
        data.is_some()
    }

    fn apply(&self, _store: &StoreView, data: Option<&Message>, _phase: HookPhase) -> std::result::Result<(), RuleError> {
        match data {
            Some(msg) if msg.len() > self.max_bytes => Err(RuleError::new(format!(
                "payload of {} bytes exceeds limit of {}",
                msg.len(),
                self.max_bytes
            ))),
            _ => Ok(()),
        }
    }
}

/// Ordered rule lists for the four hook phases.
pub struct RuleEngine {
    lists: [Vec<Arc<dyn Rule>>; 4],
    max_per_phase: usize,
}

impl RuleEngine {
    pub fn new(max_per_phase: usize) -> Self {
        Self {
            lists: [Vec::new(), Vec::new(), Vec::new(), Vec::new()],
            max_per_phase,
        }
    }

    /// # Add Rule
    ///
    /// Attaches `rule` to every phase in `mask`. Registration is all or
    /// nothing: if any targeted phase is already at `max_per_phase`, no list
    /// is modified.
    pub fn add_rule(&mut self, rule: Arc<dyn Rule>, mask: HookMask) -> Result<()> {
        if mask.is_empty() {
            return Err(ExchangeError::InvalidArgument("rule phase mask is empty".to_string()));
        }

        if let Some(full) = mask.phases().find(|p| self.lists[p.index()].len() >= self.max_per_phase) {
            log::error!("Rule list for {} is full ({} rules)", full, self.max_per_phase);
            return Err(ExchangeError::ResourceExhausted(format!(
                "rule list for {} is full",
                full
            )));
        }

        for phase in mask.phases() {
            self.lists[phase.index()].push(Arc::clone(&rule));
        }
        Ok(())
    }

    /// # Evaluate
    ///
    /// Runs the rules of one phase in registration order. Stops at the first
    /// matching rule whose action fails.
    pub fn evaluate(&self, phase: HookPhase, store: &StoreView, data: Option<&Message>) -> Result<()> {
        for rule in &self.lists[phase.index()] {
            if !rule.matches(store, data, phase) {
                continue;
            }
            rule.apply(store, data, phase).map_err(|e| ExchangeError::RuleRejected {
                phase,
                reason: e.0,
            })?;
        }
        Ok(())
    }

    /// Number of rules attached to `phase`.
    pub fn len(&self, phase: HookPhase) -> usize {
        self.lists[phase.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(Vec::is_empty)
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RULES_PER_PHASE)
    }
}
