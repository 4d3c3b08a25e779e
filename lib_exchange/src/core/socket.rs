//! # Exchange Socket
//!
//! Protocol front of an exchange. A socket owns a `DedupIndex`, binds at most
//! one `ExchangeCore` and serializes publishes through a single-flight
//! `ExchangeNode`:
//!
//! - **Idle**: the next `send` occupies the dispatch slot and a dispatch task
//!   is spawned on the current Tokio runtime.
//! - **Dispatching**: further sends wait in a bounded FIFO. The dispatch task
//!   handles the slot first, then the FIFO, completing each caller in the
//!   order its send was accepted, and goes back to idle once both are empty.
//!
//! The dispatch task owns the in-flight send. If the task is dropped before
//! it finishes, e.g. because its runtime shut down, the node returns to idle
//! and every send it still held resolves with `Closed`.
//!
//! `close` cancels the socket token. A dispatch task that observes the token
//! stops mutating the store; everything still queued resolves with `Closed`.
//!
//! ## Locking
//!
//! The socket lock guards the bound node. The node lock guards the busy flag,
//! the dispatch slot and the FIFO. The socket lock is always taken before the
//! node lock; the dispatch task only ever takes the node lock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::configs::exchange_config::SocketConfig;
use crate::core::dedup::DedupIndex;
use crate::core::exchange::{ExchangeCore, PublishAck};
use crate::core::message::{Message, PullRequest, PullResponse};
use crate::error::{ExchangeError, Result};

/// Default bound on sends waiting behind the in-flight one.
pub const DEFAULT_PENDING_QUEUE_CAPACITY: usize = 1024;

type Responder = oneshot::Sender<Result<PublishAck>>;

struct PendingSend {
    message: Message,
    responder: Responder,
}

impl PendingSend {
    fn fail(self, err: ExchangeError) {
        let _ = self.responder.send(Err(err));
    }
}

#[derive(Default)]
struct NodeState {
    busy: bool,
    pending: VecDeque<PendingSend>,
}

impl NodeState {
    fn drain(&mut self) -> Vec<PendingSend> {
        self.pending.drain(..).collect()
    }
}

/// Single-flight dispatcher for one bound exchange.
pub struct ExchangeNode {
    core: Arc<ExchangeCore>,
    state: Mutex<NodeState>,
    pending_capacity: usize,
}

impl ExchangeNode {
    fn new(core: Arc<ExchangeCore>, pending_capacity: usize) -> Self {
        Self {
            core,
            state: Mutex::new(NodeState::default()),
            pending_capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().expect("ExchangeNode lock poisoned")
    }

    pub fn core(&self) -> &Arc<ExchangeCore> {
        &self.core
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    /// Sends waiting behind the in-flight one.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }
}

/// A dispatch task's claim on its node, holding the in-flight send.
struct Dispatch {
    node: Arc<ExchangeNode>,
    in_flight: Option<PendingSend>,
    active: bool,
}

impl Dispatch {
    fn new(node: Arc<ExchangeNode>, first: PendingSend) -> Self {
        Self {
            node,
            in_flight: Some(first),
            active: true,
        }
    }

    /// Dispatch loop: runs until the slot and the FIFO are both empty, or
    /// until the socket is closed.
    async fn run(mut self, dedup: Arc<DedupIndex>, closed: CancellationToken) {
        loop {
            {
                let node = Arc::clone(&self.node);
                let mut state = node.lock();
                let next = match self.in_flight.take() {
                    Some(item) => Some(item),
                    None => state.pending.pop_front(),
                };
                let Some(item) = next else {
                    state.busy = false;
                    self.active = false;
                    return;
                };

                if closed.is_cancelled() {
                    let remaining = state.drain();
                    state.busy = false;
                    self.active = false;
                    log::debug!(
                        "[{}] dispatch stopped by close, failing {} sends",
                        node.core.name(),
                        remaining.len() + 1
                    );
                    item.fail(ExchangeError::Closed);
                    remaining.into_iter().for_each(|p| p.fail(ExchangeError::Closed));
                    return;
                }

                let result = node.core.handle_publish(&dedup, item.message);
                let _ = item.responder.send(result);
            }
            tokio::task::yield_now().await;
        }
    }
}

impl Drop for Dispatch {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let stranded: Vec<PendingSend> = {
            let mut state = self.node.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.busy = false;
            self.in_flight.take().into_iter().chain(state.drain()).collect()
        };
        log::warn!(
            "[{}] dispatch task dropped before finishing, failing {} sends",
            self.node.core.name(),
            stranded.len()
        );
        stranded.into_iter().for_each(|p| p.fail(ExchangeError::Closed));
    }
}

/// Completion handle for one accepted `send`.
#[derive(Debug)]
pub struct SendTicket {
    rx: oneshot::Receiver<Result<PublishAck>>,
}

impl SendTicket {
    /// Waits for the publish to be handled. A ticket whose dispatcher went
    /// away without answering resolves with `Closed`.
    pub async fn wait(self) -> Result<PublishAck> {
        self.rx.await.unwrap_or(Err(ExchangeError::Closed))
    }
}

struct SocketInner {
    node: Option<Arc<ExchangeNode>>,
}

pub struct ExchangeSocket {
    inner: Mutex<SocketInner>,
    dedup: Arc<DedupIndex>,
    closed: CancellationToken,
    pending_capacity: usize,
}

impl ExchangeSocket {
    pub fn new() -> Self {
        Self::with_pending_capacity(DEFAULT_PENDING_QUEUE_CAPACITY)
    }

    pub fn with_pending_capacity(pending_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(SocketInner { node: None }),
            dedup: Arc::new(DedupIndex::new()),
            closed: CancellationToken::new(),
            pending_capacity,
        }
    }

    pub fn from_config(config: &SocketConfig) -> Self {
        Self::with_pending_capacity(config.pending_queue_capacity)
    }

    fn lock(&self) -> MutexGuard<'_, SocketInner> {
        self.inner.lock().expect("ExchangeSocket lock poisoned")
    }

    fn bound_node(&self) -> Result<Arc<ExchangeNode>> {
        self.node_of(&self.lock())
    }

    /// The bound node, given the socket lock. A socket closed while the
    /// caller waited for the lock reports `Closed`.
    fn node_of(&self, inner: &SocketInner) -> Result<Arc<ExchangeNode>> {
        if self.closed.is_cancelled() {
            return Err(ExchangeError::Closed);
        }
        inner
            .node
            .clone()
            .ok_or_else(|| ExchangeError::InvalidArgument("no exchange is bound to this socket".to_string()))
    }

    /// # Bind
    ///
    /// Associates `core` with this socket. Set-only: a second bind fails with
    /// `AlreadyBound`.
    pub fn bind(&self, core: Arc<ExchangeCore>) -> Result<()> {
        let mut inner = self.lock();
        if self.closed.is_cancelled() {
            return Err(ExchangeError::Closed);
        }
        if inner.node.is_some() {
            log::error!("Exchange '{}' cannot be bound, socket already bound", core.name());
            return Err(ExchangeError::AlreadyBound);
        }
        log::info!("Exchange '{}' bound to socket", core.name());
        inner.node = Some(Arc::new(ExchangeNode::new(core, self.pending_capacity)));
        Ok(())
    }

    /// # Submit
    ///
    /// Accepts a publish and returns a ticket for its completion. Acceptance
    /// order is handling order.
    ///
    /// Needs a Tokio runtime when the node is idle, as it spawns the dispatch
    /// task. If the FIFO is full the message is discarded and its ticket
    /// resolves with `ResourceExhausted`.
    pub fn submit(&self, message: Message) -> Result<SendTicket> {
        if self.closed.is_cancelled() {
            return Err(ExchangeError::Closed);
        }
        if !message.is_publish() {
            return Err(ExchangeError::InvalidArgument(format!(
                "only publish messages can be sent, got {:?}",
                message.kind
            )));
        }

        let inner = self.lock();
        let node = self.node_of(&inner)?;

        let (responder, rx) = oneshot::channel();
        let item = PendingSend { message, responder };
        let mut state = node.lock();

        if !state.busy {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| ExchangeError::InvalidArgument(format!("send requires a Tokio runtime: {}", e)))?;
            state.busy = true;
            drop(state);
            let dispatch = Dispatch::new(Arc::clone(&node), item);
            runtime.spawn(dispatch.run(Arc::clone(&self.dedup), self.closed.clone()));
        } else if state.pending.len() >= node.pending_capacity {
            log::error!(
                "[{}] pending queue full ({}), discarding message with key {}",
                node.core.name(),
                node.pending_capacity,
                item.message.key
            );
            item.fail(ExchangeError::ResourceExhausted("pending send queue is full".to_string()));
        } else {
            state.pending.push_back(item);
        }

        Ok(SendTicket { rx })
    }

    /// Publishes `message` and waits for it to be handled.
    pub async fn send(&self, message: Message) -> Result<PublishAck> {
        self.submit(message)?.wait().await
    }

    /// # Receive
    ///
    /// Serves a pull: `count == 1` is a dedup lookup, larger counts read
    /// consecutive messages from the bound store.
    pub fn recv(&self, request: PullRequest) -> Result<PullResponse> {
        if self.closed.is_cancelled() {
            return Err(ExchangeError::Closed);
        }
        let key = request
            .key
            .ok_or_else(|| ExchangeError::InvalidArgument("pull request carries no key".to_string()))?;
        if request.count == 0 {
            return Err(ExchangeError::InvalidArgument("pull count must be at least 1".to_string()));
        }

        let node = self.bound_node()?;
        let messages = node.core.handle_pull(&self.dedup, key, request.count)?;
        Ok(PullResponse::new(messages))
    }

    /// Handle to the socket's dedup index, for diagnostic readers.
    pub fn get_dedup_map(&self) -> Arc<DedupIndex> {
        Arc::clone(&self.dedup)
    }

    /// Direct dedup lookup.
    pub fn get_msg_by_key(&self, key: u64) -> Option<Message> {
        self.dedup.get(key)
    }

    /// The bound exchange, if any.
    pub fn exchange(&self) -> Option<Arc<ExchangeCore>> {
        self.lock().node.as_ref().map(|n| Arc::clone(n.core()))
    }

    pub fn is_bound(&self) -> bool {
        self.lock().node.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().node.as_ref().map(|n| n.pending_len()).unwrap_or(0)
    }

    /// # Close
    ///
    /// Marks the socket closed, fails every queued send with `Closed`,
    /// releases the bound exchange and clears the dedup index. Idempotent.
    pub fn close(&self) {
        let mut inner = self.lock();
        self.closed.cancel();

        if let Some(node) = inner.node.take() {
            let drained = {
                let mut state = node.lock();
                state.drain()
            };
            if !drained.is_empty() {
                log::warn!("[{}] socket closed with {} sends queued", node.core.name(), drained.len());
            }
            drained.into_iter().for_each(|p| p.fail(ExchangeError::Closed));
            log::info!("Exchange '{}' released from socket", node.core.name());
        }

        self.dedup.clear();
    }
}

impl Default for ExchangeSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExchangeSocket {
    fn drop(&mut self) {
        if !self.closed.is_cancelled() {
            self.close();
        }
    }
}
