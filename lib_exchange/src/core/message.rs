//! # Exchange Messages
//!
//! The unit of data that flows through the exchange. A `Message` owns its
//! payload as `Bytes`, so handing a message to the ring store, the dedup index
//! and a consumer's pull result shares one payload allocation instead of
//! copying it. Ownership of the `Message` value itself moves between
//! components: the store owns it while buffered, and overflow paths move it
//! out to the caller or to the persistence writer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// MQTT control packet kinds the exchange socket can be handed.
///
/// Only `Publish` is accepted by `ExchangeSocket::send`; the other kinds exist
/// so a front end can forward whatever it decoded and let the socket reject it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Publish,
    Subscribe,
    Unsubscribe,
    PingReq,
}

/// A keyed message as buffered by the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Packet kind the message was decoded from.
    pub kind: MessageKind,
    /// 64-bit ordering key. Producers are expected to use a monotonically
    /// increasing timestamp so that range searches work.
    pub key: u64,
    /// Topic the message was published on.
    pub topic: String,
    /// Raw application payload.
    pub payload: Bytes,
}

impl Message {
    /// Builds a publish message.
    pub fn publish(key: u64, topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageKind::Publish,
            key,
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Builds a message of an arbitrary kind.
    pub fn with_kind(kind: MessageKind, key: u64, topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            key,
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    pub fn is_publish(&self) -> bool {
        self.kind == MessageKind::Publish
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A consumer's pull command.
///
/// `count == 1` is a point lookup; larger counts read consecutive messages
/// starting at `key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub key: Option<u64>,
    pub count: u32,
}

impl PullRequest {
    pub fn new(key: u64, count: u32) -> Self {
        Self { key: Some(key), count }
    }
}

/// Ordered result of a pull, plus how many messages were actually returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullResponse {
    pub messages: Vec<Message>,
    pub count: usize,
}

impl PullResponse {
    pub fn new(messages: Vec<Message>) -> Self {
        let count = messages.len();
        Self { messages, count }
    }

    /// Keys of the returned messages, in order.
    pub fn keys(&self) -> Vec<u64> {
        self.messages.iter().map(|m| m.key).collect()
    }
}
