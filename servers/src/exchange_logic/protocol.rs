//! Newline-delimited JSON requests and responses.
//!
//! ```text
//! {"op":"publish","key":1700000000001,"topic":"sensors/a","payload":"21.5"}
//! {"op":"pull","key":1700000000001,"count":10}
//! {"op":"range","start":1700000000000,"end":1700000009999}
//! {"op":"stats"}
//! ```

use lib_exchange::{ExchangeError, ExchangeSocket, Message, PullRequest};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    Publish {
        key: u64,
        #[serde(default)]
        topic: String,
        payload: String,
    },
    Pull {
        key: u64,
        #[serde(default = "default_count")]
        count: u32,
    },
    Range {
        start: u64,
        end: u64,
    },
    Stats,
}

fn default_count() -> u32 {
    1
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub key: u64,
    pub topic: String,
    pub payload: String,
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        Self {
            key: msg.key,
            topic: msg.topic.clone(),
            payload: String::from_utf8_lossy(&msg.payload).into_owned(),
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        key: Option<u64>,
        count: usize,
        messages: Vec<WireMessage>,
    },
    Stats {
        size: usize,
        capacity: usize,
        indexed: usize,
        pending: usize,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl Response {
    fn messages(key: Option<u64>, messages: &[Message]) -> Self {
        Response::Ok {
            key,
            count: messages.len(),
            messages: messages.iter().map(WireMessage::from).collect(),
        }
    }
}

impl From<ExchangeError> for Response {
    fn from(err: ExchangeError) -> Self {
        Response::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Parses one request line and runs it against `socket`.
///
/// A publish answers with the messages its overflow returned, if any.
pub async fn handle_line(socket: &ExchangeSocket, line: &str) -> Response {
    let request = match serde_json::from_str::<Request>(line) {
        Ok(request) => request,
        Err(e) => return ExchangeError::InvalidArgument(format!("malformed request: {}", e)).into(),
    };

    match request {
        Request::Publish { key, topic, payload } => {
            match socket.send(Message::publish(key, topic, payload.into_bytes())).await {
                Ok(ack) => Response::messages(Some(ack.key), ack.returned()),
                Err(e) => e.into(),
            }
        }
        Request::Pull { key, count } => match socket.recv(PullRequest::new(key, count)) {
            Ok(resp) => Response::messages(Some(key), &resp.messages),
            Err(e) => e.into(),
        },
        Request::Range { start, end } => {
            let Some(exchange) = socket.exchange() else {
                return ExchangeError::Closed.into();
            };
            match exchange.pull_range(start, end) {
                Ok(messages) => Response::messages(None, &messages),
                Err(e) => e.into(),
            }
        }
        Request::Stats => {
            let Some(exchange) = socket.exchange() else {
                return ExchangeError::Closed.into();
            };
            Response::Stats {
                size: exchange.store().len(),
                capacity: exchange.store().capacity(),
                indexed: socket.get_dedup_map().len(),
                pending: socket.pending_len(),
            }
        }
    }
}
