//! # Exchange Core
//!
//! Buffering and dispatch machinery, bottom-up: messages, rule hooks, the
//! ring store and its persistence bridge, the dedup index, the exchange core
//! that ties them together, and the socket state machine in front of it.

pub mod dedup;
pub mod exchange;
pub mod message;
pub mod persistence;
pub mod ring_store;
pub mod rules;
pub mod socket;
