// SPDX-License-Identifier: MIT OR Apache-2.0

//! Group key lifecycle: issuing, distributing and retiring the symmetric keys a group encrypts
//! its state and messages with.
mod engine;
mod envelope;
mod group_key;
mod message;
mod wire;

pub use engine::{GroupKeys, GroupKeysState, KeysError, MESSAGE_STALE_AGE, SUPPLEMENT_WINDOW};
pub use group_key::{
    Generation, GroupKey, GroupKeyId, KeyHistory, KeyHistoryState, Timestamp, GROUP_KEY_SIZE,
    KEY_RETENTION_GENERATIONS,
};
pub use message::{KeyMessage, KeyMessageError, Wrap};
pub use wire::WireError;
