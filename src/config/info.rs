// SPDX-License-Identifier: MIT OR Apache-2.0

//! The group info config: name and other small metadata, distributed as an encrypted blob.
use serde::{Deserialize, Serialize};

use crate::cbor::{decode_cbor, encode_cbor};
use crate::config::{merge_blobs, push_blob, ConfigCore, ConfigError, PushOutput, CONFIG_KEY_SIZE};
use crate::crypto::Rng;

const INFO_DOMAIN: &[u8] = b"group-info";

/// Operations over [`InfoState`]. The state is always passed by mutable reference; a failing
/// operation leaves it untouched.
#[derive(Debug)]
pub struct GroupInfo;

/// Serializable state of the group info config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InfoState {
    core: ConfigCore,
    data: InfoData,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct InfoData {
    name: Option<String>,
    description: Option<String>,
    created: Option<u64>,
}

impl GroupInfo {
    /// Initialises an empty info config. It can neither push nor merge until the Keys engine
    /// has offered it a group key.
    pub fn init() -> InfoState {
        InfoState {
            core: ConfigCore::new(),
            data: InfoData::default(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<InfoState, ConfigError> {
        Ok(decode_cbor(bytes)?)
    }

    pub fn to_bytes(y: &InfoState) -> Result<Vec<u8>, ConfigError> {
        Ok(encode_cbor(y)?)
    }

    pub fn get_name(y: &InfoState) -> Option<&str> {
        y.data.name.as_deref()
    }

    pub fn set_name(y: &mut InfoState, name: &str) {
        y.data.name = Some(name.to_string());
        y.core.mark_dirty();
    }

    pub fn get_description(y: &InfoState) -> Option<&str> {
        y.data.description.as_deref()
    }

    pub fn set_description(y: &mut InfoState, description: &str) {
        y.data.description = Some(description.to_string());
        y.core.mark_dirty();
    }

    /// Creation timestamp of the group (UNIX seconds).
    pub fn get_created(y: &InfoState) -> Option<u64> {
        y.data.created
    }

    pub fn set_created(y: &mut InfoState, created: u64) {
        y.data.created = Some(created);
        y.core.mark_dirty();
    }

    pub fn needs_push(y: &InfoState) -> bool {
        y.core.needs_push()
    }

    /// Seals the current state for distribution.
    pub fn push(y: &mut InfoState, rng: &Rng) -> Result<PushOutput, ConfigError> {
        push_blob(&mut y.core, INFO_DOMAIN, &y.data, rng)
    }

    /// Records that the blob produced with `seqno` landed under `hash`.
    pub fn confirm_pushed(y: &mut InfoState, seqno: u64, hash: &str) {
        y.core.confirm(seqno, hash);
    }

    /// Ingests remote blobs; returns how many of them merged.
    pub fn merge(
        y: &mut InfoState,
        configs: &[(String, Vec<u8>)],
    ) -> Result<usize, ConfigError> {
        merge_blobs(&mut y.core, INFO_DOMAIN, &mut y.data, configs)
    }

    pub(crate) fn set_keys(y: &mut InfoState, keys: Vec<[u8; CONFIG_KEY_SIZE]>) {
        y.core.set_keys(keys);
    }
}
