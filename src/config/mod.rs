// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted, mergeable companion configs (group info and group members).
//!
//! Both configs share one mechanism: local mutations mark the state dirty, `push` seals the
//! CBOR-encoded payload under the newest group key the Keys engine has offered, and `merge`
//! ingests remote blobs by trying every held key. Conflict resolution is whole-payload
//! last-writer-wins by sequence number; the finer-grained dict merge of the surrounding system
//! lives outside this crate.
mod info;
mod members;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cbor::{decode_cbor, encode_cbor, DecodeError, EncodeError};
use crate::crypto::xchacha20::{xaead_open, xaead_seal, XAeadError, XAeadNonce};
use crate::crypto::{Rng, RngError, Secret};

pub use info::{GroupInfo, InfoState};
pub use members::{GroupMembers, InviteStatus, MemberRecord, MembersState};

const BLOB_VERSION: u8 = 0x01;
const NONCE_SIZE: usize = 24;

pub(crate) const CONFIG_KEY_SIZE: usize = 32;

/// Result of a `push` call: the sequence number to confirm later, the sealed blob to
/// distribute, and the hashes of previously-known blobs this push supersedes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushOutput {
    pub seqno: u64,
    pub blob: Vec<u8>,
    pub obsoleted: Vec<String>,
}

/// Push/merge plumbing shared by every config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ConfigCore {
    seqno: u64,
    keys: Vec<Secret<CONFIG_KEY_SIZE>>,
    dirty: bool,
    unconfirmed: Option<u64>,
    known_hashes: Vec<String>,
}

impl ConfigCore {
    fn new() -> Self {
        Self {
            seqno: 0,
            keys: Vec::new(),
            // A config that has never been pushed anywhere needs its initial push.
            dirty: true,
            unconfirmed: None,
            known_hashes: Vec::new(),
        }
    }

    /// Replaces the decryption key list, newest key first. Called by the Keys engine after a
    /// rekey or a successful key message load.
    pub(crate) fn set_keys(&mut self, keys: Vec<[u8; CONFIG_KEY_SIZE]>) {
        self.keys = keys.into_iter().map(Secret::from_bytes).collect();
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn needs_push(&self) -> bool {
        self.dirty || self.unconfirmed.is_some()
    }

    fn confirm(&mut self, seqno: u64, hash: &str) {
        if self.unconfirmed == Some(seqno) {
            self.unconfirmed = None;
        }
        self.remember(hash);
    }

    fn is_known(&self, hash: &str) -> bool {
        self.known_hashes.iter().any(|known| known == hash)
    }

    fn remember(&mut self, hash: &str) {
        if !self.is_known(hash) {
            self.known_hashes.push(hash.to_string());
        }
    }

    fn seal(&self, domain: &[u8], payload: &[u8], rng: &Rng) -> Result<Vec<u8>, ConfigError> {
        let Some(key) = self.keys.first() else {
            return Err(ConfigError::NoEncryptionKey);
        };
        let nonce: XAeadNonce = rng.random_array()?;
        let mut blob = Vec::with_capacity(1 + NONCE_SIZE + payload.len() + 16);
        blob.push(BLOB_VERSION);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&xaead_seal(key.as_bytes(), payload, nonce, domain)?);
        Ok(blob)
    }

    /// Tries every held key against a blob. `Ok(None)` means no held key opens it, which
    /// callers count as "not merged" rather than an error.
    fn open(&self, domain: &[u8], blob: &[u8]) -> Result<Option<Vec<u8>>, ConfigError> {
        if self.keys.is_empty() {
            return Err(ConfigError::NoKeys);
        }
        if blob.len() < 1 + NONCE_SIZE || blob[0] != BLOB_VERSION {
            return Err(ConfigError::MalformedBlob);
        }
        let nonce: XAeadNonce = blob[1..1 + NONCE_SIZE]
            .try_into()
            .expect("slice of checked length");
        let ciphertext = &blob[1 + NONCE_SIZE..];
        for key in &self.keys {
            if let Ok(payload) = xaead_open(key.as_bytes(), ciphertext, nonce, domain) {
                return Ok(Some(payload));
            }
        }
        Ok(None)
    }
}

/// Sealed payload carried inside every config blob.
#[derive(Serialize, Deserialize)]
struct ConfigPayload<T> {
    seqno: u64,
    data: T,
}

/// Seals the current payload state for distribution.
fn push_blob<T: Serialize>(
    core: &mut ConfigCore,
    domain: &[u8],
    data: &T,
    rng: &Rng,
) -> Result<PushOutput, ConfigError> {
    if core.keys.is_empty() {
        return Err(ConfigError::NoEncryptionKey);
    }
    if core.dirty {
        core.seqno += 1;
        core.dirty = false;
    }
    core.unconfirmed = Some(core.seqno);

    let payload = encode_cbor(&ConfigPayload {
        seqno: core.seqno,
        data,
    })?;
    let blob = core.seal(domain, &payload, rng)?;
    Ok(PushOutput {
        seqno: core.seqno,
        blob,
        obsoleted: core.known_hashes.clone(),
    })
}

/// Ingests remote blobs, newest payload wins. Returns how many blobs were merged (decrypted or
/// already known).
fn merge_blobs<T: DeserializeOwned>(
    core: &mut ConfigCore,
    domain: &[u8],
    data: &mut T,
    configs: &[(String, Vec<u8>)],
) -> Result<usize, ConfigError> {
    let mut merged = 0;
    for (hash, blob) in configs {
        if core.is_known(hash) {
            merged += 1;
            continue;
        }
        let Some(payload) = core.open(domain, blob)? else {
            debug!(%hash, "no held key opens config blob, skipping");
            continue;
        };
        let payload: ConfigPayload<T> = decode_cbor(&payload)?;
        if payload.seqno > core.seqno {
            *data = payload.data;
            core.seqno = payload.seqno;
            // Our state now equals a pushed state, local edits are superseded.
            core.dirty = false;
        }
        core.remember(hash);
        merged += 1;
    }
    Ok(merged)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config has not been offered an encryption key yet")]
    NoEncryptionKey,

    #[error("cannot merge config blobs without any decryption keys")]
    NoKeys,

    #[error("config blob is malformed")]
    MalformedBlob,

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    Seal(#[from] XAeadError),
}
