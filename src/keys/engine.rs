// SPDX-License-Identifier: MIT OR Apache-2.0

//! The keys engine: owns a participant's group key history, produces re-key and supplement
//! messages, ingests key messages from other admins and encrypts application payloads.
//!
//! The engine is passive and performs no background work. The companion Info and Members
//! configs are never owned, they are passed in by mutable reference wherever an operation needs
//! to read the member list or hand over freshly learned keys. Admins are ordinary participants
//! that additionally hold the group secret key; every operation requiring admin authority
//! checks for its presence.
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cbor::{decode_cbor, encode_cbor, DecodeError, EncodeError};
use crate::config::{GroupInfo, GroupMembers, InfoState, MembersState};
use crate::crypto::ed25519::{Ed25519Error, SigningKey, VerifyingKey};
use crate::crypto::hkdf::HkdfError;
use crate::crypto::x25519::X25519Error;
use crate::crypto::xchacha20::XAeadError;
use crate::crypto::{CryptoError, Rng, RngError};
use crate::identity::SessionId;
use crate::keys::envelope::{seal_message, EnvelopeError, MessageEnvelope};
use crate::keys::group_key::{
    GroupKey, GroupKeyError, KeyHistory, KeyHistoryState, GROUP_KEY_SIZE,
};
use crate::keys::message::{open_wrap, recipient_hint, seal_wrap, KeyMessage, KeyMessageError};
use crate::keys::wire::WireError;

/// Key messages older than this (relative to the caller-supplied clock) are rejected.
pub const MESSAGE_STALE_AGE: u64 = 30 * 24 * 60 * 60;

/// Upper bound on the keys a supplement hands to added members.
pub const SUPPLEMENT_WINDOW: usize = 5;

/// Operations over [`GroupKeysState`].
#[derive(Debug)]
pub struct GroupKeys;

/// One participant's view of the group's key material.
pub struct GroupKeysState {
    my_secret: SigningKey,
    session_id: SessionId,
    group_pk: VerifyingKey,
    group_session_id: SessionId,
    group_sk: Option<SigningKey>,
    history: KeyHistoryState,
    pending: Option<Vec<u8>>,
}

/// Persisted form of the engine state. The participant's own secret key is a construction
/// input, not part of the dump.
#[derive(Serialize, Deserialize)]
struct KeysDump {
    history: KeyHistoryState,
    group_sk: Option<SigningKey>,
    pending: Option<Vec<u8>>,
}

impl GroupKeys {
    /// Initialises the engine for one participant.
    ///
    /// `my_secret` is the participant's long-term Ed25519 key, `group_sk` is present for
    /// admins only. A persisted `dump` restores history and pending state. An admin starting
    /// without any key history immediately issues the group's first key, so a freshly created
    /// group has a distributable key message from the start.
    pub fn init(
        my_secret: SigningKey,
        group_pk: VerifyingKey,
        group_sk: Option<SigningKey>,
        dump: Option<&[u8]>,
        info: &mut InfoState,
        members: &mut MembersState,
        rng: &Rng,
    ) -> Result<GroupKeysState, KeysError> {
        let session_id = SessionId::from_verifying_key(&my_secret.verifying_key())?;
        let group_session_id = SessionId::from_verifying_key(&group_pk)?;

        let (history, group_sk, pending) = match dump {
            Some(bytes) => {
                let dump: KeysDump = decode_cbor(bytes)?;
                (dump.history, dump.group_sk.or(group_sk), dump.pending)
            }
            None => (KeyHistory::init(), group_sk, None),
        };
        if let Some(group_sk) = &group_sk {
            if group_sk.verifying_key() != group_pk {
                return Err(KeysError::GroupSecretMismatch);
            }
        }

        let y = GroupKeysState {
            my_secret,
            session_id,
            group_pk,
            group_session_id,
            group_sk,
            history,
            pending,
        };

        if y.group_sk.is_some() && y.history.is_empty() {
            let (y_i, _) = Self::rekey(y, info, members, rng)?;
            return Ok(y_i);
        }

        Self::offer_keys(&y, info, members);
        Ok(y)
    }

    /// Whether this participant holds the group secret key.
    pub fn admin(y: &GroupKeysState) -> bool {
        y.group_sk.is_some()
    }

    /// This participant's own session id.
    pub fn session_id(y: &GroupKeysState) -> &SessionId {
        &y.session_id
    }

    /// The most recent locally produced key message that has not been confirmed as pushed.
    ///
    /// Byte-stable across calls until a re-key or supplement supersedes it, or until the blob
    /// is observed coming back through [`GroupKeys::load_key_message`].
    pub fn pending_config(y: &GroupKeysState) -> Option<&[u8]> {
        y.pending.as_deref()
    }

    /// The active 32-byte group encryption key, used by the companion configs.
    pub fn group_enc_key(y: &GroupKeysState) -> Option<&[u8; GROUP_KEY_SIZE]> {
        y.history.active().map(GroupKey::as_bytes)
    }

    /// All retained group keys, newest generation first.
    pub fn group_keys(y: &GroupKeysState) -> &[GroupKey] {
        y.history.keys()
    }

    /// Generates a fresh group key, wraps it for every current member (plus once for the
    /// group's own identity, so that any admin recovers it) and returns the signed key
    /// message. Admin only.
    pub fn rekey(
        mut y: GroupKeysState,
        info: &mut InfoState,
        members: &mut MembersState,
        rng: &Rng,
    ) -> Result<(GroupKeysState, Vec<u8>), KeysError> {
        let Some(group_sk) = y.group_sk.clone() else {
            return Err(KeysError::NotAdmin);
        };

        let generation = y.history.max_generation() + 1;
        let timestamp = now_secs()?;
        let key = GroupKey::from_rng(rng, generation, timestamp)?;

        let group_x_secret = group_sk.to_x25519();
        let mut wraps = Vec::with_capacity(1 + GroupMembers::size(members));

        // The admin wrap: sealed under the group's agreement with itself, which only holders
        // of the group secret key can compute.
        let group_agreement =
            group_x_secret.calculate_agreement(&y.group_session_id.x25519_key())?;
        wraps.push(seal_wrap(
            &group_agreement,
            &y.group_session_id,
            &y.group_pk,
            generation,
            key.as_bytes(),
            rng,
        )?);

        for session_id in GroupMembers::session_ids(members) {
            let agreement = group_x_secret.calculate_agreement(&session_id.x25519_key())?;
            wraps.push(seal_wrap(
                &agreement,
                &session_id,
                &y.group_pk,
                generation,
                key.as_bytes(),
                rng,
            )?);
        }

        let message = KeyMessage::Full {
            generation,
            timestamp,
            wraps,
        };
        let blob = message.encode(&group_sk);

        y.history = KeyHistory::insert(y.history, key.clone());
        y.history = KeyHistory::activate(y.history, key.id());
        y.history = KeyHistory::prune(y.history);
        y.pending = Some(blob.clone());
        Self::offer_keys(&y, info, members);

        debug!(
            generation,
            members = GroupMembers::size(members),
            "issued new group key"
        );
        Ok((y, blob))
    }

    /// Wraps the newest window of existing keys for a set of added recipients without rotating
    /// the active key. Admin only.
    ///
    /// Recipients that already hold the keys simply find nothing new when loading the result;
    /// duplicate recipient ids are merged.
    pub fn key_supplement(
        mut y: GroupKeysState,
        recipients: &[SessionId],
        rng: &Rng,
    ) -> Result<(GroupKeysState, Vec<u8>), KeysError> {
        let Some(group_sk) = y.group_sk.clone() else {
            return Err(KeysError::NotAdmin);
        };

        // The newest run of consecutive generations; the positional wire layout cannot
        // express gaps. Concurrent keys of an already covered generation are left out.
        let mut window: Vec<&GroupKey> = Vec::new();
        for key in y.history.keys() {
            match window.last() {
                None => window.push(key),
                Some(last) if key.generation() == last.generation() => continue,
                Some(last) if key.generation() + 1 == last.generation() => window.push(key),
                Some(_) => break,
            }
            if window.len() == SUPPLEMENT_WINDOW {
                break;
            }
        }
        if window.is_empty() {
            return Err(KeysError::NoKey);
        }

        let generation = window[0].generation();
        let timestamp = now_secs()?;
        let mut payload = Vec::with_capacity(window.len() * GROUP_KEY_SIZE);
        for key in &window {
            payload.extend_from_slice(key.as_bytes());
        }

        let group_x_secret = group_sk.to_x25519();
        let mut seen: Vec<SessionId> = Vec::with_capacity(recipients.len());
        let mut wraps = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            if seen.contains(recipient) {
                continue;
            }
            seen.push(*recipient);
            let agreement = group_x_secret.calculate_agreement(&recipient.x25519_key())?;
            wraps.push(seal_wrap(
                &agreement,
                recipient,
                &y.group_pk,
                generation,
                &payload,
                rng,
            )?);
        }

        let message = KeyMessage::Supplement {
            generation,
            timestamp,
            keys_per_wrap: window.len() as u64,
            wraps,
        };
        let blob = message.encode(&group_sk);

        debug!(
            generation,
            keys = window.len(),
            recipients = seen.len(),
            "issued key supplement"
        );

        y.pending = Some(blob.clone());
        Ok((y, blob))
    }

    /// Ingests a key message. Returns whether any wrap in it decrypted for this participant;
    /// side effects (history growth, key hand-over to the configs) happen only in that case.
    ///
    /// Signature, framing, staleness and generation-window violations are hard errors and
    /// leave all state untouched. A message that simply is not addressed to us returns
    /// `false`.
    pub fn load_key_message(
        mut y: GroupKeysState,
        blob: &[u8],
        now: u64,
        info: &mut InfoState,
        members: &mut MembersState,
    ) -> Result<(GroupKeysState, bool), KeysError> {
        let message = match KeyMessage::decode(blob, &y.group_pk) {
            Ok(message) => message,
            Err(KeyMessageError::InvalidSignature) => return Err(KeysError::InvalidSignature),
            Err(KeyMessageError::Wire(err)) => return Err(KeysError::Parse(err)),
        };

        if now > message.timestamp().saturating_add(MESSAGE_STALE_AGE) {
            return Err(KeysError::StaleMessage {
                timestamp: message.timestamp(),
                now,
            });
        }
        if let Some(oldest) = y.history.min_generation() {
            if message.generation() < oldest {
                return Err(KeysError::UnknownGeneration {
                    generation: message.generation(),
                    oldest,
                });
            }
        }

        // The agreements under which a wrap could have been sealed for us: our own identity,
        // and the group's identity when we hold the group secret key.
        let group_x_public = y.group_pk.to_x25519()?;
        let mut candidates = vec![(
            recipient_hint(&y.session_id),
            y.my_secret
                .to_x25519()
                .calculate_agreement(&group_x_public)?,
        )];
        if let Some(group_sk) = &y.group_sk {
            candidates.push((
                recipient_hint(&y.group_session_id),
                group_sk.to_x25519().calculate_agreement(&group_x_public)?,
            ));
        }

        let mut recovered: Vec<GroupKey> = Vec::new();
        for wrap in message.wraps() {
            for (hint, agreement) in &candidates {
                if &wrap.recipient_hint != hint {
                    continue;
                }
                let Some(payload) =
                    open_wrap(wrap, agreement, &y.group_pk, message.generation())?
                else {
                    // Hint collision or tampered wrap, keep scanning.
                    continue;
                };
                for (index, chunk) in payload.chunks_exact(GROUP_KEY_SIZE).enumerate() {
                    let Some(generation) = message.generation().checked_sub(index as u64) else {
                        break;
                    };
                    let bytes: [u8; GROUP_KEY_SIZE] = chunk
                        .try_into()
                        .expect("chunks_exact yields full-size chunks");
                    recovered.push(GroupKey::new(bytes, generation, message.timestamp()));
                }
                break;
            }
        }

        if recovered.is_empty() {
            debug!(
                generation = message.generation(),
                "key message carries nothing for us"
            );
            return Ok((y, false));
        }

        let newest = recovered
            .iter()
            .max_by_key(|key| key.generation())
            .cloned()
            .expect("recovered is non-empty");
        for key in recovered {
            y.history = KeyHistory::insert(y.history, key);
        }

        // The loaded message wins the active slot unless we already moved past its newest
        // generation. On a tie the message decides, which is what keeps concurrently
        // bootstrapped admins on one key.
        let active_generation = y.history.active().map(GroupKey::generation).unwrap_or(0);
        if newest.generation() >= active_generation {
            y.history = KeyHistory::activate(y.history, newest.id());
        }
        y.history = KeyHistory::prune(y.history);

        if y.pending.as_deref() == Some(blob) {
            y.pending = None;
        }
        Self::offer_keys(&y, info, members);

        debug!(
            generation = message.generation(),
            supplement = message.is_supplement(),
            held = y.history.len(),
            "loaded key message"
        );
        Ok((y, true))
    }

    /// Encrypts an application payload under the active group key.
    ///
    /// With `compress` set the payload is compressed first; the smaller of the two forms is
    /// sealed, so opting in never produces a larger envelope.
    pub fn encrypt_message(
        y: &GroupKeysState,
        plaintext: &[u8],
        compress: bool,
        rng: &Rng,
    ) -> Result<Vec<u8>, KeysError> {
        let Some(active) = y.history.active() else {
            return Err(KeysError::NoKey);
        };
        Ok(seal_message(
            active.as_bytes(),
            active.generation(),
            plaintext,
            compress,
            rng,
        )?)
    }

    /// Decrypts an envelope produced by [`GroupKeys::encrypt_message`] on any participant
    /// holding the right generation.
    pub fn decrypt_message(y: &GroupKeysState, blob: &[u8]) -> Result<Vec<u8>, KeysError> {
        let envelope = MessageEnvelope::decode(blob).map_err(KeysError::Parse)?;

        let candidates: Vec<&GroupKey> = if envelope.generation() == 0 {
            // No hint, try everything we have.
            y.history.keys().iter().collect()
        } else {
            y.history.by_generation(envelope.generation()).collect()
        };
        if candidates.is_empty() {
            return Err(KeysError::NoKey);
        }

        for key in candidates {
            if let Some(payload) = envelope.open(key.as_bytes()) {
                return Ok(envelope.unpack(payload)?);
            }
        }
        Err(KeysError::AuthFailure)
    }

    /// Serializes history, pending state and (for admins) the group secret key.
    pub fn to_bytes(y: &GroupKeysState) -> Result<Vec<u8>, KeysError> {
        Ok(encode_cbor(&KeysDump {
            history: y.history.clone(),
            group_sk: y.group_sk.clone(),
            pending: y.pending.clone(),
        })?)
    }

    /// Hands the current key set to the companion configs, active key first, so they can seal
    /// new pushes and retry merges that previously found no key.
    fn offer_keys(y: &GroupKeysState, info: &mut InfoState, members: &mut MembersState) {
        let active_id = y.history.active().map(GroupKey::id);
        let mut keys: Vec<[u8; GROUP_KEY_SIZE]> = Vec::with_capacity(y.history.len());
        if let Some(active) = y.history.active() {
            keys.push(*active.as_bytes());
        }
        for key in y.history.keys() {
            if Some(key.id()) == active_id {
                continue;
            }
            keys.push(*key.as_bytes());
        }
        GroupInfo::set_keys(info, keys.clone());
        GroupMembers::set_keys(members, keys);
    }
}

fn now_secs() -> Result<u64, SystemTimeError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

#[derive(Debug, Error)]
pub enum KeysError {
    #[error("operation requires the group secret key")]
    NotAdmin,

    #[error("group secret key does not match the group public key")]
    GroupSecretMismatch,

    #[error("key message signature does not verify against the group public key")]
    InvalidSignature,

    #[error("key message from {timestamp} is stale at {now}")]
    StaleMessage { timestamp: u64, now: u64 },

    #[error("key message generation {generation} predates the oldest retained generation {oldest}")]
    UnknownGeneration { generation: u64, oldest: u64 },

    #[error("no retained group key fits")]
    NoKey,

    #[error("message did not authenticate under any retained key of its generation")]
    AuthFailure,

    #[error("compressed message payload did not decompress")]
    Decompress,

    #[error("message payload compression failed: {0}")]
    Compression(std::io::Error),

    #[error("malformed wire input: {0}")]
    Parse(#[from] WireError),

    #[error("crypto primitive failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    SystemTime(#[from] SystemTimeError),
}

impl From<RngError> for KeysError {
    fn from(err: RngError) -> Self {
        Self::Crypto(err.into())
    }
}

impl From<Ed25519Error> for KeysError {
    fn from(err: Ed25519Error) -> Self {
        Self::Crypto(err.into())
    }
}

impl From<X25519Error> for KeysError {
    fn from(err: X25519Error) -> Self {
        Self::Crypto(err.into())
    }
}

impl From<HkdfError> for KeysError {
    fn from(err: HkdfError) -> Self {
        Self::Crypto(err.into())
    }
}

impl From<XAeadError> for KeysError {
    fn from(err: XAeadError) -> Self {
        Self::Crypto(err.into())
    }
}

impl From<GroupKeyError> for KeysError {
    fn from(err: GroupKeyError) -> Self {
        match err {
            GroupKeyError::Rng(err) => Self::Crypto(err.into()),
        }
    }
}

impl From<EnvelopeError> for KeysError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Compress(err) => Self::Compression(err),
            EnvelopeError::Decompress | EnvelopeError::TooLarge => Self::Decompress,
            EnvelopeError::Rng(err) => Self::Crypto(err.into()),
            EnvelopeError::XAead(err) => Self::Crypto(err.into()),
        }
    }
}
