// SPDX-License-Identifier: MIT OR Apache-2.0

//! The signed key message: the envelope an admin distributes to hand out group keys.
//!
//! Wire layout, all multi-byte integers as unsigned LEB128 varints:
//!
//! ```text
//! tag          1 byte    0x01 full rekey, 0x02 supplement
//! generation   varint
//! timestamp    varint    seconds
//! keys/wrap    varint    supplement only
//! wrap count   varint
//! wraps        wrap count ×
//!   recipient hint   8 bytes   truncated BLAKE2b over the recipient session id
//!   nonce           24 bytes
//!   ciphertext      32·k + 16 bytes
//! signature    64 bytes  Ed25519 by the group secret key over everything above
//! ```
//!
//! Both tags are final formats; trailing bytes after the signature are rejected.
use crate::crypto::blake2::{blake2b_hint, HINT_SIZE};
use crate::crypto::ed25519::{Signature, SigningKey, VerifyingKey, SIGNATURE_SIZE};
use crate::crypto::hkdf::{hkdf, HkdfError};
use crate::crypto::xchacha20::{xaead_open, xaead_seal, XAeadKey, XAeadNonce, XAEAD_TAG_SIZE};
use crate::crypto::{CryptoError, Rng};
use crate::identity::SessionId;
use crate::keys::group_key::GROUP_KEY_SIZE;
use crate::keys::wire::{read_bytes, read_varint, write_varint, WireError};

use thiserror::Error;

const TAG_FULL: u8 = 0x01;
const TAG_SUPPLEMENT: u8 = 0x02;

const NONCE_SIZE: usize = 24;

/// Upper bound on the keys a single supplement wrap may carry. Far above the window senders
/// actually use, this only exists to keep malformed input from driving allocations.
const MAX_KEYS_PER_WRAP: u64 = 16;

const RECIPIENT_HINT_DOMAIN: &[u8] = b"group-config-recipient";
const WRAP_KEY_DOMAIN: &[u8] = b"group-config-wrap";

/// A single recipient-addressed ciphertext carrying group key material.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wrap {
    pub recipient_hint: [u8; HINT_SIZE],
    pub nonce: XAeadNonce,
    pub ciphertext: Vec<u8>,
}

/// Parsed form of a key message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyMessage {
    /// A fresh key of a new generation, sealed once per recipient.
    Full {
        generation: u64,
        timestamp: u64,
        wraps: Vec<Wrap>,
    },

    /// `keys_per_wrap` already-issued keys at consecutive generations (`generation` downwards,
    /// newest first), sealed once per added recipient.
    Supplement {
        generation: u64,
        timestamp: u64,
        keys_per_wrap: u64,
        wraps: Vec<Wrap>,
    },
}

impl KeyMessage {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Full { generation, .. } | Self::Supplement { generation, .. } => *generation,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Full { timestamp, .. } | Self::Supplement { timestamp, .. } => *timestamp,
        }
    }

    pub fn wraps(&self) -> &[Wrap] {
        match self {
            Self::Full { wraps, .. } | Self::Supplement { wraps, .. } => wraps,
        }
    }

    pub fn is_supplement(&self) -> bool {
        matches!(self, Self::Supplement { .. })
    }

    /// Number of keys inside each wrap ciphertext.
    pub fn keys_per_wrap(&self) -> u64 {
        match self {
            Self::Full { .. } => 1,
            Self::Supplement { keys_per_wrap, .. } => *keys_per_wrap,
        }
    }

    /// Serializes the message and signs it with the group secret key.
    pub fn encode(&self, group_sk: &SigningKey) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Self::Full { .. } => buf.push(TAG_FULL),
            Self::Supplement { .. } => buf.push(TAG_SUPPLEMENT),
        }
        write_varint(&mut buf, self.generation());
        write_varint(&mut buf, self.timestamp());
        if let Self::Supplement { keys_per_wrap, .. } = self {
            write_varint(&mut buf, *keys_per_wrap);
        }
        write_varint(&mut buf, self.wraps().len() as u64);
        for wrap in self.wraps() {
            buf.extend_from_slice(&wrap.recipient_hint);
            buf.extend_from_slice(&wrap.nonce);
            buf.extend_from_slice(&wrap.ciphertext);
        }
        let signature = group_sk.sign(&buf);
        buf.extend_from_slice(signature.as_bytes());
        buf
    }

    /// Parses a blob and verifies its signature against the group public key.
    pub fn decode(bytes: &[u8], group_pk: &VerifyingKey) -> Result<Self, KeyMessageError> {
        if bytes.len() <= SIGNATURE_SIZE {
            return Err(WireError::UnexpectedEnd.into());
        }
        let (signed, signature) = bytes.split_at(bytes.len() - SIGNATURE_SIZE);
        let signature = Signature::from_bytes(
            signature
                .try_into()
                .expect("split leaves exactly 64 signature bytes"),
        );
        group_pk
            .verify(signed, &signature)
            .map_err(|_| KeyMessageError::InvalidSignature)?;

        let mut input = signed;
        let tag = read_bytes(&mut input, 1)?[0];
        let generation = read_varint(&mut input)?;
        let timestamp = read_varint(&mut input)?;

        let keys_per_wrap = match tag {
            TAG_FULL => 1,
            TAG_SUPPLEMENT => {
                let count = read_varint(&mut input)?;
                if count == 0 || count > MAX_KEYS_PER_WRAP {
                    return Err(WireError::InvalidKeyCount(count).into());
                }
                count
            }
            other => return Err(WireError::UnknownTag(other).into()),
        };
        let ciphertext_size = keys_per_wrap as usize * GROUP_KEY_SIZE + XAEAD_TAG_SIZE;
        let wrap_size = HINT_SIZE + NONCE_SIZE + ciphertext_size;

        let wrap_count = read_varint(&mut input)?;
        if wrap_count.checked_mul(wrap_size as u64) != Some(input.len() as u64) {
            return Err(WireError::InvalidWrapCount(wrap_count).into());
        }

        let mut wraps = Vec::with_capacity(wrap_count as usize);
        for _ in 0..wrap_count {
            let recipient_hint = read_bytes(&mut input, HINT_SIZE)?
                .try_into()
                .expect("read_bytes returns the requested length");
            let nonce = read_bytes(&mut input, NONCE_SIZE)?
                .try_into()
                .expect("read_bytes returns the requested length");
            let ciphertext = read_bytes(&mut input, ciphertext_size)?.to_vec();
            wraps.push(Wrap {
                recipient_hint,
                nonce,
                ciphertext,
            });
        }
        if !input.is_empty() {
            return Err(WireError::TrailingBytes.into());
        }

        Ok(match tag {
            TAG_FULL => Self::Full {
                generation,
                timestamp,
                wraps,
            },
            _ => Self::Supplement {
                generation,
                timestamp,
                keys_per_wrap,
                wraps,
            },
        })
    }
}

/// Short, non-secret marker telling a recipient which wraps might be theirs.
pub(crate) fn recipient_hint(session_id: &SessionId) -> [u8; HINT_SIZE] {
    blake2b_hint(RECIPIENT_HINT_DOMAIN, session_id.as_bytes())
}

/// Derives the symmetric key a wrap is sealed under from an X25519 agreement, bound to the
/// group identity and the key generation.
pub(crate) fn derive_wrap_key(
    agreement: &[u8; 32],
    group_pk: &VerifyingKey,
    generation: u64,
) -> Result<XAeadKey, HkdfError> {
    let mut info = Vec::with_capacity(WRAP_KEY_DOMAIN.len() + 8);
    info.extend_from_slice(WRAP_KEY_DOMAIN);
    info.extend_from_slice(&generation.to_le_bytes());
    hkdf(group_pk.as_bytes(), agreement, &info)
}

/// Seals `payload` for one recipient. The recipient hint doubles as associated data, tying the
/// ciphertext to its addressing.
pub(crate) fn seal_wrap(
    agreement: &[u8; 32],
    recipient: &SessionId,
    group_pk: &VerifyingKey,
    generation: u64,
    payload: &[u8],
    rng: &Rng,
) -> Result<Wrap, CryptoError> {
    let wrap_key = derive_wrap_key(agreement, group_pk, generation)?;
    let hint = recipient_hint(recipient);
    let nonce: XAeadNonce = rng.random_array()?;
    let ciphertext = xaead_seal(&wrap_key, payload, nonce, &hint)?;
    Ok(Wrap {
        recipient_hint: hint,
        nonce,
        ciphertext,
    })
}

/// Tries to open a wrap with the given agreement. `None` means the wrap was not sealed for this
/// agreement (or was tampered with), which is not an error during scanning.
pub(crate) fn open_wrap(
    wrap: &Wrap,
    agreement: &[u8; 32],
    group_pk: &VerifyingKey,
    generation: u64,
) -> Result<Option<Vec<u8>>, HkdfError> {
    let wrap_key = derive_wrap_key(agreement, group_pk, generation)?;
    Ok(xaead_open(&wrap_key, &wrap.ciphertext, wrap.nonce, &wrap.recipient_hint).ok())
}

#[derive(Debug, Error)]
pub enum KeyMessageError {
    #[error("key message signature does not verify against the group public key")]
    InvalidSignature,

    #[error(transparent)]
    Wire(#[from] WireError),
}
