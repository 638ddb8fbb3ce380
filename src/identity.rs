// SPDX-License-Identifier: MIT OR Apache-2.0

//! Public participant identifiers.
//!
//! A session id is the byte `0x05` followed by the X25519 public key derived from a
//! participant's Ed25519 identity. Groups are addressed the same way, through the session id
//! derived from the group's public key.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::ed25519::{Ed25519Error, VerifyingKey};
use crate::crypto::x25519;

pub const SESSION_ID_SIZE: usize = 33;
pub const SESSION_ID_HEX_SIZE: usize = 66;

const SESSION_ID_PREFIX: u8 = 0x05;

/// Binary session id, `0x05 || x25519_public_key`.
///
/// The canonical textual form is lowercase hex (66 characters); parsing accepts any case.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(#[serde(with = "serde_bytes")] [u8; SESSION_ID_SIZE]);

impl SessionId {
    /// Derives the session id belonging to an Ed25519 identity.
    pub fn from_verifying_key(verifying_key: &VerifyingKey) -> Result<Self, Ed25519Error> {
        Ok(Self::from_x25519(&verifying_key.to_x25519()?))
    }

    pub(crate) fn from_x25519(public_key: &x25519::PublicKey) -> Self {
        let mut bytes = [0u8; SESSION_ID_SIZE];
        bytes[0] = SESSION_ID_PREFIX;
        bytes[1..].copy_from_slice(public_key.as_bytes());
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SESSION_ID_SIZE]) -> Result<Self, IdentityError> {
        if bytes[0] != SESSION_ID_PREFIX {
            return Err(IdentityError::InvalidPrefix(bytes[0]));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_ID_SIZE] {
        &self.0
    }

    /// Returns the canonical lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The X25519 public key addressed by this session id.
    pub(crate) fn x25519_key(&self) -> x25519::PublicKey {
        let mut bytes = [0u8; x25519::PUBLIC_KEY_SIZE];
        bytes.copy_from_slice(&self.0[1..]);
        x25519::PublicKey::from_bytes(bytes)
    }
}

impl FromStr for SessionId {
    type Err = IdentityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() != SESSION_ID_HEX_SIZE {
            return Err(IdentityError::InvalidLength(value.len()));
        }
        let decoded = hex::decode(value).map_err(|_| IdentityError::InvalidHex)?;
        let bytes: [u8; SESSION_ID_SIZE] = decoded
            .try_into()
            .expect("hex string of checked length decodes to 33 bytes");
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.to_hex())
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("session id starts with 0x{0:02x} instead of 0x05")]
    InvalidPrefix(u8),

    #[error("session id hex form must be 66 characters, got {0}")]
    InvalidLength(usize),

    #[error("session id is not valid hex")]
    InvalidHex,
}

#[cfg(test)]
mod tests {
    use crate::crypto::ed25519::SigningKey;

    use super::SessionId;

    #[test]
    fn hex_roundtrip_and_case() {
        let signing_key = SigningKey::from_seed([5; 32]);
        let session_id = SessionId::from_verifying_key(&signing_key.verifying_key()).unwrap();

        let lower = session_id.to_hex();
        assert_eq!(lower.len(), 66);
        assert!(lower.starts_with("05"));
        assert_eq!(lower, lower.to_lowercase());

        let reparsed: SessionId = lower.parse().unwrap();
        assert_eq!(reparsed, session_id);

        // Input is case-insensitive, output stays canonical.
        let shouty: SessionId = lower.to_uppercase().parse().unwrap();
        assert_eq!(shouty, session_id);
        assert_eq!(shouty.to_hex(), lower);
    }

    #[test]
    fn known_derivation() {
        // Known-answer vector for the seed-to-session-id derivation.
        let seed: [u8; 32] =
            hex::decode("0123456789abcdef0123456789abcdeffedcba9876543210fedcba9876543210")
                .unwrap()
                .try_into()
                .unwrap();
        let signing_key = SigningKey::from_seed(seed);
        let session_id = SessionId::from_verifying_key(&signing_key.verifying_key()).unwrap();
        assert_eq!(
            session_id.to_hex(),
            "05f1e8b64bbf761edf8f7b47e3a1f369985644cce0a62adb8e21604474bdd49627"
        );
    }

    #[test]
    fn rejected_forms() {
        assert!("05f1e8".parse::<SessionId>().is_err());
        assert!(
            "06f1e8b64bbf761edf8f7b47e3a1f369985644cce0a62adb8e21604474bdd49627"
                .parse::<SessionId>()
                .is_err()
        );
        assert!(
            "zzf1e8b64bbf761edf8f7b47e3a1f369985644cce0a62adb8e21604474bdd49627"
                .parse::<SessionId>()
                .is_err()
        );
    }
}
