// SPDX-License-Identifier: MIT OR Apache-2.0

//! Edwards-Curve Digital Signature Algorithm (EdDSA) over Curve25519 using SHA-512.
//!
//! Secret keys use the 64-byte libsodium layout (32-byte seed followed by the 32-byte public
//! key), the format in which participants and groups exchange their long-term identities. Both
//! key halves can be mapped onto their X25519 (Montgomery) counterparts for key agreement.
use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::ZeroizeOnDrop;

use crate::crypto::sha2::sha2_512;
use crate::crypto::x25519;

pub const SEED_SIZE: usize = 32;
pub const SIGNING_KEY_SIZE: usize = 64;
pub const VERIFYING_KEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

#[derive(Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct SigningKey(#[serde(with = "serde_bytes")] [u8; SIGNING_KEY_SIZE]);

impl SigningKey {
    /// Expands a 32-byte seed into a full 64-byte signing key.
    pub fn from_seed(seed: [u8; SEED_SIZE]) -> Self {
        let verifying_key = ed25519_dalek::SigningKey::from_bytes(&seed).verifying_key();
        let mut bytes = [0u8; SIGNING_KEY_SIZE];
        bytes[..SEED_SIZE].copy_from_slice(&seed);
        bytes[SEED_SIZE..].copy_from_slice(verifying_key.as_bytes());
        Self(bytes)
    }

    /// Restores a signing key from its 64-byte (seed, public key) form.
    pub fn from_bytes(bytes: [u8; SIGNING_KEY_SIZE]) -> Self {
        // The public half is rederived from the seed on use, so a mismatching second half can
        // never produce signatures under a foreign key.
        let mut seed = [0u8; SEED_SIZE];
        seed.copy_from_slice(&bytes[..SEED_SIZE]);
        Self::from_seed(seed)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNING_KEY_SIZE] {
        &self.0
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        let mut bytes = [0u8; VERIFYING_KEY_SIZE];
        bytes.copy_from_slice(&self.0[SEED_SIZE..]);
        VerifyingKey(bytes)
    }

    pub fn sign(&self, bytes: &[u8]) -> Signature {
        let mut seed = [0u8; SEED_SIZE];
        seed.copy_from_slice(&self.0[..SEED_SIZE]);
        let signature = ed25519_dalek::SigningKey::from_bytes(&seed).sign(bytes);
        Signature(signature.to_bytes())
    }

    /// Maps the secret half onto its X25519 counterpart (the SHA-512 expansion of the seed,
    /// clamped), matching libsodium's `crypto_sign_ed25519_sk_to_curve25519`.
    pub fn to_x25519(&self) -> x25519::SecretKey {
        let expanded = sha2_512(&[&self.0[..SEED_SIZE]]);
        let mut scalar = [0u8; x25519::SECRET_KEY_SIZE];
        scalar.copy_from_slice(&expanded[..x25519::SECRET_KEY_SIZE]);
        x25519::SecretKey::from_bytes(scalar)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyingKey(#[serde(with = "serde_bytes")] [u8; VERIFYING_KEY_SIZE]);

impl VerifyingKey {
    pub fn from_bytes(bytes: [u8; VERIFYING_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; VERIFYING_KEY_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; VERIFYING_KEY_SIZE] {
        self.0
    }

    pub fn verify(&self, bytes: &[u8], signature: &Signature) -> Result<(), Ed25519Error> {
        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|_| Ed25519Error::InvalidPoint)?;
        let signature = ed25519_dalek::Signature::from_bytes(&signature.0);
        verifying_key
            .verify(bytes, &signature)
            .map_err(|_| Ed25519Error::VerificationFailed)?;
        Ok(())
    }

    /// Maps the Edwards point onto its Montgomery counterpart, matching libsodium's
    /// `crypto_sign_ed25519_pk_to_curve25519`.
    pub fn to_x25519(&self) -> Result<x25519::PublicKey, Ed25519Error> {
        let point = CompressedEdwardsY(self.0)
            .decompress()
            .ok_or(Ed25519Error::InvalidPoint)?;
        Ok(x25519::PublicKey::from_bytes(
            point.to_montgomery().to_bytes(),
        ))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "serde_bytes")] [u8; SIGNATURE_SIZE]);

impl Signature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        self.0
    }
}

#[derive(Debug, Error)]
pub enum Ed25519Error {
    #[error("signature does not match public key and payload")]
    VerificationFailed,

    #[error("bytes do not encode a valid curve point")]
    InvalidPoint,
}
