// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographic primitives and random number generator.
//!
//! Algorithms:
//! - Ed25519 (SHA512) DSA with libsodium-layout 64-byte secret keys
//! - Ed25519 to X25519 birational key conversion
//! - X25519 ECDH key agreement
//! - SHA256 HKDF
//! - XChaCha20Poly1305 AEAD (large IVs)
//! - BLAKE2b (truncated, domain-separated hints)
//!
//! Random Number Generator:
//! - ChaCha20 stream cipher, seeded via `getrandom`
pub mod blake2;
pub mod ed25519;
pub mod hkdf;
mod rng;
mod secret;
pub mod sha2;
pub mod x25519;
pub mod xchacha20;

use thiserror::Error;

pub use rng::{Rng, RngError};
pub use secret::Secret;

/// Umbrella over the primitive failure modes, so callers can treat "some
/// crypto operation failed" as one error kind.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    Ed25519(#[from] ed25519::Ed25519Error),

    #[error(transparent)]
    X25519(#[from] x25519::X25519Error),

    #[error(transparent)]
    Hkdf(#[from] hkdf::HkdfError),

    #[error(transparent)]
    XAead(#[from] xchacha20::XAeadError),
}
