// SPDX-License-Identifier: MIT OR Apache-2.0

//! Self-describing envelope for application payloads encrypted under a group key.
//!
//! ```text
//! version    1 byte    0x01
//! flags      1 byte    bit0 = payload is zstd-compressed
//! gen hint   varint    generation of the sealing key, 0 when unknown
//! nonce      24 bytes
//! ciphertext rest      XChaCha20Poly1305, AAD = all preceding envelope bytes
//! ```
use thiserror::Error;

use crate::crypto::xchacha20::{xaead_open, xaead_seal, XAeadError, XAeadKey, XAeadNonce};
use crate::crypto::{Rng, RngError};
use crate::keys::wire::{read_bytes, read_varint, write_varint, WireError};

const ENVELOPE_VERSION: u8 = 0x01;
const FLAG_COMPRESSED: u8 = 0b0000_0001;

const NONCE_SIZE: usize = 24;
const COMPRESSION_LEVEL: i32 = 3;

/// Decompression bomb guard.
const MAX_PLAINTEXT_SIZE: usize = 64 * 1024 * 1024;

/// Seals an application payload under the given group key.
///
/// With `compress` set the payload is zstd-compressed first, but the compressed form is only
/// kept when it is strictly smaller than the original, so compression never costs size.
pub(crate) fn seal_message(
    key: &XAeadKey,
    generation: u64,
    plaintext: &[u8],
    compress: bool,
    rng: &Rng,
) -> Result<Vec<u8>, EnvelopeError> {
    let mut flags = 0u8;
    let compressed;
    let payload: &[u8] = if compress {
        compressed = zstd::encode_all(plaintext, COMPRESSION_LEVEL).map_err(EnvelopeError::Compress)?;
        if compressed.len() < plaintext.len() {
            flags |= FLAG_COMPRESSED;
            &compressed
        } else {
            plaintext
        }
    } else {
        plaintext
    };

    let mut buf = vec![ENVELOPE_VERSION, flags];
    write_varint(&mut buf, generation);
    let nonce: XAeadNonce = rng.random_array()?;
    buf.extend_from_slice(&nonce);

    let ciphertext = xaead_seal(key, payload, nonce, &buf)?;
    buf.extend_from_slice(&ciphertext);
    Ok(buf)
}

/// Parsed envelope, ready for key lookup and an open attempt.
#[derive(Debug)]
pub(crate) struct MessageEnvelope {
    compressed: bool,
    generation: u64,
    nonce: XAeadNonce,
    prefix: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl MessageEnvelope {
    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut input = bytes;
        let version = read_bytes(&mut input, 1)?[0];
        if version != ENVELOPE_VERSION {
            return Err(WireError::UnknownVersion(version));
        }
        let flags = read_bytes(&mut input, 1)?[0];
        let generation = read_varint(&mut input)?;
        let nonce: XAeadNonce = read_bytes(&mut input, NONCE_SIZE)?
            .try_into()
            .expect("read_bytes returns the requested length");

        let prefix = bytes[..bytes.len() - input.len()].to_vec();
        Ok(Self {
            compressed: flags & FLAG_COMPRESSED != 0,
            generation,
            nonce,
            prefix,
            ciphertext: input.to_vec(),
        })
    }

    /// Generation hint of the sealing key; 0 when the sender left it out.
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Attempts to open the ciphertext with one key. `None` means this key does not
    /// authenticate the envelope.
    pub(crate) fn open(&self, key: &XAeadKey) -> Option<Vec<u8>> {
        xaead_open(key, &self.ciphertext, self.nonce, &self.prefix).ok()
    }

    /// Undoes the compression flag on an opened payload.
    pub(crate) fn unpack(&self, payload: Vec<u8>) -> Result<Vec<u8>, EnvelopeError> {
        if !self.compressed {
            return Ok(payload);
        }
        let plaintext =
            zstd::decode_all(payload.as_slice()).map_err(|_| EnvelopeError::Decompress)?;
        if plaintext.len() > MAX_PLAINTEXT_SIZE {
            return Err(EnvelopeError::TooLarge);
        }
        Ok(plaintext)
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("could not compress payload: {0}")]
    Compress(std::io::Error),

    #[error("compressed payload did not decompress")]
    Decompress,

    #[error("decompressed payload exceeds the size limit")]
    TooLarge,

    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    XAead(#[from] XAeadError),
}

#[cfg(test)]
mod tests {
    use crate::crypto::Rng;
    use crate::keys::wire::WireError;

    use super::{seal_message, MessageEnvelope};

    #[test]
    fn seal_open_roundtrip() {
        let rng = Rng::from_seed([1; 32]);
        let key = rng.random_array().unwrap();

        for compress in [false, true] {
            let blob = seal_message(&key, 3, b"short payload", compress, &rng).unwrap();
            let envelope = MessageEnvelope::decode(&blob).unwrap();
            assert_eq!(envelope.generation(), 3);
            let payload = envelope.open(&key).unwrap();
            assert_eq!(envelope.unpack(payload).unwrap(), b"short payload");
        }
    }

    #[test]
    fn incompressible_payload_stays_plain() {
        let rng = Rng::from_seed([2; 32]);
        let key = rng.random_array().unwrap();
        let noise: [u8; 64] = rng.random_array().unwrap();

        // Random bytes grow under compression, so both forms end up the same size.
        let asked = seal_message(&key, 1, &noise, true, &rng).unwrap();
        let plain = seal_message(&key, 1, &noise, false, &rng).unwrap();
        assert_eq!(asked.len(), plain.len());

        let envelope = MessageEnvelope::decode(&asked).unwrap();
        let payload = envelope.open(&key).unwrap();
        assert_eq!(envelope.unpack(payload).unwrap(), noise);
    }

    #[test]
    fn wrong_key_and_tamper() {
        let rng = Rng::from_seed([3; 32]);
        let key = rng.random_array().unwrap();
        let other_key = rng.random_array().unwrap();

        let blob = seal_message(&key, 2, b"group business", true, &rng).unwrap();
        let envelope = MessageEnvelope::decode(&blob).unwrap();
        assert!(envelope.open(&other_key).is_none());

        // Flipping a prefix bit breaks the AAD binding.
        let mut tampered = blob.clone();
        tampered[1] ^= 0b0000_0010;
        let envelope = MessageEnvelope::decode(&tampered).unwrap();
        assert!(envelope.open(&key).is_none());
    }

    #[test]
    fn rejects_unknown_version() {
        let mut blob = vec![0x02, 0x00];
        blob.extend_from_slice(&[0; 40]);
        assert!(matches!(
            MessageEnvelope::decode(&blob),
            Err(WireError::UnknownVersion(0x02))
        ));
    }
}
