// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hashed Message Authentication Code (HMAC)-based key derivation function (HKDF) using
//! "hash-mode" with SHA256.
//!
//! <https://www.rfc-editor.org/rfc/rfc5869>
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

pub fn hkdf<const N: usize>(salt: &[u8], ikm: &[u8], info: &[u8]) -> Result<[u8; N], HkdfError> {
    let salt = if salt.is_empty() { None } else { Some(salt) };
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = [0u8; N];
    hk.expand(info, &mut okm)
        .map_err(|_| HkdfError::InvalidArguments)?;
    Ok(okm)
}

#[derive(Debug, Error)]
pub enum HkdfError {
    #[error("arguments too large for hkdf")]
    InvalidArguments,
}

#[cfg(test)]
mod tests {
    use super::hkdf;

    #[test]
    fn derivation_is_deterministic() {
        let okm_1: [u8; 32] = hkdf(b"salt", b"input key material", b"info").unwrap();
        let okm_2: [u8; 32] = hkdf(b"salt", b"input key material", b"info").unwrap();
        assert_eq!(okm_1, okm_2);
    }

    #[test]
    fn every_argument_matters() {
        let okm: [u8; 32] = hkdf(b"salt", b"ikm", b"info").unwrap();
        let other_salt: [u8; 32] = hkdf(b"pepper", b"ikm", b"info").unwrap();
        let other_ikm: [u8; 32] = hkdf(b"salt", b"mki", b"info").unwrap();
        let other_info: [u8; 32] = hkdf(b"salt", b"ikm", b"ofni").unwrap();
        assert_ne!(okm, other_salt);
        assert_ne!(okm, other_ikm);
        assert_ne!(okm, other_info);
    }
}
