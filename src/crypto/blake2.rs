// SPDX-License-Identifier: MIT OR Apache-2.0

//! Truncated BLAKE2b hashing for short, domain-separated identifiers.
use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;

/// Size of short hash hints, e.g. the per-recipient markers inside key messages.
pub const HINT_SIZE: usize = 8;

/// Returns an 8-byte BLAKE2b digest over `domain || message`.
///
/// The domain prefix keeps digests of the same payload apart across unrelated
/// protocol contexts.
pub fn blake2b_hint(domain: &[u8], message: &[u8]) -> [u8; HINT_SIZE] {
    let mut hasher = Blake2bVar::new(HINT_SIZE).expect("valid blake2b output size");
    hasher.update(domain);
    hasher.update(message);
    let mut out = [0u8; HINT_SIZE];
    hasher
        .finalize_variable(&mut out)
        .expect("output buffer matches configured size");
    out
}

#[cfg(test)]
mod tests {
    use super::blake2b_hint;

    #[test]
    fn domain_separation() {
        let hint_1 = blake2b_hint(b"context-a", b"same payload");
        let hint_2 = blake2b_hint(b"context-b", b"same payload");
        let hint_3 = blake2b_hint(b"context-a", b"same payload");
        assert_ne!(hint_1, hint_2);
        assert_eq!(hint_1, hint_3);
    }
}
