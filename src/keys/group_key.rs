// SPDX-License-Identifier: MIT OR Apache-2.0

//! Symmetric group keys and the bounded history a participant retains of them.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::sha2::{sha2_256, SHA256_DIGEST_SIZE};
use crate::crypto::{Rng, RngError, Secret};

/// 256-bit symmetric group key.
pub const GROUP_KEY_SIZE: usize = 32;

/// Number of distinct generations a participant keeps around to decrypt older messages and
/// config blobs. Anything older falls out of the retention window.
pub const KEY_RETENTION_GENERATIONS: u64 = 8;

/// Public identifier for each group key, the SHA256 digest of the key itself.
///
/// Lets the receiver of a ciphertext pick the right key without revealing it.
pub type GroupKeyId = [u8; SHA256_DIGEST_SIZE];

/// Monotone counter assigned when a key is issued. Higher generations supersede lower ones.
pub type Generation = u64;

/// UNIX timestamp (seconds) taken from the key message that issued the key.
pub type Timestamp = u64;

/// A group key together with the issue metadata it travelled with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupKey {
    secret: Secret<GROUP_KEY_SIZE>,
    generation: Generation,
    timestamp: Timestamp,
}

impl GroupKey {
    pub(crate) fn new(bytes: [u8; GROUP_KEY_SIZE], generation: Generation, timestamp: Timestamp) -> Self {
        Self {
            secret: Secret::from_bytes(bytes),
            generation,
            timestamp,
        }
    }

    pub(crate) fn from_rng(
        rng: &Rng,
        generation: Generation,
        timestamp: Timestamp,
    ) -> Result<Self, GroupKeyError> {
        let bytes: [u8; GROUP_KEY_SIZE] = rng.random_array()?;
        Ok(Self::new(bytes, generation, timestamp))
    }

    /// Returns the identifier (SHA256 fingerprint) for this key.
    pub fn id(&self) -> GroupKeyId {
        sha2_256(&[self.secret.as_bytes()])
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub(crate) fn as_bytes(&self) -> &[u8; GROUP_KEY_SIZE] {
        self.secret.as_bytes()
    }
}

/// Ordered collection of the group keys a participant holds.
///
/// Keys are kept newest-generation-first and deduplicated by fingerprint. The "active" key used
/// for outgoing encryption is tracked separately from the ordering: it follows the most recently
/// issued or loaded key message, so that concurrent keys of the same generation still converge
/// on whatever the last rekey distributed.
#[derive(Debug)]
pub struct KeyHistory;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHistoryState {
    keys: Vec<GroupKey>,
    active: Option<GroupKeyId>,
}

impl KeyHistoryState {
    /// Returns the key used for outgoing encryption.
    pub fn active(&self) -> Option<&GroupKey> {
        self.active
            .as_ref()
            .and_then(|id| self.keys.iter().find(|key| &key.id() == id))
    }

    /// Returns all retained keys, newest generation first.
    pub fn keys(&self) -> &[GroupKey] {
        &self.keys
    }

    /// Returns every retained key of the given generation.
    pub fn by_generation(&self, generation: Generation) -> impl Iterator<Item = &GroupKey> + '_ {
        self.keys
            .iter()
            .filter(move |key| key.generation() == generation)
    }

    pub fn contains(&self, id: &GroupKeyId) -> bool {
        self.keys.iter().any(|key| &key.id() == id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The highest generation seen so far, 0 when nothing is held.
    pub fn max_generation(&self) -> Generation {
        self.keys.first().map(GroupKey::generation).unwrap_or(0)
    }

    /// The smallest generation still retained.
    pub fn min_generation(&self) -> Option<Generation> {
        self.keys.last().map(GroupKey::generation)
    }
}

impl KeyHistory {
    /// Initialises an empty history.
    pub fn init() -> KeyHistoryState {
        KeyHistoryState {
            keys: Vec::new(),
            active: None,
        }
    }

    /// Inserts a key at its sorted position, ignoring fingerprint duplicates.
    ///
    /// Keys of equal generation are ordered by fingerprint so that two participants holding the
    /// same set agree on the same layout.
    pub fn insert(mut y: KeyHistoryState, key: GroupKey) -> KeyHistoryState {
        let id = key.id();
        if y.contains(&id) {
            return y;
        }
        let position = y
            .keys
            .iter()
            .position(|held| {
                (key.generation(), id) > (held.generation(), held.id())
            })
            .unwrap_or(y.keys.len());
        y.keys.insert(position, key);
        y
    }

    /// Marks the key with the given fingerprint as active. A fingerprint not present in the
    /// history is ignored.
    pub fn activate(mut y: KeyHistoryState, id: GroupKeyId) -> KeyHistoryState {
        if y.contains(&id) {
            y.active = Some(id);
        }
        y
    }

    /// Drops keys whose generation has fallen out of the retention window.
    pub fn prune(mut y: KeyHistoryState) -> KeyHistoryState {
        let newest = y.max_generation();
        let oldest_kept = newest.saturating_sub(KEY_RETENTION_GENERATIONS - 1);
        y.keys.retain(|key| key.generation() >= oldest_kept);
        if let Some(active) = &y.active {
            if !y.keys.iter().any(|key| &key.id() == active) {
                y.active = None;
            }
        }
        y
    }
}

#[derive(Debug, Error)]
pub enum GroupKeyError {
    #[error(transparent)]
    Rng(#[from] RngError),
}

#[cfg(test)]
mod tests {
    use super::{GroupKey, KeyHistory, KEY_RETENTION_GENERATIONS};

    #[test]
    fn ordering_and_dedup() {
        let history = KeyHistory::init();
        assert!(history.is_empty());
        assert_eq!(history.max_generation(), 0);

        let key_2 = GroupKey::new([2; 32], 2, 200);
        let key_1 = GroupKey::new([1; 32], 1, 100);
        let key_3 = GroupKey::new([3; 32], 3, 300);

        let history = KeyHistory::insert(history, key_2.clone());
        let history = KeyHistory::insert(history, key_3.clone());
        let history = KeyHistory::insert(history, key_1.clone());

        let generations: Vec<u64> = history.keys().iter().map(GroupKey::generation).collect();
        assert_eq!(generations, vec![3, 2, 1]);
        assert_eq!(history.min_generation(), Some(1));

        // Re-inserting the same key bytes changes nothing.
        let history = KeyHistory::insert(history, GroupKey::new([2; 32], 2, 999));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn equal_generations_share_a_layout() {
        let key_a = GroupKey::new([4; 32], 1, 100);
        let key_b = GroupKey::new([5; 32], 1, 100);

        let forwards = KeyHistory::insert(KeyHistory::insert(KeyHistory::init(), key_a.clone()), key_b.clone());
        let backwards = KeyHistory::insert(KeyHistory::insert(KeyHistory::init(), key_b), key_a);
        assert_eq!(forwards.keys(), backwards.keys());
    }

    #[test]
    fn active_follows_explicit_choice() {
        let key_a = GroupKey::new([6; 32], 1, 100);
        let key_b = GroupKey::new([7; 32], 1, 100);

        let history = KeyHistory::insert(KeyHistory::init(), key_a.clone());
        let history = KeyHistory::insert(history, key_b.clone());
        assert!(history.active().is_none());

        let history = KeyHistory::activate(history, key_a.id());
        assert_eq!(history.active(), Some(&key_a));

        // Activating an unknown fingerprint is ignored.
        let history = KeyHistory::activate(history, GroupKey::new([8; 32], 9, 0).id());
        assert_eq!(history.active(), Some(&key_a));
    }

    #[test]
    fn retention_window() {
        let mut history = KeyHistory::init();
        for generation in 1..=KEY_RETENTION_GENERATIONS + 3 {
            history = KeyHistory::insert(
                history,
                GroupKey::new([generation as u8; 32], generation, generation * 10),
            );
        }
        history = KeyHistory::prune(history);

        assert_eq!(history.len(), KEY_RETENTION_GENERATIONS as usize);
        assert_eq!(history.min_generation(), Some(4));
        assert_eq!(history.max_generation(), KEY_RETENTION_GENERATIONS + 3);
    }
}
