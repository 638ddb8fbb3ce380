// SPDX-License-Identifier: MIT OR Apache-2.0

//! The group members config: the authoritative participant list with per-member attributes.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cbor::{decode_cbor, encode_cbor};
use crate::config::{merge_blobs, push_blob, ConfigCore, ConfigError, PushOutput, CONFIG_KEY_SIZE};
use crate::crypto::Rng;
use crate::identity::SessionId;

const MEMBERS_DOMAIN: &[u8] = b"group-members";

/// Where a member stands in the invitation flow.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InviteStatus {
    #[default]
    NotInvited,
    Invited,
    Accepted,
    Failed,
}

/// One participant's entry in the members config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub session_id: SessionId,
    pub name: String,
    pub admin: bool,
    pub invite_status: InviteStatus,
    /// Set while a member is being handed the group secret key to become an admin.
    pub promoted: bool,
}

impl MemberRecord {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            name: String::new(),
            admin: false,
            invite_status: InviteStatus::default(),
            promoted: false,
        }
    }

    pub fn set_invited(&mut self) {
        self.invite_status = InviteStatus::Invited;
    }

    pub fn set_accepted(&mut self) {
        self.invite_status = InviteStatus::Accepted;
    }

    pub fn set_failed(&mut self) {
        self.invite_status = InviteStatus::Failed;
    }
}

/// Operations over [`MembersState`]. The state is always passed by mutable reference; a
/// failing operation leaves it untouched.
#[derive(Debug)]
pub struct GroupMembers;

/// Serializable state of the group members config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MembersState {
    core: ConfigCore,
    data: MembersData,
}

// BTreeMap keeps dumps byte-stable across runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct MembersData {
    members: BTreeMap<SessionId, MemberRecord>,
}

impl GroupMembers {
    /// Initialises an empty members config. It can neither push nor merge until the Keys
    /// engine has offered it a group key.
    pub fn init() -> MembersState {
        MembersState {
            core: ConfigCore::new(),
            data: MembersData::default(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<MembersState, ConfigError> {
        Ok(decode_cbor(bytes)?)
    }

    pub fn to_bytes(y: &MembersState) -> Result<Vec<u8>, ConfigError> {
        Ok(encode_cbor(y)?)
    }

    pub fn get<'a>(y: &'a MembersState, session_id: &SessionId) -> Option<&'a MemberRecord> {
        y.data.members.get(session_id)
    }

    /// Returns the stored record for `session_id`, or a fresh default one to fill in and
    /// `set`.
    pub fn get_or_construct(y: &MembersState, session_id: &SessionId) -> MemberRecord {
        y.data
            .members
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| MemberRecord::new(*session_id))
    }

    pub fn set(y: &mut MembersState, member: MemberRecord) {
        y.data.members.insert(member.session_id, member);
        y.core.mark_dirty();
    }

    /// Removes a member, returning whether an entry existed.
    pub fn erase(y: &mut MembersState, session_id: &SessionId) -> bool {
        let removed = y.data.members.remove(session_id).is_some();
        if removed {
            y.core.mark_dirty();
        }
        removed
    }

    pub fn size(y: &MembersState) -> usize {
        y.data.members.len()
    }

    pub fn iter(y: &MembersState) -> impl Iterator<Item = &MemberRecord> + '_ {
        y.data.members.values()
    }

    /// Session ids of all current members, the recipient set of a rekey.
    pub(crate) fn session_ids(y: &MembersState) -> Vec<SessionId> {
        y.data.members.keys().copied().collect()
    }

    pub fn needs_push(y: &MembersState) -> bool {
        y.core.needs_push()
    }

    /// Seals the current state for distribution.
    pub fn push(y: &mut MembersState, rng: &Rng) -> Result<PushOutput, ConfigError> {
        push_blob(&mut y.core, MEMBERS_DOMAIN, &y.data, rng)
    }

    /// Records that the blob produced with `seqno` landed under `hash`.
    pub fn confirm_pushed(y: &mut MembersState, seqno: u64, hash: &str) {
        y.core.confirm(seqno, hash);
    }

    /// Ingests remote blobs; returns how many of them merged.
    pub fn merge(
        y: &mut MembersState,
        configs: &[(String, Vec<u8>)],
    ) -> Result<usize, ConfigError> {
        merge_blobs(&mut y.core, MEMBERS_DOMAIN, &mut y.data, configs)
    }

    pub(crate) fn set_keys(y: &mut MembersState, keys: Vec<[u8; CONFIG_KEY_SIZE]>) {
        y.core.set_keys(keys);
    }
}
