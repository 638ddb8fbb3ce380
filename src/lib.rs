// SPDX-License-Identifier: MIT OR Apache-2.0

//! `group-config` manages the shared configuration of a secure-messaging group: the symmetric
//! group keys members encrypt with, and the two encrypted, mergeable configs that travel next
//! to them (the group's metadata and its member list).
//!
//! A group is identified by an Ed25519 keypair. The public half doubles as the verification
//! key for **key messages**, the signed envelopes through which admins (holders of the secret
//! half) hand out fresh group keys. Rotating the key on every membership change keeps removed
//! members out of everything written afterwards; **supplements** grant a window of existing
//! keys to newly invited members without a rotation.
//!
//! Every component is a passive state machine: operations take the state value, act on it and
//! return it together with their output. The keys engine never owns the companion configs, it
//! borrows them per call to read the member list and to hand over newly learned keys:
//!
//! ```no_run
//! use group_config::{GroupInfo, GroupKeys, GroupMembers, Rng, SigningKey};
//!
//! # fn main() -> Result<(), group_config::KeysError> {
//! let rng = Rng::default();
//! let group_identity = SigningKey::from_seed([1; 32]);
//! let my_identity = SigningKey::from_seed([2; 32]);
//!
//! let mut info = GroupInfo::init();
//! let mut members = GroupMembers::init();
//! let keys = GroupKeys::init(
//!     my_identity,
//!     group_identity.verifying_key(),
//!     Some(group_identity.clone()),
//!     None,
//!     &mut info,
//!     &mut members,
//!     &rng,
//! )?;
//!
//! // A freshly bootstrapped admin already has a key message waiting to be distributed.
//! assert!(GroupKeys::pending_config(&keys).is_some());
//! # Ok(())
//! # }
//! ```
mod cbor;
pub mod config;
mod crypto;
mod identity;
pub mod keys;

pub use cbor::{DecodeError, EncodeError};
pub use config::{
    ConfigError, GroupInfo, GroupMembers, InfoState, InviteStatus, MemberRecord, MembersState,
    PushOutput,
};
pub use crypto::ed25519::{Ed25519Error, Signature, SigningKey, VerifyingKey};
pub use crypto::hkdf::HkdfError;
pub use crypto::x25519::X25519Error;
pub use crypto::xchacha20::XAeadError;
pub use crypto::{CryptoError, Rng, RngError, Secret};
pub use identity::{IdentityError, SessionId};
pub use keys::{GroupKey, GroupKeys, GroupKeysState, KeyMessage, KeysError};
