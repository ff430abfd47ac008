//! ks_proto — stored record types and serialisation for Keystash
//!
//! Every record is stored as JSON text. Binary payloads (key material,
//! signatures, routing blobs) are tagged so they survive the trip through
//! a text column byte-for-byte.
//!
//! # Modules
//! - `codec` — `Value` tree, `Binary` newtype, serialize/deserialize
//! - `creds` — the credentials bundle and its generator
//! - `keys`  — logical keys, key categories and keyed record values

pub mod codec;
pub mod creds;
pub mod keys;

pub use codec::{Binary, CodecError, Value};
pub use creds::{AccountSettings, Credentials, KeyPair, SignedKeyPair};
pub use keys::{
    AppStateSyncKeyData, AppStateSyncKeyFingerprint, KeyCategory, KeyValue, KeyedCollection,
    LogicalKey, CREDS_KEY,
};
