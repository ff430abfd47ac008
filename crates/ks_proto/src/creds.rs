//! Credentials bundle.
//!
//! Field names follow the camelCase JSON the protocol library reads and
//! writes, so rows stay interchangeable with other clients of the same
//! table. Fields this crate does not model are kept in `extra` and written
//! back untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ks_crypto::{random, CryptoError, CurveKeyPair, IdentityKeyPair, SignedPreKey};

use crate::codec::{Binary, Value};

/// Index of the signed prekey generated with a fresh bundle.
pub const INITIAL_SIGNED_PRE_KEY_ID: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPair {
    pub public: Binary,
    pub private: Binary,
}

impl From<&CurveKeyPair> for KeyPair {
    fn from(kp: &CurveKeyPair) -> Self {
        Self {
            public: Binary::from(&kp.public()[..]),
            private: Binary::from(&kp.private()[..]),
        }
    }
}

impl From<&IdentityKeyPair> for KeyPair {
    fn from(kp: &IdentityKeyPair) -> Self {
        Self {
            public: Binary::from(&kp.public()[..]),
            private: Binary::from(&kp.private()[..]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedKeyPair {
    pub key_pair: KeyPair,
    pub signature: Binary,
    pub key_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_s: Option<u64>,
}

impl From<&SignedPreKey> for SignedKeyPair {
    fn from(spk: &SignedPreKey) -> Self {
        Self {
            key_pair: KeyPair::from(&spk.key_pair),
            signature: Binary::from(&spk.signature[..]),
            key_id: spk.key_id,
            timestamp_s: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSettings {
    pub unarchive_chats: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_disappearing_mode: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub noise_key: KeyPair,
    pub pairing_ephemeral_key_pair: KeyPair,
    pub signed_identity_key: KeyPair,
    pub signed_pre_key: SignedKeyPair,
    pub registration_id: u16,
    pub adv_secret_key: String,
    #[serde(default)]
    pub processed_history_messages: Vec<Value>,
    pub next_pre_key_id: u32,
    pub first_unuploaded_pre_key_id: u32,
    #[serde(default)]
    pub account_sync_counter: u32,
    #[serde(default)]
    pub account_settings: AccountSettings,
    #[serde(default)]
    pub registered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairing_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_prop_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_info: Option<Binary>,
    /// Own contact identity, set once pairing completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_identities: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub my_app_state_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_account_sync_timestamp: Option<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Credentials {
    /// A fresh, unpaired bundle. Pure generation; nothing is persisted.
    pub fn generate() -> Self {
        let identity = IdentityKeyPair::generate();
        let signed_pre_key = SignedPreKey::generate(&identity, INITIAL_SIGNED_PRE_KEY_ID);

        Self {
            noise_key: KeyPair::from(&CurveKeyPair::generate()),
            pairing_ephemeral_key_pair: KeyPair::from(&CurveKeyPair::generate()),
            signed_identity_key: KeyPair::from(&identity),
            signed_pre_key: SignedKeyPair::from(&signed_pre_key),
            registration_id: random::registration_id(),
            adv_secret_key: random::transport_secret(),
            processed_history_messages: Vec::new(),
            next_pre_key_id: 1,
            first_unuploaded_pre_key_id: 1,
            account_sync_counter: 0,
            account_settings: AccountSettings::default(),
            registered: false,
            pairing_code: None,
            last_prop_hash: None,
            routing_info: None,
            me: None,
            account: None,
            signal_identities: None,
            platform: None,
            my_app_state_key_id: None,
            last_account_sync_timestamp: None,
            extra: BTreeMap::new(),
        }
    }

    /// Whether a device has been linked to this bundle.
    pub fn is_paired(&self) -> bool {
        self.me.as_ref().is_some_and(|me| !me.is_null())
    }

    /// Check the signed prekey signature against the identity key.
    pub fn verify_signed_pre_key(&self) -> Result<(), CryptoError> {
        SignedPreKey::verify_parts(
            self.signed_identity_key.public.as_bytes(),
            self.signed_pre_key.key_pair.public.as_bytes(),
            self.signed_pre_key.signature.as_bytes(),
        )
    }
}
