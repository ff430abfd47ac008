//! Logical keys and keyed record values.
//!
//! A logical key is either the credentials record (`auth_creds`) or a
//! `category-id` pair. Categories are the namespaces the protocol library
//! stores auxiliary records under; unknown ones are carried verbatim.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec::{self, Binary, CodecError, Value};

pub const CREDS_KEY: &str = "auth_creds";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyCategory {
    PreKey,
    Session,
    SenderKey,
    SenderKeyMemory,
    AppStateSyncKey,
    AppStateSyncVersion,
    LidMapping,
    DeviceList,
    TcToken,
    IdentityKey,
    Other(String),
}

impl KeyCategory {
    pub fn as_str(&self) -> &str {
        match self {
            KeyCategory::PreKey => "pre-key",
            KeyCategory::Session => "session",
            KeyCategory::SenderKey => "sender-key",
            KeyCategory::SenderKeyMemory => "sender-key-memory",
            KeyCategory::AppStateSyncKey => "app-state-sync-key",
            KeyCategory::AppStateSyncVersion => "app-state-sync-version",
            KeyCategory::LidMapping => "lid-mapping",
            KeyCategory::DeviceList => "device-list",
            KeyCategory::TcToken => "tctoken",
            KeyCategory::IdentityKey => "identity-key",
            KeyCategory::Other(name) => name,
        }
    }
}

impl From<&str> for KeyCategory {
    fn from(s: &str) -> Self {
        match s {
            "pre-key" => KeyCategory::PreKey,
            "session" => KeyCategory::Session,
            "sender-key" => KeyCategory::SenderKey,
            "sender-key-memory" => KeyCategory::SenderKeyMemory,
            "app-state-sync-key" => KeyCategory::AppStateSyncKey,
            "app-state-sync-version" => KeyCategory::AppStateSyncVersion,
            "lid-mapping" => KeyCategory::LidMapping,
            "device-list" => KeyCategory::DeviceList,
            "tctoken" => KeyCategory::TcToken,
            "identity-key" => KeyCategory::IdentityKey,
            other => KeyCategory::Other(other.to_owned()),
        }
    }
}

impl FromStr for KeyCategory {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for KeyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for KeyCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for KeyCategory {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(Self::from(String::deserialize(d)?.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalKey {
    Credentials,
    Keyed { category: KeyCategory, id: String },
}

impl LogicalKey {
    pub fn keyed(category: KeyCategory, id: impl Into<String>) -> Self {
        LogicalKey::Keyed {
            category,
            id: id.into(),
        }
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalKey::Credentials => f.write_str(CREDS_KEY),
            LogicalKey::Keyed { category, id } => write!(f, "{category}-{id}"),
        }
    }
}

// ── App state sync keys ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStateSyncKeyFingerprint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_index: Option<u32>,
    #[serde(default)]
    pub device_indexes: Vec<u32>,
}

/// Key material for app state (history/settings) sync. Rebuilt from its
/// stored shape on read instead of being handed back as a loose tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStateSyncKeyData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_data: Option<Binary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<AppStateSyncKeyFingerprint>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "long_timestamp"
    )]
    pub timestamp: Option<i64>,
}

/// 64-bit integers arrive as plain numbers, decimal strings, or split
/// `{low, high}` words depending on which client wrote the row.
#[derive(Deserialize)]
#[serde(untagged)]
enum LongRepr {
    Int(i64),
    Text(String),
    Words { low: i32, high: i32 },
}

impl LongRepr {
    fn into_i64(self) -> Result<i64, String> {
        match self {
            LongRepr::Int(n) => Ok(n),
            LongRepr::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| format!("invalid 64-bit integer {s:?}")),
            LongRepr::Words { low, high } => {
                Ok((i64::from(high) << 32) | i64::from(low as u32))
            }
        }
    }
}

fn long_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Option::<LongRepr>::deserialize(d)?
        .map(LongRepr::into_i64)
        .transpose()
        .map_err(serde::de::Error::custom)
}

// ── Keyed values ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    AppStateSyncKey(AppStateSyncKeyData),
    Raw(Value),
}

/// category → (id → value, or `None` to delete).
pub type KeyedCollection = HashMap<KeyCategory, HashMap<String, Option<KeyValue>>>;

impl KeyValue {
    /// Decode stored text the way `category` expects it.
    pub fn decode(category: &KeyCategory, text: &str) -> Result<Self, CodecError> {
        match category {
            KeyCategory::AppStateSyncKey => {
                Ok(KeyValue::AppStateSyncKey(codec::deserialize(text)?))
            }
            _ => Ok(KeyValue::Raw(codec::deserialize(text)?)),
        }
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        match self {
            KeyValue::AppStateSyncKey(data) => codec::serialize(data),
            KeyValue::Raw(value) => codec::serialize(value),
        }
    }

    pub fn as_raw(&self) -> Option<&Value> {
        match self {
            KeyValue::Raw(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_app_state_sync_key(&self) -> Option<&AppStateSyncKeyData> {
        match self {
            KeyValue::AppStateSyncKey(data) => Some(data),
            _ => None,
        }
    }

    /// A `Value` view of either variant, for display.
    pub fn to_value(&self) -> Result<Value, CodecError> {
        match self {
            KeyValue::AppStateSyncKey(data) => codec::to_value(data),
            KeyValue::Raw(value) => Ok(value.clone()),
        }
    }
}

impl From<Value> for KeyValue {
    fn from(value: Value) -> Self {
        KeyValue::Raw(value)
    }
}

impl From<AppStateSyncKeyData> for KeyValue {
    fn from(data: AppStateSyncKeyData) -> Self {
        KeyValue::AppStateSyncKey(data)
    }
}
