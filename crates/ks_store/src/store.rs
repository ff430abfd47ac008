//! Session-scoped store over a row backend.

use std::collections::HashMap;

use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ks_proto::{codec, Credentials, KeyCategory, KeyValue, KeyedCollection, LogicalKey};

use crate::backend::AuthDataBackend;
use crate::db::KEY_COLUMN_LEN;
use crate::error::StoreError;

pub const SESSION_SEPARATOR: char = ':';
pub const MAX_SESSION_ID_LEN: usize = 64;

/// A session id may not contain the separator: `"a"` would otherwise own
/// every row of `"a:b"` under prefix deletion.
pub fn validate_session_id(id: &str) -> Result<(), StoreError> {
    let reason = if id.is_empty() {
        "must not be empty"
    } else if id.contains(SESSION_SEPARATOR) {
        "must not contain ':'"
    } else if id.chars().count() > MAX_SESSION_ID_LEN {
        "must be at most 64 characters"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidSession {
        id: id.to_owned(),
        reason,
    })
}

/// One session's view of the table. Every logical key is namespaced as
/// `"{session_id}:{logical_key}"`.
pub struct SessionStore<B> {
    backend: B,
    session_id: String,
}

impl<B: AuthDataBackend> SessionStore<B> {
    /// `None` picks a fresh random session id.
    pub fn new(backend: B, session_id: Option<String>) -> Result<Self, StoreError> {
        let session_id = match session_id {
            Some(id) => {
                validate_session_id(&id)?;
                id
            }
            None => Uuid::new_v4().to_string(),
        };
        Ok(Self {
            backend,
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Physical row key. Fails when it would not fit the key column.
    pub fn storage_key(&self, key: &LogicalKey) -> Result<String, StoreError> {
        let storage_key = format!("{}{SESSION_SEPARATOR}{key}", self.session_id);
        let len = storage_key.chars().count();
        if len > KEY_COLUMN_LEN {
            return Err(StoreError::KeyTooLong {
                key: key.to_string(),
                len,
                max: KEY_COLUMN_LEN,
            });
        }
        Ok(storage_key)
    }

    async fn read_text(&self, key: &LogicalKey) -> Result<Option<String>, StoreError> {
        let storage_key = self.storage_key(key)?;
        let text = self.backend.read(&storage_key).await?;
        debug!(
            "[store] read {storage_key} ({})",
            if text.is_some() { "hit" } else { "miss" }
        );
        Ok(text)
    }

    /// Read and decode one record. A row that fails to decode is an error,
    /// not a miss.
    pub async fn read<T: DeserializeOwned>(&self, key: &LogicalKey) -> Result<Option<T>, StoreError> {
        match self.read_text(key).await? {
            Some(text) => Ok(Some(codec::deserialize(&text)?)),
            None => Ok(None),
        }
    }

    pub async fn write<T: Serialize + Sync + ?Sized>(
        &self,
        key: &LogicalKey,
        value: &T,
    ) -> Result<(), StoreError> {
        let storage_key = self.storage_key(key)?;
        let text = codec::serialize(value)?;
        self.backend.upsert(&storage_key, &text).await?;
        debug!("[store] wrote {storage_key} ({} bytes)", text.len());
        Ok(())
    }

    pub async fn remove(&self, key: &LogicalKey) -> Result<(), StoreError> {
        let storage_key = self.storage_key(key)?;
        self.backend.remove(&storage_key).await?;
        debug!("[store] removed {storage_key}");
        Ok(())
    }

    /// Stored credentials, or a freshly generated bundle when the session
    /// has none. A fresh bundle is not written; the caller saves it.
    pub async fn get_credentials(&self) -> Result<Credentials, StoreError> {
        match self.read::<Credentials>(&LogicalKey::Credentials).await? {
            Some(creds) => Ok(creds),
            None => {
                warn!(
                    "[store] no credentials for session {}; generating a fresh bundle",
                    self.session_id
                );
                Ok(Credentials::generate())
            }
        }
    }

    pub async fn save_credentials(&self, creds: &Credentials) -> Result<(), StoreError> {
        self.write(&LogicalKey::Credentials, creds).await
    }

    /// Read `category-id` for every id, concurrently. Missing ids map to
    /// `None`.
    pub async fn get_keyed<I, S>(
        &self,
        category: &KeyCategory,
        ids: I,
    ) -> Result<HashMap<String, Option<KeyValue>>, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        let reads = ids.into_iter().map(|id| async move {
            let key = LogicalKey::keyed(category.clone(), id.clone());
            let value = match self.read_text(&key).await? {
                Some(text) => Some(KeyValue::decode(category, &text)?),
                None => None,
            };
            Ok::<_, StoreError>((id, value))
        });
        join_all(reads).await.into_iter().collect()
    }

    /// Write every `Some` value and delete every `None`, concurrently.
    ///
    /// All operations run to completion; if any failed, the first error is
    /// returned. Writes that succeeded stay applied.
    pub async fn set_keyed(&self, collection: KeyedCollection) -> Result<(), StoreError> {
        let mut ops = Vec::new();
        for (category, entries) in collection {
            for (id, value) in entries {
                let key = LogicalKey::keyed(category.clone(), id);
                ops.push(async move {
                    match value {
                        Some(value) => self.write_key_value(&key, &value).await,
                        None => self.remove(&key).await,
                    }
                });
            }
        }

        let total = ops.len();
        let results = join_all(ops).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(
                "[store] set_keyed: {failed} of {total} operations failed for session {}",
                self.session_id
            );
        }
        results.into_iter().collect()
    }

    async fn write_key_value(&self, key: &LogicalKey, value: &KeyValue) -> Result<(), StoreError> {
        let storage_key = self.storage_key(key)?;
        let text = value.encode()?;
        self.backend.upsert(&storage_key, &text).await
    }

    /// Drop every row of this session. Returns the number of rows removed.
    pub async fn delete_session(&self) -> Result<u64, StoreError> {
        let removed = self
            .backend
            .remove_prefix(&format!("{}{SESSION_SEPARATOR}", self.session_id))
            .await?;
        info!(
            "[store] deleted session {} ({removed} rows)",
            self.session_id
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use async_trait::async_trait;
    use ks_proto::{AppStateSyncKeyData, Binary, Value};

    /// Refuses `upsert` for one physical key; everything else goes to
    /// the inner backend.
    struct RefusingBackend {
        inner: MemoryBackend,
        refused: String,
    }

    #[async_trait]
    impl AuthDataBackend for RefusingBackend {
        async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.read(key).await
        }

        async fn upsert(&self, key: &str, data: &str) -> Result<(), StoreError> {
            if key == self.refused {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.upsert(key, data).await
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key).await
        }

        async fn remove_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
            self.inner.remove_prefix(prefix).await
        }
    }

    fn store(backend: &MemoryBackend, session: &str) -> SessionStore<MemoryBackend> {
        SessionStore::new(backend.clone(), Some(session.to_owned())).unwrap()
    }

    fn collection(category: KeyCategory, id: &str, value: Option<KeyValue>) -> KeyedCollection {
        HashMap::from([(category, HashMap::from([(id.to_owned(), value)]))])
    }

    fn bytes_record(bytes: Vec<u8>) -> KeyValue {
        KeyValue::Raw(Value::map([("bytes", Value::Binary(bytes))]))
    }

    #[tokio::test]
    async fn generated_session_ids_are_unique() {
        let backend = MemoryBackend::new();
        let a = SessionStore::new(backend.clone(), None).unwrap();
        let b = SessionStore::new(backend, None).unwrap();
        assert_ne!(a.session_id(), b.session_id());
        assert_eq!(a.session_id().len(), 36);
    }

    #[tokio::test]
    async fn keys_are_namespaced_by_session() {
        let backend = MemoryBackend::new();
        let s = store(&backend, "s1");
        assert_eq!(
            s.storage_key(&LogicalKey::Credentials).unwrap(),
            "s1:auth_creds"
        );
        assert_eq!(
            s.storage_key(&LogicalKey::keyed(KeyCategory::PreKey, "3")).unwrap(),
            "s1:pre-key-3"
        );
    }

    #[tokio::test]
    async fn pre_key_scenario() {
        let backend = MemoryBackend::new();
        let s = store(&backend, "s1");

        let empty = s.get_keyed(&KeyCategory::PreKey, ["3", "7"]).await.unwrap();
        assert_eq!(empty.len(), 2);
        assert_eq!(empty["3"], None);
        assert_eq!(empty["7"], None);

        let payload = vec![0u8, 1, 2, 3, 250, 255];
        s.set_keyed(collection(
            KeyCategory::PreKey,
            "3",
            Some(bytes_record(payload.clone())),
        ))
        .await
        .unwrap();

        let got = s.get_keyed(&KeyCategory::PreKey, ["3"]).await.unwrap();
        assert_eq!(got["3"], Some(bytes_record(payload)));
        assert_eq!(backend.keys().await, vec!["s1:pre-key-3".to_owned()]);
    }

    #[tokio::test]
    async fn none_deletes_a_record() {
        let backend = MemoryBackend::new();
        let s = store(&backend, "s1");
        let cat = KeyCategory::from("catA");
        s.set_keyed(collection(cat.clone(), "id1", Some(bytes_record(vec![1]))))
            .await
            .unwrap();
        s.set_keyed(collection(cat.clone(), "id1", None)).await.unwrap();
        let got = s.get_keyed(&cat, ["id1"]).await.unwrap();
        assert_eq!(got["id1"], None);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn repeated_writes_leave_one_row() {
        let backend = MemoryBackend::new();
        let s = store(&backend, "s1");
        for _ in 0..2 {
            s.set_keyed(collection(
                KeyCategory::Session,
                "peer",
                Some(bytes_record(vec![9; 4])),
            ))
            .await
            .unwrap();
        }
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn sessions_do_not_see_each_other() {
        let backend = MemoryBackend::new();
        let a = store(&backend, "alice");
        let b = store(&backend, "bob");

        let creds = Credentials::generate();
        a.save_credentials(&creds).await.unwrap();
        a.set_keyed(collection(KeyCategory::PreKey, "1", Some(bytes_record(vec![1]))))
            .await
            .unwrap();

        assert_eq!(a.get_credentials().await.unwrap(), creds);
        assert_ne!(b.get_credentials().await.unwrap(), creds);
        assert_eq!(
            b.get_keyed(&KeyCategory::PreKey, ["1"]).await.unwrap()["1"],
            None
        );
    }

    #[tokio::test]
    async fn delete_session_spares_other_sessions() {
        let backend = MemoryBackend::new();
        let a = store(&backend, "s_1");
        let b = store(&backend, "s_10");
        let c = store(&backend, "sx1");
        for s in [&a, &b, &c] {
            s.save_credentials(&Credentials::generate()).await.unwrap();
            s.set_keyed(collection(KeyCategory::PreKey, "1", Some(bytes_record(vec![1]))))
                .await
                .unwrap();
        }

        assert_eq!(a.delete_session().await.unwrap(), 2);
        assert_eq!(
            a.get_keyed(&KeyCategory::PreKey, ["1"]).await.unwrap()["1"],
            None
        );
        assert!(a.read::<Credentials>(&LogicalKey::Credentials).await.unwrap().is_none());
        for other in [&b, &c] {
            assert!(other
                .read::<Credentials>(&LogicalKey::Credentials)
                .await
                .unwrap()
                .is_some());
            assert!(other.get_keyed(&KeyCategory::PreKey, ["1"]).await.unwrap()["1"].is_some());
        }
    }

    #[tokio::test]
    async fn fresh_credentials_are_not_persisted() {
        let backend = MemoryBackend::new();
        let s = store(&backend, "new");
        let first = s.get_credentials().await.unwrap();
        let second = s.get_credentials().await.unwrap();
        assert_ne!(first, second);
        first.verify_signed_pre_key().unwrap();
        assert!(backend.is_empty().await);

        s.save_credentials(&first).await.unwrap();
        assert_eq!(s.get_credentials().await.unwrap(), first);
    }

    #[tokio::test]
    async fn corrupted_rows_are_errors_not_misses() {
        let backend = MemoryBackend::new();
        backend.insert_raw("s1:auth_creds", "{broken").await;
        backend.insert_raw("s1:pre-key-1", "not json").await;
        let s = store(&backend, "s1");
        assert!(matches!(
            s.get_credentials().await,
            Err(StoreError::Codec(_))
        ));
        assert!(matches!(
            s.get_keyed(&KeyCategory::PreKey, ["1"]).await,
            Err(StoreError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn app_state_sync_keys_come_back_typed() {
        let backend = MemoryBackend::new();
        let s = store(&backend, "s1");
        let data = AppStateSyncKeyData {
            key_data: Some(Binary(vec![7; 32])),
            fingerprint: None,
            timestamp: Some(1_700_000_000),
        };
        s.set_keyed(collection(
            KeyCategory::AppStateSyncKey,
            "AAAAAQ==",
            Some(data.clone().into()),
        ))
        .await
        .unwrap();
        let got = s
            .get_keyed(&KeyCategory::AppStateSyncKey, ["AAAAAQ=="])
            .await
            .unwrap();
        assert_eq!(got["AAAAAQ=="], Some(KeyValue::AppStateSyncKey(data)));
    }

    #[tokio::test]
    async fn malformed_app_state_sync_key_propagates() {
        let backend = MemoryBackend::new();
        backend
            .insert_raw("s1:app-state-sync-key-k", r#"{"keyData":"nope"}"#)
            .await;
        let s = store(&backend, "s1");
        assert!(s
            .get_keyed(&KeyCategory::AppStateSyncKey, ["k"])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn rows_from_other_clients_load() {
        let backend = MemoryBackend::new();
        backend
            .insert_raw(
                "s1:sender-key-group::me",
                r#"{"chain":{"type":"Buffer","data":"AQID"},"iteration":4}"#,
            )
            .await;
        let s = store(&backend, "s1");
        let got = s
            .get_keyed(&KeyCategory::SenderKey, ["group::me"])
            .await
            .unwrap();
        let value = got["group::me"].as_ref().and_then(KeyValue::as_raw).unwrap();
        assert_eq!(value.get("chain"), Some(&Value::Binary(vec![1, 2, 3])));
    }

    #[test]
    fn session_ids_that_could_overlap_are_rejected() {
        let backend = MemoryBackend::new();
        for bad in ["tenant:2", ":", "", &"x".repeat(MAX_SESSION_ID_LEN + 1)] {
            assert!(
                matches!(
                    SessionStore::new(backend.clone(), Some(bad.to_owned())),
                    Err(StoreError::InvalidSession { .. })
                ),
                "{bad:?}"
            );
        }
        assert!(SessionStore::new(backend, Some("x".repeat(MAX_SESSION_ID_LEN))).is_ok());
    }

    #[tokio::test]
    async fn deleting_a_session_spares_ids_sharing_its_prefix() {
        let backend = MemoryBackend::new();
        let tenant = store(&backend, "tenant");
        let tenant2 = store(&backend, "tenant2");
        tenant.save_credentials(&Credentials::generate()).await.unwrap();
        tenant2.save_credentials(&Credentials::generate()).await.unwrap();

        assert_eq!(tenant.delete_session().await.unwrap(), 1);
        assert!(tenant2
            .read::<Credentials>(&LogicalKey::Credentials)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn failed_write_fails_the_batch_but_keeps_the_rest() {
        let inner = MemoryBackend::new();
        inner.insert_raw("s1:pre-key-9", "{}").await;
        let backend = RefusingBackend {
            inner: inner.clone(),
            refused: "s1:pre-key-2".into(),
        };
        let s = SessionStore::new(backend, Some("s1".into())).unwrap();

        let batch = HashMap::from([(
            KeyCategory::PreKey,
            HashMap::from([
                ("1".to_owned(), Some(bytes_record(vec![1]))),
                ("2".to_owned(), Some(bytes_record(vec![2]))),
                ("3".to_owned(), Some(bytes_record(vec![3]))),
                ("9".to_owned(), None),
            ]),
        )]);
        assert!(matches!(
            s.set_keyed(batch).await,
            Err(StoreError::Database(_))
        ));

        let got = s
            .get_keyed(&KeyCategory::PreKey, ["1", "2", "3", "9"])
            .await
            .unwrap();
        assert_eq!(got["1"], Some(bytes_record(vec![1])));
        assert_eq!(got["2"], None);
        assert_eq!(got["3"], Some(bytes_record(vec![3])));
        assert_eq!(got["9"], None);
    }

    #[tokio::test]
    async fn oversized_keys_fail_before_reaching_the_backend() {
        let backend = MemoryBackend::new();
        let s = store(&backend, &"s".repeat(MAX_SESSION_ID_LEN));

        let long_id = "g".repeat(KEY_COLUMN_LEN);
        let written = s
            .set_keyed(collection(
                KeyCategory::SenderKey,
                &long_id,
                Some(bytes_record(vec![1])),
            ))
            .await;
        assert!(matches!(
            written,
            Err(StoreError::KeyTooLong {
                max: KEY_COLUMN_LEN,
                ..
            })
        ));
        assert!(backend.is_empty().await);
        assert!(matches!(
            s.get_keyed(&KeyCategory::SenderKey, [long_id]).await,
            Err(StoreError::KeyTooLong { .. })
        ));

        // "{session}:sender-key-{id}" exactly fills the column.
        let fits = "g".repeat(KEY_COLUMN_LEN - MAX_SESSION_ID_LEN - 1 - "sender-key-".len());
        s.set_keyed(collection(
            KeyCategory::SenderKey,
            &fits,
            Some(bytes_record(vec![1])),
        ))
        .await
        .unwrap();
        assert_eq!(backend.len().await, 1);
    }
}
