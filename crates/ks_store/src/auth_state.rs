//! The per-session handle a protocol client holds.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use ks_proto::{Credentials, KeyCategory, KeyValue, KeyedCollection};

use crate::backend::AuthDataBackend;
use crate::config::ConnectionSource;
use crate::db::PgBackend;
use crate::error::StoreError;
use crate::store::{validate_session_id, SessionStore};

/// Keyed-record interface consumed by the protocol library.
#[async_trait]
pub trait SignalKeyStore: Send + Sync {
    async fn get(
        &self,
        category: &KeyCategory,
        ids: &[String],
    ) -> Result<HashMap<String, Option<KeyValue>>, StoreError>;

    /// `None` values delete.
    async fn set(&self, collection: KeyedCollection) -> Result<(), StoreError>;
}

pub struct KeyStore<B> {
    store: Arc<SessionStore<B>>,
}

impl<B> Clone for KeyStore<B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

#[async_trait]
impl<B: AuthDataBackend> SignalKeyStore for KeyStore<B> {
    async fn get(
        &self,
        category: &KeyCategory,
        ids: &[String],
    ) -> Result<HashMap<String, Option<KeyValue>>, StoreError> {
        self.store.get_keyed(category, ids.iter().cloned()).await
    }

    async fn set(&self, collection: KeyedCollection) -> Result<(), StoreError> {
        self.store.set_keyed(collection).await
    }
}

pub struct AuthenticationState<B> {
    /// The live credentials. Mutations stay in memory until `save_creds`.
    pub creds: Credentials,
    pub keys: KeyStore<B>,
}

pub struct AuthStateHandle<B> {
    pub state: AuthenticationState<B>,
    store: Arc<SessionStore<B>>,
}

impl<B: AuthDataBackend> AuthStateHandle<B> {
    /// Load (or synthesise) credentials for the store's session.
    pub async fn load(store: SessionStore<B>) -> Result<Self, StoreError> {
        let store = Arc::new(store);
        let creds = store.get_credentials().await?;
        Ok(Self {
            state: AuthenticationState {
                creds,
                keys: KeyStore {
                    store: Arc::clone(&store),
                },
            },
            store,
        })
    }

    /// Persist the current `state.creds`, replacing the stored bundle.
    pub async fn save_creds(&self) -> Result<(), StoreError> {
        self.store.save_credentials(&self.state.creds).await
    }

    pub async fn delete_session(&self) -> Result<u64, StoreError> {
        self.store.delete_session().await
    }

    pub fn session_id(&self) -> &str {
        self.store.session_id()
    }

    pub fn store(&self) -> &SessionStore<B> {
        &self.store
    }
}

/// Connect, make sure the table exists, and load the session's state.
///
/// A missing `session_id` starts a new session under a random id. An id
/// containing `:` is rejected before any connection is made.
pub async fn use_postgres_auth_state(
    source: impl Into<ConnectionSource>,
    session_id: Option<String>,
) -> Result<AuthStateHandle<PgBackend>, StoreError> {
    if let Some(id) = &session_id {
        validate_session_id(id)?;
    }
    let backend = PgBackend::connect(source.into()).await?;
    let store = SessionStore::new(backend, session_id)?;
    info!(
        "[store] session {} on schema {}",
        store.session_id(),
        store.backend().schema()
    );
    AuthStateHandle::load(store).await
}
