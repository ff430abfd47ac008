//! ks_store — session persistence for messaging-protocol credentials
//!
//! # Storage layout
//! One table, `<schema>.auth_data (session_key PRIMARY KEY, data TEXT)`.
//! Every logical key is stored as `"{session_id}:{logical_key}"`, so a
//! session's rows share a prefix and can be dropped together.
//!
//! # Layers
//! - `backend`    — the row-level contract plus an in-memory implementation
//! - `db`         — the Postgres implementation over a sqlx pool
//! - `store`      — logical keys, credentials and keyed records on top of a backend
//! - `auth_state` — the handle a protocol client holds for one session
//! - `config`/`ssl` — connection inputs, schema and SSL resolution

pub mod auth_state;
pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod ssl;
pub mod store;

pub use auth_state::{
    use_postgres_auth_state, AuthStateHandle, AuthenticationState, KeyStore, SignalKeyStore,
};
pub use backend::{AuthDataBackend, MemoryBackend};
pub use config::{ConnectionSource, PgConfig};
pub use db::PgBackend;
pub use error::StoreError;
pub use ssl::{classify_host, ProviderSuffixes, SslPolicy, SslSetting};
pub use store::SessionStore;
