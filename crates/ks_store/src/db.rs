//! Database abstraction over Postgres via sqlx.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::{debug, info};

use crate::backend::AuthDataBackend;
use crate::config::{resolve_url, validate_schema, ConnectionSource, DEFAULT_SCHEMA};
use crate::error::StoreError;
use crate::ssl::ProviderSuffixes;

pub const TABLE_NAME: &str = "auth_data";

/// Width of the `session_key` column, in characters.
pub const KEY_COLUMN_LEN: usize = 255;

/// Statement text for one resolved schema.
struct Statements {
    create_schema: Option<String>,
    create_table: String,
    select: String,
    upsert: String,
    delete: String,
    delete_prefix: String,
}

impl Statements {
    fn for_schema(schema: &str) -> Self {
        let table = format!("\"{schema}\".{TABLE_NAME}");
        Self {
            create_schema: (schema != DEFAULT_SCHEMA)
                .then(|| format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\"")),
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 session_key VARCHAR({KEY_COLUMN_LEN}) PRIMARY KEY, \
                 data TEXT NOT NULL)"
            ),
            select: format!("SELECT data FROM {table} WHERE session_key = $1"),
            upsert: format!(
                "INSERT INTO {table} (session_key, data) VALUES ($1, $2) \
                 ON CONFLICT (session_key) DO UPDATE SET data = EXCLUDED.data"
            ),
            delete: format!("DELETE FROM {table} WHERE session_key = $1"),
            delete_prefix: format!(r"DELETE FROM {table} WHERE session_key LIKE $1 ESCAPE '\'"),
        }
    }
}

/// Escape `LIKE` metacharacters so `prefix` matches only itself.
pub fn like_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Postgres-backed row store. Cheap to clone (pool is Arc internally).
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
    schema: String,
    sql: Arc<Statements>,
}

impl PgBackend {
    /// Resolve `source`, open a pool and make sure the table exists.
    ///
    /// Returns only once the schema is in place, so no read or write can
    /// reach a missing table.
    pub async fn connect(source: ConnectionSource) -> Result<Self, StoreError> {
        Self::connect_with(source, &ProviderSuffixes::default()).await
    }

    pub async fn connect_with(
        source: ConnectionSource,
        providers: &ProviderSuffixes,
    ) -> Result<Self, StoreError> {
        let (pool, schema) = match source {
            ConnectionSource::Pool(pool) => (pool, DEFAULT_SCHEMA.to_owned()),
            ConnectionSource::Config(config) => {
                let resolved = config.resolve(providers)?;
                info!(
                    "[pg] config: host={} schema={} ssl={:?}",
                    resolved.host, resolved.schema, resolved.ssl_mode
                );
                (resolved.lazy_pool(), resolved.schema)
            }
            ConnectionSource::Url(url) => {
                let resolved = resolve_url(&url, providers)?;
                info!(
                    "[pg] url: host={} schema={} ssl={:?}",
                    resolved.host, resolved.schema, resolved.ssl_mode
                );
                (resolved.lazy_pool(), resolved.schema)
            }
        };

        let backend = Self::new(pool, &schema)?;
        backend.ensure_schema().await?;
        Ok(backend)
    }

    /// Wrap an existing pool without touching the database.
    pub fn new(pool: PgPool, schema: &str) -> Result<Self, StoreError> {
        let schema = validate_schema(schema)?;
        Ok(Self {
            pool,
            sql: Arc::new(Statements::for_schema(&schema)),
            schema,
        })
    }

    /// `CREATE … IF NOT EXISTS` for the schema and table.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        if let Some(create_schema) = &self.sql.create_schema {
            sqlx::query(create_schema).execute(&self.pool).await?;
        }
        sqlx::query(&self.sql.create_table)
            .execute(&self.pool)
            .await?;
        info!("[pg] table \"{}\".{} ready", self.schema, TABLE_NAME);
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }
}

#[async_trait]
impl AuthDataBackend for PgBackend {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let data = sqlx::query_scalar::<_, String>(&self.sql.select)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(data)
    }

    async fn upsert(&self, key: &str, data: &str) -> Result<(), StoreError> {
        sqlx::query(&self.sql.upsert)
            .bind(key)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query(&self.sql.delete)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(&self.sql.delete_prefix)
            .bind(like_prefix_pattern(prefix))
            .execute(&self.pool)
            .await?;
        debug!("[pg] removed {} rows under {prefix:?}", result.rows_affected());
        Ok(result.rows_affected())
    }
}
