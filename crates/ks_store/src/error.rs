use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialisation error: {0}")]
    Codec(#[from] ks_proto::CodecError),

    #[error("Invalid connection URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid session id {id:?}: {reason}")]
    InvalidSession { id: String, reason: &'static str },

    #[error("Storage key for {key:?} is {len} characters, the column holds {max}")]
    KeyTooLong { key: String, len: usize, max: usize },

    #[error("Invalid schema name {0:?}: expected letters, digits and underscores")]
    InvalidSchema(String),
}
