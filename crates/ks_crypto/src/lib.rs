//! ks_crypto — key material for messaging-protocol credentials
//!
//! # Design principles
//! - NO custom primitives; curve and hash arithmetic come from audited
//!   crates, XEdDSA is composed from them.
//! - Zeroize all secret material on drop.
//! - Generation is pure: no I/O, OS RNG only.
//!
//! # Module layout
//! - `keys`   — X25519 key pairs, identity key, signed prekeys
//! - `random` — registration ids and transport secrets
//! - `xeddsa` — signatures made with X25519 keys
//! - `error`  — unified error type

pub mod error;
pub mod keys;
pub mod random;
pub mod xeddsa;

pub use error::CryptoError;
pub use keys::{fingerprint, CurveKeyPair, IdentityKeyPair, SignedPreKey};
