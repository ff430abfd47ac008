//! Key pairs carried in a credentials bundle
//!
//! - `CurveKeyPair`: X25519, used for the noise handshake static key and the
//!   ephemeral pairing key. Both halves are raw 32-byte values on the wire.
//! - `IdentityKeyPair`: long-term X25519 key that signs with XEdDSA, so the
//!   same key serves both the key agreement and the prekey signature.
//! - `SignedPreKey`: X25519 key pair whose public half is signed by the
//!   identity key. The signed message is the DJB-type-prefixed public key
//!   (`0x05 || pub`), the same encoding peers use when they verify a bundle.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;
use crate::xeddsa;

/// Type byte prepended to Curve25519 public keys before signing.
pub const DJB_KEY_TYPE: u8 = 0x05;

fn to_32(bytes: &[u8], what: &str) -> Result<[u8; 32], CryptoError> {
    bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!("{what} must be 32 bytes, got {}", bytes.len()))
    })
}

/// Human-readable fingerprint: BLAKE3 of the public key, truncated to
/// 20 bytes, hex-encoded in groups of 4 for display.
pub fn fingerprint(public: &[u8]) -> String {
    let hash = blake3::hash(public);
    let hex = hex::encode(&hash.as_bytes()[..20]);
    hex.as_bytes()
        .chunks(4)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

// ── X25519 ───────────────────────────────────────────────────────────────────

#[derive(ZeroizeOnDrop)]
pub struct CurveKeyPair {
    #[zeroize(skip)]
    public: [u8; 32],
    private: [u8; 32],
}

impl CurveKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self {
            public: public.to_bytes(),
            private: secret.to_bytes(),
        }
    }

    /// Rebuild a key pair from a stored private half. The public half is
    /// recomputed rather than trusted.
    pub fn from_private(bytes: &[u8]) -> Result<Self, CryptoError> {
        let private = to_32(bytes, "X25519 private key")?;
        let public = X25519Public::from(&StaticSecret::from(private));
        Ok(Self {
            public: public.to_bytes(),
            private,
        })
    }

    pub fn public(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn private(&self) -> &[u8; 32] {
        &self.private
    }

    /// Raw X25519 shared secret with a peer public key.
    pub fn diffie_hellman(&self, their_public: &[u8]) -> Result<[u8; 32], CryptoError> {
        let theirs = X25519Public::from(to_32(their_public, "X25519 public key")?);
        let shared = StaticSecret::from(self.private).diffie_hellman(&theirs);
        Ok(shared.to_bytes())
    }
}

// ── Identity ─────────────────────────────────────────────────────────────────

/// Long-term identity key: an X25519 key pair that also signs, via XEdDSA.
/// The inner pair clears its private half on drop.
pub struct IdentityKeyPair {
    key_pair: CurveKeyPair,
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        Self {
            key_pair: CurveKeyPair::generate(),
        }
    }

    pub fn from_private(bytes: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            key_pair: CurveKeyPair::from_private(bytes)?,
        })
    }

    pub fn public(&self) -> &[u8; 32] {
        self.key_pair.public()
    }

    pub fn private(&self) -> &[u8; 32] {
        self.key_pair.private()
    }

    pub fn key_pair(&self) -> &CurveKeyPair {
        &self.key_pair
    }

    /// 64-byte XEdDSA signature.
    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        xeddsa::sign(self.key_pair.private(), msg)
    }

    /// Verify a signature made by any identity public key.
    pub fn verify(public_bytes: &[u8], msg: &[u8], sig_bytes: &[u8]) -> Result<(), CryptoError> {
        xeddsa::verify(public_bytes, msg, sig_bytes)
    }
}

// ── Signed prekey ────────────────────────────────────────────────────────────

pub struct SignedPreKey {
    pub key_id: u32,
    pub key_pair: CurveKeyPair,
    pub signature: [u8; 64],
}

fn signed_message(public: &[u8; 32]) -> [u8; 33] {
    let mut msg = [0u8; 33];
    msg[0] = DJB_KEY_TYPE;
    msg[1..].copy_from_slice(public);
    msg
}

impl SignedPreKey {
    pub fn generate(identity: &IdentityKeyPair, key_id: u32) -> Self {
        let key_pair = CurveKeyPair::generate();
        let signature = identity.sign(&signed_message(key_pair.public()));
        Self {
            key_id,
            key_pair,
            signature,
        }
    }

    /// Check a stored prekey public half and signature against an identity
    /// public key.
    pub fn verify_parts(
        identity_public: &[u8],
        prekey_public: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        let public = to_32(prekey_public, "Prekey public key")?;
        IdentityKeyPair::verify(identity_public, &signed_message(&public), signature)
    }
}
