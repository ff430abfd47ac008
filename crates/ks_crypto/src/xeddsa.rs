//! XEdDSA: Ed25519-style signatures made with an X25519 private key.
//!
//! The Edwards public key is derived from the clamped Montgomery scalar. Its
//! sign bit, which a Montgomery u-coordinate cannot carry, travels in the
//! top bit of the signature's last byte so a verifier holding only the
//! X25519 public key can recover the exact Edwards point.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::montgomery::MontgomeryPoint;
use curve25519_dalek::scalar::{clamp_integer, Scalar};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use crate::error::CryptoError;

pub const SIGNATURE_LEN: usize = 64;

/// Domain separator for nonce derivation: 2^256 - 2, little-endian.
const NONCE_PREFIX: [u8; 32] = {
    let mut prefix = [0xFF; 32];
    prefix[0] = 0xFE;
    prefix
};

const SIGN_BIT: u8 = 0x80;

fn hash_to_scalar(parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&hasher.finalize());
    let scalar = Scalar::from_bytes_mod_order_wide(&wide);
    wide.zeroize();
    scalar
}

/// Sign `message` with an X25519 private key.
pub fn sign(private: &[u8; 32], message: &[u8]) -> [u8; SIGNATURE_LEN] {
    let mut nonce = [0u8; 64];
    OsRng.fill_bytes(&mut nonce);
    let signature = sign_with_nonce(private, message, &nonce);
    nonce.zeroize();
    signature
}

fn sign_with_nonce(private: &[u8; 32], message: &[u8], nonce: &[u8; 64]) -> [u8; SIGNATURE_LEN] {
    let mut clamped = clamp_integer(*private);
    let a = Scalar::from_bytes_mod_order(clamped);
    let public = EdwardsPoint::mul_base(&a).compress();
    let sign_bit = public.as_bytes()[31] & SIGN_BIT;

    let r = hash_to_scalar(&[&NONCE_PREFIX, &clamped, message, nonce]);
    clamped.zeroize();
    let big_r = EdwardsPoint::mul_base(&r).compress();
    let h = hash_to_scalar(&[big_r.as_bytes(), public.as_bytes(), message]);
    let s = h * a + r;

    let mut signature = [0u8; SIGNATURE_LEN];
    signature[..32].copy_from_slice(big_r.as_bytes());
    signature[32..].copy_from_slice(s.as_bytes());
    signature[63] = (signature[63] & !SIGN_BIT) | sign_bit;
    signature
}

/// Verify an XEdDSA signature against an X25519 public key.
pub fn verify(public: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let public: [u8; 32] = public.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!("X25519 public key must be 32 bytes, got {}", public.len()))
    })?;
    let signature: [u8; SIGNATURE_LEN] = signature.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "signature must be {SIGNATURE_LEN} bytes, got {}",
            signature.len()
        ))
    })?;

    let sign_bit = (signature[63] & SIGN_BIT) >> 7;
    let a_point = MontgomeryPoint(public)
        .to_edwards(sign_bit)
        .ok_or(CryptoError::SignatureVerification)?;

    let mut big_r = [0u8; 32];
    big_r.copy_from_slice(&signature[..32]);
    let mut s = [0u8; 32];
    s.copy_from_slice(&signature[32..]);
    s[31] &= !SIGN_BIT;
    // s < 2^253
    if s[31] & 0xE0 != 0 {
        return Err(CryptoError::SignatureVerification);
    }

    let h = hash_to_scalar(&[&big_r, a_point.compress().as_bytes(), message]);
    let check = EdwardsPoint::vartime_double_scalar_mul_basepoint(
        &h,
        &(-a_point),
        &Scalar::from_bytes_mod_order(s),
    );
    if check.compress().as_bytes() == &big_r {
        Ok(())
    } else {
        Err(CryptoError::SignatureVerification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x25519_dalek::{PublicKey, StaticSecret};

    fn key_pair() -> ([u8; 32], [u8; 32]) {
        let secret = StaticSecret::random_from_rng(OsRng);
        (secret.to_bytes(), PublicKey::from(&secret).to_bytes())
    }

    #[test]
    fn edwards_key_maps_to_the_x25519_public_key() {
        for _ in 0..8 {
            let (private, public) = key_pair();
            let a = Scalar::from_bytes_mod_order(clamp_integer(private));
            assert_eq!(EdwardsPoint::mul_base(&a).to_montgomery().to_bytes(), public);
        }
    }

    #[test]
    fn signatures_verify_for_either_sign_bit() {
        // Enough keys that both Edwards sign bits come up.
        for _ in 0..16 {
            let (private, public) = key_pair();
            let sig = sign(&private, b"\x05prekey");
            verify(&public, b"\x05prekey", &sig).unwrap();
        }
    }

    #[test]
    fn fixed_nonce_is_deterministic() {
        let (private, public) = key_pair();
        let nonce = [9u8; 64];
        let a = sign_with_nonce(&private, b"msg", &nonce);
        assert_eq!(a, sign_with_nonce(&private, b"msg", &nonce));
        assert_ne!(a, sign_with_nonce(&private, b"msg", &[1u8; 64]));
        verify(&public, b"msg", &a).unwrap();
    }

    #[test]
    fn tampering_is_rejected() {
        let (private, public) = key_pair();
        let (_, other) = key_pair();
        let sig = sign(&private, b"msg");

        assert!(verify(&public, b"msh", &sig).is_err());
        assert!(verify(&other, b"msg", &sig).is_err());

        let mut flipped_r = sig;
        flipped_r[0] ^= 1;
        assert!(verify(&public, b"msg", &flipped_r).is_err());

        let mut flipped_sign = sig;
        flipped_sign[63] ^= SIGN_BIT;
        assert!(verify(&public, b"msg", &flipped_sign).is_err());
    }

    #[test]
    fn wrong_lengths_are_key_errors() {
        let (_, public) = key_pair();
        assert!(matches!(
            verify(&public[..31], b"m", &[0u8; 64]),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            verify(&public, b"m", &[0u8; 63]),
            Err(CryptoError::InvalidKey(_))
        ));
    }
}
