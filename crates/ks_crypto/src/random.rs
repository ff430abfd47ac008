//! Random identifiers and secrets for a fresh credentials bundle.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;

/// Registration ids are 14-bit values.
pub const REGISTRATION_ID_MASK: u16 = 0x3FFF;

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    OsRng.fill_bytes(&mut out);
    out
}

pub fn registration_id() -> u16 {
    u16::from_le_bytes(random_bytes::<2>()) & REGISTRATION_ID_MASK
}

/// 32 random bytes, standard base64 (the transport encoding peers expect).
pub fn transport_secret() -> String {
    STANDARD.encode(random_bytes::<32>())
}
