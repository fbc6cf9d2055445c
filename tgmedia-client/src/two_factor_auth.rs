//! SRP proof for cloud-password (2FA) login.
//!
//! Implements the `SHA256SHA256PBKDF2HMACSHA512iter100000SHA256ModPow`
//! scheme: the client proves knowledge of the password without sending it.

use std::fmt;

use hmac::Hmac;
use num_bigint::{BigInt, Sign};
use num_traits::ops::euclid::Euclid;
use sha2::{Digest, Sha256, Sha512};

const PBKDF2_ROUNDS: u32 = 100_000;

#[derive(Clone, Debug, PartialEq)]
pub enum SrpError {
    /// Key derivation rejected its parameters.
    KeyDerivation,
    /// `g_b` is not in `(1, p - 1)`.
    ServerValueOutOfRange,
}

impl fmt::Display for SrpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyDerivation => write!(f, "password key derivation failed"),
            Self::ServerValueOutOfRange => write!(f, "server SRP value out of range"),
        }
    }
}

impl std::error::Error for SrpError {}

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Sha256::new();
    for p in parts { h.update(p); }
    h.finalize().into()
}

fn salted(data: &[u8], salt: &[u8]) -> [u8; 32] {
    sha256(&[salt, data, salt])
}

/// The SRP private exponent `x` derived from the password.
pub fn password_hash(password: &[u8], salt1: &[u8], salt2: &[u8]) -> Result<[u8; 32], SrpError> {
    let inner = salted(&salted(password, salt1), salt2);
    let mut dk = [0u8; 64];
    pbkdf2::pbkdf2::<Hmac<Sha512>>(&inner, salt1, PBKDF2_ROUNDS, &mut dk)
        .map_err(|_| SrpError::KeyDerivation)?;
    Ok(salted(&dk, salt2))
}

/// Left-pad to 256 bytes, keeping the low-order end if longer.
pub fn pad256(data: &[u8]) -> [u8; 256] {
    let mut out = [0u8; 256];
    let data = &data[data.len().saturating_sub(256)..];
    out[256 - data.len()..].copy_from_slice(data);
    out
}

/// Compute `(M1, g_a)` for `auth.checkPassword`.
///
/// `a` is the client's random secret, `g_b` the server's public value.
pub fn calculate_2fa(
    salt1:    &[u8],
    salt2:    &[u8],
    p:        &[u8],
    g:        i32,
    g_b:      &[u8],
    a:        &[u8],
    password: impl AsRef<[u8]>,
) -> Result<([u8; 32], [u8; 256]), SrpError> {
    let big_p  = BigInt::from_bytes_be(Sign::Plus, p);
    let g_b    = pad256(g_b);
    let g_pad  = pad256(&BigInt::from(g).to_bytes_be().1);

    let big_g_b = BigInt::from_bytes_be(Sign::Plus, &g_b);
    let one = BigInt::from(1);
    if big_g_b <= one || big_g_b >= &big_p - &one {
        return Err(SrpError::ServerValueOutOfRange);
    }
    let big_g = BigInt::from(g);
    let big_a = BigInt::from_bytes_be(Sign::Plus, &pad256(a));

    let big_k = BigInt::from_bytes_be(Sign::Plus, &sha256(&[p, &g_pad]));

    let g_a = pad256(&big_g.modpow(&big_a, &big_p).to_bytes_be().1);
    let big_u = BigInt::from_bytes_be(Sign::Plus, &sha256(&[&g_a, &g_b]));

    let x = password_hash(password.as_ref(), salt1, salt2)?;
    let big_x = BigInt::from_bytes_be(Sign::Plus, &x);

    let big_v  = big_g.modpow(&big_x, &big_p);
    let big_kv = (big_k * big_v) % &big_p;
    let big_t  = (big_g_b - big_kv).rem_euclid(&big_p);
    let big_sa = big_t.modpow(&(big_a + big_u * big_x), &big_p);

    let k_a = sha256(&[&pad256(&big_sa.to_bytes_be().1)]);
    Ok((proof(p, &g_pad, salt1, salt2, &g_a, &g_b, &k_a), g_a))
}

/// `M1 = H(H(p) xor H(g) | H(salt1) | H(salt2) | g_a | g_b | K)`
pub fn proof(
    p:     &[u8],
    g_pad: &[u8; 256],
    salt1: &[u8],
    salt2: &[u8],
    g_a:   &[u8; 256],
    g_b:   &[u8; 256],
    k:     &[u8; 32],
) -> [u8; 32] {
    let h_p = sha256(&[p]);
    let h_g = sha256(&[g_pad]);
    let mut p_xor_g = [0u8; 32];
    for (out, (a, b)) in p_xor_g.iter_mut().zip(h_p.iter().zip(h_g.iter())) {
        *out = a ^ b;
    }
    sha256(&[&p_xor_g, &sha256(&[salt1]), &sha256(&[salt2]), g_a, g_b, k])
}
