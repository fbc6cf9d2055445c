//! Cryptographic primitives for MTProto.
//!
//! Provides:
//! - AES-256-IGE encryption/decryption
//! - SHA-1 / SHA-256 hash macros
//! - Pollard-rho PQ factorization
//! - RSA padding (`RSA_PAD`) in both directions
//! - `AuthKey`, the 256-byte session key
//! - MTProto 2.0 message encryption / decryption
//! - DH nonce→key derivation

#![deny(unsafe_code)]

pub mod aes;
mod auth_key;
mod factorize;
pub mod rsa;
mod sha;

pub use auth_key::AuthKey;
pub use factorize::factorize;
pub use getrandom::Error as RandomError;

// ─── MTProto 2.0 encrypt / decrypt ───────────────────────────────────────────

/// Errors from [`decrypt_data_v2`].
#[derive(Clone, Debug, PartialEq)]
pub enum DecryptError {
    /// Ciphertext too short or not block-aligned.
    InvalidBuffer,
    /// The `auth_key_id` in the ciphertext does not match our key.
    AuthKeyMismatch,
    /// The `msg_key` in the ciphertext does not match our computed value.
    MessageKeyMismatch,
}

impl std::fmt::Display for DecryptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBuffer => write!(f, "invalid ciphertext buffer length"),
            Self::AuthKeyMismatch => write!(f, "auth_key_id mismatch"),
            Self::MessageKeyMismatch => write!(f, "msg_key mismatch"),
        }
    }
}
impl std::error::Error for DecryptError {}

/// Which end of the connection produced a message. Selects the slice of the
/// auth key mixed into `msg_key` and the AES key/IV.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

impl Side {
    fn x(self) -> usize {
        match self {
            Side::Client => 0,
            Side::Server => 8,
        }
    }
}

/// Fill a fixed-size array from the OS random source.
pub fn random_array<const N: usize>() -> Result<[u8; N], RandomError> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf)?;
    Ok(buf)
}

fn calc_key(auth_key: &AuthKey, msg_key: &[u8; 16], side: Side) -> ([u8; 32], [u8; 32]) {
    let x = side.x();
    let sha_a = sha256!(msg_key, &auth_key.data[x..x + 36]);
    let sha_b = sha256!(&auth_key.data[40 + x..40 + x + 36], msg_key);

    let mut aes_key = [0u8; 32];
    aes_key[..8].copy_from_slice(&sha_a[..8]);
    aes_key[8..24].copy_from_slice(&sha_b[8..24]);
    aes_key[24..].copy_from_slice(&sha_a[24..]);

    let mut aes_iv = [0u8; 32];
    aes_iv[..8].copy_from_slice(&sha_b[..8]);
    aes_iv[8..24].copy_from_slice(&sha_a[8..24]);
    aes_iv[24..].copy_from_slice(&sha_b[24..]);

    (aes_key, aes_iv)
}

fn msg_key_for(auth_key: &AuthKey, plaintext: &[u8], side: Side) -> [u8; 16] {
    let x = side.x();
    let large = sha256!(&auth_key.data[88 + x..88 + x + 32], plaintext);
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&large[8..24]);
    msg_key
}

// 12..=1024 random bytes are allowed; use the smallest count that both
// reaches 12 and block-aligns the plaintext.
fn padding_len(len: usize) -> usize {
    let pad = (16 - (len % 16)) % 16;
    if pad < 12 { pad + 16 } else { pad }
}

/// Encrypt `plaintext` as `sender` and return `key_id || msg_key || ciphertext`.
pub fn encrypt_data_v2(plaintext: &[u8], auth_key: &AuthKey, sender: Side) -> Result<Vec<u8>, RandomError> {
    let rnd: [u8; 32] = random_array()?;
    Ok(do_encrypt_data_v2(plaintext, auth_key, sender, &rnd))
}

pub(crate) fn do_encrypt_data_v2(plaintext: &[u8], auth_key: &AuthKey, sender: Side, rnd: &[u8; 32]) -> Vec<u8> {
    let pad = padding_len(plaintext.len());
    let mut body = Vec::with_capacity(24 + plaintext.len() + pad);
    body.extend_from_slice(plaintext);
    body.extend_from_slice(&rnd[..pad]);

    let msg_key = msg_key_for(auth_key, &body, sender);
    let (key, iv) = calc_key(auth_key, &msg_key, sender);
    aes::ige_encrypt(&mut body, &key, &iv);

    let mut out = Vec::with_capacity(24 + body.len());
    out.extend_from_slice(&auth_key.key_id());
    out.extend_from_slice(&msg_key);
    out.extend_from_slice(&body);
    out
}

/// Decrypt a packet produced by `sender`.
///
/// `buffer` must start with `key_id || msg_key || ciphertext`. On success
/// returns the plaintext (including the random padding).
pub fn decrypt_data_v2<'a>(buffer: &'a mut [u8], auth_key: &AuthKey, sender: Side) -> Result<&'a mut [u8], DecryptError> {
    if buffer.len() < 24 + 16 || (buffer.len() - 24) % 16 != 0 {
        return Err(DecryptError::InvalidBuffer);
    }
    if auth_key.key_id() != buffer[..8] {
        return Err(DecryptError::AuthKeyMismatch);
    }
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&buffer[8..24]);

    let (key, iv) = calc_key(auth_key, &msg_key, sender);
    aes::ige_decrypt(&mut buffer[24..], &key, &iv);

    if msg_key != msg_key_for(auth_key, &buffer[24..], sender) {
        return Err(DecryptError::MessageKeyMismatch);
    }
    Ok(&mut buffer[24..])
}

/// Derive `(key, iv)` from nonces for the `ServerDhParams.encrypted_answer`
/// and `set_client_DH_params` payloads.
pub fn generate_key_data_from_nonce(server_nonce: &[u8; 16], new_nonce: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let h1 = sha1!(new_nonce, server_nonce);
    let h2 = sha1!(server_nonce, new_nonce);
    let h3 = sha1!(new_nonce, new_nonce);

    let mut key = [0u8; 32];
    key[..20].copy_from_slice(&h1);
    key[20..].copy_from_slice(&h2[..12]);

    let mut iv = [0u8; 32];
    iv[..8].copy_from_slice(&h2[12..]);
    iv[8..28].copy_from_slice(&h3);
    iv[28..].copy_from_slice(&new_nonce[..4]);

    (key, iv)
}
