//! The 256-byte authorization key negotiated by the DH handshake.

use crate::sha1;

/// An authorization key plus the identifiers derived from it.
#[derive(Clone)]
pub struct AuthKey {
    pub(crate) data: [u8; 256],
    aux_hash: [u8; 8],
    key_id: [u8; 8],
}

impl AuthKey {
    pub fn from_bytes(data: [u8; 256]) -> Self {
        let digest = sha1!(&data);
        let mut aux_hash = [0u8; 8];
        aux_hash.copy_from_slice(&digest[..8]);
        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&digest[12..20]);
        Self { data, aux_hash, key_id }
    }

    pub fn to_bytes(&self) -> [u8; 256] { self.data }

    /// Lower 64 bits of SHA-1(key), prefixed to every encrypted packet.
    pub fn key_id(&self) -> [u8; 8] { self.key_id }

    /// `new_nonce_hash{1,2,3}` expected in `dh_gen_ok/retry/fail`.
    pub fn calc_new_nonce_hash(&self, new_nonce: &[u8; 32], number: u8) -> [u8; 16] {
        let digest = sha1!(new_nonce, [number], self.aux_hash);
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[4..]);
        out
    }
}

// Key material never reaches logs.
impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthKey(id={:016x})", u64::from_le_bytes(self.key_id))
    }
}

impl PartialEq for AuthKey {
    fn eq(&self, other: &Self) -> bool { self.data == other.data }
}

impl Eq for AuthKey {}
