//! RSA with the MTProto `RSA_PAD` scheme used by the key exchange.

use std::fmt;

use num_bigint::BigUint;

use crate::{aes, sha1, sha256};

/// Maximum payload `RSA_PAD` can carry.
pub const MAX_DATA_LEN: usize = 144;

const PADDED_LEN: usize = 192;
const BLOCK_LEN: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The payload does not fit in one padded block.
    DataTooLarge { len: usize },
    /// The ciphertext is not a valid RSA block for this key.
    InvalidCiphertext,
    /// The decrypted block failed its embedded SHA-256 check.
    BadPadding,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataTooLarge { len } => write!(f, "{len} bytes exceed the RSA_PAD limit of {MAX_DATA_LEN}"),
            Self::InvalidCiphertext => write!(f, "ciphertext is not a valid block for this key"),
            Self::BadPadding => write!(f, "RSA_PAD hash check failed"),
        }
    }
}

impl std::error::Error for Error {}

/// An RSA public key (n, e).
#[derive(Clone, Debug, PartialEq)]
pub struct Key {
    n: BigUint,
    e: BigUint,
}

impl Key {
    /// Parse decimal `n` and `e` strings.
    pub fn new(n: &str, e: &str) -> Option<Self> {
        Some(Self {
            n: BigUint::parse_bytes(n.as_bytes(), 10)?,
            e: BigUint::parse_bytes(e.as_bytes(), 10)?,
        })
    }

    /// Server key fingerprint: the lower 64 bits of
    /// `SHA1(tl_bytes(n) || tl_bytes(e))`, read little-endian.
    pub fn fingerprint(&self) -> i64 {
        let digest = sha1!(tl_bytes(&self.n.to_bytes_be()), tl_bytes(&self.e.to_bytes_be()));
        let mut low = [0u8; 8];
        low.copy_from_slice(&digest[12..20]);
        i64::from_le_bytes(low)
    }
}

/// The private half, used by the in-process test server.
#[derive(Clone, Debug)]
pub struct PrivateKey {
    public: Key,
    d: BigUint,
}

impl PrivateKey {
    /// Decimal `n`, `e` and private exponent `d`.
    pub fn new(n: &str, e: &str, d: &str) -> Option<Self> {
        Some(Self {
            public: Key::new(n, e)?,
            d: BigUint::parse_bytes(d.as_bytes(), 10)?,
        })
    }

    pub fn public_key(&self) -> &Key { &self.public }

    /// Undo [`encrypt_hashed`], returning the 192-byte `data_with_padding`
    /// (payload followed by random filler).
    pub fn decrypt_hashed(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        let c = BigUint::from_bytes_be(ciphertext);
        if ciphertext.len() != BLOCK_LEN || c >= self.public.n {
            return Err(Error::InvalidCiphertext);
        }
        let block = left_pad(c.modpow(&self.d, &self.public.n).to_bytes_be());

        let (key_xor, aes_encrypted) = block.split_at(32);
        let hash = sha256!(aes_encrypted);
        let mut temp_key = [0u8; 32];
        for ((k, a), b) in temp_key.iter_mut().zip(key_xor).zip(hash.iter()) {
            *k = a ^ b;
        }

        let mut data_with_hash = aes_encrypted.to_vec();
        aes::ige_decrypt(&mut data_with_hash, &temp_key, &[0u8; 32]);

        let (reversed, check) = data_with_hash.split_at(PADDED_LEN);
        let data_with_padding: Vec<u8> = reversed.iter().copied().rev().collect();
        if sha256!(&temp_key, &data_with_padding) != check {
            return Err(Error::BadPadding);
        }
        Ok(data_with_padding)
    }
}

fn tl_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 8);
    if data.len() <= 253 {
        out.push(data.len() as u8);
    } else {
        out.push(0xfe);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes()[..3]);
    }
    out.extend_from_slice(data);
    while out.len() % 4 != 0 { out.push(0); }
    out
}

fn left_pad(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.len() < BLOCK_LEN {
        let mut padded = vec![0u8; BLOCK_LEN - bytes.len()];
        padded.append(&mut bytes);
        padded
    } else {
        bytes
    }
}

fn increment(data: &mut [u8]) {
    for byte in data.iter_mut().rev() {
        let (n, overflow) = byte.overflowing_add(1);
        *byte = n;
        if !overflow { break; }
    }
}

/// RSA-encrypt `data` with the `RSA_PAD` scheme.
///
/// `random_bytes` supplies 192 bytes of padding material followed by the
/// 32-byte temporary AES key.
pub fn encrypt_hashed(data: &[u8], key: &Key, random_bytes: &[u8; 224]) -> Result<Vec<u8>, Error> {
    if data.len() > MAX_DATA_LEN {
        return Err(Error::DataTooLarge { len: data.len() });
    }

    let mut data_with_padding = Vec::with_capacity(PADDED_LEN);
    data_with_padding.extend_from_slice(data);
    data_with_padding.extend_from_slice(&random_bytes[..PADDED_LEN - data.len()]);
    let data_pad_reversed: Vec<u8> = data_with_padding.iter().copied().rev().collect();

    let mut temp_key = [0u8; 32];
    temp_key.copy_from_slice(&random_bytes[PADDED_LEN..]);

    let key_aes_encrypted = loop {
        let mut data_with_hash = Vec::with_capacity(224);
        data_with_hash.extend_from_slice(&data_pad_reversed);
        data_with_hash.extend_from_slice(&sha256!(&temp_key, &data_with_padding));
        aes::ige_encrypt(&mut data_with_hash, &temp_key, &[0u8; 32]);

        let hash = sha256!(&data_with_hash);
        let mut candidate = Vec::with_capacity(BLOCK_LEN);
        candidate.extend(temp_key.iter().zip(hash.iter()).map(|(a, b)| a ^ b));
        candidate.extend_from_slice(&data_with_hash);

        // must stay below the modulus; retry with another temp key otherwise
        if BigUint::from_bytes_be(&candidate) < key.n {
            break candidate;
        }
        increment(&mut temp_key);
    };

    let encrypted = BigUint::from_bytes_be(&key_aes_encrypted).modpow(&key.e, &key.n);
    Ok(left_pad(encrypted.to_bytes_be()))
}
