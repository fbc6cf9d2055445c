//! Persisted session record: auth key, salt, sequence, clock offset, DC
//! address, session id.
//!
//! Binary layout (little endian):
//!
//! ```text
//! "TGMS"  version:u8
//! auth_key:[u8;256]  server_salt:i64  sequence:u32  time_offset:i64
//! session_id:i64  addr_len:u16  addr:[u8]
//! sha256(everything above):[u8;32]
//! ```

use std::fmt;

use sha2::{Digest, Sha256};

const MAGIC: &[u8; 4] = b"TGMS";
pub const FORMAT_VERSION: u8 = 1;

const FIXED_LEN: usize = 256 + 8 + 4 + 8 + 8 + 2;
const CHECKSUM_LEN: usize = 32;

/// Why a stored record was rejected.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionError {
    Truncated { len: usize },
    BadMagic,
    UnsupportedVersion(u8),
    BadChecksum,
    BadAddress,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { len }      => write!(f, "session record truncated ({len} bytes)"),
            Self::BadMagic               => write!(f, "not a session record"),
            Self::UnsupportedVersion(v)  => write!(f, "session format version {v} is not supported"),
            Self::BadChecksum            => write!(f, "session checksum mismatch"),
            Self::BadAddress             => write!(f, "session DC address is not UTF-8"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Everything needed to resume an encrypted session without a handshake.
#[derive(Clone, PartialEq)]
pub struct Session {
    pub auth_key:    [u8; 256],
    pub server_salt: i64,
    /// Content messages sent so far in this session.
    pub sequence:    u32,
    /// Server clock minus local clock, in seconds.
    pub time_offset: i64,
    pub dc_addr:     String,
    pub session_id:  i64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("auth_key", &"<redacted>")
            .field("server_salt", &self.server_salt)
            .field("sequence", &self.sequence)
            .field("time_offset", &self.time_offset)
            .field("dc_addr", &self.dc_addr)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl Session {
    pub fn encode(&self) -> Vec<u8> {
        let addr = self.dc_addr.as_bytes();
        let addr = &addr[..addr.len().min(u16::MAX as usize)];

        let mut b = Vec::with_capacity(5 + FIXED_LEN + addr.len() + CHECKSUM_LEN);
        b.extend_from_slice(MAGIC);
        b.push(FORMAT_VERSION);
        b.extend_from_slice(&self.auth_key);
        b.extend_from_slice(&self.server_salt.to_le_bytes());
        b.extend_from_slice(&self.sequence.to_le_bytes());
        b.extend_from_slice(&self.time_offset.to_le_bytes());
        b.extend_from_slice(&self.session_id.to_le_bytes());
        b.extend_from_slice(&(addr.len() as u16).to_le_bytes());
        b.extend_from_slice(addr);
        let digest: [u8; 32] = Sha256::digest(&b).into();
        b.extend_from_slice(&digest);
        b
    }

    pub fn decode(buf: &[u8]) -> Result<Self, SessionError> {
        let truncated = || SessionError::Truncated { len: buf.len() };
        if buf.len() < 5 + FIXED_LEN + CHECKSUM_LEN {
            return Err(truncated());
        }
        if &buf[..4] != MAGIC {
            return Err(SessionError::BadMagic);
        }
        if buf[4] != FORMAT_VERSION {
            return Err(SessionError::UnsupportedVersion(buf[4]));
        }

        let mut p = 5usize;
        let mut take = |n: usize| -> Result<&[u8], SessionError> {
            let s = buf.get(p..p + n).ok_or_else(truncated)?;
            p += n;
            Ok(s)
        };
        let mut auth_key = [0u8; 256];
        auth_key.copy_from_slice(take(256)?);
        let server_salt = i64::from_le_bytes(word(take(8)?));
        let sequence    = u32::from_le_bytes(half(take(4)?));
        let time_offset = i64::from_le_bytes(word(take(8)?));
        let session_id  = i64::from_le_bytes(word(take(8)?));
        let addr_len    = u16::from_le_bytes([take(1)?[0], take(1)?[0]]) as usize;
        let addr        = take(addr_len)?.to_vec();
        let body_end    = p;

        let checksum = buf.get(body_end..body_end + CHECKSUM_LEN).ok_or_else(truncated)?;
        if buf.len() != body_end + CHECKSUM_LEN {
            return Err(SessionError::BadChecksum);
        }
        let digest: [u8; 32] = Sha256::digest(&buf[..body_end]).into();
        if digest[..] != checksum[..] {
            return Err(SessionError::BadChecksum);
        }

        let dc_addr = String::from_utf8(addr).map_err(|_| SessionError::BadAddress)?;
        Ok(Self { auth_key, server_salt, sequence, time_offset, dc_addr, session_id })
    }
}

fn word(s: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(s);
    out
}

fn half(s: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(s);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Session {
        Session {
            auth_key:    core::array::from_fn(|i| i as u8),
            server_salt: -42,
            sequence:    17,
            time_offset: -3600,
            dc_addr:     "127.0.0.1:4430".into(),
            session_id:  0x1122_3344_5566_7788,
        }
    }

    #[test]
    fn record_survives_encoding() {
        let s = sample();
        assert_eq!(Session::decode(&s.encode()).unwrap(), s);
    }

    #[test]
    fn every_truncation_is_rejected() {
        let bytes = sample().encode();
        for len in 0..bytes.len() {
            assert!(Session::decode(&bytes[..len]).is_err(), "accepted {len} bytes");
        }
    }

    #[test]
    fn flipped_bit_fails_checksum() {
        let mut bytes = sample().encode();
        bytes[100] ^= 0x01;
        assert_eq!(Session::decode(&bytes), Err(SessionError::BadChecksum));
    }

    #[test]
    fn other_versions_are_refused() {
        let mut bytes = sample().encode();
        bytes[4] = FORMAT_VERSION + 1;
        assert_eq!(Session::decode(&bytes), Err(SessionError::UnsupportedVersion(FORMAT_VERSION + 1)));
    }

    #[test]
    fn debug_hides_the_key() {
        let text = format!("{:?}", sample());
        assert!(text.contains("redacted"));
        assert!(!text.contains("auth_key: ["));
    }
}
