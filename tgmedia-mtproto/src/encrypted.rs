//! Encrypted MTProto 2.0 session (post auth-key).
//!
//! Once you have a [`Finished`](crate::authentication::Finished), construct an
//! [`EncryptedSession`] and use it to encrypt every outgoing message and
//! decrypt every incoming one.

use tgmedia_crypto::{AuthKey, RandomError, Side, decrypt_data_v2, encrypt_data_v2, random_array};

use crate::message::{MessageIdGenerator, message_time, unix_now};

/// Errors that can occur when decrypting a peer message.
#[derive(Clone, Debug, PartialEq)]
pub enum DecryptError {
    /// The underlying crypto layer rejected the message.
    Crypto(tgmedia_crypto::DecryptError),
    /// The decrypted inner message was too short to contain a valid header.
    FrameTooShort,
    /// Session-ID mismatch (possible replay or wrong connection).
    SessionMismatch { expected: i64, got: i64 },
    /// Declared body length disagrees with the decrypted size and padding.
    LengthMismatch { declared: usize, available: usize },
    /// The msg_id does not carry the low bits the peer must use.
    BadMsgId { msg_id: i64 },
}

impl DecryptError {
    /// The packet could not have come from the holder of our auth key,
    /// or belongs to a different session.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::Crypto(_) | Self::SessionMismatch { .. })
    }
}

impl std::fmt::Display for DecryptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Crypto(e) => write!(f, "crypto: {e}"),
            Self::FrameTooShort => write!(f, "inner plaintext too short"),
            Self::SessionMismatch { expected, got } => {
                write!(f, "session_id mismatch: expected {expected:#x}, got {got:#x}")
            }
            Self::LengthMismatch { declared, available } => {
                write!(f, "body length {declared} does not fit {available} decrypted bytes")
            }
            Self::BadMsgId { msg_id } => write!(f, "msg_id {msg_id:#x} has wrong parity"),
        }
    }
}
impl std::error::Error for DecryptError {}

/// The inner payload extracted from a successfully decrypted frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DecryptedMessage {
    pub salt:       i64,
    pub session_id: i64,
    pub msg_id:     i64,
    pub seq_no:     i32,
    /// TL-serialized body of the inner message.
    pub body:       Vec<u8>,
}

impl DecryptedMessage {
    /// Odd sequence numbers mark content-related messages, which must be
    /// acknowledged.
    pub fn is_content_related(&self) -> bool {
        self.seq_no & 1 == 1
    }
}

/// MTProto 2.0 encrypted session state.
///
/// Wraps an `AuthKey` and tracks per-session counters (session_id, seq_no,
/// message ids, server salt, clock offset).
#[derive(Clone, Debug)]
pub struct EncryptedSession {
    auth_key:   AuthKey,
    session_id: i64,
    sequence:   u32,
    ids:        MessageIdGenerator,
    salt:       i64,
    local:      Side,
}

const HEADER_LEN: usize = 8 + 8 + 8 + 4 + 4;

impl EncryptedSession {
    /// Start a fresh client session over an established key.
    pub fn new(auth_key: [u8; 256], first_salt: i64, time_offset: i64) -> Result<Self, RandomError> {
        let session_id = i64::from_le_bytes(random_array()?);
        Ok(Self::resume(auth_key, session_id, first_salt, time_offset, 0))
    }

    /// Continue a stored client session.
    pub fn resume(
        auth_key:    [u8; 256],
        session_id:  i64,
        salt:        i64,
        time_offset: i64,
        sequence:    u32,
    ) -> Self {
        Self {
            auth_key: AuthKey::from_bytes(auth_key),
            session_id,
            sequence,
            ids: MessageIdGenerator::client(time_offset),
            salt,
            local: Side::Client,
        }
    }

    /// Server end of a session opened by a client with `session_id`.
    #[cfg(feature = "server")]
    pub fn for_server(auth_key: [u8; 256], session_id: i64, salt: i64) -> Self {
        Self {
            auth_key: AuthKey::from_bytes(auth_key),
            session_id,
            sequence: 0,
            ids: MessageIdGenerator::server(),
            salt,
            local: Side::Server,
        }
    }

    pub fn auth_key_bytes(&self) -> [u8; 256] { self.auth_key.to_bytes() }
    pub fn session_id(&self) -> i64 { self.session_id }
    pub fn sequence(&self) -> u32 { self.sequence }
    pub fn salt(&self) -> i64 { self.salt }
    pub fn set_salt(&mut self, salt: i64) { self.salt = salt; }
    pub fn time_offset(&self) -> i64 { self.ids.time_offset() }
    pub fn set_time_offset(&mut self, offset: i64) { self.ids.set_time_offset(offset); }

    /// Adopt the clock carried by a msg_id the peer generated.
    pub fn sync_time(&mut self, peer_msg_id: i64) -> i64 {
        let offset = message_time(peer_msg_id) - unix_now();
        self.ids.set_time_offset(offset);
        offset
    }

    /// Whether `peer_msg_id` is more than `threshold_secs` away from our
    /// offset-adjusted clock.
    pub fn is_drifted(&self, peer_msg_id: i64, threshold_secs: i64) -> bool {
        let ours = unix_now() + self.ids.time_offset();
        (message_time(peer_msg_id) - ours).abs() > threshold_secs
    }

    /// Switch to a new random session id, resetting the sequence counter.
    pub fn reset_session(&mut self) -> Result<(), RandomError> {
        self.session_id = i64::from_le_bytes(random_array()?);
        self.sequence = 0;
        Ok(())
    }

    /// Allocate the msg_id and seq_no of the next outgoing message. Used
    /// directly when building container members.
    pub fn next_message(&mut self, content_related: bool) -> (i64, i32) {
        (self.ids.next(), self.next_seq_no(content_related))
    }

    fn next_seq_no(&mut self, content_related: bool) -> i32 {
        if content_related {
            let n = self.sequence.wrapping_mul(2).wrapping_add(1);
            self.sequence = self.sequence.wrapping_add(1);
            n as i32
        } else {
            self.sequence.wrapping_mul(2) as i32
        }
    }

    /// Encrypt `body` as the next message, returning the packet bytes and
    /// the allocated msg_id.
    ///
    /// Layout of the plaintext before encryption:
    /// ```text
    /// salt:       i64
    /// session_id: i64
    /// msg_id:     i64
    /// seq_no:     i32
    /// body_len:   i32
    /// body:       [u8; body_len]
    /// ```
    pub fn pack(&mut self, body: &[u8], content_related: bool) -> Result<(Vec<u8>, i64), RandomError> {
        let (msg_id, seq_no) = self.next_message(content_related);

        let mut plain = Vec::with_capacity(HEADER_LEN + body.len());
        plain.extend(self.salt.to_le_bytes());
        plain.extend(self.session_id.to_le_bytes());
        plain.extend(msg_id.to_le_bytes());
        plain.extend(seq_no.to_le_bytes());
        plain.extend((body.len() as u32).to_le_bytes());
        plain.extend_from_slice(body);

        Ok((encrypt_data_v2(&plain, &self.auth_key, self.local)?, msg_id))
    }

    /// Decrypt a packet sent by the other end of this session.
    pub fn unpack(&self, packet: &mut [u8]) -> Result<DecryptedMessage, DecryptError> {
        let remote = match self.local {
            Side::Client => Side::Server,
            Side::Server => Side::Client,
        };
        let plaintext = decrypt_data_v2(packet, &self.auth_key, remote)
            .map_err(DecryptError::Crypto)?;
        let msg = read_plaintext(plaintext, remote)?;

        if msg.session_id != self.session_id {
            return Err(DecryptError::SessionMismatch { expected: self.session_id, got: msg.session_id });
        }
        Ok(msg)
    }

    /// Open the server end of a session from the first client packet,
    /// adopting its session id and salt.
    #[cfg(feature = "server")]
    pub fn accept(auth_key: [u8; 256], packet: &mut [u8]) -> Result<(Self, DecryptedMessage), DecryptError> {
        let key = AuthKey::from_bytes(auth_key);
        let plaintext = decrypt_data_v2(packet, &key, Side::Client).map_err(DecryptError::Crypto)?;
        let msg = read_plaintext(plaintext, Side::Client)?;
        Ok((Self::for_server(auth_key, msg.session_id, msg.salt), msg))
    }
}

fn read_plaintext(plaintext: &[u8], sender: Side) -> Result<DecryptedMessage, DecryptError> {
    if plaintext.len() < HEADER_LEN {
        return Err(DecryptError::FrameTooShort);
    }

    let word = |at: usize| {
        let mut b = [0u8; 8];
        b.copy_from_slice(&plaintext[at..at + 8]);
        i64::from_le_bytes(b)
    };
    let salt       = word(0);
    let session_id = word(8);
    let msg_id     = word(16);
    let mut b = [0u8; 4];
    b.copy_from_slice(&plaintext[24..28]);
    let seq_no = i32::from_le_bytes(b);
    b.copy_from_slice(&plaintext[28..32]);
    let body_len = u32::from_le_bytes(b) as usize;

    let available = plaintext.len() - HEADER_LEN;
    let padding = available.checked_sub(body_len);
    if body_len % 4 != 0 || !matches!(padding, Some(12..=1024)) {
        return Err(DecryptError::LengthMismatch { declared: body_len, available });
    }

    let parity_ok = match sender {
        Side::Server => msg_id & 1 == 1,
        Side::Client => msg_id & 3 == 0,
    };
    if !parity_ok {
        return Err(DecryptError::BadMsgId { msg_id });
    }

    let body = plaintext[HEADER_LEN..HEADER_LEN + body_len].to_vec();
    Ok(DecryptedMessage { salt, session_id, msg_id, seq_no, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 256] {
        core::array::from_fn(|i| (i * 13 % 256) as u8)
    }

    #[test]
    fn content_messages_advance_the_sequence() {
        let mut s = EncryptedSession::resume(key(), 1, 2, 0, 0);
        s.pack(b"abcd", true).unwrap();
        s.pack(b"abcd", false).unwrap();
        s.pack(b"abcd", true).unwrap();
        assert_eq!(s.sequence(), 2);
    }

    #[test]
    fn msg_ids_are_unique_and_increasing() {
        let mut s = EncryptedSession::resume(key(), 1, 2, 0, 0);
        let (_, a) = s.pack(b"abcd", true).unwrap();
        let (_, b) = s.pack(b"abcd", true).unwrap();
        assert!(b > a);
        assert_eq!(a % 4, 0);
    }

    #[test]
    fn client_cannot_read_its_own_packets() {
        let mut s = EncryptedSession::resume(key(), 1, 2, 0, 0);
        let (mut packet, _) = s.pack(b"abcd", true).unwrap();
        let err = s.unpack(&mut packet).unwrap_err();
        assert!(err.is_integrity_failure());
    }

    #[test]
    fn drift_is_measured_against_adjusted_clock() {
        let s = EncryptedSession::resume(key(), 1, 2, 0, 0);
        let ahead = (unix_now() + 120) << 32 | 1;
        assert!(s.is_drifted(ahead, 30));
        let now = unix_now() << 32 | 1;
        assert!(!s.is_drifted(now, 30));
    }

    #[test]
    fn sync_time_adopts_peer_clock() {
        let mut s = EncryptedSession::resume(key(), 1, 2, 0, 0);
        let ahead = (unix_now() + 600) << 32 | 1;
        let offset = s.sync_time(ahead);
        assert!((offset - 600).abs() <= 1);
        assert!(!s.is_drifted(ahead, 30));
    }
}
