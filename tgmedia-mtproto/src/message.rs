//! Message identifiers and the two packet shapes carried by transport frames.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::transport::Error;

/// `rpc_result#f35c6d01 req_msg_id:long result:Object`
pub const RPC_RESULT: u32 = 0xf35c6d01;
/// `msg_container#73f1f8dc messages:vector<%Message>`
pub const MSG_CONTAINER: u32 = 0x73f1f8dc;
/// `gzip_packed#3072cfa1 packed_data:bytes`
pub const GZIP_PACKED: u32 = 0x3072cfa1;

/// Unix seconds carried in the upper half of a message id.
pub fn message_time(msg_id: i64) -> i64 {
    msg_id >> 32
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Allocates strictly increasing message ids from the (offset-adjusted)
/// clock.
///
/// Client ids are divisible by 4. Server ids are `1 mod 4`.
#[derive(Clone, Debug)]
pub struct MessageIdGenerator {
    last: i64,
    time_offset: i64,
    low_bits: i64,
}

impl MessageIdGenerator {
    pub fn client(time_offset: i64) -> Self {
        Self { last: 0, time_offset, low_bits: 0 }
    }

    pub fn server() -> Self {
        Self { last: 0, time_offset: 0, low_bits: 1 }
    }

    pub fn time_offset(&self) -> i64 { self.time_offset }

    pub fn set_time_offset(&mut self, offset: i64) {
        self.time_offset = offset;
    }

    pub fn next(&mut self) -> i64 {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let secs = now.as_secs() as i64 + self.time_offset;
        let nanos = i64::from(now.subsec_nanos());
        let mut id = (secs << 32) | (nanos << 2) | self.low_bits;
        if id <= self.last {
            id = self.last + 4;
        }
        self.last = id;
        id
    }
}

/// Unencrypted message exchanged during the key exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct PlainMessage {
    pub msg_id: i64,
    pub body: Vec<u8>,
}

/// Encrypted packet, kept opaque until a session decrypts it.
#[derive(Clone, Debug, PartialEq)]
pub struct EncryptedPacket {
    /// `auth_key_id || msg_key || ciphertext`
    pub bytes: Vec<u8>,
}

impl EncryptedPacket {
    pub fn auth_key_id(&self) -> [u8; 8] {
        let mut id = [0u8; 8];
        id.copy_from_slice(&self.bytes[..8]);
        id
    }
}

/// Payload of one transport frame. A zero `auth_key_id` marks a plain
/// message, anything else is encrypted.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Plain(PlainMessage),
    Encrypted(EncryptedPacket),
}

impl Packet {
    pub fn parse(payload: Vec<u8>) -> Result<Self, Error> {
        if payload.len() < 8 {
            return Err(Error::MalformedPacket { reason: "shorter than auth_key_id" });
        }
        if payload[..8] != [0u8; 8] {
            // key id + msg_key + at least one block
            if payload.len() < 8 + 16 + 16 {
                return Err(Error::MalformedPacket { reason: "encrypted packet too short" });
            }
            return Ok(Self::Encrypted(EncryptedPacket { bytes: payload }));
        }

        if payload.len() < 20 {
            return Err(Error::MalformedPacket { reason: "plain header truncated" });
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&payload[8..16]);
        let msg_id = i64::from_le_bytes(word);
        let mut len = [0u8; 4];
        len.copy_from_slice(&payload[16..20]);
        let len = u32::from_le_bytes(len) as usize;
        if payload.len() - 20 != len {
            return Err(Error::MalformedPacket { reason: "plain body length mismatch" });
        }
        Ok(Self::Plain(PlainMessage { msg_id, body: payload[20..].to_vec() }))
    }

    /// Wire form:
    ///
    /// ```text
    /// plain:     auth_key_id=0:long  msg_id:long  len:int  body
    /// encrypted: auth_key_id:long    msg_key:int128  ciphertext
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Plain(m) => {
                let mut buf = Vec::with_capacity(20 + m.body.len());
                buf.extend(0i64.to_le_bytes());
                buf.extend(m.msg_id.to_le_bytes());
                buf.extend((m.body.len() as u32).to_le_bytes());
                buf.extend_from_slice(&m.body);
                buf
            }
            Self::Encrypted(p) => p.bytes.clone(),
        }
    }
}
