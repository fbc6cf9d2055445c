//! Plain (pre-key) message session used while the key exchange runs.

use tgmedia_tl::{Deserializable, RemoteCall, Serializable};

use crate::message::{MessageIdGenerator, Packet, PlainMessage};

/// Error returned when a plain reply cannot be read.
#[derive(Clone, Debug, PartialEq)]
pub enum PlainError {
    /// An encrypted packet arrived where a plain one was expected.
    UnexpectedEncrypted,
    Deserialize(tgmedia_tl::deserialize::Error),
}

impl std::fmt::Display for PlainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEncrypted => write!(f, "expected a plain packet during key exchange"),
            Self::Deserialize(e) => write!(f, "plain body: {e}"),
        }
    }
}

impl std::error::Error for PlainError {}

/// Allocates message ids for plain messages.
///
/// ```rust
/// use tgmedia_mtproto::{Packet, Session};
/// use tgmedia_tl::functions;
///
/// let mut session = Session::new();
/// let packet = session.pack(&functions::ReqPqMulti { nonce: [0; 16] });
/// assert!(matches!(packet, Packet::Plain(_)));
/// ```
#[derive(Clone, Debug)]
pub struct Session {
    ids: MessageIdGenerator,
}

impl Session {
    pub fn new() -> Self {
        Self { ids: MessageIdGenerator::client(0) }
    }

    pub fn pack<R: RemoteCall>(&mut self, call: &R) -> Packet {
        Packet::Plain(PlainMessage { msg_id: self.ids.next(), body: call.to_bytes() })
    }

    /// Read the typed reply to a call packed by [`Session::pack`].
    pub fn unpack<T: Deserializable>(packet: Packet) -> Result<T, PlainError> {
        match packet {
            Packet::Plain(m) => T::from_bytes(&m.body).map_err(PlainError::Deserialize),
            Packet::Encrypted(_) => Err(PlainError::UnexpectedEncrypted),
        }
    }
}

impl Default for Session {
    fn default() -> Self { Self::new() }
}
