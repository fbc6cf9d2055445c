//! MTProto session and transport abstractions.
//!
//! This crate handles:
//! * Frame encoding with sequence numbers and CRC-32 ([`transport`])
//! * Message ids and the plain/encrypted packet split ([`message`])
//! * Plaintext messages for the key exchange ([`session`])
//! * The DH key exchange itself ([`authentication`])
//! * MTProto 2.0 encrypted sessions ([`encrypted`])
//!
//! It is transport-agnostic: bring your own TCP stream. The `server`
//! feature adds the other end of the handshake for in-process test servers.

#![deny(unsafe_code)]

pub mod authentication;
pub mod encrypted;
pub mod message;
#[cfg(feature = "server")]
pub mod server;
pub mod session;
pub mod transport;

pub use authentication::{Finished, PinnedKeys};
pub use encrypted::{DecryptedMessage, EncryptedSession};
pub use message::{MessageIdGenerator, Packet};
pub use session::Session;
pub use transport::FrameCodec;
