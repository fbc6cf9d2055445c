//! Error types for tgmedia-client.
//!
//! Every public error exposes [`kind`](InvocationError::kind), a stable
//! machine-readable [`ErrorKind`], next to its human `Display`.

use std::{fmt, io, time::Duration};

use tgmedia_mtproto::{authentication, encrypted, transport};

use crate::session::SessionError;

// ─── ErrorKind ────────────────────────────────────────────────────────────────

/// Coarse classification shared by all client errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    InvalidInput,
    InvalidPhoneFormat,
    InvalidCode,
    TwoFactorRequired,
    HandshakeFailed,
    UntrustedServer,
    IntegrityFailure,
    ProtocolViolation,
    CallFailed,
    TimedOut,
    Rpc,
    NotFound,
    NoMediaPayload,
    FetchFailed,
    NetworkError,
    Cancelled,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput       => "invalid_input",
            Self::InvalidPhoneFormat => "invalid_phone_format",
            Self::InvalidCode        => "invalid_code",
            Self::TwoFactorRequired  => "two_factor_required",
            Self::HandshakeFailed    => "handshake_failed",
            Self::UntrustedServer    => "untrusted_server",
            Self::IntegrityFailure   => "integrity_failure",
            Self::ProtocolViolation  => "protocol_violation",
            Self::CallFailed         => "call_failed",
            Self::TimedOut           => "timed_out",
            Self::Rpc                => "rpc",
            Self::NotFound           => "not_found",
            Self::NoMediaPayload     => "no_media_payload",
            Self::FetchFailed        => "fetch_failed",
            Self::NetworkError       => "network_error",
            Self::Cancelled          => "cancelled",
            Self::Storage            => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── RpcError ─────────────────────────────────────────────────────────────────

/// An error returned by the server in response to an RPC call.
///
/// Numeric values are stripped from the name and placed in [`RpcError::value`].
///
/// # Example
/// `FLOOD_WAIT_30` → `RpcError { code: 420, name: "FLOOD_WAIT", value: Some(30) }`
#[derive(Clone, Debug, PartialEq)]
pub struct RpcError {
    /// HTTP-like status code.
    pub code: i32,
    /// Error name in SCREAMING_SNAKE_CASE with the numeric suffix removed.
    pub name: String,
    pub value: Option<u32>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC {}: {}", self.code, self.name)?;
        if let Some(v) = self.value {
            write!(f, " (value: {v})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    /// Parse a raw message like `"FLOOD_WAIT_30"`.
    pub fn from_telegram(code: i32, message: &str) -> Self {
        if let Some((name, suffix)) = message.rsplit_once('_') {
            if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(v) = suffix.parse::<u32>() {
                    return Self { code, name: name.to_string(), value: Some(v) };
                }
            }
        }
        Self { code, name: message.to_string(), value: None }
    }

    /// Match on the error name, with an optional `'*'` wildcard at either
    /// end: `"PHONE_CODE_*"`, `"*_INVALID"`.
    pub fn is(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.name.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            self.name.ends_with(suffix)
        } else {
            self.name == pattern
        }
    }

    pub fn flood_wait_seconds(&self) -> Option<u64> {
        if self.code == 420 && self.name == "FLOOD_WAIT" {
            self.value.map(u64::from)
        } else {
            None
        }
    }
}

// ─── InvocationError ──────────────────────────────────────────────────────────

/// The error type returned from any `Client` method that talks to the server.
#[derive(Debug)]
pub enum InvocationError {
    /// The server rejected the request.
    Rpc(RpcError),
    /// Network / I/O failure.
    Io(io::Error),
    /// A reply could not be decoded.
    Deserialize(String),
    /// Framing or envelope rules were broken by the peer.
    Protocol(transport::Error),
    /// `bad_msg_notification` with a code the client does not recover from.
    BadMessage { code: i32 },
    /// A packet failed decryption or carried a foreign session id.
    Integrity(encrypted::DecryptError),
    /// The key exchange failed.
    Handshake(authentication::Error),
    HandshakeTimeout(Duration),
    /// The connection closed while the call was in flight.
    Dropped,
    /// Every attempt ran past its deadline.
    TimedOut { attempts: u32 },
    /// Retries were exhausted on transient failures.
    CallFailed { attempts: u32, last: Box<InvocationError> },
    Cancelled,
    Storage(io::Error),
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e)                 => write!(f, "{e}"),
            Self::Io(e)                  => write!(f, "I/O error: {e}"),
            Self::Deserialize(s)         => write!(f, "deserialize error: {s}"),
            Self::Protocol(e)            => write!(f, "protocol violation: {e}"),
            Self::BadMessage { code }    => write!(f, "server rejected message (code {code})"),
            Self::Integrity(e)           => write!(f, "integrity failure: {e}"),
            Self::Handshake(e)           => write!(f, "handshake failed: {e}"),
            Self::HandshakeTimeout(d)    => write!(f, "handshake timed out after {d:?}"),
            Self::Dropped                => write!(f, "connection closed before a reply arrived"),
            Self::TimedOut { attempts }  => write!(f, "no reply after {attempts} attempt(s)"),
            Self::CallFailed { attempts, last } => {
                write!(f, "call failed after {attempts} attempts: {last}")
            }
            Self::Cancelled              => write!(f, "call cancelled"),
            Self::Storage(e)             => write!(f, "session storage: {e}"),
        }
    }
}

impl std::error::Error for InvocationError {}

impl From<io::Error> for InvocationError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

impl From<tgmedia_tl::deserialize::Error> for InvocationError {
    fn from(e: tgmedia_tl::deserialize::Error) -> Self { Self::Deserialize(e.to_string()) }
}

impl From<transport::Error> for InvocationError {
    fn from(e: transport::Error) -> Self { Self::Protocol(e) }
}

impl From<encrypted::DecryptError> for InvocationError {
    fn from(e: encrypted::DecryptError) -> Self { Self::Integrity(e) }
}

impl From<authentication::Error> for InvocationError {
    fn from(e: authentication::Error) -> Self { Self::Handshake(e) }
}

impl From<getrandom::Error> for InvocationError {
    fn from(e: getrandom::Error) -> Self { Self::Io(io::Error::other(e.to_string())) }
}

impl InvocationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rpc(_)               => ErrorKind::Rpc,
            Self::Io(_) | Self::Dropped => ErrorKind::NetworkError,
            Self::Deserialize(_)
            | Self::Protocol(_)
            | Self::BadMessage { .. }  => ErrorKind::ProtocolViolation,
            Self::Integrity(e) if e.is_integrity_failure() => ErrorKind::IntegrityFailure,
            Self::Integrity(_)         => ErrorKind::ProtocolViolation,
            Self::Handshake(e) if e.is_untrusted() => ErrorKind::UntrustedServer,
            Self::Handshake(_)
            | Self::HandshakeTimeout(_) => ErrorKind::HandshakeFailed,
            Self::TimedOut { .. }      => ErrorKind::TimedOut,
            Self::CallFailed { .. }    => ErrorKind::CallFailed,
            Self::Cancelled            => ErrorKind::Cancelled,
            Self::Storage(_)           => ErrorKind::Storage,
        }
    }

    /// Returns `true` if this is the named RPC error (supports `'*'` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Rpc(e) => e.is(pattern),
            _            => false,
        }
    }

    pub fn flood_wait_seconds(&self) -> Option<u64> {
        match self {
            Self::Rpc(e) => e.flood_wait_seconds(),
            _            => None,
        }
    }

    /// Failures worth another attempt on a fresh or surviving connection.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Dropped | Self::TimedOut { .. })
    }
}

// ─── LoginError ───────────────────────────────────────────────────────────────

/// Errors returned by [`crate::LoginFlow`].
#[derive(Debug)]
pub enum LoginError {
    InvalidPhoneFormat(String),
    /// The code was empty, wrong or expired.
    InvalidCode,
    /// The account has a cloud password and none was supplied.
    TwoFactorRequired { hint: String },
    /// The cloud password did not verify.
    InvalidPassword,
    /// The phone number has no account yet.
    SignUpRequired,
    Other(InvocationError),
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPhoneFormat(p) => write!(f, "invalid phone number format: {p:?}"),
            Self::InvalidCode           => write!(f, "invalid or expired code"),
            Self::TwoFactorRequired { hint } if hint.is_empty() => write!(f, "2FA password required"),
            Self::TwoFactorRequired { hint } => write!(f, "2FA password required (hint: {hint})"),
            Self::InvalidPassword       => write!(f, "invalid 2FA password"),
            Self::SignUpRequired        => write!(f, "no account for this phone number"),
            Self::Other(e)              => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LoginError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Other(e) => Some(e),
            _ => None,
        }
    }
}

impl From<InvocationError> for LoginError {
    fn from(e: InvocationError) -> Self { Self::Other(e) }
}

impl LoginError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPhoneFormat(_) => ErrorKind::InvalidPhoneFormat,
            Self::InvalidCode | Self::InvalidPassword => ErrorKind::InvalidCode,
            Self::TwoFactorRequired { .. } => ErrorKind::TwoFactorRequired,
            Self::SignUpRequired        => ErrorKind::InvalidInput,
            Self::Other(e)              => e.kind(),
        }
    }
}

// ─── MediaError ───────────────────────────────────────────────────────────────

/// Errors returned by [`crate::MediaAccess`].
#[derive(Debug)]
pub enum MediaError {
    /// The chat reference or another argument is unusable.
    InvalidInput(String),
    ChatNotFound(String),
    MessageNotFound { message_id: i32 },
    NoMediaPayload { message_id: i32 },
    /// A chunk kept failing, or the file came back empty.
    FetchFailed { offset: u64, reason: String },
    /// Writing the destination failed.
    Io(io::Error),
    Other(InvocationError),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(s)                => write!(f, "invalid argument: {s}"),
            Self::ChatNotFound(c)                => write!(f, "chat {c:?} not found"),
            Self::MessageNotFound { message_id } => write!(f, "message {message_id} not found"),
            Self::NoMediaPayload { message_id }  => write!(f, "message {message_id} has no media payload"),
            Self::FetchFailed { offset, reason } => write!(f, "download failed at offset {offset}: {reason}"),
            Self::Io(e)                          => write!(f, "writing download: {e}"),
            Self::Other(e)                       => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for MediaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Other(e) => Some(e),
            _ => None,
        }
    }
}

impl From<InvocationError> for MediaError {
    fn from(e: InvocationError) -> Self { Self::Other(e) }
}

impl From<io::Error> for MediaError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

impl MediaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_)        => ErrorKind::InvalidInput,
            Self::ChatNotFound(_)
            | Self::MessageNotFound { .. } => ErrorKind::NotFound,
            Self::NoMediaPayload { .. }  => ErrorKind::NoMediaPayload,
            Self::FetchFailed { .. }     => ErrorKind::FetchFailed,
            Self::Io(_)                  => ErrorKind::Storage,
            Self::Other(e)               => e.kind(),
        }
    }
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind { ErrorKind::Storage }
}
