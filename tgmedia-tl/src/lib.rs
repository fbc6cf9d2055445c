//! TL types, functions and enums spoken by tgmedia.
//!
//! | Module        | Contents                                                   |
//! |---------------|------------------------------------------------------------|
//! | [`types`]     | Concrete constructors (bare types) as `struct`s            |
//! | [`functions`] | RPC functions as `struct`s implementing [`RemoteCall`]     |
//! | [`enums`]     | Boxed types as `enum`s implementing [`Deserializable`]     |
//!
//! MTProto service constructors carry their real ids. The API half is a
//! reduced dialect covering login, history, search and file download; its
//! constructor ids are local to this crate.
//!
//! ```rust
//! use tgmedia_tl::{functions, Deserializable, Serializable};
//!
//! let req = functions::Ping { ping_id: 7 };
//! let bytes = req.to_bytes();
//! assert_eq!(functions::Ping::from_bytes(&bytes).unwrap(), req);
//! ```

#![deny(unsafe_code)]
#![allow(clippy::large_enum_variant)]

#[macro_use]
mod macros;

pub mod deserialize;
pub mod serialize;
pub mod types;
pub mod enums;
pub mod functions;

pub use deserialize::{Cursor, Deserializable, peek_constructor};
pub use serialize::Serializable;

// ─── Core traits ──────────────────────────────────────────────────────────────

/// Every constructor has a unique 32-bit id.
pub trait Identifiable {
    /// The constructor ID as written in the schema.
    const CONSTRUCTOR_ID: u32;
}

/// A constructor whose body can be read once its id has been consumed.
///
/// Boxed enums read the id themselves and then dispatch here.
pub trait Bare: Sized {
    fn deserialize_bare(buf: deserialize::Buffer) -> deserialize::Result<Self>;
}

/// Marks a function type that can be sent as an RPC call.
///
/// `Return` is the type the server responds with.
pub trait RemoteCall: Serializable {
    /// The deserialized response type.
    type Return: Deserializable;
}
