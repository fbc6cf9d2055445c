//! Hash helpers over one or more byte slices, fed in order.

/// SHA-1 of the concatenation of the arguments, as `[u8; 20]`.
#[macro_export]
macro_rules! sha1 {
    ( $( $part:expr ),+ $(,)? ) => {{
        use sha1::{Digest, Sha1};
        let mut hasher = Sha1::new();
        $( hasher.update($part); )+
        let digest: [u8; 20] = hasher.finalize().into();
        digest
    }};
}

/// SHA-256 of the concatenation of the arguments, as `[u8; 32]`.
#[macro_export]
macro_rules! sha256 {
    ( $( $part:expr ),+ $(,)? ) => {{
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        $( hasher.update($part); )+
        let digest: [u8; 32] = hasher.finalize().into();
        digest
    }};
}
