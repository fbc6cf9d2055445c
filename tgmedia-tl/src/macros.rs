//! Declarative generators for TL constructors.
//!
//! `tl_object!` emits a struct for every bare constructor together with its
//! [`Identifiable`](crate::Identifiable), [`Serializable`](crate::Serializable),
//! [`Deserializable`](crate::Deserializable) and [`Bare`](crate::Bare) impls.
//! Adding `-> Type` after the constructor id turns it into a function and
//! implements [`RemoteCall`](crate::RemoteCall) as well.
//!
//! `tl_enum!` emits a boxed type: an enum over already declared constructors
//! that dispatches on the leading constructor id.

macro_rules! tl_object {
    ( $(
        $(#[$meta:meta])*
        $name:ident = $id:literal $( -> $ret:ty )? {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty ),* $(,)?
        }
    )* ) => { $(
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )*
        }

        impl $crate::Identifiable for $name {
            const CONSTRUCTOR_ID: u32 = $id;
        }

        impl $crate::Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                $crate::Serializable::serialize(&<Self as $crate::Identifiable>::CONSTRUCTOR_ID, buf);
                $( $crate::Serializable::serialize(&self.$field, buf); )*
            }
        }

        impl $crate::Bare for $name {
            #[allow(unused_variables)]
            fn deserialize_bare(buf: $crate::deserialize::Buffer) -> $crate::deserialize::Result<Self> {
                Ok(Self {
                    $( $field: <$ty as $crate::Deserializable>::deserialize(buf)?, )*
                })
            }
        }

        impl $crate::Deserializable for $name {
            fn deserialize(buf: $crate::deserialize::Buffer) -> $crate::deserialize::Result<Self> {
                let id = <u32 as $crate::Deserializable>::deserialize(buf)?;
                if id != <Self as $crate::Identifiable>::CONSTRUCTOR_ID {
                    return Err($crate::deserialize::Error::UnexpectedConstructor { id });
                }
                <Self as $crate::Bare>::deserialize_bare(buf)
            }
        }

        $(
            impl $crate::RemoteCall for $name {
                type Return = $ret;
            }
        )?
    )* };
}

macro_rules! tl_enum {
    ( $(
        $(#[$meta:meta])*
        $name:ident {
            $( $variant:ident ( $ty:ty ) ),+ $(,)?
        }
    )* ) => { $(
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub enum $name {
            $( $variant($ty), )+
        }

        impl $crate::Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                match self {
                    $( Self::$variant(x) => $crate::Serializable::serialize(x, buf), )+
                }
            }
        }

        impl $crate::Deserializable for $name {
            fn deserialize(buf: $crate::deserialize::Buffer) -> $crate::deserialize::Result<Self> {
                let id = <u32 as $crate::Deserializable>::deserialize(buf)?;
                $(
                    if id == <$ty as $crate::Identifiable>::CONSTRUCTOR_ID {
                        return Ok(Self::$variant(<$ty as $crate::Bare>::deserialize_bare(buf)?));
                    }
                )+
                Err($crate::deserialize::Error::UnexpectedConstructor { id })
            }
        }

        $(
            impl From<$ty> for $name {
                fn from(x: $ty) -> Self { Self::$variant(x) }
            }
        )+
    )* };
}
