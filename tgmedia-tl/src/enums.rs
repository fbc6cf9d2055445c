//! Boxed types: one enum per TL type, one variant per constructor.

use crate::types;

tl_enum! {
    ServerDhParams {
        Fail(types::ServerDhParamsFail),
        Ok(types::ServerDhParamsOk),
    }

    SetClientDhParamsAnswer {
        DhGenOk(types::DhGenOk),
        DhGenRetry(types::DhGenRetry),
        DhGenFail(types::DhGenFail),
    }

    User {
        Empty(types::UserEmpty),
        User(types::User),
    }

    Chat {
        Chat(types::Chat),
        Channel(types::Channel),
    }

    Peer {
        User(types::PeerUser),
        Chat(types::PeerChat),
        Channel(types::PeerChannel),
    }

    InputPeer {
        Empty(types::InputPeerEmpty),
        PeerSelf(types::InputPeerSelf),
        User(types::InputPeerUser),
        Chat(types::InputPeerChat),
        Channel(types::InputPeerChannel),
    }

    InputUser {
        UserSelf(types::InputUserSelf),
        User(types::InputUser),
    }

    Message {
        Empty(types::MessageEmpty),
        Message(types::Message),
        Service(types::MessageService),
    }

    MessageMedia {
        Empty(types::MessageMediaEmpty),
        Photo(types::MessageMediaPhoto),
        Document(types::MessageMediaDocument),
        Unsupported(types::MessageMediaUnsupported),
    }

    Photo {
        Empty(types::PhotoEmpty),
        Photo(types::Photo),
    }

    PhotoSize {
        Empty(types::PhotoSizeEmpty),
        Size(types::PhotoSize),
    }

    Document {
        Empty(types::DocumentEmpty),
        Document(types::Document),
    }

    DocumentAttribute {
        Filename(types::DocumentAttributeFilename),
        Video(types::DocumentAttributeVideo),
        Audio(types::DocumentAttributeAudio),
        ImageSize(types::DocumentAttributeImageSize),
    }

    MessagesFilter {
        Empty(types::InputMessagesFilterEmpty),
        Photos(types::InputMessagesFilterPhotos),
        Video(types::InputMessagesFilterVideo),
        Document(types::InputMessagesFilterDocument),
        Music(types::InputMessagesFilterMusic),
    }

    InputFileLocation {
        Photo(types::InputPhotoFileLocation),
        Document(types::InputDocumentFileLocation),
    }

    PasswordKdfAlgo {
        Unknown(types::PasswordKdfAlgoUnknown),
        ModPow(types::PasswordKdfAlgoModPow),
    }

    Update {
        NewMessage(types::UpdateNewMessage),
        NewChannelMessage(types::UpdateNewChannelMessage),
        DeleteMessages(types::UpdateDeleteMessages),
    }

    Updates {
        TooLong(types::UpdatesTooLong),
        UpdateShort(types::UpdateShort),
        Updates(types::Updates),
    }
}

pub mod auth {
    use crate::types::auth as t;

    tl_enum! {
        Authorization {
            Authorization(t::Authorization),
            SignUpRequired(t::AuthorizationSignUpRequired),
        }
    }
}

pub mod messages {
    use crate::types::messages as t;

    tl_enum! {
        Messages {
            Messages(t::Messages),
            Slice(t::MessagesSlice),
            ChannelMessages(t::ChannelMessages),
            NotModified(t::MessagesNotModified),
        }
    }

    impl Messages {
        /// The messages carried by any of the variants.
        pub fn into_messages(self) -> Vec<super::Message> {
            match self {
                Self::Messages(m) => m.messages,
                Self::Slice(m) => m.messages,
                Self::ChannelMessages(m) => m.messages,
                Self::NotModified(_) => Vec::new(),
            }
        }
    }
}

impl Message {
    /// Message id regardless of the constructor.
    pub fn id(&self) -> i32 {
        match self {
            Self::Empty(m) => m.id,
            Self::Message(m) => m.id,
            Self::Service(m) => m.id,
        }
    }
}

impl Chat {
    pub fn id(&self) -> i64 {
        match self {
            Self::Chat(c) => c.id,
            Self::Channel(c) => c.id,
        }
    }
}

impl User {
    pub fn id(&self) -> i64 {
        match self {
            Self::Empty(u) => u.id,
            Self::User(u) => u.id,
        }
    }
}
