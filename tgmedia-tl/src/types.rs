//! Bare constructors.
//!
//! The root of this module holds the MTProto service constructors (real ids);
//! the namespaced submodules and the remaining root items form the reduced
//! API dialect spoken by tgmedia peers.

// ─── MTProto: key exchange ───────────────────────────────────────────────────

tl_object! {
    /// `resPQ`
    ResPq = 0x05162463 {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        pq: Vec<u8>,
        server_public_key_fingerprints: Vec<i64>,
    }

    /// `p_q_inner_data`
    PQInnerData = 0x83c95aec {
        pq: Vec<u8>,
        p: Vec<u8>,
        q: Vec<u8>,
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        new_nonce: [u8; 32],
    }

    ServerDhParamsFail = 0x79cb045d {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        new_nonce_hash: [u8; 16],
    }

    ServerDhParamsOk = 0xd0e8075c {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        encrypted_answer: Vec<u8>,
    }

    ServerDhInnerData = 0xb5890dba {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        g: i32,
        dh_prime: Vec<u8>,
        g_a: Vec<u8>,
        server_time: i32,
    }

    ClientDhInnerData = 0x6643b654 {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        retry_id: i64,
        g_b: Vec<u8>,
    }

    DhGenOk = 0x3bcbf734 {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        new_nonce_hash1: [u8; 16],
    }

    DhGenRetry = 0x46dc1fb9 {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        new_nonce_hash2: [u8; 16],
    }

    DhGenFail = 0xa69dae02 {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        new_nonce_hash3: [u8; 16],
    }
}

// ─── MTProto: service messages ───────────────────────────────────────────────

tl_object! {
    RpcError = 0x2144ca19 {
        error_code: i32,
        error_message: String,
    }

    MsgsAck = 0x62d6b459 {
        msg_ids: Vec<i64>,
    }

    BadMsgNotification = 0xa7eff811 {
        bad_msg_id: i64,
        bad_msg_seqno: i32,
        error_code: i32,
    }

    BadServerSalt = 0xedab447b {
        bad_msg_id: i64,
        bad_msg_seqno: i32,
        error_code: i32,
        new_server_salt: i64,
    }

    NewSessionCreated = 0x9ec20908 {
        first_msg_id: i64,
        unique_id: i64,
        server_salt: i64,
    }

    Pong = 0x347773c5 {
        msg_id: i64,
        ping_id: i64,
    }

    GzipPacked = 0x3072cfa1 {
        packed_data: Vec<u8>,
    }
}

// ─── API: peers ──────────────────────────────────────────────────────────────

tl_object! {
    UserEmpty = 0x5a3e1f01 {
        id: i64,
    }

    /// Empty strings stand for absent names, usernames and phones.
    User = 0x5a3e1f02 {
        id: i64,
        access_hash: i64,
        is_self: bool,
        first_name: String,
        last_name: String,
        username: String,
        phone: String,
    }

    /// Basic group.
    Chat = 0x5a3e1f03 {
        id: i64,
        title: String,
    }

    /// Broadcast channel or supergroup (`megagroup`).
    Channel = 0x5a3e1f04 {
        id: i64,
        access_hash: i64,
        title: String,
        username: String,
        broadcast: bool,
        megagroup: bool,
    }

    PeerUser = 0x5a3e1f10 { user_id: i64 }
    PeerChat = 0x5a3e1f11 { chat_id: i64 }
    PeerChannel = 0x5a3e1f12 { channel_id: i64 }

    InputPeerEmpty = 0x5a3e1f20 {}
    InputPeerSelf = 0x5a3e1f21 {}
    InputPeerUser = 0x5a3e1f22 { user_id: i64, access_hash: i64 }
    InputPeerChat = 0x5a3e1f23 { chat_id: i64 }
    InputPeerChannel = 0x5a3e1f24 { channel_id: i64, access_hash: i64 }

    InputUserSelf = 0x5a3e1f28 {}
    InputUser = 0x5a3e1f29 { user_id: i64, access_hash: i64 }

    InputChannel = 0x5a3e1f2c { channel_id: i64, access_hash: i64 }

    InputMessageId = 0x5a3e1f30 { id: i32 }
}

// ─── API: messages and media ─────────────────────────────────────────────────

tl_object! {
    MessageEmpty = 0x5a3e2001 {
        id: i32,
    }

    Message = 0x5a3e2002 {
        id: i32,
        peer_id: crate::enums::Peer,
        date: i32,
        message: String,
        media: crate::enums::MessageMedia,
    }

    MessageService = 0x5a3e2003 {
        id: i32,
        peer_id: crate::enums::Peer,
        date: i32,
    }

    MessageMediaEmpty = 0x5a3e2010 {}
    MessageMediaPhoto = 0x5a3e2011 { photo: crate::enums::Photo }
    MessageMediaDocument = 0x5a3e2012 { document: crate::enums::Document }
    /// Media of a kind this dialect does not model (polls, venues, …).
    MessageMediaUnsupported = 0x5a3e2013 {}

    PhotoEmpty = 0x5a3e2020 { id: i64 }
    Photo = 0x5a3e2021 {
        id: i64,
        access_hash: i64,
        file_reference: Vec<u8>,
        date: i32,
        sizes: Vec<crate::enums::PhotoSize>,
    }

    PhotoSizeEmpty = 0x5a3e2028 { kind: String }
    PhotoSize = 0x5a3e2029 {
        kind: String,
        w: i32,
        h: i32,
        size: i32,
    }

    DocumentEmpty = 0x5a3e2030 { id: i64 }
    Document = 0x5a3e2031 {
        id: i64,
        access_hash: i64,
        file_reference: Vec<u8>,
        date: i32,
        mime_type: String,
        size: i64,
        attributes: Vec<crate::enums::DocumentAttribute>,
    }

    DocumentAttributeFilename = 0x5a3e2038 { file_name: String }
    DocumentAttributeVideo = 0x5a3e2039 { duration: i32, w: i32, h: i32 }
    DocumentAttributeAudio = 0x5a3e203a { duration: i32, title: String, performer: String }
    DocumentAttributeImageSize = 0x5a3e203b { w: i32, h: i32 }

    InputMessagesFilterEmpty = 0x5a3e2040 {}
    InputMessagesFilterPhotos = 0x5a3e2041 {}
    InputMessagesFilterVideo = 0x5a3e2042 {}
    InputMessagesFilterDocument = 0x5a3e2043 {}
    InputMessagesFilterMusic = 0x5a3e2044 {}

    InputPhotoFileLocation = 0x5a3e2050 {
        id: i64,
        access_hash: i64,
        file_reference: Vec<u8>,
        thumb_size: String,
    }
    InputDocumentFileLocation = 0x5a3e2051 {
        id: i64,
        access_hash: i64,
        file_reference: Vec<u8>,
        thumb_size: String,
    }

    /// `inputCheckPasswordSRP`
    InputCheckPasswordSrp = 0x5a3e2060 {
        srp_id: i64,
        a: Vec<u8>,
        m1: Vec<u8>,
    }

    PasswordKdfAlgoUnknown = 0x5a3e2068 {}
    /// `passwordKdfAlgoSHA256SHA256PBKDF2HMACSHA512iter100000SHA256ModPow`
    PasswordKdfAlgoModPow = 0x5a3e2069 {
        salt1: Vec<u8>,
        salt2: Vec<u8>,
        g: i32,
        p: Vec<u8>,
    }
}

// ─── API: updates ────────────────────────────────────────────────────────────

tl_object! {
    UpdateNewMessage = 0x5a3e2101 {
        message: crate::enums::Message,
        pts: i32,
        pts_count: i32,
    }
    UpdateNewChannelMessage = 0x5a3e2102 {
        message: crate::enums::Message,
        pts: i32,
        pts_count: i32,
    }
    UpdateDeleteMessages = 0x5a3e2103 {
        messages: Vec<i32>,
        pts: i32,
        pts_count: i32,
    }

    UpdatesTooLong = 0x5a3e2110 {}
    UpdateShort = 0x5a3e2111 {
        update: crate::enums::Update,
        date: i32,
    }
    Updates = 0x5a3e2112 {
        updates: Vec<crate::enums::Update>,
        users: Vec<crate::enums::User>,
        chats: Vec<crate::enums::Chat>,
        date: i32,
        seq: i32,
    }
}

pub mod auth {
    tl_object! {
        SentCode = 0x5a3e3001 {
            phone_code_hash: String,
            timeout: i32,
        }

        Authorization = 0x5a3e3002 {
            user: crate::enums::User,
        }

        AuthorizationSignUpRequired = 0x5a3e3003 {}

        LoggedOut = 0x5a3e3004 {}
    }
}

pub mod account {
    tl_object! {
        /// Cloud password state; `srp_b` and `srp_id` are meaningful only
        /// when `has_password` is set.
        Password = 0x5a3e3101 {
            has_password: bool,
            current_algo: crate::enums::PasswordKdfAlgo,
            srp_b: Vec<u8>,
            srp_id: i64,
            hint: String,
        }
    }
}

pub mod contacts {
    tl_object! {
        ResolvedPeer = 0x5a3e3201 {
            peer: crate::enums::Peer,
            chats: Vec<crate::enums::Chat>,
            users: Vec<crate::enums::User>,
        }
    }
}

pub mod messages {
    tl_object! {
        Messages = 0x5a3e3301 {
            messages: Vec<crate::enums::Message>,
            chats: Vec<crate::enums::Chat>,
            users: Vec<crate::enums::User>,
        }

        MessagesSlice = 0x5a3e3302 {
            count: i32,
            messages: Vec<crate::enums::Message>,
            chats: Vec<crate::enums::Chat>,
            users: Vec<crate::enums::User>,
        }

        ChannelMessages = 0x5a3e3303 {
            pts: i32,
            count: i32,
            messages: Vec<crate::enums::Message>,
            chats: Vec<crate::enums::Chat>,
            users: Vec<crate::enums::User>,
        }

        MessagesNotModified = 0x5a3e3304 {
            count: i32,
        }

        Chats = 0x5a3e3305 {
            chats: Vec<crate::enums::Chat>,
        }
    }
}

pub mod updates {
    tl_object! {
        State = 0x5a3e3401 {
            pts: i32,
            qts: i32,
            date: i32,
            seq: i32,
            unread_count: i32,
        }
    }
}

pub mod upload {
    tl_object! {
        File = 0x5a3e3501 {
            mtime: i32,
            bytes: Vec<u8>,
        }
    }
}
