//! RPC functions. Each struct implements [`RemoteCall`](crate::RemoteCall).

use crate::types;

tl_object! {
    ReqPqMulti = 0xbe7e8ef1 -> types::ResPq {
        nonce: [u8; 16],
    }

    /// `req_DH_params`
    ReqDhParams = 0xd712e4be -> crate::enums::ServerDhParams {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        p: Vec<u8>,
        q: Vec<u8>,
        public_key_fingerprint: i64,
        encrypted_data: Vec<u8>,
    }

    /// `set_client_DH_params`
    SetClientDhParams = 0xf5045f1f -> crate::enums::SetClientDhParamsAnswer {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        encrypted_data: Vec<u8>,
    }

    Ping = 0x7abe77ec -> types::Pong {
        ping_id: i64,
    }
}

pub mod auth {
    use crate::{enums, types};

    tl_object! {
        SendCode = 0x5a3e4001 -> types::auth::SentCode {
            phone_number: String,
            api_id: i32,
            api_hash: String,
        }

        SignIn = 0x5a3e4002 -> enums::auth::Authorization {
            phone_number: String,
            phone_code_hash: String,
            phone_code: String,
        }

        CheckPassword = 0x5a3e4003 -> enums::auth::Authorization {
            password: types::InputCheckPasswordSrp,
        }

        LogOut = 0x5a3e4004 -> types::auth::LoggedOut {}
    }
}

pub mod account {
    use crate::types;

    tl_object! {
        GetPassword = 0x5a3e4101 -> types::account::Password {}
    }
}

pub mod users {
    use crate::enums;

    tl_object! {
        GetUsers = 0x5a3e4201 -> Vec<enums::User> {
            id: Vec<enums::InputUser>,
        }
    }
}

pub mod contacts {
    use crate::types;

    tl_object! {
        ResolveUsername = 0x5a3e4301 -> types::contacts::ResolvedPeer {
            username: String,
        }

        ResolvePhone = 0x5a3e4302 -> types::contacts::ResolvedPeer {
            phone: String,
        }
    }
}

pub mod messages {
    use crate::{enums, types};

    tl_object! {
        GetHistory = 0x5a3e4401 -> enums::messages::Messages {
            peer: enums::InputPeer,
            offset_id: i32,
            offset_date: i32,
            add_offset: i32,
            limit: i32,
            max_id: i32,
            min_id: i32,
            hash: i64,
        }

        Search = 0x5a3e4402 -> enums::messages::Messages {
            peer: enums::InputPeer,
            q: String,
            filter: enums::MessagesFilter,
            min_date: i32,
            max_date: i32,
            offset_id: i32,
            add_offset: i32,
            limit: i32,
            max_id: i32,
            min_id: i32,
            hash: i64,
        }

        GetMessages = 0x5a3e4403 -> enums::messages::Messages {
            id: Vec<types::InputMessageId>,
        }
    }
}

pub mod channels {
    use crate::{enums, types};

    tl_object! {
        GetMessages = 0x5a3e4501 -> enums::messages::Messages {
            channel: types::InputChannel,
            id: Vec<types::InputMessageId>,
        }

        GetChannels = 0x5a3e4502 -> types::messages::Chats {
            id: Vec<types::InputChannel>,
        }
    }
}

pub mod updates {
    use crate::types;

    tl_object! {
        GetState = 0x5a3e4601 -> types::updates::State {}
    }
}

pub mod upload {
    use crate::{enums, types};

    tl_object! {
        GetFile = 0x5a3e4701 -> types::upload::File {
            location: enums::InputFileLocation,
            offset: i64,
            limit: i32,
        }
    }
}
