//! Chat references as users type them, and their resolution to input peers.

use std::str::FromStr;

use tgmedia_tl::{enums, functions, types};

use crate::Client;
use crate::errors::{InvocationError, MediaError};

/// Offset that Bot-API style ids add to channel ids (`-100…`).
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// How a chat was named by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatReference {
    /// `me` or `self`.
    SelfChat,
    /// `@name`, `t.me/name` or a bare `name`.
    Username(String),
    /// `+15551234567`, digits only after parsing.
    Phone(String),
    /// Bot-API style id: `-100…` is a channel, other negatives a basic group.
    Id(i64),
}

impl FromStr for ChatReference {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MediaError::InvalidInput("chat reference is empty".into()));
        }
        if s.eq_ignore_ascii_case("me") || s.eq_ignore_ascii_case("self") {
            return Ok(Self::SelfChat);
        }

        let link = s
            .strip_prefix("https://")
            .or_else(|| s.strip_prefix("http://"))
            .unwrap_or(s);
        if let Some(path) = link.strip_prefix("t.me/").or_else(|| link.strip_prefix("telegram.me/")) {
            let name = path.split(['/', '?']).next().unwrap_or_default();
            return username(name).ok_or_else(|| invalid(s));
        }
        if let Some(name) = s.strip_prefix('@') {
            return username(name).ok_or_else(|| invalid(s));
        }
        if let Some(digits) = s.strip_prefix('+') {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                return Ok(Self::Phone(digits.to_string()));
            }
            return Err(invalid(s));
        }
        if let Ok(id) = s.parse::<i64>() {
            return Ok(Self::Id(id));
        }
        username(s).ok_or_else(|| invalid(s))
    }
}

fn invalid(s: &str) -> MediaError {
    MediaError::InvalidInput(format!("not a chat reference: {s:?}"))
}

fn username(name: &str) -> Option<ChatReference> {
    let ok = !name.is_empty()
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
        && name.as_bytes()[0].is_ascii_alphabetic();
    ok.then(|| ChatReference::Username(name.to_string()))
}

/// A chat ready to be used in requests.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ResolvedChat {
    pub peer:    enums::InputPeer,
    /// Set for channels and supergroups, which have their own message
    /// lookup.
    pub channel: Option<types::InputChannel>,
}

impl ResolvedChat {
    fn from_chat(chat: &enums::Chat) -> Self {
        match chat {
            enums::Chat::Channel(c) => Self {
                peer:    types::InputPeerChannel { channel_id: c.id, access_hash: c.access_hash }.into(),
                channel: Some(types::InputChannel { channel_id: c.id, access_hash: c.access_hash }),
            },
            enums::Chat::Chat(c) => Self {
                peer:    types::InputPeerChat { chat_id: c.id }.into(),
                channel: None,
            },
        }
    }

    fn from_user(user: &types::User) -> Self {
        let peer = if user.is_self {
            types::InputPeerSelf {}.into()
        } else {
            types::InputPeerUser { user_id: user.id, access_hash: user.access_hash }.into()
        };
        Self { peer, channel: None }
    }
}

fn is_not_found(e: &InvocationError) -> bool {
    ["USERNAME_NOT_OCCUPIED", "USERNAME_INVALID", "PHONE_NOT_OCCUPIED", "PEER_ID_INVALID", "CHANNEL_INVALID"]
        .iter()
        .any(|name| e.is(name))
}

impl Client {
    pub(crate) async fn resolve_chat(&self, chat: &str) -> Result<ResolvedChat, MediaError> {
        let not_found = |e: InvocationError| {
            if is_not_found(&e) { MediaError::ChatNotFound(chat.trim().to_string()) } else { e.into() }
        };

        match chat.parse::<ChatReference>()? {
            ChatReference::SelfChat => Ok(ResolvedChat { peer: types::InputPeerSelf {}.into(), channel: None }),
            ChatReference::Username(username) => {
                let rp = self.invoke(&functions::contacts::ResolveUsername { username }).await.map_err(not_found)?;
                from_resolved(rp).ok_or_else(|| MediaError::ChatNotFound(chat.trim().to_string()))
            }
            ChatReference::Phone(phone) => {
                let rp = self.invoke(&functions::contacts::ResolvePhone { phone }).await.map_err(not_found)?;
                from_resolved(rp).ok_or_else(|| MediaError::ChatNotFound(chat.trim().to_string()))
            }
            ChatReference::Id(id) if id <= -CHANNEL_ID_OFFSET => {
                let channel_id = -(id + CHANNEL_ID_OFFSET);
                let req = functions::channels::GetChannels {
                    id: vec![types::InputChannel { channel_id, access_hash: 0 }],
                };
                let chats = self.invoke(&req).await.map_err(not_found)?;
                chats
                    .chats
                    .iter()
                    .find(|c| c.id() == channel_id)
                    .map(ResolvedChat::from_chat)
                    .ok_or_else(|| MediaError::ChatNotFound(chat.trim().to_string()))
            }
            ChatReference::Id(id) if id < 0 => {
                Ok(ResolvedChat { peer: types::InputPeerChat { chat_id: -id }.into(), channel: None })
            }
            ChatReference::Id(id) => {
                let req = functions::users::GetUsers {
                    id: vec![types::InputUser { user_id: id, access_hash: 0 }.into()],
                };
                let users = self.invoke(&req).await.map_err(not_found)?;
                users
                    .iter()
                    .find_map(|u| match u {
                        enums::User::User(u) if u.id == id => Some(ResolvedChat::from_user(u)),
                        _ => None,
                    })
                    .ok_or_else(|| MediaError::ChatNotFound(chat.trim().to_string()))
            }
        }
    }
}

fn from_resolved(rp: types::contacts::ResolvedPeer) -> Option<ResolvedChat> {
    match rp.peer {
        enums::Peer::User(p) => rp.users.iter().find_map(|u| match u {
            enums::User::User(u) if u.id == p.user_id => Some(ResolvedChat::from_user(u)),
            _ => None,
        }),
        enums::Peer::Channel(p) => rp.chats.iter().find(|c| c.id() == p.channel_id).map(ResolvedChat::from_chat),
        enums::Peer::Chat(p) => Some(ResolvedChat { peer: types::InputPeerChat { chat_id: p.chat_id }.into(), channel: None }),
    }
}
