//! Unsolicited server pushes, as delivered by [`crate::Client::next_update`].

use tgmedia_tl::{enums, types};

/// A high-level event received from the server.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Update {
    /// A new message in a private chat, group or channel.
    NewMessage(enums::Message),
    /// Messages were deleted.
    MessagesDeleted(Vec<i32>),
    /// The server dropped updates; refetch history if continuity matters.
    TooLong,
}

impl Update {
    /// The media-bearing message carried by this update, if any.
    pub fn message(&self) -> Option<&types::Message> {
        match self {
            Self::NewMessage(enums::Message::Message(m)) => Some(m),
            _ => None,
        }
    }
}

pub(crate) fn from_raw(raw: enums::Updates) -> Vec<Update> {
    match raw {
        enums::Updates::TooLong(_) => vec![Update::TooLong],
        enums::Updates::UpdateShort(u) => from_single(u.update).into_iter().collect(),
        enums::Updates::Updates(u) => u.updates.into_iter().filter_map(from_single).collect(),
    }
}

fn from_single(upd: enums::Update) -> Option<Update> {
    match upd {
        enums::Update::NewMessage(u) => Some(Update::NewMessage(u.message)),
        enums::Update::NewChannelMessage(u) => Some(Update::NewMessage(u.message)),
        enums::Update::DeleteMessages(u) if u.messages.is_empty() => None,
        enums::Update::DeleteMessages(u) => Some(Update::MessagesDeleted(u.messages)),
    }
}
