use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a logged-in account on this device.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccountId(pub i32);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Telegram user id (numeric, always positive).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Group/channel id as the remote service knows it (always positive).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

/// Dialog id in the signed convention: users positive, groups negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-side id of a message that has been queued but not acknowledged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalMessageId(pub i64);

impl fmt::Display for LocalMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message id assigned by the server once the message is persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerMessageId(pub i32);

/// A removal target decoded from its signed id.
///
/// The sign is the only thing that tells a user id and a group id apart:
/// `id > 0` is a direct peer, `id < 0` is a group whose real id is `-id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    Peer(UserId),
    Group(GroupId),
}

impl Target {
    /// Decode a signed id. Zero names nothing and yields `None`.
    pub fn from_raw(id: i64) -> Option<Self> {
        match id {
            0 => None,
            id if id > 0 => Some(Self::Peer(UserId(id))),
            // i64::MIN has no positive counterpart.
            id => id.checked_neg().map(|g| Self::Group(GroupId(g))),
        }
    }

    pub fn conversation(self) -> ConversationId {
        match self {
            Self::Peer(u) => ConversationId(u.0),
            Self::Group(g) => ConversationId(-g.0),
        }
    }
}

/// Telegram service/support accounts that must never be blocked.
const SUPPORT_USER_IDS: &[i64] = &[
    333_000, 777_000, 4_240_000, 4_244_000, 4_245_000, 4_246_000, 410_000, 420_000, 431_000,
    431_415_000, 434_000, 4_243_000, 439_000, 449_000, 450_000, 452_000, 454_000, 4_254_000,
    455_000,
];

/// Resolved user record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: Option<String>,
    pub is_bot: bool,
    /// Server-side "support" flag, when the session knows it.
    pub is_support: bool,
}

impl User {
    pub fn is_support_account(&self) -> bool {
        self.is_support || SUPPORT_USER_IDS.contains(&self.id.0)
    }

    /// Automated account that is not one of the service/support accounts.
    pub fn should_block_on_removal(&self) -> bool {
        self.is_bot && !self.is_support_account()
    }
}

/// Resolved group/channel record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub title: Option<String>,
}

/// A message that has been handed to the session's send queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueuedMessage {
    pub conversation: ConversationId,
    pub local_id: LocalMessageId,
}

/// Entry from the session's most-recent-message-per-conversation index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecentMessage {
    pub conversation: ConversationId,
    pub local_id: LocalMessageId,
}

/// The server's view of a message after it has been persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmedMessage {
    pub conversation: ConversationId,
    pub id: ServerMessageId,
}
