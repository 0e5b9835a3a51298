use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{domain::*, Result};

/// Hexagonal port for one logged-in account on the remote service.
///
/// Calls here are the only way actions touch the outside world. Adapters map
/// their transport errors into `Error::Remote` / `Error::Unsupported`.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    fn account(&self) -> AccountId;

    async fn resolve_user(&self, id: UserId) -> Result<Option<User>>;
    async fn resolve_group(&self, id: GroupId) -> Result<Option<Group>>;
    async fn is_member_of(&self, group: &Group) -> Result<bool>;

    /// The acting account's own user record.
    async fn self_user(&self) -> Result<User>;

    /// Forget the local record of a conversation. No remote membership change.
    async fn drop_conversation(&self, conversation: ConversationId) -> Result<()>;
    async fn remove_self_from_group(&self, group: GroupId, self_user: &User) -> Result<()>;
    async fn block_peer(&self, conversation: ConversationId) -> Result<()>;

    /// Queue a text message. Returns once queued locally, never waits for the
    /// server to acknowledge it.
    async fn send_message(&self, conversation: ConversationId, text: &str)
        -> Result<QueuedMessage>;

    /// Scan the most-recent-message-per-conversation index for an exact text
    /// match.
    async fn find_recent_message_by_text(&self, text: &str) -> Result<Option<RecentMessage>>;

    async fn delete_messages(
        &self,
        conversation: ConversationId,
        ids: &[ServerMessageId],
    ) -> Result<()>;

    async fn delete_all_contacts(&self) -> Result<()>;
    async fn delete_all_stickers(&self) -> Result<()>;
    async fn terminate_other_sessions(&self) -> Result<()>;
    async fn log_out(&self) -> Result<()>;
}

/// Looks up the session bound to an account.
pub trait SessionProvider: Send + Sync {
    fn session(&self, account: AccountId) -> Option<Arc<dyn RemoteSession>>;
}

/// Fixed account → session map.
#[derive(Default, Clone)]
pub struct StaticSessions {
    sessions: HashMap<AccountId, Arc<dyn RemoteSession>>,
}

impl StaticSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, session: Arc<dyn RemoteSession>) -> Self {
        self.insert(session);
        self
    }

    pub fn insert(&mut self, session: Arc<dyn RemoteSession>) {
        self.sessions.insert(session.account(), session);
    }
}

impl SessionProvider for StaticSessions {
    fn session(&self, account: AccountId) -> Option<Arc<dyn RemoteSession>> {
        self.sessions.get(&account).cloned()
    }
}

/// Source of the "last known location" text appended to decoy messages.
pub trait LocationProvider: Send + Sync {
    /// Already formatted for appending; `None` when no fix is known.
    fn last_location(&self) -> Option<String>;
}

/// Signal that the action configuration changed and should be flushed.
pub trait ConfigPersistence: Send + Sync {
    fn request_save(&self);
}
