//! Telegram adapter (teloxide).
//!
//! This crate implements the `duress-core` RemoteSession port over the Telegram
//! Bot API. Operations the Bot API cannot express (blocking users, contact and
//! sticker management, session control) report `Error::Unsupported`.

use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use async_trait::async_trait;

use teloxide::{prelude::*, ApiError, RequestError};

use tokio::{sync::Mutex, time::sleep};

pub mod recent;

use duress_core::{
    domain::{
        AccountId, ConfirmedMessage, ConversationId, Group, GroupId, LocalMessageId,
        QueuedMessage, RecentMessage, ServerMessageId, User, UserId,
    },
    errors::Error,
    notifications::{Notification, NotificationCenter},
    ports::RemoteSession,
    Result,
};

use crate::recent::RecentIndex;

pub use teloxide::Bot;

#[derive(Clone)]
pub struct TelegramSession {
    bot: Bot,
    account: AccountId,
    notifications: Arc<NotificationCenter>,
    recent: Arc<Mutex<RecentIndex>>,
    next_local_id: Arc<AtomicI64>,
}

impl TelegramSession {
    pub fn new(
        bot: Bot,
        account: AccountId,
        notifications: Arc<NotificationCenter>,
        recent_capacity: usize,
    ) -> Self {
        Self {
            bot,
            account,
            notifications,
            recent: Arc::new(Mutex::new(RecentIndex::new(recent_capacity))),
            next_local_id: Arc::new(AtomicI64::new(-1)),
        }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(conversation: ConversationId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(conversation.0)
    }

    /// Local ids are negative so they never collide with server ids.
    fn allocate_local_id(&self) -> LocalMessageId {
        LocalMessageId(self.next_local_id.fetch_sub(1, Ordering::SeqCst))
    }

    /// Lookup that treats "chat not found" as absence rather than failure.
    async fn get_chat(&self, id: i64) -> Result<Option<teloxide::types::Chat>> {
        let chat = teloxide::types::ChatId(id);
        match with_retry("get_chat", || self.bot.get_chat(chat)).await {
            Ok(c) => Ok(Some(c)),
            Err(RequestError::Api(ApiError::ChatNotFound | ApiError::UserNotFound)) => Ok(None),
            Err(e) => Err(Error::remote("get_chat", e)),
        }
    }
}

/// Run a Bot API call, waiting out one flood-control `RetryAfter`.
async fn with_retry<T, Fut>(
    op: &'static str,
    mut call: impl FnMut() -> Fut,
) -> std::result::Result<T, RequestError>
where
    Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
    Fut::IntoFuture: Send,
{
    const MAX_RETRIES: usize = 1;
    let mut attempts = 0usize;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                attempts += 1;
                tracing::debug!(op, "telegram flood control, retrying");
                sleep(d).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn remote_err(op: &'static str) -> impl FnOnce(RequestError) -> Error {
    move |e| Error::remote(op, e)
}

/// The Bot API does not expose a user's bot flag through `getChat`; bot
/// usernames are required to end in "bot".
fn looks_like_bot(username: Option<&str>) -> bool {
    username.is_some_and(|u| u.to_ascii_lowercase().ends_with("bot"))
}

#[async_trait]
impl RemoteSession for TelegramSession {
    fn account(&self) -> AccountId {
        self.account
    }

    async fn resolve_user(&self, id: UserId) -> Result<Option<User>> {
        let Some(chat) = self.get_chat(id.0).await? else {
            return Ok(None);
        };
        if !chat.is_private() {
            return Ok(None);
        }
        let username = chat.username().map(str::to_string);
        Ok(Some(User {
            id,
            is_bot: looks_like_bot(username.as_deref()),
            username,
            is_support: false,
        }))
    }

    async fn resolve_group(&self, id: GroupId) -> Result<Option<Group>> {
        let Some(chat) = self.get_chat(-id.0).await? else {
            return Ok(None);
        };
        if chat.is_private() {
            return Ok(None);
        }
        Ok(Some(Group {
            id,
            title: chat.title().map(str::to_string),
        }))
    }

    async fn is_member_of(&self, group: &Group) -> Result<bool> {
        let me = with_retry("get_me", || self.bot.get_me())
            .await
            .map_err(remote_err("get_me"))?;
        let chat = teloxide::types::ChatId(-group.id.0);
        let member = with_retry("get_chat_member", || self.bot.get_chat_member(chat, me.id))
            .await
            .map_err(remote_err("get_chat_member"))?;
        Ok(member.kind.is_present())
    }

    async fn self_user(&self) -> Result<User> {
        let me = with_retry("get_me", || self.bot.get_me())
            .await
            .map_err(remote_err("get_me"))?;
        Ok(User {
            id: UserId(me.user.id.0 as i64),
            username: me.user.username.clone(),
            is_bot: me.user.is_bot,
            is_support: false,
        })
    }

    async fn drop_conversation(&self, conversation: ConversationId) -> Result<()> {
        if self.recent.lock().await.forget(conversation) {
            tracing::debug!(%conversation, "dropped local conversation record");
        }
        Ok(())
    }

    async fn remove_self_from_group(&self, group: GroupId, _self_user: &User) -> Result<()> {
        let chat = teloxide::types::ChatId(-group.0);
        with_retry("leave_chat", || self.bot.leave_chat(chat))
            .await
            .map_err(remote_err("leave_chat"))?;
        Ok(())
    }

    async fn block_peer(&self, _conversation: ConversationId) -> Result<()> {
        Err(Error::Unsupported("block_peer"))
    }

    async fn send_message(
        &self,
        conversation: ConversationId,
        text: &str,
    ) -> Result<QueuedMessage> {
        let local_id = self.allocate_local_id();
        self.recent
            .lock()
            .await
            .record(conversation, local_id, text);

        let bot = self.bot.clone();
        let notifications = self.notifications.clone();
        let account = self.account;
        let text = text.to_string();
        tokio::spawn(async move {
            let chat = Self::tg_chat(conversation);
            let sent = with_retry("send_message", || bot.send_message(chat, text.clone())).await;
            let notification = match sent {
                Ok(msg) => Notification::MessageReceivedByServer {
                    old_local_id: local_id,
                    message: Some(ConfirmedMessage {
                        conversation,
                        id: ServerMessageId(msg.id.0),
                    }),
                },
                Err(e) => {
                    tracing::warn!(%conversation, %local_id, "telegram send failed: {e}");
                    Notification::MessageSendFailed { local_id }
                }
            };
            notifications.publish(account, notification).await;
        });

        Ok(QueuedMessage {
            conversation,
            local_id,
        })
    }

    async fn find_recent_message_by_text(&self, text: &str) -> Result<Option<RecentMessage>> {
        Ok(self.recent.lock().await.find_by_text(text))
    }

    async fn delete_messages(
        &self,
        conversation: ConversationId,
        ids: &[ServerMessageId],
    ) -> Result<()> {
        let chat = Self::tg_chat(conversation);
        for id in ids {
            let msg_id = teloxide::types::MessageId(id.0);
            with_retry("delete_message", || self.bot.delete_message(chat, msg_id))
                .await
                .map_err(remote_err("delete_message"))?;
        }
        Ok(())
    }

    async fn delete_all_contacts(&self) -> Result<()> {
        Err(Error::Unsupported("delete_all_contacts"))
    }

    async fn delete_all_stickers(&self) -> Result<()> {
        Err(Error::Unsupported("delete_all_stickers"))
    }

    async fn terminate_other_sessions(&self) -> Result<()> {
        Err(Error::Unsupported("terminate_other_sessions"))
    }

    async fn log_out(&self) -> Result<()> {
        with_retry("log_out", || self.bot.log_out())
            .await
            .map_err(remote_err("log_out"))?;
        Ok(())
    }
}
