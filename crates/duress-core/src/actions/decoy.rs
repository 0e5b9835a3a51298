//! Decoy messages: send, wait for the server to persist them, then delete.
//!
//! `execute()` returns as soon as every message is queued. Deletion happens
//! later, from the notification listener, once the server confirmation for a
//! registered local id arrives.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    actions::{
        correlation::{Consumption, PendingCorrelations, Registration},
        AccountAction, ActionContext,
    },
    domain::{AccountId, ConfirmedMessage, ConversationId, LocalMessageId},
    notifications::{Notification, NotificationKind, NotificationListener, Subscription},
    ports::RemoteSession,
};

const LISTEN_KINDS: &[NotificationKind] = &[
    NotificationKind::MessageReceivedByServer,
    NotificationKind::MessageSendFailed,
];

/// One configured decoy message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoyEntry {
    /// Conversation to send into (signed convention).
    pub target_id: i64,
    pub text: String,
    #[serde(default)]
    pub append_geolocation: bool,
}

impl DecoyEntry {
    pub fn new(target_id: i64, text: impl Into<String>, append_geolocation: bool) -> Self {
        Self {
            target_id,
            text: text.into(),
            append_geolocation,
        }
    }

    /// The text actually sent for this entry.
    pub fn compose(&self, geolocation: &str) -> String {
        if self.append_geolocation {
            format!("{}{geolocation}", self.text)
        } else {
            self.text.clone()
        }
    }
}

/// Result of handling one notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Deleted,
    DeleteFailed,
    /// Pending id removed without a delete (send failed, or no server copy).
    Dropped,
    /// Confirmation held until its id is registered in the running batch.
    Buffered,
    Ignored,
}

/// Sends the configured entries on every trigger. Unlike chat removal the
/// entry list is never cleared.
#[derive(Default, Serialize, Deserialize)]
pub struct DecoyMessageAction {
    pub account_id: AccountId,
    #[serde(default)]
    pub entries: Vec<DecoyEntry>,
    #[serde(skip)]
    correlator: Arc<Correlator>,
    #[serde(skip)]
    subscription: Option<Subscription>,
}

impl fmt::Debug for DecoyMessageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoyMessageAction")
            .field("account_id", &self.account_id)
            .field("entries", &self.entries)
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

impl PartialEq for DecoyMessageAction {
    fn eq(&self, other: &Self) -> bool {
        self.account_id == other.account_id && self.entries == other.entries
    }
}

impl DecoyMessageAction {
    pub fn new(account_id: AccountId, entries: Vec<DecoyEntry>) -> Self {
        Self {
            account_id,
            entries,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> &[DecoyEntry] {
        &self.entries
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .as_ref()
            .map(Subscription::is_active)
            .unwrap_or(false)
    }

    /// Messages sent by this action still waiting for a server confirmation.
    pub async fn outstanding(&self) -> usize {
        self.correlator.state.lock().await.pending.outstanding()
    }

    pub async fn is_pending(&self, id: LocalMessageId) -> bool {
        self.correlator.state.lock().await.pending.contains(id)
    }

    /// Feed a notification directly, bypassing the bus.
    pub async fn handle_notification(&self, notification: Notification) -> ConfirmationOutcome {
        self.correlator.handle(notification).await
    }

    pub async fn execute(&mut self, ctx: &ActionContext) {
        if self.entries.is_empty() {
            return;
        }

        let session = ctx.session.clone();
        self.correlator.open_batch(session.clone()).await;
        self.ensure_subscribed(ctx).await;

        let geolocation = ctx.location.last_location().unwrap_or_default();
        for entry in &self.entries {
            let text = entry.compose(&geolocation);
            if text.is_empty() {
                tracing::warn!(account = %self.account_id, target = entry.target_id, "skipping empty decoy message");
                continue;
            }
            if entry.target_id == 0 {
                tracing::warn!(account = %self.account_id, "skipping decoy message without a target");
                continue;
            }

            let conversation = ConversationId(entry.target_id);
            let queued = match session.send_message(conversation, &text).await {
                Ok(q) => q,
                Err(e) => {
                    tracing::warn!(account = %self.account_id, target = entry.target_id, "decoy send failed: {e}");
                    continue;
                }
            };

            match ctx
                .correlation
                .locate(session.as_ref(), &queued, &text)
                .await
            {
                Ok(Some(local_id)) => self.correlator.register(local_id).await,
                Ok(None) => {
                    tracing::debug!(account = %self.account_id, target = entry.target_id, "queued decoy not found in recent messages");
                }
                Err(e) => {
                    tracing::warn!(account = %self.account_id, target = entry.target_id, "decoy correlation failed: {e}");
                }
            }
        }

        let outstanding = self.correlator.close_batch().await;
        if outstanding == 0 {
            self.subscription = None;
        }
        tracing::info!(account = %self.account_id, outstanding, "decoy messages queued");

        ctx.persistence.request_save();
    }

    async fn ensure_subscribed(&mut self, ctx: &ActionContext) {
        if self.is_subscribed() {
            return;
        }
        let sub = ctx
            .notifications
            .subscribe(self.account_id, LISTEN_KINDS, self.correlator.clone())
            .await;
        self.correlator.state.lock().await.unsubscribe = Some(sub.token());
        self.subscription = Some(sub);
    }
}

impl AccountAction for DecoyMessageAction {
    fn account_id(&self) -> AccountId {
        self.account_id
    }
}

#[derive(Default)]
struct CorrelatorState {
    pending: PendingCorrelations,
    session: Option<Arc<dyn RemoteSession>>,
    unsubscribe: Option<CancellationToken>,
}

impl CorrelatorState {
    fn release_if_drained(&mut self) {
        if self.pending.is_drained() {
            if let Some(tok) = self.unsubscribe.take() {
                tok.cancel();
            }
        }
    }
}

/// Shared between `execute()` and the listener task.
#[derive(Default)]
struct Correlator {
    state: Mutex<CorrelatorState>,
}

impl Correlator {
    async fn open_batch(&self, session: Arc<dyn RemoteSession>) {
        let mut st = self.state.lock().await;
        st.session = Some(session);
        st.pending.open_batch();
    }

    async fn close_batch(&self) -> usize {
        let mut st = self.state.lock().await;
        let outstanding = st.pending.close_batch();
        st.release_if_drained();
        outstanding
    }

    async fn register(&self, id: LocalMessageId) {
        let (registration, session) = {
            let mut st = self.state.lock().await;
            (st.pending.register(id), st.session.clone())
        };
        match registration {
            Registration::Pending => {
                tracing::debug!(local_id = %id, "decoy awaiting confirmation");
            }
            Registration::AlreadyConfirmed(message) => {
                if let Some(session) = session {
                    delete_confirmed(session.as_ref(), id, message).await;
                }
            }
            Registration::AlreadySettled => {}
        }
    }

    async fn handle(&self, notification: Notification) -> ConfirmationOutcome {
        let (old_local_id, message) = match notification {
            Notification::MessageReceivedByServer {
                old_local_id,
                message: Some(message),
            } => (old_local_id, message),
            Notification::MessageReceivedByServer {
                old_local_id,
                message: None,
            } => return self.abandon(old_local_id, "confirmation carried no message").await,
            Notification::MessageSendFailed { local_id } => {
                return self.abandon(local_id, "send failed").await;
            }
        };

        let (consumption, session) = {
            let mut st = self.state.lock().await;
            let c = st.pending.confirm(old_local_id, message);
            st.release_if_drained();
            (c, st.session.clone())
        };
        match (consumption, session) {
            (Consumption::Matched, Some(session)) => {
                delete_confirmed(session.as_ref(), old_local_id, message).await
            }
            (Consumption::Matched, None) => ConfirmationOutcome::DeleteFailed,
            (Consumption::Buffered, _) => ConfirmationOutcome::Buffered,
            (Consumption::Ignored, _) => ConfirmationOutcome::Ignored,
        }
    }

    async fn abandon(&self, id: LocalMessageId, reason: &'static str) -> ConfirmationOutcome {
        let mut st = self.state.lock().await;
        let was_pending = st.pending.abandon(id);
        st.release_if_drained();
        if was_pending {
            tracing::warn!(local_id = %id, "decoy will not be deleted: {reason}");
            ConfirmationOutcome::Dropped
        } else {
            ConfirmationOutcome::Ignored
        }
    }
}

async fn delete_confirmed(
    session: &dyn RemoteSession,
    local_id: LocalMessageId,
    message: ConfirmedMessage,
) -> ConfirmationOutcome {
    match session
        .delete_messages(message.conversation, &[message.id])
        .await
    {
        Ok(()) => {
            tracing::debug!(local_id = %local_id, conversation = %message.conversation, "decoy deleted");
            ConfirmationOutcome::Deleted
        }
        Err(e) => {
            tracing::warn!(local_id = %local_id, conversation = %message.conversation, "decoy delete failed: {e}");
            ConfirmationOutcome::DeleteFailed
        }
    }
}

#[async_trait]
impl NotificationListener for Correlator {
    async fn on_notification(&self, _account: AccountId, notification: Notification) {
        self.handle(notification).await;
    }
}
