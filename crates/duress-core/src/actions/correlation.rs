//! Matching queued decoy messages to their server confirmations.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::{
    domain::{ConfirmedMessage, LocalMessageId, QueuedMessage},
    ports::RemoteSession,
    Result,
};

/// How a just-queued message is identified before the server acknowledges it.
#[async_trait]
pub trait CorrelationStrategy: Send + Sync {
    async fn locate(
        &self,
        session: &dyn RemoteSession,
        queued: &QueuedMessage,
        text: &str,
    ) -> Result<Option<LocalMessageId>>;
}

/// Scan the recent-message index for a message whose text is exactly `text`.
///
/// Content equality is the only key available before the server confirms. An
/// older message that happens to carry the same text can be picked instead of
/// the one just sent; that message then gets deleted when it is confirmed.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExactTextCorrelation;

#[async_trait]
impl CorrelationStrategy for ExactTextCorrelation {
    async fn locate(
        &self,
        session: &dyn RemoteSession,
        _queued: &QueuedMessage,
        text: &str,
    ) -> Result<Option<LocalMessageId>> {
        Ok(session
            .find_recent_message_by_text(text)
            .await?
            .map(|m| m.local_id))
    }
}

/// Trust the local id the session returned from `send_message`.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueuedIdCorrelation;

#[async_trait]
impl CorrelationStrategy for QueuedIdCorrelation {
    async fn locate(
        &self,
        _session: &dyn RemoteSession,
        queued: &QueuedMessage,
        _text: &str,
    ) -> Result<Option<LocalMessageId>> {
        Ok(Some(queued.local_id))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// Waiting for the server confirmation.
    Pending,
    /// The confirmation already arrived during this batch; delete now.
    AlreadyConfirmed(ConfirmedMessage),
    /// Already deleted or failed during this batch.
    AlreadySettled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Consumption {
    /// Was pending; the caller owns the follow-up delete.
    Matched,
    /// Not registered yet but a batch is open; held until registration.
    Buffered,
    /// Unrelated to this action (or a duplicate).
    Ignored,
}

/// Local ids awaiting confirmation.
///
/// A batch is the span of one `execute()` call. While it is open, a
/// confirmation can overtake the registration of its id, so unmatched ones
/// are held until the batch closes. Each id is settled at most once per batch.
#[derive(Debug, Default)]
pub struct PendingCorrelations {
    pending: HashSet<LocalMessageId>,
    early: HashMap<LocalMessageId, ConfirmedMessage>,
    settled: HashSet<LocalMessageId>,
    batch_open: bool,
}

impl PendingCorrelations {
    pub fn open_batch(&mut self) {
        self.batch_open = true;
    }

    /// Close the batch and return how many ids are still outstanding.
    pub fn close_batch(&mut self) -> usize {
        self.batch_open = false;
        self.early.clear();
        self.settled.clear();
        self.pending.len()
    }

    pub fn register(&mut self, id: LocalMessageId) -> Registration {
        if self.settled.contains(&id) {
            return Registration::AlreadySettled;
        }
        if let Some(message) = self.early.remove(&id) {
            self.settle(id);
            return Registration::AlreadyConfirmed(message);
        }
        self.pending.insert(id);
        Registration::Pending
    }

    pub fn confirm(&mut self, id: LocalMessageId, message: ConfirmedMessage) -> Consumption {
        if self.pending.remove(&id) {
            self.settle(id);
            return Consumption::Matched;
        }
        if self.batch_open && !self.settled.contains(&id) {
            self.early.insert(id, message);
            return Consumption::Buffered;
        }
        Consumption::Ignored
    }

    /// Forget an id that will never be confirmed. Returns whether it was
    /// pending.
    pub fn abandon(&mut self, id: LocalMessageId) -> bool {
        let was_pending = self.pending.remove(&id);
        if was_pending || self.batch_open {
            self.early.remove(&id);
            self.settle(id);
        }
        was_pending
    }

    fn settle(&mut self, id: LocalMessageId) {
        if self.batch_open {
            self.settled.insert(id);
        }
    }

    pub fn contains(&self, id: LocalMessageId) -> bool {
        self.pending.contains(&id)
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// No batch running and nothing left to wait for.
    pub fn is_drained(&self) -> bool {
        !self.batch_open && self.pending.is_empty()
    }
}
