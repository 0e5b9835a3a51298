//! Panic actions: the closed set of operations run when the trigger fires.

pub mod account;
pub mod correlation;
pub mod decoy;
pub mod remove_chats;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    domain::AccountId,
    notifications::NotificationCenter,
    ports::{ConfigPersistence, LocationProvider, RemoteSession},
};

use self::{
    account::{AccountOp, AccountOpAction},
    correlation::CorrelationStrategy,
    decoy::DecoyMessageAction,
    remove_chats::RemoveChatsAction,
};

/// An action bound to one account for its whole lifetime.
pub trait AccountAction {
    fn account_id(&self) -> AccountId;
}

/// Collaborators an action runs against.
#[derive(Clone)]
pub struct ActionContext {
    pub session: Arc<dyn RemoteSession>,
    pub notifications: Arc<NotificationCenter>,
    pub location: Arc<dyn LocationProvider>,
    pub correlation: Arc<dyn CorrelationStrategy>,
    pub persistence: Arc<dyn ConfigPersistence>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    RemoveChats,
    DecoyMessages,
    AccountOp(AccountOp),
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    RemoveChats(RemoveChatsAction),
    DecoyMessages(DecoyMessageAction),
    AccountOp(AccountOpAction),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::RemoveChats(_) => ActionKind::RemoveChats,
            Action::DecoyMessages(_) => ActionKind::DecoyMessages,
            Action::AccountOp(a) => ActionKind::AccountOp(a.op),
        }
    }

    /// Whether the action cuts off the session. Such actions wait until the
    /// pending decoy deletes have drained.
    pub fn runs_after_drain(&self) -> bool {
        matches!(self, Action::AccountOp(a) if a.op == AccountOp::LogOut)
    }

    /// Run the action. Never fails from the caller's point of view; every
    /// problem is logged and contained.
    pub async fn execute(&mut self, ctx: &ActionContext) {
        let account = self.account_id();
        if account != ctx.session.account() {
            tracing::warn!(
                %account,
                session = %ctx.session.account(),
                kind = ?self.kind(),
                "action not bound to this session, skipping"
            );
            return;
        }

        match self {
            Action::RemoveChats(a) => a.execute(ctx).await,
            Action::DecoyMessages(a) => a.execute(ctx).await,
            Action::AccountOp(a) => a.execute(ctx).await,
        }
    }
}

impl AccountAction for Action {
    fn account_id(&self) -> AccountId {
        match self {
            Action::RemoveChats(a) => a.account_id(),
            Action::DecoyMessages(a) => a.account_id(),
            Action::AccountOp(a) => a.account_id(),
        }
    }
}
