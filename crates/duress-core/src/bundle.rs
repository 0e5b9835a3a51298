use serde::{Deserialize, Serialize};

use crate::{
    actions::{
        account::{AccountOp, AccountOpAction},
        decoy::{DecoyEntry, DecoyMessageAction},
        remove_chats::RemoveChatsAction,
        AccountAction, Action, ActionKind,
    },
    domain::AccountId,
};

/// Ordered actions configured for one account.
///
/// Reads here are for display only and never touch the remote service.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountActions {
    pub account_id: AccountId,
    #[serde(default)]
    actions: Vec<Action>,
}

impl AccountActions {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            actions: Vec::new(),
        }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut [Action] {
        &mut self.actions
    }

    pub fn chats_to_remove(&self) -> &[i64] {
        self.actions
            .iter()
            .find_map(|a| match a {
                Action::RemoveChats(r) => Some(r.chats()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn set_chats_to_remove(&mut self, ids: Vec<i64>) {
        match self.position(ActionKind::RemoveChats) {
            Some(i) => {
                if let Action::RemoveChats(r) = &mut self.actions[i] {
                    r.chats_to_remove = ids;
                }
            }
            None => self.insert(Action::RemoveChats(RemoveChatsAction::new(
                self.account_id,
                ids,
            ))),
        }
    }

    pub fn decoy_messages(&self) -> &[DecoyEntry] {
        self.decoy_action().map(|d| d.entries()).unwrap_or(&[])
    }

    pub fn decoy_action(&self) -> Option<&DecoyMessageAction> {
        self.actions.iter().find_map(|a| match a {
            Action::DecoyMessages(d) => Some(d),
            _ => None,
        })
    }

    pub fn add_decoy_message(&mut self, entry: DecoyEntry) {
        match self.position(ActionKind::DecoyMessages) {
            Some(i) => {
                if let Action::DecoyMessages(d) = &mut self.actions[i] {
                    d.entries.push(entry);
                }
            }
            None => self.insert(Action::DecoyMessages(DecoyMessageAction::new(
                self.account_id,
                vec![entry],
            ))),
        }
    }

    pub fn remove_decoy_message(&mut self, index: usize) -> Option<DecoyEntry> {
        let i = self.position(ActionKind::DecoyMessages)?;
        match &mut self.actions[i] {
            Action::DecoyMessages(d) if index < d.entries.len() => Some(d.entries.remove(index)),
            _ => None,
        }
    }

    pub fn is_enabled(&self, op: AccountOp) -> bool {
        self.position(ActionKind::AccountOp(op)).is_some()
    }

    /// Flip an account-wide toggle. Returns the new state.
    pub fn toggle(&mut self, op: AccountOp) -> bool {
        let enabled = !self.is_enabled(op);
        self.set_enabled(op, enabled);
        enabled
    }

    pub fn set_enabled(&mut self, op: AccountOp, enabled: bool) {
        match (self.position(ActionKind::AccountOp(op)), enabled) {
            (None, true) => self.insert(Action::AccountOp(AccountOpAction::new(
                self.account_id,
                op,
            ))),
            (Some(i), false) => {
                self.actions.remove(i);
            }
            _ => {}
        }
    }

    /// Messages sent by this bundle's decoy action that are still pending.
    pub async fn outstanding(&self) -> usize {
        match self.decoy_action() {
            Some(d) => d.outstanding().await,
            None => 0,
        }
    }

    /// Drop actions bound to another account. Returns how many were removed.
    pub fn retain_own(&mut self) -> usize {
        let account = self.account_id;
        let before = self.actions.len();
        self.actions.retain(|a| a.account_id() == account);
        before - self.actions.len()
    }

    /// Move a log-out action to the end, keeping the order of the rest.
    /// Returns whether anything moved.
    pub fn keep_log_out_last(&mut self) -> bool {
        let log_out = ActionKind::AccountOp(AccountOp::LogOut);
        match self.position(log_out) {
            Some(i) if i + 1 != self.actions.len() => {
                self.actions.sort_by_key(|a| a.kind() == log_out);
                true
            }
            _ => false,
        }
    }

    fn position(&self, kind: ActionKind) -> Option<usize> {
        self.actions.iter().position(|a| a.kind() == kind)
    }

    /// Log-out always runs last so the other actions still have a session.
    fn insert(&mut self, action: Action) {
        let log_out = self.position(ActionKind::AccountOp(AccountOp::LogOut));
        match log_out {
            Some(i) if action.kind() != ActionKind::AccountOp(AccountOp::LogOut) => {
                self.actions.insert(i, action)
            }
            _ => self.actions.push(action),
        }
    }
}
