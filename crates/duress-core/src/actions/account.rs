use serde::{Deserialize, Serialize};

use crate::{
    actions::{AccountAction, ActionContext},
    domain::AccountId,
};

/// Account-wide one-shot operations configured as on/off toggles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountOp {
    DeleteContacts,
    DeleteStickers,
    TerminateOtherSessions,
    LogOut,
}

impl AccountOp {
    pub const ALL: [AccountOp; 4] = [
        AccountOp::DeleteContacts,
        AccountOp::DeleteStickers,
        AccountOp::TerminateOtherSessions,
        AccountOp::LogOut,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AccountOp::DeleteContacts => "delete_contacts",
            AccountOp::DeleteStickers => "delete_stickers",
            AccountOp::TerminateOtherSessions => "terminate_other_sessions",
            AccountOp::LogOut => "log_out",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOpAction {
    pub account_id: AccountId,
    pub op: AccountOp,
}

impl AccountOpAction {
    pub fn new(account_id: AccountId, op: AccountOp) -> Self {
        Self { account_id, op }
    }

    pub async fn execute(&self, ctx: &ActionContext) {
        let session = ctx.session.as_ref();
        let res = match self.op {
            AccountOp::DeleteContacts => session.delete_all_contacts().await,
            AccountOp::DeleteStickers => session.delete_all_stickers().await,
            AccountOp::TerminateOtherSessions => session.terminate_other_sessions().await,
            AccountOp::LogOut => session.log_out().await,
        };
        match res {
            Ok(()) => tracing::info!(account = %self.account_id, op = self.op.as_str(), "account action done"),
            Err(e) => {
                tracing::warn!(account = %self.account_id, op = self.op.as_str(), "account action failed: {e}")
            }
        }
    }
}

impl AccountAction for AccountOpAction {
    fn account_id(&self) -> AccountId {
        self.account_id
    }
}
