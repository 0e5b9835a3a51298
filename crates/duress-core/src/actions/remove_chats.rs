use serde::{Deserialize, Serialize};

use crate::{
    actions::{AccountAction, ActionContext},
    domain::{AccountId, Target},
    errors::Error,
    ports::RemoteSession,
    Result,
};

/// Leave, forget or block a configured list of conversations.
///
/// Ids use the signed convention (`> 0` user, `< 0` group). The list is
/// consumed: a successful run clears it and asks for a save.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveChatsAction {
    pub account_id: AccountId,
    #[serde(default)]
    pub chats_to_remove: Vec<i64>,
}

/// What happened to one target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Removal {
    LeftGroup,
    Dropped,
    DroppedAndBlocked,
}

impl RemoveChatsAction {
    pub fn new(account_id: AccountId, chats_to_remove: Vec<i64>) -> Self {
        Self {
            account_id,
            chats_to_remove,
        }
    }

    pub fn chats(&self) -> &[i64] {
        &self.chats_to_remove
    }

    pub async fn execute(&mut self, ctx: &ActionContext) {
        if self.chats_to_remove.is_empty() {
            return;
        }

        let session = ctx.session.as_ref();
        for &id in &self.chats_to_remove {
            match remove_target(session, id).await {
                Ok(outcome) => {
                    tracing::debug!(account = %self.account_id, target = id, ?outcome, "chat removed");
                }
                Err(e) => {
                    tracing::warn!(account = %self.account_id, target = id, "chat removal failed: {e}");
                }
            }
        }

        self.chats_to_remove.clear();
        ctx.persistence.request_save();
    }
}

impl AccountAction for RemoveChatsAction {
    fn account_id(&self) -> AccountId {
        self.account_id
    }
}

async fn remove_target(session: &dyn RemoteSession, raw: i64) -> Result<Removal> {
    let target = Target::from_raw(raw).ok_or(Error::Resolution { target: raw })?;
    let conversation = target.conversation();

    let user = match target {
        Target::Group(group_id) => {
            if let Some(group) = session.resolve_group(group_id).await? {
                if !session.is_member_of(&group).await? {
                    session.drop_conversation(conversation).await?;
                    return Ok(Removal::Dropped);
                }
                let me = session.self_user().await?;
                session.remove_self_from_group(group_id, &me).await?;
                return Ok(Removal::LeftGroup);
            }
            // Unknown group: only the local record can go.
            None
        }
        Target::Peer(user_id) => Some(user_id),
    };

    session.drop_conversation(conversation).await?;

    let Some(user_id) = user else {
        return Ok(Removal::Dropped);
    };
    match session.resolve_user(user_id).await? {
        Some(user) if user.should_block_on_removal() => {
            session.block_peer(conversation).await?;
            Ok(Removal::DroppedAndBlocked)
        }
        _ => Ok(Removal::Dropped),
    }
}
