//! Fake ports shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    actions::{correlation::ExactTextCorrelation, ActionContext},
    domain::*,
    errors::Error,
    notifications::NotificationCenter,
    ports::{ConfigPersistence, LocationProvider, RemoteSession},
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    ResolveUser(i64),
    ResolveGroup(i64),
    IsMember(i64),
    SelfUser,
    Drop(i64),
    Leave(i64, i64),
    Block(i64),
    Send(i64, String),
    Find(String),
    Delete(i64, Vec<i32>),
    DeleteContacts,
    DeleteStickers,
    TerminateSessions,
    LogOut,
}

impl Call {
    fn is_effect(&self) -> bool {
        !matches!(
            self,
            Call::ResolveUser(_)
                | Call::ResolveGroup(_)
                | Call::IsMember(_)
                | Call::SelfUser
                | Call::Find(_)
        )
    }
}

#[derive(Clone, Debug)]
struct RecentEntry {
    conversation: ConversationId,
    local_id: LocalMessageId,
    text: String,
}

pub struct FakeSession {
    account: AccountId,
    calls: Mutex<Vec<Call>>,
    users: Mutex<HashMap<i64, User>>,
    groups: Mutex<HashMap<i64, Group>>,
    member_of: Mutex<HashSet<i64>>,
    recent: Mutex<Vec<RecentEntry>>,
    next_local_id: Mutex<i64>,
    failing: Mutex<HashSet<String>>,
    delete_delay: Mutex<Option<Duration>>,
    index_sends: bool,
}

impl FakeSession {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            calls: Mutex::new(Vec::new()),
            users: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
            member_of: Mutex::new(HashSet::new()),
            recent: Mutex::new(Vec::new()),
            next_local_id: Mutex::new(1),
            failing: Mutex::new(HashSet::new()),
            delete_delay: Mutex::new(None),
            index_sends: true,
        }
    }

    pub fn with_user(self, id: i64, is_bot: bool) -> Self {
        self.users.lock().unwrap().insert(
            id,
            User {
                id: UserId(id),
                username: None,
                is_bot,
                is_support: false,
            },
        );
        self
    }

    pub fn with_group(self, id: i64, member: bool) -> Self {
        self.groups.lock().unwrap().insert(
            id,
            Group {
                id: GroupId(id),
                title: None,
            },
        );
        if member {
            self.member_of.lock().unwrap().insert(id);
        }
        self
    }

    /// Seed the recent-message index as if `text` had been seen earlier.
    pub fn with_recent(self, conversation: i64, local_id: i64, text: &str) -> Self {
        self.remember(ConversationId(conversation), LocalMessageId(local_id), text);
        self
    }

    pub fn next_local_id(self, id: i64) -> Self {
        *self.next_local_id.lock().unwrap() = id;
        self
    }

    /// Make an operation fail. Keys: `send:<conv>`, `delete:<conv>`,
    /// `drop:<conv>`, `block:<conv>`, `leave:<group>`, `resolve_group:<id>`,
    /// `resolve_user:<id>`, `find`, or a bare op name such as `log_out`.
    pub fn fail_on(self, key: &str) -> Self {
        self.failing.lock().unwrap().insert(key.to_string());
        self
    }

    /// Leave sent messages out of the recent index, as a client whose
    /// dialog list has not caught up with the send yet.
    pub fn unindexed_sends(mut self) -> Self {
        self.index_sends = false;
        self
    }

    pub fn slow_deletes(self, delay: Duration) -> Self {
        *self.delete_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change remote or local state (no lookups).
    pub fn effects(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_effect).collect()
    }

    pub fn deletes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Delete(..)))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, key: String, op: &'static str) -> Result<()> {
        if self.failing.lock().unwrap().contains(&key) {
            return Err(Error::remote(op, format!("injected failure ({key})")));
        }
        Ok(())
    }

    fn remember(&self, conversation: ConversationId, local_id: LocalMessageId, text: &str) {
        let mut recent = self.recent.lock().unwrap();
        recent.retain(|e| e.conversation != conversation);
        // Newest first, like the adapter's index.
        recent.insert(
            0,
            RecentEntry {
                conversation,
                local_id,
                text: text.to_string(),
            },
        );
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    fn account(&self) -> AccountId {
        self.account
    }

    async fn resolve_user(&self, id: UserId) -> Result<Option<User>> {
        self.record(Call::ResolveUser(id.0));
        self.check(format!("resolve_user:{}", id.0), "resolve_user")?;
        Ok(self.users.lock().unwrap().get(&id.0).cloned())
    }

    async fn resolve_group(&self, id: GroupId) -> Result<Option<Group>> {
        self.record(Call::ResolveGroup(id.0));
        self.check(format!("resolve_group:{}", id.0), "resolve_group")?;
        Ok(self.groups.lock().unwrap().get(&id.0).cloned())
    }

    async fn is_member_of(&self, group: &Group) -> Result<bool> {
        self.record(Call::IsMember(group.id.0));
        Ok(self.member_of.lock().unwrap().contains(&group.id.0))
    }

    async fn self_user(&self) -> Result<User> {
        self.record(Call::SelfUser);
        Ok(User {
            id: UserId(1000),
            username: Some("me".to_string()),
            is_bot: false,
            is_support: false,
        })
    }

    async fn drop_conversation(&self, conversation: ConversationId) -> Result<()> {
        self.record(Call::Drop(conversation.0));
        self.check(format!("drop:{}", conversation.0), "drop_conversation")
    }

    async fn remove_self_from_group(&self, group: GroupId, self_user: &User) -> Result<()> {
        self.record(Call::Leave(group.0, self_user.id.0));
        self.check(format!("leave:{}", group.0), "remove_self_from_group")
    }

    async fn block_peer(&self, conversation: ConversationId) -> Result<()> {
        self.record(Call::Block(conversation.0));
        self.check(format!("block:{}", conversation.0), "block_peer")
    }

    async fn send_message(
        &self,
        conversation: ConversationId,
        text: &str,
    ) -> Result<QueuedMessage> {
        self.record(Call::Send(conversation.0, text.to_string()));
        self.check(format!("send:{}", conversation.0), "send_message")?;
        let local_id = {
            let mut next = self.next_local_id.lock().unwrap();
            let id = *next;
            *next += 1;
            LocalMessageId(id)
        };
        if self.index_sends {
            self.remember(conversation, local_id, text);
        }
        Ok(QueuedMessage {
            conversation,
            local_id,
        })
    }

    async fn find_recent_message_by_text(&self, text: &str) -> Result<Option<RecentMessage>> {
        self.record(Call::Find(text.to_string()));
        self.check("find".to_string(), "find_recent_message_by_text")?;
        Ok(self
            .recent
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.text == text)
            .map(|e| RecentMessage {
                conversation: e.conversation,
                local_id: e.local_id,
            }))
    }

    async fn delete_messages(
        &self,
        conversation: ConversationId,
        ids: &[ServerMessageId],
    ) -> Result<()> {
        let delay = *self.delete_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.record(Call::Delete(
            conversation.0,
            ids.iter().map(|i| i.0).collect(),
        ));
        self.check(format!("delete:{}", conversation.0), "delete_messages")
    }

    async fn delete_all_contacts(&self) -> Result<()> {
        self.record(Call::DeleteContacts);
        self.check("delete_all_contacts".to_string(), "delete_all_contacts")
    }

    async fn delete_all_stickers(&self) -> Result<()> {
        self.record(Call::DeleteStickers);
        self.check("delete_all_stickers".to_string(), "delete_all_stickers")
    }

    async fn terminate_other_sessions(&self) -> Result<()> {
        self.record(Call::TerminateSessions);
        self.check(
            "terminate_other_sessions".to_string(),
            "terminate_other_sessions",
        )
    }

    async fn log_out(&self) -> Result<()> {
        self.record(Call::LogOut);
        self.check("log_out".to_string(), "log_out")
    }
}

#[derive(Default)]
pub struct CountingPersistence {
    saves: AtomicUsize,
}

impl CountingPersistence {
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl ConfigPersistence for CountingPersistence {
    fn request_save(&self) {
        self.saves.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FixedLocation(pub Option<&'static str>);

impl LocationProvider for FixedLocation {
    fn last_location(&self) -> Option<String> {
        self.0.map(str::to_string)
    }
}

pub struct Harness {
    pub session: Arc<FakeSession>,
    pub persistence: Arc<CountingPersistence>,
    pub notifications: Arc<NotificationCenter>,
    pub ctx: ActionContext,
}

impl Harness {
    pub fn new(session: FakeSession) -> Self {
        Self::with_location(session, None)
    }

    pub fn with_location(session: FakeSession, location: Option<&'static str>) -> Self {
        let session = Arc::new(session);
        let persistence = Arc::new(CountingPersistence::default());
        let notifications = Arc::new(NotificationCenter::new());
        let ctx = ActionContext {
            session: session.clone(),
            notifications: notifications.clone(),
            location: Arc::new(FixedLocation(location)),
            correlation: Arc::new(ExactTextCorrelation),
            persistence: persistence.clone(),
        };
        Self {
            session,
            persistence,
            notifications,
            ctx,
        }
    }
}

/// Poll `cond` until it holds or a generous deadline passes.
pub async fn eventually(cond: impl FnMut() -> bool) {
    eventually_within(Duration::from_secs(2), cond).await
}

pub async fn eventually_within(limit: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    if !cond() {
        panic!("condition not reached in time");
    }
}
