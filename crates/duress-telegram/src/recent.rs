use std::collections::VecDeque;

use duress_core::domain::{ConversationId, LocalMessageId, RecentMessage};

#[derive(Clone, Debug)]
struct Entry {
    conversation: ConversationId,
    local_id: LocalMessageId,
    text: String,
}

/// Last message sent per conversation, newest first.
///
/// The Bot API has no way to list a chat's history, so the adapter keeps its
/// own index of what it sent.
#[derive(Debug)]
pub struct RecentIndex {
    entries: VecDeque<Entry>,
    capacity: usize,
}

impl RecentIndex {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, conversation: ConversationId, local_id: LocalMessageId, text: &str) {
        self.entries.retain(|e| e.conversation != conversation);
        self.entries.push_front(Entry {
            conversation,
            local_id,
            text: text.to_string(),
        });
        self.entries.truncate(self.capacity);
    }

    pub fn find_by_text(&self, text: &str) -> Option<RecentMessage> {
        self.entries
            .iter()
            .find(|e| e.text == text)
            .map(|e| RecentMessage {
                conversation: e.conversation,
                local_id: e.local_id,
            })
    }

    pub fn forget(&mut self, conversation: ConversationId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.conversation != conversation);
        before != self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
