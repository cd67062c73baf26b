//! Chat messages and the append-only log that holds them.

use std::sync::Arc;

use crate::hash::ContentHash;

/// Identity of a message. Edits produce a new id, never a mutated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    /// Local notices (startup info, loader warnings).
    System,
}

impl Role {
    /// Header label shown above the message body.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

/// An immutable chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub raw_markdown: Arc<str>,
    hash: ContentHash,
}

impl ChatMessage {
    fn new(id: MessageId, role: Role, raw_markdown: &str) -> Self {
        Self {
            id,
            role,
            raw_markdown: Arc::from(raw_markdown),
            hash: ContentHash::of(raw_markdown.as_bytes()),
        }
    }

    /// Hash of the raw markdown, used to reject stale background results.
    pub fn content_hash(&self) -> ContentHash {
        self.hash
    }
}

/// Ordered, index-stable list of messages.
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    next_id: u64,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Appends a message and returns its id.
    pub fn push(&mut self, role: Role, raw_markdown: &str) -> MessageId {
        let id = self.allocate_id();
        self.messages.push(ChatMessage::new(id, role, raw_markdown));
        id
    }

    /// Replaces the message `old` in place with a new message carrying a fresh id.
    ///
    /// Returns `None` if `old` is not in the log.
    pub fn supersede(&mut self, old: MessageId, raw_markdown: &str) -> Option<MessageId> {
        let index = self.index_of(old)?;
        let role = self.messages[index].role;
        let id = self.allocate_id();
        self.messages[index] = ChatMessage::new(id, role, raw_markdown);
        tracing::debug!(%old, new = %id, "message superseded");
        Some(id)
    }

    /// Removes a message. Returns the removed message if it existed.
    pub fn remove(&mut self, id: MessageId) -> Option<ChatMessage> {
        let index = self.index_of(id)?;
        Some(self.messages.remove(index))
    }

    pub fn index_of(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn at(&self, index: usize) -> Option<&ChatMessage> {
        self.messages.get(index)
    }

    /// Returns true if `id` is live and its content still hashes to `hash`.
    pub fn is_current(&self, id: MessageId, hash: ContentHash) -> bool {
        self.get(id).is_some_and(|m| m.content_hash() == hash)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ChatMessage> + ExactSizeIterator {
        self.messages.iter()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
