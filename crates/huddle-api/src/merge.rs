//! Reconciling paginated history with live pushes.
//!
//! REST responses and socket pushes complete independently and in no
//! particular order relative to each other; nothing here sequences them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use huddle_types::models::{Chat, ChatId, ChatMessage};

/// Most recent known message per chat, used for chat list order and previews.
#[derive(Debug, Clone, Default)]
pub struct LatestMessages {
    by_chat: HashMap<ChatId, ChatMessage>,
}

impl LatestMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `message` as the latest of its chat and return what it replaced.
    ///
    /// Last write wins: timestamps are not compared, so an older message that
    /// arrives late replaces a newer one.
    pub fn record(&mut self, message: ChatMessage) -> Option<ChatMessage> {
        self.by_chat.insert(message.chat_id, message)
    }

    pub fn get(&self, chat_id: ChatId) -> Option<&ChatMessage> {
        self.by_chat.get(&chat_id)
    }

    pub fn preview(&self, chat_id: ChatId) -> Option<&str> {
        self.get(chat_id).and_then(|m| m.text.as_deref())
    }

    /// Sort key of a chat. Chats without a known message sort as the epoch.
    pub fn timestamp(&self, chat_id: ChatId) -> DateTime<Utc> {
        self.get(chat_id)
            .map(|m| m.created_at)
            .unwrap_or_default()
    }

    /// True when a tracked message belongs to a chat missing from `chats`.
    pub fn references_unknown_chat(&self, chats: &[Chat]) -> bool {
        self.by_chat
            .keys()
            .any(|id| !chats.iter().any(|c| c.id == *id))
    }

    /// Newest conversation first. Ties keep their current order.
    pub fn sort_chats(&self, chats: &mut [Chat]) {
        chats.sort_by(|a, b| self.timestamp(b.id).cmp(&self.timestamp(a.id)));
    }

    pub fn len(&self) -> usize {
        self.by_chat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_chat.is_empty()
    }
}

/// Message list of one open chat, newest first.
///
/// Live pushes go to the front, older pages to the back:
/// `[live, newest..oldest] ++ [history, newest..oldest]`. A message that was
/// both pushed and fetched shows up twice at the seam; ids are not compared.
#[derive(Debug, Clone)]
pub struct MessageTimeline {
    chat_id: ChatId,
    page_size: u32,
    pages_loaded: u32,
    has_more: bool,
    messages: Vec<ChatMessage>,
}

impl MessageTimeline {
    /// A `page_size` of zero is treated as one, so pagination always ends.
    pub fn new(chat_id: ChatId, page_size: u32) -> Self {
        Self {
            chat_id,
            page_size: page_size.max(1),
            pages_loaded: 0,
            has_more: true,
            messages: Vec::new(),
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// 1-based number of the page to fetch next, or `None` once a short page
    /// has been seen.
    pub fn next_page(&self) -> Option<u32> {
        self.has_more.then_some(self.pages_loaded + 1)
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Append a fetched page. A page shorter than the page size is the last.
    /// Items beyond the page size are discarded.
    pub fn append_page(&mut self, page: u32, mut messages: Vec<ChatMessage>) {
        messages.truncate(self.page_size as usize);
        if messages.len() < self.page_size as usize {
            self.has_more = false;
        }
        self.pages_loaded = self.pages_loaded.max(page);
        self.messages.extend(messages);
    }

    /// Prepend a pushed or locally echoed message. Messages of other chats
    /// are ignored; returns whether the message was taken.
    pub fn push_front(&mut self, message: ChatMessage) -> bool {
        if message.chat_id != self.chat_id {
            return false;
        }
        self.messages.insert(0, message);
        true
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}
