//! The conversation list: every chat of the user, newest activity first,
//! kept current from live pushes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use huddle_api::{FetchError, LatestMessages};
use huddle_types::models::{Chat, ChatId, ChatMessage, Friend, UserId};

use crate::source::ChatSource;

/// One line of the rendered list.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRow {
    pub chat_id: ChatId,
    pub title: String,
    pub preview: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
}

pub struct ChatList<S> {
    source: Arc<S>,
    chats: Vec<Chat>,
    latest: LatestMessages,
    friends: HashMap<UserId, Friend>,
}

impl<S: ChatSource> ChatList<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            chats: Vec::new(),
            latest: LatestMessages::new(),
            friends: HashMap::new(),
        }
    }

    /// Fetch chats, then friends and the newest message of every chat
    /// concurrently, and sort. State is only replaced when every fetch
    /// succeeded.
    pub async fn load(&mut self) -> Result<(), FetchError> {
        let source = &*self.source;
        let mut chats = source.list_chats().await?;

        let chat_ids: Vec<ChatId> = chats.iter().map(|c| c.id).collect();
        let (friends, newest) = tokio::join!(
            source.list_friends(),
            join_all(chat_ids.iter().map(|&chat_id| source.get_messages(chat_id, 1, 1)))
        );
        let friends = friends?;

        let mut latest = LatestMessages::new();
        for page in newest {
            if let Some(message) = page?.into_iter().next() {
                latest.record(message);
            }
        }
        latest.sort_chats(&mut chats);

        debug!(
            "Chat list loaded: {} chats, {} with messages, {} friends",
            chats.len(),
            latest.len(),
            friends.len()
        );
        self.chats = chats;
        self.latest = latest;
        self.friends = friends.into_iter().map(|f| (f.id, f)).collect();
        Ok(())
    }

    /// Apply a pushed message: it becomes its chat's latest (last write
    /// wins), the chat list is re-fetched once if the chat is not known yet,
    /// and the list is re-sorted. Returns whether a re-fetch happened.
    pub async fn apply_message(&mut self, message: ChatMessage) -> Result<bool, FetchError> {
        self.latest.record(message);

        let refetched = if self.latest.references_unknown_chat(&self.chats) {
            info!("Message for an unknown chat, re-fetching the chat list");
            self.chats = self.source.list_chats().await?;
            true
        } else {
            false
        };

        self.latest.sort_chats(&mut self.chats);
        Ok(refetched)
    }

    /// Keep the list current until both channels close. Failures are logged
    /// and the previous state kept.
    ///
    /// A created chat triggers a full reload, which also replaces latest
    /// messages with what the server has.
    pub async fn run(
        &mut self,
        mut messages: mpsc::UnboundedReceiver<ChatMessage>,
        mut created: mpsc::UnboundedReceiver<Chat>,
        mut on_change: impl FnMut(&Self),
    ) {
        let mut messages_open = true;
        let mut created_open = true;

        while messages_open || created_open {
            tokio::select! {
                message = messages.recv(), if messages_open => match message {
                    Some(message) => {
                        if let Err(e) = self.apply_message(message).await {
                            warn!("Chat list refresh failed: {}", e);
                        }
                        on_change(self);
                    }
                    None => messages_open = false,
                },
                chat = created.recv(), if created_open => match chat {
                    Some(chat) => {
                        info!("Chat {} created, reloading chat list", chat.id);
                        if let Err(e) = self.load().await {
                            warn!("Chat list reload failed: {}", e);
                        }
                        on_change(self);
                    }
                    None => created_open = false,
                },
            }
        }
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn latest(&self) -> &LatestMessages {
        &self.latest
    }

    pub fn friend(&self, user_id: UserId) -> Option<&Friend> {
        self.friends.get(&user_id)
    }

    /// Names of the other participants, comma separated. Users missing from
    /// the friend list show as `#<id>`.
    pub fn title(&self, chat: &Chat) -> String {
        chat_title(chat, self.source.user_id(), &self.friends)
    }

    pub fn rows(&self) -> Vec<ChatRow> {
        self.chats
            .iter()
            .map(|chat| {
                let latest = self.latest.get(chat.id);
                ChatRow {
                    chat_id: chat.id,
                    title: self.title(chat),
                    preview: latest.and_then(|m| m.text.clone()),
                    last_activity: latest.map(|m| m.created_at),
                }
            })
            .collect()
    }
}

pub(crate) fn chat_title(chat: &Chat, self_id: UserId, friends: &HashMap<UserId, Friend>) -> String {
    let names: Vec<String> = chat
        .other_user_ids(self_id)
        .map(|id| match friends.get(&id) {
            Some(friend) => friend.display_name(),
            None => format!("#{}", id),
        })
        .collect();
    if names.is_empty() {
        format!("Chat {}", chat.id)
    } else {
        names.join(", ")
    }
}
