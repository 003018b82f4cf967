use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use huddle_api::{FetchError, MessageTimeline};
use huddle_types::models::{Chat, ChatId, ChatMessage, Friend, UserId};

use crate::chat_list::chat_title;
use crate::source::ChatSource;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("chat {0} not found")]
    ChatNotFound(ChatId),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// One open chat: its history pages merged with live and sent messages.
pub struct Conversation<S> {
    source: Arc<S>,
    chat: Chat,
    timeline: MessageTimeline,
    friends: HashMap<UserId, Friend>,
}

impl<S: ChatSource> Conversation<S> {
    /// Open `chat_id` and load its newest page. Fails for chats the user is
    /// not part of.
    pub async fn open(source: Arc<S>, chat_id: ChatId, page_size: u32) -> Result<Self, ConversationError> {
        let chat = source
            .list_chats()
            .await?
            .into_iter()
            .find(|c| c.id == chat_id)
            .ok_or(ConversationError::ChatNotFound(chat_id))?;

        let (first_page, friends) = tokio::join!(
            source.get_messages(chat_id, page_size, 1),
            source.list_friends()
        );

        let mut timeline = MessageTimeline::new(chat_id, page_size);
        timeline.append_page(1, first_page?);

        Ok(Self {
            source,
            chat,
            timeline,
            friends: friends?.into_iter().map(|f| (f.id, f)).collect(),
        })
    }

    /// Fetch the next older page. Returns how many messages it held; zero
    /// once the history is exhausted.
    pub async fn load_more(&mut self) -> Result<usize, FetchError> {
        let Some(page) = self.timeline.next_page() else {
            return Ok(0);
        };
        let messages = self
            .source
            .get_messages(self.chat.id, self.timeline.page_size(), page)
            .await?;
        let count = messages.len().min(self.timeline.page_size() as usize);
        debug!("Chat {} page {}: {} messages", self.chat.id, page, count);
        self.timeline.append_page(page, messages);
        Ok(count)
    }

    /// Show a pushed message. Messages for other chats are ignored.
    pub fn receive(&mut self, message: ChatMessage) -> bool {
        self.timeline.push_front(message)
    }

    /// Send `text` and show it right away with a local timestamp. Empty text
    /// is ignored.
    pub fn send(&mut self, text: &str) -> Option<&ChatMessage> {
        if text.is_empty() {
            return None;
        }
        self.source.send_message(text, self.chat.id);
        let echo = ChatMessage::local_echo(self.chat.id, self.source.user_id(), text);
        self.timeline.push_front(echo);
        self.timeline.messages().first()
    }

    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    pub fn title(&self) -> String {
        chat_title(&self.chat, self.source.user_id(), &self.friends)
    }

    /// Display name of a message's author; the signed-in user is "You".
    pub fn author(&self, message: &ChatMessage) -> String {
        if message.user_id == self.source.user_id() {
            return "You".to_string();
        }
        match self.friends.get(&message.user_id) {
            Some(friend) => friend.display_name(),
            None => format!("#{}", message.user_id),
        }
    }

    /// Newest first.
    pub fn messages(&self) -> &[ChatMessage] {
        self.timeline.messages()
    }

    pub fn has_more(&self) -> bool {
        self.timeline.has_more()
    }
}
