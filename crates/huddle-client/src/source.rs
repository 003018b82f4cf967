use std::future::Future;

use huddle_api::FetchError;
use huddle_types::models::{Chat, ChatId, ChatMessage, Friend, UserId};

/// What the chat list and conversation views need from a session.
pub trait ChatSource: Send + Sync {
    /// The signed-in user.
    fn user_id(&self) -> UserId;

    fn list_chats(&self) -> impl Future<Output = Result<Vec<Chat>, FetchError>> + Send;

    fn list_friends(&self) -> impl Future<Output = Result<Vec<Friend>, FetchError>> + Send;

    /// One page of history, newest first, 1-based.
    fn get_messages(
        &self,
        chat_id: ChatId,
        page_size: u32,
        page: u32,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, FetchError>> + Send;

    fn create_chat(
        &self,
        other_user_ids: Vec<UserId>,
    ) -> impl Future<Output = Result<ChatId, FetchError>> + Send;

    /// Fire-and-forget; empty text is never sent.
    fn send_message(&self, text: &str, chat_id: ChatId);
}
