use std::collections::BTreeSet;

use tracing::info;

use huddle_api::FetchError;
use huddle_types::models::{Chat, ChatId, UserId};

use crate::source::ChatSource;

/// The existing chat between exactly `self_id` and `friend_id`, if any.
pub fn find_direct_chat(chats: &[Chat], self_id: UserId, friend_id: UserId) -> Option<ChatId> {
    let wanted = BTreeSet::from([self_id, friend_id]);
    chats
        .iter()
        .find(|chat| chat.user_ids.iter().copied().collect::<BTreeSet<_>>() == wanted)
        .map(|chat| chat.id)
}

/// Chat to open when the user picks `friend_id`: the existing direct chat,
/// or a newly created one.
pub async fn open_direct_chat<S: ChatSource>(source: &S, friend_id: UserId) -> Result<ChatId, FetchError> {
    let chats = source.list_chats().await?;
    if let Some(chat_id) = find_direct_chat(&chats, source.user_id(), friend_id) {
        return Ok(chat_id);
    }
    let chat_id = source.create_chat(vec![friend_id]).await?;
    info!("Started chat {} with user {}", chat_id, friend_id);
    Ok(chat_id)
}
