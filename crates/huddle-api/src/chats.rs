use tracing::info;

use huddle_gateway::{EventBus, Subscription};
use huddle_types::api::{ChatGroupList, CreateChatRequest, CreateChatResponse, FriendList};
use huddle_types::models::{Chat, ChatId, Friend, UserId};

use crate::rest::{ApiTarget, FetchError, RestClient};

const CHATS_PATH: &str = "/dm/groups/get";
const CREATE_CHAT_PATH: &str = "/dm/group/create";
const FRIENDS_PATH: &str = "/chat/friends";

/// Conversation listing and creation for the signed-in user.
#[derive(Clone)]
pub struct ChatDirectory {
    rest: RestClient,
    user_id: UserId,
    created: EventBus<Chat>,
}

impl ChatDirectory {
    pub fn new(rest: RestClient, user_id: UserId) -> Self {
        Self {
            rest,
            user_id,
            created: EventBus::new("chat-created"),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Every chat the user takes part in. Not paginated.
    pub async fn list_chats(&self) -> Result<Vec<Chat>, FetchError> {
        let list: ChatGroupList = self
            .rest
            .get_with_query(CHATS_PATH, &[("user_id", self.user_id)], ApiTarget::Serverless)
            .await?;
        Ok(list.into_chats()?)
    }

    /// Create a chat with `other_user_ids` and announce it on the
    /// chat-created bus. The server may hand back an existing chat.
    pub async fn create_chat(&self, other_user_ids: Vec<UserId>) -> Result<ChatId, FetchError> {
        let request = CreateChatRequest {
            sender_user_id: self.user_id,
            user_ids: other_user_ids,
        };
        let response: CreateChatResponse = self
            .rest
            .post(CREATE_CHAT_PATH, &request, ApiTarget::Serverless)
            .await?;

        let chat = response.into_chat(&request)?;
        let chat_id = chat.id;
        info!("Created chat {} with {:?}", chat_id, request.user_ids);

        self.created.publish(chat);
        Ok(chat_id)
    }

    /// Users the signed-in user can message.
    pub async fn list_friends(&self) -> Result<Vec<Friend>, FetchError> {
        let list: FriendList = self.rest.get(FRIENDS_PATH, ApiTarget::Backend).await?;
        Ok(list.data.into_iter().map(Friend::from).collect())
    }

    pub fn created_chats(&self) -> &EventBus<Chat> {
        &self.created
    }

    #[must_use = "dropping a Subscription unsubscribes it"]
    pub fn subscribe_created<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Chat) + Send + Sync + 'static,
    {
        self.created.subscribe(handler)
    }
}
