use tokio::sync::watch;
use tracing::{info, warn};

use huddle_api::{ChatDirectory, FetchError, MessageHistory, RestClient};
use huddle_gateway::{ConnectionManager, ConnectionState};
use huddle_types::models::{Chat, ChatId, ChatMessage, Friend, Identity, UserId};

use crate::config::Config;
use crate::source::ChatSource;

/// Everything bound to one signed-in user: REST client, gateway socket and
/// the services built on them. Dropping the session closes the socket.
pub struct Session {
    identity: Identity,
    rest: RestClient,
    gateway: ConnectionManager,
    chats: ChatDirectory,
    history: MessageHistory,
}

impl Session {
    /// Build the services for `identity` and open the gateway socket.
    ///
    /// A socket that fails to open is logged, not returned: REST keeps
    /// working and sends are dropped until the next session.
    pub async fn start(config: &Config, identity: Identity) -> Self {
        let rest = RestClient::new(config.api.clone(), identity.auth_token.clone());
        let gateway = ConnectionManager::new(config.gateway.clone());
        let chats = ChatDirectory::new(rest.clone(), identity.user_id);
        let history = MessageHistory::new(rest.clone(), gateway.clone(), identity.user_id);

        if let Err(e) = gateway.open(identity.user_id).await {
            warn!("Session for user {} has no live socket: {}", identity.user_id, e);
        }
        info!("Session started for user {}", identity.user_id);

        Self {
            identity,
            rest,
            gateway,
            chats,
            history,
        }
    }

    /// Close the socket, letting already queued sends go out first.
    pub async fn shutdown(&self) {
        self.gateway.close_and_flush().await;
        info!("Session ended for user {}", self.identity.user_id);
    }

    /// Tear this session down and start one for another user.
    pub async fn replace(self, config: &Config, identity: Identity) -> Self {
        self.shutdown().await;
        drop(self);
        Self::start(config, identity).await
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn gateway(&self) -> &ConnectionManager {
        &self.gateway
    }

    pub fn is_live(&self) -> bool {
        self.gateway.state() == ConnectionState::Open
    }

    pub fn chats(&self) -> &ChatDirectory {
        &self.chats
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    /// Flips to `true` once the server rejects the session.
    pub fn session_expired(&self) -> watch::Receiver<bool> {
        self.rest.session_expired()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.gateway.close();
    }
}

impl ChatSource for Session {
    fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, FetchError> {
        self.chats.list_chats().await
    }

    async fn list_friends(&self) -> Result<Vec<Friend>, FetchError> {
        self.chats.list_friends().await
    }

    async fn get_messages(
        &self,
        chat_id: ChatId,
        page_size: u32,
        page: u32,
    ) -> Result<Vec<ChatMessage>, FetchError> {
        self.history.get_messages(chat_id, page_size, page).await
    }

    async fn create_chat(&self, other_user_ids: Vec<UserId>) -> Result<ChatId, FetchError> {
        self.chats.create_chat(other_user_ids).await
    }

    fn send_message(&self, text: &str, chat_id: ChatId) {
        self.history.send_message(text, chat_id);
    }
}
