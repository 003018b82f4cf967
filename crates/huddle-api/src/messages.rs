use tokio::sync::mpsc;
use tracing::{debug, warn};

use huddle_gateway::{ConnectionManager, Subscription};
use huddle_types::api::{HistoryQuery, MessageRecord};
use huddle_types::events::{EventKind, GatewayCommand, GatewayEvent};
use huddle_types::models::{ChatId, ChatMessage, UserId};

use crate::rest::{ApiTarget, FetchError, RestClient};

const HISTORY_PATH: &str = "/dm/group/chat/history";

/// Message history over REST, sending and live pushes over the gateway.
#[derive(Clone)]
pub struct MessageHistory {
    rest: RestClient,
    gateway: ConnectionManager,
    user_id: UserId,
}

impl MessageHistory {
    pub fn new(rest: RestClient, gateway: ConnectionManager, user_id: UserId) -> Self {
        Self {
            rest,
            gateway,
            user_id,
        }
    }

    /// One page of a chat's history, newest first. Pages are 1-based; a page
    /// shorter than `page_size` means there are no older messages.
    pub async fn get_messages(
        &self,
        chat_id: ChatId,
        page_size: u32,
        page: u32,
    ) -> Result<Vec<ChatMessage>, FetchError> {
        let query = HistoryQuery {
            sender_user_id: self.user_id,
            group_id: chat_id,
            limit: page_size,
            page,
            order: "desc",
        };
        let records: Vec<MessageRecord> = self
            .rest
            .get_with_query(HISTORY_PATH, &query, ApiTarget::Serverless)
            .await?;

        if records.len() > page_size as usize {
            debug!(
                "History page {} of chat {} had {} items for a page size of {}",
                page,
                chat_id,
                records.len(),
                page_size
            );
        }

        Ok(records
            .into_iter()
            .take(page_size as usize)
            .map(MessageRecord::into_message)
            .collect())
    }

    /// Send over the gateway. No acknowledgement comes back, so the caller
    /// shows its own local echo. Empty text is never sent.
    pub fn send_message(&self, text: &str, chat_id: ChatId) {
        if text.is_empty() {
            debug!("Not sending empty message to chat {}", chat_id);
            return;
        }
        self.gateway
            .send(&GatewayCommand::send_message(text, chat_id));
    }

    /// Run `handler` for every chat message pushed by the gateway.
    #[must_use = "dropping a Subscription unsubscribes it"]
    pub fn subscribe_messages<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ChatMessage) + Send + Sync + 'static,
    {
        self.gateway.subscribe(move |event| {
            if let Some(message) = chat_message(event) {
                handler(message);
            }
        })
    }

    /// Like [`Self::subscribe_messages`], delivering into a channel.
    #[must_use = "dropping a Subscription unsubscribes it"]
    pub fn message_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<ChatMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe_messages(move |message| {
            let _ = tx.send(message);
        });
        (subscription, rx)
    }
}

/// Map a gateway event to a chat message, if it is one.
pub fn chat_message(event: &GatewayEvent) -> Option<ChatMessage> {
    if event.kind != EventKind::ChatMessage {
        return None;
    }
    match serde_json::from_value::<MessageRecord>(event.data.clone()) {
        Ok(record) => Some(record.into_message()),
        Err(e) => {
            warn!("Ignoring malformed chat message push: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_maps_to_chat_message() {
        let event = GatewayEvent {
            kind: EventKind::ChatMessage,
            data: json!({
                "group_id": 7,
                "user_id": 2,
                "message_content": "hi",
                "timestamp": "2024-01-01T00:00:00"
            }),
        };
        let message = chat_message(&event).unwrap();
        assert_eq!(message.chat_id, 7);
        assert_eq!(message.user_id, 2);
        assert_eq!(message.text.as_deref(), Some("hi"));
    }

    #[test]
    fn push_without_message_fields_is_ignored() {
        let event = GatewayEvent {
            kind: EventKind::ChatMessage,
            data: json!({ "status": "ok" }),
        };
        assert!(chat_message(&event).is_none());
    }
}
