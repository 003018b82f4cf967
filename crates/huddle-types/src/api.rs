//! REST wire shapes and their mapping into domain types.
//!
//! Server field names stop here: everything past this module sees
//! [`Chat`], [`ChatMessage`] and [`Friend`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{Chat, ChatId, ChatMessage, Friend, UserId};

// -- Chats --

/// `user_ids` arrives as a JSON-encoded string (`"[1,2]"`) from the chat
/// endpoints; a plain array is accepted too.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UserIdsField {
    Encoded(String),
    List(Vec<UserId>),
}

impl UserIdsField {
    pub fn into_ids(self) -> Result<Vec<UserId>, serde_json::Error> {
        match self {
            Self::Encoded(raw) => serde_json::from_str(&raw),
            Self::List(ids) => Ok(ids),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatGroupList {
    #[serde(default)]
    pub groups: Option<Vec<ChatGroup>>,
}

#[derive(Debug, Deserialize)]
pub struct ChatGroup {
    pub group_id: ChatId,
    #[serde(default)]
    pub user_ids: Option<UserIdsField>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ChatGroup {
    pub fn into_chat(self) -> Result<Chat, serde_json::Error> {
        let user_ids = match self.user_ids {
            Some(field) => field.into_ids()?,
            None => Vec::new(),
        };

        Ok(Chat {
            id: self.group_id,
            user_ids,
            created_at: self.created_at.as_deref().and_then(parse_server_timestamp),
        })
    }
}

impl ChatGroupList {
    pub fn into_chats(self) -> Result<Vec<Chat>, serde_json::Error> {
        self.groups
            .unwrap_or_default()
            .into_iter()
            .map(ChatGroup::into_chat)
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct CreateChatRequest {
    pub sender_user_id: UserId,
    pub user_ids: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChatResponse {
    pub group_id: ChatId,
    #[serde(default)]
    pub user_ids: Option<UserIdsField>,
}

impl CreateChatResponse {
    /// Build the created chat. When the server does not echo participants,
    /// they are taken from the request.
    pub fn into_chat(self, request: &CreateChatRequest) -> Result<Chat, serde_json::Error> {
        let user_ids = match self.user_ids {
            Some(field) => field.into_ids()?,
            None => std::iter::once(request.sender_user_id)
                .chain(request.user_ids.iter().copied())
                .collect(),
        };

        Ok(Chat {
            id: self.group_id,
            user_ids,
            created_at: Some(Utc::now()),
        })
    }
}

// -- Messages --

/// Message as returned by the history endpoint and pushed by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub group_id: ChatId,
    pub user_id: UserId,
    #[serde(default)]
    pub message_content: Option<String>,
    pub timestamp: String,
}

impl MessageRecord {
    pub fn into_message(self) -> ChatMessage {
        let created_at = parse_server_timestamp(&self.timestamp).unwrap_or_else(|| {
            warn!(
                "Unparseable timestamp '{}' on message in group {}",
                self.timestamp, self.group_id
            );
            DateTime::default()
        });

        ChatMessage {
            id: self.id,
            chat_id: self.group_id,
            user_id: self.user_id,
            text: self.message_content,
            created_at,
        }
    }
}

/// Query string of the history endpoint.
#[derive(Debug, Serialize)]
pub struct HistoryQuery {
    pub sender_user_id: UserId,
    pub group_id: ChatId,
    pub limit: u32,
    pub page: u32,
    pub order: &'static str,
}

// -- Friends --

#[derive(Debug, Deserialize)]
pub struct FriendList {
    #[serde(default)]
    pub data: Vec<FriendRecord>,
}

#[derive(Debug, Deserialize)]
pub struct FriendRecord {
    pub id: UserId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl From<FriendRecord> for Friend {
    fn from(record: FriendRecord) -> Self {
        Self {
            id: record.id,
            first_name: record.first_name,
            last_name: record.last_name,
        }
    }
}

/// Parse a server timestamp. The server emits naive datetimes that are
/// implicitly UTC; offset-qualified values are honoured as given.
pub fn parse_server_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|ndt| ndt.and_utc())
}
