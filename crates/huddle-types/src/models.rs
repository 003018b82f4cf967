use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ChatId = i64;
pub type UserId = i64;

/// The signed-in user a session is built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub auth_token: Option<String>,
}

/// A conversation between the signed-in user and one or more other users.
///
/// Participant order does not matter for membership, but the first id that is
/// not the signed-in user is treated as the other party of a direct chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub user_ids: Vec<UserId>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Chat {
    /// Participants other than `self_id`, in server order.
    pub fn other_user_ids(&self, self_id: UserId) -> impl Iterator<Item = UserId> + '_ {
        self.user_ids.iter().copied().filter(move |id| *id != self_id)
    }

    pub fn other_party(&self, self_id: UserId) -> Option<UserId> {
        self.other_user_ids(self_id).next()
    }
}

/// A single chat message.
///
/// `id` is only known for messages the server assigned one to; optimistic
/// local echoes carry `None`. `created_at` comes from the local clock for
/// echoes and from the server clock otherwise, and the two are not synchronized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Option<i64>,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// A locally stamped message for immediate display after a send.
    pub fn local_echo(chat_id: ChatId, user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            id: None,
            chat_id,
            user_id,
            text: Some(text.into()),
            created_at: Utc::now(),
        }
    }
}

/// Contactable user from the friend directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Friend {
    pub id: UserId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Friend {
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or_default();
        let last = self.last_name.as_deref().unwrap_or_default();
        format!("{} {}", first, last).trim().to_string()
    }
}
