//! In-memory [`ChatSource`] for view tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use chrono::{DateTime, TimeZone, Utc};

use huddle_api::FetchError;
use huddle_types::models::{Chat, ChatId, ChatMessage, Friend, UserId};

use crate::source::ChatSource;

pub fn unavailable() -> FetchError {
    FetchError::Decode(serde_json::Error::io(std::io::Error::other("chat service unavailable")))
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn chat(id: ChatId, user_ids: &[UserId]) -> Chat {
    Chat {
        id,
        user_ids: user_ids.to_vec(),
        created_at: None,
    }
}

pub fn message(chat_id: ChatId, user_id: UserId, secs: i64, text: &str) -> ChatMessage {
    ChatMessage {
        id: None,
        chat_id,
        user_id,
        text: Some(text.to_string()),
        created_at: at(secs),
    }
}

pub fn friend(id: UserId, first: &str, last: &str) -> Friend {
    Friend {
        id,
        first_name: Some(first.to_string()),
        last_name: Some(last.to_string()),
    }
}

pub struct FakeSource {
    pub user_id: UserId,
    pub chats: Mutex<Vec<Chat>>,
    pub friends: Mutex<Vec<Friend>>,
    /// Per chat, newest first.
    pub history: Mutex<HashMap<ChatId, Vec<ChatMessage>>>,
    pub sent: Mutex<Vec<(String, ChatId)>>,
    pub created: Mutex<Vec<Vec<UserId>>>,
    pub list_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub fail_lists: AtomicBool,
    next_chat_id: AtomicI64,
}

impl FakeSource {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            chats: Mutex::new(Vec::new()),
            friends: Mutex::new(Vec::new()),
            history: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
            fail_lists: AtomicBool::new(false),
            next_chat_id: AtomicI64::new(100),
        }
    }

    pub fn with_chats(self, chats: Vec<Chat>) -> Self {
        *self.chats.lock().unwrap() = chats;
        self
    }

    pub fn with_friends(self, friends: Vec<Friend>) -> Self {
        *self.friends.lock().unwrap() = friends;
        self
    }

    pub fn with_history(self, chat_id: ChatId, newest_first: Vec<ChatMessage>) -> Self {
        self.history.lock().unwrap().insert(chat_id, newest_first);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl ChatSource for FakeSource {
    fn user_id(&self) -> UserId {
        self.user_id
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, FetchError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.chats.lock().unwrap().clone())
    }

    async fn list_friends(&self) -> Result<Vec<Friend>, FetchError> {
        Ok(self.friends.lock().unwrap().clone())
    }

    async fn get_messages(
        &self,
        chat_id: ChatId,
        page_size: u32,
        page: u32,
    ) -> Result<Vec<ChatMessage>, FetchError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let history = self.history.lock().unwrap();
        Ok(history
            .get(&chat_id)
            .map(|all| {
                all.iter()
                    .skip(((page - 1) * page_size) as usize)
                    .take(page_size as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_chat(&self, other_user_ids: Vec<UserId>) -> Result<ChatId, FetchError> {
        let id = self.next_chat_id.fetch_add(1, Ordering::SeqCst);
        let mut user_ids = vec![self.user_id];
        user_ids.extend(&other_user_ids);
        self.chats.lock().unwrap().push(chat(id, &user_ids));
        self.created.lock().unwrap().push(other_user_ids);
        Ok(id)
    }

    fn send_message(&self, text: &str, chat_id: ChatId) {
        if !text.is_empty() {
            self.sent.lock().unwrap().push((text.to_string(), chat_id));
        }
    }
}
