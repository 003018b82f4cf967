pub mod chat_list;
pub mod config;
pub mod conversation;
pub mod friends;
pub mod session;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use chat_list::{ChatList, ChatRow};
pub use config::Config;
pub use conversation::{Conversation, ConversationError};
pub use session::Session;
pub use source::ChatSource;
