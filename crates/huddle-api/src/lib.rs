pub mod chats;
pub mod merge;
pub mod messages;
pub mod rest;

pub use chats::ChatDirectory;
pub use merge::{LatestMessages, MessageTimeline};
pub use messages::MessageHistory;
pub use rest::{ApiConfig, ApiTarget, FetchError, RestClient};
