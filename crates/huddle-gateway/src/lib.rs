pub mod bus;
pub mod connection;
pub mod error;

pub use bus::{EventBus, Subscription};
pub use connection::{ConnectionManager, ConnectionState, GatewayConfig};
pub use error::GatewayError;
