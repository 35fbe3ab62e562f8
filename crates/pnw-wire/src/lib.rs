//! pnw-wire: the Pusher protocol v7 Wire Client and Channel Registry (§4.1, §4.2).

pub mod backoff;
pub mod channel;
pub mod connection;
pub mod error;

pub use channel::{ChannelRegistry, ChannelState, EventHandler};
pub use connection::{ConnectionState, WireClient};
pub use error::WireError;
