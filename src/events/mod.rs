//! Per-channel event fan-out between connections.

mod bus;
mod models;
mod transport;

pub use bus::{EventBus, Subscription, DEFAULT_SUBSCRIBER_QUEUE};
pub use models::{ChannelEvent, PlayerProgress, WireEvent};
pub use transport::{EventTransport, LocalEventTransport};
