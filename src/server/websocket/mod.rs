//! WebSocket protocol: one connection per client, replies correlated by `ts`
//! and channel events pushed with `ts = -1`.

pub mod connection;
pub mod handler;
pub mod messages;

pub use connection::{Connection, CoordinatorContext};
pub use handler::ws_handler;
pub use messages::{ClientRequest, PushEvent, Reply, RequestType, PUSH_TS};
