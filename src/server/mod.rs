mod channel_routes;
pub mod config;
mod http_layers;
pub mod metrics;
pub mod server;
mod session;
pub mod state;
mod stream_media;
pub mod websocket;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
