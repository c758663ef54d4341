//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, WsClient, CHANNEL, OWNER_USER};
//!
//! #[tokio::test]
//! async fn test_ping() {
//!     let server = TestServer::spawn().await;
//!     let mut client = WsClient::connect(&server).await;
//!     client.authenticate(&server.token(OWNER_USER, CHANNEL)).await;
//! }
//! ```

mod client;
mod constants;
mod fakes;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use client::WsClient;
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fakes::{link_for, FakeFetcher, FakeMediaProvider, FakeNormalizer};
#[allow(unused_imports)]
pub use server::{TestServer, TestServerOptions};
