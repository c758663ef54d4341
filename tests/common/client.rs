//! WebSocket client for end-to-end tests
//!
//! Wraps tokio-tungstenite and speaks the `{sessionId, ts, type, token, data}`
//! request protocol. Replies are matched by `ts`; pushes received while
//! waiting for a reply are buffered for `next_push`.

#![allow(dead_code)]

use super::constants::*;
use super::server::TestServer;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct WsClient {
    ws: WsStream,
    pub session_id: String,
    next_ts: i64,
    pushes: VecDeque<Value>,
}

impl WsClient {
    /// Connects and consumes the `{"ready": true}` greeting.
    pub async fn connect(server: &TestServer) -> Self {
        Self::connect_as_session(server, &uuid::Uuid::new_v4().to_string()).await
    }

    pub async fn connect_as_session(server: &TestServer, session_id: &str) -> Self {
        let (ws, _) = connect_async(server.ws_url())
            .await
            .expect("Failed to connect to WebSocket");
        let mut client = Self {
            ws,
            session_id: session_id.to_string(),
            next_ts: 1,
            pushes: VecDeque::new(),
        };
        let greeting = client
            .read_json(Duration::from_millis(MESSAGE_TIMEOUT_MS))
            .await
            .expect("No greeting from server");
        assert_eq!(greeting, json!({"ready": true}));
        client
    }

    /// Connects and authenticates `username` into `channel`.
    pub async fn connect_as(server: &TestServer, username: &str, channel: &str) -> Self {
        let mut client = Self::connect(server).await;
        let reply = client.authenticate(&server.token(username, channel)).await;
        assert_eq!(reply["ok"], true, "authentication failed: {}", reply);
        client
    }

    async fn read_json(&mut self, wait: Duration) -> Option<Value> {
        let result = timeout(wait, async {
            while let Some(Ok(msg)) = self.ws.next().await {
                if let Message::Text(text) = msg {
                    return serde_json::from_str::<Value>(text.as_str()).ok();
                }
            }
            None
        })
        .await;
        result.ok().flatten()
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::text(text.to_string()))
            .await
            .expect("Failed to send frame");
    }

    /// Reads frames until the reply with `ts` arrives.
    pub async fn wait_reply(&mut self, ts: i64) -> Value {
        loop {
            let msg = self
                .read_json(Duration::from_millis(MESSAGE_TIMEOUT_MS))
                .await
                .unwrap_or_else(|| panic!("No reply for ts {}", ts));
            if msg["ts"] == ts {
                return msg;
            }
            if msg["ts"] == -1 {
                self.pushes.push_back(msg);
            }
        }
    }

    pub async fn request_with_token(
        &mut self,
        kind: &str,
        token: Option<&str>,
        data: Value,
    ) -> Value {
        let ts = self.next_ts;
        self.next_ts += 1;
        let frame = json!({
            "sessionId": self.session_id,
            "ts": ts,
            "type": kind,
            "token": token,
            "data": data,
        });
        self.send_raw(&frame.to_string()).await;
        self.wait_reply(ts).await
    }

    pub async fn request(&mut self, kind: &str, data: Value) -> Value {
        self.request_with_token(kind, None, data).await
    }

    pub async fn authenticate(&mut self, token: &str) -> Value {
        self.request_with_token("Authenticate", Some(token), json!({}))
            .await
    }

    /// Queues a link and returns the new queue entry id.
    pub async fn add(&mut self, link: &str) -> i64 {
        let reply = self.request("AddPlaylistItem", json!({"link": link})).await;
        assert_eq!(reply["ok"], true, "AddPlaylistItem failed: {}", reply);
        reply["content"]["playlistItem"]["id"]
            .as_i64()
            .expect("reply has no entry id")
    }

    /// Ids of the upcoming entries that are not deleted, in play order.
    pub async fn next_ids(&mut self) -> Vec<i64> {
        let reply = self.request("GetPlaylist", json!({})).await;
        assert_eq!(reply["ok"], true, "GetPlaylist failed: {}", reply);
        reply["content"]["nextPlaylistItems"]
            .as_array()
            .expect("no next items")
            .iter()
            .filter(|item| item["isDeleted"] != true)
            .filter_map(|item| item["id"].as_i64())
            .collect()
    }

    /// Next push content, buffered or fresh.
    pub async fn next_push(&mut self) -> Option<Value> {
        self.next_push_within(Duration::from_millis(MESSAGE_TIMEOUT_MS))
            .await
    }

    async fn next_push_within(&mut self, wait: Duration) -> Option<Value> {
        if let Some(push) = self.pushes.pop_front() {
            return Some(push["content"].clone());
        }
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let msg = self.read_json(remaining).await?;
            if msg["ts"] == -1 {
                return Some(msg["content"].clone());
            }
        }
    }

    /// Waits for a push with the given `event` name, skipping others.
    pub async fn wait_for_event(&mut self, event: &str) -> Value {
        loop {
            let push = self
                .next_push()
                .await
                .unwrap_or_else(|| panic!("No {} push received", event));
            if push["event"] == event {
                return push;
            }
        }
    }

    /// Asserts that no push with `event` arrives within the quiet period.
    pub async fn assert_no_event(&mut self, event: &str) {
        let wait = Duration::from_millis(QUIET_PERIOD_MS);
        while let Some(push) = self.next_push_within(wait).await {
            assert_ne!(push["event"], event, "unexpected push: {}", push);
        }
    }
}
