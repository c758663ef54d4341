//! End-to-end tests for channel events: which connections receive which
//! pushes, and the media pipeline events behind them.

mod common;

use common::{
    link_for, TestServer, WsClient, CHANNEL, MEMBER_USER, OWNER_USER, UNAVAILABLE_VIDEO_ID,
};
use serde_json::json;
use std::sync::atomic::Ordering;

fn progress() -> serde_json::Value {
    json!({
        "playedSeconds": 12.5,
        "played": 0.07,
        "loadedSeconds": 60.0,
        "loaded": 0.33
    })
}

#[tokio::test]
async fn test_new_items_are_announced_to_everyone() {
    let server = TestServer::spawn().await;
    let mut player = WsClient::connect_as(&server, OWNER_USER, CHANNEL).await;
    let mut viewer = WsClient::connect_as(&server, MEMBER_USER, CHANNEL).await;

    let id = viewer.add(&link_for("hello")).await;

    let push = player.wait_for_event("PlaylistItemCreated").await;
    assert_eq!(push["id"], id);
    let push = viewer.wait_for_event("PlaylistItemCreated").await;
    assert_eq!(push["id"], id);
}

#[tokio::test]
async fn test_fetch_marks_entry_ready_and_normalizes() {
    let server = TestServer::spawn().await;
    let mut viewer = WsClient::connect_as(&server, MEMBER_USER, CHANNEL).await;

    let reply = viewer
        .request("AddPlaylistItem", json!({"link": link_for("fetchme")}))
        .await;
    let id = reply["content"]["playlistItem"]["id"].as_i64().unwrap();
    let media_id = reply["content"]["item"]["id"].as_str().unwrap().to_string();

    let push = viewer.wait_for_event("ItemDownloaded").await;
    assert_eq!(push["id"], id);

    let reply = viewer.request("GetPlaylistItemsById", json!([id])).await;
    assert_eq!(reply["content"][0]["isReady"], true);
    assert_eq!(reply["content"][0]["item"]["state"], "PREPARED");

    let media = server.wait_normalized(&media_id).await;
    assert!(server.normalized_file(&media).is_some());
    assert_eq!(server.fetcher.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_same_media_is_fetched_once() {
    let server = TestServer::spawn().await;
    let mut viewer = WsClient::connect_as(&server, MEMBER_USER, CHANNEL).await;

    viewer.add(&link_for("twice")).await;
    viewer.wait_for_event("ItemDownloaded").await;

    let second = viewer.add(&link_for("twice")).await;
    let reply = viewer.request("GetPlaylistItemsById", json!([second])).await;
    assert_eq!(reply["content"][0]["isReady"], true);
    assert_eq!(server.fetcher.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_fetch_leaves_entry_unready() {
    let server = TestServer::spawn().await;
    let mut viewer = WsClient::connect_as(&server, MEMBER_USER, CHANNEL).await;

    let id = viewer.add(&link_for(UNAVAILABLE_VIDEO_ID)).await;
    viewer.assert_no_event("ItemDownloaded").await;

    let reply = viewer.request("GetPlaylistItemsById", json!([id])).await;
    assert_eq!(reply["content"][0]["isReady"], false);
    assert_eq!(server.fetcher.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_playlist_updates_skip_their_originator() {
    let server = TestServer::spawn().await;
    let mut owner = WsClient::connect_as(&server, OWNER_USER, CHANNEL).await;
    let mut viewer = WsClient::connect_as(&server, MEMBER_USER, CHANNEL).await;

    let a = viewer.add(&link_for("a")).await;
    let b = viewer.add(&link_for("b")).await;

    let reply = owner
        .request("MovePlaylistItem", json!({"id": b, "moveBefore": a}))
        .await;
    assert_eq!(reply["ok"], true);
    viewer.wait_for_event("PlaylistUpdated").await;
    owner.assert_no_event("PlaylistUpdated").await;

    let reply = owner
        .request("DeletePlaylistItem", json!({"playlistItemId": a}))
        .await;
    assert_eq!(reply["ok"], true);
    viewer.wait_for_event("PlaylistUpdated").await;
    owner.assert_no_event("PlaylistUpdated").await;
}

#[tokio::test]
async fn test_progress_reaches_viewers_only() {
    let server = TestServer::spawn().await;
    let mut player = WsClient::connect_as(&server, OWNER_USER, CHANNEL).await;
    let mut viewer = WsClient::connect_as(&server, MEMBER_USER, CHANNEL).await;

    let reply = player
        .request("BroadcastProgress", json!({"progress": progress()}))
        .await;
    assert_eq!(reply["ok"], true);

    let push = viewer.wait_for_event("PlayerProgressUpdated").await;
    assert_eq!(push["progress"], progress());
    player.assert_no_event("PlayerProgressUpdated").await;
}

#[tokio::test]
async fn test_volume_round_trip_through_player() {
    let server = TestServer::spawn().await;
    let mut player = WsClient::connect_as(&server, OWNER_USER, CHANNEL).await;
    let mut viewer = WsClient::connect_as(&server, MEMBER_USER, CHANNEL).await;

    let url = server.channel_url(CHANNEL, "volume");
    let token = server.token(MEMBER_USER, CHANNEL);
    let request = tokio::spawn(async move {
        let response = reqwest::Client::new()
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        response.json::<serde_json::Value>().await.unwrap()
    });

    let push = player.wait_for_event("VolumeRequested").await;
    let token = push["token"].as_str().unwrap().to_string();

    // Viewers cannot answer for the player.
    let reply = viewer
        .request("ReturnVolume", json!({"token": token, "volume": 0.9}))
        .await;
    assert_eq!(reply["content"]["code"], "permission_denied");

    let reply = player
        .request("ReturnVolume", json!({"token": token, "volume": 0.4}))
        .await;
    assert_eq!(reply["content"], true);
    assert_eq!(request.await.unwrap()["volume"], 0.4);

    // The waiter is gone once answered.
    let reply = player
        .request("ReturnVolume", json!({"token": token, "volume": 0.5}))
        .await;
    assert_eq!(reply["content"], false);

    viewer.assert_no_event("VolumeRequested").await;
}

#[tokio::test]
async fn test_volume_request_without_player_times_out() {
    let server = TestServer::spawn().await;
    let _viewer = WsClient::connect_as(&server, MEMBER_USER, CHANNEL).await;

    let response = reqwest::Client::new()
        .get(server.channel_url(CHANNEL, "volume"))
        .bearer_auth(server.token(MEMBER_USER, CHANNEL))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["volume"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_player_commands_reach_player_only() {
    let server = TestServer::spawn().await;
    let mut player = WsClient::connect_as(&server, OWNER_USER, CHANNEL).await;
    let mut viewer = WsClient::connect_as(&server, MEMBER_USER, CHANNEL).await;

    let a = player.add(&link_for("a")).await;
    player.add(&link_for("b")).await;
    let reply = player.request("SetIsPlaying", json!({"id": a})).await;
    assert_eq!(reply["ok"], true);

    server.playlist.set_volume(CHANNEL, 0.25).await.unwrap();
    let push = player.wait_for_event("VolumeSetRequested").await;
    assert_eq!(push["volume"], 0.25);

    server.playlist.skip_current(CHANNEL).await.unwrap();
    player.wait_for_event("SkipRequested").await;

    viewer.assert_no_event("VolumeSetRequested").await;
    viewer.assert_no_event("SkipRequested").await;

    assert!(server.playlist.set_volume(CHANNEL, 1.5).await.is_err());
}

#[tokio::test]
async fn test_related_videos_are_queued_automatically() {
    let server = TestServer::spawn().await;
    let mut viewer = WsClient::connect_as(&server, MEMBER_USER, CHANNEL).await;

    let reply = viewer
        .request("AddPlaylistItem", json!({"link": link_for("seed")}))
        .await;
    let media_id = reply["content"]["item"]["id"].as_str().unwrap().to_string();

    let reply = viewer
        .request("SearchRelatedVideos", json!({"itemId": media_id}))
        .await;
    let related = reply["content"].as_array().unwrap();
    assert_eq!(related.len(), 3);
    assert_eq!(related[0]["videoId"], "seed-r1");

    let reply = viewer
        .request(
            "AddRelatedVideos",
            json!({
                "itemId": media_id,
                "count": 2,
                "excludingVideoIdCandidates": ["seed-r1"]
            }),
        )
        .await;
    let added = reply["content"].as_array().unwrap();
    assert_eq!(added.len(), 2);
    assert_eq!(added[0]["item"]["videoId"], "seed-r2");
    assert_eq!(added[1]["item"]["videoId"], "seed-r3");
    assert_eq!(added[0]["playlistItem"]["addedAutomatically"], true);

    assert_eq!(viewer.next_ids().await.len(), 3);
    assert_eq!(server.verify_chain(), 3);
}
