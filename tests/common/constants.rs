//! Shared constants for end-to-end tests
//!
//! When test data changes (users, channels, media ids), update only this file.

#![allow(dead_code)]

// ============================================================================
// Channels and users
// ============================================================================

/// Channel every test user can join
pub const CHANNEL: &str = "lobby";

/// Second configured channel, nobody is granted access to it
pub const OTHER_CHANNEL: &str = "kitchen";

/// Owner of `CHANNEL`
pub const OWNER_USER: &str = "alice";

/// Plain member of `CHANNEL`
pub const MEMBER_USER: &str = "bob";

/// User without any channel grant
pub const STRANGER_USER: &str = "carol";

/// Secret the test server signs tokens with
pub const JWT_SECRET: &str = "e2e-test-secret";

// ============================================================================
// Media
// ============================================================================

/// Media id the fake provider reports with zero duration (a live stream)
pub const LIVE_VIDEO_ID: &str = "live";

/// Media id the fake provider has no download candidate for
pub const UNAVAILABLE_VIDEO_ID: &str = "unavailable";

/// Duration the fake provider reports for every other video
pub const FAKE_DURATION_SECS: i64 = 180;

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// How long to wait for a reply or a push (milliseconds)
pub const MESSAGE_TIMEOUT_MS: u64 = 3000;

/// How long to listen before deciding that no push is coming (milliseconds)
pub const QUIET_PERIOD_MS: u64 = 300;
