//! Per-channel player leases.
//!
//! A lease maps a channel to the session id of the connection that is allowed
//! to drive playback. It lives only as long as its TTL and is never released
//! explicitly: a player that goes away simply stops renewing it.

use crate::error::JukeboxResult;
use crate::server::metrics;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(10);

#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Claims the channel for `session_id` if nobody holds a live lease.
    /// Never steals an existing lease.
    async fn try_claim(&self, channel: &str, session_id: &str) -> JukeboxResult<bool>;

    async fn is_holder(&self, channel: &str, session_id: &str) -> JukeboxResult<bool>;

    /// Resets the TTL of the live lease of `channel`, if any.
    async fn renew(&self, channel: &str) -> JukeboxResult<()>;

    /// Session id of the current holder.
    async fn holder(&self, channel: &str) -> JukeboxResult<Option<String>>;
}

#[derive(Debug, Clone)]
struct Lease {
    session_id: String,
    expires_at: Instant,
}

impl Lease {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local lease store on the tokio clock.
pub struct InMemoryLeaseStore {
    ttl: Duration,
    leases: Mutex<HashMap<String, Lease>>,
}

impl InMemoryLeaseStore {
    pub fn new(ttl: Duration) -> Self {
        InMemoryLeaseStore {
            ttl,
            leases: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn live_lease(&self, channel: &str) -> Option<Lease> {
        let leases = self.leases.lock().unwrap();
        leases
            .get(channel)
            .filter(|lease| lease.is_live(Instant::now()))
            .cloned()
    }
}

impl Default for InMemoryLeaseStore {
    fn default() -> Self {
        Self::new(DEFAULT_LEASE_TTL)
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn try_claim(&self, channel: &str, session_id: &str) -> JukeboxResult<bool> {
        let now = Instant::now();
        let claimed = {
            let mut leases = self.leases.lock().unwrap();
            match leases.get(channel) {
                Some(lease) if lease.is_live(now) => false,
                _ => {
                    leases.insert(
                        channel.to_string(),
                        Lease {
                            session_id: session_id.to_string(),
                            expires_at: now + self.ttl,
                        },
                    );
                    true
                }
            }
        };
        metrics::record_lease_claim(claimed);
        if claimed {
            debug!("Session {} claimed the player lease of {}", session_id, channel);
        }
        Ok(claimed)
    }

    async fn is_holder(&self, channel: &str, session_id: &str) -> JukeboxResult<bool> {
        Ok(self
            .live_lease(channel)
            .is_some_and(|lease| lease.session_id == session_id))
    }

    async fn renew(&self, channel: &str) -> JukeboxResult<()> {
        let now = Instant::now();
        let mut leases = self.leases.lock().unwrap();
        if let Some(lease) = leases.get_mut(channel).filter(|lease| lease.is_live(now)) {
            lease.expires_at = now + self.ttl;
        }
        Ok(())
    }

    async fn holder(&self, channel: &str) -> JukeboxResult<Option<String>> {
        Ok(self.live_lease(channel).map(|lease| lease.session_id))
    }
}
