//! Channel event bus.
//!
//! The process holds exactly one transport subscription. A single dispatcher
//! task decodes incoming events and fans them out to the bounded queues of the
//! local connections registered for the event's channel.

use super::models::{ChannelEvent, WireEvent};
use super::transport::EventTransport;
use crate::error::JukeboxResult;
use crate::server::metrics;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 64;

type Registry = Arc<RwLock<HashMap<String, HashMap<u64, mpsc::Sender<ChannelEvent>>>>>;

pub struct EventBus {
    transport: Arc<dyn EventTransport>,
    subscribers: Registry,
    next_subscriber_id: AtomicU64,
    queue_capacity: usize,
}

/// A connection's registration on one channel. Dropping it unregisters.
pub struct Subscription {
    id: u64,
    channel: String,
    receiver: mpsc::Receiver<ChannelEvent>,
    subscribers: Registry,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut subscribers = self.subscribers.write().unwrap();
        if let Some(channel_subs) = subscribers.get_mut(&self.channel) {
            channel_subs.remove(&self.id);
            if channel_subs.is_empty() {
                subscribers.remove(&self.channel);
            }
        }
    }
}

impl EventBus {
    pub fn new(transport: Arc<dyn EventTransport>, queue_capacity: usize) -> Self {
        EventBus {
            transport,
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_subscriber_id: AtomicU64::new(1),
            queue_capacity,
        }
    }

    /// Subscribes to the transport and spawns the dispatcher task.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let mut incoming = self.transport.subscribe();
        let bus = self.clone();
        tokio::spawn(async move {
            info!("Event bus dispatcher started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = incoming.recv() => match received {
                        Ok(payload) => bus.dispatch(&payload),
                        Err(RecvError::Lagged(missed)) => {
                            warn!("Event bus lagged behind, {} events lost", missed);
                            metrics::record_event_dropped("lagged", missed);
                        }
                        Err(RecvError::Closed) => {
                            warn!("Event transport closed");
                            break;
                        }
                    },
                }
            }
            info!("Event bus dispatcher stopped");
        })
    }

    /// Fire and forget publication of an event on `channel`.
    pub async fn publish(&self, channel: &str, event: ChannelEvent) -> JukeboxResult<()> {
        let name = event.name();
        let payload = serde_json::to_string(&WireEvent {
            channel: channel.to_string(),
            event,
        })?;
        self.transport.publish(payload).await?;
        metrics::record_event_published(name);
        debug!("Published {} on {}", name, channel);
        Ok(())
    }

    pub fn subscribe(&self, channel: &str) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        self.subscribers
            .write()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .insert(id, sender);
        Subscription {
            id,
            channel: channel.to_string(),
            receiver,
            subscribers: self.subscribers.clone(),
        }
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers
            .read()
            .unwrap()
            .get(channel)
            .map_or(0, HashMap::len)
    }

    fn dispatch(&self, payload: &str) {
        let wire: WireEvent = match serde_json::from_str(payload) {
            Ok(wire) => wire,
            Err(e) => {
                warn!("Skipping undecodable event {:?}: {}", payload, e);
                metrics::record_event_dropped("undecodable", 1);
                return;
            }
        };

        let subscribers = self.subscribers.read().unwrap();
        let Some(channel_subs) = subscribers.get(&wire.channel) else {
            return;
        };
        for (id, sender) in channel_subs {
            match sender.try_send(wire.event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("Subscriber {} queue full, dropping {}", id, wire.event.name());
                    metrics::record_event_dropped("queue_full", 1);
                }
                // Receiver gone, the Subscription drop is about to unregister it.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::transport::LocalEventTransport;
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn started_bus(capacity: usize) -> (Arc<EventBus>, Arc<LocalEventTransport>, CancellationToken) {
        let transport = Arc::new(LocalEventTransport::default());
        let bus = Arc::new(EventBus::new(transport.clone(), capacity));
        let cancel = CancellationToken::new();
        bus.start(cancel.clone());
        (bus, transport, cancel)
    }

    async fn next(sub: &mut Subscription) -> Option<ChannelEvent> {
        timeout(Duration::from_secs(1), sub.recv()).await.ok().flatten()
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber_of_the_channel() {
        let (bus, _, _cancel) = started_bus(8);
        let mut a = bus.subscribe("lobby");
        let mut b = bus.subscribe("lobby");
        let mut other = bus.subscribe("kitchen");

        bus.publish("lobby", ChannelEvent::Created { id: 7 }).await.unwrap();

        assert_eq!(next(&mut a).await, Some(ChannelEvent::Created { id: 7 }));
        assert_eq!(next(&mut b).await, Some(ChannelEvent::Created { id: 7 }));
        assert!(timeout(Duration::from_millis(100), other.recv()).await.is_err());
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters() {
        let (bus, _, _cancel) = started_bus(8);
        let a = bus.subscribe("lobby");
        let b = bus.subscribe("lobby");
        assert_eq!(bus.subscriber_count("lobby"), 2);
        drop(a);
        assert_eq!(bus.subscriber_count("lobby"), 1);
        drop(b);
        assert_eq!(bus.subscriber_count("lobby"), 0);
    }

    #[tokio::test]
    async fn full_queue_drops_events() {
        let (bus, _, _cancel) = started_bus(1);
        let mut slow = bus.subscribe("lobby");

        for id in 0..5 {
            bus.publish("lobby", ChannelEvent::Downloaded { id }).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(next(&mut slow).await, Some(ChannelEvent::Downloaded { id: 0 }));
        assert!(timeout(Duration::from_millis(100), slow.recv()).await.is_err());
    }

    #[tokio::test]
    async fn undecodable_payloads_are_skipped() {
        let (bus, transport, _cancel) = started_bus(8);
        let mut sub = bus.subscribe("lobby");

        transport.publish("not json".to_string()).await.unwrap();
        transport
            .publish(r#"{"channel":"lobby","event":"unknown"}"#.to_string())
            .await
            .unwrap();
        bus.publish("lobby", ChannelEvent::SkipCurrentPlaylistItemRequested)
            .await
            .unwrap();

        assert_eq!(
            next(&mut sub).await,
            Some(ChannelEvent::SkipCurrentPlaylistItemRequested)
        );
    }

    #[tokio::test]
    async fn stops_on_cancellation() {
        let transport = Arc::new(LocalEventTransport::default());
        let bus = Arc::new(EventBus::new(transport, 8));
        let cancel = CancellationToken::new();
        let handle = bus.start(cancel.clone());
        cancel.cancel();
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
