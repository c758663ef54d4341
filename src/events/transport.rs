use crate::error::JukeboxResult;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

/// Publish/subscribe fabric carrying serialized [`super::WireEvent`]s.
///
/// Delivery is best effort: no replay, no ordering across channels.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn publish(&self, payload: String) -> JukeboxResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<String>;
}

/// In-process transport backed by a tokio broadcast channel.
pub struct LocalEventTransport {
    sender: broadcast::Sender<String>,
}

impl LocalEventTransport {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        LocalEventTransport { sender }
    }
}

impl Default for LocalEventTransport {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventTransport for LocalEventTransport {
    async fn publish(&self, payload: String) -> JukeboxResult<()> {
        if self.sender.send(payload).is_err() {
            debug!("Event published with no subscriber");
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}
