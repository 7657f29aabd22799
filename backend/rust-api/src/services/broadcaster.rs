use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::models::SessionEvent;

/// Fan-out of core events to connected clients. Delivery is best effort and
/// never fails the operation that produced the event.
#[async_trait]
pub trait SessionBroadcaster: Send + Sync {
    async fn publish(&self, event: SessionEvent);
}

/// In-process broadcaster backed by a tokio broadcast channel. The SSE
/// handler subscribes to it.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl SessionBroadcaster for ChannelBroadcaster {
    async fn publish(&self, event: SessionEvent) {
        let name = event.event_name();
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!("Published {} to {} subscribers", name, receivers),
            Err(_) => tracing::trace!("Dropped {}: no subscribers", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let broadcaster = ChannelBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        broadcaster
            .publish(SessionEvent::LeaderboardUpdated {
                session_id: "s1".into(),
                ranking: Vec::new(),
            })
            .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_name(), "leaderboard.updated");
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_silent() {
        let broadcaster = ChannelBroadcaster::new(1);
        broadcaster
            .publish(SessionEvent::LeaderboardUpdated {
                session_id: "s1".into(),
                ranking: Vec::new(),
            })
            .await;
    }
}
