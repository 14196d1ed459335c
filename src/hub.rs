//! Notification hub
//!
//! Per-topic publish/subscribe fan-out for outcome delivery. Topics are
//! payment hashes (single-bet flow) or session ids (multiplayer flow).
//! Delivery is live-only: an event published with no subscribers on the
//! topic is dropped, and a late subscriber sees nothing from before it
//! attached. Events on one topic reach each subscriber in publish order.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Default per-topic event buffer.
const DEFAULT_EVENT_BUFFER: usize = 256;

/// Push events delivered to topic subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    /// A payment for this topic confirmed.
    Paid { amount_sats: u64 },
    /// The identified participant won, with the amount paid out.
    Won {
        participant_id: String,
        payout_sats: u64,
    },
    /// The identified participant lost.
    Lost { participant_id: String },
    /// The identified participant was refunded (straggler or abandoned
    /// round), with the amount returned and why.
    Refund {
        participant_id: String,
        payout_sats: u64,
        reason: String,
    },
}

impl GameEvent {
    /// Event tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::Paid { .. } => "paid",
            GameEvent::Won { .. } => "won",
            GameEvent::Lost { .. } => "lost",
            GameEvent::Refund { .. } => "refund",
        }
    }
}

/// Fan-out hub. One broadcast channel per live topic; channels are created
/// on first subscribe and reaped once the last subscriber is gone.
pub struct NotificationHub {
    topics: DashMap<String, broadcast::Sender<GameEvent>>,
    buffer: usize,
    published: AtomicU64,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_EVENT_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            topics: DashMap::new(),
            buffer,
            published: AtomicU64::new(0),
        }
    }

    /// Attach a subscriber to a topic. Events published from this point on
    /// are delivered in order; nothing earlier is replayed.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<GameEvent> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe()
    }

    /// Publish an event to all current subscribers of a topic. Returns the
    /// number of subscribers it reached; zero means the event was dropped.
    pub fn publish(&self, topic: &str, event: GameEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let delivered = match self.topics.get(topic) {
            Some(entry) => entry.value().send(event).unwrap_or(0),
            None => 0,
        };
        if delivered == 0 {
            // Reap the channel if every receiver has gone away.
            self.topics.remove_if(topic, |_, tx| tx.receiver_count() == 0);
        }
        delivered
    }

    /// Current subscriber count for a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|entry| entry.value().receiver_count())
            .unwrap_or(0)
    }

    /// Number of live topics (channels with at least one subscriber, plus
    /// any not yet reaped).
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Lifetime count of events published, delivered or not.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paid(amount: u64) -> GameEvent {
        GameEvent::Paid { amount_sats: amount }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let hub = NotificationHub::new();
        assert_eq!(hub.publish("hash-1", paid(100)), 0);
        assert_eq!(hub.published_count(), 1);

        // A subscriber attaching after the fact sees nothing.
        let mut rx = hub.subscribe("hash-1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let hub = NotificationHub::new();
        let mut a = hub.subscribe("session-1");
        let mut b = hub.subscribe("session-1");

        assert_eq!(hub.publish("session-1", paid(21)), 2);
        assert_eq!(a.recv().await.unwrap(), paid(21));
        assert_eq!(b.recv().await.unwrap(), paid(21));
    }

    #[tokio::test]
    async fn test_per_topic_ordering() {
        let hub = NotificationHub::new();
        let mut rx = hub.subscribe("s");

        hub.publish("s", paid(1));
        hub.publish(
            "s",
            GameEvent::Lost {
                participant_id: "p1".into(),
            },
        );
        hub.publish(
            "s",
            GameEvent::Won {
                participant_id: "p2".into(),
                payout_sats: 1_940,
            },
        );

        assert_eq!(rx.recv().await.unwrap().kind(), "paid");
        assert_eq!(rx.recv().await.unwrap().kind(), "lost");
        assert_eq!(rx.recv().await.unwrap().kind(), "won");
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let hub = NotificationHub::new();
        let mut a = hub.subscribe("a");
        let _b = hub.subscribe("b");

        hub.publish("b", paid(5));
        assert!(a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_topic_is_reaped() {
        let hub = NotificationHub::new();
        let rx = hub.subscribe("gone");
        assert_eq!(hub.topic_count(), 1);

        drop(rx);
        hub.publish("gone", paid(1));
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn test_event_serializes_tagged() {
        let json = serde_json::to_string(&paid(42)).unwrap();
        assert!(json.contains("\"type\":\"paid\""));
        assert!(json.contains("\"amount_sats\":42"));
    }
}
