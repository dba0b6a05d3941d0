//! Event types and broadcast bus
//!
//! Events are emitted by the ingestion pipeline and forwarded to SSE clients.
//! Addresses and address hashes never appear in events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted by Rollcall services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RollcallEvent {
    /// An ingestion cycle began
    IngestCycleStarted {
        cycle_id: Uuid,
        providers: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// One provider finished its share of a cycle
    ProviderBatchCompleted {
        provider: String,
        records: usize,
        skipped: usize,
        has_more: bool,
        timestamp: DateTime<Utc>,
    },

    /// An ingestion cycle finished
    IngestCycleCompleted {
        cycle_id: Uuid,
        records: usize,
        skipped: usize,
        reconciled: usize,
        pending_reviews: usize,
        timestamp: DateTime<Utc>,
    },

    /// Provider crossed the failure threshold and is excluded from scoring
    ProviderDegraded {
        provider: String,
        consecutive_failures: u32,
        timestamp: DateTime<Utc>,
    },

    /// Degraded provider answered successfully again
    ProviderRecovered {
        provider: String,
        timestamp: DateTime<Utc>,
    },

    /// A record matched several canonical persons and awaits manual review
    IdentityReviewQueued {
        review_id: Uuid,
        provider: String,
        candidate_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Merged view and score of a canonical person were rewritten
    PersonReconciled {
        canonical_id: Uuid,
        quality_score: u8,
        stale: bool,
        timestamp: DateTime<Utc>,
    },
}

impl RollcallEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            RollcallEvent::IngestCycleStarted { .. } => "IngestCycleStarted",
            RollcallEvent::ProviderBatchCompleted { .. } => "ProviderBatchCompleted",
            RollcallEvent::IngestCycleCompleted { .. } => "IngestCycleCompleted",
            RollcallEvent::ProviderDegraded { .. } => "ProviderDegraded",
            RollcallEvent::ProviderRecovered { .. } => "ProviderRecovered",
            RollcallEvent::IdentityReviewQueued { .. } => "IdentityReviewQueued",
            RollcallEvent::PersonReconciled { .. } => "PersonReconciled",
        }
    }
}

/// Broadcast bus shared by all components of a service
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RollcallEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<RollcallEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: RollcallEvent,
    ) -> Result<usize, broadcast::error::SendError<RollcallEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: RollcallEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        let sent = bus
            .emit(RollcallEvent::ProviderRecovered {
                provider: "openstates".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();
        assert_eq!(sent, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "ProviderRecovered");
    }

    #[test]
    fn test_emit_without_subscribers_fails_but_lossy_does_not_panic() {
        let bus = EventBus::new(4);
        let event = RollcallEvent::ProviderRecovered {
            provider: "x".to_string(),
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 4);
    }

    #[test]
    fn test_serialized_event_carries_type_tag() {
        let event = RollcallEvent::PersonReconciled {
            canonical_id: Uuid::nil(),
            quality_score: 72,
            stale: false,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PersonReconciled");
        assert_eq!(json["quality_score"], 72);
    }
}
