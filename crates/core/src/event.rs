//! Domain event system — narration of what the worker is doing.
//!
//! Events are published when the worker changes state or something notable
//! happens in the game. The console subscribes and prints them; nothing in the
//! worker depends on anyone listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::control::Behavior;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BotEvent {
    /// The loop driver started running a behavior
    BehaviorStarted {
        behavior: Behavior,
        timestamp: DateTime<Utc>,
    },

    /// The loop driver went back to idle
    BehaviorStopped {
        behavior: Behavior,
        iterations: u64,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A behavior iteration failed and was written to the crash log
    IterationFailed {
        behavior: Behavior,
        iteration: u64,
        error_message: String,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A combat episode finished
    CombatConcluded {
        kills: u32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A quest target was killed
    QuestKill {
        target: String,
        remaining: u32,
        timestamp: DateTime<Utc>,
    },

    /// The navigator reached its destination
    Arrived {
        location: String,
        timestamp: DateTime<Utc>,
    },

    /// Something was added to the loot tally
    LootGained {
        description: String,
        timestamp: DateTime<Utc>,
    },

    /// The worker is shutting down
    WorkerStopped {
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<BotEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: BotEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BotEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(BotEvent::Arrived {
            location: "Redmond_Hotel".into(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            BotEvent::Arrived { location, .. } => assert_eq!(location, "Redmond_Hotel"),
            _ => panic!("Expected Arrived event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(BotEvent::WorkerStopped {
            reason: "test".into(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn events_serialize_with_behavior_names() {
        let event = BotEvent::BehaviorStarted {
            behavior: Behavior::GetBacon,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("get_bacon"));
    }
}
