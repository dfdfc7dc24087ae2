//! Coordinator status events.
//!
//! The coordinator publishes every state change on a broadcast channel so
//! that status observers (a UI, a log sink) can follow the pairing flow
//! without holding a reference into the registry.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use tagpair_types::{ConnectionState, ManagerState, PeripheralId};

/// Events published by the coordinator.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum CoordinatorEvent {
    /// The scanner/connector changed state.
    ManagerStateChanged {
        from: ManagerState,
        to: ManagerState,
    },
    /// A peripheral advertising a pairing key was discovered.
    PeripheralDiscovered {
        id: PeripheralId,
        name: Option<String>,
        pairing_key: String,
    },
    /// A peripheral changed connection state.
    PeripheralStateChanged {
        id: PeripheralId,
        from: ConnectionState,
        to: ConnectionState,
    },
    /// A transport event arrived out of order and was dropped.
    EventRejected {
        id: Option<PeripheralId>,
        state: Option<ConnectionState>,
        event: String,
    },
}

/// Sender for coordinator events.
pub type EventSender = broadcast::Sender<CoordinatorEvent>;

/// Receiver for coordinator events.
pub type EventReceiver = broadcast::Receiver<CoordinatorEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: CoordinatorEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_to_subscribers() {
        let dispatcher = EventDispatcher::new(8);
        let mut rx = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 1);

        dispatcher.send(CoordinatorEvent::ManagerStateChanged {
            from: ManagerState::Unavailable,
            to: ManagerState::Ready,
        });

        assert_eq!(
            rx.try_recv().unwrap(),
            CoordinatorEvent::ManagerStateChanged {
                from: ManagerState::Unavailable,
                to: ManagerState::Ready,
            }
        );
    }

    #[test]
    fn test_send_without_receivers() {
        let dispatcher = EventDispatcher::default();
        dispatcher.send(CoordinatorEvent::EventRejected {
            id: None,
            state: None,
            event: "Connected".to_string(),
        });
        assert_eq!(dispatcher.receiver_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoordinatorEvent::PeripheralStateChanged {
            id: PeripheralId::from("p-1"),
            from: ConnectionState::Connecting,
            to: ConnectionState::Connected,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"peripheral_state_changed\""));
        assert!(json.contains("\"to\":\"connected\""));
    }
}
