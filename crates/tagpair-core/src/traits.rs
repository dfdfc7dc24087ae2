//! Transport abstractions.
//!
//! The pairing core never talks to hardware directly. It consumes two
//! collaborators through the traits in this module:
//!
//! - [`TagTransport`]: activates a proximity session, detects a tag and
//!   returns its raw payload, writes a payload to a tag.
//! - [`RadioTransport`]: issues scan/connect/discovery requests. Requests
//!   return as soon as they are issued; their outcomes, along with
//!   unsolicited notifications (power changes, advertisements, value
//!   updates), arrive later as [`RadioEvent`]s on the receiver returned by
//!   [`RadioTransport::subscribe_events`].
//!
//! Implementations: [`crate::mock::MockRadio`] and [`crate::mock::MockTag`]
//! for tests, [`crate::btle::BtleplugRadio`] and [`crate::tag::FileTag`] for
//! real use.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use tagpair_types::{PeripheralId, ServiceFilter};

use crate::error::{ConnectionFailureReason, Result};

/// Power/availability signal reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioState {
    /// The radio is powered on and usable.
    Ready,
    /// The radio is powered off, missing or unauthorized.
    Unavailable,
}

/// A service found during service discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredService {
    /// Service UUID.
    pub uuid: Uuid,
    /// UUIDs of the service's characteristics.
    pub characteristics: Vec<Uuid>,
}

impl DiscoveredService {
    /// Create a discovered service entry.
    pub fn new(uuid: Uuid, characteristics: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            uuid,
            characteristics: characteristics.into_iter().collect(),
        }
    }
}

/// Events delivered by a radio transport.
///
/// Delivery is serialized: the coordinator handles one event to completion
/// before taking the next.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RadioEvent {
    /// The radio's power/availability changed.
    StateChanged(RadioState),
    /// A peripheral advertisement was seen during a scan.
    Discovered {
        id: PeripheralId,
        name: Option<String>,
        pairing_key: Option<String>,
    },
    /// A connect request completed.
    Connected { id: PeripheralId },
    /// A connect request failed.
    ConnectFailed {
        id: PeripheralId,
        reason: ConnectionFailureReason,
    },
    /// The link to a peripheral closed (requested or remote).
    Disconnected { id: PeripheralId },
    /// Service discovery completed.
    ServicesDiscovered {
        id: PeripheralId,
        services: Vec<DiscoveredService>,
    },
    /// Service discovery failed.
    ServiceDiscoveryFailed { id: PeripheralId, reason: String },
    /// A characteristic value was read or notified.
    ValueUpdated {
        id: PeripheralId,
        characteristic: Uuid,
        data: Option<Vec<u8>>,
    },
}

impl RadioEvent {
    /// The peripheral this event concerns, if any.
    pub fn peripheral(&self) -> Option<&PeripheralId> {
        match self {
            Self::StateChanged(_) => None,
            Self::Discovered { id, .. }
            | Self::Connected { id }
            | Self::ConnectFailed { id, .. }
            | Self::Disconnected { id }
            | Self::ServicesDiscovered { id, .. }
            | Self::ServiceDiscoveryFailed { id, .. }
            | Self::ValueUpdated { id, .. } => Some(id),
        }
    }
}

/// Sender half of a radio event subscription.
pub type RadioEventSender = mpsc::UnboundedSender<RadioEvent>;

/// Receiver half of a radio event subscription.
pub type RadioEventReceiver = mpsc::UnboundedReceiver<RadioEvent>;

/// Radio (BLE central) collaborator.
///
/// Every request method returns once the request has been issued. An `Err`
/// means the request could not be issued at all; the outcome of an issued
/// request is reported as a [`RadioEvent`].
#[async_trait]
pub trait RadioTransport: Send + Sync {
    /// Open the event subscription.
    ///
    /// A transport has at most one live subscription; subscribing again
    /// replaces the previous one.
    fn subscribe_events(&self) -> RadioEventReceiver;

    /// Close the event subscription.
    fn unsubscribe_events(&self);

    /// Start scanning, restricted to `filter` when it is non-empty.
    ///
    /// Duplicate advertisement filtering is the transport's responsibility.
    async fn start_scan(&self, filter: &ServiceFilter) -> Result<()>;

    /// Stop scanning.
    async fn stop_scan(&self) -> Result<()>;

    /// Request a connection. Reports `Connected` or `ConnectFailed`.
    async fn connect(&self, id: &PeripheralId) -> Result<()>;

    /// Request a disconnection. Reports `Disconnected`.
    async fn disconnect(&self, id: &PeripheralId) -> Result<()>;

    /// Request service discovery. Reports `ServicesDiscovered` or
    /// `ServiceDiscoveryFailed`.
    async fn discover_services(&self, id: &PeripheralId, filter: &ServiceFilter) -> Result<()>;

    /// Subscribe to value updates of one characteristic. Reports `ValueUpdated`.
    async fn subscribe(&self, id: &PeripheralId, characteristic: Uuid) -> Result<()>;
}

/// Tag (proximity) collaborator.
#[async_trait]
pub trait TagTransport: Send + Sync {
    /// Activate a proximity session. Returns once the session is active.
    async fn activate_session(&self) -> Result<()>;

    /// Wait for a tag and return its raw record payload.
    async fn detect(&self) -> Result<Vec<u8>>;

    /// Write a payload to the tag in range.
    async fn write(&self, payload: &[u8]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_peripheral() {
        let id = PeripheralId::from("p-1");
        let event = RadioEvent::Connected { id: id.clone() };
        assert_eq!(event.peripheral(), Some(&id));

        let event = RadioEvent::StateChanged(RadioState::Ready);
        assert_eq!(event.peripheral(), None);
    }

    #[test]
    fn test_discovered_service() {
        let service = DiscoveredService::new(Uuid::from_u128(1), [Uuid::from_u128(2)]);
        assert_eq!(service.characteristics, vec![Uuid::from_u128(2)]);
    }
}
