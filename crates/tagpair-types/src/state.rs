//! Lifecycle state models.
//!
//! [`ConnectionState`] tracks a single peripheral; [`ManagerState`] tracks the
//! scanner/connector as a whole. Both carry their transition tables so that
//! callers can reject out-of-order transport events before acting on them.

use serde::{Deserialize, Serialize};

/// Connection lifecycle of a single peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Known but never seen advertising (e.g. registered by an explicit connect).
    #[default]
    Unavailable,
    /// Seen advertising and available for a connection attempt.
    Ready,
    /// A transport connect request is in flight.
    Connecting,
    /// Link established; service discovery not started yet.
    Connected,
    /// Service discovery in flight.
    DiscoveringServices,
    /// Matching services found; subscribing to their characteristics.
    DiscoveringCharacteristics,
    /// At least one characteristic value has been received.
    ReadyForNotifications,
    /// A transport disconnect request is in flight.
    Disconnecting,
    /// Link closed.
    Disconnected,
    /// The last connect attempt failed.
    FailedToConnect,
}

impl ConnectionState {
    /// Whether a link to the peripheral is up (any post-connect state).
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            Self::Connected
                | Self::DiscoveringServices
                | Self::DiscoveringCharacteristics
                | Self::ReadyForNotifications
        )
    }

    /// Whether a connect attempt may start from this state.
    pub fn can_connect(self) -> bool {
        matches!(
            self,
            Self::Unavailable | Self::Ready | Self::Disconnected | Self::FailedToConnect
        )
    }

    /// Whether a discovery event may (re)enter [`ConnectionState::Ready`] from this state.
    pub fn accepts_discovery(self) -> bool {
        matches!(
            self,
            Self::Unavailable | Self::Ready | Self::Disconnected | Self::FailedToConnect
        )
    }

    /// Check whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (from, Ready) => from.accepts_discovery(),
            (from, Connecting) => from.can_connect(),
            (Connecting, Connected | FailedToConnect) => true,
            (Connected, DiscoveringServices) => true,
            (DiscoveringServices, DiscoveringCharacteristics) => true,
            (DiscoveringCharacteristics, ReadyForNotifications) => true,
            (from, Disconnecting) => from.is_connected(),
            (from, Disconnected) => from.is_connected() || from == Disconnecting,
            _ => false,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unavailable => "unavailable",
            Self::Ready => "ready",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::DiscoveringServices => "discovering services",
            Self::DiscoveringCharacteristics => "discovering characteristics",
            Self::ReadyForNotifications => "ready for notifications",
            Self::Disconnecting => "disconnecting",
            Self::Disconnected => "disconnected",
            Self::FailedToConnect => "failed to connect",
        };
        f.write_str(name)
    }
}

/// State of the scanner/connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    /// The radio is powered off or otherwise unusable.
    #[default]
    Unavailable,
    /// The radio is usable and idle.
    Ready,
    /// A scan is running.
    Scanning,
}

impl ManagerState {
    /// Check whether `next` is a legal successor of `self`.
    ///
    /// Power loss may interrupt any state; everything else follows
    /// `Unavailable -> Ready -> Scanning -> Ready`.
    pub fn can_transition_to(self, next: ManagerState) -> bool {
        matches!(
            (self, next),
            (_, Self::Unavailable)
                | (Self::Unavailable, Self::Ready)
                | (Self::Ready, Self::Scanning)
                | (Self::Scanning, Self::Ready)
        )
    }
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::Ready => write!(f, "ready"),
            Self::Scanning => write!(f, "scanning"),
        }
    }
}
