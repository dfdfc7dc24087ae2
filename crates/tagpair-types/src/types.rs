//! Identity and filter types shared by transports and the coordinator.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque platform identity of a peripheral.
///
/// On Linux/Windows this is typically the Bluetooth MAC address; on macOS it
/// is the UUID assigned by CoreBluetooth. Two handles refer to the same
/// peripheral exactly when their identities are equal; display names play no
/// part in identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeripheralId(String);

impl PeripheralId {
    /// Create a peripheral identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeripheralId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Set of service UUIDs used to restrict scans and service discovery.
///
/// An empty filter means "all services".
pub type ServiceFilter = BTreeSet<Uuid>;

/// Whether `service` passes `filter` (an empty filter passes everything).
pub fn filter_allows(filter: &ServiceFilter, service: &Uuid) -> bool {
    filter.is_empty() || filter.contains(service)
}
