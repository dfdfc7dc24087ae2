//! Tag-driven pairing.
//!
//! [`PairingOrchestrator`] ties a [`TagTransport`] to a
//! [`PeripheralCoordinator`]: it reads a tag, remembers the pairing key and
//! application value stored on it, and scans for the peripheral advertising
//! the same key. It also writes the current key and value back to a tag.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tagpair_types::{ManagerState, ServiceFilter, TagRecord};

use crate::coordinator::{ConnectCallback, DiscoveryAction, PeripheralCoordinator};
use crate::error::Result;
use crate::peripheral::PeripheralHandle;
use crate::traits::{RadioTransport, TagTransport};

/// Pairs a tag with the peripheral that advertises the tag's key.
pub struct PairingOrchestrator<T, R, V> {
    tag: T,
    coordinator: PeripheralCoordinator<R>,
    pairing_key: Option<String>,
    value: Option<V>,
}

impl<T, R, V: std::fmt::Debug> std::fmt::Debug for PairingOrchestrator<T, R, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingOrchestrator")
            .field("coordinator", &self.coordinator)
            .field("pairing_key", &self.pairing_key)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

impl<T: TagTransport, R: RadioTransport, V> PairingOrchestrator<T, R, V> {
    /// Create an orchestrator with no key or value.
    pub fn new(tag: T, coordinator: PeripheralCoordinator<R>) -> Self {
        Self {
            tag,
            coordinator,
            pairing_key: None,
            value: None,
        }
    }

    /// Pairing key read from (or to be written to) the tag.
    pub fn pairing_key(&self) -> Option<&str> {
        self.pairing_key.as_deref()
    }

    /// Application value read from (or to be written to) the tag.
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn set_pairing_key(&mut self, key: Option<String>) {
        self.pairing_key = key;
    }

    pub fn set_value(&mut self, value: Option<V>) {
        self.value = value;
    }

    pub fn tag(&self) -> &T {
        &self.tag
    }

    pub fn coordinator(&self) -> &PeripheralCoordinator<R> {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut PeripheralCoordinator<R> {
        &mut self.coordinator
    }

    /// Register a value listener on a connected peripheral.
    pub fn register_value_listener<F>(&mut self, handle: &PeripheralHandle, callback: F) -> Result<()>
    where
        F: Fn(Uuid, Option<&[u8]>) + Send + Sync + 'static,
    {
        self.coordinator.register_value_listener(handle, callback)
    }

    /// Disconnect the connected peripheral, if any, then call `on_done`.
    ///
    /// Disconnect errors are logged; `on_done` runs exactly once either way.
    pub async fn disconnect<F>(&mut self, on_done: F)
    where
        F: FnOnce(),
    {
        match self.coordinator.connected_peripheral().cloned() {
            Some(handle) => {
                if let Err(e) = self.coordinator.disconnect(&handle).await {
                    warn!(peripheral = %handle.id(), error = %e, "Disconnect failed");
                }
            }
            None => debug!("No connected peripheral to disconnect"),
        }
        on_done();
    }
}

impl<T, R, V> PairingOrchestrator<T, R, V>
where
    T: TagTransport,
    R: RadioTransport,
    V: DeserializeOwned,
{
    /// Read a tag and connect to the peripheral advertising its key.
    ///
    /// `on_active` runs once the tag session is active. `on_tag_read` gets the
    /// decoded record, or the error that stopped the flow before any scan.
    /// `on_connect` gets the outcome of the connect to the matching
    /// peripheral, or the error that prevented the scan from starting.
    pub async fn read_and_connect<A, F, C>(
        &mut self,
        service_filter: ServiceFilter,
        on_active: A,
        on_tag_read: F,
        on_connect: C,
    ) where
        A: FnOnce(),
        F: FnOnce(Result<&TagRecord<V>>),
        C: Fn(Result<PeripheralHandle>) + Send + Sync + 'static,
    {
        let (record, key) = match self.read_tag(on_active).await {
            Ok(read) => read,
            Err(e) => {
                warn!(error = %e, "Tag read failed");
                on_tag_read(Err(e));
                return;
            }
        };

        info!(pairing_key = %key, "Tag read");
        on_tag_read(Ok(&record));
        let (_, value) = record.into_parts();
        self.pairing_key = Some(key.clone());
        self.value = value;

        if self.coordinator.manager_state() == ManagerState::Scanning {
            debug!("Restarting scan for new pairing key");
            if let Err(e) = self.coordinator.stop_scan().await {
                warn!(error = %e, "Failed to stop running scan");
                on_connect(Err(e));
                return;
            }
        }

        let on_connect: ConnectCallback = Arc::new(on_connect);
        let on_result = Arc::clone(&on_connect);
        let filter = service_filter.clone();
        let scan = self
            .coordinator
            .start_scan(service_filter, move |_handle, _advertised| {
                DiscoveryAction::MatchAndConnect {
                    expected_key: key.clone(),
                    service_filter: filter.clone(),
                    on_result: Arc::clone(&on_result),
                }
            })
            .await;

        if let Err(e) = scan {
            warn!(error = %e, "Failed to start scan");
            on_connect(Err(e));
        }
    }

    async fn read_tag<A: FnOnce()>(&self, on_active: A) -> Result<(TagRecord<V>, String)> {
        self.tag.activate_session().await?;
        on_active();

        let payload = self.tag.detect().await?;
        debug!(bytes = payload.len(), "Tag detected");

        let record: TagRecord<V> = tagpair_types::decode(&payload)?;
        let key = record.require_pairing_key()?.to_string();
        Ok((record, key))
    }
}

impl<T, R, V> PairingOrchestrator<T, R, V>
where
    T: TagTransport,
    R: RadioTransport,
    V: Serialize + Clone,
{
    /// Write the current key and value to a tag.
    ///
    /// `on_active` runs once the tag session is active. `on_write` gets the
    /// record that was written, or the error that prevented the write.
    pub async fn write<A, F>(&mut self, on_active: A, on_write: F)
    where
        A: FnOnce(),
        F: FnOnce(Result<TagRecord<V>>),
    {
        match self.write_tag(on_active).await {
            Ok(record) => {
                info!(pairing_key = ?record.pairing_key(), "Tag written");
                on_write(Ok(record));
            }
            Err(e) => {
                warn!(error = %e, "Tag write failed");
                on_write(Err(e));
            }
        }
    }

    async fn write_tag<A: FnOnce()>(&self, on_active: A) -> Result<TagRecord<V>> {
        self.tag.activate_session().await?;
        on_active();

        let payload = tagpair_types::encode(self.pairing_key.as_deref(), self.value.as_ref())?;
        self.tag.write(&payload).await?;
        Ok(TagRecord::new(self.pairing_key.clone(), self.value.clone()))
    }
}
