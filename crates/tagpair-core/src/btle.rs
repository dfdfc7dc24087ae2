//! btleplug-backed radio transport.
//!
//! [`BtleplugRadio`] drives the first Bluetooth adapter found on the host.
//! Requests are issued on spawned tasks and report back as [`RadioEvent`]s on
//! the subscription opened by [`RadioTransport::subscribe_events`], which must
//! be called from within a Tokio runtime.
//!
//! Peripherals are identified by the platform id formatted as a string (a MAC
//! address on Linux and Windows, a CoreBluetooth UUID on macOS).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, CharPropFlags, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tagpair_types::{PeripheralId, ServiceFilter};

use crate::advertisement::extract_pairing_key;
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::traits::{
    DiscoveredService, RadioEvent, RadioEventReceiver, RadioEventSender, RadioState,
    RadioTransport,
};

type PlatformId = btleplug::platform::PeripheralId;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Format a platform peripheral id as a [`PeripheralId`].
///
/// Strips the `PeripheralId(...)` wrapper from the debug representation.
pub fn format_peripheral_id(id: &PlatformId) -> PeripheralId {
    PeripheralId::new(
        format!("{:?}", id)
            .trim_start_matches("PeripheralId(")
            .trim_end_matches(')'),
    )
}

/// Timeouts for [`BtleplugRadio`].
#[derive(Debug, Clone)]
pub struct BtleplugConfig {
    /// Bound on a single connect attempt. Expiry reports `ConnectFailed`.
    pub connect_timeout: Duration,
    /// Bound on service discovery.
    pub discovery_timeout: Duration,
    /// Bound on the initial read of a subscribed characteristic.
    pub read_timeout: Duration,
}

impl Default for BtleplugConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            discovery_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(5),
        }
    }
}

impl BtleplugConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Validate the config.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("discovery_timeout", self.discovery_timeout),
            ("read_timeout", self.read_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::invalid_config(format!("{} must be > 0", name)));
            }
        }
        Ok(())
    }
}

struct Inner {
    adapter: Adapter,
    config: BtleplugConfig,
    sender: Mutex<Option<RadioEventSender>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    ids: Mutex<HashMap<PeripheralId, PlatformId>>,
    advertised: Mutex<HashMap<PeripheralId, (Option<String>, Option<String>)>>,
    notifications: Mutex<HashMap<PeripheralId, JoinHandle<()>>>,
}

impl Inner {
    fn emit(&self, event: RadioEvent) -> bool {
        match lock(&self.sender).as_ref() {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    fn track(&self, platform_id: &PlatformId) -> PeripheralId {
        let id = format_peripheral_id(platform_id);
        lock(&self.ids)
            .entry(id.clone())
            .or_insert_with(|| platform_id.clone());
        id
    }

    async fn peripheral(&self, id: &PeripheralId) -> Result<Peripheral> {
        let platform_id = lock(&self.ids)
            .get(id)
            .cloned()
            .ok_or_else(|| Error::PeripheralNotFound(id.clone()))?;
        Ok(self.adapter.peripheral(&platform_id).await?)
    }

    /// Build a discovery event, or `None` if nothing changed since the last one.
    async fn advertisement(&self, platform_id: &PlatformId) -> Option<RadioEvent> {
        let peripheral = self.adapter.peripheral(platform_id).await.ok()?;
        let properties = peripheral.properties().await.ok().flatten()?;
        let pairing_key = extract_pairing_key(&properties.service_data);
        let id = self.track(platform_id);

        let entry = (properties.local_name.clone(), pairing_key.clone());
        if lock(&self.advertised).insert(id.clone(), entry.clone()) == Some(entry) {
            return None;
        }

        Some(RadioEvent::Discovered {
            id,
            name: properties.local_name,
            pairing_key,
        })
    }

    async fn ensure_notifications(self: &Arc<Self>, id: &PeripheralId, peripheral: &Peripheral) {
        if lock(&self.notifications)
            .get(id)
            .is_some_and(|task| !task.is_finished())
        {
            return;
        }

        let mut stream = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(peripheral = %id, error = %e, "Failed to open notification stream");
                return;
            }
        };

        let inner = Arc::clone(self);
        let peripheral_id = id.clone();
        let task = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                let event = RadioEvent::ValueUpdated {
                    id: peripheral_id.clone(),
                    characteristic: notification.uuid,
                    data: Some(notification.value),
                };
                if !inner.emit(event) {
                    break;
                }
            }
            debug!(peripheral = %peripheral_id, "Notification stream ended");
        });

        let mut tasks = lock(&self.notifications);
        match tasks.get(id) {
            Some(existing) if !existing.is_finished() => task.abort(),
            _ => {
                tasks.insert(id.clone(), task);
            }
        }
    }

    fn stop_notifications(&self, id: &PeripheralId) {
        if let Some(task) = lock(&self.notifications).remove(id) {
            task.abort();
        }
    }
}

async fn pump_events(inner: Arc<Inner>, sender: RadioEventSender) {
    let mut events = match inner.adapter.events().await {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "Failed to open adapter event stream");
            let _ = sender.send(RadioEvent::StateChanged(RadioState::Unavailable));
            return;
        }
    };

    if sender
        .send(RadioEvent::StateChanged(RadioState::Ready))
        .is_err()
    {
        return;
    }
    info!("Adapter event stream open");

    while let Some(event) = events.next().await {
        let event = match event {
            CentralEvent::DeviceDiscovered(id)
            | CentralEvent::DeviceUpdated(id)
            | CentralEvent::ServiceDataAdvertisement { id, .. } => inner.advertisement(&id).await,
            CentralEvent::DeviceDisconnected(id) => {
                let id = inner.track(&id);
                inner.stop_notifications(&id);
                Some(RadioEvent::Disconnected { id })
            }
            _ => None,
        };

        if let Some(event) = event
            && sender.send(event).is_err()
        {
            debug!("Radio event subscriber gone");
            return;
        }
    }

    warn!("Adapter event stream ended");
    let _ = sender.send(RadioEvent::StateChanged(RadioState::Unavailable));
}

/// Radio transport backed by a btleplug adapter.
#[derive(Clone)]
pub struct BtleplugRadio {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BtleplugRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugRadio")
            .field("config", &self.inner.config)
            .field("known_peripherals", &lock(&self.inner.ids).len())
            .finish_non_exhaustive()
    }
}

impl BtleplugRadio {
    /// Use the first Bluetooth adapter with default timeouts.
    pub async fn new() -> Result<Self> {
        Self::with_config(BtleplugConfig::default()).await
    }

    /// Use the first Bluetooth adapter.
    pub async fn with_config(config: BtleplugConfig) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::radio_transport("No Bluetooth adapter found"))?;
        Self::from_adapter(adapter, config)
    }

    /// Use a specific adapter.
    pub fn from_adapter(adapter: Adapter, config: BtleplugConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                adapter,
                config,
                sender: Mutex::new(None),
                pump: Mutex::new(None),
                ids: Mutex::new(HashMap::new()),
                advertised: Mutex::new(HashMap::new()),
                notifications: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &BtleplugConfig {
        &self.inner.config
    }

    pub fn adapter(&self) -> &Adapter {
        &self.inner.adapter
    }
}

#[async_trait]
impl RadioTransport for BtleplugRadio {
    fn subscribe_events(&self) -> RadioEventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.inner.sender) = Some(tx.clone());

        let task = tokio::spawn(pump_events(Arc::clone(&self.inner), tx));
        if let Some(previous) = lock(&self.inner.pump).replace(task) {
            previous.abort();
        }
        rx
    }

    fn unsubscribe_events(&self) {
        lock(&self.inner.sender).take();
        if let Some(pump) = lock(&self.inner.pump).take() {
            pump.abort();
        }
        for (_, task) in lock(&self.inner.notifications).drain() {
            task.abort();
        }
    }

    async fn start_scan(&self, filter: &ServiceFilter) -> Result<()> {
        lock(&self.inner.advertised).clear();
        let scan_filter = ScanFilter {
            services: filter.iter().copied().collect(),
        };
        self.inner.adapter.start_scan(scan_filter).await?;
        debug!(services = filter.len(), "Adapter scan started");
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.inner.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        let peripheral = self.inner.peripheral(id).await?;
        let inner = Arc::clone(&self.inner);
        let id = id.clone();

        tokio::spawn(async move {
            let event = match timeout(inner.config.connect_timeout, peripheral.connect()).await {
                Ok(Ok(())) => RadioEvent::Connected { id },
                Ok(Err(e)) => RadioEvent::ConnectFailed {
                    id,
                    reason: ConnectionFailureReason::BleError(e.to_string()),
                },
                Err(_) => {
                    if let Err(e) = peripheral.disconnect().await {
                        debug!(error = %e, "Cleanup after connect timeout failed");
                    }
                    RadioEvent::ConnectFailed {
                        id,
                        reason: ConnectionFailureReason::Timeout,
                    }
                }
            };
            inner.emit(event);
        });
        Ok(())
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<()> {
        self.inner.stop_notifications(id);
        let peripheral = self.inner.peripheral(id).await?;
        peripheral.disconnect().await?;
        self.inner.emit(RadioEvent::Disconnected { id: id.clone() });
        Ok(())
    }

    async fn discover_services(&self, id: &PeripheralId, filter: &ServiceFilter) -> Result<()> {
        let peripheral = self.inner.peripheral(id).await?;
        let inner = Arc::clone(&self.inner);
        let id = id.clone();
        debug!(peripheral = %id, services = filter.len(), "Discovering services");

        tokio::spawn(async move {
            let event = match timeout(inner.config.discovery_timeout, peripheral.discover_services())
                .await
            {
                Ok(Ok(())) => RadioEvent::ServicesDiscovered {
                    id,
                    services: peripheral
                        .services()
                        .into_iter()
                        .map(|service| {
                            DiscoveredService::new(
                                service.uuid,
                                service.characteristics.iter().map(|c| c.uuid),
                            )
                        })
                        .collect(),
                },
                Ok(Err(e)) => RadioEvent::ServiceDiscoveryFailed {
                    id,
                    reason: e.to_string(),
                },
                Err(_) => RadioEvent::ServiceDiscoveryFailed {
                    id,
                    reason: format!("timed out after {:?}", inner.config.discovery_timeout),
                },
            };
            inner.emit(event);
        });
        Ok(())
    }

    async fn subscribe(&self, id: &PeripheralId, characteristic: Uuid) -> Result<()> {
        let peripheral = self.inner.peripheral(id).await?;
        let target = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or_else(|| {
                Error::radio_transport(format!("Characteristic {} not found", characteristic))
            })?;
        let inner = Arc::clone(&self.inner);
        let id = id.clone();

        tokio::spawn(async move {
            let mut subscribed = false;
            if target
                .properties
                .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE)
            {
                match peripheral.subscribe(&target).await {
                    Ok(()) => {
                        inner.ensure_notifications(&id, &peripheral).await;
                        subscribed = true;
                    }
                    Err(e) => warn!(peripheral = %id, %characteristic, error = %e, "Subscribe failed"),
                }
            }

            if target.properties.contains(CharPropFlags::READ) {
                let data = match timeout(inner.config.read_timeout, peripheral.read(&target)).await {
                    Ok(Ok(data)) => Some(data),
                    Ok(Err(e)) => {
                        warn!(peripheral = %id, %characteristic, error = %e, "Read failed");
                        None
                    }
                    Err(_) => {
                        warn!(peripheral = %id, %characteristic, "Read timed out");
                        None
                    }
                };
                inner.emit(RadioEvent::ValueUpdated {
                    id,
                    characteristic,
                    data,
                });
            } else if !subscribed {
                inner.emit(RadioEvent::ValueUpdated {
                    id,
                    characteristic,
                    data: None,
                });
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = BtleplugConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_timeouts() {
        let config = BtleplugConfig::new().connect_timeout(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("connect_timeout"));

        let config = BtleplugConfig::new().read_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = BtleplugConfig::new()
            .connect_timeout(Duration::from_secs(30))
            .discovery_timeout(Duration::from_secs(20))
            .read_timeout(Duration::from_secs(2));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.discovery_timeout, Duration::from_secs(20));
        assert_eq!(config.read_timeout, Duration::from_secs(2));
    }
}
