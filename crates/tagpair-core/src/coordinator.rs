//! Scan/connect lifecycle and peripheral registry.
//!
//! [`PeripheralCoordinator`] is the single owner of the manager state, the
//! peripheral registry and the radio event subscription. Requests
//! (`start_scan`, `connect`, ...) are issued through the [`RadioTransport`];
//! their outcomes come back as [`RadioEvent`]s, which the coordinator checks
//! against the current state before acting on them. Events that arrive out of
//! order are dropped and published as [`CoordinatorEvent::EventRejected`].
//!
//! All mutation goes through `&mut self`, so each event is handled to
//! completion before the next one and status queries never observe a handle
//! in the middle of an update. Hosts that share the coordinator between
//! tasks wrap it in a `tokio::sync::Mutex` or run it as a single actor.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tagpair_core::{DiscoveryAction, PeripheralCoordinator, ServiceFilter};
//! use tagpair_core::btle::BtleplugRadio;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> tagpair_core::Result<()> {
//! let radio = BtleplugRadio::new().await?;
//! let mut coordinator = PeripheralCoordinator::new(radio);
//! coordinator.process_next().await; // radio power state
//!
//! let on_result = Arc::new(|result: tagpair_core::Result<tagpair_core::PeripheralHandle>| {
//!     println!("connect: {:?}", result.map(|h| h.id().clone()));
//! });
//! coordinator
//!     .start_scan(ServiceFilter::new(), move |_handle, _key| DiscoveryAction::MatchAndConnect {
//!         expected_key: "c20c8a91".to_string(),
//!         service_filter: ServiceFilter::new(),
//!         on_result: on_result.clone(),
//!     })
//!     .await?;
//!
//! coordinator.run(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use tagpair_types::{ConnectionState, ManagerState, PeripheralId, ServiceFilter, filter_allows};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::events::{CoordinatorEvent, EventDispatcher, EventReceiver};
use crate::peripheral::PeripheralHandle;
use crate::traits::{DiscoveredService, RadioEvent, RadioEventReceiver, RadioState, RadioTransport};

/// Completion callback for [`PeripheralCoordinator::connect`].
pub type ConnectCallback = Arc<dyn Fn(Result<PeripheralHandle>) + Send + Sync>;

/// Discovery callback registered by [`PeripheralCoordinator::start_scan`].
pub type DiscoverCallback = Box<dyn FnMut(&PeripheralHandle, &str) -> DiscoveryAction + Send>;

/// What the coordinator should do after a discovery callback returns.
pub enum DiscoveryAction {
    /// Keep scanning.
    Continue,
    /// Compare the advertised key with `expected_key` and connect on a match.
    MatchAndConnect {
        expected_key: String,
        service_filter: ServiceFilter,
        on_result: ConnectCallback,
    },
}

impl std::fmt::Debug for DiscoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => f.write_str("Continue"),
            Self::MatchAndConnect {
                expected_key,
                service_filter,
                ..
            } => f
                .debug_struct("MatchAndConnect")
                .field("expected_key", expected_key)
                .field("service_filter", service_filter)
                .finish_non_exhaustive(),
        }
    }
}

/// Configuration for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Capacity of the status event broadcast channel.
    pub event_capacity: usize,
    /// Stop scanning as soon as a pairing key matches.
    pub stop_scan_on_match: bool,
    /// Scan filter used when `start_scan` is given an empty filter.
    pub default_service_filter: ServiceFilter,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            event_capacity: 100,
            stop_scan_on_match: true,
            default_service_filter: ServiceFilter::new(),
        }
    }
}

impl CoordinatorConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set whether a key match stops the scan.
    #[must_use]
    pub fn stop_scan_on_match(mut self, stop: bool) -> Self {
        self.stop_scan_on_match = stop;
        self
    }

    /// Set the default scan filter.
    #[must_use]
    pub fn default_service_filter(mut self, filter: ServiceFilter) -> Self {
        self.default_service_filter = filter;
        self
    }

    /// Validate the config.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        Ok(())
    }
}

/// Owner of the scan/connect lifecycle and the peripheral registry.
pub struct PeripheralCoordinator<T> {
    transport: T,
    events: Option<RadioEventReceiver>,
    state: ManagerState,
    registry: HashMap<PeripheralId, PeripheralHandle>,
    pending: HashMap<PeripheralId, ConnectCallback>,
    on_discover: Option<DiscoverCallback>,
    scan_filter: ServiceFilter,
    notifier: EventDispatcher,
    config: CoordinatorConfig,
}

impl<T> std::fmt::Debug for PeripheralCoordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralCoordinator")
            .field("state", &self.state)
            .field("peripherals", &self.registry.len())
            .field("pending_connects", &self.pending.len())
            .field("subscribed", &self.events.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: RadioTransport> PeripheralCoordinator<T> {
    /// Create a coordinator with default configuration and subscribe to the
    /// transport's events.
    ///
    /// The coordinator starts [`ManagerState::Unavailable`] and becomes ready
    /// once the transport reports [`RadioState::Ready`].
    pub fn new(transport: T) -> Self {
        Self::build(transport, CoordinatorConfig::default())
    }

    /// Create a coordinator with custom configuration.
    pub fn with_config(transport: T, config: CoordinatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, config))
    }

    fn build(transport: T, config: CoordinatorConfig) -> Self {
        let events = transport.subscribe_events();
        Self {
            transport,
            events: Some(events),
            state: ManagerState::Unavailable,
            registry: HashMap::new(),
            pending: HashMap::new(),
            on_discover: None,
            scan_filter: ServiceFilter::new(),
            notifier: EventDispatcher::new(config.event_capacity),
            config,
        }
    }

    /// Get the coordinator configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Get the radio transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Subscribe to status events.
    pub fn subscribe(&self) -> EventReceiver {
        self.notifier.subscribe()
    }

    /// Current manager state.
    pub fn manager_state(&self) -> ManagerState {
        self.state
    }

    /// Filter of the running (or last) scan.
    pub fn scan_filter(&self) -> &ServiceFilter {
        &self.scan_filter
    }

    /// Look up a registered peripheral.
    pub fn peripheral(&self, id: &PeripheralId) -> Option<&PeripheralHandle> {
        self.registry.get(id)
    }

    /// Iterate over all registered peripherals.
    pub fn peripherals(&self) -> impl Iterator<Item = &PeripheralHandle> {
        self.registry.values()
    }

    /// Number of registered peripherals.
    pub fn peripheral_count(&self) -> usize {
        self.registry.len()
    }

    /// The connected peripheral, if any.
    pub fn connected_peripheral(&self) -> Option<&PeripheralHandle> {
        self.registry.values().find(|handle| handle.is_connected())
    }

    /// Whether the radio event subscription is still open.
    pub fn is_subscribed(&self) -> bool {
        self.events.is_some()
    }

    // --- Scanning ---

    /// Start scanning for peripherals.
    ///
    /// `on_discover` fires for every discovery event that carries a pairing
    /// key. Calling this while a scan is running is a no-op and the new
    /// callback is dropped.
    pub async fn start_scan<F>(&mut self, service_filter: ServiceFilter, on_discover: F) -> Result<()>
    where
        F: FnMut(&PeripheralHandle, &str) -> DiscoveryAction + Send + 'static,
    {
        match self.state {
            ManagerState::Unavailable => return Err(Error::TransportUnavailable),
            ManagerState::Scanning => {
                debug!("Scan already running, ignoring start_scan");
                return Ok(());
            }
            ManagerState::Ready => {}
        }

        let filter = if service_filter.is_empty() {
            self.config.default_service_filter.clone()
        } else {
            service_filter
        };

        self.transport.start_scan(&filter).await?;

        info!(services = filter.len(), "Scan started");
        self.on_discover = Some(Box::new(on_discover));
        self.scan_filter = filter;
        self.set_manager_state(ManagerState::Scanning);
        Ok(())
    }

    /// Stop scanning. No-op unless a scan is running.
    ///
    /// If the transport refuses, the coordinator stays `Scanning`.
    pub async fn stop_scan(&mut self) -> Result<()> {
        if self.state != ManagerState::Scanning {
            debug!(state = %self.state, "No scan running, ignoring stop_scan");
            return Ok(());
        }

        self.transport.stop_scan().await?;

        self.on_discover = None;
        self.set_manager_state(ManagerState::Ready);
        info!("Scan stopped");
        Ok(())
    }

    // --- Connecting ---

    /// Connect to a peripheral.
    ///
    /// `on_result` is called with `Ok` once the link is up, which is before
    /// service discovery completes; callers that need notifications watch the
    /// handle state (or the status events) for
    /// [`ConnectionState::ReadyForNotifications`].
    pub async fn connect(
        &mut self,
        handle: &PeripheralHandle,
        service_filter: ServiceFilter,
        on_result: ConnectCallback,
    ) {
        let id = handle.id().clone();

        if self.state == ManagerState::Unavailable {
            on_result(Err(Error::TransportUnavailable));
            return;
        }

        let current = self.registry.entry(id.clone()).or_insert_with(|| {
            debug!(peripheral = %id, "Registering peripheral on connect");
            handle.clone()
        });

        let state = current.state();
        if state.is_connected() {
            debug!(peripheral = %id, "Already connected");
            on_result(Ok(current.clone()));
            return;
        }
        if state == ConnectionState::Connecting {
            on_result(Err(Error::already_in_progress(id)));
            return;
        }
        if !state.can_connect() {
            on_result(Err(Error::invalid_transition(
                id,
                state,
                ConnectionState::Connecting,
            )));
            return;
        }

        current.set_service_filter(service_filter);
        if let Err(e) = self.transition(&id, ConnectionState::Connecting) {
            on_result(Err(e));
            return;
        }
        self.pending.insert(id.clone(), on_result);

        info!(peripheral = %id, "Connecting");
        if let Err(e) = self.transport.connect(&id).await {
            warn!(peripheral = %id, error = %e, "Connect request failed");
            self.fail_connect(&id, ConnectionFailureReason::BleError(e.to_string()));
        }
    }

    /// Connect to `handle` if `advertised_key` equals `expected_key`.
    ///
    /// Keys are compared byte for byte. Returns whether they matched.
    pub async fn match_and_connect(
        &mut self,
        advertised_key: &str,
        expected_key: &str,
        handle: &PeripheralHandle,
        service_filter: ServiceFilter,
        on_result: ConnectCallback,
    ) -> bool {
        if advertised_key != expected_key {
            trace!(peripheral = %handle.id(), "Pairing key mismatch");
            return false;
        }

        info!(peripheral = %handle.id(), name = ?handle.name(), "Pairing key matched");
        if self.config.stop_scan_on_match
            && let Err(e) = self.stop_scan().await
        {
            warn!(error = %e, "Failed to stop scan after match");
        }

        self.connect(handle, service_filter, on_result).await;
        true
    }

    /// Disconnect from a peripheral. No-op unless it is connected.
    pub async fn disconnect(&mut self, handle: &PeripheralHandle) -> Result<()> {
        let id = handle.id();
        let connected = self
            .registry
            .get(id)
            .is_some_and(|registered| registered.is_connected());
        if !connected {
            debug!(peripheral = %id, "Not connected, ignoring disconnect");
            return Ok(());
        }

        self.transition(id, ConnectionState::Disconnecting)?;
        info!(peripheral = %id, "Disconnecting");

        if let Err(e) = self.transport.disconnect(id).await {
            warn!(peripheral = %id, error = %e, "Disconnect request failed, dropping link state");
            if let Err(e) = self.mark_disconnected(id) {
                warn!(error = %e, "Failed to mark peripheral disconnected");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Register a value listener for a peripheral.
    ///
    /// The listener replaces any earlier one and only sees values delivered
    /// after registration.
    pub fn register_value_listener<F>(&mut self, handle: &PeripheralHandle, callback: F) -> Result<()>
    where
        F: Fn(Uuid, Option<&[u8]>) + Send + Sync + 'static,
    {
        let registered = self
            .registry
            .get_mut(handle.id())
            .ok_or_else(|| Error::PeripheralNotFound(handle.id().clone()))?;
        registered.set_value_listener(Arc::new(callback));
        Ok(())
    }

    // --- Event processing ---

    /// Wait for the next radio event without handling it.
    ///
    /// Returns `None` once the subscription is closed.
    pub async fn next_event(&mut self) -> Option<RadioEvent> {
        match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => None,
        }
    }

    /// Wait for and handle one radio event. Returns `false` once the
    /// subscription is closed.
    pub async fn process_next(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.handle_event(event).await;
                true
            }
            None => false,
        }
    }

    /// Handle every event that is already queued, without waiting.
    ///
    /// Returns the number of events handled.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let event = match self.events.as_mut().map(|events| events.try_recv()) {
                Some(Ok(event)) => event,
                _ => break,
            };
            self.handle_event(event).await;
            handled += 1;
        }
        handled
    }

    /// Handle radio events until `cancel` fires or the subscription closes.
    pub async fn run(&mut self, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Coordinator event loop cancelled");
                    break;
                }
                event = self.next_event() => event,
            };

            match event {
                Some(event) => self.handle_event(event).await,
                None => {
                    info!("Radio event subscription closed");
                    break;
                }
            }
        }
    }

    /// Apply one radio event.
    pub async fn handle_event(&mut self, event: RadioEvent) {
        trace!(?event, "Radio event");
        match event {
            RadioEvent::StateChanged(state) => self.on_radio_state(state),
            RadioEvent::Discovered {
                id,
                name,
                pairing_key,
            } => self.on_discovered(id, name, pairing_key).await,
            RadioEvent::Connected { id } => self.on_connected(id).await,
            RadioEvent::ConnectFailed { id, reason } => self.on_connect_failed(id, reason),
            RadioEvent::Disconnected { id } => self.on_disconnected(id),
            RadioEvent::ServicesDiscovered { id, services } => {
                self.on_services_discovered(id, services).await
            }
            RadioEvent::ServiceDiscoveryFailed { id, reason } => {
                if self.state_of(&id) == Some(ConnectionState::DiscoveringServices) {
                    warn!(peripheral = %id, %reason, "Service discovery failed");
                } else {
                    self.reject(&id, "service_discovery_failed");
                }
            }
            RadioEvent::ValueUpdated {
                id,
                characteristic,
                data,
            } => self.on_value_updated(id, characteristic, data),
        }
    }

    /// Stop scanning, disconnect, cancel pending connects and close the
    /// radio event subscription.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stop_scan().await {
            warn!(error = %e, "Failed to stop scan during shutdown");
            self.on_discover = None;
        }

        let connected: Vec<PeripheralHandle> = self
            .registry
            .values()
            .filter(|handle| handle.is_connected())
            .cloned()
            .collect();
        for handle in connected {
            if let Err(e) = self.disconnect(&handle).await {
                warn!(peripheral = %handle.id(), error = %e, "Failed to disconnect during shutdown");
            }
        }

        for (_, on_result) in self.pending.drain() {
            on_result(Err(Error::Cancelled));
        }

        self.transport.unsubscribe_events();
        if let Some(mut events) = self.events.take() {
            events.close();
        }

        // No Disconnected event can arrive once the subscription is closed.
        let disconnecting: Vec<PeripheralId> = self
            .registry
            .values()
            .filter(|handle| handle.state() == ConnectionState::Disconnecting)
            .map(|handle| handle.id().clone())
            .collect();
        for id in disconnecting {
            if let Err(e) = self.mark_disconnected(&id) {
                warn!(error = %e, "Failed to mark peripheral disconnected during shutdown");
            }
        }
        info!("Coordinator shut down");
    }

    // --- Event handlers ---

    fn on_radio_state(&mut self, radio: RadioState) {
        match radio {
            RadioState::Ready => {
                if self.state == ManagerState::Unavailable {
                    info!("Radio ready");
                    self.set_manager_state(ManagerState::Ready);
                } else {
                    debug!(state = %self.state, "Radio ready signal while already available");
                }
            }
            RadioState::Unavailable => {
                if self.state == ManagerState::Unavailable {
                    return;
                }
                warn!("Radio unavailable");
                self.on_discover = None;
                self.set_manager_state(ManagerState::Unavailable);

                let affected: Vec<(PeripheralId, ConnectionState)> = self
                    .registry
                    .values()
                    .filter(|handle| {
                        handle.is_connected()
                            || matches!(
                                handle.state(),
                                ConnectionState::Connecting | ConnectionState::Disconnecting
                            )
                    })
                    .map(|handle| (handle.id().clone(), handle.state()))
                    .collect();

                for (id, state) in affected {
                    if state == ConnectionState::Connecting {
                        if let Err(e) = self.transition(&id, ConnectionState::FailedToConnect) {
                            warn!(error = %e, "Failed to fail pending connect");
                        }
                        if let Some(on_result) = self.pending.remove(&id) {
                            on_result(Err(Error::TransportUnavailable));
                        }
                    } else if let Err(e) = self.mark_disconnected(&id) {
                        warn!(error = %e, "Failed to drop link after power loss");
                    }
                }
            }
        }
    }

    async fn on_discovered(&mut self, id: PeripheralId, name: Option<String>, pairing_key: Option<String>) {
        let Some(key) = pairing_key else {
            trace!(peripheral = %id, "Ignoring advertisement without pairing key");
            return;
        };
        if self.state != ManagerState::Scanning {
            debug!(peripheral = %id, "Ignoring discovery outside of a scan");
            return;
        }

        let handle = self.registry.entry(id.clone()).or_insert_with(|| {
            debug!(peripheral = %id, "New peripheral");
            PeripheralHandle::new(id.clone())
        });
        handle.update_advertisement(name.clone(), key.clone());
        let state = handle.state();

        if state != ConnectionState::Ready
            && state.accepts_discovery()
            && let Err(e) = self.transition(&id, ConnectionState::Ready)
        {
            warn!(error = %e, "Failed to mark peripheral ready");
        }

        let Some(snapshot) = self.registry.get(&id).cloned() else {
            return;
        };
        self.notifier.send(CoordinatorEvent::PeripheralDiscovered {
            id: id.clone(),
            name,
            pairing_key: key.clone(),
        });

        let action = match self.on_discover.as_mut() {
            Some(on_discover) => on_discover(&snapshot, &key),
            None => DiscoveryAction::Continue,
        };

        if let DiscoveryAction::MatchAndConnect {
            expected_key,
            service_filter,
            on_result,
        } = action
        {
            if !snapshot.state().can_connect() {
                debug!(
                    peripheral = %id,
                    state = %snapshot.state(),
                    "Link already active, ignoring match"
                );
                return;
            }
            self.match_and_connect(&key, &expected_key, &snapshot, service_filter, on_result)
                .await;
        }
    }

    async fn on_connected(&mut self, id: PeripheralId) {
        if self.state_of(&id) != Some(ConnectionState::Connecting) {
            self.reject(&id, "connected");
            return;
        }

        let handle = match self.transition(&id, ConnectionState::Connected) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "Failed to mark peripheral connected");
                return;
            }
        };
        info!(peripheral = %id, name = ?handle.name(), "Connected");

        if let Some(on_result) = self.pending.remove(&id) {
            on_result(Ok(handle.clone()));
        }

        if let Err(e) = self.transition(&id, ConnectionState::DiscoveringServices) {
            warn!(error = %e, "Failed to start service discovery");
            return;
        }
        if let Err(e) = self
            .transport
            .discover_services(&id, handle.service_filter())
            .await
        {
            warn!(peripheral = %id, error = %e, "Service discovery request failed");
        }
    }

    fn on_connect_failed(&mut self, id: PeripheralId, reason: ConnectionFailureReason) {
        if self.state_of(&id) != Some(ConnectionState::Connecting) {
            self.reject(&id, "connect_failed");
            return;
        }
        warn!(peripheral = %id, %reason, "Connection failed");
        self.fail_connect(&id, reason);
    }

    fn on_disconnected(&mut self, id: PeripheralId) {
        match self.state_of(&id) {
            Some(state) if state.can_transition_to(ConnectionState::Disconnected) => {
                if let Err(e) = self.mark_disconnected(&id) {
                    warn!(error = %e, "Failed to mark peripheral disconnected");
                    return;
                }
                info!(peripheral = %id, "Disconnected");
            }
            Some(ConnectionState::Disconnected) => {
                debug!(peripheral = %id, "Duplicate disconnect notification");
            }
            _ => self.reject(&id, "disconnected"),
        }
    }

    async fn on_services_discovered(&mut self, id: PeripheralId, services: Vec<DiscoveredService>) {
        let Some(handle) = self.registry.get(&id) else {
            self.reject(&id, "services_discovered");
            return;
        };
        if handle.state() != ConnectionState::DiscoveringServices {
            self.reject(&id, "services_discovered");
            return;
        }

        let filter = handle.service_filter().clone();
        let matched: Vec<DiscoveredService> = services
            .into_iter()
            .filter(|service| filter_allows(&filter, &service.uuid))
            .collect();

        if matched.is_empty() {
            warn!(peripheral = %id, "No discovered service matches the filter");
            return;
        }

        if let Err(e) = self.transition(&id, ConnectionState::DiscoveringCharacteristics) {
            warn!(error = %e, "Failed to start characteristic discovery");
            return;
        }

        let characteristics: Vec<Uuid> = matched
            .iter()
            .flat_map(|service| service.characteristics.iter().copied())
            .collect();
        debug!(
            peripheral = %id,
            services = matched.len(),
            characteristics = characteristics.len(),
            "Subscribing to characteristics"
        );

        for characteristic in characteristics {
            if let Err(e) = self.transport.subscribe(&id, characteristic).await {
                warn!(peripheral = %id, %characteristic, error = %e, "Subscribe request failed");
            }
        }
    }

    fn on_value_updated(&mut self, id: PeripheralId, characteristic: Uuid, data: Option<Vec<u8>>) {
        match self.state_of(&id) {
            Some(ConnectionState::DiscoveringCharacteristics) => {
                if let Err(e) = self.transition(&id, ConnectionState::ReadyForNotifications) {
                    warn!(error = %e, "Failed to mark peripheral ready for notifications");
                    return;
                }
                info!(peripheral = %id, "Ready for notifications");
            }
            Some(ConnectionState::ReadyForNotifications) => {}
            _ => {
                self.reject(&id, "value_updated");
                return;
            }
        }

        if let Some(handle) = self.registry.get(&id)
            && !handle.notify_value(characteristic, data.as_deref())
        {
            trace!(peripheral = %id, %characteristic, "No value listener registered");
        }
    }

    // --- Helpers ---

    fn state_of(&self, id: &PeripheralId) -> Option<ConnectionState> {
        self.registry.get(id).map(|handle| handle.state())
    }

    fn transition(&mut self, id: &PeripheralId, next: ConnectionState) -> Result<PeripheralHandle> {
        let handle = self
            .registry
            .get_mut(id)
            .ok_or_else(|| Error::PeripheralNotFound(id.clone()))?;
        let from = handle.transition(next)?;
        debug!(peripheral = %id, %from, to = %next, "Peripheral state changed");
        self.notifier.send(CoordinatorEvent::PeripheralStateChanged {
            id: id.clone(),
            from,
            to: next,
        });
        Ok(handle.clone())
    }

    /// Drop the link state of a peripheral, including its value listener.
    fn mark_disconnected(&mut self, id: &PeripheralId) -> Result<PeripheralHandle> {
        let handle = self.transition(id, ConnectionState::Disconnected)?;
        if let Some(registered) = self.registry.get_mut(id) {
            registered.clear_value_listener();
        }
        Ok(handle)
    }

    fn set_manager_state(&mut self, next: ManagerState) {
        if !self.state.can_transition_to(next) {
            debug!(from = %self.state, to = %next, "Ignoring illegal manager transition");
            return;
        }
        let from = std::mem::replace(&mut self.state, next);
        self.notifier
            .send(CoordinatorEvent::ManagerStateChanged { from, to: next });
    }

    fn fail_connect(&mut self, id: &PeripheralId, reason: ConnectionFailureReason) {
        if let Err(e) = self.transition(id, ConnectionState::FailedToConnect) {
            warn!(error = %e, "Failed to mark connect failure");
        }
        if let Some(on_result) = self.pending.remove(id) {
            on_result(Err(Error::connect_failed(id.clone(), reason)));
        }
    }

    fn reject(&self, id: &PeripheralId, event: &str) {
        let state = self.state_of(id);
        warn!(peripheral = %id, ?state, event, "Rejecting out-of-order radio event");
        self.notifier.send(CoordinatorEvent::EventRejected {
            id: Some(id.clone()),
            state,
            event: event.to_string(),
        });
    }
}

impl<T> Drop for PeripheralCoordinator<T> {
    fn drop(&mut self) {
        if self.events.is_some() {
            debug!(
                peripherals = self.registry.len(),
                "Coordinator dropped without shutdown()"
            );
        }
    }
}
