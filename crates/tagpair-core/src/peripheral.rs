//! Peripheral handles.
//!
//! A [`PeripheralHandle`] is the coordinator's record of one peripheral:
//! identity, display name, connection state, the service filter of its
//! current connection and the value listener registered for it. The
//! coordinator registry owns the authoritative copy of every handle; the
//! handles passed to callbacks and returned from queries are snapshots.

use std::sync::Arc;

use uuid::Uuid;

use tagpair_types::{ConnectionState, PeripheralId, ServiceFilter};

use crate::error::{Error, Result};

/// Callback invoked with `(characteristic, data)` for every value update.
pub type ValueCallback = Arc<dyn Fn(Uuid, Option<&[u8]>) + Send + Sync>;

/// One discovered, connecting or connected peripheral.
#[derive(Clone)]
pub struct PeripheralHandle {
    id: PeripheralId,
    name: Option<String>,
    state: ConnectionState,
    service_filter: ServiceFilter,
    advertised_key: Option<String>,
    on_value_update: Option<ValueCallback>,
}

impl std::fmt::Debug for PeripheralHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("service_filter", &self.service_filter)
            .field("advertised_key", &self.advertised_key)
            .field("has_value_listener", &self.on_value_update.is_some())
            .finish()
    }
}

impl PeripheralHandle {
    /// Create a handle for a peripheral that has not been seen advertising.
    pub fn new(id: impl Into<PeripheralId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            state: ConnectionState::Unavailable,
            service_filter: ServiceFilter::new(),
            advertised_key: None,
            on_value_update: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Platform identity.
    pub fn id(&self) -> &PeripheralId {
        &self.id
    }

    /// Display name, if the peripheral advertised one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a link to the peripheral is up.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Service filter of the current (or last) connection.
    pub fn service_filter(&self) -> &ServiceFilter {
        &self.service_filter
    }

    /// Pairing key from the most recent advertisement.
    pub fn advertised_key(&self) -> Option<&str> {
        self.advertised_key.as_deref()
    }

    /// Whether a value listener is registered.
    pub fn has_value_listener(&self) -> bool {
        self.on_value_update.is_some()
    }

    /// Move to `next`, returning the previous state.
    pub(crate) fn transition(&mut self, next: ConnectionState) -> Result<ConnectionState> {
        if !self.state.can_transition_to(next) {
            return Err(Error::invalid_transition(self.id.clone(), self.state, next));
        }
        Ok(std::mem::replace(&mut self.state, next))
    }

    pub(crate) fn update_advertisement(&mut self, name: Option<String>, key: String) {
        if name.is_some() {
            self.name = name;
        }
        self.advertised_key = Some(key);
    }

    pub(crate) fn set_service_filter(&mut self, filter: ServiceFilter) {
        self.service_filter = filter;
    }

    pub(crate) fn set_value_listener(&mut self, callback: ValueCallback) {
        self.on_value_update = Some(callback);
    }

    pub(crate) fn clear_value_listener(&mut self) {
        self.on_value_update = None;
    }

    /// Deliver a value update to the registered listener, if any.
    pub(crate) fn notify_value(&self, characteristic: Uuid, data: Option<&[u8]>) -> bool {
        match &self.on_value_update {
            Some(callback) => {
                callback(characteristic, data);
                true
            }
            None => false,
        }
    }
}
