//! Mock transports for testing.
//!
//! This module provides mock radio and tag transports that can be used for
//! unit testing without requiring actual hardware.
//!
//! # Features
//!
//! - **Call recording**: every request issued to [`MockRadio`] is recorded as a
//!   [`RadioCall`] for assertions
//! - **Event injection**: tests emit [`RadioEvent`]s on demand, in any order
//! - **Failure injection**: fail every request, or only the next N requests

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use tagpair_types::{PeripheralId, ServiceFilter};

use crate::error::{Error, Result};
use crate::traits::{
    RadioEvent, RadioEventReceiver, RadioEventSender, RadioState, RadioTransport, TagTransport,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A request issued to [`MockRadio`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    StartScan(ServiceFilter),
    StopScan,
    Connect(PeripheralId),
    Disconnect(PeripheralId),
    DiscoverServices(PeripheralId, ServiceFilter),
    Subscribe(PeripheralId, Uuid),
}

#[derive(Default)]
struct RadioInner {
    sender: Mutex<Option<RadioEventSender>>,
    calls: Mutex<Vec<RadioCall>>,
    should_fail: AtomicBool,
    remaining_failures: AtomicU32,
}

/// A mock radio transport.
///
/// Clones share state, so a test keeps one clone to drive events while the
/// coordinator owns another.
///
/// # Example
///
/// ```
/// use tagpair_core::{PeripheralCoordinator, ManagerState};
/// use tagpair_core::mock::MockRadio;
///
/// #[tokio::main]
/// async fn main() {
///     let radio = MockRadio::new();
///     let mut coordinator = PeripheralCoordinator::new(radio.clone());
///
///     radio.power_on();
///     coordinator.process_pending().await;
///     assert_eq!(coordinator.manager_state(), ManagerState::Ready);
/// }
/// ```
#[derive(Clone, Default)]
pub struct MockRadio {
    inner: Arc<RadioInner>,
}

impl std::fmt::Debug for MockRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRadio")
            .field("subscribed", &self.is_subscribed())
            .field("calls", &lock(&self.inner.calls).len())
            .finish()
    }
}

impl MockRadio {
    /// Create a new mock radio with no subscriber.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to the current subscriber.
    ///
    /// Returns `false` when nobody is subscribed.
    pub fn emit(&self, event: RadioEvent) -> bool {
        match lock(&self.inner.sender).as_ref() {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Report the radio as powered on.
    pub fn power_on(&self) -> bool {
        self.emit(RadioEvent::StateChanged(RadioState::Ready))
    }

    /// Report the radio as powered off.
    pub fn power_off(&self) -> bool {
        self.emit(RadioEvent::StateChanged(RadioState::Unavailable))
    }

    /// Emit a discovery event.
    pub fn advertise(&self, id: &str, name: Option<&str>, pairing_key: Option<&str>) -> bool {
        self.emit(RadioEvent::Discovered {
            id: id.into(),
            name: name.map(str::to_string),
            pairing_key: pairing_key.map(str::to_string),
        })
    }

    /// Whether an event subscription is open.
    pub fn is_subscribed(&self) -> bool {
        lock(&self.inner.sender)
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }

    /// All recorded requests, oldest first.
    pub fn calls(&self) -> Vec<RadioCall> {
        lock(&self.inner.calls).clone()
    }

    /// Number of recorded requests matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&RadioCall) -> bool) -> usize {
        lock(&self.inner.calls)
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    /// Peripherals passed to `connect`, in order.
    pub fn connect_calls(&self) -> Vec<PeripheralId> {
        lock(&self.inner.calls)
            .iter()
            .filter_map(|call| match call {
                RadioCall::Connect(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded requests.
    pub fn clear_calls(&self) {
        lock(&self.inner.calls).clear();
    }

    /// Make every request fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.inner.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Make the next `count` requests fail.
    pub fn set_transient_failures(&self, count: u32) {
        self.inner.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Number of transient failures left.
    pub fn remaining_failures(&self) -> u32 {
        self.inner.remaining_failures.load(Ordering::Relaxed)
    }

    fn record(&self, call: RadioCall) -> Result<()> {
        if self.inner.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.inner.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::radio_transport(format!("Mock failure: {:?}", call)));
        }
        if self.inner.should_fail.load(Ordering::Relaxed) {
            return Err(Error::radio_transport(format!("Mock failure: {:?}", call)));
        }
        lock(&self.inner.calls).push(call);
        Ok(())
    }
}

#[async_trait]
impl RadioTransport for MockRadio {
    fn subscribe_events(&self) -> RadioEventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.inner.sender) = Some(tx);
        rx
    }

    fn unsubscribe_events(&self) {
        lock(&self.inner.sender).take();
    }

    async fn start_scan(&self, filter: &ServiceFilter) -> Result<()> {
        self.record(RadioCall::StartScan(filter.clone()))
    }

    async fn stop_scan(&self) -> Result<()> {
        self.record(RadioCall::StopScan)
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        self.record(RadioCall::Connect(id.clone()))
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<()> {
        self.record(RadioCall::Disconnect(id.clone()))
    }

    async fn discover_services(&self, id: &PeripheralId, filter: &ServiceFilter) -> Result<()> {
        self.record(RadioCall::DiscoverServices(id.clone(), filter.clone()))
    }

    async fn subscribe(&self, id: &PeripheralId, characteristic: Uuid) -> Result<()> {
        self.record(RadioCall::Subscribe(id.clone(), characteristic))
    }
}

/// A mock tag transport holding one payload in memory.
#[derive(Debug, Default)]
pub struct MockTag {
    payload: Mutex<Option<Vec<u8>>>,
    written: Mutex<Vec<Vec<u8>>>,
    activations: AtomicU32,
    fail_activation: AtomicBool,
    fail_write: AtomicBool,
}

impl MockTag {
    /// Create a tag with no payload. `detect` fails until one is set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tag holding `payload`.
    pub fn with_payload(payload: impl Into<Vec<u8>>) -> Self {
        let tag = Self::new();
        tag.set_payload(payload);
        tag
    }

    /// Replace the tag payload.
    pub fn set_payload(&self, payload: impl Into<Vec<u8>>) {
        *lock(&self.payload) = Some(payload.into());
    }

    /// Current payload.
    pub fn payload(&self) -> Option<Vec<u8>> {
        lock(&self.payload).clone()
    }

    /// Every payload written, oldest first.
    pub fn written(&self) -> Vec<Vec<u8>> {
        lock(&self.written).clone()
    }

    /// Number of sessions activated.
    pub fn activation_count(&self) -> u32 {
        self.activations.load(Ordering::Relaxed)
    }

    /// Make session activation fail.
    pub fn set_fail_activation(&self, fail: bool) {
        self.fail_activation.store(fail, Ordering::Relaxed);
    }

    /// Make writes fail.
    pub fn set_fail_write(&self, fail: bool) {
        self.fail_write.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl TagTransport for MockTag {
    async fn activate_session(&self) -> Result<()> {
        if self.fail_activation.load(Ordering::Relaxed) {
            return Err(Error::tag_transport("Mock session activation failure"));
        }
        self.activations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn detect(&self) -> Result<Vec<u8>> {
        self.payload()
            .ok_or_else(|| Error::tag_transport("No tag in range"))
    }

    async fn write(&self, payload: &[u8]) -> Result<()> {
        if self.fail_write.load(Ordering::Relaxed) {
            return Err(Error::tag_transport("Mock write failure"));
        }
        lock(&self.written).push(payload.to_vec());
        self.set_payload(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_radio_records_calls() {
        let radio = MockRadio::new();
        radio.start_scan(&ServiceFilter::new()).await.unwrap();
        radio.connect(&"p-1".into()).await.unwrap();

        assert_eq!(
            radio.calls(),
            vec![
                RadioCall::StartScan(ServiceFilter::new()),
                RadioCall::Connect("p-1".into())
            ]
        );
        assert_eq!(radio.connect_calls(), vec![PeripheralId::from("p-1")]);

        radio.clear_calls();
        assert!(radio.calls().is_empty());
    }

    #[tokio::test]
    async fn test_radio_transient_failures() {
        let radio = MockRadio::new();
        radio.set_transient_failures(2);

        assert!(radio.stop_scan().await.is_err());
        assert!(radio.stop_scan().await.is_err());
        assert!(radio.stop_scan().await.is_ok());
        assert_eq!(radio.remaining_failures(), 0);
        assert_eq!(radio.calls(), vec![RadioCall::StopScan]);
    }

    #[tokio::test]
    async fn test_radio_events() {
        let radio = MockRadio::new();
        assert!(!radio.power_on());

        let mut events = radio.subscribe_events();
        assert!(radio.is_subscribed());
        assert!(radio.advertise("p-1", None, Some("k")));

        assert_eq!(
            events.recv().await,
            Some(RadioEvent::Discovered {
                id: "p-1".into(),
                name: None,
                pairing_key: Some("k".to_string()),
            })
        );

        radio.unsubscribe_events();
        assert!(!radio.is_subscribed());
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_tag_write_replaces_payload() {
        let tag = MockTag::with_payload(b"old".to_vec());
        tag.activate_session().await.unwrap();
        tag.write(b"new").await.unwrap();

        assert_eq!(tag.detect().await.unwrap(), b"new".to_vec());
        assert_eq!(tag.written(), vec![b"new".to_vec()]);
        assert_eq!(tag.activation_count(), 1);
    }

    #[tokio::test]
    async fn test_tag_failures() {
        let tag = MockTag::new();
        assert!(matches!(tag.detect().await, Err(Error::TagTransport(_))));

        tag.set_fail_activation(true);
        assert!(tag.activate_session().await.is_err());
        assert_eq!(tag.activation_count(), 0);

        tag.set_fail_write(true);
        assert!(tag.write(b"x").await.is_err());
        assert!(tag.written().is_empty());
    }
}
