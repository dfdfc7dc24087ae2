//! End-to-end pairing flow against mock transports.
//!
//! Drives a full tag read → scan → match → connect → service discovery →
//! notification sequence through the public API only.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use uuid::Uuid;

use tagpair_core::mock::RadioCall;
use tagpair_core::{
    ConnectionState, CoordinatorEvent, DiscoveredService, FileTag, ManagerState, MockRadio,
    PairingOrchestrator, PeripheralCoordinator, PeripheralHandle, PeripheralId, RadioEvent,
    Result, ServiceFilter,
};

const LIGHT_SERVICE: Uuid = Uuid::from_u128(0x1000);
const BRIGHTNESS: Uuid = Uuid::from_u128(0x1001);
const BATTERY_SERVICE: Uuid = Uuid::from_u128(0x2000);
const BATTERY_LEVEL: Uuid = Uuid::from_u128(0x2001);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Lamp {
    name: String,
}

type Values = Arc<Mutex<Vec<(Uuid, Option<Vec<u8>>)>>>;

#[tokio::test]
async fn test_write_read_connect_notify_disconnect() {
    let dir = TempDir::new().unwrap();
    let tag_path = dir.path().join("lamp.tag");
    let radio = MockRadio::new();

    let mut coordinator = PeripheralCoordinator::new(radio.clone());
    let mut status = coordinator.subscribe();
    radio.power_on();
    coordinator.process_pending().await;
    assert_eq!(coordinator.manager_state(), ManagerState::Ready);

    let mut orchestrator: PairingOrchestrator<FileTag, MockRadio, Lamp> =
        PairingOrchestrator::new(FileTag::new(&tag_path), coordinator);

    // Pair the tag: store key and value on it.
    orchestrator.set_pairing_key(Some("c20c8a91".to_string()));
    orchestrator.set_value(Some(Lamp {
        name: "lamp".to_string(),
    }));
    let mut written = false;
    orchestrator
        .write(|| {}, |result| written = result.is_ok())
        .await;
    assert!(written);
    assert_eq!(
        std::fs::read(&tag_path).unwrap(),
        br#"{"pairing_key":"c20c8a91","value":{"name":"lamp"}}"#.to_vec()
    );

    // Forget in-memory state, then read it back from the tag.
    orchestrator.set_pairing_key(None);
    orchestrator.set_value(None);

    let connected: Arc<Mutex<Option<Result<PeripheralHandle>>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&connected);
    let filter: ServiceFilter = [LIGHT_SERVICE].into_iter().collect();
    orchestrator
        .read_and_connect(
            filter.clone(),
            || {},
            |result| assert!(result.is_ok()),
            move |result| *sink.lock().unwrap() = Some(result),
        )
        .await;

    assert_eq!(orchestrator.pairing_key(), Some("c20c8a91"));
    assert_eq!(
        orchestrator.value(),
        Some(&Lamp {
            name: "lamp".to_string()
        })
    );

    // Three peripherals advertise; only one carries the tag's key.
    radio.advertise("AA:00:00:00:00:01", Some("Desk"), Some("00000000"));
    radio.advertise("AA:00:00:00:00:02", Some("Speaker"), None);
    radio.advertise("AA:00:00:00:00:03", Some("Lamp"), Some("c20c8a91"));
    orchestrator.coordinator_mut().process_pending().await;

    let lamp = PeripheralId::from("AA:00:00:00:00:03");
    assert_eq!(radio.connect_calls(), vec![lamp.clone()]);
    assert_eq!(
        orchestrator.coordinator().manager_state(),
        ManagerState::Ready
    );

    radio.emit(RadioEvent::Connected { id: lamp.clone() });
    orchestrator.coordinator_mut().process_pending().await;

    let handle = connected
        .lock()
        .unwrap()
        .take()
        .expect("connect callback fired")
        .expect("connect succeeded");
    assert_eq!(handle.id(), &lamp);
    assert_eq!(handle.name(), Some("Lamp"));
    assert!(radio.calls().contains(&RadioCall::DiscoverServices(lamp.clone(), filter)));

    let values: Values = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&values);
    orchestrator
        .register_value_listener(&handle, move |characteristic, data| {
            sink.lock()
                .unwrap()
                .push((characteristic, data.map(<[u8]>::to_vec)));
        })
        .unwrap();

    radio.emit(RadioEvent::ServicesDiscovered {
        id: lamp.clone(),
        services: vec![
            DiscoveredService::new(LIGHT_SERVICE, [BRIGHTNESS]),
            DiscoveredService::new(BATTERY_SERVICE, [BATTERY_LEVEL]),
        ],
    });
    radio.emit(RadioEvent::ValueUpdated {
        id: lamp.clone(),
        characteristic: BRIGHTNESS,
        data: Some(vec![80]),
    });
    radio.emit(RadioEvent::ValueUpdated {
        id: lamp.clone(),
        characteristic: BRIGHTNESS,
        data: Some(vec![100]),
    });
    orchestrator.coordinator_mut().process_pending().await;

    assert_eq!(
        radio.count(|call| matches!(call, RadioCall::Subscribe(_, c) if *c == BATTERY_LEVEL)),
        0
    );
    assert_eq!(
        *values.lock().unwrap(),
        vec![(BRIGHTNESS, Some(vec![80])), (BRIGHTNESS, Some(vec![100]))]
    );
    assert_eq!(
        orchestrator
            .coordinator()
            .connected_peripheral()
            .map(|h| h.state()),
        Some(ConnectionState::ReadyForNotifications)
    );

    // Tear down.
    let mut done = 0;
    orchestrator.disconnect(|| done += 1).await;
    radio.emit(RadioEvent::Disconnected { id: lamp.clone() });
    orchestrator.coordinator_mut().process_pending().await;

    assert_eq!(done, 1);
    assert_eq!(
        orchestrator.coordinator().peripheral(&lamp).map(|h| h.state()),
        Some(ConnectionState::Disconnected)
    );

    let mut transitions = Vec::new();
    while let Ok(event) = status.try_recv() {
        if let CoordinatorEvent::PeripheralStateChanged { id, to, .. } = event
            && id == lamp
        {
            transitions.push(to);
        }
    }
    assert_eq!(
        transitions,
        vec![
            ConnectionState::Ready,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::DiscoveringServices,
            ConnectionState::DiscoveringCharacteristics,
            ConnectionState::ReadyForNotifications,
            ConnectionState::Disconnecting,
            ConnectionState::Disconnected,
        ]
    );

    orchestrator.coordinator_mut().shutdown().await;
    assert!(!radio.is_subscribed());
}

#[tokio::test]
async fn test_out_of_order_events_leave_registry_unchanged() {
    let radio = MockRadio::new();
    let mut coordinator = PeripheralCoordinator::new(radio.clone());
    let mut status = coordinator.subscribe();
    radio.power_on();

    radio.emit(RadioEvent::Connected {
        id: "never-seen".into(),
    });
    radio.emit(RadioEvent::ServicesDiscovered {
        id: "never-seen".into(),
        services: vec![DiscoveredService::new(LIGHT_SERVICE, [BRIGHTNESS])],
    });
    coordinator.process_pending().await;

    assert_eq!(coordinator.peripheral_count(), 0);
    assert!(radio.calls().is_empty());

    let rejected: Vec<String> = std::iter::from_fn(|| status.try_recv().ok())
        .filter_map(|event| match event {
            CoordinatorEvent::EventRejected { event, .. } => Some(event),
            _ => None,
        })
        .collect();
    assert_eq!(rejected, vec!["connected", "services_discovered"]);
}
