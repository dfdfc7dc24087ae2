//! Tag-to-peripheral pairing and BLE connection state machine.
//!
//! A proximity tag stores a pairing key next to an application value. A
//! peripheral that belongs to the tag advertises the same key. This crate
//! reads the tag, scans for the advertising peripheral, connects to it,
//! discovers its services and delivers characteristic value updates to the
//! application.
//!
//! # Components
//!
//! - [`PeripheralCoordinator`]: scan/connect lifecycle, peripheral registry
//!   and radio event handling
//! - [`PairingOrchestrator`]: ties a tag read or write to the coordinator
//! - [`RadioTransport`] / [`TagTransport`]: hardware seams, implemented by
//!   [`btle::BtleplugRadio`], [`tag::FileTag`] and the [`mock`] transports
//!
//! # Platform Differences
//!
//! Peripherals are identified by the platform id:
//!
//! - **macOS**: a UUID assigned by CoreBluetooth, stable for a given device on
//!   a given Mac but different between Macs.
//! - **Linux/Windows**: the Bluetooth MAC address (e.g., `AA:BB:CC:DD:EE:FF`).
//!
//! # Quick Start
//!
//! ```no_run
//! use tagpair_core::{PairingOrchestrator, PeripheralCoordinator, ServiceFilter};
//! use tagpair_core::btle::BtleplugRadio;
//! use tagpair_core::tag::FileTag;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = PeripheralCoordinator::new(BtleplugRadio::new().await?);
//!     let mut orchestrator: PairingOrchestrator<_, _, serde_json::Value> =
//!         PairingOrchestrator::new(FileTag::new("lamp.tag"), coordinator);
//!
//!     orchestrator.coordinator_mut().process_next().await; // radio power state
//!     orchestrator
//!         .read_and_connect(
//!             ServiceFilter::new(),
//!             || println!("Hold the tag near the reader"),
//!             |record| println!("Tag: {:?}", record.map(|r| r.pairing_key().map(str::to_string))),
//!             |result| println!("Connected: {}", result.is_ok()),
//!         )
//!         .await;
//!
//!     orchestrator.coordinator_mut().run(CancellationToken::new()).await;
//!     Ok(())
//! }
//! ```

pub mod advertisement;
pub mod btle;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod mock;
pub mod orchestrator;
pub mod peripheral;
pub mod tag;
pub mod traits;

// Re-export types
pub use tagpair_types::{
    CodecError, ConnectionState, ManagerState, PeripheralId, ServiceFilter, TagRecord,
};

// Re-export core types
pub use coordinator::{
    ConnectCallback, CoordinatorConfig, DiscoverCallback, DiscoveryAction, PeripheralCoordinator,
};
pub use error::{ConnectionFailureReason, Error, Result};
pub use events::{CoordinatorEvent, EventDispatcher, EventReceiver, EventSender};
pub use orchestrator::PairingOrchestrator;
pub use peripheral::{PeripheralHandle, ValueCallback};
pub use traits::{
    DiscoveredService, RadioEvent, RadioEventReceiver, RadioEventSender, RadioState,
    RadioTransport, TagTransport,
};

// Re-export advertisement and transport helpers
pub use advertisement::extract_pairing_key;
pub use btle::{BtleplugConfig, BtleplugRadio};
pub use mock::{MockRadio, MockTag};
pub use tag::FileTag;
pub use tagpair_types::uuid as uuids;
