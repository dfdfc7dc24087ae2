//! Pair command implementation.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use tagpair_core::{
    BtleplugRadio, ConnectionState, FileTag, PairingOrchestrator, PeripheralHandle,
    PeripheralId, ServiceFilter,
};

use crate::commands::{deadline, open_radio};
use crate::config::Config;

type Outcome = Arc<Mutex<Option<tagpair_core::Result<PeripheralHandle>>>>;

/// Read the tag, connect to the peripheral advertising its key and print
/// characteristic values until the run time elapses.
pub async fn cmd_pair(
    tag_path: &Path,
    timeout: Duration,
    services: Vec<Uuid>,
    quiet: bool,
    config: &Config,
) -> Result<()> {
    let coordinator = open_radio(config).await?;
    let mut orchestrator: PairingOrchestrator<FileTag, BtleplugRadio, Value> =
        PairingOrchestrator::new(FileTag::new(tag_path), coordinator);

    let outcome: Outcome = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&outcome);
    let mut tag_error = None;

    orchestrator
        .read_and_connect(
            services.into_iter().collect::<ServiceFilter>(),
            || debug!(tag = %tag_path.display(), "Tag session active"),
            |record| match record {
                Ok(record) if !quiet => {
                    let key = record.pairing_key().unwrap_or("-");
                    println!("Tag key {}, waiting for peripheral...", key);
                }
                Ok(_) => {}
                Err(e) => tag_error = Some(e),
            },
            move |result| {
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
            },
        )
        .await;

    if let Some(e) = tag_error {
        orchestrator.coordinator_mut().shutdown().await;
        return Err(anyhow!(e).context(format!("Failed to read tag {}", tag_path.display())));
    }

    let cancel = deadline(timeout);
    let mut paired: Option<PeripheralId> = None;
    let result = loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            event = orchestrator.coordinator_mut().next_event() => event,
        };
        let Some(event) = event else {
            break Err(anyhow!("Bluetooth adapter closed its event stream"));
        };
        orchestrator.coordinator_mut().handle_event(event).await;

        if paired.is_none() {
            match take(&outcome) {
                Some(Ok(handle)) => {
                    info!(peripheral = %handle.id(), "Paired");
                    if !quiet {
                        println!(
                            "Connected to {} ({})",
                            handle.name().unwrap_or("Unknown"),
                            handle.id()
                        );
                    }
                    orchestrator.register_value_listener(&handle, print_value)?;
                    paired = Some(handle.id().clone());
                }
                Some(Err(e)) => break Err(anyhow!(e).context("Failed to connect")),
                None => {}
            }
        } else if let Some(id) = &paired
            && orchestrator
                .coordinator()
                .peripheral(id)
                .is_some_and(|handle| handle.state() == ConnectionState::Disconnected)
        {
            break Err(anyhow!("Peripheral {} disconnected", id));
        }
    };

    cancel.cancel();
    orchestrator
        .disconnect(|| debug!("Pair session finished"))
        .await;
    orchestrator.coordinator_mut().shutdown().await;

    if paired.is_none() && result.is_ok() {
        bail!("No peripheral advertising the tag's key was found");
    }
    result
}

fn take(outcome: &Outcome) -> Option<tagpair_core::Result<PeripheralHandle>> {
    outcome.lock().unwrap_or_else(PoisonError::into_inner).take()
}

fn print_value(characteristic: Uuid, data: Option<&[u8]>) {
    println!("{}", format_value(characteristic, data));
}

fn format_value(characteristic: Uuid, data: Option<&[u8]>) -> String {
    match data {
        Some(data) => {
            let hex: Vec<String> = data.iter().map(|byte| format!("{:02x}", byte)).collect();
            format!("{}  {}", characteristic, hex.join(" "))
        }
        None => format!("{}  (no data)", characteristic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        let uuid = Uuid::from_u128(0x2a19);
        assert_eq!(
            format_value(uuid, Some(&[0x00, 0x5a, 0xff])),
            format!("{}  00 5a ff", uuid)
        );
        assert_eq!(format_value(uuid, None), format!("{}  (no data)", uuid));
    }

    #[test]
    fn test_take_empties_slot() {
        let outcome: Outcome = Arc::new(Mutex::new(Some(Ok(PeripheralHandle::new("p-1")))));
        let handle = take(&outcome).unwrap().unwrap();
        assert_eq!(handle.id(), &PeripheralId::from("p-1"));
        assert!(take(&outcome).is_none());
    }
}
