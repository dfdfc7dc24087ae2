//! Scan command implementation.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use tagpair_core::{DiscoveryAction, PeripheralId, ServiceFilter};

use crate::cli::OutputFormat;
use crate::commands::{deadline, open_radio};
use crate::config::Config;

/// One peripheral seen advertising a pairing key.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct Sighting {
    id: PeripheralId,
    name: Option<String>,
    pairing_key: String,
}

pub async fn cmd_scan(
    timeout: Duration,
    services: Vec<Uuid>,
    format: OutputFormat,
    quiet: bool,
    config: &Config,
) -> Result<()> {
    let mut coordinator = open_radio(config).await?;
    let sightings: Arc<Mutex<Vec<Sighting>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sightings);
    let live = format == OutputFormat::Text && !quiet;

    coordinator
        .start_scan(services.into_iter().collect::<ServiceFilter>(), move |handle, key| {
            let sighting = Sighting {
                id: handle.id().clone(),
                name: handle.name().map(str::to_string),
                pairing_key: key.to_string(),
            };
            if live {
                println!("{}", format_sighting(&sighting));
            }
            record(&mut sink.lock().unwrap_or_else(PoisonError::into_inner), sighting);
            DiscoveryAction::Continue
        })
        .await
        .context("Failed to start scan")?;

    info!("Scanning for {:?}", timeout);
    coordinator.run(deadline(timeout)).await;
    coordinator.shutdown().await;

    let sightings = sightings
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sightings)?),
        OutputFormat::Text if sightings.is_empty() && !quiet => {
            println!("No peripherals advertising a pairing key found")
        }
        OutputFormat::Text => {}
    }
    Ok(())
}

/// Keep the latest sighting per peripheral.
fn record(sightings: &mut Vec<Sighting>, sighting: Sighting) {
    match sightings.iter_mut().find(|s| s.id == sighting.id) {
        Some(existing) => *existing = sighting,
        None => sightings.push(sighting),
    }
}

fn format_sighting(sighting: &Sighting) -> String {
    format!(
        "{}  {:<20}  key {}",
        sighting.id,
        sighting.name.as_deref().unwrap_or("Unknown"),
        sighting.pairing_key
    )
}
