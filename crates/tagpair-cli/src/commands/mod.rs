//! Command implementations for the CLI.

mod pair;
mod scan;
mod tag;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tagpair_core::{
    BtleplugConfig, BtleplugRadio, CoordinatorConfig, ManagerState, PeripheralCoordinator,
    RadioTransport,
};

use crate::config::Config;

pub use pair::cmd_pair;
pub use scan::cmd_scan;
pub use tag::{cmd_decode, cmd_encode};

/// How long to wait for the adapter to report itself ready.
const RADIO_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Open the Bluetooth adapter and wait until it is ready.
async fn open_radio(config: &Config) -> Result<PeripheralCoordinator<BtleplugRadio>> {
    let mut radio_config = BtleplugConfig::default();
    if let Some(secs) = config.connect_timeout {
        radio_config = radio_config.connect_timeout(Duration::from_secs(secs));
    }

    let radio = BtleplugRadio::with_config(radio_config)
        .await
        .context("Failed to open Bluetooth adapter")?;
    let coordinator_config = CoordinatorConfig::new().stop_scan_on_match(!config.keep_scanning);
    let mut coordinator = PeripheralCoordinator::with_config(radio, coordinator_config)?;

    wait_until_ready(&mut coordinator, RADIO_READY_TIMEOUT).await?;
    Ok(coordinator)
}

async fn wait_until_ready<T: RadioTransport>(
    coordinator: &mut PeripheralCoordinator<T>,
    limit: Duration,
) -> Result<()> {
    let wait = async {
        while coordinator.manager_state() == ManagerState::Unavailable {
            if !coordinator.process_next().await {
                bail!("Bluetooth adapter closed its event stream");
            }
        }
        Ok(())
    };

    tokio::time::timeout(limit, wait)
        .await
        .context("Bluetooth adapter did not become ready")??;
    debug!("Radio ready");
    Ok(())
}

/// A token cancelled after `limit` or on Ctrl-C, whichever comes first.
fn deadline(limit: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(limit) => debug!("Run time elapsed"),
            _ = tokio::signal::ctrl_c() => debug!("Interrupted"),
            _ = token.cancelled() => {}
        }
        token.cancel();
    });
    cancel
}

#[cfg(test)]
mod tests {
    use tagpair_core::MockRadio;

    use super::*;

    #[tokio::test]
    async fn test_wait_until_ready() {
        let radio = MockRadio::new();
        let mut coordinator = PeripheralCoordinator::new(radio.clone());
        radio.power_on();

        wait_until_ready(&mut coordinator, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(coordinator.manager_state(), ManagerState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_ready_times_out() {
        let radio = MockRadio::new();
        let mut coordinator = PeripheralCoordinator::new(radio.clone());

        let err = wait_until_ready(&mut coordinator, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did not become ready"));
    }

    #[tokio::test]
    async fn test_wait_until_ready_stream_closed() {
        let radio = MockRadio::new();
        let mut coordinator = PeripheralCoordinator::new(radio.clone());
        radio.unsubscribe_events();

        let err = wait_until_ready(&mut coordinator, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("closed"));
    }
}
