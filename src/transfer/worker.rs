//! Expiry Worker
//!
//! Background worker that closes PENDING transfers whose recipient never
//! acted, releasing the sender's reserved headroom.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::ledger::error::LedgerError;

use super::protocol::TransferProtocol;

/// Configuration for the expiry worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to scan for expired transfers
    pub scan_interval: Duration,
    /// Maximum transfers to expire per scan
    pub batch_size: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

/// Expiry Worker
///
/// Periodically expires PENDING transfers past `expires_at`. Late accept,
/// decline or cancel calls expire the transfer on their own; the worker
/// covers transfers nobody touches again.
pub struct ExpiryWorker {
    protocol: TransferProtocol,
    config: WorkerConfig,
}

impl ExpiryWorker {
    pub fn new(protocol: TransferProtocol, config: WorkerConfig) -> Self {
        Self { protocol, config }
    }

    /// Run the expiry loop forever
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Starting transfer expiry worker"
        );

        loop {
            if let Err(e) = self.scan_and_expire().await {
                error!(error = %e, "Expiry scan failed");
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Run a single scan. Keeps draining while full batches come back.
    pub async fn scan_and_expire(&self) -> Result<usize, LedgerError> {
        let batch_size = self.config.batch_size.max(1);
        let mut total = 0;
        loop {
            let expired = self.protocol.expire_due(Utc::now(), batch_size).await?;
            total += expired;
            if (expired as i64) < batch_size {
                break;
            }
        }

        if total > 0 {
            info!(count = total, "Expired transfers this scan");
        } else {
            debug!("No expired transfers found");
        }
        Ok(total)
    }
}
