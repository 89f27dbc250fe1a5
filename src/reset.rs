//! Daily Reset Job
//!
//! Zeroes `transferred_today` and `withdrawn_today` on every wallet at the
//! start of each accounting day (00:00 UTC). Wallets are walked by id in
//! bounded batches, each batch its own unit of work, so row locks are never
//! held across the whole table.
//!
//! Running the job twice in one day is harmless. Each completed run is
//! recorded against its accounting day, so a process that was down across
//! midnight catches up as soon as it starts.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::{error, info};

use crate::core_types::WalletId;
use crate::ledger::error::LedgerError;
use crate::ledger::limits::accounting_day_start;
use crate::ledger::store::LedgerStore;

pub const DEFAULT_RESET_BATCH_SIZE: i64 = 500;

fn accounting_day(now: DateTime<Utc>) -> NaiveDate {
    accounting_day_start(now).date_naive()
}

/// Start of the accounting day after the one containing `now`
pub fn next_reset_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = accounting_day_start(now);
    today.checked_add_days(Days::new(1)).unwrap_or(today)
}

pub struct DailyResetJob {
    store: Arc<dyn LedgerStore>,
    batch_size: i64,
}

impl DailyResetJob {
    pub fn new(store: Arc<dyn LedgerStore>, batch_size: i64) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Whether the accounting day containing `now` has not been reset yet
    pub async fn is_due(&self, now: DateTime<Utc>) -> Result<bool, LedgerError> {
        let today = accounting_day(now);
        let last = self.store.last_daily_reset().await?;
        Ok(last.is_none_or(|day| day < today))
    }

    /// Reset every wallet once and record today's reset. Returns the number
    /// of wallets touched.
    pub async fn run_once(&self) -> Result<u64, LedgerError> {
        let day = accounting_day(Utc::now());
        let mut cursor: WalletId = 0;
        let mut total = 0;
        let mut batches = 0;

        loop {
            let mut tx = self.store.begin().await?;
            let ids = tx.wallet_ids_after(cursor, self.batch_size).await?;
            let Some(&last) = ids.last() else {
                break;
            };
            total += tx.reset_daily_counters(&ids).await?;
            tx.commit().await?;

            cursor = last;
            batches += 1;
        }

        let mut tx = self.store.begin().await?;
        tx.record_daily_reset(day).await?;
        tx.commit().await?;

        info!(wallets = total, batches, %day, "Daily counters reset");
        Ok(total)
    }
}

/// Runs [`DailyResetJob`] at every UTC midnight
pub struct DailyResetWorker {
    job: DailyResetJob,
}

impl DailyResetWorker {
    pub fn new(job: DailyResetJob) -> Self {
        Self { job }
    }

    /// Reset now if today's reset is missing, then at every UTC midnight
    pub async fn run(&self) -> ! {
        loop {
            if let Err(e) = self.catch_up(Utc::now()).await {
                error!(error = %e, "Daily reset failed");
            }

            let now = Utc::now();
            let next = next_reset_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next_reset = %next, "Daily reset scheduled");
            tokio::time::sleep(wait).await;
        }
    }

    /// Run the job if the day containing `now` has not been reset. Returns
    /// whether it ran.
    pub async fn catch_up(&self, now: DateTime<Utc>) -> Result<bool, LedgerError> {
        if !self.job.is_due(now).await? {
            return Ok(false);
        }
        self.job.run_once().await?;
        Ok(true)
    }
}
