//! Wallet ledger service
//!
//! ```text
//! ┌──────────┐    ┌────────────────┐    ┌─────────────┐
//! │ Gateway  │───▶│ Ledger/Transfer│───▶│ LedgerStore │
//! │ (axum)   │    │ Events/ATM     │    │ (PG | mem)  │
//! └──────────┘    └───────┬────────┘    └─────────────┘
//!                         │ after commit
//!                         ▼
//!                 ┌────────────────┐
//!                 │ Notification   │───▶ SMS
//!                 │ dispatcher     │
//!                 └────────────────┘
//! ```
//!
//! Background: transfer expiry sweeper, daily counter reset at 00:00 UTC.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rust_decimal::Decimal;

use wallet_ledger::atm::AtmCodeService;
use wallet_ledger::config::{AppConfig, NotifierKind};
use wallet_ledger::db::Database;
use wallet_ledger::gateway::{self, AppState};
use wallet_ledger::ledger::{
    Actor, InMemoryStore, LedgerEngine, LedgerStore, LimitEntry, PgLedgerStore, UserContact,
};
use wallet_ledger::notify::{HttpSmsNotifier, LogNotifier, NotificationDispatcher, Notifier};
use wallet_ledger::reset::{DailyResetJob, DailyResetWorker};
use wallet_ledger::transfer::{ExpiryWorker, TransferProtocol, WorkerConfig};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = wallet_ledger::logging::init_logging(&app_config);

    tracing::info!("Starting wallet ledger in {} mode", env);

    // Store
    let (store, pg_db): (Arc<dyn LedgerStore>, Option<Database>) = match &app_config.postgres_url
    {
        Some(url) => {
            let db = Database::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.migrate().await.context("Failed to apply schema")?;
            (Arc::new(PgLedgerStore::new(db.pool().clone())), Some(db))
        }
        None => {
            tracing::warn!("No postgres_url configured, using in-memory ledger");
            let store = InMemoryStore::new();
            seed_dev_store(&store).await?;
            (Arc::new(store), None)
        }
    };

    // Notifications
    let notifier: Arc<dyn Notifier> = match app_config.notifier.kind {
        NotifierKind::Log => Arc::new(LogNotifier),
        NotifierKind::Http => {
            let url = app_config
                .notifier
                .sms_url
                .clone()
                .context("notifier.sms_url is required for the http notifier")?;
            Arc::new(HttpSmsNotifier::new(
                url,
                Duration::from_millis(app_config.notifier.timeout_ms),
            )?)
        }
    };
    tracing::info!(notifier = notifier.name(), "Notifier selected");
    let (dispatcher, _delivery) =
        NotificationDispatcher::spawn(notifier, app_config.notifier.delivery());

    // Services
    let ledger_cfg = &app_config.ledger;
    let engine = LedgerEngine::new(store.clone(), dispatcher.clone());
    let transfers = TransferProtocol::new(store.clone(), dispatcher.clone())
        .with_ttl(chrono::Duration::seconds(ledger_cfg.transfer_ttl_secs));
    let atm = AtmCodeService::new(store.clone(), dispatcher.clone())
        .with_ttl(chrono::Duration::seconds(ledger_cfg.atm_code_ttl_secs));

    // Background workers
    let expiry = ExpiryWorker::new(
        transfers.clone(),
        WorkerConfig {
            scan_interval: Duration::from_secs(ledger_cfg.expiry_scan_interval_secs),
            batch_size: ledger_cfg.expiry_batch_size,
        },
    );
    tokio::spawn(async move { expiry.run().await });

    let reset = DailyResetWorker::new(DailyResetJob::new(
        store.clone(),
        ledger_cfg.reset_batch_size,
    ));
    tokio::spawn(async move { reset.run().await });

    // Gateway
    let mut state = AppState::new(
        engine,
        transfers,
        atm,
        app_config.webhook.secret.clone(),
        app_config.auth.jwt_secret.clone(),
    );
    if let Some(db) = pg_db {
        state = state.with_database(db);
    }

    let port = get_port_override().unwrap_or(app_config.gateway.port);
    gateway::run_server(&app_config.gateway.host, port, Arc::new(state)).await
}

/// Two users with a pair of wallets each, for local runs without PostgreSQL
async fn seed_dev_store(store: &InMemoryStore) -> anyhow::Result<()> {
    store.add_tier(1, 5).await;
    for (currency, withdrawal, transfer) in [("USD", 1_000, 2_000), ("EGP", 20_000, 50_000)] {
        store
            .set_limit(LimitEntry {
                tier_id: 1,
                currency: currency.to_string(),
                daily_withdrawal_limit: Decimal::from(withdrawal),
                daily_transfer_limit: Decimal::from(transfer),
                daily_transactions_limit: 20,
            })
            .await;
    }

    let users = [(1, "Ada", "Lovelace", "+201000000001"), (2, "Alan", "Turing", "+201000000002")];
    for (user_id, first_name, last_name, phone_number) in users {
        store
            .add_user(
                Actor {
                    user_id,
                    tier_id: 1,
                    is_active: true,
                },
                UserContact {
                    user_id,
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    phone_number: phone_number.to_string(),
                },
            )
            .await;
        for currency in ["USD", "EGP"] {
            let wallet = store
                .add_wallet(user_id, currency, Decimal::from(1_000))
                .await?;
            tracing::info!(user_id, wallet_id = wallet.id, %currency, "Seeded dev wallet");
        }
    }
    Ok(())
}
