use std::sync::Arc;

use crate::atm::AtmCodeService;
use crate::db::Database;
use crate::events::EventDispatcher;
use crate::ledger::engine::LedgerEngine;
use crate::ledger::store::LedgerStore;
use crate::transfer::TransferProtocol;

/// Gateway application state (shared)
#[derive(Clone)]
pub struct AppState {
    /// Ledger store, used to resolve the bearer's account
    pub store: Arc<dyn LedgerStore>,
    pub engine: LedgerEngine,
    pub transfers: TransferProtocol,
    pub atm: AtmCodeService,
    /// Bank/ATM event routing for the webhook
    pub events: Arc<EventDispatcher>,
    /// PostgreSQL handle for health checks; `None` with the in-memory store
    pub pg_db: Option<Database>,
    /// Expected `X-Webhook-Token`
    pub webhook_secret: String,
    /// HS256 key for bearer tokens
    pub jwt_secret: String,
}

impl AppState {
    pub fn new(
        engine: LedgerEngine,
        transfers: TransferProtocol,
        atm: AtmCodeService,
        webhook_secret: impl Into<String>,
        jwt_secret: impl Into<String>,
    ) -> Self {
        let store = engine.store().clone();
        let events = Arc::new(EventDispatcher::new(engine.clone(), atm.clone()));
        Self {
            store,
            engine,
            transfers,
            atm,
            events,
            pg_db: None,
            webhook_secret: webhook_secret.into(),
            jwt_secret: jwt_secret.into(),
        }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.pg_db = Some(db);
        self
    }
}
