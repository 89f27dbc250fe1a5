//! Shared fixtures for the scenario tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use wallet_ledger::atm::AtmCodeService;
use wallet_ledger::ledger::{
    Actor, InMemoryStore, LedgerEngine, LimitEntry, UserContact, Wallet,
};
use wallet_ledger::notify::{DeliveryConfig, MockNotifier, NotificationDispatcher};
use wallet_ledger::transfer::TransferProtocol;

pub const TIER: i64 = 1;

pub struct Ledger {
    pub store: InMemoryStore,
    pub sms: Arc<MockNotifier>,
    pub notifier: NotificationDispatcher,
    pub engine: LedgerEngine,
    pub transfers: TransferProtocol,
    pub atm: AtmCodeService,
}

/// In-memory ledger with USD limits of 1000 withdrawn / 5000 transferred /
/// 50 outgoing legs per day, and a wallet quota of 5
pub async fn ledger() -> Ledger {
    let store = InMemoryStore::new();
    store.add_tier(TIER, 5).await;
    store.set_limit(usd_limit(1_000, 5_000, 50)).await;

    let sms = Arc::new(MockNotifier::new());
    let (notifier, _handle) = NotificationDispatcher::spawn(
        sms.clone(),
        DeliveryConfig {
            queue_size: 256,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(1),
        },
    );

    let shared: Arc<InMemoryStore> = Arc::new(store.clone());
    Ledger {
        engine: LedgerEngine::new(shared.clone(), notifier.clone()),
        transfers: TransferProtocol::new(shared.clone(), notifier.clone()),
        atm: AtmCodeService::new(shared, notifier.clone()),
        store,
        sms,
        notifier,
    }
}

pub fn usd_limit(withdrawal: i64, transfer: i64, count: i64) -> LimitEntry {
    LimitEntry {
        tier_id: TIER,
        currency: "USD".into(),
        daily_withdrawal_limit: Decimal::from(withdrawal),
        daily_transfer_limit: Decimal::from(transfer),
        daily_transactions_limit: count,
    }
}

pub fn phone(user_id: i64) -> String {
    format!("+2010000000{:02}", user_id)
}

impl Ledger {
    pub async fn user(&self, user_id: i64) -> Actor {
        let actor = Actor {
            user_id,
            tier_id: TIER,
            is_active: true,
        };
        self.store
            .add_user(
                actor.clone(),
                UserContact {
                    user_id,
                    first_name: format!("User{}", user_id),
                    last_name: "Test".into(),
                    phone_number: phone(user_id),
                },
            )
            .await;
        actor
    }

    pub async fn wallet(&self, user_id: i64, balance: i64) -> Wallet {
        self.store
            .add_wallet(user_id, "USD", Decimal::from(balance))
            .await
            .unwrap()
    }

    pub async fn reload(&self, wallet: &Wallet) -> Wallet {
        use wallet_ledger::ledger::LedgerStore;
        self.store.get_wallet(wallet.id).await.unwrap().unwrap()
    }
}

pub fn dec(v: i64) -> Decimal {
    Decimal::from(v)
}
