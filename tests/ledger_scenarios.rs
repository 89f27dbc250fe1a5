//! End-to-end ledger scenarios against the in-memory store

mod common;

use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;

use common::{dec, ledger, phone, usd_limit};
use wallet_ledger::events::EventDispatcher;
use wallet_ledger::ledger::{
    LedgerError, LedgerStore, LimitKind, MoneySource, TransactionStatus, TransactionType,
};
use wallet_ledger::reset::DailyResetJob;
use wallet_ledger::transfer::{ExpiryWorker, TransferAction, TransferRequest, WorkerConfig};

fn transfer(from: i64, to: i64, amount: i64) -> TransferRequest {
    TransferRequest {
        source_wallet_id: from,
        target_wallet_id: to,
        amount: dec(amount),
        description: Some("rent".into()),
    }
}

// ============================================================================
// Reference scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_a_initiate_then_accept() {
    let l = ledger().await;
    let alice = l.user(1).await;
    let bob = l.user(2).await;
    let w1 = l.wallet(1, 200).await;
    let w2 = l.wallet(2, 10).await;

    let legs = l
        .transfers
        .initiate(&alice, transfer(w1.id, w2.id, 50))
        .await
        .unwrap();
    assert!(legs.reference().as_str().starts_with("WTRF-"));
    assert_eq!(legs.status(), Some(TransactionStatus::Pending));
    assert_eq!(legs.out_leg.transaction_type, TransactionType::TransferOut);
    assert_eq!(legs.in_leg.transaction_type, TransactionType::TransferIn);
    // Nothing moves until the recipient acts
    assert_eq!(l.reload(&w1).await.balance, dec(200));
    assert_eq!(l.reload(&w1).await.transferred_today, dec(50));

    let done = l
        .transfers
        .finalize(&bob, legs.reference(), TransferAction::Accept)
        .await
        .unwrap();
    assert_eq!(done.status(), Some(TransactionStatus::Completed));

    let w1 = l.reload(&w1).await;
    let w2 = l.reload(&w2).await;
    assert_eq!(w1.balance, dec(150));
    assert_eq!(w2.balance, dec(60));
    // Reservation kept, not counted twice
    assert_eq!(w1.transferred_today, dec(50));

    let stored = l.store.transfer_legs(legs.reference()).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(TransactionStatus::Completed));

    // initiated + accepted, both parties each
    assert!(l.sms.wait_for(4, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_scenario_b_insufficient_balance_creates_nothing() {
    let l = ledger().await;
    let alice = l.user(1).await;
    l.user(2).await;
    let w1 = l.wallet(1, 10).await;
    let w2 = l.wallet(2, 0).await;

    let err = l
        .transfers
        .initiate(&alice, transfer(w1.id, w2.id, 100))
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::InsufficientBalance);
    assert_eq!(l.store.transaction_count().await, 0);
    assert_eq!(l.reload(&w1).await.transferred_today, Decimal::ZERO);
}

#[tokio::test]
async fn test_scenario_c_limit_exceeded_reports_headroom() {
    let l = ledger().await;
    l.store.set_limit(usd_limit(1_000, 100, 50)).await;
    let alice = l.user(1).await;
    l.user(2).await;
    let w1 = l.wallet(1, 1_000).await;
    let w2 = l.wallet(2, 0).await;

    let err = l
        .transfers
        .initiate(&alice, transfer(w1.id, w2.id, 150))
        .await
        .unwrap_err();
    match err {
        LedgerError::LimitExceeded {
            kind,
            remaining,
            currency,
        } => {
            assert_eq!(kind, LimitKind::Transfer);
            assert_eq!(remaining, dec(100));
            assert_eq!(currency, "USD");
        }
        other => panic!("expected LimitExceeded, got {:?}", other),
    }
    assert_eq!(l.store.transaction_count().await, 0);
}

#[tokio::test]
async fn test_scenario_d_atm_deposit_event() {
    let l = ledger().await;
    l.user(1).await;
    let wallet = l.wallet(1, 500).await;
    let events = EventDispatcher::new(l.engine.clone(), l.atm.clone());

    let outcome = events
        .dispatch(&json!({"type": "deposit", "wallet_id": wallet.id, "amount": 75}))
        .await;
    assert!(outcome.success, "{:?}", outcome);
    assert_eq!(outcome.message, "Money received successfully");

    assert_eq!(l.reload(&wallet).await.balance, dec(575));
    let legs = l.store.wallet_transactions(wallet.id, 10).await.unwrap();
    assert_eq!(legs.len(), 1);
    assert_eq!(legs[0].transaction_type, TransactionType::Deposit);
    assert_eq!(legs[0].money_source, MoneySource::Atm);
    assert_eq!(legs[0].status, TransactionStatus::Completed);

    assert!(l.sms.wait_for(1, Duration::from_secs(2)).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(l.sms.sent_count(), 1);
    assert_eq!(l.sms.sent()[0].phone_number, phone(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scenario_e_concurrent_withdrawals_never_overdraw() {
    let l = ledger().await;
    l.user(1).await;
    let wallet = l.wallet(1, 100).await;

    let wallet_id = wallet.id;
    let mut handles = Vec::new();
    for _ in 0..2 {
        let engine = l.engine.clone();
        handles.push(tokio::spawn(async move {
            engine.withdraw(wallet_id, dec(60), MoneySource::Atm).await
        }));
    }

    let mut ok = 0;
    let mut insufficient = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(LedgerError::InsufficientBalance) => insufficient += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!((ok, insufficient), (1, 1));

    let wallet = l.reload(&wallet).await;
    assert_eq!(wallet.balance, dec(40));
    assert_eq!(wallet.withdrawn_today, dec(60));
}

#[tokio::test]
async fn test_scenario_f_used_atm_code_is_rejected() {
    let l = ledger().await;
    let alice = l.user(1).await;

    let issued = l.atm.issue(&alice).await.unwrap();
    let first = l.atm.login(&phone(1), &issued.code).await.unwrap();
    assert!(first.is_used);

    let err = l.atm.login(&phone(1), &issued.code).await.unwrap_err();
    assert_eq!(err, LedgerError::AlreadyUsed);

    let codes = l.store.atm_codes(1).await;
    assert_eq!(codes.len(), 1);
    assert!(codes[0].is_used);
}

// ============================================================================
// Transfer round-trips
// ============================================================================

#[tokio::test]
async fn test_decline_releases_reservation() {
    let l = ledger().await;
    let alice = l.user(1).await;
    let bob = l.user(2).await;
    let w1 = l.wallet(1, 300).await;
    let w2 = l.wallet(2, 0).await;

    let legs = l
        .transfers
        .initiate(&alice, transfer(w1.id, w2.id, 120))
        .await
        .unwrap();
    let declined = l
        .transfers
        .finalize(&bob, legs.reference(), TransferAction::Decline)
        .await
        .unwrap();
    assert_eq!(declined.status(), Some(TransactionStatus::Declined));

    let w1 = l.reload(&w1).await;
    assert_eq!(w1.balance, dec(300));
    assert_eq!(w1.transferred_today, Decimal::ZERO);
    assert_eq!(l.reload(&w2).await.balance, Decimal::ZERO);

    // Terminal: nothing left to settle
    let err = l
        .transfers
        .finalize(&bob, legs.reference(), TransferAction::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NoPendingTransaction(_)));
}

#[tokio::test]
async fn test_decline_after_reset_keeps_new_spending() {
    let l = ledger().await;
    let alice = l.user(1).await;
    let bob = l.user(2).await;
    let w1 = l.wallet(1, 1_000).await;
    let w2 = l.wallet(2, 0).await;

    let legs = l
        .transfers
        .initiate(&alice, transfer(w1.id, w2.id, 100))
        .await
        .unwrap();
    DailyResetJob::new(std::sync::Arc::new(l.store.clone()), 100)
        .run_once()
        .await
        .unwrap();
    l.engine
        .bank_transfer_out(&alice, w1.id, dec(200))
        .await
        .unwrap();

    // The reset already dropped the reservation; only the 200 sent since counts
    l.transfers
        .finalize(&bob, legs.reference(), TransferAction::Decline)
        .await
        .unwrap();
    let w1 = l.reload(&w1).await;
    assert_eq!(w1.transferred_today, dec(200));
    assert_eq!(w1.balance, dec(800));
}

#[tokio::test]
async fn test_accept_after_reset_charges_the_new_day() {
    let l = ledger().await;
    let alice = l.user(1).await;
    let bob = l.user(2).await;
    let w1 = l.wallet(1, 1_000).await;
    let w2 = l.wallet(2, 0).await;

    let legs = l
        .transfers
        .initiate(&alice, transfer(w1.id, w2.id, 100))
        .await
        .unwrap();
    assert_eq!(l.reload(&w1).await.transferred_today, dec(100));

    // Two resets on the same day are no different from one
    let job = DailyResetJob::new(std::sync::Arc::new(l.store.clone()), 100);
    job.run_once().await.unwrap();
    job.run_once().await.unwrap();
    assert_eq!(l.reload(&w1).await.transferred_today, Decimal::ZERO);

    l.transfers
        .finalize(&bob, legs.reference(), TransferAction::Accept)
        .await
        .unwrap();
    let w1 = l.reload(&w1).await;
    assert_eq!(w1.balance, dec(900));
    assert_eq!(w1.transferred_today, dec(100));
    assert_eq!(l.reload(&w2).await.balance, dec(100));
}

#[tokio::test]
async fn test_reservation_after_reset_is_released_normally() {
    let l = ledger().await;
    let alice = l.user(1).await;
    let w1 = l.wallet(1, 1_000).await;
    let w2 = l.wallet(2, 0).await;

    DailyResetJob::new(std::sync::Arc::new(l.store.clone()), 100)
        .run_once()
        .await
        .unwrap();
    let legs = l
        .transfers
        .initiate(&alice, transfer(w1.id, w2.id, 100))
        .await
        .unwrap();
    assert_eq!(legs.out_leg.reserved_epoch, Some(1));
    assert_eq!(legs.in_leg.reserved_epoch, None);

    l.transfers.cancel(&alice, legs.reference()).await.unwrap();
    assert_eq!(l.reload(&w1).await.transferred_today, Decimal::ZERO);
}

#[tokio::test]
async fn test_only_sender_cancels_only_recipient_settles() {
    let l = ledger().await;
    let alice = l.user(1).await;
    let bob = l.user(2).await;
    let w1 = l.wallet(1, 300).await;
    let w2 = l.wallet(2, 0).await;

    let legs = l
        .transfers
        .initiate(&alice, transfer(w1.id, w2.id, 100))
        .await
        .unwrap();

    let err = l.transfers.cancel(&bob, legs.reference()).await.unwrap_err();
    assert!(matches!(err, LedgerError::NoPendingTransaction(_)));
    let err = l
        .transfers
        .finalize(&alice, legs.reference(), TransferAction::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NoPendingTransaction(_)));

    let canceled = l.transfers.cancel(&alice, legs.reference()).await.unwrap();
    assert_eq!(canceled.status(), Some(TransactionStatus::Canceled));
    assert_eq!(l.reload(&w1).await.transferred_today, Decimal::ZERO);
    assert_eq!(l.reload(&w1).await.balance, dec(300));
}

#[tokio::test]
async fn test_accept_twice_settles_once() {
    let l = ledger().await;
    let alice = l.user(1).await;
    let bob = l.user(2).await;
    let w1 = l.wallet(1, 300).await;
    let w2 = l.wallet(2, 0).await;

    let legs = l
        .transfers
        .initiate(&alice, transfer(w1.id, w2.id, 100))
        .await
        .unwrap();
    l.transfers
        .finalize(&bob, legs.reference(), TransferAction::Accept)
        .await
        .unwrap();
    let err = l
        .transfers
        .finalize(&bob, legs.reference(), TransferAction::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NoPendingTransaction(_)));

    assert_eq!(l.reload(&w1).await.balance, dec(200));
    assert_eq!(l.reload(&w2).await.balance, dec(100));
}

#[tokio::test]
async fn test_insufficient_balance_at_accept_leaves_transfer_pending() {
    let l = ledger().await;
    let alice = l.user(1).await;
    let bob = l.user(2).await;
    let w1 = l.wallet(1, 100).await;
    let w2 = l.wallet(2, 0).await;

    let legs = l
        .transfers
        .initiate(&alice, transfer(w1.id, w2.id, 100))
        .await
        .unwrap();
    // Funds leave through another channel while the transfer waits
    l.engine.bank_transfer_out(&alice, w1.id, dec(50)).await.unwrap();

    let err = l
        .transfers
        .finalize(&bob, legs.reference(), TransferAction::Accept)
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::InsufficientBalance);

    let stored = l.store.transfer_legs(legs.reference()).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(TransactionStatus::Pending));
    assert_eq!(l.reload(&w1).await.balance, dec(50));
    assert_eq!(l.reload(&w2).await.balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_lowered_limit_fails_transfer_at_settlement() {
    let l = ledger().await;
    l.store.set_limit(usd_limit(1_000, 100, 50)).await;
    let alice = l.user(1).await;
    let bob = l.user(2).await;
    let w1 = l.wallet(1, 500).await;
    let w2 = l.wallet(2, 0).await;

    let legs = l
        .transfers
        .initiate(&alice, transfer(w1.id, w2.id, 80))
        .await
        .unwrap();
    l.store.set_limit(usd_limit(1_000, 50, 50)).await;

    let err = l
        .transfers
        .finalize(&bob, legs.reference(), TransferAction::Accept)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::LimitExceeded {
            kind: LimitKind::Transfer,
            ..
        }
    ));

    let stored = l.store.transfer_legs(legs.reference()).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(TransactionStatus::Failed));
    let w1 = l.reload(&w1).await;
    assert_eq!(w1.balance, dec(500));
    assert_eq!(w1.transferred_today, Decimal::ZERO);
}

#[tokio::test]
async fn test_expired_transfer_cannot_be_accepted() {
    let l = ledger().await;
    let transfers = l.transfers.clone().with_ttl(chrono::Duration::zero());
    let alice = l.user(1).await;
    let bob = l.user(2).await;
    let w1 = l.wallet(1, 300).await;
    let w2 = l.wallet(2, 0).await;

    let legs = transfers
        .initiate(&alice, transfer(w1.id, w2.id, 100))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = transfers
        .finalize(&bob, legs.reference(), TransferAction::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::TransferExpired(_)));

    let stored = l.store.transfer_legs(legs.reference()).await.unwrap().unwrap();
    assert_eq!(stored.status(), Some(TransactionStatus::Expired));
    assert_eq!(l.reload(&w1).await.transferred_today, Decimal::ZERO);
    assert_eq!(l.reload(&w2).await.balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_expiry_worker_sweeps_stale_transfers() {
    let l = ledger().await;
    let transfers = l.transfers.clone().with_ttl(chrono::Duration::zero());
    let alice = l.user(1).await;
    l.user(2).await;
    let w1 = l.wallet(1, 1_000).await;
    let w2 = l.wallet(2, 0).await;

    let mut references = Vec::new();
    for amount in [10, 20, 30] {
        let legs = transfers
            .initiate(&alice, transfer(w1.id, w2.id, amount))
            .await
            .unwrap();
        references.push(legs.reference().clone());
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    let worker = ExpiryWorker::new(
        transfers.clone(),
        WorkerConfig {
            scan_interval: Duration::from_secs(60),
            batch_size: 2,
        },
    );
    assert_eq!(worker.scan_and_expire().await.unwrap(), 3);
    assert_eq!(worker.scan_and_expire().await.unwrap(), 0);

    for reference in &references {
        let legs = l.store.transfer_legs(reference).await.unwrap().unwrap();
        assert_eq!(legs.status(), Some(TransactionStatus::Expired));
    }
    assert_eq!(l.reload(&w1).await.transferred_today, Decimal::ZERO);
}

#[tokio::test]
async fn test_legs_are_visible_to_parties_only() {
    let l = ledger().await;
    let alice = l.user(1).await;
    let bob = l.user(2).await;
    let mallory = l.user(3).await;
    let w1 = l.wallet(1, 300).await;
    let w2 = l.wallet(2, 0).await;

    let legs = l
        .transfers
        .initiate(&alice, transfer(w1.id, w2.id, 100))
        .await
        .unwrap();

    assert_eq!(l.transfers.legs(&alice, legs.reference()).await.unwrap(), legs);
    assert_eq!(l.transfers.legs(&bob, legs.reference()).await.unwrap(), legs);
    assert!(matches!(
        l.transfers.legs(&mallory, legs.reference()).await,
        Err(LedgerError::NoPendingTransaction(_))
    ));
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_initiate_rejections() {
    let l = ledger().await;
    let alice = l.user(1).await;
    let bob = l.user(2).await;
    let w1 = l.wallet(1, 300).await;
    let w2 = l.wallet(2, 0).await;
    let egp = l.store.add_wallet(2, "EGP", dec(0)).await.unwrap();

    let err = l
        .transfers
        .initiate(&alice, transfer(w1.id, w1.id, 10))
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::SameWallet);

    let err = l
        .transfers
        .initiate(&alice, transfer(w1.id, egp.id, 10))
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::CurrencyMismatch);

    let err = l
        .transfers
        .initiate(&bob, transfer(w1.id, w2.id, 10))
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::NotWalletOwner);

    let err = l
        .transfers
        .initiate(&alice, transfer(w1.id, 9_999, 10))
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::WalletNotFound(9_999));

    let mut req = transfer(w1.id, w2.id, 10);
    req.amount = Decimal::new(1005, 3);
    assert!(matches!(
        l.transfers.initiate(&alice, req).await,
        Err(LedgerError::Validation(_))
    ));

    let mut req = transfer(w1.id, w2.id, 10);
    req.description = Some("x".repeat(256));
    assert!(matches!(
        l.transfers.initiate(&alice, req).await,
        Err(LedgerError::Validation(_))
    ));

    l.engine.deactivate_wallet(&bob, w2.id).await.unwrap();
    let err = l
        .transfers
        .initiate(&alice, transfer(w1.id, w2.id, 10))
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::InactiveWallet(w2.id));

    assert_eq!(l.store.transaction_count().await, 0);
}

#[tokio::test]
async fn test_daily_transaction_count_limit() {
    let l = ledger().await;
    l.store.set_limit(usd_limit(1_000, 5_000, 2)).await;
    l.user(1).await;
    let wallet = l.wallet(1, 500).await;

    l.engine.withdraw(wallet.id, dec(10), MoneySource::Atm).await.unwrap();
    l.engine.withdraw(wallet.id, dec(10), MoneySource::Atm).await.unwrap();
    let err = l
        .engine
        .withdraw(wallet.id, dec(10), MoneySource::Atm)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::LimitExceeded {
            kind: LimitKind::TransactionCount,
            ..
        }
    ));
    assert_eq!(l.reload(&wallet).await.balance, dec(480));
}

#[tokio::test]
async fn test_withdrawal_limit_then_reset() {
    let l = ledger().await;
    l.store.set_limit(usd_limit(100, 5_000, 50)).await;
    l.user(1).await;
    let wallet = l.wallet(1, 500).await;

    l.engine.withdraw(wallet.id, dec(70), MoneySource::Atm).await.unwrap();
    let err = l
        .engine
        .withdraw(wallet.id, dec(40), MoneySource::Atm)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("withdraw 30 USD"), "{}", err);

    let job = DailyResetJob::new(std::sync::Arc::new(l.store.clone()), 100);
    job.run_once().await.unwrap();
    assert_eq!(l.reload(&wallet).await.withdrawn_today, Decimal::ZERO);

    l.engine.withdraw(wallet.id, dec(40), MoneySource::Atm).await.unwrap();
    assert_eq!(l.reload(&wallet).await.balance, dec(390));
}

// ============================================================================
// Wallet lifecycle
// ============================================================================

#[tokio::test]
async fn test_open_wallet_names_and_quota() {
    let l = ledger().await;
    let alice = l.user(1).await;

    let first = l.engine.open_wallet(&alice, "usd", None).await.unwrap();
    let second = l.engine.open_wallet(&alice, "USD", None).await.unwrap();
    assert_eq!(first.name, "USD Wallet");
    assert_eq!(second.name, "USD Wallet 2");
    assert_eq!(first.currency, "USD");
    assert_eq!(first.balance, Decimal::ZERO);

    let err = l
        .engine
        .open_wallet(&alice, "EGP", Some("USD Wallet"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateWalletName(_)));

    for name in ["Travel", "Savings", "Bills"] {
        l.engine.open_wallet(&alice, "EGP", Some(name)).await.unwrap();
    }
    let err = l.engine.open_wallet(&alice, "EGP", None).await.unwrap_err();
    assert_eq!(err, LedgerError::WalletQuotaExceeded);
}

#[tokio::test]
async fn test_deactivated_wallet_takes_no_money() {
    let l = ledger().await;
    let alice = l.user(1).await;
    let wallet = l.wallet(1, 100).await;

    let closed = l.engine.deactivate_wallet(&alice, wallet.id).await.unwrap();
    assert!(!closed.is_active);

    let err = l
        .engine
        .deposit(wallet.id, dec(10), MoneySource::BankTransfer)
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::InactiveWallet(wallet.id));

    let err = l.engine.deactivate_wallet(&alice, wallet.id).await.unwrap_err();
    assert_eq!(err, LedgerError::WalletAlreadyInactive);
    assert_eq!(l.reload(&wallet).await.balance, dec(100));
}

#[tokio::test]
async fn test_bank_transfer_out_counts_against_transfer_limit() {
    let l = ledger().await;
    l.store.set_limit(usd_limit(1_000, 100, 50)).await;
    let alice = l.user(1).await;
    let bob = l.user(2).await;
    let wallet = l.wallet(1, 500).await;

    let leg = l
        .engine
        .bank_transfer_out(&alice, wallet.id, dec(60))
        .await
        .unwrap();
    assert_eq!(leg.money_source, MoneySource::BankTransfer);
    assert_eq!(leg.status, TransactionStatus::Completed);
    assert!(leg.reference.as_str().starts_with("TXN-"));

    let err = l
        .engine
        .bank_transfer_out(&alice, wallet.id, dec(50))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::LimitExceeded { .. }));

    let err = l
        .engine
        .bank_transfer_out(&bob, wallet.id, dec(10))
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::NotWalletOwner);

    let wallet = l.reload(&wallet).await;
    assert_eq!(wallet.balance, dec(440));
    assert_eq!(wallet.transferred_today, dec(60));
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_event_login_consumes_code() {
    let l = ledger().await;
    let alice = l.user(1).await;
    let events = EventDispatcher::new(l.engine.clone(), l.atm.clone());
    let code = l.atm.issue(&alice).await.unwrap();

    let event = json!({"type": "login", "phone_number": phone(1), "pass_code": code.code});
    let outcome = events.dispatch(&event).await;
    assert!(outcome.success, "{:?}", outcome);
    assert_eq!(outcome.message, "Correct credentials");

    let again = events.dispatch(&event).await;
    assert!(!again.success);
    assert_eq!(again.code, Some("ALREADY_USED"));
}

#[tokio::test]
async fn test_event_withdrawal_and_unknown_type() {
    let l = ledger().await;
    l.user(1).await;
    let wallet = l.wallet(1, 100).await;
    let events = EventDispatcher::new(l.engine.clone(), l.atm.clone());

    let outcome = events
        .dispatch(&json!({"type": "withdrawal", "wallet_id": wallet.id, "amount": "150"}))
        .await;
    assert!(!outcome.success);
    assert_eq!(outcome.code, Some("INSUFFICIENT_BALANCE"));

    let outcome = events
        .dispatch(&json!({"type": "withdrawal", "wallet_id": wallet.id, "amount": "25.50"}))
        .await;
    assert!(outcome.success, "{:?}", outcome);
    assert_eq!(l.reload(&wallet).await.balance, Decimal::new(7450, 2));

    let outcome = events.dispatch(&json!({"type": "refund"})).await;
    assert!(!outcome.success);
    assert_eq!(outcome.message, "Invalid Event type");
}
