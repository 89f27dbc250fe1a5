//! One handler per event kind

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use crate::atm::AtmCodeService;
use crate::core_types::WalletId;
use crate::ledger::engine::LedgerEngine;
use crate::ledger::models::MoneySource;
use crate::money::amount_from_json;

use super::{EventHandler, EventOutcome, FieldErrors};

const REQUIRED: &str = "This field is required.";

/// `wallet_id` and `amount` of a money event, or the per-field errors
fn parse_money_event(event: &Value) -> Result<(WalletId, Decimal), FieldErrors> {
    let mut errors = FieldErrors::default();

    let wallet_id = match event.get("wallet_id") {
        None | Some(Value::Null) => {
            errors.add("wallet_id", REQUIRED);
            None
        }
        Some(Value::Number(n)) => n.as_i64().filter(|id| *id > 0).or_else(|| {
            errors.add("wallet_id", "A valid wallet id is required.");
            None
        }),
        Some(Value::String(s)) => s.trim().parse::<WalletId>().ok().filter(|id| *id > 0).or_else(|| {
            errors.add("wallet_id", "A valid wallet id is required.");
            None
        }),
        Some(_) => {
            errors.add("wallet_id", "A valid wallet id is required.");
            None
        }
    };

    let amount = match event.get("amount") {
        None | Some(Value::Null) => {
            errors.add("amount", REQUIRED);
            None
        }
        Some(v) => amount_from_json(v)
            .map_err(|e| errors.add("amount", e.to_string()))
            .ok(),
    };

    match (wallet_id, amount) {
        (Some(wallet_id), Some(amount)) if errors.is_empty() => Ok((wallet_id, amount)),
        _ => Err(errors),
    }
}

// ============================================================================
// Deposit
// ============================================================================

pub struct DepositHandler {
    engine: LedgerEngine,
}

impl DepositHandler {
    pub fn new(engine: LedgerEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EventHandler for DepositHandler {
    async fn handle(&self, event: &Value) -> EventOutcome {
        let (wallet_id, amount) = match parse_money_event(event) {
            Ok(parsed) => parsed,
            Err(errors) => return EventOutcome::invalid(errors),
        };

        match self.engine.deposit(wallet_id, amount, MoneySource::Atm).await {
            Ok(leg) => EventOutcome::ok(
                "Money received successfully",
                Some(json!({ "reference": leg.reference, "amount": leg.amount })),
            ),
            Err(e) => EventOutcome::from_error("deposit", &e),
        }
    }
}

// ============================================================================
// Withdrawal
// ============================================================================

pub struct WithdrawalHandler {
    engine: LedgerEngine,
}

impl WithdrawalHandler {
    pub fn new(engine: LedgerEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EventHandler for WithdrawalHandler {
    async fn handle(&self, event: &Value) -> EventOutcome {
        let (wallet_id, amount) = match parse_money_event(event) {
            Ok(parsed) => parsed,
            Err(errors) => return EventOutcome::invalid(errors),
        };

        match self.engine.withdraw(wallet_id, amount, MoneySource::Atm).await {
            Ok(leg) => EventOutcome::ok(
                "Money withdrawn successfully",
                Some(json!({ "reference": leg.reference, "amount": leg.amount })),
            ),
            Err(e) => EventOutcome::from_error("withdrawal", &e),
        }
    }
}

// ============================================================================
// Login
// ============================================================================

pub struct LoginHandler {
    atm: AtmCodeService,
}

impl LoginHandler {
    pub fn new(atm: AtmCodeService) -> Self {
        Self { atm }
    }
}

#[async_trait]
impl EventHandler for LoginHandler {
    async fn handle(&self, event: &Value) -> EventOutcome {
        let phone_number = event.get("phone_number").and_then(Value::as_str).unwrap_or_default();
        let pass_code = match event.get("pass_code") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        let mut errors = FieldErrors::default();
        if phone_number.trim().is_empty() {
            errors.add("phone_number", REQUIRED);
        }
        if pass_code.trim().is_empty() {
            errors.add("pass_code", REQUIRED);
        }
        if !errors.is_empty() {
            return EventOutcome::invalid(errors);
        }

        match self.atm.login(phone_number, &pass_code).await {
            Ok(code) => EventOutcome::ok(
                "Correct credentials",
                Some(json!({ "user_id": code.user_id })),
            ),
            Err(e) => EventOutcome::from_error("login", &e),
        }
    }
}
