//! Event Dispatcher
//!
//! Routes bank/ATM webhook events to the ledger. The set of event kinds is
//! closed; each kind has exactly one handler, chosen from a table built at
//! construction.
//!
//! Dispatch never fails: every branch, including unknown kinds and internal
//! faults, comes back as an [`EventOutcome`]. Internal fault detail is
//! logged and replaced by a generic message.

pub mod handlers;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::atm::AtmCodeService;
use crate::ledger::engine::LedgerEngine;
use crate::ledger::error::LedgerError;

use handlers::{DepositHandler, LoginHandler, WithdrawalHandler};

/// Kinds of inbound events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Deposit,
    Withdrawal,
    Login,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Deposit => "deposit",
            EventKind::Withdrawal => "withdrawal",
            EventKind::Login => "login",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(EventKind::Deposit),
            "withdrawal" => Ok(EventKind::Withdrawal),
            "login" => Ok(EventKind::Login),
            other => Err(LedgerError::InvalidEventType(other.to_string())),
        }
    }
}

/// Structured result of one event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventOutcome {
    pub success: bool,
    pub message: String,
    /// Stable error kind on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    /// Field name -> messages, on validation failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl EventOutcome {
    pub fn ok(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            code: None,
            errors: None,
            data,
        }
    }

    pub fn invalid(errors: FieldErrors) -> Self {
        Self {
            success: false,
            message: "Validation error".into(),
            code: Some("VALIDATION_ERROR"),
            errors: Some(Value::Object(errors.0)),
            data: None,
        }
    }

    /// Failure from a ledger error. Internal detail never leaves this function.
    pub fn from_error(kind: &str, e: &LedgerError) -> Self {
        if e.is_internal() {
            error!(event = kind, error = %e, "Event failed with internal error");
        } else {
            warn!(event = kind, code = e.code(), error = %e, "Event rejected");
        }
        Self {
            success: false,
            message: e.public_message(),
            code: Some(e.code()),
            errors: None,
            data: None,
        }
    }
}

/// Per-field validation messages, shaped like `{"amount": ["..."]}`
#[derive(Debug, Default)]
pub struct FieldErrors(Map<String, Value>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        let entry = self
            .0
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = entry {
            list.push(Value::String(message.into()));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Handles one kind of event
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Value) -> EventOutcome;
}

pub struct EventDispatcher {
    handlers: HashMap<EventKind, Box<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new(engine: LedgerEngine, atm: AtmCodeService) -> Self {
        let mut handlers: HashMap<EventKind, Box<dyn EventHandler>> = HashMap::new();
        handlers.insert(EventKind::Deposit, Box::new(DepositHandler::new(engine.clone())));
        handlers.insert(EventKind::Withdrawal, Box::new(WithdrawalHandler::new(engine)));
        handlers.insert(EventKind::Login, Box::new(LoginHandler::new(atm)));
        Self { handlers }
    }

    /// Route `event` by its `type` field
    pub async fn dispatch(&self, event: &Value) -> EventOutcome {
        let raw = event.get("type").and_then(Value::as_str).unwrap_or_default();
        let kind = match raw.parse::<EventKind>() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(event_type = raw, "Unknown event type");
                return Self::invalid_type(&e);
            }
        };

        match self.handlers.get(&kind) {
            Some(handler) => handler.handle(event).await,
            None => Self::invalid_type(&LedgerError::InvalidEventType(raw.to_string())),
        }
    }

    fn invalid_type(e: &LedgerError) -> EventOutcome {
        EventOutcome {
            success: false,
            message: "Invalid Event type".into(),
            code: Some(e.code()),
            errors: None,
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_parse() {
        assert_eq!("deposit".parse::<EventKind>(), Ok(EventKind::Deposit));
        assert_eq!("login".parse::<EventKind>(), Ok(EventKind::Login));
        assert_eq!(
            "refund".parse::<EventKind>(),
            Err(LedgerError::InvalidEventType("refund".into()))
        );
    }

    #[test]
    fn test_field_errors_shape() {
        let mut errors = FieldErrors::default();
        errors.add("amount", "This field is required.");
        errors.add("amount", "Must be positive.");
        errors.add("wallet_id", "This field is required.");
        let outcome = EventOutcome::invalid(errors);

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Validation error");
        assert_eq!(json["errors"]["amount"].as_array().unwrap().len(), 2);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_internal_errors_are_masked() {
        let outcome = EventOutcome::from_error("deposit", &LedgerError::Database("pool timed out".into()));
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Unexpected error occurred");
        assert_eq!(outcome.code, Some("DATABASE_ERROR"));
    }
}
