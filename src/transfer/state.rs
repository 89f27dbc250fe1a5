//! Transfer actions and transitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ledger::models::TransactionStatus;

/// What the recipient does with a pending transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferAction {
    Accept,
    Decline,
}

impl TransferAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferAction::Accept => "accept",
            TransferAction::Decline => "decline",
        }
    }
}

impl fmt::Display for TransferAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(TransferAction::Accept),
            "decline" => Ok(TransferAction::Decline),
            other => Err(format!("Invalid action: {}. Use 'accept' or 'decline'", other)),
        }
    }
}

/// Transfer-leg transitions. Everything leaves PENDING; nothing leaves a
/// terminal status.
pub fn is_valid_transition(from: TransactionStatus, to: TransactionStatus) -> bool {
    from == TransactionStatus::Pending
        && matches!(
            to,
            TransactionStatus::Completed
                | TransactionStatus::Declined
                | TransactionStatus::Canceled
                | TransactionStatus::Failed
                | TransactionStatus::Expired
        )
}
