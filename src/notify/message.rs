//! Notification texts

use rust_decimal::Decimal;
use serde::Serialize;

use crate::core_types::Reference;
use crate::ledger::models::UserContact;

/// One rendered outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sms {
    pub phone_number: String,
    pub message: String,
}

/// Parties and terms of one wallet-to-wallet transfer
#[derive(Debug, Clone)]
pub struct TransferNotice {
    pub sender: UserContact,
    pub recipient: UserContact,
    pub source_wallet_name: String,
    pub currency: String,
    pub amount: Decimal,
    pub reference: Reference,
}

/// One completed single-leg operation on a wallet
#[derive(Debug, Clone)]
pub struct WalletNotice {
    pub owner: UserContact,
    pub wallet_name: String,
    pub currency: String,
    pub amount: Decimal,
    pub reference: Reference,
}

#[derive(Debug, Clone)]
pub enum Notification {
    TransferInitiated(TransferNotice),
    TransferAccepted(TransferNotice),
    TransferDeclined(TransferNotice),
    TransferCanceled(TransferNotice),
    TransferFailed(TransferNotice),
    TransferExpired(TransferNotice),
    Deposit(WalletNotice),
    Withdrawal(WalletNotice),
    BankTransferOut(WalletNotice),
    AtmCode { phone_number: String, code: String },
}

fn sms(to: &UserContact, message: String) -> Sms {
    Sms {
        phone_number: to.phone_number.clone(),
        message,
    }
}

impl TransferNotice {
    fn money(&self) -> String {
        format!("{} {:.2}", self.currency, self.amount)
    }

    fn sender_line(&self, outcome: &str) -> Sms {
        let r = &self.recipient;
        sms(
            &self.sender,
            format!(
                "Hi {}, your transfer of {} to {} ({}) has {}. The transaction reference is {}.",
                self.sender.first_name,
                self.money(),
                r.full_name(),
                r.phone_number,
                outcome,
                self.reference
            ),
        )
    }

    fn recipient_line(&self, what: &str) -> Sms {
        let s = &self.sender;
        sms(
            &self.recipient,
            format!(
                "Hi {}, {} a transfer of {} from {} ({}). The transaction reference is {}.",
                self.recipient.first_name,
                what,
                self.money(),
                s.full_name(),
                s.phone_number,
                self.reference
            ),
        )
    }
}

impl Notification {
    /// Render into the messages to send, one per recipient
    pub fn render(&self) -> Vec<Sms> {
        match self {
            Notification::TransferInitiated(n) => vec![
                sms(
                    &n.sender,
                    format!(
                        "Hi {}, you have initiated a transfer of {} to {} ({}) from your wallet {}. \
                         The transaction reference is {}. Waiting for the receiver to accept.",
                        n.sender.first_name,
                        n.money(),
                        n.recipient.full_name(),
                        n.recipient.phone_number,
                        n.source_wallet_name,
                        n.reference
                    ),
                ),
                sms(
                    &n.recipient,
                    format!(
                        "Hi {}, you have a pending transfer of {} from {} ({}). \
                         You can accept the transfer through the app. The transaction reference is {}.",
                        n.recipient.first_name,
                        n.money(),
                        n.sender.full_name(),
                        n.sender.phone_number,
                        n.reference
                    ),
                ),
            ],
            Notification::TransferAccepted(n) => vec![
                n.sender_line("been accepted"),
                n.recipient_line("you've accepted"),
            ],
            Notification::TransferDeclined(n) => vec![
                n.sender_line("been declined"),
                n.recipient_line("you've declined"),
            ],
            Notification::TransferCanceled(n) => vec![
                n.sender_line("been canceled"),
                n.recipient_line("the sender canceled"),
            ],
            Notification::TransferFailed(n) => vec![
                n.sender_line("failed"),
                n.recipient_line("we could not complete"),
            ],
            Notification::TransferExpired(n) => vec![
                n.sender_line("expired"),
                n.recipient_line("time ran out to accept"),
            ],
            Notification::Deposit(n) => vec![sms(
                &n.owner,
                format!(
                    "You've successfully deposited {} {:.2} to your wallet {}. Transaction reference {}",
                    n.currency, n.amount, n.wallet_name, n.reference
                ),
            )],
            Notification::Withdrawal(n) => vec![sms(
                &n.owner,
                format!(
                    "You've successfully withdrawn {} {:.2} from your wallet {}. Transaction reference {}",
                    n.currency, n.amount, n.wallet_name, n.reference
                ),
            )],
            Notification::BankTransferOut(n) => vec![sms(
                &n.owner,
                format!(
                    "You've sent {} {:.2} from your wallet {} through bank transfer. Transaction reference {}",
                    n.currency, n.amount, n.wallet_name, n.reference
                ),
            )],
            Notification::AtmCode { phone_number, code } => vec![Sms {
                phone_number: phone_number.clone(),
                message: format!(
                    "Your ATM code is {}. Please keep it safe and do not share it with anyone.",
                    code
                ),
            }],
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::TransferInitiated(_) => "transfer_initiated",
            Notification::TransferAccepted(_) => "transfer_accepted",
            Notification::TransferDeclined(_) => "transfer_declined",
            Notification::TransferCanceled(_) => "transfer_canceled",
            Notification::TransferFailed(_) => "transfer_failed",
            Notification::TransferExpired(_) => "transfer_expired",
            Notification::Deposit(_) => "deposit",
            Notification::Withdrawal(_) => "withdrawal",
            Notification::BankTransferOut(_) => "bank_transfer_out",
            Notification::AtmCode { .. } => "atm_code",
        }
    }
}
