//! Core types for the exchange
//!
//! Every persisted entity maps to exactly one tab-separated file. Field names
//! double as the file's header columns, so the order of fields here is the
//! on-disk column order.
//!
//! - Money is exact ([`Decimal`]); INR is stored at 2 dp, MRX at 6 dp
//! - Timestamps are integer epoch seconds

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Decimal places kept for INR amounts
pub const INR_SCALE: u32 = 2;

/// Decimal places kept for MRX amounts
pub const MRX_SCALE: u32 = 6;

/// Decimal places kept for recorded prices
pub const PRICE_SCALE: u32 = 4;

/// Round an INR amount to storage precision
pub fn round_inr(value: Decimal) -> Decimal {
    value.round_dp(INR_SCALE)
}

/// Round an MRX amount to storage precision
pub fn round_mrx(value: Decimal) -> Decimal {
    value.round_dp(MRX_SCALE)
}

/// Generate a record id: prefix + epoch seconds + 6 upper-case hex chars
pub fn new_record_id(prefix: &str, timestamp: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    format!("{}{}{}", prefix, timestamp, suffix)
}

/// Caller context passed into every operation
///
/// Carries the clock and caller identity explicitly so no operation reads
/// ambient globals.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Current time for this request
    pub now: DateTime<Utc>,

    /// Authenticated caller (user email, or admin email for decisions)
    pub actor: String,

    /// Remote address of the caller, recorded on admin log entries
    pub remote_addr: Option<String>,
}

impl RequestContext {
    /// Context for `actor` at the current wall-clock time
    pub fn new(actor: impl Into<String>) -> Self {
        Self::at(actor, Utc::now())
    }

    /// Context for `actor` at a fixed time
    pub fn at(actor: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            now,
            actor: actor.into(),
            remote_addr: None,
        }
    }

    /// Attach the caller's remote address
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Epoch seconds
    pub fn timestamp(&self) -> i64 {
        self.now.timestamp()
    }
}

/// User account (`users.tsv`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Short account id
    pub user_id: String,
    /// Display name
    pub full_name: String,
    /// Unique key
    pub email: String,
    /// Mobile number
    pub mobile: String,
    /// Opaque credential supplied by the auth layer
    pub credential: String,
    /// Referral code given at signup (may be empty)
    pub referral: String,
    /// Authoritative cash balance
    #[serde(with = "rust_decimal::serde::str")]
    pub inr_balance: Decimal,
    /// Creation time (epoch seconds)
    pub created_at: i64,
}

/// A user's claim on the pool (`internal_mrx.tsv`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalMrxHolding {
    /// Unique key
    pub user_email: String,
    /// Never negative
    #[serde(with = "rust_decimal::serde::str")]
    pub internal_mrx_balance: Decimal,
    /// Last write (epoch seconds)
    pub last_updated: i64,
}

/// Singleton liquidity pool row (`market.tsv`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolState {
    /// INR reserve
    #[serde(with = "rust_decimal::serde::str")]
    pub inr_pool: Decimal,
    /// MRX reserve
    #[serde(with = "rust_decimal::serde::str")]
    pub mrx_pool: Decimal,
    /// Last write (epoch seconds)
    pub last_updated: i64,
}

impl PoolState {
    /// INR per MRX, `None` when the MRX reserve is empty
    pub fn price(&self) -> Option<Decimal> {
        if self.mrx_pool > Decimal::ZERO {
            Some(self.inr_pool / self.mrx_pool)
        } else {
            None
        }
    }
}

/// Kind of balance-affecting event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnKind {
    /// Buy against the pool
    #[serde(rename = "accelerate_bullish")]
    Buy,
    /// Funds escrowed for a withdrawal
    WithdrawalRequested,
    /// Withdrawal settled against the pool
    WithdrawalApproved,
    /// Escrow refunded on admin rejection
    WithdrawalRejectedRefund,
    /// Approval rescinded: holding too small
    WithdrawalRejectedInsufficientMrx,
    /// Approval rescinded: pool would fall below its minimum
    WithdrawalRejectedPoolMinimum,
    /// Approval rescinded: price would fall below the floor
    WithdrawalRejectedPriceFloor,
    /// Bank transfer completed
    WithdrawalProcessed,
    /// Deposit credited
    DepositApproved,
}

/// Immutable ledger event (`transactions.tsv`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Record id (`TXN…`)
    pub txn_id: String,
    /// Account the event belongs to
    pub user_email: String,
    /// Event kind
    #[serde(rename = "type")]
    pub kind: TxnKind,
    /// Signed change in cash
    #[serde(with = "rust_decimal::serde::str")]
    pub amount_inr: Decimal,
    /// Signed change in internal MRX
    #[serde(with = "rust_decimal::serde::str")]
    pub amount_mrx: Decimal,
    /// Pool price used
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    /// Epoch seconds
    pub timestamp: i64,
    /// Always `completed`
    pub status: String,
}

/// Withdrawal request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    /// Awaiting admin decision, funds escrowed
    Pending,
    /// Settled against the pool
    Approved,
    /// Bank transfer in flight
    Processing,
    /// Bank transfer done (terminal)
    Processed,
    /// Refunded or rescinded (terminal)
    Rejected,
}

impl WithdrawalStatus {
    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Processed => "processed",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    /// Check if terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Processed | WithdrawalStatus::Rejected)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim() {
            "pending" => Ok(WithdrawalStatus::Pending),
            "approved" => Ok(WithdrawalStatus::Approved),
            "processing" => Ok(WithdrawalStatus::Processing),
            "processed" => Ok(WithdrawalStatus::Processed),
            "rejected" => Ok(WithdrawalStatus::Rejected),
            other => Err(crate::Error::Validation(format!(
                "Invalid withdrawal status: {}",
                other
            ))),
        }
    }
}

/// Withdrawal request (`withdraw_request.tsv`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Record id (`WDR…`)
    pub request_id: String,
    /// Requesting account
    pub user_email: String,
    /// Account holder name at request time
    pub user_name: String,
    /// Escrowed INR
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    /// Workflow state
    pub status: WithdrawalStatus,
    /// Destination bank
    pub bank_name: String,
    /// Destination account number
    pub account_number: String,
    /// Destination IFSC code
    pub ifsc_code: String,
    /// Epoch seconds
    pub created_at: i64,
    /// Set on approve/process/reject
    pub processed_at: Option<i64>,
    /// Admin or system remarks
    pub remarks: String,
}

impl WithdrawalRequest {
    /// Account number reduced to its last four digits
    pub fn masked_account_number(&self) -> String {
        let n = self.account_number.chars().count();
        if n >= 4 {
            self.account_number.chars().skip(n - 4).collect()
        } else {
            String::new()
        }
    }
}

/// Deposit request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    /// Awaiting admin decision
    Pending,
    /// Credited to the account
    Approved,
    /// Declined
    Rejected,
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DepositStatus::Pending => "pending",
            DepositStatus::Approved => "approved",
            DepositStatus::Rejected => "rejected",
        })
    }
}

impl FromStr for DepositStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim() {
            "pending" => Ok(DepositStatus::Pending),
            "approved" => Ok(DepositStatus::Approved),
            "rejected" => Ok(DepositStatus::Rejected),
            other => Err(crate::Error::Validation(format!(
                "Invalid deposit status: {}",
                other
            ))),
        }
    }
}

/// Deposit claim (`deposit_request.tsv`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRequest {
    /// Record id (`DPR…`)
    pub request_id: String,
    /// Claiming account
    pub user_email: String,
    /// Claimed INR
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    /// External payment reference
    pub transaction_id: String,
    /// Contact phone
    pub phone: String,
    /// Payment method (`upi`, ...)
    pub payment_method: String,
    /// Workflow state
    pub status: DepositStatus,
    /// Epoch seconds
    pub created_at: i64,
}

/// Per-user, per-day traded notional (`daily_trades.tsv`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTradeAggregate {
    /// Trading calendar day
    pub date: NaiveDate,
    /// Trader
    pub user_email: String,
    /// Sum of buy notional for the day
    #[serde(with = "rust_decimal::serde::str")]
    pub total_amount: Decimal,
    /// Number of buys for the day
    pub transaction_count: u32,
    /// Epoch seconds
    pub last_updated: i64,
}

/// Tax charged on an order (`tax_collection.tsv`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRecord {
    /// Record id (`TAX…`)
    pub tax_id: String,
    /// Taxed account
    pub user_email: String,
    /// Account holder name
    pub user_name: String,
    /// Order type (`buy`)
    pub order_type: String,
    /// Gross order
    #[serde(with = "rust_decimal::serde::str")]
    pub order_amount: Decimal,
    /// Tax withheld
    #[serde(with = "rust_decimal::serde::str")]
    pub tax_amount: Decimal,
    /// Value of what the order bought at the post-trade price
    #[serde(with = "rust_decimal::serde::str")]
    pub order_worth: Decimal,
    /// Human-readable UTC time
    pub order_date: String,
    /// Epoch seconds
    pub timestamp: i64,
    /// Free text
    pub remarks: String,
}

/// Executed order (`orders.tsv`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Record id (`ORD…`)
    pub order_id: String,
    /// Trader
    pub user_email: String,
    /// Account holder name
    pub user_name: String,
    /// Order type (`buy`)
    pub order_type: String,
    /// Gross INR
    #[serde(with = "rust_decimal::serde::str")]
    pub order_amount_inr: Decimal,
    /// MRX allocated
    #[serde(with = "rust_decimal::serde::str")]
    pub order_amount_mrx: Decimal,
    /// Pool price before the trade
    #[serde(with = "rust_decimal::serde::str")]
    pub price_at_order: Decimal,
    /// Tax withheld
    #[serde(with = "rust_decimal::serde::str")]
    pub tax_amount: Decimal,
    /// Always `completed`
    pub status: String,
    /// Epoch seconds
    pub created_at: i64,
    /// Free text
    pub remarks: String,
}

/// Admin audit entry (`admin_log.tsv`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminLogEntry {
    /// Record id (`LOG…`)
    pub log_id: String,
    /// Acting admin
    pub admin_email: String,
    /// Action name (`withdrawal_approved`, `adjust_pool`, ...)
    pub action: String,
    /// Affected record
    pub target_id: String,
    /// Affected record type
    pub target_type: String,
    /// Free text
    pub details: String,
    /// Epoch seconds
    pub timestamp: i64,
    /// Caller address
    pub ip_address: String,
}
