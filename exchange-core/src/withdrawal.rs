//! Withdrawal workflow
//!
//! A request escrows cash immediately by debiting the account. An admin
//! decision then either refunds the escrow (reject) or settles it against
//! the pool (approve): the user's internal MRX worth the requested amount is
//! converted back into the pool at the current price and the pool pays out
//! the INR. An approval the pool cannot absorb is rescinded into a rejection
//! with a full refund.
//!
//! ```text
//! pending ──approve──▶ approved ──▶ processing ──▶ processed
//!    │                    │
//!    └──reject──▶ rejected ◀──(auto-rescind)
//! ```
//!
//! Admins may force any status; transitions other than `pending → approved`,
//! `pending → rejected` and `approved → processed` only touch the request row.
//! Forcing a request back to `pending` does not escrow again, so its next
//! decision settles or refunds a second time (`rejected → pending → rejected`
//! refunds twice).

use crate::{
    accounts::AccountLedger,
    audit::{AdminAction, AuditLedger},
    config::MarketConfig,
    pool::{quote_sell_back, MarketPool, SellBackQuote},
    types::{
        new_record_id, round_inr, round_mrx, PoolState, RequestContext, TxnKind,
        WithdrawalRequest, WithdrawalStatus,
    },
    Config, Error, Result, Storage,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Destination bank account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    /// Bank name
    pub bank_name: String,
    /// Account number
    pub account_number: String,
    /// IFSC code
    pub ifsc_code: String,
}

impl BankDetails {
    fn validate(&self) -> Result<()> {
        if self.bank_name.trim().is_empty()
            || self.account_number.trim().is_empty()
            || self.ifsc_code.trim().is_empty()
        {
            return Err(Error::Validation("All bank details are required".to_string()));
        }
        if self
            .bank_name
            .chars()
            .chain(self.account_number.chars())
            .chain(self.ifsc_code.chars())
            .any(|c| c == '\t' || c == '\n' || c == '\r')
        {
            return Err(Error::Validation(
                "Bank details cannot contain tabs or line breaks".to_string(),
            ));
        }
        Ok(())
    }
}

/// Why an approval was turned into a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RescindReason {
    /// Holding worth less than the requested amount
    InsufficientMrx,
    /// Pool INR would fall below its minimum
    PoolMinimum,
    /// Post-conversion price below the floor
    PriceFloor,
}

impl RescindReason {
    /// Transaction kind logged for the refund
    pub fn txn_kind(&self) -> TxnKind {
        match self {
            RescindReason::InsufficientMrx => TxnKind::WithdrawalRejectedInsufficientMrx,
            RescindReason::PoolMinimum => TxnKind::WithdrawalRejectedPoolMinimum,
            RescindReason::PriceFloor => TxnKind::WithdrawalRejectedPriceFloor,
        }
    }

    fn remarks(&self, market: &MarketConfig) -> String {
        match self {
            RescindReason::InsufficientMrx => "Insufficient internal MRX for withdrawal".to_string(),
            RescindReason::PoolMinimum => format!(
                "Withdrawal would bring INR pool below ₹{}",
                market.min_inr_pool.round_dp(2)
            ),
            RescindReason::PriceFloor => format!(
                "Withdrawal violates price floor ₹{}",
                market.price_floor.round_dp(2)
            ),
        }
    }
}

/// What approving a pending request will do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApprovalPlan {
    /// Convert the holding and pay out of the pool
    Commit(SellBackQuote),
    /// Refund and reject instead
    AutoReject(RescindReason),
}

/// Decide how an approval of `amount` plays out against `pool` and `holding`
///
/// Pure: reads nothing and writes nothing. Fails only when the pool has no
/// MRX reserve. A committed quote carries the reserves exactly as they will
/// be stored, so the floor checked here is the floor `write_pool` sees.
pub fn plan_approval(
    pool: &PoolState,
    holding: Decimal,
    amount: Decimal,
    market: &MarketConfig,
) -> Result<ApprovalPlan> {
    let quote = quote_sell_back(pool, amount)?;
    let mrx_to_sell = round_mrx(quote.mrx_to_sell);
    let new_inr_reserve = round_inr(quote.new_inr_reserve);
    let new_mrx_reserve = round_mrx(pool.mrx_pool + mrx_to_sell);

    if holding < mrx_to_sell {
        return Ok(ApprovalPlan::AutoReject(RescindReason::InsufficientMrx));
    }
    if new_inr_reserve < market.min_inr_pool {
        return Ok(ApprovalPlan::AutoReject(RescindReason::PoolMinimum));
    }
    let new_price = new_inr_reserve / new_mrx_reserve;
    if new_price < market.price_floor {
        return Ok(ApprovalPlan::AutoReject(RescindReason::PriceFloor));
    }

    Ok(ApprovalPlan::Commit(SellBackQuote {
        price: quote.price,
        mrx_to_sell,
        new_inr_reserve,
        new_mrx_reserve,
        new_price,
    }))
}

/// Side effect applied by a decision
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum WithdrawalEffect {
    /// Holding converted and pool paid out
    Settled {
        /// MRX returned to the pool
        mrx_sold: Decimal,
        /// Price used
        price: Decimal,
        /// Price after the conversion
        new_price: Decimal,
    },
    /// Escrow refunded on admin rejection
    Refunded {
        /// INR returned
        amount: Decimal,
    },
    /// Approval rescinded with a refund
    AutoRejected {
        /// Why
        reason: RescindReason,
        /// INR returned
        amount: Decimal,
    },
    /// Bank transfer recorded
    Processed,
    /// Row updated, no balance or pool change
    StatusOnly,
}

/// Result of a decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawalOutcome {
    /// Request as stored after the decision
    pub request: WithdrawalRequest,
    /// Status before the decision
    pub previous_status: WithdrawalStatus,
    /// What happened
    pub effect: WithdrawalEffect,
}

/// A user's request in history listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawalSummary {
    /// Record id
    pub request_id: String,
    /// Escrowed INR
    pub amount: Decimal,
    /// Workflow state
    pub status: WithdrawalStatus,
    /// Destination bank
    pub bank_name: String,
    /// Last four digits of the account number
    pub account_number: String,
    /// Destination IFSC code
    pub ifsc_code: String,
    /// Epoch seconds
    pub created_at: i64,
    /// Epoch seconds
    pub processed_at: Option<i64>,
    /// Admin or system remarks
    pub remarks: String,
}

impl From<WithdrawalRequest> for WithdrawalSummary {
    fn from(req: WithdrawalRequest) -> Self {
        Self {
            account_number: req.masked_account_number(),
            request_id: req.request_id,
            amount: req.amount,
            status: req.status,
            bank_name: req.bank_name,
            ifsc_code: req.ifsc_code,
            created_at: req.created_at,
            processed_at: req.processed_at,
            remarks: req.remarks,
        }
    }
}

/// Withdrawal workflow over one storage
pub struct WithdrawalDesk<'a> {
    storage: &'a Storage,
    config: &'a Config,
}

impl<'a> WithdrawalDesk<'a> {
    /// Create handle
    pub fn new(storage: &'a Storage, config: &'a Config) -> Self {
        Self { storage, config }
    }

    /// Escrow `amount` from `ctx.actor` and open a pending request
    pub fn request_withdrawal(
        &self,
        ctx: &RequestContext,
        amount: Decimal,
        bank: BankDetails,
    ) -> Result<WithdrawalRequest> {
        let market = &self.config.market;
        let email = ctx.actor.as_str();

        if amount <= Decimal::ZERO {
            return Err(Error::Validation("Invalid amount".to_string()));
        }
        if round_inr(amount) != amount {
            return Err(Error::Validation(
                "Amount cannot have more than 2 decimal places".to_string(),
            ));
        }
        bank.validate()?;

        let accounts = AccountLedger::new(self.storage);
        let account = accounts.require_account(email)?;
        if account.inr_balance < amount {
            return Err(Error::InsufficientBalance(format!(
                "Required ₹{}, available ₹{}",
                amount, account.inr_balance
            )));
        }

        let pool = MarketPool::new(self.storage, market).read_pool()?;
        if pool.price().is_none() {
            return Err(Error::MarketUnavailable("MRX reserve is empty".to_string()));
        }
        if pool.inr_pool - amount < market.min_inr_pool {
            return Err(Error::InsufficientLiquidity(format!(
                "Would bring INR pool below ₹{}. Current pool: ₹{}, requested: ₹{}",
                market.min_inr_pool.round_dp(2),
                pool.inr_pool.round_dp(2),
                amount.round_dp(2)
            )));
        }

        let now = ctx.timestamp();
        accounts.adjust_balance(email, -amount)?;

        let request = WithdrawalRequest {
            request_id: new_record_id("WDR", now),
            user_email: email.to_string(),
            user_name: account.full_name,
            amount,
            status: WithdrawalStatus::Pending,
            bank_name: bank.bank_name.trim().to_string(),
            account_number: bank.account_number.trim().to_string(),
            ifsc_code: bank.ifsc_code.trim().to_uppercase(),
            created_at: now,
            processed_at: None,
            remarks: String::new(),
        };
        self.storage.withdrawals.append(&request)?;

        AuditLedger::new(self.storage).record_transaction(
            ctx,
            email,
            TxnKind::WithdrawalRequested,
            -amount,
            Decimal::ZERO,
            Decimal::ZERO,
        )?;

        tracing::info!(
            email,
            request_id = %request.request_id,
            amount = %amount,
            "Withdrawal requested"
        );
        Ok(request)
    }

    /// Apply an admin decision (`ctx.actor` is the admin)
    ///
    /// Side effects key off the stored status only. A request forced back to
    /// `pending` is treated like a fresh one, without a new debit.
    pub fn decide(
        &self,
        ctx: &RequestContext,
        request_id: &str,
        new_status: WithdrawalStatus,
        remarks: Option<&str>,
    ) -> Result<WithdrawalOutcome> {
        let market = &self.config.market;
        let request = self
            .storage
            .withdrawals
            .find(|r| r.request_id == request_id)?
            .ok_or_else(|| Error::NotFound(format!("Withdrawal request {}", request_id)))?;
        let previous = request.status;
        let email = request.user_email.as_str();
        let amount = request.amount;

        let accounts = AccountLedger::new(self.storage);
        let audit = AuditLedger::new(self.storage);
        let pool = MarketPool::new(self.storage, market);

        // Resolve what this decision turns into before touching anything
        let (final_status, final_remarks, effect) = match (previous, new_status) {
            (WithdrawalStatus::Pending, WithdrawalStatus::Approved) => {
                accounts.require_account(email)?;
                let state = pool.read_pool()?;
                let holding = accounts.get_internal_mrx(email)?;

                match plan_approval(&state, holding, amount, market)? {
                    ApprovalPlan::Commit(quote) => {
                        let mrx_sold = quote.mrx_to_sell;
                        let written = pool.write_pool(
                            quote.new_inr_reserve,
                            quote.new_mrx_reserve,
                            ctx.timestamp(),
                        )?;
                        accounts.set_internal_mrx(email, holding - mrx_sold, ctx.timestamp())?;
                        audit.record_transaction(
                            ctx,
                            email,
                            TxnKind::WithdrawalApproved,
                            Decimal::ZERO,
                            -mrx_sold,
                            quote.price,
                        )?;
                        (
                            WithdrawalStatus::Approved,
                            remarks.map(str::to_string),
                            WithdrawalEffect::Settled {
                                mrx_sold,
                                price: quote.price,
                                new_price: written.price().unwrap_or(quote.new_price),
                            },
                        )
                    }
                    ApprovalPlan::AutoReject(reason) => {
                        let price = state.price().unwrap_or_default();
                        accounts.adjust_balance(email, amount)?;
                        audit.record_transaction(
                            ctx,
                            email,
                            reason.txn_kind(),
                            amount,
                            Decimal::ZERO,
                            price,
                        )?;
                        tracing::warn!(
                            email,
                            request_id,
                            reason = ?reason,
                            "Withdrawal approval rescinded"
                        );
                        (
                            WithdrawalStatus::Rejected,
                            Some(reason.remarks(market)),
                            WithdrawalEffect::AutoRejected { reason, amount },
                        )
                    }
                }
            }
            (WithdrawalStatus::Pending, WithdrawalStatus::Rejected) => {
                accounts.adjust_balance(email, amount)?;
                audit.record_transaction(
                    ctx,
                    email,
                    TxnKind::WithdrawalRejectedRefund,
                    amount,
                    Decimal::ZERO,
                    Decimal::ZERO,
                )?;
                (
                    WithdrawalStatus::Rejected,
                    remarks.map(str::to_string),
                    WithdrawalEffect::Refunded { amount },
                )
            }
            (WithdrawalStatus::Approved, WithdrawalStatus::Processed) => {
                audit.record_transaction(
                    ctx,
                    email,
                    TxnKind::WithdrawalProcessed,
                    Decimal::ZERO,
                    Decimal::ZERO,
                    Decimal::ZERO,
                )?;
                (
                    WithdrawalStatus::Processed,
                    remarks.map(str::to_string),
                    WithdrawalEffect::Processed,
                )
            }
            (_, status) => (
                status,
                remarks.map(str::to_string),
                WithdrawalEffect::StatusOnly,
            ),
        };

        let now = ctx.timestamp();
        let mut stored = None;
        self.storage.withdrawals.update_where(
            |r| r.request_id == request_id,
            |r| {
                r.status = final_status;
                if matches!(
                    final_status,
                    WithdrawalStatus::Approved
                        | WithdrawalStatus::Processed
                        | WithdrawalStatus::Rejected
                ) {
                    r.processed_at = Some(now);
                }
                if let Some(text) = final_remarks.as_deref().filter(|t| !t.is_empty()) {
                    r.remarks = sanitize(text);
                }
                stored = Some(r.clone());
            },
        )?;
        let request = stored
            .ok_or_else(|| Error::NotFound(format!("Withdrawal request {}", request_id)))?;

        let mut details = format!(
            "Updated withdrawal from '{}' to '{}' - Amount: ₹{}",
            previous, final_status, amount
        );
        if let WithdrawalEffect::AutoRejected { reason, .. } = &effect {
            details.push_str(&format!(" (approval rescinded: {:?})", reason));
        }
        let action = format!("withdrawal_{}", final_status);
        audit.log_admin(
            ctx,
            AdminAction {
                action: &action,
                target_id: request_id,
                target_type: "withdrawal_request",
                details,
            },
        )?;

        tracing::info!(
            request_id,
            from = %previous,
            to = %final_status,
            "Withdrawal decided"
        );

        Ok(WithdrawalOutcome {
            request,
            previous_status: previous,
            effect,
        })
    }

    /// Request by id
    pub fn get_request(&self, request_id: &str) -> Result<Option<WithdrawalRequest>> {
        self.storage.withdrawals.find(|r| r.request_id == request_id)
    }

    /// A user's requests, newest first, account numbers masked
    pub fn user_requests(&self, email: &str) -> Result<Vec<WithdrawalSummary>> {
        let mut rows = self.storage.withdrawals.filter(|r| r.user_email == email)?;
        rows.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        Ok(rows.into_iter().map(WithdrawalSummary::from).collect())
    }

    /// Every request, newest first, optionally only one status
    pub fn all_requests(
        &self,
        status: Option<WithdrawalStatus>,
        limit: usize,
    ) -> Result<Vec<WithdrawalRequest>> {
        let mut rows = self
            .storage
            .withdrawals
            .filter(|r| status.map_or(true, |s| r.status == s))?;
        rows.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        rows.truncate(limit);
        Ok(rows)
    }
}

fn sanitize(text: &str) -> String {
    text.replace(['\t', '\n', '\r'], " ")
}
