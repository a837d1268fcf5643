//! Deposit workflow
//!
//! Users claim a deposit made outside the system; an admin approval credits
//! the claimed amount. A request is credited at most once, however many
//! times it is approved.

use crate::{
    accounts::AccountLedger,
    audit::{AdminAction, AuditLedger},
    types::{new_record_id, round_inr, DepositRequest, DepositStatus, RequestContext, TxnKind},
    Config, Error, Result, Storage,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Deposit claim input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositClaim {
    /// Claimed INR
    pub amount: Decimal,
    /// External payment reference
    pub transaction_id: String,
    /// Contact phone as given by the user
    pub phone: String,
    /// Payment method, `upi` when absent
    pub payment_method: Option<String>,
}

/// Result of a deposit decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositOutcome {
    /// Request after the decision
    pub request: DepositRequest,
    /// Status before the decision
    pub previous_status: DepositStatus,
    /// INR credited by this decision (zero unless newly approved)
    pub credited: Decimal,
}

/// Deposit workflow over one storage
pub struct DepositDesk<'a> {
    storage: &'a Storage,
    config: &'a Config,
}

impl<'a> DepositDesk<'a> {
    /// Create handle
    pub fn new(storage: &'a Storage, config: &'a Config) -> Self {
        Self { storage, config }
    }

    /// Record a pending claim for `ctx.actor`; no balance change
    pub fn request_deposit(&self, ctx: &RequestContext, claim: DepositClaim) -> Result<DepositRequest> {
        let bounds = &self.config.deposit;
        let reference = claim.transaction_id.trim();
        let phone = claim.phone.trim();
        let method = claim
            .payment_method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("upi");

        if claim.amount < bounds.min_amount || claim.amount > bounds.max_amount {
            return Err(Error::Validation(format!(
                "Amount must be between ₹{} and ₹{}",
                bounds.min_amount, bounds.max_amount
            )));
        }
        if round_inr(claim.amount) != claim.amount {
            return Err(Error::Validation(
                "Amount cannot have more than 2 decimal places".to_string(),
            ));
        }
        if reference.chars().count() < bounds.min_reference_len {
            return Err(Error::Validation(format!(
                "Invalid transaction ID (min {} characters)",
                bounds.min_reference_len
            )));
        }
        if [reference, phone, method]
            .iter()
            .any(|s| s.contains(['\t', '\n', '\r']))
        {
            return Err(Error::Validation(
                "Deposit fields cannot contain tabs or line breaks".to_string(),
            ));
        }

        AccountLedger::new(self.storage).require_account(&ctx.actor)?;

        let now = ctx.timestamp();
        let request = DepositRequest {
            request_id: new_record_id("DPR", now),
            user_email: ctx.actor.clone(),
            amount: claim.amount,
            transaction_id: reference.to_string(),
            phone: phone.to_string(),
            payment_method: method.to_string(),
            status: DepositStatus::Pending,
            created_at: now,
        };
        self.storage.deposits.append(&request)?;

        tracing::info!(
            email = %request.user_email,
            request_id = %request.request_id,
            amount = %request.amount,
            "Deposit requested"
        );
        Ok(request)
    }

    /// Apply an admin decision (`ctx.actor` is the admin)
    pub fn decide(
        &self,
        ctx: &RequestContext,
        request_id: &str,
        new_status: DepositStatus,
    ) -> Result<DepositOutcome> {
        let current = self
            .storage
            .deposits
            .find(|r| r.request_id == request_id)?
            .ok_or_else(|| Error::NotFound(format!("Deposit request {}", request_id)))?;
        let previous = current.status;

        let credits = new_status == DepositStatus::Approved && previous != DepositStatus::Approved;
        let audit = AuditLedger::new(self.storage);

        if credits {
            AccountLedger::new(self.storage).adjust_balance(&current.user_email, current.amount)?;
            audit.record_transaction(
                ctx,
                &current.user_email,
                TxnKind::DepositApproved,
                current.amount,
                Decimal::ZERO,
                Decimal::ZERO,
            )?;
        }

        let mut stored = None;
        self.storage.deposits.update_where(
            |r| r.request_id == request_id,
            |r| {
                r.status = new_status;
                stored = Some(r.clone());
            },
        )?;
        let request =
            stored.ok_or_else(|| Error::NotFound(format!("Deposit request {}", request_id)))?;

        let action = format!("deposit_{}", new_status);
        let details = if credits {
            format!(
                "Approved deposit of ₹{} for {}",
                request.amount, request.user_email
            )
        } else {
            format!("Updated deposit from '{}' to '{}'", previous, new_status)
        };
        audit.log_admin(
            ctx,
            AdminAction {
                action: &action,
                target_id: request_id,
                target_type: "deposit_request",
                details,
            },
        )?;

        let credited = if credits { request.amount } else { Decimal::ZERO };
        tracing::info!(
            request_id,
            from = %previous,
            to = %new_status,
            credited = %credited,
            "Deposit decided"
        );

        Ok(DepositOutcome {
            request,
            previous_status: previous,
            credited,
        })
    }

    /// A user's requests, newest first
    pub fn user_requests(&self, email: &str, limit: usize) -> Result<Vec<DepositRequest>> {
        let mut rows = self.storage.deposits.filter(|r| r.user_email == email)?;
        rows.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    /// Every request, newest first, optionally only one status
    pub fn all_requests(&self, status: Option<DepositStatus>, limit: usize) -> Result<Vec<DepositRequest>> {
        let mut rows = self
            .storage
            .deposits
            .filter(|r| status.map_or(true, |s| r.status == s))?;
        rows.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        rows.truncate(limit);
        Ok(rows)
    }
}
