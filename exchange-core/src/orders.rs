//! Order engine: buys against the pool
//!
//! A buy moves the order (less tax) into the INR reserve and allocates MRX at
//! the pre-trade price. The allocation is then marked to the post-trade price
//! and that value is folded straight back into the trader's cash balance, so
//! the trader realizes the price impact of their own order immediately.

use crate::{
    accounts::AccountLedger,
    audit::{AuditLedger, OrderDraft},
    meter::{DailyLimitStatus, DailyTradeMeter},
    pool::{quote_buy, MarketPool},
    types::{round_inr, round_mrx, RequestContext, TxnKind},
    Config, Error, Result, Storage,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Direction requested by the trader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    /// Buy MRX
    Bullish,
    /// Sell MRX (disabled)
    Bearish,
}

impl FromStr for Sentiment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "bullish" => Ok(Sentiment::Bullish),
            "bearish" => Ok(Sentiment::Bearish),
            _ => Err(Error::Validation("Invalid operation".to_string())),
        }
    }
}

/// Buy order input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuyOrder {
    /// Gross INR to invest
    pub amount: Decimal,
    /// Must be bullish
    pub sentiment: Sentiment,
}

/// Result of an executed buy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyReceipt {
    /// Balance event id
    pub txn_id: String,
    /// Tax record id
    pub tax_id: String,
    /// Order record id
    pub order_id: String,
    /// Gross order
    pub amount: Decimal,
    /// Tax withheld
    pub tax_amount: Decimal,
    /// INR that entered the pool
    pub amount_to_pool: Decimal,
    /// Price before the trade
    pub price_before: Decimal,
    /// Price after the trade
    pub price_after: Decimal,
    /// MRX added to the internal holding
    pub mrx_allocated: Decimal,
    /// Allocation valued at `price_after`
    pub mrx_value: Decimal,
    /// `mrx_value - amount`
    pub profit: Decimal,
    /// Profit as a percentage of the order
    pub percentage_return: Decimal,
    /// Cash balance after the trade
    pub new_inr_balance: Decimal,
    /// Internal MRX holding after the trade
    pub new_internal_mrx: Decimal,
    /// Daily cap usage including this trade
    pub daily: DailyLimitStatus,
}

/// Executes buys against one storage
pub struct OrderEngine<'a> {
    storage: &'a Storage,
    config: &'a Config,
}

impl<'a> OrderEngine<'a> {
    /// Create engine
    pub fn new(storage: &'a Storage, config: &'a Config) -> Self {
        Self { storage, config }
    }

    /// Validate and execute a buy for `ctx.actor`
    ///
    /// Guards run in a fixed order and the first failure wins; nothing is
    /// written until all of them pass.
    pub fn execute_buy(&self, ctx: &RequestContext, order: BuyOrder) -> Result<BuyReceipt> {
        let market = &self.config.market;
        let email = ctx.actor.as_str();
        let amount = order.amount;

        if order.sentiment == Sentiment::Bearish {
            return Err(Error::Validation(
                "Sell is disabled. Withdraw to exit your position.".to_string(),
            ));
        }
        if amount <= Decimal::ZERO {
            return Err(Error::Validation("Invalid amount".to_string()));
        }
        if round_inr(amount) != amount {
            return Err(Error::Validation(
                "Amount cannot have more than 2 decimal places".to_string(),
            ));
        }
        if amount > market.max_single_order {
            return Err(Error::Validation(format!(
                "Single order cannot exceed ₹{}",
                market.max_single_order.round_dp(2)
            )));
        }

        let meter = DailyTradeMeter::new(self.storage, market);
        let date = meter.trading_date(ctx);
        meter.check_limit(email, date, amount)?;

        let accounts = AccountLedger::new(self.storage);
        let account = accounts.require_account(email)?;
        if account.inr_balance < amount {
            return Err(Error::InsufficientBalance(format!(
                "Required ₹{}, available ₹{}",
                amount, account.inr_balance
            )));
        }

        let pool = MarketPool::new(self.storage, market);
        let state = pool.read_pool()?;
        let quote = quote_buy(&state, amount, market)?;

        // Holding and reserve move by the same stored quantity
        let allocated = round_mrx(quote.mrx_received);
        let mrx_value = quote.value_at_new_price();
        let new_inr_balance = account.inr_balance - amount + mrx_value;
        let now = ctx.timestamp();

        let written = pool.write_pool(
            quote.new_inr_reserve,
            state.mrx_pool - allocated,
            now,
        )?;
        let held = accounts.get_internal_mrx(email)?;
        let new_internal_mrx = accounts.set_internal_mrx(email, held + allocated, now)?;
        let new_inr_balance = accounts.set_balance(email, new_inr_balance)?;
        let daily_row = meter.record_trade(email, date, amount, now)?;

        let audit = AuditLedger::new(self.storage);
        let txn = audit.record_transaction(
            ctx,
            email,
            TxnKind::Buy,
            mrx_value - amount,
            allocated,
            quote.price_before,
        )?;

        let tax_remarks = format!(
            "Buy order tax: {}%, MRX allocated: {}, MRX value: ₹{}",
            (market.tax_rate * Decimal::ONE_HUNDRED).normalize(),
            allocated,
            round_inr(mrx_value)
        );
        let order_remarks = format!(
            "BUY: Invested ₹{}, got {} MRX worth ₹{} at new price",
            amount,
            allocated,
            round_inr(mrx_value)
        );
        let mut draft = OrderDraft {
            email,
            user_name: &account.full_name,
            order_type: "buy",
            amount_inr: amount,
            amount_mrx: allocated,
            price: quote.price_before,
            tax: quote.tax,
            remarks: &tax_remarks,
        };
        let tax = audit.record_tax(ctx, &draft, mrx_value)?;
        draft.remarks = &order_remarks;
        let order_record = audit.record_order(ctx, draft)?;

        let profit = mrx_value - amount;
        let price_after = written.price().unwrap_or(quote.new_price);

        tracing::info!(
            email,
            amount = %amount,
            mrx = %allocated,
            price_before = %quote.price_before.round_dp(4),
            price_after = %price_after.round_dp(4),
            "Buy executed"
        );

        Ok(BuyReceipt {
            txn_id: txn.txn_id,
            tax_id: tax.tax_id,
            order_id: order_record.order_id,
            amount,
            tax_amount: round_inr(quote.tax),
            amount_to_pool: round_inr(quote.net_to_pool),
            price_before: quote.price_before,
            price_after,
            mrx_allocated: allocated,
            mrx_value: round_inr(mrx_value),
            profit: round_inr(profit),
            percentage_return: (profit / amount * Decimal::ONE_HUNDRED).round_dp(2),
            new_inr_balance,
            new_internal_mrx,
            daily: meter.status_from(date, daily_row.total_amount),
        })
    }
}
