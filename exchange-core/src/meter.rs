//! Daily trade meter
//!
//! One row per (calendar day, user) holding the summed buy notional. The
//! calendar day is taken in the configured market time zone, not UTC.

use crate::{
    config::MarketConfig,
    store::RecordFile,
    types::{round_inr, DailyTradeAggregate, RequestContext},
    Error, Result, Storage,
};
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

/// Today's usage against the daily cap
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyLimitStatus {
    /// Trading day
    pub date: NaiveDate,
    /// Configured cap
    pub limit: Decimal,
    /// Notional traded so far
    pub used: Decimal,
    /// Cap minus used (never negative)
    pub remaining: Decimal,
    /// True once `used ≥ limit`
    pub limit_reached: bool,
}

/// Handle to the daily aggregates
pub struct DailyTradeMeter<'a> {
    file: &'a RecordFile<DailyTradeAggregate>,
    config: &'a MarketConfig,
}

impl<'a> DailyTradeMeter<'a> {
    /// Create handle
    pub fn new(storage: &'a Storage, config: &'a MarketConfig) -> Self {
        Self {
            file: &storage.daily_trades,
            config,
        }
    }

    /// Calendar day of `ctx.now` in the market time zone
    pub fn trading_date(&self, ctx: &RequestContext) -> NaiveDate {
        let shift = Duration::minutes(i64::from(self.config.utc_offset_minutes));
        (ctx.now + shift).date_naive()
    }

    /// Notional traded by `email` on `date`, zero if no row
    pub fn get_daily_total(&self, email: &str, date: NaiveDate) -> Result<Decimal> {
        Ok(self
            .file
            .find(|r| r.date == date && r.user_email == email)?
            .map(|r| r.total_amount)
            .unwrap_or(Decimal::ZERO))
    }

    /// Add one trade of `amount` to the (date, email) row
    pub fn record_trade(
        &self,
        email: &str,
        date: NaiveDate,
        amount: Decimal,
        now: i64,
    ) -> Result<DailyTradeAggregate> {
        let row = self.file.upsert(
            |r| r.date == date && r.user_email == email,
            |r| {
                r.total_amount = round_inr(r.total_amount + amount);
                r.transaction_count += 1;
                r.last_updated = now;
            },
            || DailyTradeAggregate {
                date,
                user_email: email.to_string(),
                total_amount: round_inr(amount),
                transaction_count: 1,
                last_updated: now,
            },
        )?;

        tracing::debug!(email, %date, total = %row.total_amount, "Daily trade recorded");
        Ok(row)
    }

    /// Fail with `DailyLimitExceeded` if `amount` on top of today's total
    /// would pass the cap
    pub fn check_limit(&self, email: &str, date: NaiveDate, amount: Decimal) -> Result<Decimal> {
        let used = self.get_daily_total(email, date)?;
        let limit = self.config.daily_trading_limit;

        if used + amount > limit {
            return Err(Error::DailyLimitExceeded(format!(
                "Limit: ₹{}, Used: ₹{}, Remaining: ₹{}",
                limit.round_dp(2),
                used.round_dp(2),
                (limit - used).max(Decimal::ZERO).round_dp(2)
            )));
        }
        Ok(used)
    }

    /// Usage for `email` on `date`
    pub fn status(&self, email: &str, date: NaiveDate) -> Result<DailyLimitStatus> {
        let used = self.get_daily_total(email, date)?;
        Ok(self.status_from(date, used))
    }

    pub(crate) fn status_from(&self, date: NaiveDate, used: Decimal) -> DailyLimitStatus {
        let limit = self.config.daily_trading_limit;
        DailyLimitStatus {
            date,
            limit,
            used,
            remaining: (limit - used).max(Decimal::ZERO),
            limit_reached: used >= limit,
        }
    }

    /// Drop the (date, email) row; returns the total it held
    pub fn reset(&self, email: &str, date: NaiveDate) -> Result<Decimal> {
        let removed = self
            .file
            .retain(|r| !(r.date == date && r.user_email == email))?;
        Ok(removed.iter().map(|r| r.total_amount).sum())
    }

    /// Every row for `date`
    pub fn rows_for_date(&self, date: NaiveDate) -> Result<Vec<DailyTradeAggregate>> {
        self.file.filter(|r| r.date == date)
    }
}
