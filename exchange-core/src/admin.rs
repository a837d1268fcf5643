//! Admin overrides: pool adjustment and daily-limit reset

use crate::{
    audit::{AdminAction, AuditLedger},
    meter::DailyTradeMeter,
    pool::MarketPool,
    types::{PoolState, RequestContext},
    Config, Error, Result, Storage,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Result of a daily-limit reset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitReset {
    /// Trader
    pub user_email: String,
    /// Trading day that was cleared
    pub date: NaiveDate,
    /// Total the cleared row held
    pub previous_total: Decimal,
}

/// Admin overrides over one storage
pub struct AdminDesk<'a> {
    storage: &'a Storage,
    config: &'a Config,
}

impl<'a> AdminDesk<'a> {
    /// Create handle
    pub fn new(storage: &'a Storage, config: &'a Config) -> Self {
        Self { storage, config }
    }

    /// Overwrite both reserves, subject to the price floor
    pub fn adjust_pool(
        &self,
        ctx: &RequestContext,
        inr_pool: Decimal,
        mrx_pool: Decimal,
    ) -> Result<PoolState> {
        let previous = MarketPool::new(self.storage, &self.config.market).read_pool()?;
        let written = MarketPool::new(self.storage, &self.config.market).write_pool(
            inr_pool,
            mrx_pool,
            ctx.timestamp(),
        )?;

        AuditLedger::new(self.storage).log_admin(
            ctx,
            AdminAction {
                action: "adjust_pool",
                target_id: "market",
                target_type: "pool",
                details: format!(
                    "Adjusted pool from ₹{}/{} MRX to ₹{}/{} MRX (price ₹{})",
                    previous.inr_pool,
                    previous.mrx_pool,
                    written.inr_pool,
                    written.mrx_pool,
                    written.price().unwrap_or_default().round_dp(4)
                ),
            },
        )?;
        Ok(written)
    }

    /// Clear today's meter row for `email`
    ///
    /// Logged only when a row existed.
    pub fn reset_daily_limit(&self, ctx: &RequestContext, email: &str) -> Result<LimitReset> {
        let email = email.trim();
        if email.is_empty() {
            return Err(Error::Validation("User email required".to_string()));
        }

        let meter = DailyTradeMeter::new(self.storage, &self.config.market);
        let date = meter.trading_date(ctx);
        let previous_total = meter.reset(email, date)?;

        if previous_total > Decimal::ZERO {
            AuditLedger::new(self.storage).log_admin(
                ctx,
                AdminAction {
                    action: "reset_daily_limit",
                    target_id: email,
                    target_type: "user",
                    details: format!(
                        "Reset daily trading limit for {}. Was: ₹{}",
                        email, previous_total
                    ),
                },
            )?;
        }

        Ok(LimitReset {
            user_email: email.to_string(),
            date,
            previous_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::test_storage;
    use rust_decimal_macros::dec;

    #[test]
    fn test_adjust_pool_logs_and_enforces_floor() {
        let (storage, config, _temp) = test_storage();
        let desk = AdminDesk::new(&storage, &config);
        let ctx = RequestContext::new("admin@x.in");

        let err = desk.adjust_pool(&ctx, dec!(999), dec!(1000)).unwrap_err();
        assert!(matches!(err, Error::PriceFloorViolation(_)));
        assert!(storage.admin_log.scan().unwrap().is_empty());

        let pool = desk.adjust_pool(&ctx, dec!(5000), dec!(2000)).unwrap();
        assert_eq!(pool.price(), Some(dec!(2.5)));
        let logs = storage.admin_log.scan().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "adjust_pool");
    }

    #[test]
    fn test_reset_daily_limit() {
        let (storage, config, _temp) = test_storage();
        let desk = AdminDesk::new(&storage, &config);
        let ctx = RequestContext::new("admin@x.in");
        let meter = DailyTradeMeter::new(&storage, &config.market);
        let today = meter.trading_date(&ctx);
        meter.record_trade("asha@x.in", today, dec!(10000), 1).unwrap();

        let reset = desk.reset_daily_limit(&ctx, "asha@x.in").unwrap();
        assert_eq!(reset.previous_total, dec!(10000));
        assert_eq!(meter.get_daily_total("asha@x.in", today).unwrap(), dec!(0));
        assert_eq!(storage.admin_log.scan().unwrap().len(), 1);

        let again = desk.reset_daily_limit(&ctx, "asha@x.in").unwrap();
        assert_eq!(again.previous_total, dec!(0));
        assert_eq!(storage.admin_log.scan().unwrap().len(), 1);

        assert!(desk.reset_daily_limit(&ctx, "  ").is_err());
    }
}
