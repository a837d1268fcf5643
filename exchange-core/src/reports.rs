//! Read-only aggregates for dashboards and health checks

use crate::{
    accounts::AccountLedger,
    audit::{AuditLedger, TaxStats},
    meter::DailyTradeMeter,
    pool::MarketPool,
    store::FileStats,
    types::{round_inr, round_mrx, DepositStatus, RequestContext, WithdrawalStatus},
    Config, Result, Storage,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Pool state and guardrail margins
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    /// INR reserve
    pub inr_pool: Decimal,
    /// MRX reserve
    pub mrx_pool: Decimal,
    /// Current price, zero when the market is unavailable
    pub price: Decimal,
    /// False when the MRX reserve is empty
    pub operational: bool,
    /// Configured floor
    pub price_floor: Decimal,
    /// `price ≥ price_floor`
    pub above_floor: bool,
    /// `price - price_floor`, zero when below
    pub floor_margin: Decimal,
    /// Configured pool minimum
    pub min_inr_pool: Decimal,
    /// `inr_pool ≥ min_inr_pool`
    pub inr_pool_above_min: bool,
}

/// Pool MRX plus user holdings against the initial reserve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MrxReconciliation {
    /// Sum of every internal holding
    pub total_internal_mrx: Decimal,
    /// Pool reserve plus holdings
    pub system_mrx_total: Decimal,
    /// Configured initial reserve
    pub initial_mrx: Decimal,
    /// `|system_mrx_total - initial_mrx|`
    pub discrepancy: Decimal,
    /// Discrepancy under 0.001
    pub reconciled: bool,
}

/// Withdrawal counts by status
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WithdrawalStats {
    /// Every request
    pub total: usize,
    /// Count per status
    pub by_status: BTreeMap<WithdrawalStatus, usize>,
    /// Sum of requested amounts
    pub total_amount: Decimal,
}

impl WithdrawalStats {
    /// Count for one status
    pub fn count(&self, status: WithdrawalStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Coarse liquidity rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityHealth {
    /// INR/MRX ratio above 0.8
    Healthy,
    /// Ratio above 0.5
    Warning,
    /// Lower, or an empty reserve
    Critical,
}

/// Admin dashboard figures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    /// Registered accounts
    pub total_users: usize,
    /// Accounts with cash above ₹1000 or any internal MRX
    pub active_users: usize,
    /// Sum of every cash balance
    pub total_inr: Decimal,
    /// Deposits awaiting a decision
    pub pending_deposits: usize,
    /// Withdrawals awaiting a decision
    pub pending_withdrawals: usize,
    /// Withdrawals in bank transfer
    pub processing_withdrawals: usize,
    /// Liquidity rating
    pub liquidity_health: LiquidityHealth,
    /// Market figures
    pub market: MarketSnapshot,
    /// MRX reconciliation
    pub reconciliation: MrxReconciliation,
    /// Withdrawal figures
    pub withdrawals: WithdrawalStats,
    /// Tax figures
    pub tax: TaxStats,
}

/// Today's trading across all users
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTradingSummary {
    /// Per-user cap
    pub limit_per_user: Decimal,
    /// Users with a row today
    pub active_traders_today: usize,
    /// Sum of today's notional
    pub total_volume_today: Decimal,
    /// Users whose total reached the cap
    pub users_at_limit: usize,
}

/// Storage and market health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    /// Epoch seconds of the report
    pub timestamp: i64,
    /// Per-file size and row count
    pub files: BTreeMap<&'static str, FileStats>,
    /// Market figures
    pub market: MarketSnapshot,
    /// MRX reconciliation
    pub reconciliation: MrxReconciliation,
    /// Today's trading
    pub daily_trading: DailyTradingSummary,
    /// Tax figures
    pub tax: TaxStats,
}

/// Report builder over one storage
pub struct Reports<'a> {
    storage: &'a Storage,
    config: &'a Config,
}

impl<'a> Reports<'a> {
    /// Create handle
    pub fn new(storage: &'a Storage, config: &'a Config) -> Self {
        Self { storage, config }
    }

    /// Pool and guardrail figures
    pub fn market_snapshot(&self) -> Result<MarketSnapshot> {
        let market = &self.config.market;
        let pool = MarketPool::new(self.storage, market).read_pool()?;
        let price = pool.price().unwrap_or(Decimal::ZERO);
        let above_floor = price >= market.price_floor;

        Ok(MarketSnapshot {
            inr_pool: round_inr(pool.inr_pool),
            mrx_pool: round_mrx(pool.mrx_pool),
            price: price.round_dp(4),
            operational: pool.price().is_some(),
            price_floor: market.price_floor,
            above_floor,
            floor_margin: if above_floor {
                (price - market.price_floor).round_dp(4)
            } else {
                Decimal::ZERO
            },
            min_inr_pool: market.min_inr_pool,
            inr_pool_above_min: pool.inr_pool >= market.min_inr_pool,
        })
    }

    /// Pool MRX plus holdings against the initial reserve
    pub fn mrx_reconciliation(&self) -> Result<MrxReconciliation> {
        let pool = MarketPool::new(self.storage, &self.config.market).read_pool()?;
        let total_internal_mrx = AccountLedger::new(self.storage).total_internal_mrx()?;
        let initial_mrx = self.config.market.initial_mrx_reserve;
        let system_mrx_total = pool.mrx_pool + total_internal_mrx;
        let discrepancy = (system_mrx_total - initial_mrx).abs();

        if discrepancy >= Decimal::new(1, 3) {
            tracing::warn!(
                system = %system_mrx_total,
                initial = %initial_mrx,
                "MRX does not reconcile"
            );
        }

        Ok(MrxReconciliation {
            total_internal_mrx: round_mrx(total_internal_mrx),
            system_mrx_total: round_mrx(system_mrx_total),
            initial_mrx,
            discrepancy: round_mrx(discrepancy),
            reconciled: discrepancy < Decimal::new(1, 3),
        })
    }

    /// Withdrawal counts by status
    pub fn withdrawal_stats(&self) -> Result<WithdrawalStats> {
        let mut stats = WithdrawalStats::default();
        for req in self.storage.withdrawals.scan()? {
            stats.total += 1;
            stats.total_amount += req.amount;
            *stats.by_status.entry(req.status).or_insert(0) += 1;
        }
        stats.total_amount = round_inr(stats.total_amount);
        Ok(stats)
    }

    /// Admin dashboard
    pub fn dashboard(&self) -> Result<DashboardStats> {
        let ledger = AccountLedger::new(self.storage);
        let accounts = ledger.list_accounts()?;
        let holders: Vec<String> = ledger
            .list_holdings()?
            .into_iter()
            .filter(|h| h.internal_mrx_balance > Decimal::ZERO)
            .map(|h| h.user_email)
            .collect();

        let active_floor = Decimal::from(1000);
        let active_users = accounts
            .iter()
            .filter(|a| a.inr_balance > active_floor || holders.contains(&a.email))
            .count();
        let total_inr = round_inr(accounts.iter().map(|a| a.inr_balance).sum());

        let pending_deposits = self
            .storage
            .deposits
            .filter(|d| d.status == DepositStatus::Pending)?
            .len();
        let withdrawals = self.withdrawal_stats()?;
        let market = self.market_snapshot()?;

        Ok(DashboardStats {
            total_users: accounts.len(),
            active_users,
            total_inr,
            pending_deposits,
            pending_withdrawals: withdrawals.count(WithdrawalStatus::Pending),
            processing_withdrawals: withdrawals.count(WithdrawalStatus::Processing),
            liquidity_health: liquidity_health(market.inr_pool, market.mrx_pool),
            market,
            reconciliation: self.mrx_reconciliation()?,
            withdrawals,
            tax: AuditLedger::new(self.storage).tax_stats()?,
        })
    }

    /// File, market and trading health as of `ctx.now`
    pub fn system_health(&self, ctx: &RequestContext) -> Result<SystemHealth> {
        let meter = DailyTradeMeter::new(self.storage, &self.config.market);
        let today = meter.rows_for_date(meter.trading_date(ctx))?;
        let limit = self.config.market.daily_trading_limit;

        Ok(SystemHealth {
            timestamp: ctx.timestamp(),
            files: self.storage.get_stats()?.into_iter().collect(),
            market: self.market_snapshot()?,
            reconciliation: self.mrx_reconciliation()?,
            daily_trading: DailyTradingSummary {
                limit_per_user: limit,
                active_traders_today: today.len(),
                total_volume_today: round_inr(today.iter().map(|r| r.total_amount).sum()),
                users_at_limit: today.iter().filter(|r| r.total_amount >= limit).count(),
            },
            tax: AuditLedger::new(self.storage).tax_stats()?,
        })
    }
}

/// Rate the pool by its INR/MRX ratio
pub fn liquidity_health(inr_pool: Decimal, mrx_pool: Decimal) -> LiquidityHealth {
    if inr_pool <= Decimal::ZERO || mrx_pool <= Decimal::ZERO {
        return LiquidityHealth::Critical;
    }
    let ratio = inr_pool / mrx_pool;
    if ratio > Decimal::new(8, 1) {
        LiquidityHealth::Healthy
    } else if ratio > Decimal::new(5, 1) {
        LiquidityHealth::Warning
    } else {
        LiquidityHealth::Critical
    }
}
