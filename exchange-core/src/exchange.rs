//! Exchange facade
//!
//! Ties the record store, the writer actor and the metrics together. Every
//! mutation is forwarded to the actor; reads and reports go straight to the
//! record files.
//!
//! # Example
//!
//! ```no_run
//! use exchange_core::{BuyOrder, Config, Exchange, RequestContext, Sentiment};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> exchange_core::Result<()> {
//!     let exchange = Exchange::open(Config::default()).await?;
//!
//!     let receipt = exchange
//!         .execute_buy(
//!             RequestContext::new("asha@example.in"),
//!             BuyOrder { amount: Decimal::from(100), sentiment: Sentiment::Bullish },
//!         )
//!         .await?;
//!     println!("allocated {} MRX", receipt.mrx_allocated);
//!
//!     exchange.shutdown().await
//! }
//! ```

use crate::{
    accounts::{AccountLedger, NewAccount},
    actor::{spawn_engine_actor, EngineHandle},
    admin::LimitReset,
    audit::{AuditLedger, TaxStats},
    deposit::{DepositClaim, DepositDesk, DepositOutcome},
    meter::{DailyLimitStatus, DailyTradeMeter},
    metrics::Metrics,
    orders::{BuyOrder, BuyReceipt},
    pool::MarketPool,
    reports::{DashboardStats, MarketSnapshot, MrxReconciliation, Reports, SystemHealth, WithdrawalStats},
    types::{
        Account, AdminLogEntry, DepositRequest, DepositStatus, OrderRecord, PoolState,
        RequestContext, TaxRecord, Transaction, WithdrawalRequest, WithdrawalStatus,
    },
    withdrawal::{BankDetails, WithdrawalDesk, WithdrawalOutcome, WithdrawalSummary},
    Config, Error, Result, Storage,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Main exchange interface
pub struct Exchange {
    /// Writer actor handle
    handle: EngineHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Configuration
    config: Arc<Config>,

    metrics: Metrics,
}

impl Exchange {
    /// Open the exchange over `config.data_dir`
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(Storage::open(&config)?);
        let config = Arc::new(config);
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;

        let handle = spawn_engine_actor(storage.clone(), config.clone(), metrics.clone());

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            "Exchange opened"
        );

        Ok(Self {
            handle,
            storage,
            config,
            metrics,
        })
    }

    // Writes

    /// Register an account
    pub async fn create_account(&self, ctx: RequestContext, input: NewAccount) -> Result<Account> {
        self.handle.create_account(ctx, input).await
    }

    /// Execute a buy for `ctx.actor`
    pub async fn execute_buy(&self, ctx: RequestContext, order: BuyOrder) -> Result<BuyReceipt> {
        self.handle.execute_buy(ctx, order).await
    }

    /// Open a withdrawal request for `ctx.actor`
    pub async fn request_withdrawal(
        &self,
        ctx: RequestContext,
        amount: Decimal,
        bank: BankDetails,
    ) -> Result<WithdrawalRequest> {
        self.handle.request_withdrawal(ctx, amount, bank).await
    }

    /// Move a withdrawal request to `status` (`ctx.actor` is the admin)
    pub async fn decide_withdrawal(
        &self,
        ctx: RequestContext,
        request_id: &str,
        status: WithdrawalStatus,
        remarks: Option<&str>,
    ) -> Result<WithdrawalOutcome> {
        self.handle
            .decide_withdrawal(
                ctx,
                request_id.to_string(),
                status,
                remarks.map(str::to_string),
            )
            .await
    }

    /// Record a deposit claim for `ctx.actor`
    pub async fn request_deposit(
        &self,
        ctx: RequestContext,
        claim: DepositClaim,
    ) -> Result<DepositRequest> {
        self.handle.request_deposit(ctx, claim).await
    }

    /// Move a deposit claim to `status` (`ctx.actor` is the admin)
    pub async fn decide_deposit(
        &self,
        ctx: RequestContext,
        request_id: &str,
        status: DepositStatus,
    ) -> Result<DepositOutcome> {
        self.handle
            .decide_deposit(ctx, request_id.to_string(), status)
            .await
    }

    /// Overwrite both pool reserves
    pub async fn adjust_pool(
        &self,
        ctx: RequestContext,
        inr_pool: Decimal,
        mrx_pool: Decimal,
    ) -> Result<PoolState> {
        self.handle.adjust_pool(ctx, inr_pool, mrx_pool).await
    }

    /// Clear today's trading total for `email`
    pub async fn reset_daily_limit(&self, ctx: RequestContext, email: &str) -> Result<LimitReset> {
        self.handle.reset_daily_limit(ctx, email.to_string()).await
    }

    // Reads

    /// Look up an account by email
    pub fn get_account(&self, email: &str) -> Result<Option<Account>> {
        AccountLedger::new(&self.storage).get_account(email)
    }

    /// Internal MRX held by `email` (zero when absent)
    pub fn internal_mrx(&self, email: &str) -> Result<Decimal> {
        AccountLedger::new(&self.storage).get_internal_mrx(email)
    }

    /// Current pool reserves
    pub fn pool(&self) -> Result<PoolState> {
        MarketPool::new(&self.storage, &self.config.market).read_pool()
    }

    /// Current price, `MarketUnavailable` when the MRX reserve is empty
    pub fn current_price(&self) -> Result<Decimal> {
        MarketPool::new(&self.storage, &self.config.market).current_price()
    }

    /// Daily cap usage for `ctx.actor` on the current trading day
    pub fn daily_limit_status(&self, ctx: &RequestContext) -> Result<DailyLimitStatus> {
        let meter = DailyTradeMeter::new(&self.storage, &self.config.market);
        meter.status(&ctx.actor, meter.trading_date(ctx))
    }

    /// A user's balance events, newest first
    pub fn user_transactions(&self, email: &str, limit: usize) -> Result<Vec<Transaction>> {
        AuditLedger::new(&self.storage).user_transactions(email, limit)
    }

    /// A user's executed orders, newest first
    pub fn user_orders(&self, email: &str, limit: usize) -> Result<Vec<OrderRecord>> {
        AuditLedger::new(&self.storage).user_orders(email, limit)
    }

    /// Most recent tax records
    pub fn recent_taxes(&self, limit: usize) -> Result<Vec<TaxRecord>> {
        AuditLedger::new(&self.storage).recent_taxes(limit)
    }

    /// Tax totals
    pub fn tax_stats(&self) -> Result<TaxStats> {
        AuditLedger::new(&self.storage).tax_stats()
    }

    /// Most recent admin actions
    pub fn recent_admin_logs(&self, limit: usize) -> Result<Vec<AdminLogEntry>> {
        AuditLedger::new(&self.storage).recent_admin_logs(limit)
    }

    /// One withdrawal request
    pub fn get_withdrawal(&self, request_id: &str) -> Result<Option<WithdrawalRequest>> {
        WithdrawalDesk::new(&self.storage, &self.config).get_request(request_id)
    }

    /// A user's withdrawal requests with masked account numbers
    pub fn user_withdrawals(&self, email: &str) -> Result<Vec<WithdrawalSummary>> {
        WithdrawalDesk::new(&self.storage, &self.config).user_requests(email)
    }

    /// Withdrawal queue, optionally one status
    pub fn all_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
        limit: usize,
    ) -> Result<Vec<WithdrawalRequest>> {
        WithdrawalDesk::new(&self.storage, &self.config).all_requests(status, limit)
    }

    /// A user's deposit claims
    pub fn user_deposits(&self, email: &str, limit: usize) -> Result<Vec<DepositRequest>> {
        DepositDesk::new(&self.storage, &self.config).user_requests(email, limit)
    }

    /// Deposit queue, optionally one status
    pub fn all_deposits(
        &self,
        status: Option<DepositStatus>,
        limit: usize,
    ) -> Result<Vec<DepositRequest>> {
        DepositDesk::new(&self.storage, &self.config).all_requests(status, limit)
    }

    // Reports

    /// Pool snapshot with guardrail margins
    pub fn market_snapshot(&self) -> Result<MarketSnapshot> {
        self.reports().market_snapshot()
    }

    /// Pool MRX plus internal holdings against the initial supply
    pub fn mrx_reconciliation(&self) -> Result<MrxReconciliation> {
        self.reports().mrx_reconciliation()
    }

    /// Withdrawal counts by status
    pub fn withdrawal_stats(&self) -> Result<WithdrawalStats> {
        self.reports().withdrawal_stats()
    }

    /// Admin dashboard
    pub fn dashboard(&self) -> Result<DashboardStats> {
        self.reports().dashboard()
    }

    /// Full health report
    pub fn system_health(&self, ctx: &RequestContext) -> Result<SystemHealth> {
        self.reports().system_health(ctx)
    }

    fn reports(&self) -> Reports<'_> {
        Reports::new(&self.storage, &self.config)
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop the writer actor
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::Sentiment;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    async fn test_exchange() -> (Exchange, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Exchange::open(config).await.unwrap(), temp_dir)
    }

    #[tokio::test]
    async fn test_exchange_open() {
        let (exchange, _temp) = test_exchange().await;
        assert_eq!(exchange.current_price().unwrap(), dec!(2));
        assert!(exchange.mrx_reconciliation().unwrap().reconciled);
    }

    #[tokio::test]
    async fn test_signup_deposit_buy() {
        let (exchange, _temp) = test_exchange().await;
        let admin = || RequestContext::new("admin@x.in");
        let user = || RequestContext::new("asha@x.in");

        exchange
            .create_account(
                RequestContext::new("asha@x.in"),
                NewAccount {
                    full_name: "Asha Rao".into(),
                    email: "asha@x.in".into(),
                    mobile: "9876543210".into(),
                    credential: "hashed".into(),
                    referral: None,
                },
            )
            .await
            .unwrap();

        let claim = exchange
            .request_deposit(
                user(),
                DepositClaim {
                    amount: dec!(1000),
                    transaction_id: "UPI998877".into(),
                    phone: "9876543210".into(),
                    payment_method: None,
                },
            )
            .await
            .unwrap();
        exchange
            .decide_deposit(admin(), &claim.request_id, DepositStatus::Approved)
            .await
            .unwrap();

        let receipt = exchange
            .execute_buy(
                user(),
                BuyOrder {
                    amount: dec!(100),
                    sentiment: Sentiment::Bullish,
                },
            )
            .await
            .unwrap();

        let account = exchange.get_account("asha@x.in").unwrap().unwrap();
        assert_eq!(account.inr_balance, receipt.new_inr_balance);
        assert_eq!(exchange.internal_mrx("asha@x.in").unwrap(), receipt.mrx_allocated);
        assert_eq!(exchange.daily_limit_status(&user()).unwrap().used, dec!(100));
        assert_eq!(exchange.user_orders("asha@x.in", 10).unwrap().len(), 1);
        assert_eq!(exchange.tax_stats().unwrap().total_records, 1);
        assert_eq!(exchange.metrics().orders_executed.get(), 1);

        exchange.shutdown().await.unwrap();
    }
}
