//! Prometheus metrics for the exchange
//!
//! # Metrics
//!
//! - `exchange_orders_executed_total` - Buys that committed
//! - `exchange_orders_rejected_total{reason}` - Buys refused by a guard
//! - `exchange_withdrawal_decisions_total{outcome}` - Withdrawal decisions by effect
//! - `exchange_deposit_decisions_total{status}` - Deposit decisions by status
//! - `exchange_operation_duration_seconds{operation}` - Writer latency per operation
//! - `exchange_price` - Current pool price
//! - `exchange_inr_reserve` - Current INR reserve

use crate::{error::ErrorKind, types::PoolState};
use prometheus::{
    Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

/// Metrics collector
///
/// Owns its registry, so several exchanges in one process do not collide.
#[derive(Clone)]
pub struct Metrics {
    /// Executed buys
    pub orders_executed: IntCounter,

    /// Rejected buys by error kind
    pub orders_rejected: IntCounterVec,

    /// Withdrawal decisions by effect
    pub withdrawal_decisions: IntCounterVec,

    /// Deposit decisions by resulting status
    pub deposit_decisions: IntCounterVec,

    /// Writer latency by operation
    pub operation_duration: HistogramVec,

    /// Pool price
    pub price: Gauge,

    /// INR reserve
    pub inr_reserve: Gauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let orders_executed =
            IntCounter::new("exchange_orders_executed_total", "Buys that committed")?;
        registry.register(Box::new(orders_executed.clone()))?;

        let orders_rejected = IntCounterVec::new(
            Opts::new("exchange_orders_rejected_total", "Buys refused by a guard"),
            &["reason"],
        )?;
        registry.register(Box::new(orders_rejected.clone()))?;

        let withdrawal_decisions = IntCounterVec::new(
            Opts::new(
                "exchange_withdrawal_decisions_total",
                "Withdrawal decisions by effect",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(withdrawal_decisions.clone()))?;

        let deposit_decisions = IntCounterVec::new(
            Opts::new(
                "exchange_deposit_decisions_total",
                "Deposit decisions by status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(deposit_decisions.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "exchange_operation_duration_seconds",
                "Writer latency per operation",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let price = Gauge::new("exchange_price", "Current pool price")?;
        registry.register(Box::new(price.clone()))?;

        let inr_reserve = Gauge::new("exchange_inr_reserve", "Current INR reserve")?;
        registry.register(Box::new(inr_reserve.clone()))?;

        Ok(Self {
            orders_executed,
            orders_rejected,
            withdrawal_decisions,
            deposit_decisions,
            operation_duration,
            price,
            inr_reserve,
            registry,
        })
    }

    /// Record a committed buy
    pub fn record_order_executed(&self) {
        self.orders_executed.inc();
    }

    /// Record a refused buy
    pub fn record_order_rejected(&self, kind: ErrorKind) {
        self.orders_rejected
            .with_label_values(&[kind_label(kind)])
            .inc();
    }

    /// Record a withdrawal decision
    pub fn record_withdrawal_decision(&self, outcome: &str) {
        self.withdrawal_decisions.with_label_values(&[outcome]).inc();
    }

    /// Record a deposit decision
    pub fn record_deposit_decision(&self, status: &str) {
        self.deposit_decisions.with_label_values(&[status]).inc();
    }

    /// Record writer latency
    pub fn record_duration(&self, operation: &str, seconds: f64) {
        self.operation_duration
            .with_label_values(&[operation])
            .observe(seconds);
    }

    /// Update pool gauges
    pub fn update_pool(&self, pool: &PoolState) {
        let price = pool.price().and_then(|p| p.to_f64()).unwrap_or(0.0);
        self.price.set(price);
        self.inr_reserve.set(pool.inr_pool.to_f64().unwrap_or(0.0));
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation",
        ErrorKind::NotFound => "not_found",
        ErrorKind::InsufficientBalance => "insufficient_balance",
        ErrorKind::InsufficientLiquidity => "insufficient_liquidity",
        ErrorKind::PriceFloorViolation => "price_floor",
        ErrorKind::DailyLimitExceeded => "daily_limit",
        ErrorKind::MarketUnavailable => "market_unavailable",
        ErrorKind::Storage => "storage",
    }
}
