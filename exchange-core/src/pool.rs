//! Market pool: the two reserves and the price derived from them
//!
//! Price is `inr_pool / mrx_pool` (plain division, not a constant-product
//! curve) and is never stored. Every write is checked against the price floor
//! after rounding to storage precision, so the stored row always satisfies
//! `mrx_pool > 0 ⇒ inr_pool / mrx_pool ≥ price_floor`.

use crate::{
    config::MarketConfig,
    store::RecordFile,
    types::{round_inr, round_mrx, PoolState},
    Error, Result, Storage,
};
use rust_decimal::Decimal;

/// Handle to the singleton pool row
pub struct MarketPool<'a> {
    file: &'a RecordFile<PoolState>,
    config: &'a MarketConfig,
}

impl<'a> MarketPool<'a> {
    /// Create handle
    pub fn new(storage: &'a Storage, config: &'a MarketConfig) -> Self {
        Self {
            file: &storage.market,
            config,
        }
    }

    /// Last written pool, or the configured initial pool if the file is empty
    pub fn read_pool(&self) -> Result<PoolState> {
        Ok(self
            .file
            .scan()?
            .into_iter()
            .next()
            .unwrap_or(PoolState {
                inr_pool: self.config.initial_inr_reserve,
                mrx_pool: self.config.initial_mrx_reserve,
                last_updated: 0,
            }))
    }

    /// Current price; fails with `MarketUnavailable` on an empty MRX reserve
    pub fn current_price(&self) -> Result<Decimal> {
        self.read_pool()?
            .price()
            .ok_or_else(|| Error::MarketUnavailable("MRX reserve is empty".to_string()))
    }

    /// Replace the pool row
    ///
    /// Fails with `PriceFloorViolation` (nothing written) if the rounded
    /// reserves would price MRX below the floor.
    pub fn write_pool(&self, inr_pool: Decimal, mrx_pool: Decimal, now: i64) -> Result<PoolState> {
        let inr_pool = round_inr(inr_pool);
        let mrx_pool = round_mrx(mrx_pool);

        if inr_pool < Decimal::ZERO || mrx_pool < Decimal::ZERO {
            return Err(Error::Validation(format!(
                "Pool reserves cannot be negative: ₹{} / {} MRX",
                inr_pool, mrx_pool
            )));
        }
        check_floor(inr_pool, mrx_pool, self.config.price_floor)?;

        let pool = PoolState {
            inr_pool,
            mrx_pool,
            last_updated: now,
        };
        self.file.replace_all(&[pool])?;

        tracing::info!(
            inr_pool = %pool.inr_pool,
            mrx_pool = %pool.mrx_pool,
            price = %pool.price().unwrap_or_default().round_dp(4),
            "Pool updated"
        );
        Ok(pool)
    }
}

/// Fail with `PriceFloorViolation` if `inr / mrx` is below `floor`
pub fn check_floor(inr_pool: Decimal, mrx_pool: Decimal, floor: Decimal) -> Result<()> {
    if mrx_pool > Decimal::ZERO {
        let price = inr_pool / mrx_pool;
        if price < floor {
            return Err(Error::PriceFloorViolation(format!(
                "Price would be ₹{} which is below the ₹{} floor",
                price.round_dp(4),
                floor
            )));
        }
    }
    Ok(())
}

/// Priced buy against the pool, before any state change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuyQuote {
    /// Gross order
    pub amount: Decimal,
    /// Tax withheld from the order
    pub tax: Decimal,
    /// INR entering the pool
    pub net_to_pool: Decimal,
    /// Price before the trade
    pub price_before: Decimal,
    /// MRX leaving the pool, at `price_before`
    pub mrx_received: Decimal,
    /// INR reserve after the trade
    pub new_inr_reserve: Decimal,
    /// MRX reserve after the trade
    pub new_mrx_reserve: Decimal,
    /// Price after the trade
    pub new_price: Decimal,
}

impl BuyQuote {
    /// What the allocated MRX is worth at the post-trade price
    pub fn value_at_new_price(&self) -> Decimal {
        self.mrx_received * self.new_price
    }
}

/// Price a buy of `amount` INR
///
/// Rejects with `MarketUnavailable` on an empty reserve, `InsufficientLiquidity`
/// when the order would drain the reserve past `max_drain_ratio`, and
/// `PriceFloorViolation` when the resulting price is below the floor.
pub fn quote_buy(pool: &PoolState, amount: Decimal, market: &MarketConfig) -> Result<BuyQuote> {
    let price_before = pool
        .price()
        .ok_or_else(|| Error::MarketUnavailable("MRX reserve is empty".to_string()))?;

    let tax = amount * market.tax_rate;
    let net_to_pool = amount - tax;
    let mrx_received = net_to_pool / price_before;
    let new_inr_reserve = pool.inr_pool + net_to_pool;
    let new_mrx_reserve = pool.mrx_pool - mrx_received;

    if new_mrx_reserve <= Decimal::ZERO {
        return Err(Error::InsufficientLiquidity(
            "Order would empty the MRX reserve".to_string(),
        ));
    }

    let new_price = new_inr_reserve / new_mrx_reserve;
    if new_price < market.price_floor {
        return Err(Error::PriceFloorViolation(format!(
            "Price would drop to ₹{} below the ₹{} floor (current ₹{})",
            new_price.round_dp(4),
            market.price_floor,
            price_before.round_dp(4)
        )));
    }

    if mrx_received > pool.mrx_pool * market.max_drain_ratio {
        return Err(Error::InsufficientLiquidity(
            "Market liquidity too low".to_string(),
        ));
    }

    Ok(BuyQuote {
        amount,
        tax,
        net_to_pool,
        price_before,
        mrx_received,
        new_inr_reserve,
        new_mrx_reserve,
        new_price,
    })
}

/// Pool after converting `amount` INR of a holding back at the current price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellBackQuote {
    /// Current price
    pub price: Decimal,
    /// MRX returned to the pool
    pub mrx_to_sell: Decimal,
    /// INR reserve after the outflow
    pub new_inr_reserve: Decimal,
    /// MRX reserve after the inflow
    pub new_mrx_reserve: Decimal,
    /// Price after the conversion
    pub new_price: Decimal,
}

/// Price the conversion of `amount` INR worth of internal MRX back into the pool
pub fn quote_sell_back(pool: &PoolState, amount: Decimal) -> Result<SellBackQuote> {
    let price = pool
        .price()
        .ok_or_else(|| Error::MarketUnavailable("MRX reserve is empty".to_string()))?;

    let mrx_to_sell = amount / price;
    let new_inr_reserve = pool.inr_pool - amount;
    let new_mrx_reserve = pool.mrx_pool + mrx_to_sell;
    let new_price = new_inr_reserve / new_mrx_reserve;

    Ok(SellBackQuote {
        price,
        mrx_to_sell,
        new_inr_reserve,
        new_mrx_reserve,
        new_price,
    })
}
