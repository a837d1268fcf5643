//! Tax and audit ledger
//!
//! Append-only records: balance events, executed orders, tax charged and
//! admin actions. Nothing here is read back by trading logic; the query
//! helpers exist for history pages and reports.

use crate::{
    store::RecordFile,
    types::{
        new_record_id, round_inr, round_mrx, AdminLogEntry, OrderRecord, RequestContext,
        TaxRecord, Transaction, TxnKind, PRICE_SCALE,
    },
    Result, Storage,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

const COMPLETED: &str = "completed";

/// Admin action to be logged
#[derive(Debug, Clone)]
pub struct AdminAction<'s> {
    /// Action name
    pub action: &'s str,
    /// Affected record id
    pub target_id: &'s str,
    /// Affected record type
    pub target_type: &'s str,
    /// Free text
    pub details: String,
}

/// Tax totals
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaxStats {
    /// Sum over every record
    pub total_tax: Decimal,
    /// Number of records
    pub total_records: usize,
    /// Tax by order type
    pub by_order_type: BTreeMap<String, Decimal>,
}

/// Handle to the append-only logs
pub struct AuditLedger<'a> {
    transactions: &'a RecordFile<Transaction>,
    orders: &'a RecordFile<OrderRecord>,
    taxes: &'a RecordFile<TaxRecord>,
    admin_log: &'a RecordFile<AdminLogEntry>,
}

impl<'a> AuditLedger<'a> {
    /// Create handle
    pub fn new(storage: &'a Storage) -> Self {
        Self {
            transactions: &storage.transactions,
            orders: &storage.orders,
            taxes: &storage.taxes,
            admin_log: &storage.admin_log,
        }
    }

    /// Append a balance event
    pub fn record_transaction(
        &self,
        ctx: &RequestContext,
        email: &str,
        kind: TxnKind,
        amount_inr: Decimal,
        amount_mrx: Decimal,
        price: Decimal,
    ) -> Result<Transaction> {
        let now = ctx.timestamp();
        let txn = Transaction {
            txn_id: new_record_id("TXN", now),
            user_email: email.to_string(),
            kind,
            amount_inr: round_inr(amount_inr),
            amount_mrx: round_mrx(amount_mrx),
            price: price.round_dp(PRICE_SCALE),
            timestamp: now,
            status: COMPLETED.to_string(),
        };
        self.transactions.append(&txn)?;
        Ok(txn)
    }

    /// Append an executed order
    pub fn record_order(&self, ctx: &RequestContext, order: OrderDraft<'_>) -> Result<OrderRecord> {
        let now = ctx.timestamp();
        let record = OrderRecord {
            order_id: new_record_id("ORD", now),
            user_email: order.email.to_string(),
            user_name: order.user_name.to_string(),
            order_type: order.order_type.to_string(),
            order_amount_inr: round_inr(order.amount_inr),
            order_amount_mrx: round_mrx(order.amount_mrx),
            price_at_order: order.price.round_dp(PRICE_SCALE),
            tax_amount: round_inr(order.tax),
            status: COMPLETED.to_string(),
            created_at: now,
            remarks: order.remarks.to_string(),
        };
        self.orders.append(&record)?;
        Ok(record)
    }

    /// Append a tax record
    pub fn record_tax(
        &self,
        ctx: &RequestContext,
        order: &OrderDraft<'_>,
        order_worth: Decimal,
    ) -> Result<TaxRecord> {
        let now = ctx.timestamp();
        let record = TaxRecord {
            tax_id: new_record_id("TAX", now),
            user_email: order.email.to_string(),
            user_name: order.user_name.to_string(),
            order_type: order.order_type.to_string(),
            order_amount: round_inr(order.amount_inr),
            tax_amount: round_inr(order.tax),
            order_worth: round_inr(order_worth),
            order_date: ctx.now.format("%Y-%m-%d %H:%M:%S").to_string(),
            timestamp: now,
            remarks: order.remarks.to_string(),
        };
        self.taxes.append(&record)?;
        Ok(record)
    }

    /// Append an admin log entry for `ctx.actor`
    pub fn log_admin(&self, ctx: &RequestContext, action: AdminAction<'_>) -> Result<AdminLogEntry> {
        let now = ctx.timestamp();
        let entry = AdminLogEntry {
            log_id: new_record_id("LOG", now),
            admin_email: ctx.actor.clone(),
            action: action.action.to_string(),
            target_id: action.target_id.to_string(),
            target_type: action.target_type.to_string(),
            details: action.details,
            timestamp: now,
            ip_address: ctx.remote_addr.clone().unwrap_or_default(),
        };
        self.admin_log.append(&entry)?;

        tracing::info!(
            admin = %entry.admin_email,
            action = %entry.action,
            target = %entry.target_id,
            "Admin action logged"
        );
        Ok(entry)
    }

    /// A user's transactions, newest first
    pub fn user_transactions(&self, email: &str, limit: usize) -> Result<Vec<Transaction>> {
        let rows = self.transactions.filter(|t| t.user_email == email)?;
        Ok(newest_first(rows, |t| t.timestamp, limit))
    }

    /// Every user's transactions, newest first
    pub fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        Ok(newest_first(self.transactions.scan()?, |t| t.timestamp, limit))
    }

    /// A user's orders, newest first
    pub fn user_orders(&self, email: &str, limit: usize) -> Result<Vec<OrderRecord>> {
        let rows = self.orders.filter(|o| o.user_email == email)?;
        Ok(newest_first(rows, |o| o.created_at, limit))
    }

    /// Tax records, newest first
    pub fn recent_taxes(&self, limit: usize) -> Result<Vec<TaxRecord>> {
        Ok(newest_first(self.taxes.scan()?, |t| t.timestamp, limit))
    }

    /// Admin log, newest first
    pub fn recent_admin_logs(&self, limit: usize) -> Result<Vec<AdminLogEntry>> {
        Ok(newest_first(self.admin_log.scan()?, |e| e.timestamp, limit))
    }

    /// Tax totals over every record
    pub fn tax_stats(&self) -> Result<TaxStats> {
        let mut stats = TaxStats::default();
        for record in self.taxes.scan()? {
            stats.total_records += 1;
            stats.total_tax += record.tax_amount;
            *stats
                .by_order_type
                .entry(record.order_type)
                .or_insert(Decimal::ZERO) += record.tax_amount;
        }
        stats.total_tax = round_inr(stats.total_tax);
        Ok(stats)
    }
}

/// Fields shared by the order and tax records of one trade
#[derive(Debug, Clone)]
pub struct OrderDraft<'s> {
    /// Trader
    pub email: &'s str,
    /// Account holder name
    pub user_name: &'s str,
    /// Order type (`buy`)
    pub order_type: &'s str,
    /// Gross INR
    pub amount_inr: Decimal,
    /// MRX allocated
    pub amount_mrx: Decimal,
    /// Pool price before the trade
    pub price: Decimal,
    /// Tax withheld
    pub tax: Decimal,
    /// Free text
    pub remarks: &'s str,
}

// Stable sort keeps file order among equal timestamps; reversing afterwards
// puts the later-appended row first.
fn newest_first<T, K>(mut rows: Vec<T>, key: K, limit: usize) -> Vec<T>
where
    K: Fn(&T) -> i64,
{
    rows.sort_by_key(|r| key(r));
    rows.reverse();
    rows.truncate(limit);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::test_storage;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn ctx_at(secs: i64) -> RequestContext {
        RequestContext::at("admin@x.in", Utc.timestamp_opt(secs, 0).unwrap())
            .with_remote_addr("10.0.0.7")
    }

    fn draft(email: &str) -> OrderDraft<'_> {
        OrderDraft {
            email,
            user_name: "Asha",
            order_type: "buy",
            amount_inr: dec!(100),
            amount_mrx: dec!(47.5),
            price: dec!(2),
            tax: dec!(5),
            remarks: "Bullish acceleration",
        }
    }

    #[test]
    fn test_transactions_newest_first() {
        let (storage, _config, _temp) = test_storage();
        let audit = AuditLedger::new(&storage);

        for (i, email) in ["a@x.in", "b@x.in", "a@x.in"].iter().enumerate() {
            audit
                .record_transaction(
                    &ctx_at(100 + i as i64),
                    email,
                    TxnKind::DepositApproved,
                    Decimal::from(i as i64 + 1),
                    Decimal::ZERO,
                    Decimal::ZERO,
                )
                .unwrap();
        }

        let mine = audit.user_transactions("a@x.in", 10).unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].amount_inr, dec!(3));
        assert_eq!(mine[0].status, "completed");
        assert_eq!(audit.recent_transactions(1).unwrap()[0].timestamp, 102);
    }

    #[test]
    fn test_order_and_tax_records() {
        let (storage, _config, _temp) = test_storage();
        let audit = AuditLedger::new(&storage);
        let ctx = ctx_at(1_700_000_000);

        let order = audit.record_order(&ctx, draft("a@x.in")).unwrap();
        assert!(order.order_id.starts_with("ORD1700000000"));
        assert_eq!(order.price_at_order, dec!(2));

        let tax = audit.record_tax(&ctx, &draft("a@x.in"), dec!(104.4763)).unwrap();
        assert_eq!(tax.order_worth, dec!(104.48));
        assert_eq!(tax.order_date, "2023-11-14 22:13:20");
        assert_eq!(audit.user_orders("a@x.in", 5).unwrap().len(), 1);
        assert_eq!(audit.recent_taxes(5).unwrap(), vec![tax]);
    }

    #[test]
    fn test_tax_stats_by_order_type() {
        let (storage, _config, _temp) = test_storage();
        let audit = AuditLedger::new(&storage);
        let ctx = ctx_at(1);

        audit.record_tax(&ctx, &draft("a@x.in"), dec!(100)).unwrap();
        audit.record_tax(&ctx, &draft("b@x.in"), dec!(100)).unwrap();

        let stats = audit.tax_stats().unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.total_tax, dec!(10));
        assert_eq!(stats.by_order_type.get("buy"), Some(&dec!(10)));
    }

    #[test]
    fn test_admin_log_records_actor_and_address() {
        let (storage, _config, _temp) = test_storage();
        let audit = AuditLedger::new(&storage);

        audit
            .log_admin(
                &ctx_at(5),
                AdminAction {
                    action: "adjust_pool",
                    target_id: "market",
                    target_type: "market",
                    details: "INR 2000 -> 2500".into(),
                },
            )
            .unwrap();

        let logs = audit.recent_admin_logs(10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].admin_email, "admin@x.in");
        assert_eq!(logs[0].ip_address, "10.0.0.7");
    }
}
