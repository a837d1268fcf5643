//! Storage layer: one record file per entity
//!
//! # Files
//!
//! - `users.tsv` - Accounts (key: email)
//! - `internal_mrx.tsv` - Internal MRX holdings (key: user_email)
//! - `market.tsv` - Singleton pool row, replaced on every write
//! - `daily_trades.tsv` - Daily trade aggregates (key: date + user_email)
//! - `transactions.tsv` - Append-only balance events
//! - `orders.tsv` - Append-only executed orders
//! - `tax_collection.tsv` - Append-only tax records
//! - `withdraw_request.tsv` - Withdrawal requests (key: request_id)
//! - `deposit_request.tsv` - Deposit requests (key: request_id)
//! - `admin_log.tsv` - Append-only admin audit trail

use crate::{
    error::Result,
    store::{FileStats, Record, RecordFile},
    types::{
        Account, AdminLogEntry, DailyTradeAggregate, DepositRequest, InternalMrxHolding,
        OrderRecord, PoolState, TaxRecord, Transaction, WithdrawalRequest,
    },
    Config,
};

impl Record for Account {
    const FILE_NAME: &'static str = "users.tsv";
    const HEADER: &'static [&'static str] = &[
        "user_id",
        "full_name",
        "email",
        "mobile",
        "credential",
        "referral",
        "inr_balance",
        "created_at",
    ];
}

impl Record for InternalMrxHolding {
    const FILE_NAME: &'static str = "internal_mrx.tsv";
    const HEADER: &'static [&'static str] = &["user_email", "internal_mrx_balance", "last_updated"];
}

impl Record for PoolState {
    const FILE_NAME: &'static str = "market.tsv";
    const HEADER: &'static [&'static str] = &["inr_pool", "mrx_pool", "last_updated"];
}

impl Record for DailyTradeAggregate {
    const FILE_NAME: &'static str = "daily_trades.tsv";
    const HEADER: &'static [&'static str] = &[
        "date",
        "user_email",
        "total_amount",
        "transaction_count",
        "last_updated",
    ];
}

impl Record for Transaction {
    const FILE_NAME: &'static str = "transactions.tsv";
    const HEADER: &'static [&'static str] = &[
        "txn_id",
        "user_email",
        "type",
        "amount_inr",
        "amount_mrx",
        "price",
        "timestamp",
        "status",
    ];
}

impl Record for OrderRecord {
    const FILE_NAME: &'static str = "orders.tsv";
    const HEADER: &'static [&'static str] = &[
        "order_id",
        "user_email",
        "user_name",
        "order_type",
        "order_amount_inr",
        "order_amount_mrx",
        "price_at_order",
        "tax_amount",
        "status",
        "created_at",
        "remarks",
    ];
}

impl Record for TaxRecord {
    const FILE_NAME: &'static str = "tax_collection.tsv";
    const HEADER: &'static [&'static str] = &[
        "tax_id",
        "user_email",
        "user_name",
        "order_type",
        "order_amount",
        "tax_amount",
        "order_worth",
        "order_date",
        "timestamp",
        "remarks",
    ];
}

impl Record for WithdrawalRequest {
    const FILE_NAME: &'static str = "withdraw_request.tsv";
    const HEADER: &'static [&'static str] = &[
        "request_id",
        "user_email",
        "user_name",
        "amount",
        "status",
        "bank_name",
        "account_number",
        "ifsc_code",
        "created_at",
        "processed_at",
        "remarks",
    ];
}

impl Record for DepositRequest {
    const FILE_NAME: &'static str = "deposit_request.tsv";
    const HEADER: &'static [&'static str] = &[
        "request_id",
        "user_email",
        "amount",
        "transaction_id",
        "phone",
        "payment_method",
        "status",
        "created_at",
    ];
}

impl Record for AdminLogEntry {
    const FILE_NAME: &'static str = "admin_log.tsv";
    const HEADER: &'static [&'static str] = &[
        "log_id",
        "admin_email",
        "action",
        "target_id",
        "target_type",
        "details",
        "timestamp",
        "ip_address",
    ];
}

/// All record files of one data directory
#[derive(Debug)]
pub struct Storage {
    /// Accounts
    pub accounts: RecordFile<Account>,
    /// Internal MRX holdings
    pub holdings: RecordFile<InternalMrxHolding>,
    /// Pool singleton
    pub market: RecordFile<PoolState>,
    /// Daily trade aggregates
    pub daily_trades: RecordFile<DailyTradeAggregate>,
    /// Balance events
    pub transactions: RecordFile<Transaction>,
    /// Executed orders
    pub orders: RecordFile<OrderRecord>,
    /// Tax records
    pub taxes: RecordFile<TaxRecord>,
    /// Withdrawal requests
    pub withdrawals: RecordFile<WithdrawalRequest>,
    /// Deposit requests
    pub deposits: RecordFile<DepositRequest>,
    /// Admin audit trail
    pub admin_log: RecordFile<AdminLogEntry>,
}

impl Storage {
    /// Open or create every record file under `config.data_dir`
    ///
    /// A market file with no row is seeded with the configured initial pool.
    pub fn open(config: &Config) -> Result<Self> {
        let dir = &config.data_dir;
        std::fs::create_dir_all(dir)?;

        let storage = Self {
            accounts: RecordFile::open(dir)?,
            holdings: RecordFile::open(dir)?,
            market: RecordFile::open(dir)?,
            daily_trades: RecordFile::open(dir)?,
            transactions: RecordFile::open(dir)?,
            orders: RecordFile::open(dir)?,
            taxes: RecordFile::open(dir)?,
            withdrawals: RecordFile::open(dir)?,
            deposits: RecordFile::open(dir)?,
            admin_log: RecordFile::open(dir)?,
        };

        if storage.market.scan()?.is_empty() {
            storage.market.replace_all(&[PoolState {
                inr_pool: config.market.initial_inr_reserve,
                mrx_pool: config.market.initial_mrx_reserve,
                last_updated: 0,
            }])?;
            tracing::info!(
                inr = %config.market.initial_inr_reserve,
                mrx = %config.market.initial_mrx_reserve,
                "Seeded market pool"
            );
        }

        tracing::info!("Opened record store at {:?}", dir);

        Ok(storage)
    }

    /// Size and row count of every file, by file name
    pub fn get_stats(&self) -> Result<Vec<(&'static str, FileStats)>> {
        Ok(vec![
            (Account::FILE_NAME, self.accounts.stats()?),
            (InternalMrxHolding::FILE_NAME, self.holdings.stats()?),
            (PoolState::FILE_NAME, self.market.stats()?),
            (DailyTradeAggregate::FILE_NAME, self.daily_trades.stats()?),
            (Transaction::FILE_NAME, self.transactions.stats()?),
            (OrderRecord::FILE_NAME, self.orders.stats()?),
            (TaxRecord::FILE_NAME, self.taxes.stats()?),
            (WithdrawalRequest::FILE_NAME, self.withdrawals.stats()?),
            (DepositRequest::FILE_NAME, self.deposits.stats()?),
            (AdminLogEntry::FILE_NAME, self.admin_log.stats()?),
        ])
    }
}
