//! Single-writer actor for every state-changing operation
//!
//! Each mutation touches several record files (pool, accounts, holdings,
//! meter, logs) with no transaction across them. Routing all of them through
//! one task means the writes of one logical operation are never interleaved
//! with another's, so guards checked at the start of an operation still hold
//! when its writes land.
//!
//! ```text
//!   EngineHandle (Clone) ──▶ mpsc (bounded) ──▶ EngineActor ──▶ Storage
//!        ▲                                          │
//!        └────────────── oneshot reply ◀────────────┘
//! ```
//!
//! Reads do not go through the actor; they take shared locks on the files
//! directly.

use crate::{
    accounts::{AccountLedger, NewAccount},
    admin::{AdminDesk, LimitReset},
    deposit::{DepositClaim, DepositDesk, DepositOutcome},
    metrics::Metrics,
    orders::{BuyOrder, BuyReceipt, OrderEngine},
    pool::MarketPool,
    types::{
        Account, DepositRequest, DepositStatus, PoolState, RequestContext, WithdrawalRequest,
        WithdrawalStatus,
    },
    withdrawal::{BankDetails, WithdrawalDesk, WithdrawalEffect, WithdrawalOutcome},
    Config, Error, Result, Storage,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Message sent to the engine actor
pub enum EngineMessage {
    /// Register an account
    CreateAccount {
        ctx: RequestContext,
        input: NewAccount,
        response: Reply<Account>,
    },

    /// Execute a buy
    ExecuteBuy {
        ctx: RequestContext,
        order: BuyOrder,
        response: Reply<BuyReceipt>,
    },

    /// Open a withdrawal request
    RequestWithdrawal {
        ctx: RequestContext,
        amount: Decimal,
        bank: BankDetails,
        response: Reply<WithdrawalRequest>,
    },

    /// Decide a withdrawal request
    DecideWithdrawal {
        ctx: RequestContext,
        request_id: String,
        status: WithdrawalStatus,
        remarks: Option<String>,
        response: Reply<WithdrawalOutcome>,
    },

    /// Open a deposit claim
    RequestDeposit {
        ctx: RequestContext,
        claim: DepositClaim,
        response: Reply<DepositRequest>,
    },

    /// Decide a deposit claim
    DecideDeposit {
        ctx: RequestContext,
        request_id: String,
        status: DepositStatus,
        response: Reply<DepositOutcome>,
    },

    /// Overwrite the pool reserves
    AdjustPool {
        ctx: RequestContext,
        inr_pool: Decimal,
        mrx_pool: Decimal,
        response: Reply<PoolState>,
    },

    /// Clear a user's meter row for today
    ResetDailyLimit {
        ctx: RequestContext,
        email: String,
        response: Reply<LimitReset>,
    },

    /// Stop the actor; messages queued behind it are dropped
    Shutdown,
}

impl EngineMessage {
    fn name(&self) -> &'static str {
        match self {
            EngineMessage::CreateAccount { .. } => "create_account",
            EngineMessage::ExecuteBuy { .. } => "execute_buy",
            EngineMessage::RequestWithdrawal { .. } => "request_withdrawal",
            EngineMessage::DecideWithdrawal { .. } => "decide_withdrawal",
            EngineMessage::RequestDeposit { .. } => "request_deposit",
            EngineMessage::DecideDeposit { .. } => "decide_deposit",
            EngineMessage::AdjustPool { .. } => "adjust_pool",
            EngineMessage::ResetDailyLimit { .. } => "reset_daily_limit",
            EngineMessage::Shutdown => "shutdown",
        }
    }
}

/// Actor that applies mutations one at a time
pub struct EngineActor {
    storage: Arc<Storage>,
    config: Arc<Config>,
    metrics: Metrics,
    mailbox: mpsc::Receiver<EngineMessage>,
}

impl EngineActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        config: Arc<Config>,
        metrics: Metrics,
        mailbox: mpsc::Receiver<EngineMessage>,
    ) -> Self {
        Self {
            storage,
            config,
            metrics,
            mailbox,
        }
    }

    /// Run until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        if let Ok(pool) = MarketPool::new(&self.storage, &self.config.market).read_pool() {
            self.metrics.update_pool(&pool);
        }

        while let Some(msg) = self.mailbox.recv().await {
            if matches!(msg, EngineMessage::Shutdown) {
                tracing::info!("Engine actor shutting down");
                break;
            }

            let operation = msg.name();
            let started = Instant::now();
            self.handle_message(msg);
            self.metrics
                .record_duration(operation, started.elapsed().as_secs_f64());
        }
    }

    fn handle_message(&self, msg: EngineMessage) {
        let storage = self.storage.as_ref();
        let config = self.config.as_ref();

        match msg {
            EngineMessage::CreateAccount {
                ctx,
                input,
                response,
            } => {
                let result = AccountLedger::new(storage).create_account(&ctx, input);
                let _ = response.send(result);
            }

            EngineMessage::ExecuteBuy {
                ctx,
                order,
                response,
            } => {
                let result = OrderEngine::new(storage, config).execute_buy(&ctx, order);
                match &result {
                    Ok(_) => {
                        self.metrics.record_order_executed();
                        self.refresh_pool_gauges();
                    }
                    Err(e) => {
                        tracing::warn!(email = %ctx.actor, error = %e, "Buy rejected");
                        self.metrics.record_order_rejected(e.kind());
                    }
                }
                let _ = response.send(result);
            }

            EngineMessage::RequestWithdrawal {
                ctx,
                amount,
                bank,
                response,
            } => {
                let result =
                    WithdrawalDesk::new(storage, config).request_withdrawal(&ctx, amount, bank);
                if let Err(e) = &result {
                    tracing::warn!(email = %ctx.actor, error = %e, "Withdrawal request refused");
                }
                let _ = response.send(result);
            }

            EngineMessage::DecideWithdrawal {
                ctx,
                request_id,
                status,
                remarks,
                response,
            } => {
                let result = WithdrawalDesk::new(storage, config).decide(
                    &ctx,
                    &request_id,
                    status,
                    remarks.as_deref(),
                );
                if let Ok(outcome) = &result {
                    let label = match outcome.effect {
                        WithdrawalEffect::Settled { .. } => "settled",
                        WithdrawalEffect::Refunded { .. } => "refunded",
                        WithdrawalEffect::AutoRejected { .. } => "auto_rejected",
                        WithdrawalEffect::Processed => "processed",
                        WithdrawalEffect::StatusOnly => "status_only",
                    };
                    self.metrics.record_withdrawal_decision(label);
                    self.refresh_pool_gauges();
                }
                let _ = response.send(result);
            }

            EngineMessage::RequestDeposit {
                ctx,
                claim,
                response,
            } => {
                let result = DepositDesk::new(storage, config).request_deposit(&ctx, claim);
                let _ = response.send(result);
            }

            EngineMessage::DecideDeposit {
                ctx,
                request_id,
                status,
                response,
            } => {
                let result = DepositDesk::new(storage, config).decide(&ctx, &request_id, status);
                if result.is_ok() {
                    self.metrics.record_deposit_decision(&status.to_string());
                }
                let _ = response.send(result);
            }

            EngineMessage::AdjustPool {
                ctx,
                inr_pool,
                mrx_pool,
                response,
            } => {
                let result = AdminDesk::new(storage, config).adjust_pool(&ctx, inr_pool, mrx_pool);
                if let Ok(pool) = &result {
                    self.metrics.update_pool(pool);
                }
                let _ = response.send(result);
            }

            EngineMessage::ResetDailyLimit {
                ctx,
                email,
                response,
            } => {
                let result = AdminDesk::new(storage, config).reset_daily_limit(&ctx, &email);
                let _ = response.send(result);
            }

            EngineMessage::Shutdown => {
                // Handled in run loop
            }
        }
    }

    fn refresh_pool_gauges(&self) {
        match MarketPool::new(&self.storage, &self.config.market).read_pool() {
            Ok(pool) => self.metrics.update_pool(&pool),
            Err(e) => tracing::error!("Failed to read pool for metrics: {}", e),
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineMessage>,
}

impl EngineHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<EngineMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> EngineMessage) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Register an account
    pub async fn create_account(&self, ctx: RequestContext, input: NewAccount) -> Result<Account> {
        self.call(|response| EngineMessage::CreateAccount {
            ctx,
            input,
            response,
        })
        .await
    }

    /// Execute a buy
    pub async fn execute_buy(&self, ctx: RequestContext, order: BuyOrder) -> Result<BuyReceipt> {
        self.call(|response| EngineMessage::ExecuteBuy {
            ctx,
            order,
            response,
        })
        .await
    }

    /// Open a withdrawal request
    pub async fn request_withdrawal(
        &self,
        ctx: RequestContext,
        amount: Decimal,
        bank: BankDetails,
    ) -> Result<WithdrawalRequest> {
        self.call(|response| EngineMessage::RequestWithdrawal {
            ctx,
            amount,
            bank,
            response,
        })
        .await
    }

    /// Decide a withdrawal request
    pub async fn decide_withdrawal(
        &self,
        ctx: RequestContext,
        request_id: String,
        status: WithdrawalStatus,
        remarks: Option<String>,
    ) -> Result<WithdrawalOutcome> {
        self.call(|response| EngineMessage::DecideWithdrawal {
            ctx,
            request_id,
            status,
            remarks,
            response,
        })
        .await
    }

    /// Open a deposit claim
    pub async fn request_deposit(
        &self,
        ctx: RequestContext,
        claim: DepositClaim,
    ) -> Result<DepositRequest> {
        self.call(|response| EngineMessage::RequestDeposit {
            ctx,
            claim,
            response,
        })
        .await
    }

    /// Decide a deposit claim
    pub async fn decide_deposit(
        &self,
        ctx: RequestContext,
        request_id: String,
        status: DepositStatus,
    ) -> Result<DepositOutcome> {
        self.call(|response| EngineMessage::DecideDeposit {
            ctx,
            request_id,
            status,
            response,
        })
        .await
    }

    /// Overwrite the pool reserves
    pub async fn adjust_pool(
        &self,
        ctx: RequestContext,
        inr_pool: Decimal,
        mrx_pool: Decimal,
    ) -> Result<PoolState> {
        self.call(|response| EngineMessage::AdjustPool {
            ctx,
            inr_pool,
            mrx_pool,
            response,
        })
        .await
    }

    /// Clear a user's meter row for today
    pub async fn reset_daily_limit(&self, ctx: RequestContext, email: String) -> Result<LimitReset> {
        self.call(|response| EngineMessage::ResetDailyLimit {
            ctx,
            email,
            response,
        })
        .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(EngineMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the engine actor
pub fn spawn_engine_actor(
    storage: Arc<Storage>,
    config: Arc<Config>,
    metrics: Metrics,
) -> EngineHandle {
    let (tx, rx) = mpsc::channel(config.writer.mailbox_capacity.max(1));
    let actor = EngineActor::new(storage, config, metrics, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    EngineHandle::new(tx)
}
