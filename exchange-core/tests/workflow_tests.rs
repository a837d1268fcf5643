//! End-to-end workflows through the `Exchange` facade

use exchange_core::{
    withdrawal::{RescindReason, WithdrawalEffect},
    BankDetails, BuyOrder, Config, DepositClaim, DepositStatus, Error, Exchange, NewAccount,
    RequestContext, Sentiment, TxnKind, WithdrawalStatus,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

const USER: &str = "asha@example.in";

fn user() -> RequestContext {
    RequestContext::new(USER)
}

fn admin() -> RequestContext {
    RequestContext::new("admin@example.in").with_remote_addr("10.0.0.7")
}

fn bank() -> BankDetails {
    BankDetails {
        bank_name: "State Bank".into(),
        account_number: "123456789012".into(),
        ifsc_code: "sbin0001234".into(),
    }
}

fn buy(amount: Decimal) -> BuyOrder {
    BuyOrder {
        amount,
        sentiment: Sentiment::Bullish,
    }
}

/// Exchange with one account funded through an approved deposit
async fn funded_exchange(deposit: Decimal) -> (Exchange, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    let exchange = Exchange::open(config).await.unwrap();

    exchange
        .create_account(
            user(),
            NewAccount {
                full_name: "Asha Rao".into(),
                email: USER.into(),
                mobile: "9876543210".into(),
                credential: "argon2$hash".into(),
                referral: None,
            },
        )
        .await
        .unwrap();

    let claim = exchange
        .request_deposit(
            user(),
            DepositClaim {
                amount: deposit,
                transaction_id: "UPI20240101".into(),
                phone: "9876543210".into(),
                payment_method: Some("upi".into()),
            },
        )
        .await
        .unwrap();
    exchange
        .decide_deposit(admin(), &claim.request_id, DepositStatus::Approved)
        .await
        .unwrap();

    (exchange, temp_dir)
}

fn balance(exchange: &Exchange) -> Decimal {
    exchange.get_account(USER).unwrap().unwrap().inr_balance
}

#[tokio::test]
async fn test_reference_buy() {
    let (exchange, _temp) = funded_exchange(dec!(500)).await;

    let receipt = exchange.execute_buy(user(), buy(dec!(100))).await.unwrap();

    assert_eq!(receipt.tax_amount, dec!(5));
    assert_eq!(receipt.amount_to_pool, dec!(95));
    assert_eq!(receipt.price_before, dec!(2));
    assert_eq!(receipt.mrx_allocated, dec!(47.5));
    assert_eq!(receipt.new_inr_balance, dec!(504.48));
    assert!(receipt.price_after >= receipt.price_before);

    let pool = exchange.pool().unwrap();
    assert_eq!(pool.inr_pool, dec!(2095));
    assert_eq!(pool.mrx_pool, dec!(952.5));

    assert_eq!(balance(&exchange), dec!(504.48));
    assert_eq!(exchange.internal_mrx(USER).unwrap(), dec!(47.5));
    assert!(exchange.mrx_reconciliation().unwrap().reconciled);

    let txns = exchange.user_transactions(USER, 10).unwrap();
    assert_eq!(txns[0].kind, TxnKind::Buy);
    assert_eq!(txns[0].amount_mrx, dec!(47.5));
}

#[tokio::test]
async fn test_bearish_order_is_refused() {
    let (exchange, _temp) = funded_exchange(dec!(500)).await;

    let err = exchange
        .execute_buy(
            user(),
            BuyOrder {
                amount: dec!(100),
                sentiment: Sentiment::Bearish,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(balance(&exchange), dec!(500));
    assert_eq!(exchange.pool().unwrap().inr_pool, dec!(2000));
}

#[tokio::test]
async fn test_withdrawal_blocked_by_pool_minimum() {
    let (exchange, _temp) = funded_exchange(dec!(1000)).await;
    exchange
        .adjust_pool(admin(), dec!(1200), dec!(500))
        .await
        .unwrap();

    let err = exchange
        .request_withdrawal(user(), dec!(500), bank())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InsufficientLiquidity(_)));
    assert_eq!(balance(&exchange), dec!(1000));
    assert!(exchange.user_withdrawals(USER).unwrap().is_empty());
}

#[tokio::test]
async fn test_withdrawal_approval_is_idempotent() {
    let (exchange, _temp) = funded_exchange(dec!(500)).await;
    exchange.execute_buy(user(), buy(dec!(100))).await.unwrap();

    let request = exchange
        .request_withdrawal(user(), dec!(50), bank())
        .await
        .unwrap();
    assert_eq!(request.ifsc_code, "SBIN0001234");
    assert_eq!(balance(&exchange), dec!(454.48));

    let first = exchange
        .decide_withdrawal(admin(), &request.request_id, WithdrawalStatus::Approved, None)
        .await
        .unwrap();
    let mrx_sold = match first.effect {
        WithdrawalEffect::Settled { mrx_sold, .. } => mrx_sold,
        other => panic!("expected settlement, got {:?}", other),
    };
    let pool_after_first = exchange.pool().unwrap();
    let holding_after_first = exchange.internal_mrx(USER).unwrap();
    assert_eq!(holding_after_first, dec!(47.5) - mrx_sold);
    assert_eq!(pool_after_first.inr_pool, dec!(2045));

    let second = exchange
        .decide_withdrawal(admin(), &request.request_id, WithdrawalStatus::Approved, None)
        .await
        .unwrap();
    assert_eq!(second.effect, WithdrawalEffect::StatusOnly);
    assert_eq!(exchange.pool().unwrap(), pool_after_first);
    assert_eq!(exchange.internal_mrx(USER).unwrap(), holding_after_first);
    assert_eq!(balance(&exchange), dec!(454.48));

    let processed = exchange
        .decide_withdrawal(
            admin(),
            &request.request_id,
            WithdrawalStatus::Processed,
            Some("UTR 998877"),
        )
        .await
        .unwrap();
    assert_eq!(processed.effect, WithdrawalEffect::Processed);
    assert_eq!(processed.request.remarks, "UTR 998877");
    assert!(processed.request.processed_at.is_some());

    assert!(exchange.mrx_reconciliation().unwrap().reconciled);
    let stats = exchange.withdrawal_stats().unwrap();
    assert_eq!(stats.count(WithdrawalStatus::Processed), 1);

    let history = exchange.user_withdrawals(USER).unwrap();
    assert_eq!(history[0].account_number, "9012");
}

#[tokio::test]
async fn test_approval_without_mrx_is_rescinded() {
    let (exchange, _temp) = funded_exchange(dec!(1000)).await;

    let request = exchange
        .request_withdrawal(user(), dec!(100), bank())
        .await
        .unwrap();
    assert_eq!(balance(&exchange), dec!(900));

    let outcome = exchange
        .decide_withdrawal(admin(), &request.request_id, WithdrawalStatus::Approved, None)
        .await
        .unwrap();

    assert_eq!(
        outcome.effect,
        WithdrawalEffect::AutoRejected {
            reason: RescindReason::InsufficientMrx,
            amount: dec!(100),
        }
    );
    assert_eq!(outcome.request.status, WithdrawalStatus::Rejected);
    assert!(!outcome.request.remarks.is_empty());
    assert_eq!(balance(&exchange), dec!(1000));
    assert_eq!(exchange.pool().unwrap().inr_pool, dec!(2000));

    let txns = exchange.user_transactions(USER, 1).unwrap();
    assert_eq!(txns[0].kind, TxnKind::WithdrawalRejectedInsufficientMrx);

    let logs = exchange.recent_admin_logs(1).unwrap();
    assert_eq!(logs[0].action, "withdrawal_rejected");
    assert_eq!(logs[0].ip_address, "10.0.0.7");
}

#[tokio::test]
async fn test_rejection_refunds_once() {
    let (exchange, _temp) = funded_exchange(dec!(1000)).await;

    let request = exchange
        .request_withdrawal(user(), dec!(250), bank())
        .await
        .unwrap();
    for _ in 0..2 {
        exchange
            .decide_withdrawal(admin(), &request.request_id, WithdrawalStatus::Rejected, None)
            .await
            .unwrap();
    }

    assert_eq!(balance(&exchange), dec!(1000));
}

#[tokio::test]
async fn test_deposit_approval_credits_once() {
    let (exchange, _temp) = funded_exchange(dec!(500)).await;

    let claim = exchange
        .request_deposit(
            user(),
            DepositClaim {
                amount: dec!(2500),
                transaction_id: "IMPS556677".into(),
                phone: "9876543210".into(),
                payment_method: None,
            },
        )
        .await
        .unwrap();

    for _ in 0..3 {
        exchange
            .decide_deposit(admin(), &claim.request_id, DepositStatus::Approved)
            .await
            .unwrap();
    }

    assert_eq!(balance(&exchange), dec!(3000));
    assert!(exchange
        .all_deposits(Some(DepositStatus::Pending), 10)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_daily_limit_and_reset() {
    let (exchange, _temp) = funded_exchange(dec!(50000)).await;

    for _ in 0..10 {
        exchange.execute_buy(user(), buy(dec!(1000))).await.unwrap();
    }
    let err = exchange.execute_buy(user(), buy(dec!(1))).await.unwrap_err();
    assert!(matches!(err, Error::DailyLimitExceeded(_)));
    assert!(exchange.daily_limit_status(&user()).unwrap().limit_reached);

    let reset = exchange.reset_daily_limit(admin(), USER).await.unwrap();
    assert_eq!(reset.previous_total, dec!(10000));
    exchange.execute_buy(user(), buy(dec!(1))).await.unwrap();

    let dashboard = exchange.dashboard().unwrap();
    assert_eq!(dashboard.total_users, 1);
    assert!(dashboard.reconciliation.reconciled);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let (exchange, temp) = funded_exchange(dec!(500)).await;
    exchange.execute_buy(user(), buy(dec!(100))).await.unwrap();
    exchange.shutdown().await.unwrap();
    drop(exchange);

    let mut config = Config::default();
    config.data_dir = temp.path().to_path_buf();
    let reopened = Exchange::open(config).await.unwrap();

    assert_eq!(reopened.pool().unwrap().mrx_pool, dec!(952.5));
    assert_eq!(balance(&reopened), dec!(504.48));
    assert_eq!(reopened.internal_mrx(USER).unwrap(), dec!(47.5));
}
