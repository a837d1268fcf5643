//! Account ledger: per-user INR balance and internal MRX holding
//!
//! Cash lives on the account row; the internal MRX holding lives in its own
//! file and is created lazily on the first write. Balance writes rewrite the
//! accounts file under its exclusive lock.

use crate::{
    store::RecordFile,
    types::{round_inr, round_mrx, Account, InternalMrxHolding, RequestContext},
    Error, Result, Storage,
};
use regex::Regex;
use rust_decimal::Decimal;
use std::sync::OnceLock;
use uuid::Uuid;

fn mobile_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[6-9][0-9]{9}$").expect("valid mobile pattern"))
}

/// Signup input
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Display name
    pub full_name: String,
    /// Unique login email
    pub email: String,
    /// Mobile number; non-digits are stripped
    pub mobile: String,
    /// Credential as produced by the auth layer
    pub credential: String,
    /// Optional referral code
    pub referral: Option<String>,
}

/// Handle to accounts and internal MRX holdings
pub struct AccountLedger<'a> {
    accounts: &'a RecordFile<Account>,
    holdings: &'a RecordFile<InternalMrxHolding>,
}

impl<'a> AccountLedger<'a> {
    /// Create handle
    pub fn new(storage: &'a Storage) -> Self {
        Self {
            accounts: &storage.accounts,
            holdings: &storage.holdings,
        }
    }

    /// Register a new account with a zero balance
    pub fn create_account(&self, ctx: &RequestContext, input: NewAccount) -> Result<Account> {
        let full_name = input.full_name.trim();
        let email = input.email.trim();
        let mobile: String = input.mobile.chars().filter(|c| c.is_ascii_digit()).collect();

        if full_name.is_empty() {
            return Err(Error::Validation("Full name is required".to_string()));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(Error::Validation("A valid email is required".to_string()));
        }
        if input.credential.is_empty() {
            return Err(Error::Validation("Credential is required".to_string()));
        }
        if !mobile_pattern().is_match(&mobile) {
            return Err(Error::Validation(
                "Mobile must be 10 digits starting with 6-9".to_string(),
            ));
        }

        let existing = self.accounts.scan()?;
        if existing.iter().any(|a| a.email == email) {
            return Err(Error::Validation(format!("Email already registered: {}", email)));
        }
        if existing.iter().any(|a| a.mobile == mobile) {
            return Err(Error::Validation("Mobile number already registered".to_string()));
        }

        let account = Account {
            user_id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            full_name: full_name.to_string(),
            email: email.to_string(),
            mobile,
            credential: input.credential,
            referral: input.referral.unwrap_or_default().trim().to_string(),
            inr_balance: Decimal::ZERO,
            created_at: ctx.timestamp(),
        };
        self.accounts.append(&account)?;

        tracing::info!(email = %account.email, user_id = %account.user_id, "Account created");
        Ok(account)
    }

    /// Account by email
    pub fn get_account(&self, email: &str) -> Result<Option<Account>> {
        self.accounts.find(|a| a.email == email)
    }

    /// Account by email, `NotFound` if absent
    pub fn require_account(&self, email: &str) -> Result<Account> {
        self.get_account(email)?
            .ok_or_else(|| Error::NotFound(format!("Account {}", email)))
    }

    /// Every account
    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        self.accounts.scan()
    }

    /// Overwrite the INR balance (rounded to cents)
    pub fn set_balance(&self, email: &str, new_inr: Decimal) -> Result<Decimal> {
        let new_inr = round_inr(new_inr);
        if new_inr < Decimal::ZERO {
            return Err(Error::InsufficientBalance(format!(
                "Balance of {} cannot go negative (₹{})",
                email, new_inr
            )));
        }

        let matched = self
            .accounts
            .update_where(|a| a.email == email, |a| a.inr_balance = new_inr)?;
        if matched == 0 {
            return Err(Error::NotFound(format!("Account {}", email)));
        }

        tracing::debug!(email, balance = %new_inr, "Balance set");
        Ok(new_inr)
    }

    /// Add `delta` to the INR balance inside one exclusive rewrite
    ///
    /// Returns the new balance. Fails with `InsufficientBalance` (nothing
    /// written) if the result would be negative.
    pub fn adjust_balance(&self, email: &str, delta: Decimal) -> Result<Decimal> {
        let mut outcome: Option<Result<Decimal>> = None;

        self.accounts.update_where(
            |a| a.email == email,
            |a| {
                let next = round_inr(a.inr_balance + delta);
                if next < Decimal::ZERO {
                    outcome = Some(Err(Error::InsufficientBalance(format!(
                        "Required ₹{}, available ₹{}",
                        -delta, a.inr_balance
                    ))));
                } else {
                    a.inr_balance = next;
                    outcome = Some(Ok(next));
                }
            },
        )?;

        let balance = outcome.ok_or_else(|| Error::NotFound(format!("Account {}", email)))??;
        tracing::debug!(email, delta = %delta, balance = %balance, "Balance adjusted");
        Ok(balance)
    }

    /// Internal MRX holding, zero if the user never traded
    pub fn get_internal_mrx(&self, email: &str) -> Result<Decimal> {
        Ok(self
            .holdings
            .find(|h| h.user_email == email)?
            .map(|h| h.internal_mrx_balance)
            .unwrap_or(Decimal::ZERO))
    }

    /// Overwrite the internal MRX holding, creating the row if absent
    pub fn set_internal_mrx(&self, email: &str, balance: Decimal, now: i64) -> Result<Decimal> {
        let balance = round_mrx(balance);
        if balance < Decimal::ZERO {
            return Err(Error::InsufficientBalance(format!(
                "Internal MRX of {} cannot go negative ({})",
                email, balance
            )));
        }

        self.holdings.upsert(
            |h| h.user_email == email,
            |h| {
                h.internal_mrx_balance = balance;
                h.last_updated = now;
            },
            || InternalMrxHolding {
                user_email: email.to_string(),
                internal_mrx_balance: balance,
                last_updated: now,
            },
        )?;

        tracing::debug!(email, internal_mrx = %balance, "Internal MRX set");
        Ok(balance)
    }

    /// Sum of every user's internal MRX
    pub fn total_internal_mrx(&self) -> Result<Decimal> {
        Ok(self
            .holdings
            .scan()?
            .iter()
            .map(|h| h.internal_mrx_balance)
            .sum())
    }

    /// Every holding
    pub fn list_holdings(&self) -> Result<Vec<InternalMrxHolding>> {
        self.holdings.scan()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::tests::test_storage;
    use rust_decimal_macros::dec;

    pub(crate) fn signup(ledger: &AccountLedger<'_>, email: &str, mobile: &str) -> Account {
        ledger
            .create_account(
                &RequestContext::new(email),
                NewAccount {
                    full_name: "Test User".into(),
                    email: email.into(),
                    mobile: mobile.into(),
                    credential: "hashed".into(),
                    referral: None,
                },
            )
            .unwrap()
    }

    #[test]
    fn test_create_and_get_account() {
        let (storage, _config, _temp) = test_storage();
        let ledger = AccountLedger::new(&storage);

        let account = signup(&ledger, "asha@example.com", "98765 43210");
        assert_eq!(account.mobile, "9876543210");
        assert_eq!(account.inr_balance, Decimal::ZERO);
        assert_eq!(account.user_id.len(), 8);

        let fetched = ledger.require_account("asha@example.com").unwrap();
        assert_eq!(fetched, account);
        assert!(ledger.get_account("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn test_create_account_validation() {
        let (storage, _config, _temp) = test_storage();
        let ledger = AccountLedger::new(&storage);
        signup(&ledger, "asha@example.com", "9876543210");

        let ctx = RequestContext::new("x");
        let base = NewAccount {
            full_name: "Ravi".into(),
            email: "ravi@example.com".into(),
            mobile: "9123456780".into(),
            credential: "hashed".into(),
            referral: Some("REF001".into()),
        };

        let dup_email = NewAccount {
            email: "asha@example.com".into(),
            ..base.clone()
        };
        assert!(matches!(
            ledger.create_account(&ctx, dup_email),
            Err(Error::Validation(_))
        ));

        let dup_mobile = NewAccount {
            mobile: "9876543210".into(),
            ..base.clone()
        };
        assert!(ledger.create_account(&ctx, dup_mobile).is_err());

        let bad_mobile = NewAccount {
            mobile: "5123456789".into(),
            ..base.clone()
        };
        assert!(ledger.create_account(&ctx, bad_mobile).is_err());

        let created = ledger.create_account(&ctx, base).unwrap();
        assert_eq!(created.referral, "REF001");
    }

    #[test]
    fn test_set_and_adjust_balance() {
        let (storage, _config, _temp) = test_storage();
        let ledger = AccountLedger::new(&storage);
        signup(&ledger, "asha@example.com", "9876543210");

        assert_eq!(ledger.set_balance("asha@example.com", dec!(100.006)).unwrap(), dec!(100.01));
        assert_eq!(
            ledger.adjust_balance("asha@example.com", dec!(-40)).unwrap(),
            dec!(60.01)
        );

        let err = ledger.adjust_balance("asha@example.com", dec!(-60.02)).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance(_)));
        assert_eq!(
            ledger.require_account("asha@example.com").unwrap().inr_balance,
            dec!(60.01)
        );

        assert!(matches!(
            ledger.set_balance("ghost@example.com", dec!(1)),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            ledger.adjust_balance("ghost@example.com", dec!(1)),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_internal_mrx_upsert() {
        let (storage, _config, _temp) = test_storage();
        let ledger = AccountLedger::new(&storage);

        assert_eq!(ledger.get_internal_mrx("a@example.com").unwrap(), Decimal::ZERO);
        ledger.set_internal_mrx("a@example.com", dec!(47.5), 1).unwrap();
        ledger.set_internal_mrx("b@example.com", dec!(2.0000004), 1).unwrap();
        ledger.set_internal_mrx("a@example.com", dec!(50), 2).unwrap();

        assert_eq!(ledger.get_internal_mrx("a@example.com").unwrap(), dec!(50));
        assert_eq!(ledger.get_internal_mrx("b@example.com").unwrap(), dec!(2));
        assert_eq!(ledger.total_internal_mrx().unwrap(), dec!(52));
        assert_eq!(ledger.list_holdings().unwrap().len(), 2);

        assert!(ledger.set_internal_mrx("a@example.com", dec!(-1), 3).is_err());
    }
}
