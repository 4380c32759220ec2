//! Types for the Salt Edge aggregator payloads.
//!
//! Every type here is an immutable snapshot of what the aggregator reported during one pass.
//! Unknown provider-specific fields are preserved in overflow maps so cached snapshots keep the
//! full record.

use crate::cache::Cacheable;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A linked bank relationship at the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Login {
    /// The aggregator's login id.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub provider_code: Option<String>,
    #[serde(default)]
    pub provider_name: Option<String>,
    /// Connection status, e.g. `active` or `disabled`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success_at: Option<DateTime<Utc>>,
}

impl Login {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("login without id".to_string());
        }
        Ok(())
    }
}

impl Cacheable for Login {
    const KIND: crate::cache::EntityKind = crate::cache::EntityKind::Login;

    fn external_id(&self) -> &str {
        &self.id
    }
}

/// Account nature as reported by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountNature {
    Account,
    Bonus,
    Card,
    Checking,
    Credit,
    CreditCard,
    DebitCard,
    Ewallet,
    Insurance,
    Investment,
    Loan,
    Mortgage,
    Savings,
    #[serde(other)]
    Other,
}

impl AccountNature {
    /// Loans and mortgages are mirrored as liabilities.
    pub fn is_liability(&self) -> bool {
        matches!(self, AccountNature::Loan | AccountNature::Mortgage)
    }

    /// Day-to-day payment accounts.
    pub fn is_checking_like(&self) -> bool {
        matches!(
            self,
            AccountNature::Account | AccountNature::Checking | AccountNature::DebitCard
        )
    }
}

/// Interest rate range reported for variable-rate products.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateRange {
    #[serde(default)]
    pub min_value: Option<Decimal>,
    #[serde(default)]
    pub max_value: Option<Decimal>,
}

/// Provider-specific account details.
///
/// Fields the sync relies on are modelled explicitly; everything else lands in `other`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountExtra {
    /// Human readable account name as shown by the bank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floating_interest_rate: Option<RateRange>,
    /// Per-part rates when several loan parts are reported as one account.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interest_rates: Vec<Decimal>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl AccountExtra {
    /// Every interest rate the aggregator reported for the account.
    pub fn interest_rates(&self) -> Vec<Decimal> {
        let mut rates = Vec::new();
        rates.extend(self.interest_rate);
        if let Some(range) = &self.floating_interest_rate {
            rates.extend(range.min_value);
            rates.extend(range.max_value);
        }
        rates.extend(self.interest_rates.iter().copied());
        rates
    }

    /// The highest reported rate.
    ///
    /// Loans split into several parts are reported as one aggregate account; the highest rate
    /// stands in for all of them.
    pub fn max_interest_rate(&self) -> Option<Decimal> {
        self.interest_rates().into_iter().max()
    }
}

/// An account at the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorAccount {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Owning login.
    #[serde(alias = "connection_id", deserialize_with = "string_or_number")]
    pub login_id: String,
    /// The provider's identifier for the account; an IBAN for most bank accounts and the
    /// contract number for loans.
    pub name: String,
    pub nature: AccountNature,
    pub balance: Decimal,
    pub currency_code: String,
    #[serde(default)]
    pub extra: AccountExtra,
}

impl AggregatorAccount {
    /// The identifier matched against ledger IBANs and account numbers.
    pub fn identifier(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        self.extra
            .account_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.name)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("account without id".to_string());
        }
        if self.currency_code.trim().is_empty() {
            return Err(format!("account {} without currency", self.id));
        }
        Ok(())
    }
}

impl Cacheable for AggregatorAccount {
    const KIND: crate::cache::EntityKind = crate::cache::EntityKind::Account;

    fn external_id(&self) -> &str {
        &self.id
    }
}

/// A transaction at the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorTransaction {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub account_id: String,
    #[serde(default)]
    pub description: String,
    /// Signed amount; negative values are debits.
    pub amount: Decimal,
    pub currency_code: String,
    /// Posting date.
    pub made_on: NaiveDate,
    /// `posted` or `pending`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Flagged by the aggregator as a duplicate of another transaction.
    #[serde(default)]
    pub duplicated: bool,
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl AggregatorTransaction {
    pub fn is_pending(&self) -> bool {
        self.status.as_deref() == Some("pending")
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("transaction without id".to_string());
        }
        if self.currency_code.trim().is_empty() {
            return Err(format!("transaction {} without currency", self.id));
        }
        Ok(())
    }
}

/// Salt Edge sends ids as strings, older endpoints as numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}
