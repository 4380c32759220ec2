//! Types for the Firefly III ledger payloads.
//!
//! Read types decode the JSON:API resources Firefly returns (`{ id, attributes }`); write types
//! are the bodies posted to the create endpoints.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Ledger account type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerAccountType {
    Asset,
    #[serde(alias = "liabilities", alias = "loan", alias = "debt", alias = "mortgage")]
    Liability,
    Expense,
    Revenue,
    Cash,
    #[serde(rename = "initial-balance")]
    InitialBalance,
    Reconciliation,
    #[serde(other)]
    Other,
}

impl LedgerAccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerAccountType::Asset => "asset",
            LedgerAccountType::Liability => "liability",
            LedgerAccountType::Expense => "expense",
            LedgerAccountType::Revenue => "revenue",
            LedgerAccountType::Cash => "cash",
            LedgerAccountType::InitialBalance => "initial-balance",
            LedgerAccountType::Reconciliation => "reconciliation",
            LedgerAccountType::Other => "other",
        }
    }
}

impl fmt::Display for LedgerAccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of an asset account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountRole {
    DefaultAsset,
    SavingAsset,
    SharedAsset,
    CcAsset,
    CashWalletAsset,
    #[serde(other)]
    Other,
}

/// Liability metadata of a ledger account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiabilityDetails {
    pub liability_type: Option<String>,
    pub liability_amount: Option<Decimal>,
    pub liability_start_date: Option<NaiveDate>,
    pub interest: Option<Decimal>,
    pub interest_period: Option<String>,
}

/// A Firefly JSON:API resource.
#[derive(Debug, Clone, Deserialize)]
pub struct Resource<A> {
    pub id: String,
    pub attributes: A,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountAttributes {
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: LedgerAccountType,
    #[serde(default)]
    pub iban: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub account_role: Option<AccountRole>,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub opening_balance: Option<Decimal>,
    #[serde(default)]
    pub liability_type: Option<String>,
    #[serde(default)]
    pub liability_amount: Option<Decimal>,
    /// Either a plain date or an RFC 3339 timestamp depending on the Firefly version.
    #[serde(default)]
    pub liability_start_date: Option<String>,
    #[serde(default)]
    pub interest: Option<Decimal>,
    #[serde(default)]
    pub interest_period: Option<String>,
}

/// An account as known to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerAccount {
    /// Assigned by the ledger on creation.
    pub ledger_id: String,
    pub name: String,
    pub account_type: LedgerAccountType,
    pub iban: Option<String>,
    pub account_number: Option<String>,
    pub role: Option<AccountRole>,
    pub currency_code: Option<String>,
    pub opening_balance: Option<Decimal>,
    pub liability: Option<LiabilityDetails>,
}

impl From<Resource<AccountAttributes>> for LedgerAccount {
    fn from(resource: Resource<AccountAttributes>) -> Self {
        let attributes = resource.attributes;
        let liability = (attributes.account_type == LedgerAccountType::Liability).then(|| {
            LiabilityDetails {
                liability_type: attributes.liability_type,
                liability_amount: attributes.liability_amount,
                liability_start_date: attributes
                    .liability_start_date
                    .as_deref()
                    .and_then(|d| NaiveDate::parse_from_str(d.get(..10)?, "%Y-%m-%d").ok()),
                interest: attributes.interest,
                interest_period: attributes.interest_period,
            }
        });

        LedgerAccount {
            ledger_id: resource.id,
            name: attributes.name,
            account_type: attributes.account_type,
            iban: attributes.iban,
            account_number: attributes.account_number,
            role: attributes.account_role,
            currency_code: attributes.currency_code,
            opening_balance: attributes.opening_balance,
            liability,
        }
    }
}

/// One split of a ledger transaction group.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LedgerSplit {
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub destination_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionAttributes {
    #[serde(default)]
    pub transactions: Vec<LedgerSplit>,
}

/// A transaction group as known to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTransaction {
    pub ledger_id: String,
    pub splits: Vec<LedgerSplit>,
}

impl LedgerTransaction {
    /// Aggregator references carried by the splits.
    pub fn external_ids(&self) -> impl Iterator<Item = &str> {
        self.splits
            .iter()
            .filter_map(|s| s.external_id.as_deref())
            .filter(|id| !id.trim().is_empty())
    }
}

impl From<Resource<TransactionAttributes>> for LedgerTransaction {
    fn from(resource: Resource<TransactionAttributes>) -> Self {
        LedgerTransaction {
            ledger_id: resource.id,
            splits: resource.attributes.transactions,
        }
    }
}

/// Body of `POST accounts`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewLedgerAccount {
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: LedgerAccountType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_role: Option<AccountRole>,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub opening_balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening_balance_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liability_type: Option<String>,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub liability_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liability_start_date: Option<NaiveDate>,
    /// Percentage, sent as a string the way Firefly reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_period: Option<String>,
}

impl NewLedgerAccount {
    /// A payload with only a name and type set.
    pub fn named(name: impl Into<String>, account_type: LedgerAccountType) -> Self {
        Self {
            name: name.into(),
            account_type,
            iban: None,
            account_number: None,
            account_role: None,
            opening_balance: None,
            opening_balance_date: None,
            currency_code: None,
            liability_type: None,
            liability_amount: None,
            liability_start_date: None,
            interest: None,
            interest_period: None,
        }
    }
}

/// Direction of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Asset to expense.
    Withdrawal,
    /// Revenue to asset.
    Deposit,
}

/// One split of `POST transactions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewLedgerSplit {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub date: NaiveDate,
    /// Always positive; the direction is carried by `kind`.
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub description: String,
    pub source_id: String,
    pub destination_id: String,
    pub currency_code: String,
    pub external_id: String,
}

/// Body of `POST transactions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewLedgerTransaction {
    pub error_if_duplicate_hash: bool,
    pub apply_rules: bool,
    pub transactions: Vec<NewLedgerSplit>,
}

/// Reads `meta.pagination.total_pages`, if present.
pub fn total_pages(meta: Option<&Value>) -> Option<u64> {
    meta?.get("pagination")?.get("total_pages")?.as_u64()
}
