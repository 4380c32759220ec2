//! Identity matching strategies.
//!
//! Each strategy names one identifying field of a ledger account. The match engine tries them in
//! the order of [`default_strategies`] and the first strategy that finds a counterpart wins.

use crate::ledger::LedgerAccount;

/// A way of identifying a ledger account by one of its fields
pub trait MatchStrategy: Send + Sync {
	/// Get the name of this strategy
	fn name(&self) -> &'static str;

	/// The field compared against the aggregator identifier, if the account has one.
	fn field<'a>(&self, account: &'a LedgerAccount) -> Option<&'a str>;
}

/// Matches on `LedgerAccount.iban`
pub struct IbanStrategy;

impl MatchStrategy for IbanStrategy {
	fn name(&self) -> &'static str {
		"iban"
	}

	fn field<'a>(&self, account: &'a LedgerAccount) -> Option<&'a str> {
		account.iban.as_deref()
	}
}

/// Matches on `LedgerAccount.account_number`; covers loans that carry no IBAN.
pub struct AccountNumberStrategy;

impl MatchStrategy for AccountNumberStrategy {
	fn name(&self) -> &'static str {
		"account_number"
	}

	fn field<'a>(&self, account: &'a LedgerAccount) -> Option<&'a str> {
		account.account_number.as_deref()
	}
}

/// IBAN first, then account number. The order must not change.
pub fn default_strategies() -> Vec<Box<dyn MatchStrategy>> {
	vec![Box::new(IbanStrategy), Box::new(AccountNumberStrategy)]
}
