use crate::ledger::{LedgerAccount, LedgerAccountType};

/// The ledger accounts known during one pass.
///
/// Loaded once per pass and handed to the match engine read-only. Accounts are added only after
/// the ledger has confirmed their creation.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
	accounts: Vec<LedgerAccount>,
}

impl LedgerSnapshot {
	pub fn new(accounts: Vec<LedgerAccount>) -> Self {
		Self { accounts }
	}

	/// Add an account the ledger just created.
	pub fn insert(&mut self, account: LedgerAccount) {
		self.accounts.push(account);
	}

	pub fn accounts(&self) -> &[LedgerAccount] {
		&self.accounts
	}

	pub fn of_type(&self, account_type: LedgerAccountType) -> impl Iterator<Item = &LedgerAccount> {
		self.accounts.iter().filter(move |a| a.account_type == account_type)
	}

	pub fn len(&self) -> usize {
		self.accounts.len()
	}

	pub fn is_empty(&self) -> bool {
		self.accounts.is_empty()
	}
}
