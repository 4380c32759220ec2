use crate::sync::progress_tracker::SyncProgressTracker;
use crate::sync::types::SyncError;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// Normalizes an account identifier for comparison.
///
/// Identifiers are compared case-insensitively after trimming surrounding whitespace.
/// Blank identifiers normalize to `None` and never take part in a match.
pub fn normalize_identifier(value: &str) -> Option<String> {
	let trimmed = value.trim();
	if trimmed.is_empty() {
		return None;
	}
	Some(trimmed.to_lowercase())
}

pub fn format_amount(amount: Decimal, currency_code: &str) -> String {
	format!("{:.2} {}", amount, currency_code)
}

/// Appends `key=value` to a relative path that may already carry a query string.
///
/// The value is percent-encoded.
pub fn with_query(path: &str, key: &str, value: &str) -> String {
	let separator = if path.contains('?') { '&' } else { '?' };
	format!("{}{}{}={}", path, separator, key, urlencoding::encode(value))
}

/// Decode each item individually, skipping malformed ones.
pub fn decode_items<T: DeserializeOwned>(
	items: Vec<Value>,
	what: &str,
	validate: fn(&T) -> Result<(), String>,
	progress: &mut SyncProgressTracker,
) -> Vec<T> {
	let mut records = Vec::with_capacity(items.len());
	for item in items {
		let decoded = serde_json::from_value::<T>(item)
			.map_err(|e| e.to_string())
			.and_then(|record| validate(&record).map(|_| record));
		match decoded {
			Ok(record) => records.push(record),
			Err(reason) => {
				warn!("{}", SyncError::malformed(what, reason));
				progress.record_failed();
			}
		}
	}
	records
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;

	#[test]
	fn appends_query_parameters() {
		assert_eq!(with_query("accounts", "login_id", "7"), "accounts?login_id=7");
		assert_eq!(
			with_query("accounts?login_id=7", "from_id", "9"),
			"accounts?login_id=7&from_id=9"
		);
	}

	#[test]
	fn encodes_query_values() {
		assert_eq!(
			with_query("logins", "customer_id", "a&b=c d"),
			"logins?customer_id=a%26b%3Dc%20d"
		);
	}

	#[test]
	fn normalizes_case_and_surrounding_whitespace() {
		assert_eq!(
			normalize_identifier("  GB98MIDL07009312345678 \t"),
			Some("gb98midl07009312345678".to_string())
		);
	}

	#[test]
	fn blank_identifiers_are_absent() {
		assert_eq!(normalize_identifier(""), None);
		assert_eq!(normalize_identifier("   "), None);
	}

	#[test]
	fn formats_two_decimal_places() {
		assert_eq!(format_amount(dec!(-1012.1), "EUR"), "-1012.10 EUR");
	}
}
