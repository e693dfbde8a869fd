//! Wildcard matching between a subscription pattern and a literal subject.

use super::error::limits::{
	SINGLE_TOKEN_WILDCARD, TAIL_WILDCARD, TOKEN_SEPARATOR,
};

/// Returns true if `subject` is matched by `pattern`.
///
/// `*` matches exactly one token, `>` matches one or more trailing tokens.
/// Both arguments are expected to have passed validation already.
pub fn matches(pattern: &str, subject: &str) -> bool {
	let mut pattern_tokens = pattern.split(TOKEN_SEPARATOR);
	let mut subject_tokens = subject.split(TOKEN_SEPARATOR);

	loop {
		match (pattern_tokens.next(), subject_tokens.next()) {
			| (Some(TAIL_WILDCARD), Some(_)) => return true,
			| (Some(SINGLE_TOKEN_WILDCARD), Some(_)) => continue,
			| (Some(expected), Some(actual)) if expected == actual => continue,
			| (None, None) => return true,
			| _ => return false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::matches;

	#[test]
	fn test_literal_match() {
		assert!(matches("foo.bar", "foo.bar"));
		assert!(!matches("foo.bar", "foo.baz"));
		assert!(!matches("foo.bar", "foo"));
		assert!(!matches("foo", "foo.bar"));
	}

	#[test]
	fn test_single_token_wildcard() {
		assert!(matches("foo.*.baz", "foo.bar.baz"));
		assert!(matches("*", "foo"));
		assert!(!matches("foo.*", "foo"));
		assert!(!matches("foo.*", "foo.bar.baz"));
	}

	#[test]
	fn test_tail_wildcard_needs_at_least_one_token() {
		assert!(matches("foo.>", "foo.bar"));
		assert!(matches("foo.>", "foo.bar.baz.qux"));
		assert!(!matches("foo.>", "foo"));
		assert!(matches(">", "anything.at.all"));
	}

	#[test]
	fn test_mixed_wildcards() {
		assert!(matches("*.orders.>", "eu.orders.created.v1"));
		assert!(!matches("*.orders.>", "eu.invoices.created"));
	}
}
