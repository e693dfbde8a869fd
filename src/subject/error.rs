//! Error types and limits for the subject module

use thiserror::Error;

/// Errors raised when a subject or queue group name breaks the grammar.
///
/// Every variant is an invalid-argument condition: it is reported
/// synchronously by the call that received the bad name and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubjectError {
	/// Subject is the empty string
	#[error("Subject cannot be empty")]
	EmptySubject,

	/// Queue group is the empty string (distinct from "no queue group")
	#[error("Queue group cannot be empty")]
	EmptyQueueGroup,

	/// Name contains a space, tab, carriage return or line feed
	#[error("'{value}' contains whitespace at byte {position}")]
	Whitespace {
		/// The rejected name
		value: String,
		/// Byte offset of the first whitespace character
		position: usize,
	},

	/// Name has a leading, trailing or doubled token separator
	#[error("'{value}' contains an empty token at index {index}")]
	EmptyToken {
		/// The rejected name
		value: String,
		/// Index of the empty token
		index: usize,
	},

	/// `*` or `>` used as part of a token, or `>` not in the last position
	#[error("Invalid wildcard usage in '{value}': {usage}")]
	WildcardUsage {
		/// The rejected name
		value: String,
		/// What was wrong with the wildcard
		usage: String,
	},

	/// Name longer than [`limits::MAX_SUBJECT_LENGTH`]
	#[error("'{value}' is too long: {len} > {max}")]
	TooLong {
		/// The rejected name
		value: String,
		/// Actual length in bytes
		len: usize,
		/// Maximum accepted length in bytes
		max: usize,
	},
}

impl SubjectError {
	/// Creates a new Whitespace error
	pub fn whitespace(value: impl Into<String>, position: usize) -> Self {
		Self::Whitespace {
			value: value.into(),
			position,
		}
	}

	/// Creates a new EmptyToken error
	pub fn empty_token(value: impl Into<String>, index: usize) -> Self {
		Self::EmptyToken {
			value: value.into(),
			index,
		}
	}

	/// Creates a new WildcardUsage error
	pub fn wildcard_usage(
		value: impl Into<String>,
		usage: impl Into<String>,
	) -> Self {
		Self::WildcardUsage {
			value: value.into(),
			usage: usage.into(),
		}
	}

	/// Creates a new TooLong error
	pub fn too_long(value: impl Into<String>, len: usize) -> Self {
		Self::TooLong {
			value: value.into(),
			len,
			max: limits::MAX_SUBJECT_LENGTH,
		}
	}

	/// Returns the error type for categorization
	pub fn error_type(&self) -> &'static str {
		match self {
			| SubjectError::EmptySubject => "empty_subject",
			| SubjectError::EmptyQueueGroup => "empty_queue_group",
			| SubjectError::Whitespace { .. } => "whitespace",
			| SubjectError::EmptyToken { .. } => "empty_token",
			| SubjectError::WildcardUsage { .. } => "wildcard_usage",
			| SubjectError::TooLong { .. } => "too_long",
		}
	}
}

/// Convenient Result type for subject operations
pub type SubjectResult<T> = Result<T, SubjectError>;

/// Subject processing limits and constants
pub mod limits {
	/// Maximum subject or queue group length in bytes
	pub const MAX_SUBJECT_LENGTH: usize = 4096;

	/// Token separator
	pub const TOKEN_SEPARATOR: char = '.';

	/// Matches exactly one token
	pub const SINGLE_TOKEN_WILDCARD: &str = "*";

	/// Matches one or more trailing tokens
	pub const TAIL_WILDCARD: &str = ">";
}
