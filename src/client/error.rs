use thiserror::Error;
use tokio::runtime::TryCurrentError;
use tokio::task::JoinError;

use crate::protocol::WriterError;
use crate::routing::SubscriptionError;
use crate::subject::SubjectError;

/// Errors that can occur in client operations
#[derive(Error, Debug)]
pub enum ClientError {
	/// A subject or queue group failed validation. Nothing was sent.
	#[error("Invalid argument: {0}")]
	InvalidArgument(#[from] SubjectError),

	/// The operation is not allowed in the current lifecycle state
	#[error("Invalid state: {0}")]
	InvalidState(#[from] SubscriptionError),

	/// The connection refused a control frame
	#[error("Protocol writer error: {0}")]
	Writer(#[from] WriterError),

	/// Invalid configuration parameter values
	#[error("Invalid configuration value: {0}")]
	ConfigurationValue(String),

	/// Dispatchers need a Tokio runtime to run their worker
	#[error("No Tokio runtime available: {0}")]
	Runtime(#[from] TryCurrentError),

	/// A dispatcher worker task panicked or was cancelled
	#[error("Dispatcher worker failed: {0}")]
	Worker(#[from] JoinError),
}

impl ClientError {
	/// Returns true for rejected subjects and queue groups
	pub fn is_invalid_argument(&self) -> bool {
		matches!(self, ClientError::InvalidArgument(_))
	}

	/// Returns true for operations on closed subscriptions, dispatchers
	/// or connections
	pub fn is_invalid_state(&self) -> bool {
		matches!(self, ClientError::InvalidState(_))
	}

	/// Returns the error type for categorization
	pub fn error_type(&self) -> &'static str {
		match self {
			| ClientError::InvalidArgument(err) => err.error_type(),
			| ClientError::InvalidState(err) => err.error_type(),
			| ClientError::Writer(_) => "writer",
			| ClientError::ConfigurationValue(_) => "configuration_value",
			| ClientError::Runtime(_) => "runtime",
			| ClientError::Worker(_) => "worker",
		}
	}
}
