//! Configuration for the subscription core

use arcstr::ArcStr;

use super::error::ClientError;
use crate::subject;

/// Client-level buffering and lifecycle settings
#[derive(Debug, Clone)]
pub struct ClientSettings {
	/// Bound of every subscription mailbox; `None` means unbounded
	pub pending_messages_limit: Option<usize>,
	/// Capacity of each dispatcher's message queue (must be > 0)
	pub dispatcher_queue_capacity: usize,
	/// Prefix of subjects returned by `create_inbox`
	pub inbox_prefix: ArcStr,
	/// How long `NatsConnection::shutdown` waits for dispatcher workers
	pub shutdown_timeout_millis: u64,
}

impl Default for ClientSettings {
	fn default() -> Self {
		Self {
			pending_messages_limit: Some(65_536),
			dispatcher_queue_capacity: 65_536,
			inbox_prefix: arcstr::literal!("_INBOX"),
			shutdown_timeout_millis: 500,
		}
	}
}

impl ClientSettings {
	/// Checks that every value is usable.
	pub fn validate(&self) -> Result<(), ClientError> {
		if self.pending_messages_limit == Some(0) {
			return Err(ClientError::ConfigurationValue(
				"pending_messages_limit must be greater than 0".to_string(),
			));
		}
		if self.dispatcher_queue_capacity == 0 {
			return Err(ClientError::ConfigurationValue(
				"dispatcher_queue_capacity must be greater than 0".to_string(),
			));
		}
		subject::validate_inbox_prefix(&self.inbox_prefix).map_err(|err| {
			ClientError::ConfigurationValue(format!(
				"inbox_prefix is invalid: {err}"
			))
		})?;
		Ok(())
	}
}
