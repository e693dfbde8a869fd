//! Side channel for asynchronous delivery problems.

use tracing::{error, warn};

use super::error::HandlerError;
use super::registry::SubscriptionId;

/// Receives failures that have no caller to return to: handler errors and
/// panics in dispatcher workers, and messages dropped because a consumer
/// fell behind.
///
/// Both methods log through `tracing` by default, so an implementation only
/// overrides what it wants to observe.
pub trait ErrorListener: Send + Sync + 'static {
	/// A dispatcher handler returned an error or panicked. The worker keeps
	/// running.
	fn handler_failed(
		&self,
		sid: SubscriptionId,
		subject: &str,
		error: &HandlerError,
	) {
		error!(
			subscription_id = %sid,
			subject = %subject,
			error = %error,
			"Message handler failed"
		);
	}

	/// A bounded buffer overflowed. Called once per overflow episode;
	/// `dropped` is the running total for the buffer.
	fn slow_consumer(&self, sid: SubscriptionId, subject: &str, dropped: u64) {
		warn!(
			subscription_id = %sid,
			subject = %subject,
			dropped = dropped,
			"Slow consumer, dropping messages"
		);
	}
}

/// Listener that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorListener;

impl ErrorListener for TracingErrorListener {}
