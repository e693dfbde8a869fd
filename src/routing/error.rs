use std::any::Any;

use thiserror::Error;

use super::dispatcher::DispatcherId;
use super::gate::CloseReason;
use super::registry::SubscriptionId;

/// Boxed error returned by message handlers
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Invalid-state errors raised by subscription and dispatcher operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
	/// The owning connection has been closed
	#[error("Connection is closed")]
	ConnectionClosed,

	/// The subscription was unsubscribed, reached its auto-unsubscribe
	/// limit, or was closed with its dispatcher
	#[error("Subscription {sid} is closed ({reason})")]
	Closed {
		/// Subscription id
		sid: SubscriptionId,
		/// Why the subscription was closed
		reason: CloseReason,
	},

	/// Messages of dispatcher-owned subscriptions go to handlers, they
	/// cannot be pulled
	#[error("Subscription {sid} is owned by dispatcher {dispatcher}")]
	DispatcherOwned {
		/// Subscription id
		sid: SubscriptionId,
		/// Owning dispatcher
		dispatcher: DispatcherId,
	},

	/// Subscribe without handler on a dispatcher created without a default
	#[error("Dispatcher {0} has no default handler")]
	NoDefaultHandler(DispatcherId),

	/// The dispatcher has been closed
	#[error("Dispatcher {0} is closed")]
	DispatcherClosed(DispatcherId),
}

impl SubscriptionError {
	/// Creates the error returned by operations on a closed subscription.
	///
	/// A subscription closed by connection teardown reports the connection
	/// as the cause.
	pub fn closed(sid: SubscriptionId, reason: CloseReason) -> Self {
		match reason {
			| CloseReason::ConnectionClosed => Self::ConnectionClosed,
			| reason => Self::Closed { sid, reason },
		}
	}

	/// Returns the error type for categorization
	pub fn error_type(&self) -> &'static str {
		match self {
			| SubscriptionError::ConnectionClosed => "connection_closed",
			| SubscriptionError::Closed { .. } => "subscription_closed",
			| SubscriptionError::DispatcherOwned { .. } => "dispatcher_owned",
			| SubscriptionError::NoDefaultHandler(_) => "no_default_handler",
			| SubscriptionError::DispatcherClosed(_) => "dispatcher_closed",
		}
	}
}

/// Failure of a dispatcher message handler
#[derive(Debug, Error)]
pub enum HandlerError {
	/// The handler returned an error
	#[error("Handler returned an error: {0}")]
	Failed(#[source] BoxError),

	/// The handler panicked
	#[error("Handler panicked: {0}")]
	Panicked(String),
}

impl HandlerError {
	pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
		let message = payload
			.downcast_ref::<&str>()
			.map(|s| s.to_string())
			.or_else(|| payload.downcast_ref::<String>().cloned())
			.unwrap_or_else(|| "non-string panic payload".to_string());
		Self::Panicked(message)
	}
}
