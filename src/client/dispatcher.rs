use std::sync::Arc;
use std::time::Duration;

use arcstr::ArcStr;
use tokio::time;
use tracing::warn;

use super::error::ClientError;
use super::inner::ClientInner;
use super::subscription::Subscription;
use crate::message::Message;
use crate::routing::{
	BoxError, DispatcherId, DispatcherShared, MessageHandler,
	SubscriptionError,
};

/// Handle to a dispatcher: a single worker calling handlers for all
/// of its subscriptions, one message at a time, in arrival order.
///
/// Subscriptions created without their own handler use the dispatcher's
/// default handler. Clones refer to the same dispatcher.
#[derive(Clone)]
pub struct Dispatcher {
	shared: Arc<DispatcherShared>,
	inner: Arc<ClientInner>,
}

impl Dispatcher {
	pub(crate) fn new(
		shared: Arc<DispatcherShared>,
		inner: Arc<ClientInner>,
	) -> Self {
		Self { shared, inner }
	}

	/// Identifier of this dispatcher.
	pub fn id(&self) -> DispatcherId {
		self.shared.id()
	}

	/// False once the dispatcher or its connection was closed.
	pub fn is_active(&self) -> bool {
		!self.shared.is_closed() && !self.inner.is_closed()
	}

	/// Number of live subscriptions.
	pub fn subscription_count(&self) -> usize {
		self.shared.subscription_count()
	}

	/// Subscribes with the default handler.
	///
	/// Fails with an invalid-state error if the dispatcher was created
	/// without one.
	pub fn subscribe(
		&self,
		subject: impl Into<ArcStr>,
	) -> Result<Subscription, ClientError> {
		self.add(subject.into(), None, None)
	}

	/// Subscribes with a handler used only for this subscription.
	pub fn subscribe_with_handler<H>(
		&self,
		subject: impl Into<ArcStr>,
		handler: H,
	) -> Result<Subscription, ClientError>
	where
		H: Fn(Message) -> Result<(), BoxError> + Send + Sync + 'static,
	{
		self.add(subject.into(), None, Some(Arc::new(handler)))
	}

	/// Joins `queue_group` on `subject` with the default handler.
	pub fn queue_subscribe(
		&self,
		subject: impl Into<ArcStr>,
		queue_group: impl Into<ArcStr>,
	) -> Result<Subscription, ClientError> {
		self.add(subject.into(), Some(queue_group.into()), None)
	}

	/// Joins `queue_group` on `subject` with its own handler.
	pub fn queue_subscribe_with_handler<H>(
		&self,
		subject: impl Into<ArcStr>,
		queue_group: impl Into<ArcStr>,
		handler: H,
	) -> Result<Subscription, ClientError>
	where
		H: Fn(Message) -> Result<(), BoxError> + Send + Sync + 'static,
	{
		self.add(
			subject.into(),
			Some(queue_group.into()),
			Some(Arc::new(handler)),
		)
	}

	fn add(
		&self,
		subject: ArcStr,
		queue_group: Option<ArcStr>,
		handler: Option<MessageHandler>,
	) -> Result<Subscription, ClientError> {
		let entry = self.inner.subscribe_dispatcher(
			&self.shared,
			subject,
			queue_group,
			handler,
		)?;
		Ok(Subscription::new(entry, Arc::clone(&self.inner)))
	}

	/// Unsubscribes every subscription of this dispatcher on exactly
	/// `subject`. Does nothing if there is none.
	pub fn unsubscribe(&self, subject: &str) -> Result<(), ClientError> {
		self.unsubscribe_matching(subject, None)
	}

	/// Sets the auto-unsubscribe limit of every subscription of this
	/// dispatcher on exactly `subject`.
	pub fn unsubscribe_after(
		&self,
		subject: &str,
		max_messages: u64,
	) -> Result<(), ClientError> {
		self.unsubscribe_matching(subject, Some(max_messages))
	}

	fn unsubscribe_matching(
		&self,
		subject: &str,
		after: Option<u64>,
	) -> Result<(), ClientError> {
		ClientInner::validate(subject, None)?;
		self.inner.ensure_open()?;
		if self.shared.is_closed() {
			return Err(SubscriptionError::DispatcherClosed(self.id()).into());
		}
		let mut result = Ok(());
		for entry in self.shared.entries_for(subject) {
			match self.inner.unsubscribe(&entry, after) {
				| Ok(()) => {}
				// lost a race with another unsubscribe or the limit
				| Err(ClientError::InvalidState(
					SubscriptionError::Closed { .. },
				)) => {}
				| Err(err) => result = Err(err),
			}
		}
		result
	}

	pub(crate) fn close(&self) -> Result<(), ClientError> {
		self.inner.close_dispatcher(&self.shared)
	}

	/// Closes the dispatcher, unsubscribes its subscriptions and waits for
	/// the worker to finish the handler it is running.
	pub async fn shutdown(self) -> Result<(), ClientError> {
		let worker = self.shared.take_worker();
		let closed = self.inner.close_dispatcher(&self.shared);
		let Some(worker) = worker else {
			return closed;
		};
		let timeout =
			Duration::from_millis(self.inner.settings().shutdown_timeout_millis);
		match time::timeout(timeout, worker).await {
			| Ok(joined) => {
				joined?;
				closed
			}
			| Err(_) => {
				warn!(
					dispatcher_id = %self.id(),
					timeout = ?timeout,
					"Dispatcher worker did not stop in time"
				);
				closed
			}
		}
	}
}

impl std::fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dispatcher")
			.field("id", &self.id())
			.field("active", &self.is_active())
			.finish()
	}
}
