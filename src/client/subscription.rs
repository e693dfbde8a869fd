use std::sync::Arc;
use std::time::Duration;

use arcstr::ArcStr;

use super::error::ClientError;
use super::inner::ClientInner;
use crate::message::Message;
use crate::routing::{
	CloseReason, DispatcherId, Mailbox, Popped, Sink, SubscriptionEntry,
	SubscriptionError, SubscriptionId, SubscriptionState,
};

/// Handle to one subscription.
///
/// Clones refer to the same subscription. Dropping a handle does not
/// unsubscribe: the connection keeps the subscription alive until
/// [`unsubscribe`](Self::unsubscribe), the auto-unsubscribe limit, or
/// connection close.
#[derive(Clone)]
pub struct Subscription {
	entry: Arc<SubscriptionEntry>,
	inner: Arc<ClientInner>,
}

impl Subscription {
	pub(crate) fn new(
		entry: Arc<SubscriptionEntry>,
		inner: Arc<ClientInner>,
	) -> Self {
		Self { entry, inner }
	}

	/// Protocol-level subscription id.
	pub fn sid(&self) -> SubscriptionId {
		self.entry.sid()
	}

	/// Subject or subject pattern subscribed to.
	pub fn subject(&self) -> &ArcStr {
		self.entry.subject()
	}

	/// Queue group, if this subscription is a group member.
	pub fn queue_group(&self) -> Option<&ArcStr> {
		self.entry.queue_group()
	}

	/// Dispatcher delivering this subscription's messages, if any.
	pub fn dispatcher_id(&self) -> Option<DispatcherId> {
		self.entry.dispatcher_id()
	}

	/// Current lifecycle state.
	pub fn state(&self) -> SubscriptionState {
		self.entry.state()
	}

	/// True while the subscription is `Active` or `Unsubscribing`.
	pub fn is_active(&self) -> bool {
		self.state() != SubscriptionState::Closed
	}

	/// Messages handed to the consumer so far.
	pub fn delivered_count(&self) -> u64 {
		self.entry.delivered()
	}

	/// Auto-unsubscribe limit, if one was requested.
	pub fn max_messages(&self) -> Option<u64> {
		self.entry.max()
	}

	/// Messages buffered and not yet retrieved. Always 0 for dispatcher
	/// subscriptions.
	pub fn pending_count(&self) -> usize {
		self.entry.mailbox().map_or(0, |mailbox| mailbox.pending())
	}

	/// Messages dropped because the consumer fell behind. For dispatcher
	/// subscriptions this is the dispatcher-wide count.
	pub fn dropped_count(&self) -> u64 {
		match self.entry.mailbox() {
			| Some(mailbox) => mailbox.dropped(),
			| None => self
				.entry
				.dispatcher()
				.map_or(0, |dispatcher| dispatcher.dropped()),
		}
	}

	/// Waits for the next message.
	///
	/// * `Ok(Some(message))` – the next message in arrival order
	/// * `Ok(None)` – `timeout` elapsed without a message
	/// * `Err(_)` – invalid state: the subscription is closed, closes while
	///   waiting, or is owned by a dispatcher
	///
	/// `Some(Duration::ZERO)` never waits; `None` waits without a time
	/// limit.
	pub async fn next_message(
		&self,
		timeout: Option<Duration>,
	) -> Result<Option<Message>, ClientError> {
		let popped = self.mailbox()?.pop(timeout).await;
		self.accept(popped)
	}

	/// Returns a buffered message without waiting.
	pub fn try_next_message(&self) -> Result<Option<Message>, ClientError> {
		let popped = self.mailbox()?.try_pop();
		self.accept(popped)
	}

	/// Closes the subscription now. Buffered messages are discarded and
	/// blocked [`next_message`](Self::next_message) calls fail.
	///
	/// Fails with an invalid-state error if the subscription is already
	/// closed.
	pub fn unsubscribe(&self) -> Result<(), ClientError> {
		self.inner.unsubscribe(&self.entry, None)
	}

	/// Closes the subscription once `max_messages` messages were delivered
	/// in total. Closes immediately if that many were delivered already.
	pub fn unsubscribe_after(&self, max_messages: u64) -> Result<(), ClientError> {
		self.inner.unsubscribe(&self.entry, Some(max_messages))
	}

	fn mailbox(&self) -> Result<&Mailbox, ClientError> {
		match self.entry.sink() {
			| Sink::Mailbox(mailbox) => Ok(mailbox),
			| Sink::Dispatcher { id, .. } => {
				Err(SubscriptionError::DispatcherOwned {
					sid: self.sid(),
					dispatcher: *id,
				}
				.into())
			}
		}
	}

	fn accept(
		&self,
		popped: Result<Option<Popped>, CloseReason>,
	) -> Result<Option<Message>, ClientError> {
		match popped {
			| Ok(Some(popped)) => {
				if popped.exhausted {
					self.inner.detach(&self.entry);
				}
				Ok(Some(popped.message))
			}
			| Ok(None) => Ok(None),
			| Err(reason) => {
				Err(SubscriptionError::closed(self.sid(), reason).into())
			}
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("sid", &self.sid())
			.field("subject", self.subject())
			.field("queue_group", &self.queue_group())
			.field("state", &self.state())
			.finish()
	}
}
