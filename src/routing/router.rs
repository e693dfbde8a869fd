use std::sync::Arc;

use tracing::{debug, trace};

use super::entry::{Sink, SubscriptionEntry};
use super::gate::{CloseReason, SubscriptionState};
use super::listener::ErrorListener;
use super::mailbox::Push;
use super::registry::{SubscriptionId, SubscriptionRegistry};
use crate::message::{Message, MessageFrame};

/// What happened to one routed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
	/// Buffered for the subscription's consumer or dispatcher
	Queued,
	/// Unknown sid or closed subscription; dropped silently
	Dropped,
	/// The target buffer was full and the message was dropped
	SlowConsumer,
}

/// Entry point of the connection's read path.
///
/// Maps the sid of every parsed inbound frame to its live subscription and
/// hands the message over without blocking. Cloning is cheap and every
/// clone routes into the same registry.
#[derive(Clone)]
pub struct DeliveryRouter {
	registry: Arc<SubscriptionRegistry>,
	listener: Arc<dyn ErrorListener>,
}

impl DeliveryRouter {
	pub(crate) fn new(
		registry: Arc<SubscriptionRegistry>,
		listener: Arc<dyn ErrorListener>,
	) -> Self {
		Self { registry, listener }
	}

	/// Delivers `frame` to subscription `sid`.
	///
	/// Frames for sids that are no longer registered are expected while an
	/// UNSUB is in flight and are dropped.
	pub fn route(&self, sid: SubscriptionId, frame: MessageFrame) -> RouteOutcome {
		let Some(entry) = self.registry.get(sid) else {
			debug!(
				subscription_id = %sid,
				subject = %frame.subject,
				"Dropping message for unknown subscription"
			);
			return RouteOutcome::Dropped;
		};
		let message = Message::from_frame(sid, frame);
		match Self::push(&entry, message) {
			| Push::Queued => RouteOutcome::Queued,
			| Push::Discarded => {
				trace!(
					subscription_id = %sid,
					"Dropping message for closed subscription"
				);
				RouteOutcome::Dropped
			}
			| Push::Overflow { first, dropped } => {
				if first {
					self.listener.slow_consumer(sid, entry.subject(), dropped);
				}
				if entry.read_gate(|gate| gate.check_open())
					== Err(CloseReason::LimitReached)
				{
					self.retire(&entry);
				}
				RouteOutcome::SlowConsumer
			}
		}
	}

	fn push(entry: &SubscriptionEntry, message: Message) -> Push {
		match entry.sink() {
			| Sink::Mailbox(mailbox) => mailbox.push(message),
			| Sink::Dispatcher { dispatcher, .. } => {
				if entry.state() == SubscriptionState::Closed {
					return Push::Discarded;
				}
				match dispatcher.upgrade() {
					| Some(dispatcher) => {
						let push = dispatcher.enqueue(entry.sid(), message);
						if matches!(push, Push::Overflow { .. }) {
							entry.skip();
						}
						push
					}
					| None => Push::Discarded,
				}
			}
		}
	}
}

impl DeliveryRouter {
	/// Drops a subscription whose limit was used up by dropped messages.
	/// The server counted the same limit, so no UNSUB is needed.
	fn retire(&self, entry: &SubscriptionEntry) {
		self.registry.remove(entry.sid());
		if let Some(dispatcher) = entry.dispatcher() {
			dispatcher.deregister(entry.sid());
		}
		debug!(
			subscription_id = %entry.sid(),
			subject = %entry.subject(),
			"Auto-unsubscribe limit reached with dropped messages"
		);
	}
}

impl std::fmt::Debug for DeliveryRouter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DeliveryRouter")
			.field("subscriptions", &self.registry.len())
			.finish_non_exhaustive()
	}
}
