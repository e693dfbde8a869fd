use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use arcstr::ArcStr;

use super::dispatcher::{DispatcherId, DispatcherShared};
use super::gate::{
	Admission, CloseReason, DeliveryGate, SubscriptionState,
	UnsubscribeAction,
};
use super::mailbox::Mailbox;
use super::registry::SubscriptionId;

/// Where messages of a subscription go. Fixed at creation.
#[derive(Debug)]
pub(crate) enum Sink {
	/// Pull subscription: messages wait in the mailbox
	Mailbox(Mailbox),
	/// Handler subscription: messages go to the dispatcher's queue
	Dispatcher {
		id: DispatcherId,
		gate: Mutex<DeliveryGate>,
		dispatcher: Weak<DispatcherShared>,
	},
}

/// Shared state of one subscription, owned by the registry while live.
#[derive(Debug)]
pub(crate) struct SubscriptionEntry {
	sid: SubscriptionId,
	subject: ArcStr,
	queue_group: Option<ArcStr>,
	sink: Sink,
}

fn lock_gate(gate: &Mutex<DeliveryGate>) -> MutexGuard<'_, DeliveryGate> {
	gate.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SubscriptionEntry {
	pub(crate) fn with_mailbox(
		sid: SubscriptionId,
		subject: ArcStr,
		queue_group: Option<ArcStr>,
		capacity: Option<usize>,
	) -> Self {
		Self {
			sid,
			subject,
			queue_group,
			sink: Sink::Mailbox(Mailbox::new(capacity)),
		}
	}

	pub(crate) fn with_dispatcher(
		sid: SubscriptionId,
		subject: ArcStr,
		queue_group: Option<ArcStr>,
		dispatcher: &Arc<DispatcherShared>,
	) -> Self {
		Self {
			sid,
			subject,
			queue_group,
			sink: Sink::Dispatcher {
				id: dispatcher.id(),
				gate: Mutex::new(DeliveryGate::new()),
				dispatcher: Arc::downgrade(dispatcher),
			},
		}
	}

	pub(crate) fn sid(&self) -> SubscriptionId {
		self.sid
	}

	pub(crate) fn subject(&self) -> &ArcStr {
		&self.subject
	}

	pub(crate) fn queue_group(&self) -> Option<&ArcStr> {
		self.queue_group.as_ref()
	}

	pub(crate) fn sink(&self) -> &Sink {
		&self.sink
	}

	pub(crate) fn mailbox(&self) -> Option<&Mailbox> {
		match &self.sink {
			| Sink::Mailbox(mailbox) => Some(mailbox),
			| Sink::Dispatcher { .. } => None,
		}
	}

	pub(crate) fn dispatcher_id(&self) -> Option<DispatcherId> {
		match &self.sink {
			| Sink::Mailbox(_) => None,
			| Sink::Dispatcher { id, .. } => Some(*id),
		}
	}

	pub(crate) fn dispatcher(&self) -> Option<Arc<DispatcherShared>> {
		match &self.sink {
			| Sink::Mailbox(_) => None,
			| Sink::Dispatcher { dispatcher, .. } => dispatcher.upgrade(),
		}
	}

	/// Reads the delivery gate under the subscription's lock.
	pub(crate) fn read_gate<R>(&self, f: impl FnOnce(&DeliveryGate) -> R) -> R {
		match &self.sink {
			| Sink::Mailbox(mailbox) => mailbox.with_gate(f),
			| Sink::Dispatcher { gate, .. } => f(&lock_gate(gate)),
		}
	}

	/// Counts one handler delivery. Mailbox subscriptions count on pop.
	pub(crate) fn admit(&self) -> Result<Admission, CloseReason> {
		match &self.sink {
			| Sink::Mailbox(_) => Ok(Admission::Deliver),
			| Sink::Dispatcher { gate, .. } => lock_gate(gate).admit(),
		}
	}

	/// Counts a handler message dropped on a full dispatcher queue. Returns
	/// true if that exhausted the limit. Mailboxes count their own drops.
	pub(crate) fn skip(&self) -> bool {
		match &self.sink {
			| Sink::Mailbox(_) => false,
			| Sink::Dispatcher { gate, .. } => lock_gate(gate).skip(),
		}
	}

	pub(crate) fn state(&self) -> SubscriptionState {
		match &self.sink {
			| Sink::Mailbox(mailbox) => mailbox.state(),
			| Sink::Dispatcher { gate, .. } => lock_gate(gate).state(),
		}
	}

	pub(crate) fn delivered(&self) -> u64 {
		self.read_gate(DeliveryGate::delivered)
	}

	pub(crate) fn max(&self) -> Option<u64> {
		self.read_gate(DeliveryGate::max)
	}

	pub(crate) fn request_unsubscribe(
		&self,
		after: Option<u64>,
	) -> Result<UnsubscribeAction, CloseReason> {
		match &self.sink {
			| Sink::Mailbox(mailbox) => mailbox.request_unsubscribe(after),
			| Sink::Dispatcher { gate, .. } => {
				lock_gate(gate).request_unsubscribe(after)
			}
		}
	}

	/// Force-closes the subscription and wakes any waiter.
	pub(crate) fn close(&self, reason: CloseReason) -> bool {
		match &self.sink {
			| Sink::Mailbox(mailbox) => mailbox.close(reason),
			| Sink::Dispatcher { gate, .. } => lock_gate(gate).close(reason),
		}
	}
}
