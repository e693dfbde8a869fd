//! Subscription state machine
//!
//! [`DeliveryGate`] decides, under the owning subscription's lock, whether a
//! message may still be handed to the consumer and when the subscription
//! closes. It is embedded in the mailbox for pull subscriptions and kept
//! next to the dispatcher link for handler-driven ones.

use std::fmt;

/// Lifecycle of a subscription.
///
/// Transitions are linear: `Active → Unsubscribing → Closed` or
/// `Active → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
	/// Receiving messages without a limit
	Active,
	/// Receiving messages until the auto-unsubscribe limit is reached
	Unsubscribing,
	/// Torn down; nothing is delivered any more
	Closed,
}

/// Why a subscription reached [`SubscriptionState::Closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
	/// Explicit unsubscribe
	Unsubscribed,
	/// The auto-unsubscribe limit was delivered
	LimitReached,
	/// The owning dispatcher was closed
	DispatcherClosed,
	/// The connection was closed
	ConnectionClosed,
}

impl fmt::Display for CloseReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let reason = match self {
			| CloseReason::Unsubscribed => "unsubscribed",
			| CloseReason::LimitReached => "auto-unsubscribe limit reached",
			| CloseReason::DispatcherClosed => "dispatcher closed",
			| CloseReason::ConnectionClosed => "connection closed",
		};
		f.write_str(reason)
	}
}

/// Result of admitting one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
	/// Deliver; the subscription stays open
	Deliver,
	/// Deliver; this message exhausted the limit and the gate is now closed
	Last,
}

/// What an unsubscribe request turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnsubscribeAction {
	/// Closed right away
	Close,
	/// Stays deliverable until this many messages were delivered in total
	Linger(u64),
}

#[derive(Debug)]
pub(crate) struct DeliveryGate {
	state: SubscriptionState,
	delivered: u64,
	skipped: u64,
	max: Option<u64>,
	close_reason: Option<CloseReason>,
}

impl DeliveryGate {
	pub(crate) fn new() -> Self {
		Self {
			state: SubscriptionState::Active,
			delivered: 0,
			skipped: 0,
			max: None,
			close_reason: None,
		}
	}

	pub(crate) fn state(&self) -> SubscriptionState {
		self.state
	}

	pub(crate) fn delivered(&self) -> u64 {
		self.delivered
	}

	pub(crate) fn max(&self) -> Option<u64> {
		self.max
	}

	pub(crate) fn is_closed(&self) -> bool {
		self.state == SubscriptionState::Closed
	}

	pub(crate) fn check_open(&self) -> Result<(), CloseReason> {
		match self.close_reason {
			| Some(reason) => Err(reason),
			| None => Ok(()),
		}
	}

	/// Counts one delivery. Must only be called when a message is actually
	/// handed to the consumer.
	pub(crate) fn admit(&mut self) -> Result<Admission, CloseReason> {
		self.check_open()?;
		self.delivered += 1;
		if self.limit_reached() {
			self.close(CloseReason::LimitReached);
			return Ok(Admission::Last);
		}
		Ok(Admission::Deliver)
	}

	/// Counts a message the server sent but that was dropped before
	/// reaching the consumer. The server counts it toward the limit too.
	///
	/// Returns true if this closed the gate.
	pub(crate) fn skip(&mut self) -> bool {
		if self.is_closed() {
			return false;
		}
		self.skipped += 1;
		if self.limit_reached() {
			return self.close(CloseReason::LimitReached);
		}
		false
	}

	fn received(&self) -> u64 {
		self.delivered + self.skipped
	}

	fn limit_reached(&self) -> bool {
		self.max.is_some_and(|max| self.received() >= max)
	}

	/// Applies `unsubscribe()` (`after == None`) or `unsubscribe(after)`.
	///
	/// Fails with the close reason if the gate is already closed.
	pub(crate) fn request_unsubscribe(
		&mut self,
		after: Option<u64>,
	) -> Result<UnsubscribeAction, CloseReason> {
		self.check_open()?;
		match after {
			| Some(max) if max > self.received() => {
				self.state = SubscriptionState::Unsubscribing;
				self.max = Some(max);
				Ok(UnsubscribeAction::Linger(max))
			}
			| _ => {
				self.close(CloseReason::Unsubscribed);
				Ok(UnsubscribeAction::Close)
			}
		}
	}

	/// Closes the gate. Returns false if it was already closed, in which
	/// case the first reason is kept.
	pub(crate) fn close(&mut self, reason: CloseReason) -> bool {
		if self.is_closed() {
			return false;
		}
		self.state = SubscriptionState::Closed;
		self.close_reason = Some(reason);
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_unlimited_gate_admits_everything() {
		let mut gate = DeliveryGate::new();
		for _ in 0 .. 100 {
			assert_eq!(gate.admit(), Ok(Admission::Deliver));
		}
		assert_eq!(gate.delivered(), 100);
		assert_eq!(gate.state(), SubscriptionState::Active);
	}

	#[test]
	fn test_linger_then_close_on_limit() {
		let mut gate = DeliveryGate::new();
		assert_eq!(gate.admit(), Ok(Admission::Deliver));
		assert_eq!(
			gate.request_unsubscribe(Some(3)),
			Ok(UnsubscribeAction::Linger(3))
		);
		assert_eq!(gate.state(), SubscriptionState::Unsubscribing);
		assert_eq!(gate.max(), Some(3));

		assert_eq!(gate.admit(), Ok(Admission::Deliver));
		assert_eq!(gate.admit(), Ok(Admission::Last));
		assert_eq!(gate.state(), SubscriptionState::Closed);
		assert_eq!(gate.admit(), Err(CloseReason::LimitReached));
		assert_eq!(gate.delivered(), 3);
	}

	#[test]
	fn test_limit_already_satisfied_closes_immediately() {
		let mut gate = DeliveryGate::new();
		for _ in 0 .. 5 {
			gate.admit().unwrap();
		}
		assert_eq!(
			gate.request_unsubscribe(Some(5)),
			Ok(UnsubscribeAction::Close)
		);
		assert!(gate.is_closed());
		assert_eq!(gate.check_open(), Err(CloseReason::Unsubscribed));
	}

	#[test]
	fn test_zero_limit_closes_immediately() {
		let mut gate = DeliveryGate::new();
		assert_eq!(
			gate.request_unsubscribe(Some(0)),
			Ok(UnsubscribeAction::Close)
		);
	}

	#[test]
	fn test_double_unsubscribe_is_rejected() {
		let mut gate = DeliveryGate::new();
		assert_eq!(gate.request_unsubscribe(None), Ok(UnsubscribeAction::Close));
		assert_eq!(
			gate.request_unsubscribe(None),
			Err(CloseReason::Unsubscribed)
		);
		assert_eq!(
			gate.request_unsubscribe(Some(10)),
			Err(CloseReason::Unsubscribed)
		);
	}

	#[test]
	fn test_unsubscribe_while_lingering_closes() {
		let mut gate = DeliveryGate::new();
		gate.request_unsubscribe(Some(10)).unwrap();
		assert_eq!(gate.request_unsubscribe(None), Ok(UnsubscribeAction::Close));
		assert_eq!(gate.state(), SubscriptionState::Closed);
	}

	#[test]
	fn test_lingering_limit_can_be_replaced() {
		let mut gate = DeliveryGate::new();
		gate.request_unsubscribe(Some(10)).unwrap();
		assert_eq!(
			gate.request_unsubscribe(Some(2)),
			Ok(UnsubscribeAction::Linger(2))
		);
		gate.admit().unwrap();
		assert_eq!(gate.admit(), Ok(Admission::Last));
	}

	#[test]
	fn test_dropped_messages_count_toward_limit() {
		let mut gate = DeliveryGate::new();
		assert!(!gate.skip());
		gate.request_unsubscribe(Some(3)).unwrap();
		assert_eq!(gate.admit(), Ok(Admission::Deliver));
		assert!(gate.skip());
		assert_eq!(gate.check_open(), Err(CloseReason::LimitReached));
		assert_eq!(gate.delivered(), 1);
		assert!(!gate.skip());
	}

	#[test]
	fn test_limit_below_received_closes_immediately() {
		let mut gate = DeliveryGate::new();
		gate.skip();
		gate.skip();
		assert_eq!(
			gate.request_unsubscribe(Some(2)),
			Ok(UnsubscribeAction::Close)
		);
	}

	#[test]
	fn test_first_close_reason_wins() {
		let mut gate = DeliveryGate::new();
		assert!(gate.close(CloseReason::ConnectionClosed));
		assert!(!gate.close(CloseReason::Unsubscribed));
		assert_eq!(gate.check_open(), Err(CloseReason::ConnectionClosed));
	}
}
