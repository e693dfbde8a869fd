//! Per-subscription message buffer with cancellable blocking retrieval.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, Instant};

use super::gate::{
	Admission, CloseReason, DeliveryGate, SubscriptionState, UnsubscribeAction,
};
use crate::message::Message;

/// Outcome of [`Mailbox::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Push {
	/// Appended to the tail
	Queued,
	/// The subscription is closed; the message raced the teardown
	Discarded,
	/// The mailbox is full and the message was dropped. `first` is set on
	/// the first drop since the consumer last caught up.
	Overflow { first: bool, dropped: u64 },
}

/// A message handed to the consumer.
#[derive(Debug)]
pub(crate) struct Popped {
	pub(crate) message: Message,
	/// This delivery reached the auto-unsubscribe limit
	pub(crate) exhausted: bool,
}

#[derive(Debug)]
struct MailboxInner {
	messages: VecDeque<Message>,
	capacity: Option<usize>,
	dropped: u64,
	slow: bool,
	gate: DeliveryGate,
}

/// FIFO of pending messages owned by one subscription.
///
/// The buffer and the subscription's [`DeliveryGate`] share one lock, so a
/// pop, the delivery count and a concurrent close are always observed in a
/// single order. Waiters are woken through `ready` on every push and close.
#[derive(Debug)]
pub(crate) struct Mailbox {
	inner: Mutex<MailboxInner>,
	ready: Notify,
}

impl Mailbox {
	pub(crate) fn new(capacity: Option<usize>) -> Self {
		Self {
			inner: Mutex::new(MailboxInner {
				messages: VecDeque::new(),
				capacity,
				dropped: 0,
				slow: false,
				gate: DeliveryGate::new(),
			}),
			ready: Notify::new(),
		}
	}

	fn lock(&self) -> MutexGuard<'_, MailboxInner> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	pub(crate) fn with_gate<R>(&self, f: impl FnOnce(&DeliveryGate) -> R) -> R {
		f(&self.lock().gate)
	}

	/// Appends a message. Never blocks beyond the short buffer lock.
	pub(crate) fn push(&self, message: Message) -> Push {
		let mut inner = self.lock();
		if inner.gate.is_closed() {
			return Push::Discarded;
		}
		if let Some(capacity) = inner.capacity {
			if inner.messages.len() >= capacity {
				inner.dropped += 1;
				let first = !inner.slow;
				inner.slow = true;
				let overflow = Push::Overflow {
					first,
					dropped: inner.dropped,
				};
				if inner.gate.skip() {
					inner.messages.clear();
					drop(inner);
					self.ready.notify_waiters();
				}
				return overflow;
			}
		}
		inner.messages.push_back(message);
		drop(inner);
		self.ready.notify_waiters();
		Push::Queued
	}

	/// Takes the head message if one is buffered, without waiting.
	pub(crate) fn try_pop(&self) -> Result<Option<Popped>, CloseReason> {
		let mut inner = self.lock();
		inner.gate.check_open()?;
		let Some(message) = inner.messages.pop_front() else {
			inner.slow = false;
			return Ok(None);
		};
		let exhausted = inner.gate.admit()? == Admission::Last;
		if exhausted {
			// surplus beyond the limit is never delivered
			inner.messages.clear();
		}
		drop(inner);
		if exhausted {
			self.ready.notify_waiters();
		}
		Ok(Some(Popped { message, exhausted }))
	}

	/// Waits for the next message.
	///
	/// * `Ok(Some(_))` – a message, counted as delivered
	/// * `Ok(None)` – `timeout` elapsed; `Some(Duration::ZERO)` never waits
	/// * `Err(reason)` – the subscription is closed, or closed while waiting
	///
	/// `None` as timeout waits until a message arrives or the subscription
	/// closes.
	pub(crate) async fn pop(
		&self,
		timeout: Option<Duration>,
	) -> Result<Option<Popped>, CloseReason> {
		if timeout == Some(Duration::ZERO) {
			return self.try_pop();
		}
		// a deadline past the clock's range waits without one
		let deadline =
			timeout.and_then(|timeout| Instant::now().checked_add(timeout));

		loop {
			// Registered before the state check so a push or close that
			// lands in between still wakes this waiter.
			let notified = self.ready.notified();
			if let Some(popped) = self.try_pop()? {
				return Ok(Some(popped));
			}
			match deadline {
				| Some(deadline) => {
					if time::timeout_at(deadline, notified).await.is_err() {
						return self.try_pop();
					}
				}
				| None => notified.await,
			}
		}
	}

	pub(crate) fn request_unsubscribe(
		&self,
		after: Option<u64>,
	) -> Result<UnsubscribeAction, CloseReason> {
		let mut inner = self.lock();
		let action = inner.gate.request_unsubscribe(after)?;
		if action == UnsubscribeAction::Close {
			inner.messages.clear();
			drop(inner);
			self.ready.notify_waiters();
		}
		Ok(action)
	}

	/// Closes the subscription, drops buffered messages and wakes every
	/// waiter. Returns false if it was already closed.
	pub(crate) fn close(&self, reason: CloseReason) -> bool {
		let mut inner = self.lock();
		let changed = inner.gate.close(reason);
		inner.messages.clear();
		drop(inner);
		self.ready.notify_waiters();
		changed
	}

	pub(crate) fn state(&self) -> SubscriptionState {
		self.with_gate(DeliveryGate::state)
	}

	pub(crate) fn pending(&self) -> usize {
		self.lock().messages.len()
	}

	pub(crate) fn dropped(&self) -> u64 {
		self.lock().dropped
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::message::MessageFrame;
	use crate::routing::SubscriptionId;

	fn message(n: u8) -> Message {
		Message::from_frame(
			SubscriptionId::new(1),
			MessageFrame::new("subject", vec![n]),
		)
	}

	fn payload(popped: Option<Popped>) -> u8 {
		popped.expect("expected a message").message.payload()[0]
	}

	#[tokio::test]
	async fn test_fifo_order() {
		let mailbox = Mailbox::new(None);
		for n in 0 .. 5 {
			assert_eq!(mailbox.push(message(n)), Push::Queued);
		}
		for n in 0 .. 5 {
			assert_eq!(payload(mailbox.pop(None).await.unwrap()), n);
		}
		assert_eq!(mailbox.with_gate(DeliveryGate::delivered), 5);
	}

	#[tokio::test]
	async fn test_timeout_returns_none() {
		let mailbox = Mailbox::new(None);
		let started = std::time::Instant::now();
		let popped = mailbox.pop(Some(Duration::from_millis(50))).await;
		assert!(matches!(popped, Ok(None)));
		assert!(started.elapsed() >= Duration::from_millis(45));
	}

	#[tokio::test]
	async fn test_zero_timeout_does_not_wait() {
		let mailbox = Mailbox::new(None);
		assert!(matches!(mailbox.pop(Some(Duration::ZERO)).await, Ok(None)));
		mailbox.push(message(9));
		assert_eq!(payload(mailbox.pop(Some(Duration::ZERO)).await.unwrap()), 9);
	}

	#[tokio::test]
	async fn test_push_wakes_blocked_pop() {
		let mailbox = Arc::new(Mailbox::new(None));
		let waiter = {
			let mailbox = Arc::clone(&mailbox);
			tokio::spawn(async move { mailbox.pop(None).await })
		};
		tokio::time::sleep(Duration::from_millis(20)).await;
		mailbox.push(message(1));
		let popped = waiter.await.unwrap().unwrap();
		assert_eq!(payload(popped), 1);
	}

	#[tokio::test]
	async fn test_close_wakes_blocked_pop() {
		let mailbox = Arc::new(Mailbox::new(None));
		let waiter = {
			let mailbox = Arc::clone(&mailbox);
			tokio::spawn(async move { mailbox.pop(None).await })
		};
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert!(mailbox.close(CloseReason::Unsubscribed));
		let result = waiter.await.unwrap();
		assert!(matches!(result, Err(CloseReason::Unsubscribed)));
	}

	#[tokio::test]
	async fn test_huge_timeout_waits_until_close() {
		let mailbox = Arc::new(Mailbox::new(None));
		let waiter = {
			let mailbox = Arc::clone(&mailbox);
			tokio::spawn(async move { mailbox.pop(Some(Duration::MAX)).await })
		};
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert_eq!(
			mailbox.request_unsubscribe(None),
			Ok(UnsubscribeAction::Close)
		);
		let result = waiter.await.unwrap();
		assert!(matches!(result, Err(CloseReason::Unsubscribed)));
	}

	#[tokio::test]
	async fn test_overflow_counts_toward_limit() {
		let mailbox = Mailbox::new(Some(1));
		mailbox.request_unsubscribe(Some(3)).unwrap();
		assert_eq!(mailbox.push(message(1)), Push::Queued);
		assert!(matches!(mailbox.push(message(2)), Push::Overflow { .. }));
		assert!(matches!(mailbox.push(message(3)), Push::Overflow { .. }));

		// the server sent its last message, so the buffered one is the end
		let last = mailbox.pop(None).await.unwrap().unwrap();
		assert!(last.exhausted);
		assert_eq!(payload(Some(last)), 1);
		assert_eq!(mailbox.state(), SubscriptionState::Closed);
	}

	#[tokio::test]
	async fn test_push_after_close_is_discarded() {
		let mailbox = Mailbox::new(None);
		mailbox.close(CloseReason::Unsubscribed);
		assert_eq!(mailbox.push(message(1)), Push::Discarded);
		assert_eq!(mailbox.pending(), 0);
	}

	#[tokio::test]
	async fn test_limit_discards_surplus() {
		let mailbox = Mailbox::new(None);
		for n in 0 .. 5 {
			mailbox.push(message(n));
		}
		assert_eq!(
			mailbox.request_unsubscribe(Some(2)),
			Ok(UnsubscribeAction::Linger(2))
		);
		let first = mailbox.pop(None).await.unwrap().unwrap();
		assert!(!first.exhausted);
		let second = mailbox.pop(None).await.unwrap().unwrap();
		assert!(second.exhausted);

		assert_eq!(mailbox.pending(), 0);
		assert!(matches!(
			mailbox.pop(Some(Duration::from_millis(10))).await,
			Err(CloseReason::LimitReached)
		));
	}

	#[tokio::test]
	async fn test_bounded_mailbox_reports_first_overflow_once() {
		let mailbox = Mailbox::new(Some(2));
		assert_eq!(mailbox.push(message(1)), Push::Queued);
		assert_eq!(mailbox.push(message(2)), Push::Queued);
		assert_eq!(
			mailbox.push(message(3)),
			Push::Overflow {
				first: true,
				dropped: 1
			}
		);
		assert_eq!(
			mailbox.push(message(4)),
			Push::Overflow {
				first: false,
				dropped: 2
			}
		);

		// draining completely resets the slow-consumer flag
		mailbox.try_pop().unwrap();
		mailbox.try_pop().unwrap();
		assert!(mailbox.try_pop().unwrap().is_none());
		mailbox.push(message(5));
		mailbox.push(message(6));
		assert_eq!(
			mailbox.push(message(7)),
			Push::Overflow {
				first: true,
				dropped: 3
			}
		);
		assert_eq!(mailbox.dropped(), 3);
	}
}
