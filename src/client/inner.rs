//! Connection-wide subscription state shared by every client handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arcstr::ArcStr;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::ClientSettings;
use super::error::ClientError;
use crate::protocol::ProtocolWriter;
use crate::routing::{
	CloseReason, DeliveryRouter, DispatcherId, DispatcherShared,
	ErrorListener, MessageHandler, SubscriptionEntry, SubscriptionError,
	SubscriptionRegistry, UnsubscribeAction,
};
use crate::subject;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct ClientInner {
	registry: Arc<SubscriptionRegistry>,
	writer: Arc<dyn ProtocolWriter>,
	listener: Arc<dyn ErrorListener>,
	settings: ClientSettings,
	closed: AtomicBool,
	dispatchers: Mutex<HashMap<DispatcherId, Arc<DispatcherShared>>>,
	next_dispatcher_id: AtomicU64,
	workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ClientInner {
	pub(crate) fn new(
		writer: Arc<dyn ProtocolWriter>,
		settings: ClientSettings,
		listener: Arc<dyn ErrorListener>,
	) -> Self {
		Self {
			registry: Arc::new(SubscriptionRegistry::new()),
			writer,
			listener,
			settings,
			closed: AtomicBool::new(false),
			dispatchers: Mutex::new(HashMap::new()),
			next_dispatcher_id: AtomicU64::new(1),
			workers: Mutex::new(Vec::new()),
		}
	}

	pub(crate) fn router(&self) -> DeliveryRouter {
		DeliveryRouter::new(
			Arc::clone(&self.registry),
			Arc::clone(&self.listener),
		)
	}

	pub(crate) fn settings(&self) -> &ClientSettings {
		&self.settings
	}

	pub(crate) fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	pub(crate) fn ensure_open(&self) -> Result<(), SubscriptionError> {
		if self.is_closed() {
			return Err(SubscriptionError::ConnectionClosed);
		}
		Ok(())
	}

	pub(crate) fn create_inbox(&self) -> ArcStr {
		subject::new_inbox(&self.settings.inbox_prefix)
	}

	/// Validates a subject and an optional queue group, in that order.
	pub(crate) fn validate(
		subject: &str,
		queue_group: Option<&str>,
	) -> Result<(), ClientError> {
		subject::validate_subject(subject)?;
		if let Some(queue_group) = queue_group {
			subject::validate_queue_group(queue_group)?;
		}
		Ok(())
	}

	/// Creates a pull subscription and registers it with the server.
	pub(crate) fn subscribe_mailbox(
		&self,
		subject: ArcStr,
		queue_group: Option<ArcStr>,
	) -> Result<Arc<SubscriptionEntry>, ClientError> {
		Self::validate(&subject, queue_group.as_deref())?;
		self.ensure_open()?;
		let entry = Arc::new(SubscriptionEntry::with_mailbox(
			self.registry.next_sid(),
			subject,
			queue_group,
			self.settings.pending_messages_limit,
		));
		self.register(&entry)?;
		Ok(entry)
	}

	/// Creates a handler subscription owned by `dispatcher`.
	pub(crate) fn subscribe_dispatcher(
		&self,
		dispatcher: &Arc<DispatcherShared>,
		subject: ArcStr,
		queue_group: Option<ArcStr>,
		handler: Option<MessageHandler>,
	) -> Result<Arc<SubscriptionEntry>, ClientError> {
		Self::validate(&subject, queue_group.as_deref())?;
		self.ensure_open()?;
		if handler.is_none() && !dispatcher.has_default_handler() {
			return Err(SubscriptionError::NoDefaultHandler(dispatcher.id()).into());
		}
		let entry = Arc::new(SubscriptionEntry::with_dispatcher(
			self.registry.next_sid(),
			subject,
			queue_group,
			dispatcher,
		));
		if !dispatcher.register(Arc::clone(&entry), handler) {
			return Err(SubscriptionError::DispatcherClosed(dispatcher.id()).into());
		}
		if let Err(err) = self.register(&entry) {
			dispatcher.deregister(entry.sid());
			return Err(err);
		}
		Ok(entry)
	}

	/// Inserts into the registry, then sends SUB. Rolled back if either the
	/// connection closed meanwhile or the frame could not be written.
	fn register(&self, entry: &Arc<SubscriptionEntry>) -> Result<(), ClientError> {
		let sid = entry.sid();
		self.registry.insert(Arc::clone(entry));
		if self.is_closed() {
			// close() may have drained the registry before the insert
			self.registry.remove(sid);
			entry.close(CloseReason::ConnectionClosed);
			return Err(SubscriptionError::ConnectionClosed.into());
		}
		let queue_group = entry.queue_group().map(ArcStr::as_str);
		if let Err(err) =
			self.writer.send_subscribe(sid, entry.subject(), queue_group)
		{
			warn!(subscription_id = %sid, subject = %entry.subject(), error = %err, "Failed to send SUB");
			self.registry.remove(sid);
			entry.close(CloseReason::ConnectionClosed);
			return Err(err.into());
		}
		debug!(
			subscription_id = %sid,
			subject = %entry.subject(),
			queue_group = ?queue_group,
			"Subscribed"
		);
		Ok(())
	}

	/// Applies `unsubscribe()` / `unsubscribe(after)` to one subscription.
	pub(crate) fn unsubscribe(
		&self,
		entry: &SubscriptionEntry,
		after: Option<u64>,
	) -> Result<(), ClientError> {
		let sid = entry.sid();
		self.ensure_open()?;
		let action = entry
			.request_unsubscribe(after)
			.map_err(|reason| SubscriptionError::closed(sid, reason))?;
		let max_messages = match action {
			| UnsubscribeAction::Close => {
				self.detach(entry);
				None
			}
			| UnsubscribeAction::Linger(max) => Some(max),
		};
		debug!(
			subscription_id = %sid,
			subject = %entry.subject(),
			max_messages = ?max_messages,
			"Unsubscribing"
		);
		self.writer.send_unsubscribe(sid, max_messages).map_err(|err| {
			warn!(subscription_id = %sid, error = %err, "Failed to send UNSUB");
			ClientError::from(err)
		})
	}

	/// Removes a subscription that is closed from every lookup table.
	pub(crate) fn detach(&self, entry: &SubscriptionEntry) {
		self.registry.remove(entry.sid());
		if let Some(dispatcher) = entry.dispatcher() {
			dispatcher.deregister(entry.sid());
		}
	}

	pub(crate) fn create_dispatcher(
		&self,
		default_handler: Option<MessageHandler>,
	) -> Result<Arc<DispatcherShared>, ClientError> {
		self.ensure_open()?;
		let runtime = Handle::try_current()?;
		let id = DispatcherId::new(
			self.next_dispatcher_id.fetch_add(1, Ordering::Relaxed),
		);
		let dispatcher = DispatcherShared::spawn(
			&runtime,
			id,
			default_handler,
			self.settings.dispatcher_queue_capacity,
			Arc::clone(&self.registry),
			Arc::clone(&self.listener),
		);
		lock(&self.dispatchers).insert(id, Arc::clone(&dispatcher));
		if self.is_closed() {
			self.retire_dispatcher(&dispatcher, CloseReason::ConnectionClosed);
			return Err(SubscriptionError::ConnectionClosed.into());
		}
		Ok(dispatcher)
	}

	/// Closes a dispatcher and sends UNSUB for each of its subscriptions.
	pub(crate) fn close_dispatcher(
		&self,
		dispatcher: &Arc<DispatcherShared>,
	) -> Result<(), ClientError> {
		self.ensure_open()?;
		if dispatcher.is_closed() {
			return Err(SubscriptionError::DispatcherClosed(dispatcher.id()).into());
		}
		let live = self.retire_dispatcher(dispatcher, CloseReason::DispatcherClosed);
		let mut result = Ok(());
		for entry in live {
			if let Err(err) = self.writer.send_unsubscribe(entry.sid(), None) {
				warn!(subscription_id = %entry.sid(), error = %err, "Failed to send UNSUB");
				result = Err(err.into());
			}
		}
		result
	}

	fn retire_dispatcher(
		&self,
		dispatcher: &Arc<DispatcherShared>,
		reason: CloseReason,
	) -> Vec<Arc<SubscriptionEntry>> {
		lock(&self.dispatchers).remove(&dispatcher.id());
		let live = dispatcher.close(reason);
		for entry in &live {
			self.registry.remove(entry.sid());
		}
		if let Some(worker) = dispatcher.take_worker() {
			let mut workers = lock(&self.workers);
			workers.retain(|worker| !worker.is_finished());
			workers.push(worker);
		}
		live
	}

	/// Connection teardown: force-closes every subscription and dispatcher
	/// and wakes all waiters. No frames are sent. Idempotent.
	pub(crate) fn close(&self) {
		if self.closed.swap(true, Ordering::AcqRel) {
			return;
		}
		let entries = self.registry.drain();
		for entry in &entries {
			entry.close(CloseReason::ConnectionClosed);
		}
		let dispatchers: Vec<_> =
			lock(&self.dispatchers).values().cloned().collect();
		for dispatcher in &dispatchers {
			self.retire_dispatcher(dispatcher, CloseReason::ConnectionClosed);
		}
		info!(
			subscriptions = entries.len(),
			dispatchers = dispatchers.len(),
			"Subscription core closed"
		);
	}

	/// Worker handles of closed dispatchers not awaited yet.
	pub(crate) fn take_workers(&self) -> Vec<JoinHandle<()>> {
		std::mem::take(&mut *lock(&self.workers))
	}
}
