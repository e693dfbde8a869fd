//! Dispatcher worker
//!
//! A dispatcher owns one bounded queue of `(sid, message)` pairs and one
//! worker draining it. Handlers of one dispatcher therefore never run
//! concurrently and messages are handled in global arrival order.
//!
//! Handlers are plain blocking callbacks, so the worker lives on the
//! runtime's blocking pool. A slow handler stalls its own dispatcher only.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::entry::SubscriptionEntry;
use super::error::{BoxError, HandlerError};
use super::gate::{Admission, CloseReason};
use super::listener::ErrorListener;
use super::mailbox::Push;
use super::registry::{SubscriptionId, SubscriptionRegistry};
use crate::message::Message;

/// Callback invoked by a dispatcher worker for every delivered message.
pub type MessageHandler =
	Arc<dyn Fn(Message) -> Result<(), BoxError> + Send + Sync + 'static>;

/// Identifier of a dispatcher, unique per connection.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, PartialOrd, Ord)]
pub struct DispatcherId(u64);

impl DispatcherId {
	pub(crate) const fn new(raw: u64) -> Self {
		Self(raw)
	}
}

impl fmt::Display for DispatcherId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

type Queued = (SubscriptionId, Message);

struct Registration {
	entry: Arc<SubscriptionEntry>,
	handler: Option<MessageHandler>,
}

/// State shared between the public dispatcher handle, the router and the
/// worker.
pub(crate) struct DispatcherShared {
	id: DispatcherId,
	default_handler: Option<MessageHandler>,
	registrations: Mutex<HashMap<SubscriptionId, Registration>>,
	queue_tx: mpsc::Sender<Queued>,
	closed: AtomicBool,
	slow: AtomicBool,
	dropped: AtomicU64,
	registry: Arc<SubscriptionRegistry>,
	listener: Arc<dyn ErrorListener>,
	shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
	worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for DispatcherShared {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DispatcherShared")
			.field("id", &self.id)
			.field("closed", &self.is_closed())
			.field("dropped", &self.dropped())
			.finish_non_exhaustive()
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DispatcherShared {
	/// Creates the dispatcher state and spawns its worker on the blocking
	/// pool of `runtime`.
	///
	/// The worker only holds a weak reference, so it also stops once every
	/// handle to the dispatcher is gone.
	pub(crate) fn spawn(
		runtime: &Handle,
		id: DispatcherId,
		default_handler: Option<MessageHandler>,
		queue_capacity: usize,
		registry: Arc<SubscriptionRegistry>,
		listener: Arc<dyn ErrorListener>,
	) -> Arc<Self> {
		let (queue_tx, queue_rx) = mpsc::channel(queue_capacity);
		let (shutdown_tx, shutdown_rx) = oneshot::channel();
		let shared = Arc::new(Self {
			id,
			default_handler,
			registrations: Mutex::new(HashMap::new()),
			queue_tx,
			closed: AtomicBool::new(false),
			slow: AtomicBool::new(false),
			dropped: AtomicU64::new(0),
			registry,
			listener,
			shutdown_tx: Mutex::new(Some(shutdown_tx)),
			worker: Mutex::new(None),
		});
		let weak = Arc::downgrade(&shared);
		let handle = runtime.clone();
		let worker = runtime.spawn_blocking(move || {
			Self::run(id, weak, &handle, queue_rx, shutdown_rx)
		});
		*lock(&shared.worker) = Some(worker);
		debug!(dispatcher_id = %id, "Dispatcher started");
		shared
	}

	fn run(
		id: DispatcherId,
		shared: Weak<Self>,
		runtime: &Handle,
		mut queue_rx: mpsc::Receiver<Queued>,
		mut shutdown_rx: oneshot::Receiver<()>,
	) {
		loop {
			let queued = runtime.block_on(async {
				tokio::select! {
					biased;
					_ = &mut shutdown_rx => None,
					queued = queue_rx.recv() => queued,
				}
			});
			let Some((sid, message)) = queued else {
				break;
			};
			let Some(dispatcher) = shared.upgrade() else {
				break;
			};
			dispatcher.dispatch(sid, message);
		}
		debug!(dispatcher_id = %id, "Dispatcher worker stopped");
	}

	pub(crate) fn id(&self) -> DispatcherId {
		self.id
	}

	pub(crate) fn has_default_handler(&self) -> bool {
		self.default_handler.is_some()
	}

	pub(crate) fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	/// Messages dropped because the queue was full.
	pub(crate) fn dropped(&self) -> u64 {
		self.dropped.load(Ordering::Relaxed)
	}

	/// Adds a subscription. Returns false if the dispatcher is closed.
	pub(crate) fn register(
		&self,
		entry: Arc<SubscriptionEntry>,
		handler: Option<MessageHandler>,
	) -> bool {
		let mut registrations = lock(&self.registrations);
		// checked under the lock so close() cannot miss the registration
		if self.is_closed() {
			return false;
		}
		registrations.insert(entry.sid(), Registration { entry, handler });
		true
	}

	pub(crate) fn deregister(&self, sid: SubscriptionId) {
		lock(&self.registrations).remove(&sid);
	}

	/// Live subscriptions on exactly `subject`.
	pub(crate) fn entries_for(
		&self,
		subject: &str,
	) -> Vec<Arc<SubscriptionEntry>> {
		lock(&self.registrations)
			.values()
			.filter(|registration| registration.entry.subject() == subject)
			.map(|registration| Arc::clone(&registration.entry))
			.collect()
	}

	pub(crate) fn subscription_count(&self) -> usize {
		lock(&self.registrations).len()
	}

	/// Queues a message for the worker without waiting.
	pub(crate) fn enqueue(&self, sid: SubscriptionId, message: Message) -> Push {
		if self.is_closed() {
			return Push::Discarded;
		}
		match self.queue_tx.try_send((sid, message)) {
			| Ok(()) => {
				self.slow.store(false, Ordering::Relaxed);
				Push::Queued
			}
			| Err(mpsc::error::TrySendError::Full(_)) => {
				let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
				let first = !self.slow.swap(true, Ordering::Relaxed);
				Push::Overflow { first, dropped }
			}
			| Err(mpsc::error::TrySendError::Closed(_)) => Push::Discarded,
		}
	}

	fn dispatch(&self, sid: SubscriptionId, message: Message) {
		if self.is_closed() {
			return;
		}
		let Some((entry, handler)) = self.resolve(sid) else {
			debug!(
				dispatcher_id = %self.id,
				subscription_id = %sid,
				"Dropping queued message for removed subscription"
			);
			return;
		};
		match entry.admit() {
			| Ok(Admission::Deliver) => {}
			| Ok(Admission::Last) => self.retire(&entry),
			// closed while the message was queued
			| Err(_) => return,
		}

		let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(message)));
		let error = match outcome {
			| Ok(Ok(())) => return,
			| Ok(Err(err)) => HandlerError::Failed(err),
			| Err(payload) => HandlerError::from_panic(payload),
		};
		self.listener.handler_failed(sid, entry.subject(), &error);
	}

	fn resolve(
		&self,
		sid: SubscriptionId,
	) -> Option<(Arc<SubscriptionEntry>, MessageHandler)> {
		let registrations = lock(&self.registrations);
		let registration = registrations.get(&sid)?;
		let handler = registration
			.handler
			.as_ref()
			.or(self.default_handler.as_ref())?;
		Some((Arc::clone(&registration.entry), Arc::clone(handler)))
	}

	/// Drops a subscription that delivered its last message. The server
	/// already counted the same limit, so no UNSUB is needed.
	fn retire(&self, entry: &SubscriptionEntry) {
		self.deregister(entry.sid());
		self.registry.remove(entry.sid());
		debug!(
			dispatcher_id = %self.id,
			subscription_id = %entry.sid(),
			subject = %entry.subject(),
			"Auto-unsubscribe limit reached"
		);
	}

	/// Stops accepting messages, force-closes every owned subscription and
	/// signals the worker to stop.
	///
	/// Returns the subscriptions that were still live so the caller can
	/// detach them from the registry and the server. A second call returns
	/// an empty list.
	pub(crate) fn close(
		&self,
		reason: CloseReason,
	) -> Vec<Arc<SubscriptionEntry>> {
		let drained: Vec<_> = {
			let mut registrations = lock(&self.registrations);
			if self.closed.swap(true, Ordering::AcqRel) {
				return Vec::new();
			}
			registrations.drain().map(|(_, r)| r.entry).collect()
		};
		let live = drained
			.into_iter()
			.filter(|entry| entry.close(reason))
			.collect();
		if let Some(shutdown_tx) = lock(&self.shutdown_tx).take() {
			// the worker may already be gone
			let _ = shutdown_tx.send(());
		}
		info!(dispatcher_id = %self.id, reason = %reason, "Dispatcher closed");
		live
	}

	/// Takes the worker handle so the caller can await it. `None` after
	/// the first call.
	pub(crate) fn take_worker(&self) -> Option<JoinHandle<()>> {
		lock(&self.worker).take()
	}
}
