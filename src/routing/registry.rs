use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::entry::SubscriptionEntry;

/// A subscription identifier.
///
/// Chosen by the client at subscribe time, unique for the lifetime of one
/// connection, and sent to the server as the protocol-level sid.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
	/// Wraps a raw sid, e.g. one parsed from an inbound MSG frame.
	pub const fn new(raw: u64) -> Self {
		Self(raw)
	}

	/// Raw numeric value.
	pub const fn as_u64(self) -> u64 {
		self.0
	}
}

impl fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

type SubscriptionTable = HashMap<SubscriptionId, Arc<SubscriptionEntry>>;

/// Single owning map of live subscriptions for one connection.
///
/// The lock only covers insert, remove and lookup; delivery happens after
/// the entry has been cloned out.
#[derive(Debug)]
pub(crate) struct SubscriptionRegistry {
	entries: Mutex<SubscriptionTable>,
	next_sid: AtomicU64,
}

impl SubscriptionRegistry {
	pub(crate) fn new() -> Self {
		Self {
			entries: Mutex::new(SubscriptionTable::new()),
			next_sid: AtomicU64::new(1),
		}
	}

	fn lock(&self) -> MutexGuard<'_, SubscriptionTable> {
		self.entries.lock().unwrap_or_else(PoisonError::into_inner)
	}

	pub(crate) fn next_sid(&self) -> SubscriptionId {
		SubscriptionId(self.next_sid.fetch_add(1, Ordering::Relaxed))
	}

	pub(crate) fn insert(&self, entry: Arc<SubscriptionEntry>) {
		self.lock().insert(entry.sid(), entry);
	}

	pub(crate) fn get(&self, sid: SubscriptionId) -> Option<Arc<SubscriptionEntry>> {
		self.lock().get(&sid).cloned()
	}

	pub(crate) fn remove(
		&self,
		sid: SubscriptionId,
	) -> Option<Arc<SubscriptionEntry>> {
		self.lock().remove(&sid)
	}

	/// Removes every entry in one pass, for connection teardown.
	pub(crate) fn drain(&self) -> Vec<Arc<SubscriptionEntry>> {
		self.lock().drain().map(|(_, entry)| entry).collect()
	}

	pub(crate) fn len(&self) -> usize {
		self.lock().len()
	}
}
