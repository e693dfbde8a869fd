//! Connection-side lifecycle handle

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time;
use tracing::{error, info, warn};

use crate::client::ClientError;
use crate::client::inner::ClientInner;
use crate::routing::DeliveryRouter;

/// The connection collaborator's side of a [`NatsClient`](crate::NatsClient).
///
/// The read path pushes parsed frames through [`router`](Self::router);
/// connection termination is reported with [`on_closed`](Self::on_closed).
/// Call [`shutdown`](Self::shutdown) before dropping.
pub struct NatsConnection {
	inner: Arc<ClientInner>,
	router: DeliveryRouter,
}

impl NatsConnection {
	pub(crate) fn new(inner: Arc<ClientInner>) -> Self {
		let router = inner.router();
		Self { inner, router }
	}

	/// Router for inbound frames. Clones may be moved into reader tasks.
	pub fn router(&self) -> DeliveryRouter {
		self.router.clone()
	}

	/// Reports that the connection terminated.
	///
	/// Every subscription and dispatcher is force-closed and every blocked
	/// `next_message` fails with an invalid-state error. Idempotent.
	pub fn on_closed(&self) {
		self.inner.close();
	}

	/// True once closed by `on_closed`, `shutdown` or drop.
	pub fn is_closed(&self) -> bool {
		self.inner.is_closed()
	}

	/// Closes the connection state and waits, bounded by
	/// `shutdown_timeout_millis`, for dispatcher workers to finish the
	/// handlers they are running.
	pub async fn shutdown(self) -> Result<(), ClientError> {
		self.inner.close();
		let workers = self.inner.take_workers();
		if workers.is_empty() {
			info!("Connection shut down");
			return Ok(());
		}

		let timeout = Duration::from_millis(
			self.inner.settings().shutdown_timeout_millis,
		);
		let count = workers.len();
		match time::timeout(timeout, join_all(workers)).await {
			| Ok(results) => {
				for result in results {
					if let Err(err) = result {
						warn!(error = %err, "Dispatcher worker failed");
					}
				}
				info!(workers = count, "Connection shut down");
			}
			| Err(_) => {
				warn!(
					workers = count,
					timeout = ?timeout,
					"Dispatcher workers did not stop in time"
				);
			}
		}
		Ok(())
	}
}

impl Drop for NatsConnection {
	fn drop(&mut self) {
		if !self.inner.is_closed() {
			error!(
				"NatsConnection dropped without calling shutdown(). Please \
				 call shutdown() and await its completion before dropping."
			);
			self.inner.close();
		}
	}
}

impl std::fmt::Debug for NatsConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NatsConnection")
			.field("closed", &self.is_closed())
			.finish_non_exhaustive()
	}
}
