use std::sync::Arc;

use arcstr::ArcStr;

use super::config::ClientSettings;
use super::dispatcher::Dispatcher;
use super::error::ClientError;
use super::inner::ClientInner;
use super::subscription::Subscription;
use crate::connection::NatsConnection;
use crate::message::Message;
use crate::protocol::ProtocolWriter;
use crate::routing::{BoxError, ErrorListener, TracingErrorListener};

/// Subscription API of one server connection.
///
/// Cheap to clone; every clone shares the same subscriptions. The paired
/// [`NatsConnection`] feeds inbound messages in and owns teardown.
#[derive(Clone)]
pub struct NatsClient {
	inner: Arc<ClientInner>,
}

impl NatsClient {
	/// Creates a client on top of `writer`, logging asynchronous failures
	/// through `tracing`.
	pub fn new(
		writer: Arc<dyn ProtocolWriter>,
		settings: ClientSettings,
	) -> Result<(Self, NatsConnection), ClientError> {
		Self::with_error_listener(
			writer,
			settings,
			Arc::new(TracingErrorListener),
		)
	}

	/// Creates a client that reports handler failures and slow consumers
	/// to `listener`.
	pub fn with_error_listener(
		writer: Arc<dyn ProtocolWriter>,
		settings: ClientSettings,
		listener: Arc<dyn ErrorListener>,
	) -> Result<(Self, NatsConnection), ClientError> {
		settings.validate()?;
		let inner = Arc::new(ClientInner::new(writer, settings, listener));
		let connection = NatsConnection::new(Arc::clone(&inner));
		Ok((Self { inner }, connection))
	}

	/// Subscribes to `subject`. Messages are retrieved with
	/// [`Subscription::next_message`].
	///
	/// Only messages that arrive after this call are delivered.
	pub fn subscribe(
		&self,
		subject: impl Into<ArcStr>,
	) -> Result<Subscription, ClientError> {
		let entry = self.inner.subscribe_mailbox(subject.into(), None)?;
		Ok(Subscription::new(entry, Arc::clone(&self.inner)))
	}

	/// Joins `queue_group` on `subject`. The server delivers each message
	/// to exactly one member of the group.
	pub fn queue_subscribe(
		&self,
		subject: impl Into<ArcStr>,
		queue_group: impl Into<ArcStr>,
	) -> Result<Subscription, ClientError> {
		let entry = self
			.inner
			.subscribe_mailbox(subject.into(), Some(queue_group.into()))?;
		Ok(Subscription::new(entry, Arc::clone(&self.inner)))
	}

	/// Creates a dispatcher without a default handler. Every subscription
	/// on it must bring its own handler.
	///
	/// Must be called within a Tokio runtime.
	pub fn create_dispatcher(&self) -> Result<Dispatcher, ClientError> {
		let shared = self.inner.create_dispatcher(None)?;
		Ok(Dispatcher::new(shared, Arc::clone(&self.inner)))
	}

	/// Creates a dispatcher whose handler-less subscriptions go to
	/// `handler`.
	///
	/// Must be called within a Tokio runtime.
	pub fn create_dispatcher_with_handler<H>(
		&self,
		handler: H,
	) -> Result<Dispatcher, ClientError>
	where
		H: Fn(Message) -> Result<(), BoxError> + Send + Sync + 'static,
	{
		let shared = self.inner.create_dispatcher(Some(Arc::new(handler)))?;
		Ok(Dispatcher::new(shared, Arc::clone(&self.inner)))
	}

	/// Closes `dispatcher` and unsubscribes all of its subscriptions
	/// without waiting for the worker. See [`Dispatcher::shutdown`] for a
	/// waiting variant.
	pub fn close_dispatcher(
		&self,
		dispatcher: &Dispatcher,
	) -> Result<(), ClientError> {
		dispatcher.close()
	}

	/// Returns a new unique inbox subject.
	pub fn create_inbox(&self) -> ArcStr {
		self.inner.create_inbox()
	}

	/// True once the connection reported termination.
	pub fn is_closed(&self) -> bool {
		self.inner.is_closed()
	}

	/// Settings this client was created with.
	pub fn settings(&self) -> &ClientSettings {
		self.inner.settings()
	}
}

impl std::fmt::Debug for NatsClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NatsClient")
			.field("closed", &self.is_closed())
			.finish_non_exhaustive()
	}
}
