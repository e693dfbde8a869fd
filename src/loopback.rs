//! In-process server stand-in
//!
//! [`LoopbackServer`] plays the server's side of the subscription protocol
//! without a socket: it records SUB and UNSUB frames, matches published
//! subjects against the recorded interest, picks one member per queue
//! group and counts auto-unsubscribe limits, then hands the resulting
//! frames to a [`DeliveryRouter`] the way a connection's read path would.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use arcstr::ArcStr;
use bytes::Bytes;
use tracing::debug;

use crate::client::{ClientError, ClientSettings, NatsClient};
use crate::connection::NatsConnection;
use crate::message::MessageFrame;
use crate::protocol::{ControlFrame, ProtocolWriter, WriterError};
use crate::routing::{DeliveryRouter, RouteOutcome, SubscriptionId};
use crate::subject;

#[derive(Debug)]
struct Interest {
	subject: ArcStr,
	queue_group: Option<ArcStr>,
	max_messages: Option<u64>,
	sent: u64,
}

#[derive(Debug, Default)]
struct ServerState {
	interests: BTreeMap<SubscriptionId, Interest>,
	frames: Vec<ControlFrame>,
	next_member: HashMap<ArcStr, usize>,
	disconnected: bool,
}

impl ServerState {
	/// Picks the receiving sids for one message and counts the sends.
	fn select(&mut self, subject: &str) -> Vec<SubscriptionId> {
		let mut selected = Vec::new();
		let mut groups: BTreeMap<ArcStr, Vec<SubscriptionId>> = BTreeMap::new();
		for (sid, interest) in &self.interests {
			if !subject::matches(&interest.subject, subject) {
				continue;
			}
			match &interest.queue_group {
				| Some(queue_group) => {
					groups.entry(queue_group.clone()).or_default().push(*sid)
				}
				| None => selected.push(*sid),
			}
		}
		for (queue_group, members) in groups {
			let next = self.next_member.entry(queue_group).or_insert(0);
			selected.push(members[*next % members.len()]);
			*next = next.wrapping_add(1);
		}
		for sid in &selected {
			let exhausted = self.interests.get_mut(sid).is_some_and(|interest| {
				interest.sent += 1;
				interest.max_messages.is_some_and(|max| interest.sent >= max)
			});
			if exhausted {
				self.interests.remove(sid);
			}
		}
		selected
	}
}

/// Server stand-in for tests and demos. See the module documentation.
#[derive(Debug, Default)]
pub struct LoopbackServer {
	state: Mutex<ServerState>,
	router: OnceLock<DeliveryRouter>,
}

impl LoopbackServer {
	/// Creates a server with no recorded interest.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a server, a client writing to it and the connection whose
	/// router the server delivers to.
	pub fn connect(
		settings: ClientSettings,
	) -> Result<(Arc<Self>, NatsClient, NatsConnection), ClientError> {
		let server = Arc::new(Self::new());
		let writer: Arc<dyn ProtocolWriter> = server.clone();
		let (client, connection) = NatsClient::new(writer, settings)?;
		server.attach(connection.router());
		Ok((server, client, connection))
	}

	/// Sets the router inbound messages are delivered to. Only the first
	/// call has an effect.
	pub fn attach(&self, router: DeliveryRouter) {
		if self.router.set(router).is_err() {
			debug!("Loopback server already attached");
		}
	}

	fn lock(&self) -> MutexGuard<'_, ServerState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Publishes a payload without reply subject or headers.
	pub fn publish(
		&self,
		subject: impl Into<ArcStr>,
		payload: impl Into<Bytes>,
	) -> usize {
		self.publish_frame(MessageFrame::new(subject, payload))
	}

	/// Publishes `frame` to every matching interest, one member per queue
	/// group. Returns how many subscriptions the frame was routed to.
	pub fn publish_frame(&self, frame: MessageFrame) -> usize {
		let Some(router) = self.router.get() else {
			return 0;
		};
		let targets = self.lock().select(&frame.subject);
		// routed outside the lock, like a reader task would
		targets
			.into_iter()
			.map(|sid| router.route(sid, frame.clone()))
			.filter(|outcome| *outcome == RouteOutcome::Queued)
			.count()
	}

	/// Makes every following control frame fail with
	/// [`WriterError::Closed`].
	pub fn disconnect(&self) {
		self.lock().disconnected = true;
	}

	/// Control frames received so far, oldest first.
	pub fn frames(&self) -> Vec<ControlFrame> {
		self.lock().frames.clone()
	}

	/// Number of sids the server would still deliver to.
	pub fn interest_count(&self) -> usize {
		self.lock().interests.len()
	}
}

impl ProtocolWriter for LoopbackServer {
	fn send_subscribe(
		&self,
		sid: SubscriptionId,
		subject: &str,
		queue_group: Option<&str>,
	) -> Result<(), WriterError> {
		let mut state = self.lock();
		if state.disconnected {
			return Err(WriterError::Closed);
		}
		let subject = ArcStr::from(subject);
		let queue_group = queue_group.map(ArcStr::from);
		state.frames.push(ControlFrame::Subscribe {
			sid,
			subject: subject.clone(),
			queue_group: queue_group.clone(),
		});
		state.interests.insert(sid, Interest {
			subject,
			queue_group,
			max_messages: None,
			sent: 0,
		});
		Ok(())
	}

	fn send_unsubscribe(
		&self,
		sid: SubscriptionId,
		max_messages: Option<u64>,
	) -> Result<(), WriterError> {
		let mut state = self.lock();
		if state.disconnected {
			return Err(WriterError::Closed);
		}
		state.frames.push(ControlFrame::Unsubscribe { sid, max_messages });
		let keep = match (state.interests.get_mut(&sid), max_messages) {
			| (Some(interest), Some(max)) if max > interest.sent => {
				interest.max_messages = Some(max);
				true
			}
			| _ => false,
		};
		if !keep {
			state.interests.remove(&sid);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn subscribe(
		server: &LoopbackServer,
		sid: u64,
		subject: &str,
		queue_group: Option<&str>,
	) {
		server
			.send_subscribe(SubscriptionId::new(sid), subject, queue_group)
			.unwrap();
	}

	#[test]
	fn test_select_matches_wildcards() {
		let server = LoopbackServer::new();
		subscribe(&server, 1, "foo.*", None);
		subscribe(&server, 2, "foo.>", None);
		subscribe(&server, 3, "bar", None);

		let selected = server.lock().select("foo.bar");
		assert_eq!(selected, vec![
			SubscriptionId::new(1),
			SubscriptionId::new(2)
		]);
	}

	#[test]
	fn test_queue_group_members_take_turns() {
		let server = LoopbackServer::new();
		subscribe(&server, 1, "work", Some("q"));
		subscribe(&server, 2, "work", Some("q"));

		let mut counts = [0; 2];
		for _ in 0 .. 10 {
			let selected = server.lock().select("work");
			assert_eq!(selected.len(), 1);
			counts[selected[0].as_u64() as usize - 1] += 1;
		}
		assert_eq!(counts, [5, 5]);
	}

	#[test]
	fn test_server_side_limit_removes_interest() {
		let server = LoopbackServer::new();
		subscribe(&server, 1, "foo", None);
		server
			.send_unsubscribe(SubscriptionId::new(1), Some(2))
			.unwrap();

		assert_eq!(server.lock().select("foo").len(), 1);
		assert_eq!(server.lock().select("foo").len(), 1);
		assert!(server.lock().select("foo").is_empty());
		assert_eq!(server.interest_count(), 0);
	}

	#[test]
	fn test_disconnected_server_rejects_frames() {
		let server = LoopbackServer::new();
		server.disconnect();
		let result = server.send_subscribe(SubscriptionId::new(1), "foo", None);
		assert_eq!(result, Err(WriterError::Closed));
	}

	#[test]
	fn test_connect_wires_client_to_server() {
		let (server, client, _connection) =
			LoopbackServer::connect(ClientSettings::default()).unwrap();
		let sub = client.subscribe("foo").unwrap();
		assert_eq!(server.interest_count(), 1);

		assert_eq!(server.publish("foo", "hello"), 1);
		let message = sub.try_next_message().unwrap().unwrap();
		assert_eq!(&message.payload()[..], b"hello");
	}
}
