//! Inbound message types
//!
//! [`MessageFrame`] is what the connection's read path produces after
//! parsing; [`Message`] is what subscribers receive once the router has
//! stamped it with the subscription it was delivered to.

use arcstr::ArcStr;
use bytes::Bytes;
use smallvec::SmallVec;

use crate::message_serializer::MessageSerializer;
use crate::routing::SubscriptionId;

type HeaderValues = SmallVec<[ArcStr; 1]>;

/// Multi-valued message headers.
///
/// Names are case sensitive and keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
	entries: Vec<(ArcStr, HeaderValues)>,
}

impl HeaderMap {
	/// Creates an empty header map.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets `name` to a single value, replacing previous values.
	pub fn insert(&mut self, name: impl Into<ArcStr>, value: impl Into<ArcStr>) {
		let name = name.into();
		let value = value.into();
		match self.position(&name) {
			| Some(pos) => {
				let values = &mut self.entries[pos].1;
				values.clear();
				values.push(value);
			}
			| None => self.entries.push((name, smallvec::smallvec![value])),
		}
	}

	/// Adds a value to `name`, keeping previous values.
	pub fn append(&mut self, name: impl Into<ArcStr>, value: impl Into<ArcStr>) {
		let name = name.into();
		let value = value.into();
		match self.position(&name) {
			| Some(pos) => self.entries[pos].1.push(value),
			| None => self.entries.push((name, smallvec::smallvec![value])),
		}
	}

	/// First value stored for `name`.
	pub fn get(&self, name: &str) -> Option<&ArcStr> {
		self.get_all(name).first()
	}

	/// All values stored for `name`, empty if absent.
	pub fn get_all(&self, name: &str) -> &[ArcStr] {
		self.position(name)
			.map(|pos| self.entries[pos].1.as_slice())
			.unwrap_or(&[])
	}

	/// Number of distinct header names.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns true if no header is set.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Iterates over `(name, values)` pairs in insertion order.
	pub fn iter(&self) -> impl Iterator<Item = (&ArcStr, &[ArcStr])> {
		self.entries
			.iter()
			.map(|(name, values)| (name, values.as_slice()))
	}

	fn position(&self, name: &str) -> Option<usize> {
		self.entries.iter().position(|(n, _)| n.as_str() == name)
	}
}

/// A parsed inbound message as handed over by the connection read path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFrame {
	/// Subject the message was published on
	pub subject: ArcStr,
	/// Optional reply subject
	pub reply_to: Option<ArcStr>,
	/// Optional headers
	pub headers: Option<HeaderMap>,
	/// Raw payload
	pub payload: Bytes,
}

impl MessageFrame {
	/// Creates a frame without reply subject or headers.
	pub fn new(subject: impl Into<ArcStr>, payload: impl Into<Bytes>) -> Self {
		Self {
			subject: subject.into(),
			reply_to: None,
			headers: None,
			payload: payload.into(),
		}
	}

	/// Sets the reply subject.
	pub fn with_reply_to(self, reply_to: impl Into<ArcStr>) -> Self {
		Self {
			reply_to: Some(reply_to.into()),
			..self
		}
	}

	/// Sets the headers.
	pub fn with_headers(self, headers: HeaderMap) -> Self {
		Self {
			headers: Some(headers),
			..self
		}
	}
}

/// Message delivered to a subscription.
///
/// Immutable after construction. Cloning is cheap: subject strings are
/// reference counted and the payload is a [`Bytes`] handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
	subject: ArcStr,
	reply_to: Option<ArcStr>,
	headers: Option<HeaderMap>,
	payload: Bytes,
	sid: SubscriptionId,
}

impl Message {
	pub(crate) fn from_frame(sid: SubscriptionId, frame: MessageFrame) -> Self {
		Self {
			subject: frame.subject,
			reply_to: frame.reply_to,
			headers: frame.headers,
			payload: frame.payload,
			sid,
		}
	}

	/// Subject the message was published on.
	pub fn subject(&self) -> &ArcStr {
		&self.subject
	}

	/// Reply subject, if the publisher expects an answer.
	pub fn reply_to(&self) -> Option<&ArcStr> {
		self.reply_to.as_ref()
	}

	/// Message headers, if any were sent.
	pub fn headers(&self) -> Option<&HeaderMap> {
		self.headers.as_ref()
	}

	/// Raw payload.
	pub fn payload(&self) -> &Bytes {
		&self.payload
	}

	/// Subscription this message was delivered to.
	pub fn sid(&self) -> SubscriptionId {
		self.sid
	}

	/// Decodes the payload with the given serializer.
	pub fn decode<T, S>(&self, serializer: &S) -> Result<T, S::DeserializeError>
	where S: MessageSerializer<T> {
		serializer.deserialize(&self.payload)
	}
}
