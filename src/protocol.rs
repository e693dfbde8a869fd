//! Outbound control frames
//!
//! The subscription core never touches the socket. It asks a
//! [`ProtocolWriter`] supplied by the connection layer to emit SUB and UNSUB
//! frames on its behalf.

use arcstr::ArcStr;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::routing::SubscriptionId;

/// Errors reported by a [`ProtocolWriter`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriterError {
	/// The connection's outbound side is gone
	#[error("Connection writer is closed")]
	Closed,

	/// The frame could not be queued or written
	#[error("Failed to write control frame: {0}")]
	Io(String),
}

/// Outbound side of the connection, as seen by the subscription core.
///
/// Implementations must not block for long: calls happen on the
/// subscriber's task, and `send_unsubscribe` may be called from a
/// dispatcher handler.
pub trait ProtocolWriter: Send + Sync + 'static {
	/// Emits `SUB <subject> [queue] <sid>`.
	fn send_subscribe(
		&self,
		sid: SubscriptionId,
		subject: &str,
		queue_group: Option<&str>,
	) -> Result<(), WriterError>;

	/// Emits `UNSUB <sid> [max]`.
	///
	/// With `max_messages` set, the server keeps delivering until it has
	/// sent that many messages in total on this subscription.
	fn send_unsubscribe(
		&self,
		sid: SubscriptionId,
		max_messages: Option<u64>,
	) -> Result<(), WriterError>;
}

/// A control frame requested by the subscription core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
	/// Register interest in a subject
	Subscribe {
		/// Subscription id chosen by the client
		sid: SubscriptionId,
		/// Subject or subject pattern
		subject: ArcStr,
		/// Queue group, if the subscription is a group member
		queue_group: Option<ArcStr>,
	},
	/// Drop interest, now or after `max_messages` deliveries
	Unsubscribe {
		/// Subscription id chosen by the client
		sid: SubscriptionId,
		/// Auto-unsubscribe count
		max_messages: Option<u64>,
	},
}

impl ControlFrame {
	/// Subscription this frame refers to.
	pub fn sid(&self) -> SubscriptionId {
		match self {
			| ControlFrame::Subscribe { sid, .. }
			| ControlFrame::Unsubscribe { sid, .. } => *sid,
		}
	}

	/// Encodes the frame as a protocol line terminated by CRLF.
	pub fn encode(&self) -> Bytes {
		let line = match self {
			| ControlFrame::Subscribe {
				sid,
				subject,
				queue_group: Some(queue),
			} => format!("SUB {subject} {queue} {sid}\r\n"),
			| ControlFrame::Subscribe {
				sid,
				subject,
				queue_group: None,
			} => format!("SUB {subject} {sid}\r\n"),
			| ControlFrame::Unsubscribe {
				sid,
				max_messages: Some(max),
			} => format!("UNSUB {sid} {max}\r\n"),
			| ControlFrame::Unsubscribe {
				sid,
				max_messages: None,
			} => format!("UNSUB {sid}\r\n"),
		};
		Bytes::from(line)
	}
}

/// [`ProtocolWriter`] that forwards frames to the connection's writer task.
#[derive(Debug, Clone)]
pub struct ChannelWriter {
	frame_tx: UnboundedSender<ControlFrame>,
}

impl ChannelWriter {
	/// Creates the writer and the receiving end for the writer task.
	pub fn new() -> (Self, UnboundedReceiver<ControlFrame>) {
		let (frame_tx, frame_rx) = mpsc::unbounded_channel();
		(Self { frame_tx }, frame_rx)
	}

	fn forward(&self, frame: ControlFrame) -> Result<(), WriterError> {
		self.frame_tx.send(frame).map_err(|_| WriterError::Closed)
	}
}

impl ProtocolWriter for ChannelWriter {
	fn send_subscribe(
		&self,
		sid: SubscriptionId,
		subject: &str,
		queue_group: Option<&str>,
	) -> Result<(), WriterError> {
		self.forward(ControlFrame::Subscribe {
			sid,
			subject: ArcStr::from(subject),
			queue_group: queue_group.map(ArcStr::from),
		})
	}

	fn send_unsubscribe(
		&self,
		sid: SubscriptionId,
		max_messages: Option<u64>,
	) -> Result<(), WriterError> {
		self.forward(ControlFrame::Unsubscribe { sid, max_messages })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_encode_frames() {
		let sid = SubscriptionId::new(3);
		let plain = ControlFrame::Subscribe {
			sid,
			subject: "foo.bar".into(),
			queue_group: None,
		};
		let grouped = ControlFrame::Subscribe {
			sid,
			subject: "foo.bar".into(),
			queue_group: Some("workers".into()),
		};
		assert_eq!(&plain.encode()[..], b"SUB foo.bar 3\r\n");
		assert_eq!(&grouped.encode()[..], b"SUB foo.bar workers 3\r\n");

		let unsub = ControlFrame::Unsubscribe {
			sid,
			max_messages: None,
		};
		let auto_unsub = ControlFrame::Unsubscribe {
			sid,
			max_messages: Some(10),
		};
		assert_eq!(&unsub.encode()[..], b"UNSUB 3\r\n");
		assert_eq!(&auto_unsub.encode()[..], b"UNSUB 3 10\r\n");
	}

	#[test]
	fn test_channel_writer_forwards_frames() {
		let (writer, mut frames) = ChannelWriter::new();
		let sid = SubscriptionId::new(1);
		writer.send_subscribe(sid, "a.b", Some("q")).unwrap();
		writer.send_unsubscribe(sid, Some(2)).unwrap();

		assert_eq!(
			frames.try_recv().unwrap(),
			ControlFrame::Subscribe {
				sid,
				subject: "a.b".into(),
				queue_group: Some("q".into()),
			}
		);
		assert_eq!(
			frames.try_recv().unwrap(),
			ControlFrame::Unsubscribe {
				sid,
				max_messages: Some(2),
			}
		);
	}

	#[test]
	fn test_channel_writer_reports_closed_connection() {
		let (writer, frames) = ChannelWriter::new();
		drop(frames);
		assert_eq!(
			writer.send_unsubscribe(SubscriptionId::new(1), None),
			Err(WriterError::Closed)
		);
	}
}
