//! # NATS Client Core
//!
//! Subscription and dispatch core of a NATS-style publish/subscribe client.
//! The connection layer hands every parsed inbound message to a
//! [`DeliveryRouter`]; the router finds the live subscription by its sid and
//! either buffers the message for a pulling consumer or queues it for a
//! dispatcher worker.
//!
//! ## Features
//!
//! - **Pull subscriptions**: `next_message(timeout)` with prompt wake-up on
//!   unsubscribe and connection close
//! - **Auto-unsubscribe**: `unsubscribe_after(n)` delivers exactly `n`
//!   messages in total
//! - **Queue groups**: validated group names, one delivery per group
//! - **Dispatchers**: one ordered worker per dispatcher, per-subscription or
//!   default handlers, failures reported to an [`ErrorListener`]
//! - **Slow-consumer protection**: bounded buffers drop and report instead
//!   of blocking the read path
//! - **Message Serialization**: Pluggable payload decoding (Bincode included)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use nats_client_core::{ClientSettings, LoopbackServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (server, client, connection) =
//!         LoopbackServer::connect(ClientSettings::default())?;
//!
//!     let subscription = client.subscribe("sensors.temperature")?;
//!     server.publish("sensors.temperature", "23.5");
//!
//!     if let Some(message) =
//!         subscription.next_message(Some(Duration::from_secs(1))).await?
//!     {
//!         println!("{}: {:?}", message.subject(), message.payload());
//!     }
//!
//!     subscription.unsubscribe()?;
//!     connection.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Subjects
//!
//! Subjects are `.`-separated tokens. Subscriptions may use wildcards:
//!
//! - `*` matches a single token (e.g., `sensors.*.temperature`)
//! - `>` matches one or more trailing tokens (e.g., `sensors.>`)

#![warn(missing_docs)]

// Core modules
pub mod client;
pub mod connection;
pub mod loopback;
pub mod message;
pub mod message_serializer;
pub mod protocol;
pub mod routing;
pub mod subject;

// === Core Public API ===
// Main client types
pub use client::{
	ClientError, ClientSettings, Dispatcher, NatsClient, Subscription,
};
pub use connection::NatsConnection;

// Messages and serialization
#[cfg(feature = "json")]
pub use message_serializer::JsonSerializer;
pub use message::{HeaderMap, Message, MessageFrame};
pub use message_serializer::{
	BincodeSerializer, MessageSerializer, Utf8Serializer,
};

// Connection-side collaborators
pub use loopback::LoopbackServer;
pub use protocol::{ChannelWriter, ControlFrame, ProtocolWriter, WriterError};
pub use routing::{DeliveryRouter, RouteOutcome};

// Subscription lifecycle
pub use routing::{
	BoxError, CloseReason, DispatcherId, ErrorListener, SubscriptionId,
	SubscriptionState, TracingErrorListener,
};

/// Result type alias for operations that may fail with ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

/// Prelude module for convenient imports
///
/// ```rust
/// use nats_client_core::prelude::*;
/// ```
pub mod prelude {
	//! Essential types for most applications

	pub use crate::{
		BincodeSerializer, ClientError, ClientSettings, Dispatcher, Message,
		MessageSerializer, NatsClient, NatsConnection, Result, Subscription,
	};
}

/// Types for integrating the core with a connection implementation
///
/// ```rust
/// use nats_client_core::advanced::*;
/// ```
pub mod advanced {
	//! Connection-side and validation utilities

	pub use crate::routing::{
		DeliveryRouter, ErrorListener, MessageHandler, RouteOutcome,
		TracingErrorListener,
	};
	pub use crate::subject::{
		is_literal, limits, matches, new_inbox, validate_queue_group,
		validate_subject,
	};
	pub use crate::{
		ChannelWriter, ControlFrame, MessageFrame, ProtocolWriter,
	};
}

/// Error types used throughout the library
///
/// ```rust
/// use nats_client_core::errors::*;
/// ```
pub mod errors {
	//! All error types used in the library

	pub use crate::ClientError;
	pub use crate::protocol::WriterError;
	pub use crate::routing::{HandlerError, SubscriptionError};
	pub use crate::subject::SubjectError;
}
