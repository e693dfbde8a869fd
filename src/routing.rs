//! Subscription registry and inbound message routing
//!
//! Everything between the connection's read path and the consumers:
//! the registry of live subscriptions, per-subscription mailboxes with
//! their delivery state machine, dispatcher workers and the router that
//! ties them together.

mod dispatcher;
mod entry;
/// Routing and subscription error types
pub mod error;
mod gate;
mod listener;
mod mailbox;
mod registry;
mod router;

pub use dispatcher::{DispatcherId, MessageHandler};
pub use error::{BoxError, HandlerError, SubscriptionError};
pub use gate::{CloseReason, SubscriptionState};
pub use listener::{ErrorListener, TracingErrorListener};
pub use registry::SubscriptionId;
pub use router::{DeliveryRouter, RouteOutcome};

pub(crate) use dispatcher::DispatcherShared;
pub(crate) use entry::{Sink, SubscriptionEntry};
pub(crate) use gate::UnsubscribeAction;
pub(crate) use mailbox::{Mailbox, Popped};
pub(crate) use registry::SubscriptionRegistry;
