//! Client-facing handles
//!
//! [`NatsClient`] creates subscriptions and dispatchers; [`Subscription`]
//! and [`Dispatcher`] are the handles applications hold on to.

/// Client configuration
pub mod config;
mod dispatcher;
/// Client error types
pub mod error;
pub(crate) mod inner;
mod nats_client;
mod subscription;

pub use config::ClientSettings;
pub use dispatcher::Dispatcher;
pub use error::ClientError;
pub use nats_client::NatsClient;
pub use subscription::Subscription;
