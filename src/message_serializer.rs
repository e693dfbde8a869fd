//! Payload serialization traits and implementations.

use std::fmt::Debug;

use bincode::{Decode, Encode};

/// Trait for encoding and decoding message payloads.
///
/// Implement this trait to use custom payload formats with
/// [`Message::decode`](crate::Message::decode).
pub trait MessageSerializer<T>:
	Default + Clone + Send + Sync + 'static
{
	/// Error type for serialization failures
	type SerializeError: Debug + Send + Sync + 'static;
	/// Error type for deserialization failures
	type DeserializeError: Debug + Send + Sync + 'static;

	/// Convert data to payload bytes
	fn serialize(&self, data: &T) -> Result<Vec<u8>, Self::SerializeError>;
	/// Convert payload bytes into typed data
	fn deserialize(&self, bytes: &[u8]) -> Result<T, Self::DeserializeError>;
}

/// Default serializer using bincode format.
///
/// Requires types to implement `bincode::Encode` and `bincode::Decode`.
#[derive(Clone, Default)]
pub struct BincodeSerializer {
	config: bincode::config::Configuration,
}

impl BincodeSerializer {
	/// Creates a new serializer with the standard bincode configuration.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a serializer with custom bincode configuration.
	pub fn with_config(config: bincode::config::Configuration) -> Self {
		Self { config }
	}
}

impl<T> MessageSerializer<T> for BincodeSerializer
where T: Encode + Decode<()> + 'static
{
	type SerializeError = bincode::error::EncodeError;
	type DeserializeError = bincode::error::DecodeError;

	fn serialize(&self, data: &T) -> Result<Vec<u8>, Self::SerializeError> {
		bincode::encode_to_vec(data, self.config)
	}

	fn deserialize(&self, bytes: &[u8]) -> Result<T, Self::DeserializeError> {
		bincode::decode_from_slice(bytes, self.config).map(|(value, _)| value)
	}
}

/// JSON serializer backed by `serde_json`.
#[cfg(feature = "json")]
#[derive(Clone, Default)]
pub struct JsonSerializer;

#[cfg(feature = "json")]
impl<T> MessageSerializer<T> for JsonSerializer
where T: serde::Serialize + serde::de::DeserializeOwned + 'static
{
	type SerializeError = serde_json::Error;
	type DeserializeError = serde_json::Error;

	fn serialize(&self, data: &T) -> Result<Vec<u8>, Self::SerializeError> {
		serde_json::to_vec(data)
	}

	fn deserialize(&self, bytes: &[u8]) -> Result<T, Self::DeserializeError> {
		serde_json::from_slice(bytes)
	}
}

/// Plain-text payloads. Decoding fails on invalid UTF-8.
#[derive(Clone, Copy, Debug, Default)]
pub struct Utf8Serializer;

impl MessageSerializer<String> for Utf8Serializer {
	type SerializeError = std::convert::Infallible;
	type DeserializeError = std::str::Utf8Error;

	fn serialize(&self, data: &String) -> Result<Vec<u8>, Self::SerializeError> {
		Ok(data.as_bytes().to_vec())
	}

	fn deserialize(&self, bytes: &[u8]) -> Result<String, Self::DeserializeError> {
		std::str::from_utf8(bytes).map(str::to_owned)
	}
}
