//! Subject handling module
//!
//! This module provides the subject and queue-group grammar checks applied
//! before any subscription touches the network, wildcard matching for
//! subject patterns, and unique inbox generation.

pub mod error;
/// Unique inbox subjects
pub mod inbox;
pub mod matcher;
/// Subject and queue-group grammar validation
pub mod validation;


pub use error::{SubjectError, SubjectResult, limits};
pub use inbox::new_inbox;
pub use matcher::matches;
pub use validation::{
	is_literal, validate_inbox_prefix, validate_queue_group, validate_subject,
};
