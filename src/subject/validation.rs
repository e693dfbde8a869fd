use super::error::limits::{
	MAX_SUBJECT_LENGTH, SINGLE_TOKEN_WILDCARD, TAIL_WILDCARD, TOKEN_SEPARATOR,
};
use super::error::{SubjectError, SubjectResult};

/// Validates a subject used for subscribing.
///
/// Subjects are dot separated tokens. `*` and `>` are accepted only as whole
/// tokens, and `>` only as the last token.
pub fn validate_subject(subject: &str) -> SubjectResult<()> {
	if subject.is_empty() {
		return Err(SubjectError::EmptySubject);
	}
	check_common(subject)?;

	let last = subject.split(TOKEN_SEPARATOR).count() - 1;
	for (index, token) in subject.split(TOKEN_SEPARATOR).enumerate() {
		if token.is_empty() {
			return Err(SubjectError::empty_token(subject, index));
		}
		if token == TAIL_WILDCARD && index != last {
			return Err(SubjectError::wildcard_usage(
				subject,
				"'>' can only be the last token",
			));
		}
		if token.len() > 1 && has_wildcard(token) {
			return Err(SubjectError::wildcard_usage(
				subject,
				format!("wildcard inside token '{token}'"),
			));
		}
	}
	Ok(())
}

/// Validates a queue group name.
///
/// Same token grammar as subjects, but wildcards have no meaning in a group
/// name and are rejected.
pub fn validate_queue_group(queue_group: &str) -> SubjectResult<()> {
	if queue_group.is_empty() {
		return Err(SubjectError::EmptyQueueGroup);
	}
	check_common(queue_group)?;

	for (index, token) in queue_group.split(TOKEN_SEPARATOR).enumerate() {
		if token.is_empty() {
			return Err(SubjectError::empty_token(queue_group, index));
		}
		if has_wildcard(token) {
			return Err(SubjectError::wildcard_usage(
				queue_group,
				"wildcards are not allowed in queue group names",
			));
		}
	}
	Ok(())
}

/// Validates the prefix used to build inbox subjects.
pub fn validate_inbox_prefix(prefix: &str) -> SubjectResult<()> {
	validate_subject(prefix)?;
	if !is_literal(prefix) {
		return Err(SubjectError::wildcard_usage(
			prefix,
			"inbox prefix must be a literal subject",
		));
	}
	Ok(())
}

/// Returns true if the subject contains no wildcard token.
pub fn is_literal(subject: &str) -> bool {
	subject
		.split(TOKEN_SEPARATOR)
		.all(|token| token != SINGLE_TOKEN_WILDCARD && token != TAIL_WILDCARD)
}

fn check_common(value: &str) -> SubjectResult<()> {
	if value.len() > MAX_SUBJECT_LENGTH {
		return Err(SubjectError::too_long(value, value.len()));
	}
	if let Some((position, _)) =
		value.char_indices().find(|(_, c)| c.is_whitespace())
	{
		return Err(SubjectError::whitespace(value, position));
	}
	Ok(())
}

fn has_wildcard(token: &str) -> bool {
	token.contains(['*', '>'])
}
