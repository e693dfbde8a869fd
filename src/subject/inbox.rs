use arcstr::ArcStr;
use uuid::Uuid;

/// Builds a unique inbox subject below `prefix`.
///
/// The random token is a simple-format v4 UUID, so two inboxes created by
/// the same process never collide in practice.
pub fn new_inbox(prefix: &str) -> ArcStr {
	ArcStr::from(format!("{prefix}.{}", Uuid::new_v4().simple()))
}
