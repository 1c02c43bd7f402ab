use serde::{Deserialize, Serialize};

use super::owner::OwnerToken;

/// How urgently a thumbnail is wanted. Higher variants are dispatched first.
#[derive(
	Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Priority {
	Low,
	#[default]
	Normal,
	High,
	Critical,
}

impl Priority {
	pub(crate) const COUNT: usize = 4;

	pub const ALL: [Self; Self::COUNT] = [Self::Low, Self::Normal, Self::High, Self::Critical];

	pub(crate) const fn index(self) -> usize {
		self as usize
	}
}

/// The priority actually used when picking the next request to dispatch.
///
/// Requests belonging to the active owner are boosted to [`Priority::Critical`]. Boosting never
/// demotes, so a `Critical` request stays `Critical` whoever owns it.
#[must_use]
pub fn effective_priority(
	requested: Priority,
	owner: &OwnerToken,
	active_owner: Option<&OwnerToken>,
) -> Priority {
	if active_owner.is_some_and(|active| active == owner) {
		Priority::Critical
	} else {
		requested
	}
}
