use std::{
	fmt,
	hash::{Hash, Hasher},
	sync::Arc,
};

use super::error::Error;

/// An opaque handle identifying who asked for a thumbnail, usually one per UI view.
///
/// Tokens are compared by identity, never by label: two tokens built from the same label are
/// different owners, while clones of one token are the same owner. The label only exists for
/// diagnostics.
#[derive(Clone)]
pub struct OwnerToken {
	label: Arc<str>,
}

impl OwnerToken {
	pub fn new(label: impl AsRef<str>) -> Result<Self, Error> {
		let label = label.as_ref();

		if label.trim().is_empty() {
			return Err(Error::EmptyOwnerLabel);
		}

		Ok(Self {
			label: Arc::from(label),
		})
	}

	#[must_use]
	pub fn label(&self) -> &str {
		&self.label
	}

	fn addr(&self) -> *const u8 {
		Arc::as_ptr(&self.label).cast::<u8>()
	}
}

impl PartialEq for OwnerToken {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.label, &other.label)
	}
}

impl Eq for OwnerToken {}

impl Hash for OwnerToken {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.addr().hash(state);
	}
}

impl fmt::Display for OwnerToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.label)
	}
}

impl fmt::Debug for OwnerToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "OwnerToken<label='{}', id={:p}>", self.label, self.addr())
	}
}
