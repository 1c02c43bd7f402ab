use serde::{Deserialize, Serialize};

use super::error::Error;

pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 4;
pub const DEFAULT_TARGET_WIDTH: u32 = 256;
pub const DEFAULT_MAX_CACHE_ENTRIES: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
	max_concurrent_loads: usize,
	default_target_width: u32,
}

impl Default for OrchestratorConfig {
	fn default() -> Self {
		Self {
			max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
			default_target_width: DEFAULT_TARGET_WIDTH,
		}
	}
}

impl OrchestratorConfig {
	#[must_use]
	pub const fn max_concurrent_loads(&self) -> usize {
		self.max_concurrent_loads
	}

	#[must_use]
	pub const fn default_target_width(&self) -> u32 {
		self.default_target_width
	}

	pub fn set_max_concurrent_loads(&mut self, max_concurrent_loads: usize) -> &mut Self {
		self.max_concurrent_loads = max_concurrent_loads.max(1);

		self
	}

	pub fn set_default_target_width(&mut self, default_target_width: u32) -> &mut Self {
		self.default_target_width = default_target_width.max(1);

		self
	}

	/// Setters clamp, but a deserialized config may still carry zeros.
	pub const fn validate(&self) -> Result<(), Error> {
		if self.max_concurrent_loads == 0 {
			return Err(Error::InvalidConfig {
				reason: "max_concurrent_loads must be at least 1",
			});
		}

		if self.default_target_width == 0 {
			return Err(Error::InvalidConfig {
				reason: "default_target_width must be at least 1",
			});
		}

		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageServiceConfig {
	max_entries: usize,
}

impl Default for ImageServiceConfig {
	fn default() -> Self {
		Self {
			max_entries: DEFAULT_MAX_CACHE_ENTRIES,
		}
	}
}

impl ImageServiceConfig {
	#[must_use]
	pub const fn max_entries(&self) -> usize {
		self.max_entries
	}

	pub fn set_max_entries(&mut self, max_entries: usize) -> &mut Self {
		self.max_entries = max_entries.max(1);

		self
	}
}
