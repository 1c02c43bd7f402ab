use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::error::ServiceError;

/// A decoded, already resized preview image. Shared, as the cache keeps its own reference.
pub type Thumbnail = Arc<DynamicImage>;

/// Point-in-time snapshot of a thumbnail cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
	pub entry_count: usize,
	pub hit_count: u64,
	pub approximate_bytes: u64,
}

/// The decode and cache capability the orchestrator schedules work onto.
///
/// Implementations synchronize their cache internally: the orchestrator calls the probe and the
/// pass-through methods from any thread without holding any lock of its own.
///
/// We're using the [`async_trait`](https://docs.rs/async-trait) crate so the orchestrator can
/// hold any service behind a `dyn` pointer.
#[async_trait]
pub trait ThumbnailService: Send + Sync + 'static {
	/// Synchronous cache probe, it must never decode.
	fn try_get_cached(&self, path: &str) -> Option<Thumbnail>;

	/// Decodes the image at `path`, resizes it to `target_width` and caches the result.
	///
	/// `cancel` is signalled when nobody wants the result anymore; honoring it is optional but
	/// frees the load slot sooner. `Ok(None)` means there is no thumbnail for this path.
	async fn load(
		&self,
		path: &str,
		target_width: u32,
		cancel: CancellationToken,
	) -> Result<Option<Thumbnail>, ServiceError>;

	fn invalidate(&self, path: &str);

	fn clear_cache(&self);

	fn stats(&self) -> CacheStats;
}
