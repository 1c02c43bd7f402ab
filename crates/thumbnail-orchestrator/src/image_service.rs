use std::{
	collections::{HashMap, VecDeque},
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc, Mutex, MutexGuard, PoisonError,
	},
};

use async_trait::async_trait;
use image::{imageops::FilterType, io::Reader as ImageReader, DynamicImage, GenericImageView};
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use super::{
	config::ImageServiceConfig,
	error::ServiceError,
	service::{CacheStats, Thumbnail, ThumbnailService},
};

#[derive(Debug, Default)]
struct CacheState {
	entries: HashMap<String, Thumbnail>,
	// Oldest insertion at the front, evicted first
	insertion_order: VecDeque<String>,
	bytes: u64,
	// Bumped on every invalidation, so a load that started before one doesn't store a stale image
	generation: u64,
}

impl CacheState {
	fn insert(&mut self, path: &str, thumbnail: Thumbnail, max_entries: usize) {
		self.bytes += image_bytes(&thumbnail);

		if let Some(replaced) = self.entries.insert(path.to_string(), thumbnail) {
			self.bytes = self.bytes.saturating_sub(image_bytes(&replaced));
		} else {
			self.insertion_order.push_back(path.to_string());
		}

		while self.entries.len() > max_entries {
			let Some(oldest) = self.insertion_order.pop_front() else {
				break;
			};

			if let Some(evicted) = self.entries.remove(&oldest) {
				trace!(path = %oldest, "Evicted thumbnail from cache");
				self.bytes = self.bytes.saturating_sub(image_bytes(&evicted));
			}
		}
	}

	/// Inserts unless the cache was invalidated since `seen_generation` was read.
	fn insert_if_fresh(
		&mut self,
		path: &str,
		thumbnail: Thumbnail,
		seen_generation: u64,
		max_entries: usize,
	) -> bool {
		if self.generation != seen_generation {
			return false;
		}

		self.insert(path, thumbnail, max_entries);

		true
	}

	fn remove(&mut self, path: &str) -> bool {
		self.generation += 1;

		let Some(removed) = self.entries.remove(path) else {
			return false;
		};

		self.bytes = self.bytes.saturating_sub(image_bytes(&removed));
		self.insertion_order.retain(|cached| cached != path);

		true
	}

	fn clear(&mut self) {
		self.generation += 1;
		self.entries.clear();
		self.insertion_order.clear();
		self.bytes = 0;
	}
}

fn image_bytes(image: &DynamicImage) -> u64 {
	image.as_bytes().len() as u64
}

/// In-memory thumbnail cache backed by the [`image`](https://docs.rs/image) crate decoders.
#[derive(Debug, Default)]
pub struct ImageThumbnailService {
	config: ImageServiceConfig,
	cache: Mutex<CacheState>,
	hits: AtomicU64,
}

impl ImageThumbnailService {
	#[must_use]
	pub fn new(config: ImageServiceConfig) -> Self {
		Self {
			config,
			cache: Mutex::default(),
			hits: AtomicU64::new(0),
		}
	}

	fn cache(&self) -> MutexGuard<'_, CacheState> {
		self.cache.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

#[async_trait]
impl ThumbnailService for ImageThumbnailService {
	fn try_get_cached(&self, path: &str) -> Option<Thumbnail> {
		let maybe_thumbnail = self.cache().entries.get(path).map(Arc::clone);

		if maybe_thumbnail.is_some() {
			self.hits.fetch_add(1, Ordering::Relaxed);
		}

		maybe_thumbnail
	}

	#[instrument(skip(self, cancel))]
	async fn load(
		&self,
		path: &str,
		target_width: u32,
		cancel: CancellationToken,
	) -> Result<Option<Thumbnail>, ServiceError> {
		if cancel.is_cancelled() {
			return Err(ServiceError::Cancelled);
		}

		// Someone else may have loaded it while this request waited in the queue
		let (maybe_cached, seen_generation) = {
			let cache = self.cache();
			(cache.entries.get(path).map(Arc::clone), cache.generation)
		};
		if let Some(thumbnail) = maybe_cached {
			trace!("Thumbnail was cached while waiting");
			return Ok(Some(thumbnail));
		}

		let file_path = PathBuf::from(path);

		// Decoding can't be interrupted, the load slot stays taken until the blocking pool is done
		let thumbnail = Arc::new(
			spawn_blocking(move || generate_thumbnail(&file_path, target_width)).await??,
		);

		debug!(
			width = thumbnail.width(),
			height = thumbnail.height(),
			"Generated thumbnail"
		);

		if !self.cache().insert_if_fresh(
			path,
			Arc::clone(&thumbnail),
			seen_generation,
			self.config.max_entries(),
		) {
			trace!("Cache was invalidated while decoding, not storing thumbnail");
		}

		if cancel.is_cancelled() {
			return Err(ServiceError::Cancelled);
		}

		Ok(Some(thumbnail))
	}

	fn invalidate(&self, path: &str) {
		if self.cache().remove(path) {
			trace!(%path, "Invalidated cached thumbnail");
		}
	}

	fn clear_cache(&self) {
		self.cache().clear();
	}

	fn stats(&self) -> CacheStats {
		let cache = self.cache();

		CacheStats {
			entry_count: cache.entries.len(),
			hit_count: self.hits.load(Ordering::Relaxed),
			approximate_bytes: cache.bytes,
		}
	}
}

/// Decodes the image and shrinks it to `target_width`, keeping its aspect ratio.
/// Images already narrower than that are kept as they are.
fn generate_thumbnail(path: &Path, target_width: u32) -> Result<DynamicImage, ServiceError> {
	let image = ImageReader::open(path)
		.map_err(|e| ServiceError::file_io(path, e))?
		.with_guessed_format()
		.map_err(|e| ServiceError::file_io(path, e))?
		.decode()
		.map_err(|e| ServiceError::decode(path, e))?;

	let (width, height) = image.dimensions();

	if width <= target_width {
		return Ok(image);
	}

	Ok(image.resize_exact(
		target_width,
		scaled_height(width, height, target_width),
		FilterType::Triangle,
	))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
	let scaled = f64::from(height) * f64::from(target_width) / f64::from(width);

	(scaled.round() as u32).max(1)
}
