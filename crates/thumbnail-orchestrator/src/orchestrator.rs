use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, trace, warn};

use super::{
	config::OrchestratorConfig,
	error::Error,
	owner::OwnerToken,
	request::{Completion, RequestOptions, ThumbnailRequest},
	service::{CacheStats, Thumbnail, ThumbnailService},
	worker::{spawn_dispatcher, Shared},
};

/// Coordinates many concurrent thumbnail requests on top of a [`ThumbnailService`].
///
/// Cache hits are answered synchronously. Misses wait in a priority queue until one of the
/// `max_concurrent_loads` slots frees up. Requests of the [active owner](Self::set_active_owner)
/// jump ahead of everything but older critical work, and every request resolves exactly once,
/// with `None` whenever it was cancelled, failed or the orchestrator went away.
pub struct ThumbnailOrchestrator {
	shared: Arc<Shared>,
	config: OrchestratorConfig,
	dispatcher_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThumbnailOrchestrator {
	/// Creates an orchestrator with the default configuration.
	///
	/// # Panics
	///
	/// Must be called from within a Tokio runtime, as it spawns the dispatch loop.
	pub fn new(service: Arc<dyn ThumbnailService>) -> Self {
		Self::build(service, OrchestratorConfig::default())
	}

	/// # Panics
	///
	/// Must be called from within a Tokio runtime, as it spawns the dispatch loop.
	pub fn with_config(
		service: Arc<dyn ThumbnailService>,
		config: OrchestratorConfig,
	) -> Result<Self, Error> {
		config.validate()?;

		Ok(Self::build(service, config))
	}

	fn build(service: Arc<dyn ThumbnailService>, config: OrchestratorConfig) -> Self {
		let shared = Arc::new(Shared::new(service, config.max_concurrent_loads()));

		let handle = spawn_dispatcher(Arc::clone(&shared));

		Self {
			shared,
			config,
			dispatcher_handle: Mutex::new(Some(handle)),
		}
	}

	#[must_use]
	pub const fn config(&self) -> &OrchestratorConfig {
		&self.config
	}

	/// Gets a thumbnail for `path`, from the cache if possible or by queueing a load.
	///
	/// Never fails: an empty path, a cancellation, a failed load or a shutdown all resolve to
	/// `None`, thumbnails being a nicety the UI can always replace with a placeholder.
	#[instrument(
		skip(self, owner, options),
		fields(owner = %owner, priority = ?options.priority)
	)]
	pub async fn request_thumbnail(
		&self,
		path: &str,
		owner: &OwnerToken,
		options: RequestOptions,
	) -> Option<Thumbnail> {
		if path.is_empty() {
			trace!("Empty path, nothing to load");
			return None;
		}

		if self.shared.is_closed() {
			trace!("Orchestrator already shut down");
			return None;
		}

		if let Some(thumbnail) = self.shared.service.try_get_cached(path) {
			trace!("Thumbnail cache hit");
			return Some(thumbnail);
		}

		let RequestOptions {
			priority,
			target_width,
			cancellation,
		} = options;

		let cancel = cancellation
			.as_ref()
			.map_or_else(CancellationToken::new, CancellationToken::child_token);

		if cancel.is_cancelled() {
			trace!("Request cancelled before being queued");
			return None;
		}

		let (completion, mut done_rx) = Completion::new();

		let Some(seq) = self.shared.enqueue(ThumbnailRequest {
			path: path.to_string(),
			owner: owner.clone(),
			priority,
			target_width: target_width
				.filter(|&width| width > 0)
				.unwrap_or_else(|| self.config.default_target_width()),
			cancel: cancel.clone(),
			completion,
		}) else {
			return None;
		};

		// If the caller drops this future, the request is cancelled instead of loading for nobody
		let _cancel_on_drop = cancel.clone().drop_guard();

		tokio::select! {
			biased;

			res = &mut done_rx => res.ok().flatten(),

			() = cancel.cancelled() => {
				trace!(%seq, "Request cancelled while waiting");
				self.shared.withdraw(seq);
				// Either we just resolved it, or it is in flight and will see the token
				done_rx.await.ok().flatten()
			}
		}
	}

	/// Marks `owner` as the foreground caller, or clears it with `None`.
	///
	/// Only affects what gets dispatched next, loads already running are left alone.
	pub fn set_active_owner(&self, owner: Option<&OwnerToken>) {
		trace!(owner = ?owner.map(OwnerToken::label), "Setting active owner");
		self.shared
			.lock()
			.registry
			.set_active_owner(owner.cloned());
	}

	#[must_use]
	pub fn active_owner(&self) -> Option<OwnerToken> {
		self.shared.lock().registry.active_owner().cloned()
	}

	/// Cancels every queued or running request of `owner`, which all resolve to `None`.
	///
	/// Returns how many requests were cancelled.
	pub fn cancel_requests(&self, owner: &OwnerToken) -> usize {
		self.shared.cancel_owner(owner)
	}

	#[must_use]
	pub fn try_get_cached(&self, path: &str) -> Option<Thumbnail> {
		self.shared.service.try_get_cached(path)
	}

	pub fn invalidate(&self, path: &str) {
		self.shared.service.invalidate(path);
	}

	pub fn clear_cache(&self) {
		self.shared.service.clear_cache();
	}

	#[must_use]
	pub fn stats(&self) -> CacheStats {
		self.shared.service.stats()
	}

	/// Requests queued but not dispatched yet.
	#[must_use]
	pub fn pending_count(&self) -> usize {
		self.shared.lock().queue.len()
	}

	/// Loads currently holding a slot, including cancelled ones the service hasn't returned from yet.
	#[must_use]
	pub fn in_flight_count(&self) -> usize {
		self.shared.lock().registry.in_flight_count()
	}

	/// Stops dispatching, resolving every outstanding request to `None`.
	///
	/// Running loads are signalled through their token and their callers answered right away, but
	/// the service calls themselves are left to return on their own.
	pub async fn shutdown(&self) {
		let maybe_handle = self
			.dispatcher_handle
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take();

		if let Some(handle) = maybe_handle {
			self.shared.close();

			if let Err(e) = handle.await {
				if e.is_panic() {
					error!(?e, "Thumbnail dispatch loop failed to shutdown;");
				}
			}

			trace!("Thumbnail orchestrator shutdown");
		} else {
			warn!("Trying to shutdown a thumbnail orchestrator that was already shutdown");
		}
	}
}

impl Drop for ThumbnailOrchestrator {
	fn drop(&mut self) {
		// Nothing to await here, closing is enough for the dispatch loop to exit by itself
		if self.shared.close() {
			trace!("Thumbnail orchestrator dropped without shutdown");
		}
	}
}
