#![allow(dead_code)]

use sd_thumbnail_orchestrator::{
	CacheStats, OwnerToken, RequestOptions, ServiceError, Thumbnail, ThumbnailOrchestrator,
	ThumbnailService,
};

use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use async_trait::async_trait;
use image::DynamicImage;
use tokio::{
	sync::Semaphore,
	task::{spawn_blocking, JoinHandle},
	time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
	TryGetCached(String),
	Load { path: String, target_width: u32 },
	Invalidate(String),
	ClearCache,
	Stats,
}

/// A scriptable [`ThumbnailService`] that records everything the orchestrator asks of it.
///
/// Paths starting with `fail` error out, `panic` panics and `missing` yields no thumbnail.
/// Every other load takes `delay` and, when gated, also waits for [`FakeService::release`].
#[derive(Debug, Default)]
pub struct FakeService {
	cached: Mutex<HashMap<String, Thumbnail>>,
	calls: Mutex<Vec<Call>>,
	dispatched: Mutex<Vec<String>>,
	running: AtomicUsize,
	peak: AtomicUsize,
	delay: Duration,
	gate: Option<Semaphore>,
	stats: CacheStats,
}

impl FakeService {
	pub fn instant() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn slow(delay: Duration) -> Arc<Self> {
		Arc::new(Self {
			delay,
			..Default::default()
		})
	}

	/// Loads block until the test hands out permits with [`FakeService::release`].
	pub fn gated() -> Arc<Self> {
		Arc::new(Self {
			gate: Some(Semaphore::new(0)),
			..Default::default()
		})
	}

	pub fn with_stats(stats: CacheStats) -> Arc<Self> {
		Arc::new(Self {
			stats,
			..Default::default()
		})
	}

	pub fn cache(&self, path: &str, thumbnail: Thumbnail) {
		self.cached
			.lock()
			.unwrap()
			.insert(path.to_string(), thumbnail);
	}

	pub fn release(&self, loads: usize) {
		if let Some(gate) = &self.gate {
			gate.add_permits(loads);
		}
	}

	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().unwrap().clone()
	}

	pub fn load_calls(&self) -> usize {
		self.calls()
			.iter()
			.filter(|call| matches!(call, Call::Load { .. }))
			.count()
	}

	pub fn dispatched(&self) -> Vec<String> {
		self.dispatched.lock().unwrap().clone()
	}

	pub fn peak_concurrency(&self) -> usize {
		self.peak.load(Ordering::SeqCst)
	}

	fn record(&self, call: Call) {
		self.calls.lock().unwrap().push(call);
	}
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl<'a> RunningGuard<'a> {
	fn new(running: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
		let now = running.fetch_add(1, Ordering::SeqCst) + 1;
		peak.fetch_max(now, Ordering::SeqCst);
		Self(running)
	}
}

impl Drop for RunningGuard<'_> {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::SeqCst);
	}
}

#[async_trait]
impl ThumbnailService for FakeService {
	fn try_get_cached(&self, path: &str) -> Option<Thumbnail> {
		self.record(Call::TryGetCached(path.to_string()));
		self.cached.lock().unwrap().get(path).cloned()
	}

	async fn load(
		&self,
		path: &str,
		target_width: u32,
		cancel: CancellationToken,
	) -> Result<Option<Thumbnail>, ServiceError> {
		self.record(Call::Load {
			path: path.to_string(),
			target_width,
		});
		self.dispatched.lock().unwrap().push(path.to_string());

		let _running = RunningGuard::new(&self.running, &self.peak);

		if path.starts_with("fail") {
			return Err(ServiceError::Other(format!("decoder rejected {path}")));
		}

		if path.starts_with("panic") {
			panic!("decoder exploded on {path}");
		}

		if path.starts_with("missing") {
			return Ok(None);
		}

		let work = async {
			if let Some(gate) = &self.gate {
				if let Ok(permit) = gate.acquire().await {
					permit.forget();
				}
			}
			sleep(self.delay).await;
		};

		tokio::select! {
			() = cancel.cancelled() => return Err(ServiceError::Cancelled),
			() = work => {}
		}

		Ok(Some(Arc::new(DynamicImage::new_rgba8(
			target_width,
			target_width,
		))))
	}

	fn invalidate(&self, path: &str) {
		self.record(Call::Invalidate(path.to_string()));
	}

	fn clear_cache(&self) {
		self.record(Call::ClearCache);
	}

	fn stats(&self) -> CacheStats {
		self.record(Call::Stats);
		self.stats
	}
}

/// Decodes on the blocking pool like [`ImageThumbnailService`](sd_thumbnail_orchestrator::ImageThumbnailService),
/// so a cancelled load still keeps a blocking thread busy until its decode is over.
#[derive(Debug, Default)]
pub struct BlockingService {
	decode_time: Duration,
	running: Arc<AtomicUsize>,
	peak: Arc<AtomicUsize>,
	finished: AtomicUsize,
}

impl BlockingService {
	pub fn new(decode_time: Duration) -> Arc<Self> {
		Arc::new(Self {
			decode_time,
			..Default::default()
		})
	}

	pub fn running(&self) -> usize {
		self.running.load(Ordering::SeqCst)
	}

	pub fn peak_concurrency(&self) -> usize {
		self.peak.load(Ordering::SeqCst)
	}

	pub fn finished(&self) -> usize {
		self.finished.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl ThumbnailService for BlockingService {
	fn try_get_cached(&self, _path: &str) -> Option<Thumbnail> {
		None
	}

	async fn load(
		&self,
		_path: &str,
		target_width: u32,
		cancel: CancellationToken,
	) -> Result<Option<Thumbnail>, ServiceError> {
		let (running, peak, decode_time) =
			(Arc::clone(&self.running), Arc::clone(&self.peak), self.decode_time);

		spawn_blocking(move || {
			let _running = RunningGuard::new(&running, &peak);
			std::thread::sleep(decode_time);
		})
		.await?;

		self.finished.fetch_add(1, Ordering::SeqCst);

		if cancel.is_cancelled() {
			return Err(ServiceError::Cancelled);
		}

		Ok(Some(Arc::new(DynamicImage::new_rgba8(
			target_width,
			target_width,
		))))
	}

	fn invalidate(&self, _path: &str) {}

	fn clear_cache(&self) {}

	fn stats(&self) -> CacheStats {
		CacheStats::default()
	}
}

pub fn spawn_request(
	orchestrator: &Arc<ThumbnailOrchestrator>,
	path: &str,
	owner: &OwnerToken,
	options: RequestOptions,
) -> JoinHandle<Option<Thumbnail>> {
	let orchestrator = Arc::clone(orchestrator);
	let path = path.to_string();
	let owner = owner.clone();

	tokio::spawn(async move {
		orchestrator
			.request_thumbnail(&path, &owner, options)
			.await
	})
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
	timeout(Duration::from_secs(5), async {
		while !condition() {
			sleep(Duration::from_millis(1)).await;
		}
	})
	.await
	.expect("condition was never met");
}

pub async fn resolved<T>(handle: JoinHandle<T>) -> T {
	timeout(Duration::from_secs(5), handle)
		.await
		.expect("request never resolved")
		.expect("request task panicked")
}
