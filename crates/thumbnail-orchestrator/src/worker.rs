use std::{
	panic::AssertUnwindSafe,
	sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::FutureExt;
use tokio::{
	spawn,
	sync::{Notify, OwnedSemaphorePermit, Semaphore},
	task::JoinHandle,
};
use tracing::{debug, error, instrument, trace, warn, Instrument};

use super::{
	owner::OwnerToken,
	queue::{PriorityQueue, QueueEntry, Sequence},
	registry::OwnerRegistry,
	request::ThumbnailRequest,
	service::ThumbnailService,
};

#[derive(Debug, Default)]
pub(crate) struct SchedulerState {
	pub(crate) queue: PriorityQueue,
	pub(crate) registry: OwnerRegistry,
	pub(crate) closed: bool,
}

/// Everything the façade and the dispatch loop share.
///
/// The queue and the active owner live under one lock, which is only held for queue and table
/// bookkeeping, never across a load.
pub(crate) struct Shared {
	state: Mutex<SchedulerState>,
	work_available: Notify,
	slots: Arc<Semaphore>,
	pub(crate) service: Arc<dyn ThumbnailService>,
}

impl Shared {
	pub(crate) fn new(service: Arc<dyn ThumbnailService>, max_concurrent_loads: usize) -> Self {
		Self {
			state: Mutex::new(SchedulerState::default()),
			work_available: Notify::new(),
			slots: Arc::new(Semaphore::new(max_concurrent_loads)),
			service,
		}
	}

	pub(crate) fn lock(&self) -> MutexGuard<'_, SchedulerState> {
		// Every critical section leaves the state consistent, so a poisoned lock is still usable
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Queues a request, or resolves it right away to `None` if we're already shut down.
	pub(crate) fn enqueue(&self, request: ThumbnailRequest) -> Option<Sequence> {
		let mut state = self.lock();

		if state.closed {
			drop(state);
			trace!("Orchestrator is shut down, refusing new request");
			request.completion.fulfill(None);
			return None;
		}

		let seq = state.queue.push(request);
		let pending = state.queue.len();
		drop(state);

		trace!(%seq, %pending, "Enqueued thumbnail request");
		self.work_available.notify_one();

		Some(seq)
	}

	/// Pulls a request out of the queue before it got dispatched, resolving it to `None`.
	pub(crate) fn withdraw(&self, seq: Sequence) -> bool {
		let Some(QueueEntry { request, .. }) = self.lock().queue.remove(seq) else {
			return false;
		};

		trace!(%seq, "Withdrew cancelled request before dispatch");
		request.cancel.cancel();
		request.completion.fulfill(None);

		true
	}

	pub(crate) fn cancel_owner(&self, owner: &OwnerToken) -> usize {
		let (waiting, running) = {
			let mut state = self.lock();
			let waiting = state.queue.drain_owner(owner);
			let running = state.registry.cancel_owner(owner);
			(waiting, running)
		};

		debug!(
			owner = %owner,
			waiting = waiting.len(),
			%running,
			"Cancelled thumbnail requests of owner"
		);

		let cancelled = waiting.len() + running;
		resolve_to_none(waiting);

		cancelled
	}

	/// Refuses new work, resolves everything queued to `None` and signals every running load.
	///
	/// Returns `false` if we were already closed.
	pub(crate) fn close(&self) -> bool {
		let waiting = {
			let mut state = self.lock();
			if state.closed {
				return false;
			}
			state.closed = true;
			state.registry.cancel_all();
			state.queue.drain()
		};

		debug!(waiting = waiting.len(), "Closing thumbnail dispatch");
		resolve_to_none(waiting);

		self.slots.close();
		self.work_available.notify_one();

		true
	}

	pub(crate) fn is_closed(&self) -> bool {
		self.lock().closed
	}

	/// Waits for the next request worth loading and marks it as in flight.
	///
	/// Requests whose token got cancelled while they waited are resolved on the way, without
	/// consuming a load slot. Returns `None` once closed.
	async fn next_entry(&self) -> Option<QueueEntry> {
		loop {
			let notified = self.work_available.notified();

			let (maybe_entry, skipped) = {
				let mut state = self.lock();
				if state.closed {
					return None;
				}

				let SchedulerState {
					queue, registry, ..
				} = &mut *state;

				let mut skipped = Vec::new();
				let mut maybe_entry = None;

				while let Some(entry) = queue.pop(registry.active_owner()) {
					if entry.request.cancel.is_cancelled() {
						skipped.push(entry);
						continue;
					}

					registry.track(
						entry.seq,
						entry.request.owner.clone(),
						entry.request.cancel.clone(),
					);
					maybe_entry = Some(entry);
					break;
				}

				(maybe_entry, skipped)
			};

			if !skipped.is_empty() {
				trace!(count = skipped.len(), "Skipped requests cancelled before dispatch");
				resolve_to_none(skipped);
			}

			if maybe_entry.is_some() {
				return maybe_entry;
			}

			notified.await;
		}
	}

	fn finish(&self, seq: Sequence) {
		self.lock().registry.release(seq);
	}
}

fn resolve_to_none(entries: Vec<QueueEntry>) {
	for QueueEntry { request, .. } in entries {
		request.cancel.cancel();
		request.completion.fulfill(None);
	}
}

/// Spawns the dispatch loop, restarting it if it ever panics.
pub(crate) fn spawn_dispatcher(shared: Arc<Shared>) -> JoinHandle<()> {
	spawn(
		async move {
			trace!("Thumbnail dispatch loop starting...");
			while let Err(e) = spawn(dispatch(Arc::clone(&shared)).in_current_span()).await {
				if e.is_panic() {
					error!(?e, "Thumbnail dispatch loop critically failed and will restart;");
				} else {
					trace!("Thumbnail dispatch loop was aborted");
					break;
				}
			}

			debug!("Thumbnail dispatch loop gracefully shutdown");
		}
		.in_current_span(),
	)
}

async fn dispatch(shared: Arc<Shared>) {
	loop {
		// A slot is taken before picking an entry, so the pick happens as late as possible and
		// sees the freshest active owner
		let Ok(permit) = Arc::clone(&shared.slots).acquire_owned().await else {
			trace!("Load slots closed, dispatch loop exiting");
			return;
		};

		let Some(QueueEntry { seq, request }) = shared.next_entry().await else {
			trace!("Queue closed, dispatch loop exiting");
			return;
		};

		debug!(
			%seq,
			path = %request.path,
			owner = %request.owner,
			priority = ?request.priority,
			"Dispatching thumbnail load"
		);

		spawn(load(Arc::clone(&shared), seq, request, permit).in_current_span());
	}
}

#[instrument(
	skip(shared, request, _permit),
	fields(path = %request.path, owner = %request.owner)
)]
async fn load(
	shared: Arc<Shared>,
	seq: Sequence,
	request: ThumbnailRequest,
	_permit: OwnedSemaphorePermit,
) {
	let ThumbnailRequest {
		path,
		target_width,
		cancel,
		completion,
		..
	} = request;

	let service_load =
		AssertUnwindSafe(shared.service.load(&path, target_width, cancel.clone())).catch_unwind();
	tokio::pin!(service_load);

	let mut maybe_completion = Some(completion);

	// The service future always runs to completion, the slot stays taken until it returns
	let res = tokio::select! {
		biased;

		res = &mut service_load => res,

		() = cancel.cancelled() => {
			trace!("Thumbnail load cancelled while in flight, waiting for the service to wind down");
			if let Some(completion) = maybe_completion.take() {
				completion.fulfill(None);
			}
			service_load.await
		}
	};

	let outcome = match res {
		Ok(Ok(maybe_thumbnail)) => {
			trace!(found = maybe_thumbnail.is_some(), "Thumbnail load finished");
			maybe_thumbnail
		}
		Ok(Err(e)) if e.is_cancelled() => {
			trace!("Thumbnail service observed cancellation");
			None
		}
		Ok(Err(e)) => {
			warn!(?e, "Thumbnail load failed, resolving to no thumbnail;");
			None
		}
		Err(_) => {
			error!("Thumbnail service panicked while loading, resolving to no thumbnail");
			None
		}
	};

	shared.finish(seq);

	if let Some(completion) = maybe_completion {
		// A load that finished despite a late cancellation still doesn't count
		completion.fulfill(if cancel.is_cancelled() { None } else { outcome });
	}
	// The slot is released when `_permit` drops, after the caller was already answered
}
