use std::fmt;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{owner::OwnerToken, priority::Priority, service::Thumbnail};

/// Per-call knobs for [`ThumbnailOrchestrator::request_thumbnail`](crate::ThumbnailOrchestrator::request_thumbnail).
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
	pub priority: Priority,
	/// Falls back to the orchestrator's configured default when `None` or zero.
	pub target_width: Option<u32>,
	pub cancellation: Option<CancellationToken>,
}

impl RequestOptions {
	#[must_use]
	pub const fn with_priority(mut self, priority: Priority) -> Self {
		self.priority = priority;
		self
	}

	#[must_use]
	pub const fn with_target_width(mut self, target_width: u32) -> Self {
		self.target_width = Some(target_width);
		self
	}

	#[must_use]
	pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
		self.cancellation = Some(cancellation);
		self
	}
}

pub(crate) struct ThumbnailRequest {
	pub(crate) path: String,
	pub(crate) owner: OwnerToken,
	pub(crate) priority: Priority,
	pub(crate) target_width: u32,
	/// Internal token, a child of the caller's token when one was given.
	pub(crate) cancel: CancellationToken,
	pub(crate) completion: Completion,
}

impl fmt::Debug for ThumbnailRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ThumbnailRequest")
			.field("path", &self.path)
			.field("owner", &self.owner)
			.field("priority", &self.priority)
			.field("target_width", &self.target_width)
			.field("cancelled", &self.cancel.is_cancelled())
			.finish_non_exhaustive()
	}
}

/// Single-fulfillment completion handle.
///
/// Dropping it unfulfilled resolves the waiting caller to `None`, so a request can never be
/// left hanging, whatever path it took through the orchestrator.
#[derive(Debug)]
pub(crate) struct Completion {
	maybe_done_tx: Option<oneshot::Sender<Option<Thumbnail>>>,
}

impl Completion {
	pub(crate) fn new() -> (Self, oneshot::Receiver<Option<Thumbnail>>) {
		let (done_tx, done_rx) = oneshot::channel();

		(
			Self {
				maybe_done_tx: Some(done_tx),
			},
			done_rx,
		)
	}

	pub(crate) fn fulfill(mut self, outcome: Option<Thumbnail>) {
		self.send(outcome);
	}

	fn send(&mut self, outcome: Option<Thumbnail>) {
		if let Some(done_tx) = self.maybe_done_tx.take() {
			if done_tx.send(outcome).is_err() {
				trace!("Thumbnail requester went away before the request resolved");
			}
		}
	}
}

impl Drop for Completion {
	fn drop(&mut self) {
		self.send(None);
	}
}
