use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use super::{owner::OwnerToken, queue::Sequence};

#[derive(Debug)]
struct InFlight {
	owner: OwnerToken,
	cancel: CancellationToken,
}

/// Who is in the foreground, and which loads are currently running on whose behalf.
#[derive(Debug, Default)]
pub(crate) struct OwnerRegistry {
	active_owner: Option<OwnerToken>,
	in_flight: HashMap<Sequence, InFlight>,
}

impl OwnerRegistry {
	pub(crate) fn active_owner(&self) -> Option<&OwnerToken> {
		self.active_owner.as_ref()
	}

	pub(crate) fn set_active_owner(&mut self, owner: Option<OwnerToken>) {
		self.active_owner = owner;
	}

	pub(crate) fn track(&mut self, seq: Sequence, owner: OwnerToken, cancel: CancellationToken) {
		self.in_flight.insert(seq, InFlight { owner, cancel });
	}

	pub(crate) fn release(&mut self, seq: Sequence) {
		self.in_flight.remove(&seq);
	}

	/// Cancels every running load of `owner`, returning how many were signalled.
	///
	/// Cancelled loads keep their slot until the service returns, they are only counted the first
	/// time around.
	pub(crate) fn cancel_owner(&self, owner: &OwnerToken) -> usize {
		let mut cancelled = 0;

		for in_flight in self
			.in_flight
			.values()
			.filter(|in_flight| &in_flight.owner == owner && !in_flight.cancel.is_cancelled())
		{
			in_flight.cancel.cancel();
			cancelled += 1;
		}

		cancelled
	}

	pub(crate) fn cancel_all(&self) -> usize {
		let mut cancelled = 0;

		for in_flight in self
			.in_flight
			.values()
			.filter(|in_flight| !in_flight.cancel.is_cancelled())
		{
			in_flight.cancel.cancel();
			cancelled += 1;
		}

		cancelled
	}

	pub(crate) fn in_flight_count(&self) -> usize {
		self.in_flight.len()
	}
}
