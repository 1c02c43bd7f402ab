use std::{
	cmp::Reverse,
	collections::{BTreeMap, HashMap},
};

use super::{
	owner::OwnerToken,
	priority::{effective_priority, Priority},
	request::ThumbnailRequest,
};

/// Monotonically increasing number handed to each enqueued request, oldest first on ties.
pub(crate) type Sequence = u64;

#[derive(Debug)]
pub(crate) struct QueueEntry {
	pub(crate) seq: Sequence,
	pub(crate) request: ThumbnailRequest,
}

/// Requests waiting for a free load slot.
///
/// Entries are stored in one band per *requested* priority, plus an index of every entry by
/// owner. Effective priority is never stored: the active owner's entries all count as
/// [`Priority::Critical`] at pop time, so the best boosted candidate is just the oldest entry in
/// that owner's index. Changing the active owner therefore costs nothing here.
#[derive(Debug, Default)]
pub(crate) struct PriorityQueue {
	next_seq: Sequence,
	bands: [BTreeMap<Sequence, QueueEntry>; Priority::COUNT],
	by_owner: HashMap<OwnerToken, BTreeMap<Sequence, Priority>>,
}

impl PriorityQueue {
	pub(crate) fn push(&mut self, request: ThumbnailRequest) -> Sequence {
		let seq = self.next_seq;
		self.next_seq += 1;

		self.by_owner
			.entry(request.owner.clone())
			.or_default()
			.insert(seq, request.priority);

		self.bands[request.priority.index()].insert(seq, QueueEntry { seq, request });

		seq
	}

	/// Takes the entry with the highest [effective priority](effective_priority), the oldest one
	/// among equals.
	///
	/// Only band heads and the active owner's oldest entry are candidates. Whenever the active
	/// owner has anything queued its oldest entry is critical, so entries hidden behind a band head
	/// can never beat it.
	pub(crate) fn pop(&mut self, active_owner: Option<&OwnerToken>) -> Option<QueueEntry> {
		let band_heads = Priority::ALL.into_iter().filter_map(|priority| {
			self.bands[priority.index()]
				.first_key_value()
				.map(|(&seq, entry)| {
					(
						effective_priority(priority, &entry.request.owner, active_owner),
						seq,
						priority,
					)
				})
		});

		let boosted_head = active_owner.and_then(|owner| {
			self.by_owner
				.get(owner)?
				.first_key_value()
				.map(|(&seq, &priority)| {
					(effective_priority(priority, owner, active_owner), seq, priority)
				})
		});

		let (_, seq, priority) = band_heads
			.chain(boosted_head)
			.max_by_key(|&(effective, seq, _)| (effective, Reverse(seq)))?;

		self.remove_from(seq, priority)
	}

	pub(crate) fn remove(&mut self, seq: Sequence) -> Option<QueueEntry> {
		let priority = Priority::ALL
			.into_iter()
			.find(|priority| self.bands[priority.index()].contains_key(&seq))?;

		self.remove_from(seq, priority)
	}

	pub(crate) fn drain_owner(&mut self, owner: &OwnerToken) -> Vec<QueueEntry> {
		self.by_owner
			.remove(owner)
			.map(|seqs| {
				seqs.into_iter()
					.filter_map(|(seq, priority)| self.bands[priority.index()].remove(&seq))
					.collect()
			})
			.unwrap_or_default()
	}

	pub(crate) fn drain(&mut self) -> Vec<QueueEntry> {
		self.by_owner.clear();

		let mut entries = self
			.bands
			.iter_mut()
			.flat_map(|band| std::mem::take(band).into_values())
			.collect::<Vec<_>>();

		entries.sort_unstable_by_key(|entry| entry.seq);

		entries
	}

	pub(crate) fn len(&self) -> usize {
		self.bands.iter().map(BTreeMap::len).sum()
	}

	#[cfg(test)]
	pub(crate) fn is_empty(&self) -> bool {
		self.bands.iter().all(BTreeMap::is_empty)
	}

	fn remove_from(&mut self, seq: Sequence, priority: Priority) -> Option<QueueEntry> {
		let entry = self.bands[priority.index()].remove(&seq)?;

		if let Some(seqs) = self.by_owner.get_mut(&entry.request.owner) {
			seqs.remove(&seq);
			if seqs.is_empty() {
				self.by_owner.remove(&entry.request.owner);
			}
		}

		Some(entry)
	}
}
