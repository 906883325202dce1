//! Small sparse write-once index keyed by `u32`.
//!
//! # Purpose
//!
//! [`SparseIndex`] maps densely clustered integer identities (contract keys, sharing ids)
//! to values. It trades a general-purpose hash table for a fixed array of
//! [`CAPACITY`] slots with a short linear probe, chaining a nested index of the same
//! shape when the probe window is exhausted.
//!
//! # Mental Model
//!
//! 1. **Primary slot:** a key lands at `key & 127`.
//! 2. **Probe window:** if occupied, the next [`PROBE_LIMIT`] slots (wrapping) are tried.
//! 3. **Overflow:** if the whole window is occupied, the key goes to a lazily created
//!    overflow level, which follows the same rules.
//!
//! Lookup walks the identical sequence and stops at the first empty slot: insertion never
//! skips an empty slot, so an empty slot proves absence without consulting the overflow.
//!
//! # Concurrency
//!
//! - **Reads:** always safe, including while a write is in progress. Slots are
//!   [`OnceLock`]s, so a reader observes either an empty slot or a fully formed entry.
//! - **Writes:** intended for one writer at a time (a build phase, or callers holding an
//!   external lock). Racing writers cannot corrupt the structure; a writer that loses a
//!   slot simply moves on along the probe sequence.
//!
//! # Invariants
//!
//! - A key is present at most once across all levels.
//!   - Enforced in: [`SparseIndex::insert`] (duplicate check on every probed slot).
//!   - Tested by: `tests::test_duplicate_rejected_in_overflow`
//! - A slot, once written, is never mutated or removed.
//!   - Enforced in: slot type (`OnceLock`).
//!   - Tested by: `tests::test_concurrent_reads_during_single_writer`

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of local slots per level.
pub const CAPACITY: usize = 128;

/// Number of alternate slots probed after the primary slot.
pub const PROBE_LIMIT: u32 = 3;

const SLOT_MASK: u32 = CAPACITY as u32 - 1;

/// Returned by [`SparseIndex::insert`] when the key was already added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("key {key} is already present in the sparse index")]
pub struct DuplicateKey {
	/// The rejected key.
	pub key: u32,
}

struct Entry<V> {
	key: u32,
	value: V,
}

/// Fixed-capacity, open-addressed, write-once map from `u32` keys to values.
pub struct SparseIndex<V> {
	slots: OnceLock<Box<[OnceLock<Entry<V>>]>>,
	overflow: OnceLock<Box<SparseIndex<V>>>,
	len: AtomicUsize,
}

impl<V> Default for SparseIndex<V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<V> SparseIndex<V> {
	/// Creates an empty index. No slot storage is allocated until the first insertion.
	pub const fn new() -> Self {
		Self {
			slots: OnceLock::new(),
			overflow: OnceLock::new(),
			len: AtomicUsize::new(0),
		}
	}

	/// Inserts `value` under `key`.
	///
	/// Fails with [`DuplicateKey`] if `key` was added before; the index is left unchanged.
	pub fn insert(&self, key: u32, value: V) -> Result<(), DuplicateKey> {
		let mut level = self;
		let mut value = value;
		let mut depth = 0usize;

		loop {
			match level.insert_local(key, value)? {
				None => return Ok(()),
				Some(rejected) => value = rejected,
			}

			depth += 1;
			level = &**level.overflow.get_or_init(|| {
				tracing::trace!(key, depth, "sparse_index.overflow");
				Box::new(SparseIndex::new())
			});
		}
	}

	/// Tries to place the entry within this level's probe window.
	///
	/// Returns the value back when the window is full.
	fn insert_local(&self, key: u32, value: V) -> Result<Option<V>, DuplicateKey> {
		let slots = self.slots.get_or_init(new_slots);
		let mut entry = Entry { key, value };

		for offset in 0..=PROBE_LIMIT {
			let slot = &slots[slot_index(key, offset)];
			if slot.get().is_none() {
				match slot.set(entry) {
					Ok(()) => {
						self.len.fetch_add(1, Ordering::Relaxed);
						return Ok(None);
					}
					// Lost the slot to a concurrent writer; inspect what it wrote.
					Err(rejected) => entry = rejected,
				}
			}

			if slot.get().is_some_and(|existing| existing.key == key) {
				return Err(DuplicateKey { key });
			}
		}

		Ok(Some(entry.value))
	}

	/// Looks up the value stored under `key`.
	pub fn get(&self, key: u32) -> Option<&V> {
		let mut level = self;
		loop {
			let slots = level.slots.get()?;
			for offset in 0..=PROBE_LIMIT {
				let entry = slots[slot_index(key, offset)].get()?;
				if entry.key == key {
					return Some(&entry.value);
				}
			}
			level = &**level.overflow.get()?;
		}
	}

	/// Returns true if `key` has been inserted.
	#[inline]
	pub fn contains_key(&self, key: u32) -> bool {
		self.get(key).is_some()
	}

	/// Returns the number of entries across all levels.
	pub fn len(&self) -> usize {
		self.levels().map(|level| level.len.load(Ordering::Relaxed)).sum()
	}

	/// Returns true if nothing has been inserted.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns the number of chained levels, including this one.
	pub fn depth(&self) -> usize {
		self.levels().count()
	}

	fn levels(&self) -> impl Iterator<Item = &SparseIndex<V>> + '_ {
		std::iter::successors(Some(self), |&level| level.overflow.get().map(|b| &**b))
	}
}

impl<V> fmt::Debug for SparseIndex<V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SparseIndex")
			.field("len", &self.len())
			.field("depth", &self.depth())
			.finish()
	}
}

fn new_slots<V>() -> Box<[OnceLock<Entry<V>>]> {
	(0..CAPACITY).map(|_| OnceLock::new()).collect()
}

#[inline]
fn slot_index(key: u32, offset: u32) -> usize {
	(key.wrapping_add(offset) & SLOT_MASK) as usize
}

#[cfg(test)]
mod tests;
