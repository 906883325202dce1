use std::sync::Barrier;
use std::thread;

use proptest::prelude::*;

use super::{CAPACITY, DuplicateKey, PROBE_LIMIT, SparseIndex};

const STRIDE: u32 = CAPACITY as u32;

#[test]
fn test_empty_index_has_no_storage() {
	let index: SparseIndex<&str> = SparseIndex::new();
	assert!(index.get(0).is_none());
	assert!(index.is_empty());
	assert_eq!(index.depth(), 1);
	assert!(index.slots.get().is_none(), "slots are allocated lazily");
}

#[test]
fn test_insert_and_get_primary_slot() {
	let index = SparseIndex::new();
	index.insert(42, "answer").unwrap();
	index.insert(7, "seven").unwrap();

	assert_eq!(index.get(42), Some(&"answer"));
	assert_eq!(index.get(7), Some(&"seven"));
	assert_eq!(index.len(), 2);
	assert!(!index.contains_key(43));
}

/// Colliding keys fill the probe window in order, then spill into overflow levels.
#[test]
fn test_collisions_probe_then_overflow() {
	let index = SparseIndex::new();
	let keys: Vec<u32> = (0..10).map(|i| 5 + i * STRIDE).collect();
	for &key in &keys {
		index.insert(key, key * 2).unwrap();
	}

	let window = (PROBE_LIMIT + 1) as usize;
	assert_eq!(index.len.load(std::sync::atomic::Ordering::Relaxed), window);
	assert_eq!(index.depth(), 3, "10 colliding keys need three levels of 4");
	assert_eq!(index.len(), keys.len());

	for &key in &keys {
		assert_eq!(index.get(key), Some(&(key * 2)), "key {key} must be reachable");
	}
}

/// An empty slot in the probe sequence proves absence.
#[test]
fn test_lookup_stops_at_first_empty_slot() {
	let index = SparseIndex::new();
	index.insert(5, "a").unwrap();
	index.insert(6, "b").unwrap();

	assert!(index.get(5 + STRIDE).is_none());
	assert!(index.get(7).is_none());

	index.insert(5 + STRIDE, "c").unwrap();
	assert_eq!(index.get(5 + STRIDE), Some(&"c"));
	assert_eq!(index.depth(), 1);
}

#[test]
fn test_probe_window_wraps_around() {
	let index = SparseIndex::new();
	let keys = [126, 126 + STRIDE, 126 + 2 * STRIDE, 126 + 3 * STRIDE];
	for key in keys {
		index.insert(key, key).unwrap();
	}
	// Slots 126, 127, 0, 1 are now taken; key 0 must probe past them.
	index.insert(0, 0).unwrap();

	for key in keys.into_iter().chain([0]) {
		assert_eq!(index.get(key), Some(&key));
	}
	assert_eq!(index.depth(), 1);
}

#[test]
fn test_keys_near_u32_max_wrap_without_overflowing() {
	let index = SparseIndex::new();
	index.insert(u32::MAX, "max").unwrap();
	index.insert(u32::MAX - STRIDE, "max - stride").unwrap();

	assert_eq!(index.get(u32::MAX), Some(&"max"));
	assert_eq!(index.get(u32::MAX - STRIDE), Some(&"max - stride"));
}

#[test]
fn test_duplicate_rejected_in_primary_slot() {
	let index = SparseIndex::new();
	index.insert(9, 1).unwrap();
	assert_eq!(index.insert(9, 2), Err(DuplicateKey { key: 9 }));
	assert_eq!(index.get(9), Some(&1), "original value must survive");
	assert_eq!(index.len(), 1);
}

#[test]
fn test_duplicate_rejected_in_probe_window() {
	let index = SparseIndex::new();
	index.insert(3, ()).unwrap();
	index.insert(3 + STRIDE, ()).unwrap();
	assert_eq!(index.insert(3 + STRIDE, ()), Err(DuplicateKey { key: 3 + STRIDE }));
}

#[test]
fn test_duplicate_rejected_in_overflow() {
	let index = SparseIndex::new();
	let last = 11 + 9 * STRIDE;
	for i in 0..10 {
		index.insert(11 + i * STRIDE, i).unwrap();
	}
	let err = index.insert(last, 99).unwrap_err();
	assert_eq!(err.key, last);
	assert_eq!(err.to_string(), format!("key {last} is already present in the sparse index"));
	assert_eq!(index.get(last), Some(&9));
}

#[test]
fn test_concurrent_reads_on_populated_index() {
	let index = SparseIndex::new();
	for key in 0..2_000u32 {
		index.insert(key.wrapping_mul(37), key).unwrap();
	}

	let barrier = Barrier::new(8);
	thread::scope(|s| {
		for _ in 0..8 {
			s.spawn(|| {
				barrier.wait();
				for key in 0..2_000u32 {
					assert_eq!(index.get(key.wrapping_mul(37)), Some(&key));
				}
				assert!(index.get(2_000 * 37).is_none());
			});
		}
	});
}

/// Readers racing a single writer only ever see absent keys or complete entries.
#[test]
fn test_concurrent_reads_during_single_writer() {
	let index: SparseIndex<(u32, String)> = SparseIndex::new();
	let keys: Vec<u32> = (0..1_500u32).map(|k| (k % 64) + (k / 64) * STRIDE).collect();

	thread::scope(|s| {
		s.spawn(|| {
			for &key in &keys {
				index.insert(key, (key, format!("value-{key}"))).unwrap();
			}
		});

		for _ in 0..4 {
			s.spawn(|| {
				for _ in 0..20 {
					for &key in &keys {
						if let Some((stored, text)) = index.get(key) {
							assert_eq!(*stored, key);
							assert_eq!(*text, format!("value-{key}"));
						}
					}
				}
			});
		}
	});

	assert_eq!(index.len(), keys.len());
}

fn key_strategy() -> impl Strategy<Value = u32> {
	prop_oneof![any::<u32>(), 0u32..512, (0u32..16).prop_map(|k| 3 + k * STRIDE)]
}

proptest! {
	/// Every inserted key resolves to its own value; keys never inserted stay absent.
	#[test]
	fn prop_inserted_keys_are_retrievable(
		keys in prop::collection::hash_set(key_strategy(), 0..1000),
		probes in prop::collection::vec(any::<u32>(), 0..64),
	) {
		let index = SparseIndex::new();
		for &key in &keys {
			prop_assert!(index.insert(key, u64::from(key) + 1).is_ok());
		}

		prop_assert_eq!(index.len(), keys.len());
		for &key in &keys {
			prop_assert_eq!(index.get(key), Some(&(u64::from(key) + 1)));
		}
		for probe in probes {
			if !keys.contains(&probe) {
				prop_assert!(index.get(probe).is_none());
			}
		}
	}
}
