//! This module provides a generic bounded cache that stores key-value pairs up
//! to a fixed number of entries.
//!
//! The `LimitedCache` keeps entries in least-recently-used order: every hit
//! moves the entry to the most-recently-used position, and inserting beyond the
//! capacity evicts from the oldest end. Chunk, mask and tile caches all share
//! this one abstraction with their capacity set at construction.

use lru::LruCache;
use std::{fmt::Debug, hash::Hash, num::NonZeroUsize};

/// A bounded key-value cache with least-recently-used eviction.
///
/// # Examples
///
/// ```rust
/// use sarstream_core::LimitedCache;
///
/// let mut cache = LimitedCache::<u32, u64>::with_capacity(2);
/// cache.add(1, 100);
/// cache.add(2, 200);
/// cache.add(3, 300); // evicts key 1
/// assert_eq!(cache.get(&1), None);
/// assert_eq!(cache.get(&3), Some(300));
/// ```
pub struct LimitedCache<K, V> {
	cache: LruCache<K, V>,
}

impl<K, V> LimitedCache<K, V>
where
	K: Clone + Debug + Eq + Hash,
	V: Clone,
{
	/// Creates a new `LimitedCache` holding at most `capacity` entries.
	///
	/// # Panics
	/// Panics if `capacity` is zero.
	#[must_use]
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			cache: LruCache::new(NonZeroUsize::new(capacity).expect("cache capacity must be non-zero")),
		}
	}

	/// Retrieves a cloned value by key, marking the entry as most recently used.
	pub fn get(&mut self, key: &K) -> Option<V> {
		self.cache.get(key).cloned()
	}

	/// Returns whether the key is present, without touching the access order.
	pub fn contains(&self, key: &K) -> bool {
		self.cache.contains(key)
	}

	/// Adds a `key -> value` pair, evicting the least recently used entry when
	/// at capacity, and returns the inserted value.
	pub fn add(&mut self, key: K, value: V) -> V {
		let cloned = value.clone();
		self.cache.put(key, value);
		cloned
	}

	/// Returns the current number of entries.
	pub fn len(&self) -> usize {
		self.cache.len()
	}

	/// Returns `true` when the cache holds no entries.
	pub fn is_empty(&self) -> bool {
		self.cache.is_empty()
	}

	/// Returns the maximum number of entries.
	pub fn capacity(&self) -> usize {
		self.cache.cap().get()
	}
}

impl<K, V> Debug for LimitedCache<K, V>
where
	K: Clone + Debug + Eq + Hash,
	V: Clone,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LimitedCache")
			.field("length", &self.len())
			.field("capacity", &self.capacity())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::LimitedCache;

	#[test]
	fn test_add_and_get() {
		let mut cache = LimitedCache::with_capacity(10);
		cache.add(1, 100);
		cache.add(2, 200);

		assert_eq!(cache.get(&1), Some(100));
		assert_eq!(cache.get(&2), Some(200));
		assert_eq!(cache.get(&3), None);
		assert_eq!(cache.len(), 2);
	}

	#[test]
	fn test_lru_eviction() {
		let mut cache: LimitedCache<u64, u64> = LimitedCache::with_capacity(5);
		for i in 0..5 {
			cache.add(i, i * 100);
		}

		// Touch item 0 so item 1 becomes the LRU candidate
		let _ = cache.get(&0);
		cache.add(5, 500);

		assert_eq!(cache.len(), 5);
		assert_eq!(cache.get(&0), Some(0));
		assert_eq!(cache.get(&1), None);
		assert_eq!(cache.get(&5), Some(500));
	}

	#[test]
	fn test_access_updates_order() {
		let mut cache: LimitedCache<u64, u64> = LimitedCache::with_capacity(3);
		cache.add(1, 100);
		cache.add(2, 200);
		cache.add(3, 300);

		let _ = cache.get(&1);
		cache.add(4, 400);

		assert_eq!(cache.get(&1), Some(100));
		assert_eq!(cache.get(&2), None);
		assert_eq!(cache.get(&3), Some(300));
		assert_eq!(cache.get(&4), Some(400));
	}

	#[test]
	fn test_contains_does_not_touch_order() {
		let mut cache: LimitedCache<u64, u64> = LimitedCache::with_capacity(2);
		cache.add(1, 100);
		cache.add(2, 200);

		assert!(cache.contains(&1));
		// Key 1 was only peeked at, so it is still the eviction candidate
		cache.add(3, 300);
		assert_eq!(cache.get(&1), None);
	}

	#[test]
	fn test_capacity_is_exact_bound() {
		let mut cache: LimitedCache<u64, u64> = LimitedCache::with_capacity(4);
		for i in 0..20 {
			cache.add(i, i);
		}
		assert_eq!(cache.len(), 4);
		assert_eq!(cache.capacity(), 4);
		// Most recently inserted entry is present
		assert_eq!(cache.get(&19), Some(19));
	}

	#[test]
	#[should_panic(expected = "capacity")]
	fn test_zero_capacity_panics() {
		let _cache: LimitedCache<u8, u8> = LimitedCache::with_capacity(0);
	}

	#[test]
	fn test_debug_format() {
		let cache: LimitedCache<u8, u8> = LimitedCache::with_capacity(10);
		let debug_str = format!("{cache:?}");
		assert!(debug_str.contains("LimitedCache"));
		assert!(debug_str.contains("capacity"));
	}
}
