//! A map whose entries count their users and can be drained once nobody uses them anymore.
//!
//! The client runtime keeps one browser listener per DOM event type here, shared by all components
//! whose directives need it.

use core::{
	borrow::Borrow,
	hash::{BuildHasher, Hash},
};
use hashbrown::{
	hash_map::{DefaultHashBuilder, Entry},
	HashMap,
};
use num_traits::{CheckedAdd, CheckedSub, One, Zero};
use thiserror::Error;

pub struct RcHashMap<K, C, V, S = DefaultHashBuilder>(HashMap<K, (C, V), S>)
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: BuildHasher;

impl<K, C, V, S> Default for RcHashMap<K, C, V, S>
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: Default + BuildHasher,
{
	fn default() -> Self {
		Self::new()
	}
}

impl<K, C, V, S> core::fmt::Debug for RcHashMap<K, C, V, S>
where
	K: Hash + Eq + core::fmt::Debug,
	C: CheckedAdd + CheckedSub + One + Zero + core::fmt::Debug,
	S: BuildHasher,
{
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_map().entries(self.0.iter().map(|(k, (c, _))| (k, c))).finish()
	}
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("reference count saturated")]
pub struct CountSaturatedError;

impl<K, C, V, S> RcHashMap<K, C, V, S>
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: BuildHasher,
{
	#[must_use]
	pub fn new() -> Self
	where
		S: Default,
	{
		Self(HashMap::with_hasher(S::default()))
	}

	/// Counts one more user of `k`, creating the value on first use.
	pub fn increment_or_insert_with<F: FnOnce() -> V>(&mut self, k: K, v: F) -> Result<&mut V, CountSaturatedError> {
		match self.0.entry(k) {
			Entry::Occupied(occupied) => {
				let (c, v) = occupied.into_mut();
				*c = c.checked_add(&C::one()).ok_or(CountSaturatedError)?;
				Ok(v)
			}
			Entry::Vacant(vacant) => {
				let (_, v) = vacant.insert((C::one(), v()));
				Ok(v)
			}
		}
	}

	/// Counts one user of `k` less. The entry stays until [`RcHashMap::drain_weak`].
	pub fn weak_decrement<Q: ?Sized>(&mut self, k: &Q) -> Result<Option<&mut V>, CountSaturatedError>
	where
		K: Borrow<Q>,
		Q: Eq + Hash,
	{
		match self.0.get_mut(k) {
			Some((c, v)) => {
				*c = c.checked_sub(&C::one()).ok_or(CountSaturatedError)?;
				Ok(Some(v))
			}
			None => Ok(None),
		}
	}

	/// Removes and returns every entry without users.
	pub fn drain_weak(&mut self) -> Vec<(K, V)> {
		self.0.drain_filter(|_, (c, _)| c.is_zero()).map(|(k, (_, v))| (k, v)).collect()
	}

	pub fn contains_key<Q: ?Sized>(&self, k: &Q) -> bool
	where
		K: Borrow<Q>,
		Q: Eq + Hash,
	{
		self.0.contains_key(k)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn drains_only_unused() {
		let mut map = RcHashMap::<String, u8, usize>::new();
		let mut created = 0;
		for event in ["click", "click", "input"] {
			map.increment_or_insert_with(event.to_owned(), || {
				created += 1;
				created
			})
			.unwrap();
		}
		assert_eq!(created, 2);

		assert_eq!(map.weak_decrement("click").unwrap().copied(), Some(1));
		assert!(map.drain_weak().is_empty());
		map.weak_decrement("input").unwrap();
		assert_eq!(map.drain_weak(), vec![("input".to_owned(), 2)]);
		assert!(map.contains_key("click"));
		assert_eq!(map.weak_decrement("missing").unwrap(), None);
	}

	#[test]
	fn saturation() {
		let mut map = RcHashMap::<&str, u8, ()>::new();
		map.increment_or_insert_with("a", || ()).unwrap();
		map.weak_decrement("a").unwrap();
		assert_eq!(map.weak_decrement("a"), Err(CountSaturatedError));
	}
}
