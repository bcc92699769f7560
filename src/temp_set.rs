use core::hash::Hash;
use hashbrown::HashSet;

/// A reusable set for short-lived bookkeeping during a single diffing step.
#[derive(Debug)]
pub struct TempSet<T: Eq + Hash>(HashSet<T>);
impl<T: Eq + Hash> TempSet<T> {
	pub fn new() -> Self {
		Self(HashSet::new())
	}

	/// Clears the set and lends it out.
	///
	/// The collection is cleared before each borrow rather than after, so an aborted borrower can't leak values into the next one.
	pub fn temp(&mut self) -> &mut HashSet<T> {
		self.0.clear();
		&mut self.0
	}

	/// Retrieves the cache set's capacity without clearing it first.
	pub fn capacity(&self) -> usize {
		self.0.capacity()
	}
}
