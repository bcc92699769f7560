//! Change detection between hydration and dehydration of a component.

use crate::protocol::Data;
use hashbrown::HashMap;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{instrument, trace};
use xxhash_rust::xxh3::xxh3_64;

/// Hashes a value through its canonical JSON serialization.
#[must_use]
pub fn hash_value(value: &Value) -> u64 {
	xxh3_64(value.to_string().as_bytes())
}

/// Flattens nested objects into dot paths. Arrays and scalars are leaves.
#[must_use]
pub fn flatten(data: &Data) -> Vec<(String, &Value)> {
	fn visit<'a>(prefix: &str, value: &'a Value, out: &mut Vec<(String, &'a Value)>) {
		match value {
			Value::Object(object) if !object.is_empty() => {
				for (key, value) in object {
					visit(&format!("{}.{}", prefix, key), value, out);
				}
			}
			_ => out.push((prefix.to_owned(), value)),
		}
	}

	let mut out = Vec::with_capacity(data.len());
	for (key, value) in data {
		visit(key, value, &mut out);
	}
	out
}

/// Remembers per-path hashes of each component between hydration and dehydration.
#[derive(Debug, Default)]
pub struct DirtyHasher {
	hashes: HashMap<String, IndexMap<String, u64>>,
}

impl DirtyHasher {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Records the state a component was hydrated with.
	#[instrument(skip(self, data))]
	pub fn hydrate(&mut self, component_id: &str, data: &Data) {
		let hashes = flatten(data).into_iter().map(|(path, value)| (path, hash_value(value))).collect();
		self.hashes.insert(component_id.to_owned(), hashes);
	}

	/// Returns the paths whose current hash differs from the recorded one.
	///
	/// Paths that didn't exist at hydration aren't reported.
	#[instrument(skip(self, data))]
	pub fn dehydrate(&mut self, component_id: &str, data: &Data) -> Vec<String> {
		let hashes = match self.hashes.get(component_id) {
			Some(hashes) => hashes,
			None => return Vec::new(),
		};
		let current: HashMap<String, u64> = flatten(data).into_iter().map(|(path, value)| (path, hash_value(value))).collect();

		let dirty: Vec<String> = hashes
			.iter()
			.filter(|(path, hash)| current.get(path.as_str()) != Some(*hash))
			.map(|(path, _)| path.clone())
			.collect();
		trace!(?dirty);
		dirty
	}

	pub fn forget(&mut self, component_id: &str) {
		self.hashes.remove(component_id);
	}
}

/// Top-level keys of `old` whose value isn't equal in `new`.
#[must_use]
pub fn snapshot_diff(old: &Data, new: &Data) -> Vec<String> {
	old.iter().filter(|(key, value)| new.get(key.as_str()) != Some(*value)).map(|(key, _)| key.clone()).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn data(value: Value) -> Data {
		value.as_object().cloned().unwrap()
	}

	#[test]
	fn flattens_objects_not_arrays() {
		let data = data(json!({"a": 1, "form": {"email": "x", "tags": [1, 2]}, "empty": {}}));
		let paths: Vec<String> = flatten(&data).into_iter().map(|(path, _)| path).collect();
		assert_eq!(paths, vec!["a", "empty", "form.email", "form.tags"]);
	}

	#[test]
	fn unchanged_is_clean() {
		let mut hasher = DirtyHasher::new();
		let data = data(json!({"count": 1, "form": {"email": "x"}}));
		hasher.hydrate("c1", &data);
		assert!(hasher.dehydrate("c1", &data).is_empty());
	}

	#[test]
	fn nested_change_reports_path() {
		let mut hasher = DirtyHasher::new();
		hasher.hydrate("c1", &data(json!({"count": 1, "form": {"email": "x", "name": "y"}})));
		let dirty = hasher.dehydrate("c1", &data(json!({"count": 1, "form": {"email": "z", "name": "y"}})));
		assert_eq!(dirty, vec!["form.email"]);
	}

	#[test]
	fn components_are_independent() {
		let mut hasher = DirtyHasher::new();
		hasher.hydrate("c1", &data(json!({"count": 1})));
		hasher.hydrate("c2", &data(json!({"count": 5})));
		assert_eq!(hasher.dehydrate("c1", &data(json!({"count": 5}))), vec!["count"]);
		assert!(hasher.dehydrate("c2", &data(json!({"count": 5}))).is_empty());
		hasher.forget("c1");
		assert!(hasher.dehydrate("c1", &data(json!({"count": 9}))).is_empty());
	}

	#[test]
	fn snapshot_policy_is_top_level() {
		let old = data(json!({"a": 1, "b": {"c": 1}}));
		let new = data(json!({"a": 1, "b": {"c": 2}}));
		assert_eq!(snapshot_diff(&old, &new), vec!["b"]);
	}
}
