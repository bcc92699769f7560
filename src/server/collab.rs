//! Collaborators the dispatcher delegates to: validation, view rendering and upload storage.

use super::component::Rules;
use crate::protocol::{Data, ErrorBag};
use hashbrown::HashSet;
use std::{collections::BTreeMap, fmt, sync::Mutex};
use tracing::warn;

/// Outcome of validating component data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
	/// The first failure message of each failing field.
	pub errors: BTreeMap<String, String>,
}

impl Validation {
	#[must_use]
	pub fn ok(&self) -> bool {
		self.errors.is_empty()
	}

	#[must_use]
	pub fn fail(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
		self.errors.entry(field.into()).or_insert_with(|| message.into());
		self
	}
}

pub trait Validator: Send + Sync {
	fn validate(&self, rules: &Rules, data: &Data) -> Validation;
}

impl<F> Validator for F
where
	F: Fn(&Rules, &Data) -> Validation + Send + Sync,
{
	fn validate(&self, rules: &Rules, data: &Data) -> Validation {
		self(rules, data)
	}
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoValidation;

impl Validator for NoValidation {
	fn validate(&self, _rules: &Rules, _data: &Data) -> Validation {
		Validation::default()
	}
}

/// Renders a component's view from its data.
pub trait ViewResolver: Send + Sync {
	/// # Errors
	///
	/// Iff the view can't be rendered. The message ends up in the turn's error.
	fn render(&self, component: &str, data: &Data, errors: &ErrorBag) -> Result<String, String>;
}

impl<F> ViewResolver for F
where
	F: Fn(&str, &Data, &ErrorBag) -> Result<String, String> + Send + Sync,
{
	fn render(&self, component: &str, data: &Data, errors: &ErrorBag) -> Result<String, String> {
		self(component, data, errors)
	}
}

/// Resolves nothing. Components must render themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoViews;

impl ViewResolver for NoViews {
	fn render(&self, component: &str, _data: &Data, _errors: &ErrorBag) -> Result<String, String> {
		Err(format!("no view registered for {:?}", component))
	}
}

/// Temporary storage for uploaded files, referenced by opaque strings.
pub trait BlobStore: Send + Sync {
	/// A one-time URL the browser uploads the file for `field` to.
	fn upload_url(&self, component_id: &str, field: &str) -> String;
	fn contains(&self, reference: &str) -> bool;
	fn remove(&self, reference: &str);
}

/// Rejects every upload.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBlobs;

impl BlobStore for NoBlobs {
	fn upload_url(&self, _component_id: &str, _field: &str) -> String {
		warn!("No blob store configured; Uploads will fail.");
		String::new()
	}

	fn contains(&self, _reference: &str) -> bool {
		false
	}

	fn remove(&self, _reference: &str) {}
}

/// Keeps references in memory. Upload endpoints call [`MemoryBlobStore::put`].
pub struct MemoryBlobStore {
	base_url: String,
	references: Mutex<HashSet<String>>,
}

impl fmt::Debug for MemoryBlobStore {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryBlobStore").field("base_url", &self.base_url).finish_non_exhaustive()
	}
}

impl MemoryBlobStore {
	#[must_use]
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			references: Mutex::new(HashSet::new()),
		}
	}

	pub fn put(&self, reference: impl Into<String>) {
		if let Ok(mut references) = self.references.lock() {
			references.insert(reference.into());
		}
	}
}

impl BlobStore for MemoryBlobStore {
	fn upload_url(&self, component_id: &str, field: &str) -> String {
		format!("{}/{}/{}", self.base_url.trim_end_matches('/'), component_id, field)
	}

	fn contains(&self, reference: &str) -> bool {
		self.references.lock().map_or(false, |references| references.contains(reference))
	}

	fn remove(&self, reference: &str) {
		if let Ok(mut references) = self.references.lock() {
			references.remove(reference);
		}
	}
}
