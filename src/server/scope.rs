//! What a component method may touch besides its own fields.

use super::{
	collab::{BlobStore, Validator},
	component::Rules,
	effects::EffectCompiler,
};
use crate::{
	error::MethodError,
	protocol::{Data, ErrorBag, EventRecord},
};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::trace;

pub struct Scope<'a> {
	pub(crate) id: &'a str,
	pub(crate) name: &'a str,
	pub(crate) effects: &'a mut EffectCompiler,
	pub(crate) errors: &'a mut ErrorBag,
	pub(crate) rules: &'a Rules,
	pub(crate) validator: &'a dyn Validator,
	pub(crate) blobs: &'a dyn BlobStore,
}

impl<'a> Scope<'a> {
	/// Id of the component instance.
	#[must_use]
	pub fn id(&self) -> &'a str {
		self.id
	}

	/// Name of the component type.
	#[must_use]
	pub fn name(&self) -> &'a str {
		self.name
	}

	/// Emits a component event. Narrow it down with the returned record's modifiers.
	pub fn emit(&mut self, event: impl Into<String>, params: Vec<Value>) -> &mut EventRecord {
		self.effects.emit(EventRecord::new(event, params))
	}

	pub fn dispatch_browser_event(&mut self, event: impl Into<String>, data: Value) {
		self.effects.dispatch(event.into(), data);
	}

	pub fn redirect(&mut self, url: impl Into<String>) {
		self.effects.redirect(url.into());
	}

	pub fn navigate(&mut self, url: impl Into<String>) {
		self.effects.navigate(url.into());
	}

	pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
		self.errors.entry(field.into()).or_default().push(message.into());
	}

	/// Clears the whole error bag.
	pub fn reset_errors(&mut self) {
		self.errors.clear();
	}

	pub fn reset_error(&mut self, field: &str) {
		self.errors.remove(field);
	}

	#[must_use]
	pub fn errors(&self) -> &ErrorBag {
		self.errors
	}

	#[must_use]
	pub fn blobs(&self) -> &dyn BlobStore {
		self.blobs
	}

	/// Validates `data` against all of the component's rules.
	///
	/// Failing fields replace their entry in the error bag. Passing fields have theirs cleared.
	///
	/// # Errors
	///
	/// [`MethodError::Invalid`] iff any field failed. The turn continues normally in that case.
	pub fn validate(&mut self, data: &Data) -> Result<(), MethodError> {
		let rules = self.rules.clone();
		self.validate_against(&rules, data)
	}

	/// Like [`Scope::validate`], limited to `field`'s rule.
	///
	/// # Errors
	///
	/// [`MethodError::Invalid`] iff `field` failed.
	pub fn validate_only(&mut self, field: &str, data: &Data) -> Result<(), MethodError> {
		let rules: Rules = self.rules.iter().filter(|(name, _)| name.as_str() == field).map(|(name, rule)| (name.clone(), rule.clone())).collect();
		self.validate_against(&rules, data)
	}

	fn validate_against(&mut self, rules: &Rules, data: &Data) -> Result<(), MethodError> {
		let validation = self.validator.validate(rules, data);
		for field in rules.keys() {
			match validation.errors.get(field) {
				Some(message) => {
					self.errors.insert(field.clone(), vec![message.clone()]);
				}
				None => {
					self.errors.remove(field);
				}
			}
		}
		if validation.ok() {
			Ok(())
		} else {
			trace!(failed = validation.errors.len(), "Validation failed");
			Err(MethodError::Invalid(validation.errors.into_iter().collect::<BTreeMap<_, _>>()))
		}
	}
}
