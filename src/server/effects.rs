//! Accumulates side effects during a turn.

use crate::protocol::{BrowserDispatch, Effects, EventRecord};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{instrument, trace, warn};

#[derive(Debug, Default)]
pub struct EffectCompiler {
	emits: Vec<EventRecord>,
	dispatches: Vec<BrowserDispatch>,
	returns: BTreeMap<String, Value>,
	redirect: Option<String>,
	navigate: Option<String>,
}

impl EffectCompiler {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends an event in emission order.
	pub fn emit(&mut self, record: EventRecord) -> &mut EventRecord {
		self.emits.push(record);
		let last = self.emits.len() - 1;
		&mut self.emits[last]
	}

	pub fn dispatch(&mut self, event: String, data: Value) {
		self.dispatches.push(BrowserDispatch { event, data });
	}

	/// Later redirects win.
	pub fn redirect(&mut self, url: String) {
		if let Some(previous) = self.redirect.replace(url) {
			trace!(previous = previous.as_str(), "Redirect replaced");
		}
	}

	pub fn navigate(&mut self, url: String) {
		self.navigate = Some(url);
	}

	pub fn record_return(&mut self, action_id: &str, value: Value) {
		if value.is_null() {
			return;
		}
		if self.returns.insert(action_id.to_owned(), value).is_some() {
			warn!(action_id, "Duplicate action id; Earlier return value dropped.");
		}
	}

	/// Whether a redirect was requested so far.
	#[must_use]
	pub fn redirects(&self) -> bool {
		self.redirect.is_some()
	}

	/// Builds the effects record. `html` is attached by the caller.
	#[instrument(skip(self, dirty, listeners))]
	#[must_use]
	pub fn compile(self, dirty: Vec<String>, listeners: Vec<String>) -> Effects {
		trace!(emits = self.emits.len(), dispatches = self.dispatches.len(), dirty = dirty.len());
		Effects {
			html: None,
			dirty,
			emits: self.emits,
			listeners,
			dispatches: self.dispatches,
			returns: self.returns,
			redirect: self.redirect,
			navigate: self.navigate,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn keeps_order_and_modifiers() {
		let mut effects = EffectCompiler::new();
		effects.emit(EventRecord::new("a", vec![])).up();
		effects.emit(EventRecord::new("b", vec![json!(1)])).target("cart");
		effects.dispatch("opened".into(), json!({"x": 1}));
		effects.redirect("/one".into());
		effects.redirect("/two".into());
		effects.record_return("1", json!(5));
		effects.record_return("2", Value::Null);

		let compiled = effects.compile(vec!["count".into()], vec!["refresh".into()]);
		assert_eq!(compiled.emits.iter().map(|record| record.event.as_str()).collect::<Vec<_>>(), ["a", "b"]);
		assert!(compiled.emits[0].ancestors_only);
		assert_eq!(compiled.emits[1].to.as_deref(), Some("cart"));
		assert_eq!(compiled.redirect.as_deref(), Some("/two"));
		assert_eq!(compiled.returns.len(), 1);
		assert_eq!(compiled.dirty, ["count"]);
		assert!(compiled.html.is_none());
	}
}
