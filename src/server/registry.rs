//! Explicit component registration. Nothing is discovered implicitly.

use super::component::{Capabilities, Component, Instance, Live};
use indexmap::IndexMap;
use std::{fmt, sync::Arc};
use tracing::{trace, warn};

trait Factory: Send + Sync {
	fn create(&self) -> Box<dyn Instance>;
}

struct Typed<C> {
	capabilities: Arc<Capabilities<C>>,
}

impl<C: Component> Factory for Typed<C> {
	fn create(&self) -> Box<dyn Instance> {
		Box::new(Live::new(Arc::clone(&self.capabilities)))
	}
}

/// Component types by (ASCII-lowercased) name.
#[derive(Default)]
pub struct Registry {
	factories: IndexMap<String, Box<dyn Factory>>,
}

impl fmt::Debug for Registry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Registry").field(&self.factories.keys().collect::<Vec<_>>()).finish()
	}
}

impl Registry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `C` under [`Component::NAME`]. The capability table is built once, here.
	#[must_use]
	pub fn register<C: Component>(mut self) -> Self {
		let name = C::NAME.to_ascii_lowercase();
		trace!(name = name.as_str(), "Registering component");
		let factory = Typed { capabilities: Arc::new(C::capabilities()) };
		if self.factories.insert(name, Box::new(factory)).is_some() {
			warn!("Component {:?} was registered twice; The later registration wins.", C::NAME);
		}
		self
	}

	#[must_use]
	pub fn contains(&self, name: &str) -> bool {
		self.factories.contains_key(&name.to_ascii_lowercase())
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.factories.keys().map(String::as_str)
	}

	pub(crate) fn instantiate(&self, name: &str) -> Option<Box<dyn Instance>> {
		self.factories.get(&name.to_ascii_lowercase()).map(|factory| factory.create())
	}
}
