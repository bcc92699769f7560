//! Server-side component definitions and their capability tables.
//!
//! A component exposes exactly what its [`Capabilities`] table lists: named fields with typed
//! accessors, named method handlers and event listeners. Nothing else is reachable from a request.

use super::scope::Scope;
use crate::{
	error::{FieldError, MethodError},
	protocol::{data_set, Data, ErrorBag},
};
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{fmt, sync::Arc};
use tracing::{error, warn};

/// Validation rules by field name. Their syntax is up to the [`super::Validator`].
pub type Rules = IndexMap<String, String>;

/// Lifecycle hook names. These (and `updating…`/`updated…`/`hydrate…`/`dehydrate…` variants) are never callable.
pub const RESERVED_METHODS: &[&str] = &["mount", "hydrate", "dehydrate", "updating", "updated", "render", "rules", "capabilities"];

#[must_use]
pub fn is_reserved(method: &str) -> bool {
	RESERVED_METHODS.contains(&method) || ["updating", "updated", "hydrate", "dehydrate"].iter().any(|prefix| method.starts_with(prefix))
}

pub trait Component: Default + 'static {
	/// Routing name, also used to resolve the default view.
	const NAME: &'static str;

	fn capabilities() -> Capabilities<Self>;

	fn rules(&self) -> Rules {
		Rules::new()
	}

	/// Runs once, on the initial render, after `params` were copied into matching fields.
	#[allow(unused_variables)]
	fn mount(&mut self, params: &Data, scope: &mut Scope<'_>) -> Result<(), MethodError> {
		Ok(())
	}

	/// Runs at the start of every turn, after the snapshot was restored.
	fn hydrate(&mut self) {}

	/// Runs after a field was written by the client.
	#[allow(unused_variables)]
	fn updated(&mut self, field: &str, scope: &mut Scope<'_>) {}

	/// Runs before the snapshot is taken at the end of a turn.
	fn dehydrate(&mut self) {}

	/// Custom markup. `None` falls back to the dispatcher's view resolver.
	#[allow(unused_variables)]
	fn render(&self, errors: &ErrorBag) -> Option<String> {
		None
	}
}

type Getter<C> = Box<dyn Fn(&C) -> Value + Send + Sync>;
type Setter<C> = Box<dyn Fn(&mut C, Value) -> Result<(), String> + Send + Sync>;
type Handler<C> = Box<dyn Fn(&mut C, &mut Scope<'_>, Args) -> Result<Value, MethodError> + Send + Sync>;

struct Field<C> {
	get: Getter<C>,
	set: Setter<C>,
}

pub struct Capabilities<C> {
	fields: IndexMap<&'static str, Field<C>>,
	methods: IndexMap<&'static str, Handler<C>>,
	listeners: IndexMap<String, &'static str>,
	uploads: bool,
}

impl<C> fmt::Debug for Capabilities<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Capabilities")
			.field("fields", &self.fields.keys().collect::<Vec<_>>())
			.field("methods", &self.methods.keys().collect::<Vec<_>>())
			.field("listeners", &self.listeners)
			.field("uploads", &self.uploads)
			.finish()
	}
}

impl<C: 'static> Default for Capabilities<C> {
	fn default() -> Self {
		Self::new()
	}
}

impl<C: 'static> Capabilities<C> {
	#[must_use]
	pub fn new() -> Self {
		Self {
			fields: IndexMap::new(),
			methods: IndexMap::new(),
			listeners: IndexMap::new(),
			uploads: false,
		}
	}

	/// Exposes a public field.
	#[must_use]
	pub fn field<T>(mut self, name: &'static str, get: fn(&C) -> &T, set: fn(&mut C) -> &mut T) -> Self
	where
		T: Serialize + DeserializeOwned + 'static,
	{
		self.fields.insert(
			name,
			Field {
				get: Box::new(move |component| {
					serde_json::to_value(get(component)).unwrap_or_else(|error| {
						error!("Field {:?} could not be serialized: {}", name, error);
						Value::Null
					})
				}),
				set: Box::new(move |component, value| {
					*set(component) = serde_json::from_value(value).map_err(|error| error.to_string())?;
					Ok(())
				}),
			},
		);
		self
	}

	/// Exposes a callable method.
	#[must_use]
	pub fn method<F>(mut self, name: &'static str, handler: F) -> Self
	where
		F: Fn(&mut C, &mut Scope<'_>, Args) -> Result<Value, MethodError> + Send + Sync + 'static,
	{
		if is_reserved(name) || name.starts_with('$') {
			error!("{:?} is a reserved method name and can't be exposed; Ignoring it.", name);
			return self;
		}
		self.methods.insert(name, Box::new(handler));
		self
	}

	/// Routes the component event `event` to `method`.
	#[must_use]
	pub fn listen(mut self, event: impl Into<String>, method: &'static str) -> Self {
		let event = event.into();
		if !self.methods.contains_key(method) {
			warn!("Listener for {:?} names method {:?}, which isn't exposed (yet).", event, method);
		}
		self.listeners.insert(event, method);
		self
	}

	/// Enables the upload pseudo-methods.
	#[must_use]
	pub fn with_uploads(mut self) -> Self {
		self.uploads = true;
		self
	}
}

/// Positional method arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Value>);

impl Args {
	#[must_use]
	pub fn new(values: Vec<Value>) -> Self {
		Self(values)
	}

	/// # Errors
	///
	/// Iff the argument is missing or doesn't deserialize into `T`.
	pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, MethodError> {
		let value = self.0.get(index).ok_or_else(|| MethodError::Argument {
			index,
			message: "missing".to_owned(),
		})?;
		serde_json::from_value(value.clone()).map_err(|error| MethodError::Argument { index, message: error.to_string() })
	}

	/// Like [`Args::get`], but a missing argument yields `default`.
	///
	/// # Errors
	///
	/// Iff the argument is present but doesn't deserialize into `T`.
	pub fn get_or<T: DeserializeOwned>(&self, index: usize, default: T) -> Result<T, MethodError> {
		if index < self.0.len() {
			self.get(index)
		} else {
			Ok(default)
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	#[must_use]
	pub fn into_inner(self) -> Vec<Value> {
		self.0
	}
}

/// A type-erased component instance for one turn.
pub(crate) trait Instance {
	fn name(&self) -> &'static str;
	fn has_field(&self, field: &str) -> bool;
	fn get(&self, path: &str) -> Option<Value>;
	fn set(&mut self, path: &str, value: Value) -> Result<(), FieldError>;
	/// Copies known fields from `data`. Unknown keys are ignored.
	fn fill(&mut self, data: &Data) -> Result<(), FieldError>;
	fn snapshot(&self) -> Data;
	/// `None` iff no such method is exposed.
	fn call(&mut self, method: &str, scope: &mut Scope<'_>, args: Args) -> Option<Result<Value, MethodError>>;
	fn listener(&self, event: &str) -> Option<&'static str>;
	fn listeners(&self) -> Vec<String>;
	fn accepts_uploads(&self) -> bool;
	fn rules(&self) -> Rules;
	fn mount(&mut self, params: &Data, scope: &mut Scope<'_>) -> Result<(), MethodError>;
	fn hydrate(&mut self);
	fn updated(&mut self, field: &str, scope: &mut Scope<'_>);
	fn dehydrate(&mut self);
	fn render(&self, errors: &ErrorBag) -> Option<String>;
}

pub(crate) struct Live<C> {
	component: C,
	capabilities: Arc<Capabilities<C>>,
}

impl<C: Component> Live<C> {
	pub(crate) fn new(capabilities: Arc<Capabilities<C>>) -> Self {
		Self { component: C::default(), capabilities }
	}

	fn set_field(&mut self, field: &str, value: Value) -> Result<(), FieldError> {
		let slot = self.capabilities.fields.get(field).ok_or_else(|| FieldError {
			field: field.to_owned(),
			message: "no such field".to_owned(),
		})?;
		(slot.set)(&mut self.component, value).map_err(|message| FieldError { field: field.to_owned(), message })
	}
}

impl<C: Component> Instance for Live<C> {
	fn name(&self) -> &'static str {
		C::NAME
	}

	fn has_field(&self, field: &str) -> bool {
		self.capabilities.fields.contains_key(field)
	}

	fn get(&self, path: &str) -> Option<Value> {
		let mut segments = path.splitn(2, '.');
		let base = segments.next()?;
		let value = (self.capabilities.fields.get(base)?.get)(&self.component);
		match segments.next() {
			None => Some(value),
			Some(rest) => {
				let mut wrapper = Data::new();
				wrapper.insert(String::new(), value);
				crate::protocol::data_get(&wrapper, &format!(".{}", rest)).cloned()
			}
		}
	}

	fn set(&mut self, path: &str, value: Value) -> Result<(), FieldError> {
		match path.split_once('.') {
			None => self.set_field(path, value),
			Some((base, rest)) => {
				let mut current = self.get(base).ok_or_else(|| FieldError {
					field: base.to_owned(),
					message: "no such field".to_owned(),
				})?;
				data_set(&mut current, rest, value);
				self.set_field(base, current)
			}
		}
	}

	fn fill(&mut self, data: &Data) -> Result<(), FieldError> {
		for (field, value) in data {
			if self.has_field(field) {
				self.set_field(field, value.clone())?;
			}
		}
		Ok(())
	}

	fn snapshot(&self) -> Data {
		self.capabilities.fields.iter().map(|(name, field)| ((*name).to_owned(), (field.get)(&self.component))).collect()
	}

	fn call(&mut self, method: &str, scope: &mut Scope<'_>, args: Args) -> Option<Result<Value, MethodError>> {
		let capabilities = Arc::clone(&self.capabilities);
		let handler = capabilities.methods.get(method)?;
		Some(handler(&mut self.component, scope, args))
	}

	fn listener(&self, event: &str) -> Option<&'static str> {
		self.capabilities.listeners.get(event).copied()
	}

	fn listeners(&self) -> Vec<String> {
		self.capabilities.listeners.keys().cloned().collect()
	}

	fn accepts_uploads(&self) -> bool {
		self.capabilities.uploads
	}

	fn rules(&self) -> Rules {
		self.component.rules()
	}

	fn mount(&mut self, params: &Data, scope: &mut Scope<'_>) -> Result<(), MethodError> {
		self.component.mount(params, scope)
	}

	fn hydrate(&mut self) {
		self.component.hydrate();
	}

	fn updated(&mut self, field: &str, scope: &mut Scope<'_>) {
		self.component.updated(field, scope);
	}

	fn dehydrate(&mut self) {
		self.component.dehydrate();
	}

	fn render(&self, errors: &ErrorBag) -> Option<String> {
		self.component.render(errors)
	}
}
