//! Named lifecycle points third-party code can subscribe to.

use super::{directives::Directive, message::Message};
use crate::{document::Document, document::NodeId, error::UnknownHook};
use hashbrown::HashMap;
use serde_json::Value;
use std::str::FromStr;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
	ComponentInitialized,
	ElementInitialized,
	ElementUpdating,
	ElementUpdated,
	ElementRemoved,
	MessageSent,
	MessageFailed,
	MessageReceived,
	MessageProcessed,
	InterceptModelSetValue,
	InterceptModelAttachListener,
	BeforeReplaceState,
	BeforePushState,
}

impl Hook {
	pub const ALL: [Hook; 13] = [
		Hook::ComponentInitialized,
		Hook::ElementInitialized,
		Hook::ElementUpdating,
		Hook::ElementUpdated,
		Hook::ElementRemoved,
		Hook::MessageSent,
		Hook::MessageFailed,
		Hook::MessageReceived,
		Hook::MessageProcessed,
		Hook::InterceptModelSetValue,
		Hook::InterceptModelAttachListener,
		Hook::BeforeReplaceState,
		Hook::BeforePushState,
	];

	#[must_use]
	pub fn name(self) -> &'static str {
		match self {
			Hook::ComponentInitialized => "component.initialized",
			Hook::ElementInitialized => "element.initialized",
			Hook::ElementUpdating => "element.updating",
			Hook::ElementUpdated => "element.updated",
			Hook::ElementRemoved => "element.removed",
			Hook::MessageSent => "message.sent",
			Hook::MessageFailed => "message.failed",
			Hook::MessageReceived => "message.received",
			Hook::MessageProcessed => "message.processed",
			Hook::InterceptModelSetValue => "interceptModelSetValue",
			Hook::InterceptModelAttachListener => "interceptModelAttachListener",
			Hook::BeforeReplaceState => "beforeReplaceState",
			Hook::BeforePushState => "beforePushState",
		}
	}
}

impl FromStr for Hook {
	type Err = UnknownHook;

	fn from_str(name: &str) -> Result<Self, Self::Err> {
		Hook::ALL.iter().copied().find(|hook| hook.name() == name).ok_or_else(|| UnknownHook(name.to_owned()))
	}
}

/// A node of freshly parsed server markup.
#[derive(Debug, Clone, Copy)]
pub struct Incoming<'a> {
	pub document: &'a Document,
	pub node: NodeId,
}

/// Arguments passed to hook callbacks. `N` is the DOM's node type.
#[derive(Debug)]
pub enum HookEvent<'a, N> {
	ComponentInitialized { component: &'a str },
	ElementInitialized { element: &'a N, component: &'a str },
	ElementUpdating { from: &'a N, to: Incoming<'a>, component: &'a str },
	ElementUpdated { element: &'a N, component: &'a str },
	ElementRemoved { element: &'a N, component: &'a str },
	MessageSent { message: &'a Message, component: &'a str },
	MessageFailed { message: &'a Message, component: &'a str, status: Option<u16> },
	MessageReceived { message: &'a Message, component: &'a str },
	MessageProcessed { message: &'a Message, component: &'a str },
	InterceptModelSetValue { element: &'a N, value: &'a Value, component: &'a str },
	InterceptModelAttachListener { element: &'a N, directive: &'a Directive, component: &'a str },
	BeforeReplaceState { url: &'a str },
	BeforePushState { url: &'a str },
}

impl<N> HookEvent<'_, N> {
	#[must_use]
	pub fn hook(&self) -> Hook {
		match self {
			HookEvent::ComponentInitialized { .. } => Hook::ComponentInitialized,
			HookEvent::ElementInitialized { .. } => Hook::ElementInitialized,
			HookEvent::ElementUpdating { .. } => Hook::ElementUpdating,
			HookEvent::ElementUpdated { .. } => Hook::ElementUpdated,
			HookEvent::ElementRemoved { .. } => Hook::ElementRemoved,
			HookEvent::MessageSent { .. } => Hook::MessageSent,
			HookEvent::MessageFailed { .. } => Hook::MessageFailed,
			HookEvent::MessageReceived { .. } => Hook::MessageReceived,
			HookEvent::MessageProcessed { .. } => Hook::MessageProcessed,
			HookEvent::InterceptModelSetValue { .. } => Hook::InterceptModelSetValue,
			HookEvent::InterceptModelAttachListener { .. } => Hook::InterceptModelAttachListener,
			HookEvent::BeforeReplaceState { .. } => Hook::BeforeReplaceState,
			HookEvent::BeforePushState { .. } => Hook::BeforePushState,
		}
	}
}

type Callback<N> = Box<dyn FnMut(&HookEvent<'_, N>)>;

/// Callbacks per hook, called synchronously in registration order.
pub struct HookBus<N> {
	callbacks: HashMap<Hook, Vec<Callback<N>>>,
}

impl<N> Default for HookBus<N> {
	fn default() -> Self {
		Self::new()
	}
}

impl<N> std::fmt::Debug for HookBus<N> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_map().entries(self.callbacks.iter().map(|(hook, callbacks)| (hook.name(), callbacks.len()))).finish()
	}
}

impl<N> HookBus<N> {
	#[must_use]
	pub fn new() -> Self {
		Self { callbacks: HashMap::new() }
	}

	pub fn register(&mut self, hook: Hook, callback: impl FnMut(&HookEvent<'_, N>) + 'static) {
		self.callbacks.entry(hook).or_insert_with(Vec::new).push(Box::new(callback));
	}

	/// # Errors
	///
	/// Iff `name` isn't one of the fixed hook names.
	pub fn register_named(&mut self, name: &str, callback: impl FnMut(&HookEvent<'_, N>) + 'static) -> Result<(), UnknownHook> {
		let hook = name.parse()?;
		self.register(hook, callback);
		Ok(())
	}

	pub fn call(&mut self, event: &HookEvent<'_, N>) {
		let hook = event.hook();
		if let Some(callbacks) = self.callbacks.get_mut(&hook) {
			trace!(hook = hook.name(), callbacks = callbacks.len(), "Calling hook");
			for callback in callbacks {
				callback(event);
			}
		}
	}

	#[must_use]
	pub fn len(&self, hook: Hook) -> usize {
		self.callbacks.get(&hook).map_or(0, Vec::len)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::{cell::RefCell, rc::Rc};

	#[test]
	fn names_round_trip() {
		for hook in Hook::ALL {
			assert_eq!(hook.name().parse::<Hook>(), Ok(hook));
		}
		assert_eq!("element.exploded".parse::<Hook>(), Err(UnknownHook("element.exploded".into())));
	}

	#[test]
	fn registration_order() {
		let log = Rc::new(RefCell::new(Vec::new()));
		let mut bus = HookBus::<NodeId>::new();
		for i in 0..3 {
			let log = Rc::clone(&log);
			bus.register(Hook::ComponentInitialized, move |event| {
				if let HookEvent::ComponentInitialized { component } = event {
					log.borrow_mut().push(format!("{}:{}", i, component));
				}
			});
		}
		assert!(bus.register_named("nope", |_| ()).is_err());
		bus.call(&HookEvent::ComponentInitialized { component: "c1" });
		assert_eq!(*log.borrow(), vec!["0:c1", "1:c1", "2:c1"]);
		assert_eq!(bus.len(Hook::MessageSent), 0);
	}
}
