//! Server-side lifecycle signals, for cross-cutting concerns like auditing.

use crate::protocol::Data;
use hashbrown::HashMap;
use serde_json::Value;
use std::fmt;
use tracing::{trace, trace_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
	ComponentHydrated,
	ActionReturned,
	ComponentDehydrated,
	ComponentRendered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
	Before,
	On,
	After,
}

#[derive(Debug, Clone, Copy)]
pub enum SignalEvent<'a> {
	ComponentHydrated { component: &'a str, id: &'a str },
	/// A listener method ran in response to a fired event. `origin` is the emitting component's id.
	ActionReturned {
		component: &'a str,
		id: &'a str,
		event: &'a str,
		origin: Option<&'a str>,
		returned: &'a Value,
	},
	ComponentDehydrated { component: &'a str, id: &'a str, data: &'a Data },
	ComponentRendered { component: &'a str, id: &'a str, html: &'a str },
}

impl SignalEvent<'_> {
	#[must_use]
	pub fn signal(&self) -> Signal {
		match self {
			SignalEvent::ComponentHydrated { .. } => Signal::ComponentHydrated,
			SignalEvent::ActionReturned { .. } => Signal::ActionReturned,
			SignalEvent::ComponentDehydrated { .. } => Signal::ComponentDehydrated,
			SignalEvent::ComponentRendered { .. } => Signal::ComponentRendered,
		}
	}
}

/// Handle for [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
	signal: Signal,
	phase: Phase,
	id: u64,
}

type Listener = Box<dyn Fn(&SignalEvent<'_>) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
	listeners: HashMap<(Signal, Phase), Vec<(u64, Listener)>>,
	next_id: u64,
}

impl fmt::Debug for EventBus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventBus").field("listeners", &self.listeners.values().map(Vec::len).sum::<usize>()).finish()
	}
}

impl EventBus {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn before(&mut self, signal: Signal, listener: impl Fn(&SignalEvent<'_>) + Send + Sync + 'static) -> Subscription {
		self.subscribe(signal, Phase::Before, Box::new(listener))
	}

	pub fn on(&mut self, signal: Signal, listener: impl Fn(&SignalEvent<'_>) + Send + Sync + 'static) -> Subscription {
		self.subscribe(signal, Phase::On, Box::new(listener))
	}

	pub fn after(&mut self, signal: Signal, listener: impl Fn(&SignalEvent<'_>) + Send + Sync + 'static) -> Subscription {
		self.subscribe(signal, Phase::After, Box::new(listener))
	}

	/// Returns whether the subscription was still active.
	pub fn off(&mut self, subscription: Subscription) -> bool {
		let Some(listeners) = self.listeners.get_mut(&(subscription.signal, subscription.phase)) else {
			return false;
		};
		let before = listeners.len();
		listeners.retain(|(id, _)| *id != subscription.id);
		listeners.len() != before
	}

	/// Runs `before`, then `on`, then `after` listeners, each in registration order.
	pub fn trigger(&self, event: &SignalEvent<'_>) {
		let signal = event.signal();
		let _span = trace_span!("trigger", ?signal).entered();
		for phase in [Phase::Before, Phase::On, Phase::After] {
			if let Some(listeners) = self.listeners.get(&(signal, phase)) {
				trace!(?phase, count = listeners.len());
				for (_, listener) in listeners {
					listener(event);
				}
			}
		}
	}

	fn subscribe(&mut self, signal: Signal, phase: Phase, listener: Listener) -> Subscription {
		let id = self.next_id;
		self.next_id += 1;
		self.listeners.entry((signal, phase)).or_default().push((id, listener));
		Subscription { signal, phase, id }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{Arc, Mutex};

	#[test]
	fn phases_run_in_order_and_off_detaches() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let mut bus = EventBus::new();
		let push = |label: &'static str| {
			let log = Arc::clone(&log);
			move |_: &SignalEvent<'_>| log.lock().unwrap().push(label)
		};
		bus.after(Signal::ComponentRendered, push("after"));
		let on = bus.on(Signal::ComponentRendered, push("on"));
		bus.before(Signal::ComponentRendered, push("before"));
		bus.on(Signal::ComponentHydrated, push("other"));

		let event = SignalEvent::ComponentRendered { component: "c", id: "1", html: "<div></div>" };
		bus.trigger(&event);
		assert_eq!(*log.lock().unwrap(), ["before", "on", "after"]);

		assert!(bus.off(on));
		assert!(!bus.off(on));
		log.lock().unwrap().clear();
		bus.trigger(&event);
		assert_eq!(*log.lock().unwrap(), ["before", "after"]);
	}
}
