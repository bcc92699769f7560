//! Client-side state of one mounted component.

use super::{
	message::{Message, PrefetchCache},
	queue::ActionQueue,
};
use crate::protocol::{data_get, Data, Fingerprint, InitialData, ServerMemo};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::{collections::BTreeMap, fmt};
use tracing::trace;

/// Called with the new and the previous value of a watched field.
pub type Watcher = Box<dyn FnMut(&Value, Option<&Value>)>;
/// Called with the parameters of an event that reached the component.
pub type EventCallback = Box<dyn FnMut(&[Value])>;
type Teardown = Box<dyn FnOnce()>;

pub struct Component<N> {
	root: N,
	fingerprint: Fingerprint,
	memo: ServerMemo,
	listeners: Vec<String>,
	pub(crate) queue: ActionQueue,
	pub(crate) prefetches: PrefetchCache,
	watchers: IndexMap<String, Vec<Watcher>>,
	event_callbacks: IndexMap<String, Vec<EventCallback>>,
	teardowns: Vec<Teardown>,
	/// DOM event types this component's directives listen for.
	pub(crate) dom_events: IndexSet<String>,
	returns: BTreeMap<String, Value>,
}

impl<N: fmt::Debug> fmt::Debug for Component<N> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Component")
			.field("root", &self.root)
			.field("fingerprint", &self.fingerprint)
			.field("listeners", &self.listeners)
			.field("queue", &self.queue)
			.field("watchers", &self.watchers.keys().collect::<Vec<_>>())
			.field("teardowns", &self.teardowns.len())
			.finish_non_exhaustive()
	}
}

impl<N> Component<N> {
	#[must_use]
	pub fn new(root: N, initial: InitialData, debounce_ms: u64) -> Self {
		Self {
			root,
			listeners: initial.effects.listeners,
			fingerprint: initial.fingerprint,
			memo: initial.server_memo,
			queue: ActionQueue::new(debounce_ms),
			prefetches: PrefetchCache::new(),
			watchers: IndexMap::new(),
			event_callbacks: IndexMap::new(),
			teardowns: Vec::new(),
			dom_events: IndexSet::new(),
			returns: BTreeMap::new(),
		}
	}

	#[must_use]
	pub fn id(&self) -> &str {
		&self.fingerprint.id
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.fingerprint.name
	}

	#[must_use]
	pub fn root(&self) -> &N {
		&self.root
	}

	#[must_use]
	pub fn fingerprint(&self) -> &Fingerprint {
		&self.fingerprint
	}

	#[must_use]
	pub fn memo(&self) -> &ServerMemo {
		&self.memo
	}

	pub(crate) fn memo_mut(&mut self) -> &mut ServerMemo {
		&mut self.memo
	}

	#[must_use]
	pub fn data(&self) -> &Data {
		&self.memo.data
	}

	/// Server-side event names this component handles.
	#[must_use]
	pub fn listeners(&self) -> &[String] {
		&self.listeners
	}

	#[must_use]
	pub fn listens_to(&self, event: &str) -> bool {
		self.listeners.iter().any(|listener| listener == event)
	}

	/// The last known server value at a dot path.
	#[must_use]
	pub fn get(&self, path: &str) -> Option<&Value> {
		data_get(&self.memo.data, path)
	}

	/// Like [`Component::get`], but a pending deferred write to `path` wins.
	#[must_use]
	pub fn get_including_defers(&self, path: &str) -> Option<&Value> {
		self.queue.deferred_value(path).or_else(|| self.get(path))
	}

	/// Calls `watcher` whenever a response changes the value at `path`.
	pub fn watch(&mut self, path: impl Into<String>, watcher: impl FnMut(&Value, Option<&Value>) + 'static) {
		self.watchers.entry(path.into()).or_default().push(Box::new(watcher));
	}

	/// Calls `callback` whenever `event` is emitted to this component.
	pub fn on(&mut self, event: impl Into<String>, callback: impl FnMut(&[Value]) + 'static) {
		self.event_callbacks.entry(event.into()).or_default().push(Box::new(callback));
	}

	/// Runs `teardown` when the component is removed.
	pub fn add_teardown(&mut self, teardown: impl FnOnce() + 'static) {
		self.teardowns.push(Box::new(teardown));
	}

	/// The return value of the method call with `action_id`, once its response arrived.
	pub fn take_return(&mut self, action_id: &str) -> Option<Value> {
		self.returns.remove(action_id)
	}

	pub(crate) fn record_returns(&mut self, returns: BTreeMap<String, Value>) {
		self.returns.extend(returns);
	}

	pub(crate) fn set_listeners(&mut self, listeners: Vec<String>) {
		self.listeners = listeners;
	}

	/// Merges a response memo: `data` key by key, everything else wholesale.
	///
	/// Returns the changed data keys with their previous values.
	pub(crate) fn merge(&mut self, memo: ServerMemo) -> Vec<(String, Option<Value>)> {
		let ServerMemo {
			children,
			errors,
			html_hash,
			data,
			data_meta,
			checksum,
		} = memo;
		let mut changed = Vec::new();
		for (key, value) in data {
			let previous = self.memo.data.insert(key.clone(), value);
			if previous.as_ref() != self.memo.data.get(&key) {
				changed.push((key, previous));
			}
		}
		self.memo.children = children;
		self.memo.errors = errors;
		self.memo.html_hash = html_hash;
		self.memo.data_meta = data_meta;
		self.memo.checksum = checksum;
		changed
	}

	/// Notifies watchers of `changed` keys (and of dot paths below them), except where `message` set the value itself.
	pub(crate) fn notify_watchers(&mut self, changed: &[(String, Option<Value>)], message: Option<&Message>) {
		for (key, previous) in changed {
			if message.map_or(false, |message| message.should_skip_watcher_for(key)) {
				trace!(field = key.as_str(), "Skipping watchers for user-set field.");
				continue;
			}
			let prefix = format!("{}.", key);
			let paths: Vec<String> = self.watchers.keys().filter(|path| *path == key || path.starts_with(&prefix)).cloned().collect();
			for path in paths {
				let Some(current) = data_get(&self.memo.data, &path).cloned() else {
					continue;
				};
				let old = match path.strip_prefix(&prefix) {
					None => previous.clone(),
					Some(rest) => previous.as_ref().and_then(|previous| {
						let mut wrapper = Data::new();
						wrapper.insert(key.clone(), previous.clone());
						data_get(&wrapper, &format!("{}.{}", key, rest)).cloned()
					}),
				};
				if old.as_ref() == Some(&current) {
					continue;
				}
				if let Some(watchers) = self.watchers.get_mut(&path) {
					for watcher in watchers {
						watcher(&current, old.as_ref());
					}
				}
			}
		}
	}

	/// Returns whether anything handled the event locally.
	pub(crate) fn deliver(&mut self, event: &str, params: &[Value]) -> bool {
		match self.event_callbacks.get_mut(event) {
			Some(callbacks) if !callbacks.is_empty() => {
				for callback in callbacks {
					callback(params);
				}
				true
			}
			_ => false,
		}
	}

	/// Runs and drops all teardown callbacks.
	pub(crate) fn tear_down(&mut self) {
		for teardown in self.teardowns.drain(..) {
			teardown();
		}
		self.watchers.clear();
		self.event_callbacks.clear();
		self.prefetches.clear();
	}
}
