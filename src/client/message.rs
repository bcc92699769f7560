//! Batches of actions sent in one request, and speculative prefetches.

use crate::protocol::{Action, Fingerprint, RequestPayload, ResponsePayload, ServerMemo};
use indexmap::IndexMap;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
	Queued,
	InTransit,
	Resolved,
	Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedAction {
	pub action: Action,
	/// Don't notify watchers of this field when the response comes back, since the value came from the user.
	pub skip_watcher: bool,
}

impl QueuedAction {
	#[must_use]
	pub fn new(action: Action) -> Self {
		Self { action, skip_watcher: false }
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
	pub id: u64,
	/// Id of the component this message belongs to.
	pub component: String,
	pub actions: Vec<QueuedAction>,
	pub state: MessageState,
	pub prefetch: bool,
}

impl Message {
	#[must_use]
	pub fn new(id: u64, component: impl Into<String>, actions: Vec<QueuedAction>) -> Self {
		Self {
			id,
			component: component.into(),
			actions,
			state: MessageState::Queued,
			prefetch: false,
		}
	}

	#[must_use]
	pub fn payload(&self, fingerprint: &Fingerprint, memo: &ServerMemo) -> RequestPayload {
		RequestPayload {
			fingerprint: fingerprint.clone(),
			server_memo: memo.clone(),
			updates: self.actions.iter().map(|queued| queued.action.clone()).collect(),
		}
	}

	/// Whether a watcher on `field` should stay quiet for this message's response.
	#[must_use]
	pub fn should_skip_watcher_for(&self, field: &str) -> bool {
		self.actions.iter().any(|queued| {
			queued.skip_watcher
				&& queued.action.field().map_or(false, |name| name == field || name.split('.').next() == Some(field))
		})
	}
}

#[derive(Debug, Clone)]
struct Prefetch {
	message_id: u64,
	expires_at: u64,
	/// Checksum of the memo the request was sent with.
	basis: Option<String>,
	response: Option<ResponsePayload>,
}

/// Responses fetched ahead of time, keyed by [`Action::signature`]. Each is used at most once,
/// and only while the component's memo is still the one it was fetched for.
#[derive(Debug, Clone, Default)]
pub struct PrefetchCache {
	entries: IndexMap<String, Prefetch>,
}

impl PrefetchCache {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, signature: String, message_id: u64, expires_at: u64, basis: Option<String>) {
		self.entries.insert(
			signature,
			Prefetch {
				message_id,
				expires_at,
				basis,
				response: None,
			},
		);
	}

	#[must_use]
	pub fn contains(&self, signature: &str) -> bool {
		self.entries.contains_key(signature)
	}

	/// Stores the response of a prefetch message. Returns `false` if nobody is waiting for it anymore.
	pub fn store(&mut self, message_id: u64, response: ResponsePayload) -> bool {
		match self.entries.values_mut().find(|prefetch| prefetch.message_id == message_id) {
			Some(prefetch) => {
				prefetch.response = Some(response);
				true
			}
			None => false,
		}
	}

	/// Takes a received, unexpired response for `signature` that was computed from the memo sealed with `checksum`.
	pub fn take_ready(&mut self, signature: &str, now: u64, checksum: Option<&str>) -> Option<ResponsePayload> {
		let ready = self.entries.get(signature).map_or(false, |prefetch| prefetch.response.is_some());
		if !ready {
			return None;
		}
		let prefetch = self.entries.shift_remove(signature)?;
		if now > prefetch.expires_at {
			trace!(signature, "Prefetched response expired.");
			return None;
		}
		if prefetch.basis.as_deref() != checksum {
			trace!(signature, "Prefetched response is based on an outdated memo.");
			return None;
		}
		prefetch.response
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
