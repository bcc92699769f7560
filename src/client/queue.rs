//! Per-component action queue: debounced batching, deferred writes and the single in-flight message.

use super::message::{Message, MessageState, QueuedAction};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
	/// Stored until the next real send.
	Deferred,
	/// A flush is due at the given time.
	Scheduled { flush_at: u64 },
}

#[derive(Debug)]
pub struct ActionQueue {
	/// Actions of a rejected message. Older than everything else queued.
	retry: Vec<QueuedAction>,
	update_queue: Vec<QueuedAction>,
	deferred: IndexMap<String, QueuedAction>,
	in_transit: Option<Message>,
	flush_at: Option<u64>,
	debounce_ms: u64,
}

impl ActionQueue {
	#[must_use]
	pub fn new(debounce_ms: u64) -> Self {
		Self {
			retry: Vec::new(),
			update_queue: Vec::new(),
			deferred: IndexMap::new(),
			in_transit: None,
			flush_at: None,
			debounce_ms,
		}
	}

	/// Queues `queued`. Deferred writes replace earlier deferred writes to the same field but keep its position.
	#[instrument(skip(self, queued), fields(action = queued.action.type_name()))]
	pub fn enqueue(&mut self, queued: QueuedAction, deferred: bool, now: u64) -> Enqueued {
		if deferred {
			if let Some(field) = queued.action.field() {
				let field = field.to_owned();
				trace!(field = field.as_str(), "Deferring");
				self.deferred.insert(field, queued);
				return Enqueued::Deferred;
			}
			warn!("Only field writes can be deferred; Queueing normally.");
		}
		self.update_queue.push(queued);
		let flush_at = now + self.debounce_ms;
		self.flush_at = Some(flush_at);
		Enqueued::Scheduled { flush_at }
	}

	#[must_use]
	pub fn is_due(&self, now: u64) -> bool {
		self.flush_at.map_or(false, |flush_at| now >= flush_at)
	}

	#[must_use]
	pub fn flush_at(&self) -> Option<u64> {
		self.flush_at
	}

	/// Moves everything queued into a new in-flight message, oldest first: retried actions,
	/// then deferred writes, then the rest.
	///
	/// Does nothing while another message is in flight (the queue is re-flushed once it resolves)
	/// or when no non-deferred action is waiting.
	#[instrument(skip(self))]
	pub fn flush(&mut self, component: &str, message_id: u64) -> Option<&Message> {
		self.flush_at = None;
		if self.in_transit.is_some() {
			trace!("A message is already in flight; Holding the queue.");
			return None;
		}
		if !self.has_pending() {
			return None;
		}

		let actions: Vec<QueuedAction> = self
			.retry
			.drain(..)
			.chain(self.deferred.drain(..).map(|(_, queued)| queued))
			.chain(self.update_queue.drain(..))
			.collect();
		let mut message = Message::new(message_id, component, actions);
		message.state = MessageState::InTransit;
		self.in_transit = Some(message);
		self.in_transit.as_ref()
	}

	#[must_use]
	pub fn in_transit(&self) -> Option<&Message> {
		self.in_transit.as_ref()
	}

	/// Ends the in-flight message successfully.
	pub fn resolve(&mut self) -> Option<Message> {
		let mut message = self.in_transit.take()?;
		message.state = MessageState::Resolved;
		Some(message)
	}

	/// Ends the in-flight message unsuccessfully; its actions go back to the front of the queue for a retry.
	///
	/// Writes queued since then still apply after them, so the latest value of a field wins.
	pub fn reject(&mut self) -> Option<Message> {
		let mut message = self.in_transit.take()?;
		message.state = MessageState::Rejected;
		let retry = message.actions.clone();
		self.retry.splice(0..0, retry);
		Some(message)
	}

	/// Whether anything is waiting to be sent.
	#[must_use]
	pub fn has_pending(&self) -> bool {
		!self.retry.is_empty() || !self.update_queue.is_empty()
	}

	#[must_use]
	pub fn pending_len(&self) -> usize {
		self.retry.len() + self.update_queue.len()
	}

	/// The value a deferred write would set `field` to.
	#[must_use]
	pub fn deferred_value(&self, field: &str) -> Option<&Value> {
		match &self.deferred.get(field)?.action {
			crate::protocol::Action::SyncInput { value, .. } => Some(value),
			_ => None,
		}
	}

	#[must_use]
	pub fn deferred_len(&self) -> usize {
		self.deferred.len()
	}
}
