//! `poll` directives: periodic refreshes or method calls.

use super::directives::Directive;
use serde_json::Value;
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub struct Poll<N> {
	pub component: String,
	pub node: N,
	/// `$refresh` when the directive has no value.
	pub method: String,
	pub params: Vec<Value>,
	pub interval_ms: u64,
	/// Keeps polling while the page is in the background.
	pub keep_alive: bool,
	next_at: u64,
}

#[derive(Debug, Clone)]
pub struct PollSchedule<N> {
	polls: Vec<Poll<N>>,
}

impl<N> Default for PollSchedule<N> {
	fn default() -> Self {
		Self { polls: Vec::new() }
	}
}

impl<N: Clone + PartialEq> PollSchedule<N> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers the poll of `directive` on `node`. Re-registering the same element replaces it.
	pub fn add(&mut self, component: &str, node: N, directive: &Directive, default_interval_ms: u64, now: u64) {
		let (method, params) = if directive.value.trim().is_empty() {
			("$refresh".to_owned(), Vec::new())
		} else {
			directive.method_and_params()
		};
		let interval_ms = directive.duration_or(default_interval_ms).max(1);
		self.polls.retain(|poll| poll.node != node);
		trace!(component, method = method.as_str(), interval_ms, "Registering poll");
		self.polls.push(Poll {
			component: component.to_owned(),
			node,
			method,
			params,
			interval_ms,
			keep_alive: directive.has_modifier("keep-alive"),
			next_at: now + interval_ms,
		});
	}

	pub fn remove_component(&mut self, component: &str) {
		self.polls.retain(|poll| poll.component != component);
	}

	/// Drops polls whose element is gone.
	pub fn retain_nodes(&mut self, mut is_live: impl FnMut(&N) -> bool) {
		self.polls.retain(|poll| is_live(&poll.node));
	}

	/// Polls that are due at `now`, rescheduled for their next interval.
	///
	/// Skipped polls are rescheduled too, so a long offline period doesn't cause a burst.
	pub fn due(&mut self, now: u64, background: bool, offline: bool) -> Vec<Poll<N>> {
		let mut due = Vec::new();
		for poll in &mut self.polls {
			if now < poll.next_at {
				continue;
			}
			poll.next_at = now + poll.interval_ms;
			if offline || (background && !poll.keep_alive) {
				trace!(component = poll.component.as_str(), "Skipping poll");
				continue;
			}
			due.push(poll.clone());
		}
		due
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.polls.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.polls.is_empty()
	}
}
