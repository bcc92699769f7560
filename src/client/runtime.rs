//! The client runtime: finds component roots, turns user interactions into actions and applies
//! the server's responses.
//!
//! Time is passed in by the host (see [`Runtime::tick`]), which keeps debouncing and polling
//! deterministic in tests and lets the `web` module drive it from a timer.

use super::{
	component::Component,
	connection::{Connection, Delivery, HttpReply, Ticket, Transport},
	directives::{Directive, Directives},
	dom::{self, Browser, NodeKind, UserEvent, Visit},
	hooks::{HookBus, HookEvent, Incoming},
	message::{Message, QueuedAction},
	morph::{morph, MorphObserver, MorphOptions},
	offline,
	polling::PollSchedule,
};
use crate::{
	config::ClientConfig,
	document::Document,
	error::{InitError, RuntimeError, TransportError},
	protocol::{Action, ChildRef, EventRecord, InitialData, RequestPayload, ResponsePayload},
	rc_hash_map::RcHashMap,
};
use hashbrown::HashMap;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, error, instrument, trace, warn};

/// Directive kinds that don't name a DOM event.
const NON_EVENT_DIRECTIVES: &[&str] = &["id", "initial-data", "key", "model", "ignore", "poll", "init", "offline", "loading", "target", "dirty", "ref"];

/// Modifiers of event directives that don't filter by key.
const BEHAVIOR_MODIFIERS: &[&str] = &["prevent", "stop", "self", "once", "prefetch", "passive", "capture", "debounce", "throttle"];

#[derive(Debug, Clone)]
struct Flight {
	component: String,
	message_id: u64,
	prefetch: bool,
}

/// A `model` write waiting out its debounce.
#[derive(Debug, Clone)]
struct PendingInput<N> {
	component: String,
	field: String,
	node: N,
	due: u64,
}

type GlobalCallback = Box<dyn FnMut(&[Value])>;

pub struct Runtime<B: Browser, T: Transport> {
	config: ClientConfig,
	browser: B,
	transport: T,
	connection: Connection,
	hooks: HookBus<B::Node>,
	components: IndexMap<String, Component<B::Node>>,
	flights: HashMap<Ticket, Flight>,
	/// One browser listener per DOM event type, counted by listening component.
	listening: RcHashMap<String, u32, B::Listener>,
	polls: PollSchedule<B::Node>,
	offline_elements: Vec<(String, B::Node, Directive)>,
	pending_inputs: Vec<PendingInput<B::Node>>,
	global_callbacks: IndexMap<String, Vec<GlobalCallback>>,
	on_session_expired: Option<Box<dyn FnMut() -> bool>>,
	on_error: Option<Box<dyn FnMut(Option<u16>, &str) -> bool>>,
	next_ticket: u64,
	next_message: u64,
	next_action: u64,
	now: u64,
	offline: bool,
	background: bool,
}

impl<B: Browser, T: Transport> std::fmt::Debug for Runtime<B, T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Runtime")
			.field("components", &self.components.keys().collect::<Vec<_>>())
			.field("flights", &self.flights.len())
			.field("listening", &self.listening)
			.field("polls", &self.polls.len())
			.field("now", &self.now)
			.field("offline", &self.offline)
			.field("background", &self.background)
			.finish_non_exhaustive()
	}
}

/// Observes one morph on behalf of the runtime.
struct Session<'r, B: Browser> {
	hooks: &'r mut HookBus<B::Node>,
	components: &'r mut IndexMap<String, Component<B::Node>>,
	component: &'r str,
	id_attribute: &'r str,
	added: Vec<B::Node>,
	removed: Vec<String>,
}

impl<B: Browser> MorphObserver<B> for Session<'_, B> {
	fn updating(&mut self, _dom: &B, from: &B::Node, to: Incoming<'_>) -> Visit {
		self.hooks.call(&HookEvent::ElementUpdating { from, to, component: self.component });
		Visit::Continue
	}

	fn updated(&mut self, _dom: &B, node: &B::Node) {
		self.hooks.call(&HookEvent::ElementUpdated { element: node, component: self.component });
	}

	fn removing(&mut self, dom: &B, node: &B::Node) {
		let mut roots = Vec::new();
		if dom.kind(node) == NodeKind::Element {
			roots.extend(dom.attribute(node, self.id_attribute));
			let id_attribute = self.id_attribute;
			dom::walk(dom, node, &mut |child| {
				roots.extend(dom.attribute(child, id_attribute));
				Visit::Continue
			});
		}
		for id in roots {
			if let Some(component) = self.components.get_mut(&id) {
				debug!(component = id.as_str(), "Tearing down removed component");
				component.tear_down();
				self.removed.push(id);
			}
		}
		self.hooks.call(&HookEvent::ElementRemoved { element: node, component: self.component });
	}

	fn added(&mut self, _dom: &mut B, node: &B::Node) {
		self.added.push(node.clone());
	}
}

impl<B: Browser, T: Transport> Runtime<B, T> {
	#[must_use]
	pub fn new(config: ClientConfig, browser: B, transport: T) -> Self {
		Self {
			connection: Connection::new(&config),
			config,
			browser,
			transport,
			hooks: HookBus::new(),
			components: IndexMap::new(),
			flights: HashMap::new(),
			listening: RcHashMap::new(),
			polls: PollSchedule::new(),
			offline_elements: Vec::new(),
			pending_inputs: Vec::new(),
			global_callbacks: IndexMap::new(),
			on_session_expired: None,
			on_error: None,
			next_ticket: 0,
			next_message: 0,
			next_action: 0,
			now: 0,
			offline: false,
			background: false,
		}
	}

	#[must_use]
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	#[must_use]
	pub fn browser(&self) -> &B {
		&self.browser
	}

	pub fn browser_mut(&mut self) -> &mut B {
		&mut self.browser
	}

	#[must_use]
	pub fn transport(&self) -> &T {
		&self.transport
	}

	pub fn transport_mut(&mut self) -> &mut T {
		&mut self.transport
	}

	pub fn hooks_mut(&mut self) -> &mut HookBus<B::Node> {
		&mut self.hooks
	}

	#[must_use]
	pub fn component(&self, id: &str) -> Option<&Component<B::Node>> {
		self.components.get(id)
	}

	pub fn component_mut(&mut self, id: &str) -> Option<&mut Component<B::Node>> {
		self.components.get_mut(id)
	}

	/// Initialized components in initialization order.
	pub fn components(&self) -> impl Iterator<Item = &Component<B::Node>> {
		self.components.values()
	}

	/// The first component with `name`.
	#[must_use]
	pub fn find(&self, name: &str) -> Option<&Component<B::Node>> {
		self.components.values().find(|component| component.name() == name)
	}

	#[must_use]
	pub fn now(&self) -> u64 {
		self.now
	}

	/// Whether a browser listener for the DOM event type `event` is registered.
	#[must_use]
	pub fn is_listening(&self, event: &str) -> bool {
		self.listening.contains_key(event)
	}

	/// Number of DOM event types with a registered browser listener.
	#[must_use]
	pub fn listened_event_types(&self) -> usize {
		self.listening.len()
	}

	#[must_use]
	pub fn is_offline(&self) -> bool {
		self.offline
	}

	/// Whether a turn answered 419 since the page loaded.
	#[must_use]
	pub fn session_expired(&self) -> bool {
		self.connection.session_expired()
	}

	/// Replaces the default expiry prompt. Return `true` to mark the expiry as handled.
	pub fn on_session_expired(&mut self, callback: impl FnMut() -> bool + 'static) {
		self.on_session_expired = Some(Box::new(callback));
	}

	/// Replaces showing failed responses. Return `true` to mark the failure as handled.
	pub fn on_error(&mut self, callback: impl FnMut(Option<u16>, &str) -> bool + 'static) {
		self.on_error = Some(Box::new(callback));
	}

	/// Calls `callback` for every broadcast or targeted emit of `event`.
	pub fn on(&mut self, event: impl Into<String>, callback: impl FnMut(&[Value]) + 'static) {
		self.global_callbacks.entry(event.into()).or_default().push(Box::new(callback));
	}

	fn attribute_name(&self, directive: &str) -> String {
		format!("{}{}", self.config.prefix, directive)
	}

	fn next_action_id(&mut self) -> String {
		self.next_action += 1;
		format!("a{}", self.next_action)
	}

	fn next_message_id(&mut self) -> u64 {
		self.next_message += 1;
		self.next_message
	}

	/// Initializes every top-level component root below the body. Returns how many were initialized, nested ones included.
	#[instrument(skip(self))]
	pub fn start(&mut self, now: u64) -> usize {
		self.now = now;
		let body = self.browser.body();
		let id_attribute = self.attribute_name("id");
		let mut roots = Vec::new();
		let browser = &self.browser;
		dom::walk(browser, &body, &mut |node| {
			if browser.attribute(node, &id_attribute).is_some() {
				roots.push(node.clone());
				Visit::SkipChildren
			} else {
				Visit::Continue
			}
		});

		let before = self.components.len();
		for root in roots {
			if let Err(init_error) = self.initialize_component(root) {
				error!("Failed to initialize component: {}", init_error);
			}
		}
		self.components.len() - before
	}

	/// Boots the component rooted at `root`, including components nested in it.
	///
	/// # Errors
	///
	/// Iff the root lacks its id or initial data, or the component is already initialized.
	#[instrument(skip(self, root))]
	pub fn initialize_component(&mut self, root: B::Node) -> Result<String, InitError> {
		let id_attribute = self.attribute_name("id");
		let data_attribute = self.attribute_name("initial-data");
		let id = self.browser.attribute(&root, &id_attribute).ok_or_else(|| InitError::MissingAttribute(id_attribute.clone()))?;
		if self.components.contains_key(&id) {
			return Err(InitError::AlreadyInitialized(id));
		}
		let raw = self.browser.attribute(&root, &data_attribute).ok_or_else(|| InitError::MissingAttribute(data_attribute.clone()))?;
		let initial: InitialData = serde_json::from_str(&raw).map_err(|parse_error| InitError::InvalidInitialData(parse_error.to_string()))?;
		if initial.fingerprint.id != id {
			return Err(InitError::InvalidInitialData(format!("fingerprint id [{}] doesn't match root id [{}]", initial.fingerprint.id, id)));
		}
		self.browser.remove_attribute(&root, &data_attribute);

		let emits = initial.effects.emits.clone();
		let dispatches = initial.effects.dispatches.clone();
		debug!(component = id.as_str(), name = initial.fingerprint.name.as_str(), "Initializing component");
		self.components.insert(id.clone(), Component::new(root.clone(), initial, self.config.debounce_ms));

		self.init_subtree(&id, &root);
		self.hooks.call(&HookEvent::ComponentInitialized { component: &id });

		for dispatch in &dispatches {
			self.browser.dispatch_event(&root, &dispatch.event, &dispatch.data);
		}
		for record in &emits {
			self.route(Some(&id), record);
		}
		Ok(id)
	}

	/// Initializes `node` and its descendants for `component`. Nested component roots are booted instead.
	fn init_subtree(&mut self, component: &str, node: &B::Node) {
		if self.browser.kind(node) != NodeKind::Element {
			return;
		}
		self.init_element(component, node);

		let id_attribute = self.attribute_name("id");
		let mut elements = Vec::new();
		let mut nested = Vec::new();
		let browser = &self.browser;
		dom::walk(browser, node, &mut |child| {
			if browser.attribute(child, &id_attribute).is_some() {
				nested.push(child.clone());
				Visit::SkipChildren
			} else {
				elements.push(child.clone());
				Visit::Continue
			}
		});

		for element in elements {
			self.init_element(component, &element);
		}
		for root in nested {
			match self.initialize_component(root) {
				Ok(_) => (),
				Err(InitError::AlreadyInitialized(id)) => trace!(component = id.as_str(), "Nested component is already initialized."),
				Err(init_error) => error!("Failed to initialize nested component: {}", init_error),
			}
		}
	}

	fn init_element(&mut self, component: &str, node: &B::Node) {
		let directives = Directives::of(&self.browser, node, &self.config.prefix);
		for directive in directives.iter() {
			match directive.kind.as_str() {
				"model" => {
					let field = directive.value.trim();
					let value = self.components.get(component).and_then(|live| live.get_including_defers(field)).cloned();
					if let Some(value) = value {
						self.hooks.call(&HookEvent::InterceptModelSetValue { element: node, value: &value, component });
						dom::set_input_value(&mut self.browser, node, &value);
					}
					self.hooks.call(&HookEvent::InterceptModelAttachListener { element: node, directive, component });
					self.listen(component, if directive.has_modifier("lazy") { "change" } else { "input" });
				}
				"poll" => self.polls.add(component, node.clone(), directive, self.config.poll_interval_ms, self.now),
				"init" => {
					let (method, params) = directive.method_and_params();
					if let Err(runtime_error) = self.call(component, &method, params) {
						error!("`init` directive failed: {}", runtime_error);
					}
				}
				"offline" => {
					offline::apply(&mut self.browser, node, directive, self.offline);
					self.offline_elements.push((component.to_owned(), node.clone(), directive.clone()));
				}
				kind if NON_EVENT_DIRECTIVES.contains(&kind) => (),
				event => {
					self.listen(component, event);
					if directive.has_modifier("prefetch") {
						self.listen(component, "mouseenter");
					}
				}
			}
		}
		if !directives.is_empty() {
			self.hooks.call(&HookEvent::ElementInitialized { element: node, component });
		}
	}

	fn listen(&mut self, component: &str, event: &str) {
		let Some(live) = self.components.get_mut(component) else {
			return;
		};
		if !live.dom_events.insert(event.to_owned()) {
			return;
		}
		let browser = &mut self.browser;
		if let Err(saturated) = self.listening.increment_or_insert_with(event.to_owned(), || browser.listen(event)) {
			error!("Can't count another `{}` listener: {}", event, saturated);
		}
	}

	/// Releases the event types `component` listened for and unregisters those nobody needs anymore.
	fn release_events(&mut self, component: &Component<B::Node>) {
		if self.listening.is_empty() {
			return;
		}
		for event in &component.dom_events {
			if let Err(saturated) = self.listening.weak_decrement(event.as_str()) {
				error!("Listener count for `{}` underflowed: {}", event, saturated);
			}
		}
		for (event, listener) in self.listening.drain_weak() {
			trace!(event = event.as_str(), "Unlistening");
			self.browser.unlisten(&event, listener);
		}
	}

	/// Tears down and forgets the component with `id`. Returns whether it existed.
	#[instrument(skip(self))]
	pub fn remove_component(&mut self, id: &str) -> bool {
		let Some(mut component) = self.components.shift_remove(id) else {
			return false;
		};
		component.tear_down();
		self.release_events(&component);
		self.polls.remove_component(id);
		self.pending_inputs.retain(|pending| pending.component != id);
		self.offline_elements.retain(|(owner, ..)| owner != id);
		self.flights.retain(|_, flight| flight.component != id);
		debug!("Removed component");
		true
	}

	/// Writes `value` to `field` on the server as soon as the queue flushes.
	///
	/// # Errors
	///
	/// Iff no component with id `component` is initialized.
	pub fn set(&mut self, component: &str, field: &str, value: Value) -> Result<String, RuntimeError> {
		self.sync_input(component, field, value, false, false)
	}

	/// Writes `value` to `field` with the next non-deferred action.
	///
	/// # Errors
	///
	/// Iff no component with id `component` is initialized.
	pub fn sync(&mut self, component: &str, field: &str, value: Value) -> Result<String, RuntimeError> {
		self.sync_input(component, field, value, true, false)
	}

	fn sync_input(&mut self, component: &str, field: &str, value: Value, deferred: bool, skip_watcher: bool) -> Result<String, RuntimeError> {
		let id = self.next_action_id();
		let mut queued = QueuedAction::new(Action::SyncInput {
			id: id.clone(),
			name: field.to_owned(),
			value,
		});
		queued.skip_watcher = skip_watcher;
		self.enqueue(component, queued, deferred)?;
		Ok(id)
	}

	/// Calls `method` on the server. Returns the action id its return value will be recorded under.
	///
	/// # Errors
	///
	/// Iff no component with id `component` is initialized.
	pub fn call(&mut self, component: &str, method: &str, params: Vec<Value>) -> Result<String, RuntimeError> {
		let id = self.next_action_id();
		let action = Action::CallMethod {
			id: id.clone(),
			method: if method.is_empty() { "$refresh".to_owned() } else { method.to_owned() },
			params,
		};
		self.enqueue(component, QueuedAction::new(action), false)?;
		Ok(id)
	}

	/// Asks the server to navigate after the turn.
	///
	/// # Errors
	///
	/// Iff no component with id `component` is initialized.
	pub fn navigate(&mut self, component: &str, url: &str) -> Result<String, RuntimeError> {
		let id = self.next_action_id();
		self.enqueue(component, QueuedAction::new(Action::Navigate { id: id.clone(), url: url.to_owned() }), false)?;
		Ok(id)
	}

	/// Queues `queued` for `component`.
	///
	/// A ready prefetched response for the same action is applied instead of sending anything.
	///
	/// # Errors
	///
	/// Iff no component with id `component` is initialized.
	#[instrument(skip(self, queued), fields(action = queued.action.type_name()))]
	pub fn enqueue(&mut self, component: &str, queued: QueuedAction, deferred: bool) -> Result<(), RuntimeError> {
		if !self.components.contains_key(component) {
			return Err(RuntimeError::UnknownComponent(component.to_owned()));
		}
		if matches!(queued.action, Action::CallMethod { .. } | Action::FireEvent { .. }) {
			// Debounced input must reach the server before the method that reads it.
			self.fire_pending_inputs(|pending| pending.component == component);
		}

		let now = self.now;
		let live = self.components.get_mut(component).ok_or_else(|| RuntimeError::UnknownComponent(component.to_owned()))?;
		if !deferred {
			let signature = queued.action.signature();
			let checksum = live.memo().checksum.clone();
			let prefetched = live.prefetches.take_ready(&signature, now, checksum.as_deref());
			live.prefetches.clear();
			if let Some(response) = prefetched {
				debug!(signature = signature.as_str(), "Using prefetched response");
				let message = Message::new(0, component, vec![queued]);
				self.apply_response(component, Some(&message), response);
				return Ok(());
			}
		}
		live.queue.enqueue(queued, deferred, now);
		Ok(())
	}

	/// Sends `action` ahead of time; an identical action enqueued later uses the response.
	///
	/// # Errors
	///
	/// Iff no component with id `component` is initialized or the request can't be serialized.
	#[instrument(skip(self, action))]
	pub fn prefetch(&mut self, component: &str, action: Action) -> Result<(), RuntimeError> {
		let signature = action.signature();
		let message_id = self.next_message_id();
		let expires_at = self.now + self.config.prefetch_ttl_ms;
		let live = self.components.get_mut(component).ok_or_else(|| RuntimeError::UnknownComponent(component.to_owned()))?;
		if live.prefetches.contains(&signature) {
			trace!(signature = signature.as_str(), "Already prefetching");
			return Ok(());
		}
		let mut message = Message::new(message_id, component, vec![QueuedAction::new(action)]);
		message.prefetch = true;
		let payload = message.payload(live.fingerprint(), live.memo());
		live.prefetches.insert(signature, message_id, expires_at, live.memo().checksum.clone());
		self.send(component, &message, &payload)
	}

	fn send(&mut self, component: &str, message: &Message, payload: &RequestPayload) -> Result<(), RuntimeError> {
		let request = self.connection.request(payload)?;
		self.next_ticket += 1;
		let ticket = Ticket(self.next_ticket);
		self.flights.insert(
			ticket,
			Flight {
				component: component.to_owned(),
				message_id: message.id,
				prefetch: message.prefetch,
			},
		);
		self.hooks.call(&HookEvent::MessageSent { message, component });
		trace!(?ticket, actions = message.actions.len(), prefetch = message.prefetch, "Sending");
		self.transport.send(ticket, request);
		Ok(())
	}

	/// Sends everything queued for `component` now. Returns whether a message went out.
	///
	/// Nothing is sent while another message of the component is in flight, or if only deferred writes are queued.
	///
	/// # Errors
	///
	/// Iff no component with id `component` is initialized or the request can't be serialized.
	/// The actions stay queued in the latter case.
	pub fn flush(&mut self, component: &str) -> Result<bool, RuntimeError> {
		let message_id = self.next_message_id();
		let live = self.components.get_mut(component).ok_or_else(|| RuntimeError::UnknownComponent(component.to_owned()))?;
		let Some(message) = live.queue.flush(component, message_id).cloned() else {
			return Ok(false);
		};
		let payload = message.payload(live.fingerprint(), live.memo());
		if let Err(send_error) = self.send(component, &message, &payload) {
			if let Some(live) = self.components.get_mut(component) {
				live.queue.reject();
			}
			return Err(send_error);
		}
		Ok(true)
	}

	/// Emits `event` to every component listening for it.
	pub fn emit(&mut self, event: &str, params: Vec<Value>) {
		self.route(None, &EventRecord::new(event, params));
	}

	/// Emits `event` to components named `name`.
	pub fn emit_to(&mut self, name: &str, event: &str, params: Vec<Value>) {
		self.route(None, EventRecord::new(event, params).target(name));
	}

	/// Emits `event` to `component` only.
	pub fn emit_self(&mut self, component: &str, event: &str, params: Vec<Value>) {
		self.route(Some(component), EventRecord::new(event, params).only_self());
	}

	/// Emits `event` to the components enclosing `component`.
	pub fn emit_up(&mut self, component: &str, event: &str, params: Vec<Value>) {
		self.route(Some(component), EventRecord::new(event, params).up());
	}

	/// Delivers `record` to local callbacks and queues a `fireEvent` for each receiving component that listens server-side.
	fn route(&mut self, origin: Option<&str>, record: &EventRecord) {
		let targets: Vec<String> = if record.self_only {
			origin.map(ToOwned::to_owned).into_iter().collect()
		} else if record.ancestors_only {
			let id_attribute = self.attribute_name("id");
			match origin.and_then(|origin| self.components.get(origin)) {
				Some(live) => dom::ancestors(&self.browser, live.root()).iter().filter_map(|node| self.browser.attribute(node, &id_attribute)).collect(),
				None => Vec::new(),
			}
		} else {
			if let Some(callbacks) = self.global_callbacks.get_mut(&record.event) {
				for callback in callbacks {
					callback(&record.params);
				}
			}
			self.components
				.iter()
				.filter(|(_, live)| record.to.as_deref().map_or(true, |name| live.name() == name))
				.map(|(id, _)| id.clone())
				.collect()
		};
		trace!(event = record.event.as_str(), targets = targets.len(), "Routing event");

		for target in targets {
			let listens = match self.components.get_mut(&target) {
				Some(live) => {
					live.deliver(&record.event, &record.params);
					live.listens_to(&record.event)
				}
				None => continue,
			};
			if listens {
				let id = self.next_action_id();
				let action = Action::FireEvent {
					id,
					event: record.event.clone(),
					params: record.params.clone(),
					origin: origin.map(ToOwned::to_owned),
				};
				if let Err(runtime_error) = self.enqueue(&target, QueuedAction::new(action), false) {
					error!("Couldn't queue event: {}", runtime_error);
				}
			}
		}
	}

	/// Advances the runtime to `now`: fires debounced input and due polls, handles user events,
	/// flushes due queues and processes replies.
	#[instrument(skip(self))]
	pub fn tick(&mut self, now: u64) {
		self.now = now;
		self.fire_pending_inputs(|pending| pending.due <= now);

		for poll in self.polls.due(now, self.background, self.offline) {
			if let Err(runtime_error) = self.call(&poll.component, &poll.method, poll.params) {
				warn!("Poll failed: {}", runtime_error);
			}
		}

		while let Some(event) = self.browser.poll_event() {
			self.trigger(&event);
		}

		let due: Vec<String> = self.components.iter().filter(|(_, live)| live.queue.is_due(now)).map(|(id, _)| id.clone()).collect();
		for id in due {
			if let Err(runtime_error) = self.flush(&id) {
				error!("Flush failed: {}", runtime_error);
			}
		}

		while let Some((ticket, reply)) = self.transport.poll() {
			self.receive(ticket, reply);
		}
	}

	/// The earliest time [`Runtime::tick`] has queued work for, if any.
	#[must_use]
	pub fn next_due(&self) -> Option<u64> {
		let queues = self.components.values().filter_map(|live| live.queue.flush_at());
		let inputs = self.pending_inputs.iter().map(|pending| pending.due);
		queues.chain(inputs).min()
	}

	/// Processes the reply to `ticket`.
	#[instrument(skip(self, reply))]
	pub fn receive(&mut self, ticket: Ticket, reply: Result<HttpReply, TransportError>) {
		let Some(flight) = self.flights.remove(&ticket) else {
			warn!("Reply for an unknown or abandoned request.");
			return;
		};
		let delivery = self.connection.interpret(reply);
		let id = flight.component;

		if flight.prefetch {
			if let (Delivery::Payload(response), Some(live)) = (delivery, self.components.get_mut(&id)) {
				if !live.prefetches.store(flight.message_id, response) {
					trace!("Prefetched response is no longer wanted.");
				}
			}
			return;
		}

		let Some(live) = self.components.get_mut(&id) else {
			debug!(component = id.as_str(), "Component was removed while its message was in flight.");
			return;
		};
		match delivery {
			Delivery::Payload(response) => {
				let Some(message) = live.queue.resolve() else {
					warn!("Response without a message in flight.");
					return;
				};
				if message.id != flight.message_id {
					warn!(expected = message.id, received = flight.message_id, "Response doesn't belong to the message in flight.");
				}
				self.hooks.call(&HookEvent::MessageReceived { message: &message, component: &id });
				self.apply_response(&id, Some(&message), response);
				self.hooks.call(&HookEvent::MessageProcessed { message: &message, component: &id });

				if self.components.get(&id).map_or(false, |live| live.queue.has_pending()) {
					if let Err(runtime_error) = self.flush(&id) {
						error!("Follow-up flush failed: {}", runtime_error);
					}
				}
			}
			Delivery::Redirect(url) => {
				live.queue.resolve();
				self.browser.redirect(&url);
			}
			Delivery::SessionExpired { first } => {
				if let Some(message) = live.queue.reject() {
					self.hooks.call(&HookEvent::MessageFailed { message: &message, component: &id, status: Some(419) });
				}
				if first {
					let handled = self.on_session_expired.as_mut().map_or(false, |callback| callback());
					if !handled {
						self.browser.session_expired();
					}
				}
			}
			Delivery::Failed { status, body } => {
				if let Some(message) = live.queue.reject() {
					self.hooks.call(&HookEvent::MessageFailed { message: &message, component: &id, status });
				}
				let handled = self.on_error.as_mut().map_or(false, |callback| callback(status, &body));
				if !handled && !body.is_empty() {
					self.browser.show_error(&body);
				}
			}
		}
	}

	#[instrument(skip(self, message, response))]
	fn apply_response(&mut self, id: &str, message: Option<&Message>, response: ResponsePayload) {
		let ResponsePayload { effects, server_memo } = response;
		let Some(live) = self.components.get_mut(id) else {
			return;
		};
		let changed = live.merge(server_memo);
		live.set_listeners(effects.listeners.clone());
		live.record_returns(effects.returns.clone());
		let root = live.root().clone();

		if let Some(url) = &effects.redirect {
			self.browser.redirect(url);
			return;
		}

		if let Some(html) = &effects.html {
			self.morph_component(id, &root, html, &effects.dirty);
		}
		self.refresh_models(id, &effects.dirty);

		if self.components.contains_key(id) {
			for dispatch in &effects.dispatches {
				self.browser.dispatch_event(&root, &dispatch.event, &dispatch.data);
			}
			for record in &effects.emits {
				self.route(Some(id), record);
			}
		}

		if let Some(live) = self.components.get_mut(id) {
			live.notify_watchers(&changed, message);
		}

		if let Some(url) = &effects.navigate {
			self.hooks.call(&HookEvent::BeforePushState { url });
			self.browser.navigate(url);
		}
	}

	fn morph_component(&mut self, id: &str, root: &B::Node, html: &str, dirty: &[String]) {
		let mut incoming = Document::parse(html);
		let Some(to) = incoming.first_element_child(incoming.body()) else {
			error!("Response markup for component [{}] has no root element.", id);
			return;
		};
		let data_attribute = self.attribute_name("initial-data");
		incoming.remove_attribute(to, &data_attribute);

		let id_attribute = self.attribute_name("id");
		let mut session = Session::<B> {
			hooks: &mut self.hooks,
			components: &mut self.components,
			component: id,
			id_attribute: &id_attribute,
			added: Vec::new(),
			removed: Vec::new(),
		};
		let summary = morph(&mut self.browser, root, &incoming, to, MorphOptions::new(&self.config.prefix, id, dirty), &mut session);
		let Session { added, removed, .. } = session;
		trace!(?summary);

		for removed in removed {
			self.remove_component(&removed);
		}
		let browser = &self.browser;
		self.polls.retain_nodes(|node| browser.is_connected(node));
		self.offline_elements.retain(|(_, node, _)| browser.is_connected(node));
		self.pending_inputs.retain(|pending| browser.is_connected(&pending.node));

		// Morphing resets attributes the offline state added.
		for (owner, node, directive) in &self.offline_elements {
			if owner == id {
				offline::apply(&mut self.browser, node, directive, self.offline);
			}
		}

		for node in added {
			if self.browser.kind(&node) != NodeKind::Element {
				continue;
			}
			if self.browser.attribute(&node, &id_attribute).is_some() {
				if let Err(init_error) = self.initialize_component(node) {
					error!("Failed to initialize added component: {}", init_error);
				}
			} else {
				self.init_subtree(id, &node);
			}
		}
		self.listen_for_directives(id);
		self.record_children(id);
	}

	/// Registers event types of directives that updated elements gained during a morph.
	fn listen_for_directives(&mut self, id: &str) {
		let Some(root) = self.components.get(id).map(|live| live.root().clone()) else {
			return;
		};
		let id_attribute = self.attribute_name("id");
		let prefix = &self.config.prefix;
		let browser = &self.browser;
		let mut events = Vec::new();
		let mut collect = |node: &B::Node| {
			for directive in Directives::of(browser, node, prefix).iter() {
				match directive.kind.as_str() {
					"model" => events.push(if directive.has_modifier("lazy") { "change" } else { "input" }.to_owned()),
					kind if NON_EVENT_DIRECTIVES.contains(&kind) => (),
					kind => events.push(kind.to_owned()),
				}
			}
		};
		collect(&root);
		dom::walk(browser, &root, &mut |node| {
			if browser.attribute(node, &id_attribute).is_some() {
				return Visit::SkipChildren;
			}
			collect(node);
			Visit::Continue
		});
		for event in events {
			self.listen(id, &event);
		}
	}

	/// Rewrites the nested component bookkeeping of `id` from the live DOM.
	fn record_children(&mut self, id: &str) {
		let Some(root) = self.components.get(id).map(|live| live.root().clone()) else {
			return;
		};
		let id_attribute = self.attribute_name("id");
		let key_attribute = self.attribute_name("key");
		let mut children = Vec::new();
		let browser = &self.browser;
		dom::walk(browser, &root, &mut |node| match browser.attribute(node, &id_attribute) {
			Some(child) => {
				children.push(ChildRef {
					key: browser.attribute(node, &key_attribute).unwrap_or_else(|| child.clone()),
					id: child,
					tag: browser.tag_name(node),
				});
				Visit::SkipChildren
			}
			None => Visit::Continue,
		});
		if let Some(live) = self.components.get_mut(id) {
			live.memo_mut().children = children;
		}
	}

	/// Controls bound with `model` in `id`'s own subtree.
	fn bound_controls(&self, id: &str) -> Vec<(B::Node, Directive)> {
		let Some(live) = self.components.get(id) else {
			return Vec::new();
		};
		let id_attribute = self.attribute_name("id");
		let prefix = &self.config.prefix;
		let browser = &self.browser;
		let mut controls = Vec::new();
		dom::walk(browser, live.root(), &mut |node| {
			if browser.attribute(node, &id_attribute).is_some() {
				return Visit::SkipChildren;
			}
			if let Some(model) = Directives::of(browser, node, prefix).get("model") {
				controls.push((node.clone(), model.clone()));
			}
			Visit::Continue
		});
		controls
	}

	/// Writes server values of `dirty` fields into their bound controls.
	fn refresh_models(&mut self, id: &str, dirty: &[String]) {
		if dirty.is_empty() {
			return;
		}
		for (node, directive) in self.bound_controls(id) {
			let field = directive.value.trim();
			let affected = dirty.iter().any(|dirty| field == dirty || field.starts_with(&format!("{}.", dirty)) || dirty.starts_with(&format!("{}.", field)));
			if !affected {
				continue;
			}
			let Some(value) = self.components.get(id).and_then(|live| live.get(field)).cloned() else {
				continue;
			};
			self.hooks.call(&HookEvent::InterceptModelSetValue { element: &node, value: &value, component: id });
			dom::set_input_value(&mut self.browser, &node, &value);
		}
	}

	/// Handles one user interaction.
	#[instrument(skip(self, event), fields(event = event.event.as_str()))]
	pub fn trigger(&mut self, event: &UserEvent<B::Node>) {
		let id_attribute = self.attribute_name("id");
		let Some(root) = dom::closest_with_attribute(&self.browser, &event.target, &id_attribute) else {
			return;
		};
		let Some(component) = self.browser.attribute(&root, &id_attribute) else {
			return;
		};
		if !self.components.contains_key(&component) {
			trace!(component = component.as_str(), "Event inside an uninitialized component.");
			return;
		}

		let mut current = Some(event.target.clone());
		while let Some(node) = current {
			if self.handle_directives(&component, &node, event) || node == root {
				break;
			}
			current = self.browser.parent(&node);
		}
	}

	fn handle_directives(&mut self, component: &str, node: &B::Node, event: &UserEvent<B::Node>) -> bool {
		let directives = Directives::of(&self.browser, node, &self.config.prefix);
		let mut handled = false;
		for directive in directives.iter() {
			match directive.kind.as_str() {
				"model" => {
					let lazy = directive.has_modifier("lazy");
					if (event.event == "input" && !lazy) || (event.event == "change" && lazy) {
						self.user_input(component, node, directive);
						handled = true;
					}
				}
				kind if NON_EVENT_DIRECTIVES.contains(&kind) => (),
				kind if kind == event.event => {
					if key_matches(directive, event) {
						self.run_directive(component, node, directive);
						handled = true;
					}
				}
				_ if event.event == "mouseenter" && directive.has_modifier("prefetch") => {
					let (method, params) = directive.method_and_params();
					let id = self.next_action_id();
					if let Err(runtime_error) = self.prefetch(component, Action::CallMethod { id, method, params }) {
						warn!("Prefetch failed: {}", runtime_error);
					}
					handled = true;
				}
				_ => (),
			}
		}
		handled
	}

	fn run_directive(&mut self, component: &str, node: &B::Node, directive: &Directive) {
		fn first_string(params: &mut Vec<Value>) -> String {
			if params.is_empty() {
				String::new()
			} else {
				dom::value_to_string(&params.remove(0))
			}
		}

		let (method, mut params) = directive.method_and_params();
		let result = match method.as_str() {
			"$emit" => {
				let event = first_string(&mut params);
				self.emit(&event, params);
				Ok(())
			}
			"$emitTo" => {
				let name = first_string(&mut params);
				let event = first_string(&mut params);
				self.emit_to(&name, &event, params);
				Ok(())
			}
			"$emitSelf" => {
				let event = first_string(&mut params);
				self.emit_self(component, &event, params);
				Ok(())
			}
			"$emitUp" => {
				let event = first_string(&mut params);
				self.emit_up(component, &event, params);
				Ok(())
			}
			"$dispatch" => {
				let event = first_string(&mut params);
				let detail = params.into_iter().next().unwrap_or(Value::Null);
				self.browser.dispatch_event(node, &event, &detail);
				Ok(())
			}
			"$navigate" => {
				let url = first_string(&mut params);
				self.navigate(component, &url).map(drop)
			}
			_ => self.call(component, &method, params).map(drop),
		};
		if let Err(runtime_error) = result {
			error!("`{}` directive failed: {}", directive.raw_name, runtime_error);
		}
	}

	/// A bound control changed.
	fn user_input(&mut self, component: &str, node: &B::Node, directive: &Directive) {
		let field = directive.value.trim().to_owned();
		let current = self.components.get(component).and_then(|live| live.get_including_defers(&field)).cloned();
		let value = dom::value_from_input(&self.browser, node, current.as_ref());

		if directive.has_modifier("defer") {
			if let Err(runtime_error) = self.sync_input(component, &field, value, true, true) {
				error!("Deferred input failed: {}", runtime_error);
			}
			return;
		}

		let text_like = match self.browser.tag_name(node).as_str() {
			"textarea" => true,
			"input" => !matches!(self.browser.attribute(node, "type").map(|kind| kind.to_ascii_lowercase()).as_deref(), Some("checkbox" | "radio" | "file" | "hidden")),
			_ => false,
		};
		let debounce = if text_like && !directive.has_modifier("lazy") {
			directive.duration_or(self.config.model_debounce_ms)
		} else {
			0
		};

		self.pending_inputs.retain(|pending| !(pending.component == component && pending.field == field));
		if debounce == 0 {
			if let Err(runtime_error) = self.sync_input(component, &field, value, false, true) {
				error!("Input failed: {}", runtime_error);
			}
		} else {
			trace!(field = field.as_str(), debounce, "Debouncing input");
			self.pending_inputs.push(PendingInput {
				component: component.to_owned(),
				field,
				node: node.clone(),
				due: self.now + debounce,
			});
		}
	}

	/// Queues the current value of every debounced input matching `filter`.
	fn fire_pending_inputs(&mut self, filter: impl Fn(&PendingInput<B::Node>) -> bool) {
		if self.pending_inputs.is_empty() {
			return;
		}
		let (fire, keep): (Vec<_>, Vec<_>) = self.pending_inputs.drain(..).partition(|pending| filter(pending));
		self.pending_inputs = keep;
		for pending in fire {
			let current = self.components.get(&pending.component).and_then(|live| live.get_including_defers(&pending.field)).cloned();
			let value = dom::value_from_input(&self.browser, &pending.node, current.as_ref());
			if let Err(runtime_error) = self.sync_input(&pending.component, &pending.field, value, false, true) {
				error!("Debounced input failed: {}", runtime_error);
			}
		}
	}

	/// Switches elements with `offline` directives and pauses polling.
	pub fn set_offline(&mut self, offline: bool) {
		if self.offline == offline {
			return;
		}
		debug!(offline, "Connectivity changed");
		self.offline = offline;
		for (_, node, directive) in &self.offline_elements {
			offline::apply(&mut self.browser, node, directive, offline);
		}
	}

	/// While in the background, only `keep-alive` polls run.
	pub fn set_background(&mut self, background: bool) {
		self.background = background;
	}
}

/// Key event directives like `keydown.enter` only run for the named key.
fn key_matches<N>(directive: &Directive, event: &UserEvent<N>) -> bool {
	if !directive.kind.starts_with("key") {
		return true;
	}
	let mut keys = directive
		.modifiers
		.iter()
		.filter(|modifier| !BEHAVIOR_MODIFIERS.contains(&modifier.as_str()) && !modifier.ends_with("ms") && modifier.parse::<u64>().is_err())
		.peekable();
	if keys.peek().is_none() {
		return true;
	}
	let Some(pressed) = event.key.as_deref() else {
		return false;
	};
	let pressed = pressed.to_ascii_lowercase();
	keys.any(|key| {
		let key = key.to_ascii_lowercase();
		key == pressed || (key == "space" && pressed == " ") || (key == "esc" && pressed == "escape") || key.replace('-', "") == pressed.replace('-', "")
	})
}
