//! Browser bindings: a [`Browser`] over `web-sys`, an `XMLHttpRequest` [`Transport`] and a timer-driven boot.

pub mod load;

use crate::{
	client::{
		dom::{Browser, Dom, NodeKind, UserEvent},
		HttpReply, OutboundRequest, Runtime, Ticket, Transport,
	},
	config::ClientConfig,
	document::{Document, NodeId},
	error::TransportError,
};
use hashbrown::HashMap;
use serde_json::Value;
use std::{cell::RefCell, collections::VecDeque, rc::Rc};
use tracing::{debug, error, instrument, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{
	CharacterData, CustomEvent, CustomEventInit, Element, Event, HtmlInputElement, HtmlOptionElement, HtmlSelectElement, HtmlTextAreaElement, KeyboardEvent, Node, Window, XmlHttpRequest,
};

type EventQueue = Rc<RefCell<VecDeque<UserEvent<Node>>>>;

/// A registered delegating listener. Dropping it without [`Browser::unlisten`] leaves a dead listener behind.
#[derive(Debug)]
pub struct WebListener(Closure<dyn FnMut(Event)>);

/// The page's DOM.
#[derive(Debug, Clone)]
pub struct WebDom {
	window: Window,
	document: web_sys::Document,
	prefix: String,
	events: EventQueue,
}

impl WebDom {
	/// `None` outside of a window context.
	#[must_use]
	pub fn new(prefix: &str) -> Option<Self> {
		let window = web_sys::window()?;
		let document = window.document()?;
		Some(Self {
			window,
			document,
			prefix: prefix.to_owned(),
			events: EventQueue::default(),
		})
	}

	#[must_use]
	pub fn window(&self) -> &Window {
		&self.window
	}

	/// Copies the subtree at `node` into a [`Document`], for inspection.
	#[must_use]
	pub fn snapshot(&self, node: &Node) -> Document {
		let mut document = Document::new();
		let body = document.body();
		match node.dyn_ref::<Element>() {
			Some(element) => {
				let copy = load::load_element(element, &mut document);
				document.append_child(body, copy);
			}
			None => load::load_child_nodes(&node.child_nodes(), &mut document, body),
		}
		document
	}
}

/// Applies `prevent`/`stop` modifiers of the nearest directive for this event, which can't wait for the next tick.
fn apply_modifiers(prefix: &str, event: &Event, target: &Node) {
	let directive = format!("{}{}", prefix, event.type_());
	let mut current = Some(target.clone());
	while let Some(node) = current {
		if let Some(element) = node.dyn_ref::<Element>() {
			let modifiers = load::load_attributes(&element.attributes())
				.into_iter()
				.find_map(|(name, _)| name.strip_prefix(&directive).filter(|rest| rest.is_empty() || rest.starts_with('.')).map(ToOwned::to_owned));
			if let Some(modifiers) = modifiers {
				if modifiers.split('.').any(|modifier| modifier == "prevent") {
					event.prevent_default();
				}
				if modifiers.split('.').any(|modifier| modifier == "stop") {
					event.stop_propagation();
				}
				return;
			}
		}
		current = node.parent_node();
	}
}

impl Dom for WebDom {
	type Node = Node;

	fn kind(&self, node: &Node) -> NodeKind {
		match node.node_type() {
			Node::ELEMENT_NODE => NodeKind::Element,
			Node::COMMENT_NODE => NodeKind::Comment,
			_ => NodeKind::Text,
		}
	}

	fn tag_name(&self, node: &Node) -> String {
		node.dyn_ref::<Element>().map(|element| element.tag_name().to_ascii_lowercase()).unwrap_or_default()
	}

	fn attribute(&self, node: &Node, name: &str) -> Option<String> {
		node.dyn_ref::<Element>()?.get_attribute(name)
	}

	fn attributes(&self, node: &Node) -> Vec<(String, String)> {
		node.dyn_ref::<Element>().map(|element| load::load_attributes(&element.attributes())).unwrap_or_default()
	}

	fn set_attribute(&mut self, node: &Node, name: &str, value: &str) {
		if let Some(element) = node.dyn_ref::<Element>() {
			if let Err(error) = element.set_attribute(name, value) {
				warn!("Can't set attribute {:?}: {:?}", name, error);
			}
		}
	}

	fn remove_attribute(&mut self, node: &Node, name: &str) {
		if let Some(element) = node.dyn_ref::<Element>() {
			if let Err(error) = element.remove_attribute(name) {
				warn!("Can't remove attribute {:?}: {:?}", name, error);
			}
		}
	}

	fn data(&self, node: &Node) -> String {
		node.dyn_ref::<CharacterData>().map(CharacterData::data).unwrap_or_default()
	}

	fn set_data(&mut self, node: &Node, data: &str) {
		if let Some(character_data) = node.dyn_ref::<CharacterData>() {
			character_data.set_data(data);
		}
	}

	fn children(&self, node: &Node) -> Vec<Node> {
		let child_nodes = node.child_nodes();
		(0..child_nodes.length()).filter_map(|i| child_nodes.item(i)).collect()
	}

	fn parent(&self, node: &Node) -> Option<Node> {
		node.parent_node()
	}

	fn insert_before(&mut self, parent: &Node, child: &Node, reference: Option<&Node>) {
		if let Err(error) = parent.insert_before(child, reference) {
			error!("Failed to insert node: {:?}", error);
		}
	}

	fn remove_child(&mut self, parent: &Node, child: &Node) {
		if let Err(error) = parent.remove_child(child) {
			error!("Failed to remove node: {:?}", error);
		}
	}

	fn import(&mut self, source: &Document, node: NodeId) -> Node {
		load::materialize(&self.document, source, node)
	}

	fn is_connected(&self, node: &Node) -> bool {
		node.is_connected()
	}

	fn has_focus(&self, node: &Node) -> bool {
		self.document.active_element().map_or(false, |active| {
			let active: &Node = active.as_ref();
			active == node
		})
	}

	fn value(&self, node: &Node) -> String {
		if let Some(input) = node.dyn_ref::<HtmlInputElement>() {
			input.value()
		} else if let Some(text_area) = node.dyn_ref::<HtmlTextAreaElement>() {
			text_area.value()
		} else if let Some(select) = node.dyn_ref::<HtmlSelectElement>() {
			select.value()
		} else if let Some(option) = node.dyn_ref::<HtmlOptionElement>() {
			option.value()
		} else {
			self.attribute(node, "value").unwrap_or_default()
		}
	}

	fn set_value(&mut self, node: &Node, value: &str) {
		if let Some(input) = node.dyn_ref::<HtmlInputElement>() {
			input.set_value(value);
		} else if let Some(text_area) = node.dyn_ref::<HtmlTextAreaElement>() {
			text_area.set_value(value);
		} else if let Some(select) = node.dyn_ref::<HtmlSelectElement>() {
			select.set_value(value);
		} else {
			self.set_attribute(node, "value", value);
		}
	}

	fn checked(&self, node: &Node) -> bool {
		node.dyn_ref::<HtmlInputElement>().map_or(false, HtmlInputElement::checked)
	}

	fn set_checked(&mut self, node: &Node, checked: bool) {
		if let Some(input) = node.dyn_ref::<HtmlInputElement>() {
			input.set_checked(checked);
		}
	}

	fn selected(&self, node: &Node) -> bool {
		node.dyn_ref::<HtmlOptionElement>().map_or(false, HtmlOptionElement::selected)
	}

	fn set_selected(&mut self, node: &Node, selected: bool) {
		if let Some(option) = node.dyn_ref::<HtmlOptionElement>() {
			option.set_selected(selected);
		}
	}
}

impl Browser for WebDom {
	type Listener = WebListener;

	fn body(&self) -> Node {
		match self.document.body() {
			Some(body) => body.into(),
			None => self.document.clone().into(),
		}
	}

	#[instrument(skip(self))]
	fn listen(&mut self, event: &str) -> WebListener {
		let queue = Rc::clone(&self.events);
		let prefix = self.prefix.clone();
		let closure = Closure::wrap(Box::new(move |event: Event| {
			let Some(target) = event.target().and_then(|target| target.dyn_into::<Node>().ok()) else {
				return;
			};
			apply_modifiers(&prefix, &event, &target);
			let key = event.dyn_ref::<KeyboardEvent>().map(|keyboard| keyboard.key().to_ascii_lowercase());
			queue.borrow_mut().push_back(UserEvent { target, event: event.type_(), key });
		}) as Box<dyn FnMut(Event)>);
		// Capturing, so that non-bubbling events like `mouseenter` are seen too.
		if let Err(error) = self.document.add_event_listener_with_callback_and_bool(event, closure.as_ref().unchecked_ref(), true) {
			error!("Failed to listen for {:?}: {:?}", event, error);
		}
		WebListener(closure)
	}

	fn unlisten(&mut self, event: &str, listener: WebListener) {
		if let Err(error) = self.document.remove_event_listener_with_callback_and_bool(event, listener.0.as_ref().unchecked_ref(), true) {
			error!("Failed to stop listening for {:?}: {:?}", event, error);
		}
	}

	fn poll_event(&mut self) -> Option<UserEvent<Node>> {
		self.events.borrow_mut().pop_front()
	}

	fn dispatch_event(&mut self, target: &Node, event: &str, detail: &Value) {
		let detail = js_sys::JSON::parse(&detail.to_string()).unwrap_or(JsValue::NULL);
		let mut init = CustomEventInit::new();
		init.bubbles(true);
		init.detail(&detail);
		match CustomEvent::new_with_event_init_dict(event, &init) {
			Ok(custom_event) => {
				if let Err(error) = target.dispatch_event(&custom_event) {
					error!("Failed to dispatch {:?}: {:?}", event, error);
				}
			}
			Err(error) => error!("Can't create event {:?}: {:?}", event, error),
		}
	}

	fn redirect(&mut self, url: &str) {
		if let Err(error) = self.window.location().set_href(url) {
			error!("Redirect failed: {:?}", error);
		}
	}

	fn navigate(&mut self, url: &str) {
		let pushed = self.window.history().and_then(|history| history.push_state_with_url(&JsValue::NULL, "", Some(url)));
		if let Err(error) = pushed {
			warn!("History update failed ({:?}); Falling back to a full page load.", error);
			self.redirect(url);
		}
	}

	fn session_expired(&mut self) {
		let reload = self.window.confirm_with_message("This page has expired.\nWould you like to refresh the page?").unwrap_or(false);
		if reload {
			if let Err(error) = self.window.location().reload() {
				error!("Reload failed: {:?}", error);
			}
		}
	}

	fn show_error(&mut self, html: &str) {
		let modal = match (self.document.create_element("div"), self.document.create_element("iframe")) {
			(Ok(modal), Ok(frame)) => {
				let _ = modal.set_attribute("style", "position:fixed;inset:0;padding:50px;background:rgba(0,0,0,.6);z-index:200000");
				let _ = frame.set_attribute("style", "width:100%;height:100%;border-radius:5px;background:#fff");
				let _ = frame.set_attribute("srcdoc", html);
				let modal_node: &Node = modal.as_ref();
				let _ = modal_node.append_child(frame.as_ref());
				modal
			}
			(Err(error), _) | (_, Err(error)) => {
				error!("Can't show error page: {:?}", error);
				return;
			}
		};
		let modal_node: Node = modal.into();
		let close = modal_node.clone();
		let on_click = Closure::once_into_js(move || {
			if let Some(parent) = close.parent_node() {
				let _ = parent.remove_child(&close);
			}
		});
		let _ = modal_node.add_event_listener_with_callback("click", on_click.unchecked_ref());
		let body = self.body();
		if let Err(error) = body.append_child(&modal_node) {
			error!("Can't show error page: {:?}", error);
		}
	}
}

type Replies = Rc<RefCell<VecDeque<(Ticket, Result<HttpReply, TransportError>)>>>;

/// Sends turns with `XMLHttpRequest`.
#[derive(Debug, Default)]
pub struct XhrTransport {
	replies: Replies,
	pending: HashMap<Ticket, (XmlHttpRequest, Closure<dyn FnMut()>)>,
}

impl XhrTransport {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}
}

fn parse_headers(raw: &str) -> Vec<(String, String)> {
	raw.lines()
		.filter_map(|line| {
			let (name, value) = line.split_once(':')?;
			Some((name.trim().to_owned(), value.trim().to_owned()))
		})
		.collect()
}

impl Transport for XhrTransport {
	#[instrument(skip(self, request), fields(url = request.url.as_str()))]
	fn send(&mut self, ticket: Ticket, request: OutboundRequest) {
		let fail = |replies: &Replies, error: JsValue| {
			replies.borrow_mut().push_back((ticket, Err(TransportError::Network(format!("{:?}", error)))));
		};
		let xhr = match XmlHttpRequest::new() {
			Ok(xhr) => xhr,
			Err(error) => return fail(&self.replies, error),
		};
		if let Err(error) = xhr.open(request.method, &request.url) {
			return fail(&self.replies, error);
		}
		for (name, value) in &request.headers {
			if let Err(error) = xhr.set_request_header(name, value) {
				warn!("Can't set request header {:?}: {:?}", name, error);
			}
		}

		let replies = Rc::clone(&self.replies);
		let handle = xhr.clone();
		let done = Closure::wrap(Box::new(move || {
			let reply = match handle.status() {
				Ok(0) | Err(_) => Err(TransportError::Network("no response".to_owned())),
				Ok(status) => Ok(HttpReply {
					status,
					headers: parse_headers(&handle.get_all_response_headers().unwrap_or_default()),
					body: handle.response_text().ok().flatten().unwrap_or_default(),
				}),
			};
			replies.borrow_mut().push_back((ticket, reply));
		}) as Box<dyn FnMut()>);
		xhr.set_onloadend(Some(done.as_ref().unchecked_ref()));

		if let Err(error) = xhr.send_with_opt_str(Some(&request.body)) {
			return fail(&self.replies, error);
		}
		self.pending.insert(ticket, (xhr, done));
	}

	fn poll(&mut self) -> Option<(Ticket, Result<HttpReply, TransportError>)> {
		let reply = self.replies.borrow_mut().pop_front()?;
		self.pending.remove(&reply.0);
		Some(reply)
	}
}

pub type WebRuntime = Runtime<WebDom, XhrTransport>;

/// A runtime running on the current page. Stops ticking when dropped.
pub struct Booted {
	runtime: Rc<RefCell<WebRuntime>>,
	window: Window,
	interval: i32,
	_tick: Closure<dyn FnMut()>,
	connectivity: Vec<(&'static str, Closure<dyn FnMut()>)>,
}

impl Booted {
	#[must_use]
	pub fn runtime(&self) -> &Rc<RefCell<WebRuntime>> {
		&self.runtime
	}
}

impl Drop for Booted {
	fn drop(&mut self) {
		self.window.clear_interval_with_handle(self.interval);
		for (event, closure) in &self.connectivity {
			let _ = self.window.remove_event_listener_with_callback(event, closure.as_ref().unchecked_ref());
		}
	}
}

fn now() -> u64 {
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let now = js_sys::Date::now() as u64;
	now
}

/// Initializes the components on the page and ticks the runtime every `interval_ms`.
///
/// # Errors
///
/// Outside of a window context, or iff the timer can't be started.
pub fn boot(config: ClientConfig, interval_ms: i32) -> Result<Booted, JsValue> {
	let browser = WebDom::new(&config.prefix).ok_or_else(|| JsValue::from_str("no window"))?;
	let window = browser.window().clone();
	let runtime = Rc::new(RefCell::new(Runtime::new(config, browser, XhrTransport::new())));
	let initialized = runtime.borrow_mut().start(now());
	debug!(initialized, "Booted");

	let ticking = Rc::clone(&runtime);
	let tick = Closure::wrap(Box::new(move || {
		if let Ok(mut runtime) = ticking.try_borrow_mut() {
			runtime.tick(now());
		}
	}) as Box<dyn FnMut()>);
	let interval = window.set_interval_with_callback_and_timeout_and_arguments_0(tick.as_ref().unchecked_ref(), interval_ms)?;

	let mut connectivity = Vec::new();
	for (event, offline) in [("online", false), ("offline", true)] {
		let target = Rc::clone(&runtime);
		let closure = Closure::wrap(Box::new(move || {
			if let Ok(mut runtime) = target.try_borrow_mut() {
				runtime.set_offline(offline);
			}
		}) as Box<dyn FnMut()>);
		window.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())?;
		connectivity.push((event, closure));
	}
	let target = Rc::clone(&runtime);
	let visibility = Closure::wrap(Box::new(move || {
		if let (Ok(mut runtime), Some(document)) = (target.try_borrow_mut(), web_sys::window().and_then(|window| window.document())) {
			runtime.set_background(document.hidden());
		}
	}) as Box<dyn FnMut()>);
	window.add_event_listener_with_callback("visibilitychange", visibility.as_ref().unchecked_ref())?;
	connectivity.push(("visibilitychange", visibility));

	Ok(Booted {
		runtime,
		window,
		interval,
		_tick: tick,
		connectivity: connectivity,
	})
}
