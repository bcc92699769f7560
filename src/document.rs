//! An arena-backed document with the live form state a browser keeps next to attributes.
//!
//! Incoming markup is always parsed into one of these before reconciliation. It also serves as
//! the client's DOM wherever there is no browser, for example on the server side of tests.

use crate::{
	client::dom::{Browser, Dom, NodeKind, UserEvent},
	markup::{self, VOID_ELEMENTS},
};
use serde_json::Value;
use std::{collections::VecDeque, fmt::Write as _};
use tracing::{error, warn};

/// Index of a node in its [`Document`]. Only meaningful for the document that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq)]
enum Content {
	Element { tag: String, attributes: Vec<(String, String)> },
	Text(String),
	Comment(String),
}

#[derive(Debug, Clone)]
struct Slot {
	content: Content,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
	value: String,
	checked: bool,
	selected: bool,
}

/// A `CustomEvent` fired through [`Browser::dispatch_event`].
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
	pub target: NodeId,
	pub event: String,
	pub detail: Value,
}

/// Handle returned by [`Browser::listen`] on a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone)]
pub struct Document {
	slots: Vec<Slot>,
	body: NodeId,
	focused: Option<NodeId>,
	listeners: Vec<(ListenerId, String)>,
	next_listener: u64,
	events: VecDeque<UserEvent<NodeId>>,
	dispatched: Vec<DispatchedEvent>,
	redirects: Vec<String>,
	navigations: Vec<String>,
	expiry_prompts: usize,
	error_pages: Vec<String>,
}

impl Default for Document {
	fn default() -> Self {
		Self::new()
	}
}

impl Document {
	#[must_use]
	pub fn new() -> Self {
		let mut document = Self {
			slots: Vec::new(),
			body: NodeId(0),
			focused: None,
			listeners: Vec::new(),
			next_listener: 0,
			events: VecDeque::new(),
			dispatched: Vec::new(),
			redirects: Vec::new(),
			navigations: Vec::new(),
			expiry_prompts: 0,
			error_pages: Vec::new(),
		};
		document.body = document.create_element("body");
		document
	}

	/// Parses `markup` into a fresh document's body.
	#[must_use]
	pub fn parse(markup: &str) -> Self {
		markup::parse_fragment(markup)
	}

	#[must_use]
	pub fn body(&self) -> NodeId {
		self.body
	}

	fn push(&mut self, content: Content) -> NodeId {
		self.slots.push(Slot {
			content,
			parent: None,
			children: Vec::new(),
			value: String::new(),
			checked: false,
			selected: false,
		});
		NodeId(self.slots.len() - 1)
	}

	pub fn create_element(&mut self, tag: &str) -> NodeId {
		self.push(Content::Element {
			tag: tag.to_ascii_lowercase(),
			attributes: Vec::new(),
		})
	}

	pub fn create_text(&mut self, text: &str) -> NodeId {
		self.push(Content::Text(text.to_owned()))
	}

	pub fn create_comment(&mut self, comment: &str) -> NodeId {
		self.push(Content::Comment(comment.to_owned()))
	}

	#[must_use]
	pub fn kind(&self, node: NodeId) -> NodeKind {
		match self.slots[node.0].content {
			Content::Element { .. } => NodeKind::Element,
			Content::Text(_) => NodeKind::Text,
			Content::Comment(_) => NodeKind::Comment,
		}
	}

	#[must_use]
	pub fn tag(&self, node: NodeId) -> Option<&str> {
		match &self.slots[node.0].content {
			Content::Element { tag, .. } => Some(tag),
			_ => None,
		}
	}

	#[must_use]
	pub fn attributes(&self, node: NodeId) -> &[(String, String)] {
		match &self.slots[node.0].content {
			Content::Element { attributes, .. } => attributes,
			_ => &[],
		}
	}

	#[must_use]
	pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
		self.attributes(node).iter().find(|(existing, _)| existing == name).map(|(_, value)| value.as_str())
	}

	pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
		match &mut self.slots[node.0].content {
			Content::Element { attributes, .. } => match attributes.iter_mut().find(|(existing, _)| existing == name) {
				Some((_, existing)) => value.clone_into(existing),
				None => attributes.push((name.to_owned(), value.to_owned())),
			},
			_ => error!("Tried to set attribute {:?} on a character data node; Ignoring it.", name),
		}
	}

	pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
		if let Content::Element { attributes, .. } = &mut self.slots[node.0].content {
			attributes.retain(|(existing, _)| existing != name);
		}
	}

	/// Data of a text or comment node.
	#[must_use]
	pub fn data(&self, node: NodeId) -> Option<&str> {
		match &self.slots[node.0].content {
			Content::Text(data) | Content::Comment(data) => Some(data),
			Content::Element { .. } => None,
		}
	}

	pub fn set_data(&mut self, node: NodeId, data: &str) {
		match &mut self.slots[node.0].content {
			Content::Text(existing) | Content::Comment(existing) => data.clone_into(existing),
			Content::Element { .. } => error!("Tried to set character data of an element; Ignoring it."),
		}
	}

	#[must_use]
	pub fn children(&self, node: NodeId) -> &[NodeId] {
		&self.slots[node.0].children
	}

	#[must_use]
	pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
		self.children(node).iter().copied().filter(|&child| self.kind(child) == NodeKind::Element).collect()
	}

	#[must_use]
	pub fn first_element_child(&self, node: NodeId) -> Option<NodeId> {
		self.children(node).iter().copied().find(|&child| self.kind(child) == NodeKind::Element)
	}

	#[must_use]
	pub fn parent(&self, node: NodeId) -> Option<NodeId> {
		self.slots[node.0].parent
	}

	pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
		self.insert_before(parent, child, None);
	}

	/// Moves `child` in front of `reference` (or to the end), detaching it from its old parent first.
	pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
		if parent == child || self.is_ancestor(child, parent) {
			return error!("Tried to insert a node into itself; Ignoring it.");
		}
		self.detach(child);
		let children = &mut self.slots[parent.0].children;
		let index = match reference {
			Some(reference) => match children.iter().position(|&existing| existing == reference) {
				Some(index) => index,
				None => {
					warn!("Reference node is not a child of the parent; Appending instead.");
					children.len()
				}
			},
			None => children.len(),
		};
		children.insert(index, child);
		self.slots[child.0].parent = Some(parent);
	}

	pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
		if self.slots[child.0].parent == Some(parent) {
			self.detach(child);
		} else {
			warn!("Tried to remove a node from a parent it isn't attached to; Ignoring it.");
		}
	}

	fn detach(&mut self, node: NodeId) {
		if let Some(parent) = self.slots[node.0].parent.take() {
			self.slots[parent.0].children.retain(|&child| child != node);
		}
		if let Some(focused) = self.focused {
			if focused == node || self.is_ancestor(node, focused) {
				self.focused = None;
			}
		}
	}

	/// Whether `ancestor` strictly encloses `node`.
	#[must_use]
	pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
		let mut current = self.parent(node);
		while let Some(parent) = current {
			if parent == ancestor {
				return true;
			}
			current = self.parent(parent);
		}
		false
	}

	#[must_use]
	pub fn is_connected(&self, node: NodeId) -> bool {
		node == self.body || self.is_ancestor(self.body, node)
	}

	/// Depth-first, document order, including `root`.
	#[must_use]
	pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
		let mut out = Vec::new();
		let mut stack = vec![root];
		while let Some(node) = stack.pop() {
			out.push(node);
			stack.extend(self.children(node).iter().rev().copied());
		}
		out
	}

	#[must_use]
	pub fn find_by_attribute(&self, name: &str, value: &str) -> Option<NodeId> {
		self.descendants(self.body).into_iter().find(|&node| self.attribute(node, name) == Some(value))
	}

	#[must_use]
	pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
		self.find_by_attribute("id", id)
	}

	#[must_use]
	pub fn text_content(&self, node: NodeId) -> String {
		self.descendants(node).into_iter().filter_map(|node| match &self.slots[node.0].content {
			Content::Text(text) => Some(text.as_str()),
			_ => None,
		}).collect()
	}

	/// Re-derives value/checked/selected from attributes and content, like a form reset.
	pub fn reset_form_state(&mut self, node: NodeId) {
		let (value, checked, selected) = match self.tag(node) {
			Some("input") => (self.attribute(node, "value").unwrap_or_default().to_owned(), self.attribute(node, "checked").is_some(), false),
			Some("textarea") => (self.text_content(node), false, false),
			Some("option") => (String::new(), false, self.attribute(node, "selected").is_some()),
			_ => return,
		};
		let slot = &mut self.slots[node.0];
		slot.value = value;
		slot.checked = checked;
		slot.selected = selected;
	}

	fn option_value(&self, option: NodeId) -> String {
		self.attribute(option, "value").map_or_else(|| self.text_content(option).trim().to_owned(), ToOwned::to_owned)
	}

	fn options(&self, select: NodeId) -> Vec<NodeId> {
		self.descendants(select).into_iter().filter(|&node| self.tag(node) == Some("option")).collect()
	}

	/// The current value of a form control. For a `<select>` that is the first selected option's value.
	#[must_use]
	pub fn value(&self, node: NodeId) -> String {
		match self.tag(node) {
			Some("select") => self.options(node).into_iter().find(|&option| self.slots[option.0].selected).map(|option| self.option_value(option)).unwrap_or_default(),
			Some("option") => self.option_value(node),
			_ => self.slots[node.0].value.clone(),
		}
	}

	pub fn set_value(&mut self, node: NodeId, value: &str) {
		if self.tag(node) == Some("select") {
			for option in self.options(node) {
				let selected = self.option_value(option) == value;
				self.slots[option.0].selected = selected;
			}
		} else {
			value.clone_into(&mut self.slots[node.0].value);
		}
	}

	#[must_use]
	pub fn checked(&self, node: NodeId) -> bool {
		self.slots[node.0].checked
	}

	pub fn set_checked(&mut self, node: NodeId, checked: bool) {
		self.slots[node.0].checked = checked;
	}

	#[must_use]
	pub fn selected(&self, node: NodeId) -> bool {
		self.slots[node.0].selected
	}

	pub fn set_selected(&mut self, node: NodeId, selected: bool) {
		self.slots[node.0].selected = selected;
	}

	pub fn focus(&mut self, node: NodeId) {
		self.focused = Some(node);
	}

	pub fn blur(&mut self) {
		self.focused = None;
	}

	#[must_use]
	pub fn focused(&self) -> Option<NodeId> {
		self.focused
	}

	/// Deep-copies `node` from another document. The copy is detached.
	pub fn import_node(&mut self, source: &Document, node: NodeId) -> NodeId {
		let copy = self.push(source.slots[node.0].content.clone());
		let slot = &source.slots[node.0];
		let (value, checked, selected) = (slot.value.clone(), slot.checked, slot.selected);
		for &child in source.children(node) {
			let child = self.import_node(source, child);
			self.append_child(copy, child);
		}
		let slot = &mut self.slots[copy.0];
		slot.value = value;
		slot.checked = checked;
		slot.selected = selected;
		copy
	}

	#[must_use]
	pub fn outer_html(&self, node: NodeId) -> String {
		let mut html = String::new();
		self.write_html(node, &mut html);
		html
	}

	#[must_use]
	pub fn inner_html(&self, node: NodeId) -> String {
		let mut html = String::new();
		for &child in self.children(node) {
			self.write_html(child, &mut html);
		}
		html
	}

	fn write_html(&self, node: NodeId, html: &mut String) {
		match &self.slots[node.0].content {
			Content::Text(text) => {
				let raw = self.parent(node).and_then(|parent| self.tag(parent)).map_or(false, |tag| tag == "script" || tag == "style");
				if raw {
					html.push_str(text);
				} else {
					html.push_str(&markup::escape_text(text));
				}
			}
			Content::Comment(comment) => {
				let _ = write!(html, "<!--{}-->", comment);
			}
			Content::Element { tag, attributes } => {
				html.push('<');
				html.push_str(tag);
				for (name, value) in attributes {
					let _ = write!(html, " {}=\"{}\"", name, markup::escape_attribute(value));
				}
				html.push('>');
				if VOID_ELEMENTS.contains(&tag.as_str()) {
					return;
				}
				for &child in self.children(node) {
					self.write_html(child, html);
				}
				let _ = write!(html, "</{}>", tag);
			}
		}
	}

	/// Simulates a user interaction. Returns `false` (and drops the event) if nobody listens for `event`.
	pub fn fire(&mut self, target: NodeId, event: &str) -> bool {
		self.fire_key(target, event, None)
	}

	/// Like [`Document::fire`], with a `KeyboardEvent.key`.
	pub fn fire_key(&mut self, target: NodeId, event: &str, key: Option<&str>) -> bool {
		if !self.is_listening(event) {
			return false;
		}
		self.events.push_back(UserEvent {
			target,
			event: event.to_owned(),
			key: key.map(str::to_ascii_lowercase),
		});
		true
	}

	#[must_use]
	pub fn is_listening(&self, event: &str) -> bool {
		self.listeners.iter().any(|(_, listened)| listened == event)
	}

	#[must_use]
	pub fn dispatched_events(&self) -> &[DispatchedEvent] {
		&self.dispatched
	}

	#[must_use]
	pub fn redirects(&self) -> &[String] {
		&self.redirects
	}

	#[must_use]
	pub fn navigations(&self) -> &[String] {
		&self.navigations
	}

	/// How often the user was asked to reload an expired page.
	#[must_use]
	pub fn expiry_prompts(&self) -> usize {
		self.expiry_prompts
	}

	#[must_use]
	pub fn error_pages(&self) -> &[String] {
		&self.error_pages
	}
}

impl Dom for Document {
	type Node = NodeId;

	fn kind(&self, node: &NodeId) -> NodeKind {
		Document::kind(self, *node)
	}

	fn tag_name(&self, node: &NodeId) -> String {
		self.tag(*node).unwrap_or_default().to_owned()
	}

	fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
		Document::attribute(self, *node, name).map(ToOwned::to_owned)
	}

	fn attributes(&self, node: &NodeId) -> Vec<(String, String)> {
		Document::attributes(self, *node).to_vec()
	}

	fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) {
		Document::set_attribute(self, *node, name, value);
	}

	fn remove_attribute(&mut self, node: &NodeId, name: &str) {
		Document::remove_attribute(self, *node, name);
	}

	fn data(&self, node: &NodeId) -> String {
		Document::data(self, *node).unwrap_or_default().to_owned()
	}

	fn set_data(&mut self, node: &NodeId, data: &str) {
		Document::set_data(self, *node, data);
	}

	fn children(&self, node: &NodeId) -> Vec<NodeId> {
		Document::children(self, *node).to_vec()
	}

	fn parent(&self, node: &NodeId) -> Option<NodeId> {
		Document::parent(self, *node)
	}

	fn insert_before(&mut self, parent: &NodeId, child: &NodeId, reference: Option<&NodeId>) {
		Document::insert_before(self, *parent, *child, reference.copied());
	}

	fn remove_child(&mut self, parent: &NodeId, child: &NodeId) {
		Document::remove_child(self, *parent, *child);
	}

	fn import(&mut self, source: &Document, node: NodeId) -> NodeId {
		self.import_node(source, node)
	}

	fn is_connected(&self, node: &NodeId) -> bool {
		Document::is_connected(self, *node)
	}

	fn has_focus(&self, node: &NodeId) -> bool {
		self.focused == Some(*node)
	}

	fn value(&self, node: &NodeId) -> String {
		Document::value(self, *node)
	}

	fn set_value(&mut self, node: &NodeId, value: &str) {
		Document::set_value(self, *node, value);
	}

	fn checked(&self, node: &NodeId) -> bool {
		Document::checked(self, *node)
	}

	fn set_checked(&mut self, node: &NodeId, checked: bool) {
		Document::set_checked(self, *node, checked);
	}

	fn selected(&self, node: &NodeId) -> bool {
		Document::selected(self, *node)
	}

	fn set_selected(&mut self, node: &NodeId, selected: bool) {
		Document::set_selected(self, *node, selected);
	}
}

impl Browser for Document {
	type Listener = ListenerId;

	fn body(&self) -> NodeId {
		self.body
	}

	fn listen(&mut self, event: &str) -> ListenerId {
		let id = ListenerId(self.next_listener);
		self.next_listener += 1;
		self.listeners.push((id, event.to_owned()));
		id
	}

	fn unlisten(&mut self, event: &str, listener: ListenerId) {
		let before = self.listeners.len();
		self.listeners.retain(|(id, _)| *id != listener);
		if self.listeners.len() == before {
			warn!(event, "Unlistening an unknown listener.");
		}
	}

	fn poll_event(&mut self) -> Option<UserEvent<NodeId>> {
		self.events.pop_front()
	}

	fn dispatch_event(&mut self, target: &NodeId, event: &str, detail: &Value) {
		self.dispatched.push(DispatchedEvent {
			target: *target,
			event: event.to_owned(),
			detail: detail.clone(),
		});
	}

	fn redirect(&mut self, url: &str) {
		self.redirects.push(url.to_owned());
	}

	fn navigate(&mut self, url: &str) {
		self.navigations.push(url.to_owned());
	}

	fn session_expired(&mut self) {
		self.expiry_prompts += 1;
	}

	fn show_error(&mut self, html: &str) {
		self.error_pages.push(html.to_owned());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn form_state_follows_markup() {
		let document = Document::parse(r#"<input value="a" checked><select><option>x</option><option value="y" selected>Y</option></select><textarea>t</textarea>"#);
		let elements = document.element_children(document.body());
		assert_eq!(document.value(elements[0]), "a");
		assert!(document.checked(elements[0]));
		assert_eq!(document.value(elements[1]), "y");
		assert_eq!(document.value(elements[2]), "t");
	}

	#[test]
	fn removing_focused_subtree_blurs() {
		let mut document = Document::parse("<div><input></div>");
		let div = document.first_element_child(document.body()).unwrap();
		let input = document.first_element_child(div).unwrap();
		document.focus(input);
		document.remove_child(document.body(), div);
		assert_eq!(document.focused(), None);
		assert!(!document.is_connected(input));
	}

	#[test]
	fn serializes_back() {
		let markup = r#"<div class="a">x &amp; y<br><!--c--></div>"#;
		let document = Document::parse(markup);
		assert_eq!(document.inner_html(document.body()), markup);
	}

	#[test]
	fn moves_nodes_between_parents() {
		let mut document = Document::parse("<ul><li>1</li><li>2</li></ul>");
		let ul = document.first_element_child(document.body()).unwrap();
		let items = document.element_children(ul);
		document.insert_before(ul, items[1], Some(items[0]));
		assert_eq!(document.inner_html(ul), "<li>2</li><li>1</li>");
	}
}
