//! The DOM surface the client runtime works against.
//!
//! [`crate::document::Document`] implements it in memory, the `web` module over `web-sys`.

use crate::document::{Document, NodeId};
use serde_json::Value;
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
	Element,
	Text,
	Comment,
}

/// Tri-state result of a tree visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
	Continue,
	/// Don't descend into this node, but keep walking its siblings.
	SkipChildren,
	/// Abort the whole walk.
	Stop,
}

pub trait Dom {
	type Node: Clone + PartialEq + Debug;

	fn kind(&self, node: &Self::Node) -> NodeKind;
	/// Lowercase tag name, or an empty string for character data.
	fn tag_name(&self, node: &Self::Node) -> String;
	fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;
	fn attributes(&self, node: &Self::Node) -> Vec<(String, String)>;
	fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str);
	fn remove_attribute(&mut self, node: &Self::Node, name: &str);
	/// Character data of text and comment nodes.
	fn data(&self, node: &Self::Node) -> String;
	fn set_data(&mut self, node: &Self::Node, data: &str);
	fn children(&self, node: &Self::Node) -> Vec<Self::Node>;
	fn parent(&self, node: &Self::Node) -> Option<Self::Node>;
	/// Moves `child` in front of `reference`, or to the end of `parent`.
	fn insert_before(&mut self, parent: &Self::Node, child: &Self::Node, reference: Option<&Self::Node>);
	fn remove_child(&mut self, parent: &Self::Node, child: &Self::Node);
	/// Deep-copies `node` of a parsed document into this DOM, detached.
	fn import(&mut self, source: &Document, node: NodeId) -> Self::Node;
	fn is_connected(&self, node: &Self::Node) -> bool;
	fn has_focus(&self, node: &Self::Node) -> bool;
	fn value(&self, node: &Self::Node) -> String;
	fn set_value(&mut self, node: &Self::Node, value: &str);
	fn checked(&self, node: &Self::Node) -> bool;
	fn set_checked(&mut self, node: &Self::Node, checked: bool);
	fn selected(&self, node: &Self::Node) -> bool;
	fn set_selected(&mut self, node: &Self::Node, selected: bool);

	fn element_children(&self, node: &Self::Node) -> Vec<Self::Node> {
		self.children(node).into_iter().filter(|child| self.kind(child) == NodeKind::Element).collect()
	}
}

/// A user interaction, as delivered by [`Browser::poll_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEvent<N> {
	pub target: N,
	/// DOM event type, e.g. `click`.
	pub event: String,
	/// `KeyboardEvent.key`, lowercased, for key events.
	pub key: Option<String>,
}

/// Window-level side effects and event delivery.
pub trait Browser: Dom {
	/// Handle of a registered event type listener.
	type Listener;

	/// The element components are searched in.
	fn body(&self) -> Self::Node;
	/// Starts reporting `event` through [`Browser::poll_event`].
	fn listen(&mut self, event: &str) -> Self::Listener;
	fn unlisten(&mut self, event: &str, listener: Self::Listener);
	/// One pending user interaction, if any.
	fn poll_event(&mut self) -> Option<UserEvent<Self::Node>>;

	/// Fires a bubbling `CustomEvent` with `detail` at `target`.
	fn dispatch_event(&mut self, target: &Self::Node, event: &str, detail: &Value);
	/// Full page load.
	fn redirect(&mut self, url: &str);
	/// Client-side page transition.
	fn navigate(&mut self, url: &str);
	/// Tell the user the page expired and offer a reload.
	fn session_expired(&mut self);
	/// Show a failed response's body to the developer.
	fn show_error(&mut self, html: &str);
}

/// Walks the element descendants of `root` (not `root` itself) in document order.
///
/// Returns `false` iff the visitor stopped the walk.
pub fn walk<D: Dom + ?Sized>(dom: &D, root: &D::Node, visitor: &mut impl FnMut(&D::Node) -> Visit) -> bool {
	for child in dom.element_children(root) {
		match visitor(&child) {
			Visit::Stop => return false,
			Visit::SkipChildren => (),
			Visit::Continue => {
				if !walk(dom, &child, visitor) {
					return false;
				}
			}
		}
	}
	true
}

/// The nearest element at or above `node` carrying `attribute`.
pub fn closest_with_attribute<D: Dom + ?Sized>(dom: &D, node: &D::Node, attribute: &str) -> Option<D::Node> {
	let mut current = Some(node.clone());
	while let Some(node) = current {
		if dom.kind(&node) == NodeKind::Element && dom.attribute(&node, attribute).is_some() {
			return Some(node);
		}
		current = dom.parent(&node);
	}
	None
}

/// Strict ancestors of `node`, nearest first.
pub fn ancestors<D: Dom + ?Sized>(dom: &D, node: &D::Node) -> Vec<D::Node> {
	let mut out = Vec::new();
	let mut current = dom.parent(node);
	while let Some(parent) = current {
		current = dom.parent(&parent);
		out.push(parent);
	}
	out
}

/// A model value as it appears in a form control.
#[must_use]
pub fn value_to_string(value: &Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::String(string) => string.clone(),
		other => other.to_string(),
	}
}

fn is_checkbox<D: Dom + ?Sized>(dom: &D, node: &D::Node) -> bool {
	dom.tag_name(node) == "input" && dom.attribute(node, "type").map_or(false, |kind| kind.eq_ignore_ascii_case("checkbox"))
}

fn is_radio<D: Dom + ?Sized>(dom: &D, node: &D::Node) -> bool {
	dom.tag_name(node) == "input" && dom.attribute(node, "type").map_or(false, |kind| kind.eq_ignore_ascii_case("radio"))
}

fn options<D: Dom + ?Sized>(dom: &D, select: &D::Node) -> Vec<D::Node> {
	let mut options = Vec::new();
	walk(dom, select, &mut |node| {
		if dom.tag_name(node) == "option" {
			options.push(node.clone());
		}
		Visit::Continue
	});
	options
}

fn option_value<D: Dom + ?Sized>(dom: &D, option: &D::Node) -> String {
	dom.attribute(option, "value").unwrap_or_else(|| dom.value(option))
}

/// Reads the value a bound control contributes to its model.
///
/// A checkbox bound to an array toggles its own value in `current`.
pub fn value_from_input<D: Dom + ?Sized>(dom: &D, node: &D::Node, current: Option<&Value>) -> Value {
	if is_checkbox(dom, node) {
		let checked = dom.checked(node);
		return match (current, dom.attribute(node, "value")) {
			(Some(Value::Array(values)), Some(own)) => {
				let mut values: Vec<Value> = values.iter().filter(|value| value_to_string(value) != own).cloned().collect();
				if checked {
					values.push(Value::String(own));
				}
				Value::Array(values)
			}
			_ => Value::Bool(checked),
		};
	}
	if dom.tag_name(node) == "select" && dom.attribute(node, "multiple").is_some() {
		return Value::Array(options(dom, node).iter().filter(|option| dom.selected(option)).map(|option| Value::String(option_value(dom, option))).collect());
	}
	Value::String(dom.value(node))
}

/// Writes a model value into a bound control.
pub fn set_input_value<D: Dom + ?Sized>(dom: &mut D, node: &D::Node, value: &Value) {
	if is_radio(dom, node) {
		let checked = dom.attribute(node, "value").map_or(false, |own| own == value_to_string(value));
		dom.set_checked(node, checked);
	} else if is_checkbox(dom, node) {
		let checked = match value {
			Value::Array(values) => dom.attribute(node, "value").map_or(false, |own| values.iter().any(|value| value_to_string(value) == own)),
			Value::Bool(checked) => *checked,
			Value::Null => false,
			other => !value_to_string(other).is_empty() && value_to_string(other) != "0",
		};
		dom.set_checked(node, checked);
	} else if dom.tag_name(node) == "select" {
		let wanted: Vec<String> = match value {
			Value::Array(values) => values.iter().map(value_to_string).collect(),
			other => vec![value_to_string(other)],
		};
		for option in options(dom, node) {
			let selected = wanted.contains(&option_value(dom, &option));
			dom.set_selected(&option, selected);
		}
	} else {
		dom.set_value(node, &value_to_string(value));
	}
}
