//! Copies between the live DOM and parsed [`Document`]s.

use crate::{
	client::dom::NodeKind,
	document::{Document, NodeId},
};
use tracing::warn;
use wasm_bindgen::JsCast;
use web_sys::{Attr, CharacterData, Element, NamedNodeMap, Node, NodeList};

/// Appends copies of `child_nodes` to `parent` in `target`.
pub fn load_child_nodes(child_nodes: &NodeList, target: &mut Document, parent: NodeId) {
	for i in 0..child_nodes.length() {
		let Some(child) = child_nodes.item(i) else {
			continue;
		};
		let loaded = if let Some(element) = child.dyn_ref::<Element>() {
			load_element(element, target)
		} else if let Some(character_data) = child.dyn_ref::<CharacterData>() {
			if child.node_type() == Node::COMMENT_NODE {
				target.create_comment(&character_data.data())
			} else {
				target.create_text(&character_data.data())
			}
		} else {
			warn!("Skipping unrecognised child node of type {}.", child.node_type());
			continue;
		};
		target.append_child(parent, loaded);
	}
}

/// Copies `element` and its subtree into `target`, detached.
pub fn load_element(element: &Element, target: &mut Document) -> NodeId {
	let loaded = target.create_element(&element.tag_name());
	for (name, value) in load_attributes(&element.attributes()) {
		target.set_attribute(loaded, &name, &value);
	}
	let node: &Node = element.as_ref();
	load_child_nodes(&node.child_nodes(), target, loaded);
	loaded
}

#[must_use]
pub fn load_attributes(attributes: &NamedNodeMap) -> Vec<(String, String)> {
	(0..attributes.length()).filter_map(|i| attributes.item(i)).map(|attribute| load_attribute(&attribute)).collect()
}

#[must_use]
pub fn load_attribute(attribute: &Attr) -> (String, String) {
	(attribute.name(), attribute.value())
}

/// Builds detached DOM nodes for `node` of `source`.
pub fn materialize(document: &web_sys::Document, source: &Document, node: NodeId) -> Node {
	match source.kind(node) {
		NodeKind::Text => document.create_text_node(source.data(node).unwrap_or_default()).into(),
		NodeKind::Comment => document.create_comment(source.data(node).unwrap_or_default()).into(),
		NodeKind::Element => {
			let tag = source.tag(node).unwrap_or("div");
			let element = match document.create_element(tag) {
				Ok(element) => element,
				Err(error) => {
					warn!("Can't create <{}>: {:?}; Substituting a comment.", tag, error);
					return document.create_comment(tag).into();
				}
			};
			for (name, value) in source.attributes(node) {
				if let Err(error) = element.set_attribute(name, value) {
					warn!("Can't set attribute {:?} on <{}>: {:?}", name, tag, error);
				}
			}
			let parent: &Node = element.as_ref();
			for &child in source.children(node) {
				if let Err(error) = parent.append_child(&materialize(document, source, child)) {
					warn!("Can't append to <{}>: {:?}", tag, error);
				}
			}
			element.into()
		}
	}
}
