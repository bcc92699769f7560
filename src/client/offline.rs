//! `offline` directives: elements that react to losing the connection.
//!
//! Without modifiers the element is `hidden` while online. `.class="a b"` adds the classes while
//! offline (`.class.remove` removes them instead), `.attr="disabled"` sets the attribute while offline.

use super::{
	directives::Directive,
	dom::{Dom, NodeKind},
};
use tracing::trace;

fn classes<D: Dom + ?Sized>(dom: &D, node: &D::Node) -> Vec<String> {
	dom.attribute(node, "class").unwrap_or_default().split_whitespace().map(str::to_owned).collect()
}

pub fn add_classes<D: Dom + ?Sized>(dom: &mut D, node: &D::Node, added: &str) {
	let mut current = classes(dom, node);
	for class in added.split_whitespace() {
		if !current.iter().any(|existing| existing == class) {
			current.push(class.to_owned());
		}
	}
	dom.set_attribute(node, "class", &current.join(" "));
}

pub fn remove_classes<D: Dom + ?Sized>(dom: &mut D, node: &D::Node, removed: &str) {
	let removed: Vec<&str> = removed.split_whitespace().collect();
	let current: Vec<String> = classes(dom, node).into_iter().filter(|class| !removed.contains(&class.as_str())).collect();
	if current.is_empty() {
		dom.remove_attribute(node, "class");
	} else {
		dom.set_attribute(node, "class", &current.join(" "));
	}
}

/// Brings `node` into its online or offline appearance.
pub fn apply<D: Dom + ?Sized>(dom: &mut D, node: &D::Node, directive: &Directive, offline: bool) {
	if dom.kind(node) != NodeKind::Element {
		return;
	}
	trace!(offline, modifiers = ?directive.modifiers, "Applying offline state");
	if directive.has_modifier("class") {
		let add = offline != directive.has_modifier("remove");
		if add {
			add_classes(dom, node, &directive.value);
		} else {
			remove_classes(dom, node, &directive.value);
		}
	} else if directive.has_modifier("attr") {
		let name = directive.value.trim();
		if offline {
			dom.set_attribute(node, name, "true");
		} else {
			dom.remove_attribute(node, name);
		}
	} else if offline {
		dom.remove_attribute(node, "hidden");
	} else {
		dom.set_attribute(node, "hidden", "");
	}
}
