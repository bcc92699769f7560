//! Minimal-mutation reconciliation of a live component root against freshly rendered markup.
//!
//! Children are matched by `key` directive, then by component id, then by native `id`, then by
//! tag and position. Matched nodes are moved into place rather than recreated, so element identity,
//! focus and listeners survive re-renders.

use super::{
	dom::{Dom, NodeKind, Visit},
	hooks::Incoming,
};
use crate::{
	document::{Document, NodeId},
	temp_set::TempSet,
};
use tracing::{error, info, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};

#[derive(Debug, Clone, Copy)]
pub struct MorphOptions<'a> {
	/// Directive attribute prefix, e.g. `live:`.
	pub prefix: &'a str,
	/// Id of the component whose root is being morphed. Elements hosting any other id are left alone.
	pub component_id: &'a str,
	/// Fields changed on the server this turn. Focused controls bound to other fields keep their value.
	pub dirty: &'a [String],
	pub depth_limit: usize,
}

impl<'a> MorphOptions<'a> {
	#[must_use]
	pub fn new(prefix: &'a str, component_id: &'a str, dirty: &'a [String]) -> Self {
		Self {
			prefix,
			component_id,
			dirty,
			depth_limit: 256,
		}
	}
}

/// Receives the reconciler's lifecycle callbacks.
#[allow(unused_variables)]
pub trait MorphObserver<D: Dom + ?Sized> {
	/// About to update `from` to match `to`. [`Visit::SkipChildren`] leaves the element untouched, [`Visit::Stop`] aborts the morph.
	fn updating(&mut self, dom: &D, from: &D::Node, to: Incoming<'_>) -> Visit {
		Visit::Continue
	}

	fn updated(&mut self, dom: &D, node: &D::Node) {}

	/// About to detach `node` (with its subtree) from the document.
	fn removing(&mut self, dom: &D, node: &D::Node) {}

	/// `node` was newly inserted.
	fn added(&mut self, dom: &mut D, node: &D::Node) {}
}

/// An observer that does nothing.
impl<D: Dom + ?Sized> MorphObserver<D> for () {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MorphSummary {
	pub updated: usize,
	pub unchanged: usize,
	pub skipped: usize,
	pub added: usize,
	pub moved: usize,
	pub removed: usize,
	pub aborted: bool,
}

/// Morphs the live element `from` (and its subtree) into `to` of `incoming`.
#[instrument(skip(dom, from, incoming, observer))]
pub fn morph<D, O>(dom: &mut D, from: &D::Node, incoming: &Document, to: NodeId, options: MorphOptions<'_>, observer: &mut O) -> MorphSummary
where
	D: Dom + ?Sized,
	O: MorphObserver<D> + ?Sized,
{
	let mut morpher = Morpher {
		options,
		incoming,
		keys: TempSet::new(),
		summary: MorphSummary::default(),
	};
	morpher.morph_element(dom, observer, from, to, true, options.depth_limit);

	info!(summary = ?morpher.summary, "Morphed component {}", options.component_id);
	if STATIC_MAX_LEVEL >= Level::WARN && morpher.keys.capacity() >= 1000 {
		warn!(
			"The key scratch capacity is large ({}).\n\
			This may point to very long keyed lists.",
			morpher.keys.capacity()
		);
	}
	morpher.summary
}

struct Morpher<'a> {
	options: MorphOptions<'a>,
	incoming: &'a Document,
	keys: TempSet<String>,
	summary: MorphSummary,
}

impl Morpher<'_> {
	fn attribute_name(&self, directive: &str) -> String {
		format!("{}{}", self.options.prefix, directive)
	}

	fn live_key<D: Dom + ?Sized>(&self, dom: &D, node: &D::Node) -> Option<String> {
		if dom.kind(node) != NodeKind::Element {
			return None;
		}
		dom.attribute(node, &self.attribute_name("key"))
			.map(|key| format!("key:{}", key))
			.or_else(|| dom.attribute(node, &self.attribute_name("id")).map(|id| format!("component:{}", id)))
			.or_else(|| dom.attribute(node, "id").map(|id| format!("id:{}", id)))
	}

	fn incoming_key(&self, node: NodeId) -> Option<String> {
		let incoming = self.incoming;
		incoming.tag(node)?;
		incoming
			.attribute(node, &self.attribute_name("key"))
			.map(|key| format!("key:{}", key))
			.or_else(|| incoming.attribute(node, &self.attribute_name("id")).map(|id| format!("component:{}", id)))
			.or_else(|| incoming.attribute(node, "id").map(|id| format!("id:{}", id)))
	}

	fn compatible<D: Dom + ?Sized>(&self, dom: &D, live: &D::Node, node: NodeId) -> bool {
		let kind = dom.kind(live);
		kind == self.incoming.kind(node) && (kind != NodeKind::Element || self.incoming.tag(node) == Some(dom.tag_name(live).as_str()))
	}

	fn is_dirty(&self, field: &str) -> bool {
		self.options.dirty.iter().any(|dirty| {
			dirty == field
				|| dirty.strip_prefix(field).map_or(false, |rest| rest.starts_with('.'))
				|| field.strip_prefix(dirty.as_str()).map_or(false, |rest| rest.starts_with('.'))
		})
	}

	/// A focused control bound to a field the server didn't change keeps whatever the user typed.
	fn focus_guarded<D: Dom + ?Sized>(&self, dom: &D, node: &D::Node) -> bool {
		if !dom.has_focus(node) {
			return false;
		}
		let model = self.attribute_name("model");
		let field = dom.attributes(node).into_iter().find(|(name, _)| name == &model || name.starts_with(&format!("{}.", model))).map(|(_, field)| field);
		field.map_or(false, |field| !self.is_dirty(field.trim()))
	}

	#[allow(clippy::too_many_lines)]
	fn morph_element<D, O>(&mut self, dom: &mut D, observer: &mut O, from: &D::Node, to: NodeId, is_root: bool, depth_limit: usize)
	where
		D: Dom + ?Sized,
		O: MorphObserver<D> + ?Sized,
	{
		if self.summary.aborted {
			return;
		}
		if depth_limit == 0 {
			return error!("Depth limit reached");
		}

		match dom.kind(from) {
			NodeKind::Text | NodeKind::Comment => {
				let data = self.incoming.data(to).unwrap_or_default();
				if dom.data(from) == data {
					self.summary.unchanged += 1;
				} else {
					dom.set_data(from, data);
					self.summary.updated += 1;
				}
				return;
			}
			NodeKind::Element => (),
		}

		let tag = dom.tag_name(from);
		let span = trace_span!("Morphing element", tag = tag.as_str());
		let _enter = span.enter();

		if !is_root {
			if let Some(id) = dom.attribute(from, &self.attribute_name("id")) {
				if id != self.options.component_id {
					trace!(nested = id.as_str(), "Leaving nested component alone.");
					self.summary.skipped += 1;
					return;
				}
			}
		}

		if is_equal_node(dom, from, self.incoming, to) {
			self.summary.unchanged += 1;
			return;
		}

		match observer.updating(dom, from, Incoming { document: self.incoming, node: to }) {
			Visit::Continue => (),
			Visit::SkipChildren => {
				self.summary.skipped += 1;
				return;
			}
			Visit::Stop => {
				warn!("Morph aborted by observer.");
				self.summary.aborted = true;
				return;
			}
		}

		let ignore = self.attribute_name("ignore");
		if dom.attribute(from, &ignore).is_some() {
			self.summary.skipped += 1;
			return;
		}
		if dom.attribute(from, &format!("{}.self", ignore)).is_none() {
			self.update_attributes(dom, from, to);
		}

		let guarded = self.focus_guarded(dom, from);
		match tag.as_str() {
			"input" => {
				if guarded {
					trace!("Keeping value of focused input.");
				} else {
					let value = self.incoming.value(to);
					if dom.value(from) != value {
						dom.set_value(from, &value);
					}
					let checked = self.incoming.checked(to);
					if dom.checked(from) != checked {
						dom.set_checked(from, checked);
					}
				}
			}
			"textarea" => {
				if guarded {
					trace!("Keeping value of focused textarea.");
				} else {
					let value = self.incoming.value(to);
					if dom.value(from) != value {
						dom.set_value(from, &value);
					}
				}
			}
			_ => (),
		}

		if tag != "textarea" || !guarded {
			self.morph_children(dom, observer, from, to, depth_limit);
		}

		if tag == "select" && !guarded {
			self.reset_select(dom, from);
		}

		self.summary.updated += 1;
		observer.updated(dom, from);
	}

	/// Option selection follows the new markup's `selected` attributes rather than stale DOM state.
	fn reset_select<D: Dom + ?Sized>(&self, dom: &mut D, select: &D::Node) {
		let mut options = Vec::new();
		super::dom::walk(dom, select, &mut |node| {
			if dom.tag_name(node) == "option" {
				options.push(node.clone());
			}
			Visit::Continue
		});
		for option in options {
			let selected = dom.attribute(&option, "selected").is_some();
			if dom.selected(&option) != selected {
				dom.set_selected(&option, selected);
			}
		}
	}

	fn update_attributes<D: Dom + ?Sized>(&self, dom: &mut D, from: &D::Node, to: NodeId) {
		let a_1 = dom.attributes(from);
		let a_2 = self.incoming.attributes(to);
		let mut a_1: &[(String, String)] = &a_1;
		let mut a_2: &[(String, String)] = a_2;

		while !a_1.is_empty() && a_1.first() == a_2.first() {
			a_1 = &a_1[1..];
			a_2 = &a_2[1..];
		}
		while !a_1.is_empty() && a_1.last() == a_2.last() {
			a_1 = &a_1[..a_1.len() - 1];
			a_2 = &a_2[..a_2.len() - 1];
		}

		for (name, _) in a_1 {
			if !a_2.iter().any(|(added, _)| added == name) {
				dom.remove_attribute(from, name);
			}
		}
		for (name, value) in a_2 {
			if dom.attribute(from, name).as_deref() != Some(value.as_str()) {
				dom.set_attribute(from, name, value);
			}
		}
	}

	#[instrument(skip(self, dom, observer, parent, to))]
	fn morph_children<D, O>(&mut self, dom: &mut D, observer: &mut O, parent: &D::Node, to: NodeId, depth_limit: usize)
	where
		D: Dom + ?Sized,
		O: MorphObserver<D> + ?Sized,
	{
		let incoming_children = self.incoming.children(to).to_vec();

		if STATIC_MAX_LEVEL >= Level::WARN {
			let keys = self.keys.temp();
			for &child in &incoming_children {
				let key = self.incoming
					.attribute(child, &format!("{}key", self.options.prefix))
					.map(|key| format!("key:{}", key))
					.or_else(|| self.incoming.attribute(child, &format!("{}id", self.options.prefix)).map(|id| format!("component:{}", id)))
					.or_else(|| self.incoming.attribute(child, "id").map(|id| format!("id:{}", id)));
				if let Some(key) = key {
					if !keys.insert(key.clone()) {
						warn!("Duplicate key {:?} among siblings; Matching will be ambiguous.", key);
					}
				}
			}
		}

		for (i, &child) in incoming_children.iter().enumerate() {
			if self.summary.aborted {
				return;
			}
			let live = dom.children(parent);
			let candidates = live.get(i..).unwrap_or_default();
			let key = self.incoming_key(child);

			let matched = match &key {
				Some(key) => candidates.iter().find(|candidate| self.live_key(dom, candidate).as_ref() == Some(key) && self.compatible(dom, candidate, child)).cloned(),
				None => {
					let mut matched = None;
					for candidate in candidates {
						if self.live_key(dom, candidate).is_some() {
							continue;
						}
						if self.compatible(dom, candidate, child) {
							matched = Some(candidate.clone());
							break;
						}
						self.remove(dom, observer, parent, candidate);
					}
					matched
				}
			};

			let reference = dom.children(parent).get(i).cloned();
			match matched {
				Some(node) => {
					if reference.as_ref() != Some(&node) {
						dom.insert_before(parent, &node, reference.as_ref());
						self.summary.moved += 1;
					}
					self.morph_element(dom, observer, &node, child, false, depth_limit - 1);
				}
				None => {
					let node = dom.import(self.incoming, child);
					dom.insert_before(parent, &node, reference.as_ref());
					self.summary.added += 1;
					trace!(?key, "Inserted new node.");
					observer.added(dom, &node);
				}
			}
		}

		let live = dom.children(parent);
		for leftover in live.iter().skip(incoming_children.len()) {
			self.remove(dom, observer, parent, leftover);
		}
	}

	fn remove<D, O>(&mut self, dom: &mut D, observer: &mut O, parent: &D::Node, node: &D::Node)
	where
		D: Dom + ?Sized,
		O: MorphObserver<D> + ?Sized,
	{
		observer.removing(dom, node);
		dom.remove_child(parent, node);
		self.summary.removed += 1;
	}
}

/// Deep structural equality of a live node and a parsed one. Attribute order doesn't matter.
pub fn is_equal_node<D: Dom + ?Sized>(dom: &D, live: &D::Node, incoming: &Document, node: NodeId) -> bool {
	let kind = dom.kind(live);
	if kind != incoming.kind(node) {
		return false;
	}
	if kind != NodeKind::Element {
		return incoming.data(node) == Some(dom.data(live).as_str());
	}
	if incoming.tag(node) != Some(dom.tag_name(live).as_str()) {
		return false;
	}

	let mut live_attributes = dom.attributes(live);
	let mut incoming_attributes = incoming.attributes(node).to_vec();
	if live_attributes.len() != incoming_attributes.len() {
		return false;
	}
	live_attributes.sort();
	incoming_attributes.sort();
	if live_attributes != incoming_attributes {
		return false;
	}

	let live_children = dom.children(live);
	let incoming_children = incoming.children(node);
	live_children.len() == incoming_children.len()
		&& live_children.iter().zip(incoming_children).all(|(live, &node)| is_equal_node(dom, live, incoming, node))
}
