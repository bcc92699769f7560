use live_component::{
	client::{morph, Dom, Incoming, MorphObserver, MorphOptions, MorphSummary, Visit},
	document::{Document, NodeId},
};

fn parse_root(markup: &str) -> (Document, NodeId) {
	let document = Document::parse(markup);
	let root = document.first_element_child(document.body()).unwrap();
	(document, root)
}

fn morph_into(live: &mut Document, root: NodeId, markup: &str, dirty: &[String]) -> MorphSummary {
	let (incoming, to) = parse_root(markup);
	morph(live, &root, &incoming, to, MorphOptions::new("live:", "c", dirty), &mut ())
}

#[test]
fn keyed_children_are_moved_not_recreated() {
	let (mut live, root) = parse_root(r#"<div live:id="c"><ul><li live:key="a">A</li><li live:key="b">B</li><li live:key="c">C</li></ul></div>"#);
	let ul = live.first_element_child(root).unwrap();
	let before = live.element_children(ul);

	let summary = morph_into(&mut live, root, r#"<div live:id="c"><ul><li live:key="c">C</li><li live:key="a">A!</li></ul></div>"#, &[]);
	let after = live.element_children(ul);
	assert_eq!(after, [before[2], before[0]]);
	assert_eq!(live.inner_html(ul), r#"<li live:key="c">C</li><li live:key="a">A!</li>"#);
	assert!(!live.is_connected(before[1]));
	assert_eq!(summary.removed, 1);
	assert_eq!(summary.moved, 1);
	assert_eq!(summary.added, 0);
}

#[test]
fn ids_match_before_position() {
	let (mut live, root) = parse_root(r#"<div live:id="c"><p id="first">1</p><p id="second">2</p></div>"#);
	let second = live.get_element_by_id("second").unwrap();
	morph_into(&mut live, root, r#"<div live:id="c"><p>new</p><p id="second">2</p></div>"#, &[]);
	assert_eq!(live.get_element_by_id("second"), Some(second));
	assert_eq!(live.get_element_by_id("first"), None);
	assert_eq!(live.inner_html(root), r#"<p>new</p><p id="second">2</p>"#);
}

#[test]
fn unkeyed_children_match_by_position() {
	let (mut live, root) = parse_root(r#"<div live:id="c"><p>1</p><p>2</p>text</div>"#);
	let first = live.first_element_child(root).unwrap();
	let summary = morph_into(&mut live, root, r#"<div live:id="c" class="on"><p>one</p></div>"#, &[]);
	assert_eq!(live.first_element_child(root), Some(first));
	assert_eq!(live.outer_html(root), r#"<div live:id="c" class="on"><p>one</p></div>"#);
	assert_eq!(summary.removed, 2);
}

#[test]
fn identical_markup_changes_nothing() {
	let markup = r#"<div live:id="c"><p class="a">x</p></div>"#;
	let (mut live, root) = parse_root(markup);
	let summary = morph_into(&mut live, root, markup, &[]);
	assert_eq!(summary, MorphSummary { unchanged: 1, ..MorphSummary::default() });
}

#[test]
fn ignored_elements() {
	let (mut live, root) = parse_root(r#"<div live:id="c"><div live:ignore id="x"><span>client</span></div><p live:ignore.self class="old">old</p></div>"#);
	morph_into(
		&mut live,
		root,
		r#"<div live:id="c"><div live:ignore id="x" class="server"><span>server</span></div><p live:ignore.self class="new">new</p></div>"#,
		&[],
	);
	let x = live.get_element_by_id("x").unwrap();
	assert_eq!(live.outer_html(x), r#"<div live:ignore="" id="x"><span>client</span></div>"#);
	let p = live.find_by_attribute("live:ignore.self", "").unwrap();
	assert_eq!(live.attribute(p, "class"), Some("old"));
	assert_eq!(live.text_content(p), "new");
}

#[test]
fn nested_components_are_left_alone() {
	let (mut live, root) = parse_root(r#"<div live:id="c"><h1>a</h1><div live:id="child"><b>kept</b></div></div>"#);
	let summary = morph_into(&mut live, root, r#"<div live:id="c"><h1>b</h1><div live:id="child"></div></div>"#, &[]);
	let child = live.find_by_attribute("live:id", "child").unwrap();
	assert_eq!(live.inner_html(child), "<b>kept</b>");
	assert_eq!(summary.skipped, 1);
}

#[test]
fn focused_controls_keep_user_input() {
	let live_markup = r#"<div live:id="c"><input live:model="name" class="a"></div>"#;
	let incoming = r#"<div live:id="c"><input live:model="name" class="b" value="server"></div>"#;

	let (mut live, root) = parse_root(live_markup);
	let input = live.first_element_child(root).unwrap();
	live.set_value(input, "typed");
	live.focus(input);
	morph_into(&mut live, root, incoming, &[]);
	assert_eq!(live.value(input), "typed");
	assert_eq!(live.attribute(input, "class"), Some("b"), "attributes still update");

	let (mut live, root) = parse_root(live_markup);
	let input = live.first_element_child(root).unwrap();
	live.set_value(input, "typed");
	live.focus(input);
	morph_into(&mut live, root, incoming, &["name".to_owned()]);
	assert_eq!(live.value(input), "server", "the server changed the bound field");

	let (mut live, root) = parse_root(live_markup);
	let input = live.first_element_child(root).unwrap();
	live.set_value(input, "typed");
	morph_into(&mut live, root, incoming, &[]);
	assert_eq!(live.value(input), "server");
}

#[test]
fn select_follows_new_markup() {
	let (mut live, root) = parse_root(r#"<div live:id="c"><select><option value="a">A</option><option value="b" selected>B</option></select></div>"#);
	let select = live.first_element_child(root).unwrap();
	live.set_value(select, "a");
	assert_eq!(live.value(select), "a");

	morph_into(
		&mut live,
		root,
		r#"<div live:id="c"><select><option value="a">A</option><option value="b" selected>B</option><option value="c">C</option></select></div>"#,
		&[],
	);
	assert_eq!(live.value(select), "b");
	assert_eq!(live.element_children(select).len(), 3);
}

#[derive(Default)]
struct Recorder {
	updating: usize,
	added: Vec<String>,
	removing: Vec<String>,
	stop_on: Option<&'static str>,
}

impl MorphObserver<Document> for Recorder {
	fn updating(&mut self, dom: &Document, from: &NodeId, _to: Incoming<'_>) -> Visit {
		self.updating += 1;
		if self.stop_on.map_or(false, |tag| dom.tag_name(from) == tag) {
			Visit::Stop
		} else {
			Visit::Continue
		}
	}

	fn removing(&mut self, dom: &Document, node: &NodeId) {
		self.removing.push(dom.outer_html(*node));
	}

	fn added(&mut self, dom: &mut Document, node: &NodeId) {
		self.added.push(dom.outer_html(*node));
	}
}

#[test]
fn observer_sees_additions_and_removals() {
	let (mut live, root) = parse_root(r#"<div live:id="c"><i>x</i></div>"#);
	let (incoming, to) = parse_root(r#"<div live:id="c"><b>y</b></div>"#);
	let mut recorder = Recorder::default();
	let summary = morph(&mut live, &root, &incoming, to, MorphOptions::new("live:", "c", &[]), &mut recorder);
	assert_eq!(recorder.removing, ["<i>x</i>"]);
	assert_eq!(recorder.added, ["<b>y</b>"]);
	assert_eq!(recorder.updating, 1);
	assert_eq!((summary.added, summary.removed), (1, 1));
}

#[test]
fn observer_can_abort() {
	let (mut live, root) = parse_root(r#"<div live:id="c"><section><p>old</p></section><p>old</p></div>"#);
	let (incoming, to) = parse_root(r#"<div live:id="c"><section><p>new</p></section><p>new</p></div>"#);
	let mut recorder = Recorder {
		stop_on: Some("section"),
		..Recorder::default()
	};
	let summary = morph(&mut live, &root, &incoming, to, MorphOptions::new("live:", "c", &[]), &mut recorder);
	assert!(summary.aborted);
	assert_eq!(live.inner_html(root), "<section><p>old</p></section><p>old</p>");
}
