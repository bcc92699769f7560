#![cfg(target_arch = "wasm32")]

use live_component::{
	client::{morph, Dom, MorphOptions},
	document::{Document, NodeId},
	web::{load, WebDom},
};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, Element, HtmlBodyElement};

wasm_bindgen_test_configure!(run_in_browser);

fn mount_root(markup: &str) -> Element {
	let _ = tracing_wasm::try_set_as_global_default();
	let body = window().unwrap().document().unwrap().body().unwrap().dyn_into::<HtmlBodyElement>().unwrap();
	body.set_inner_html(markup);
	body.first_element_child().unwrap()
}

fn incoming(markup: &str) -> (Document, NodeId) {
	let document = Document::parse(markup);
	let root = document.first_element_child(document.body()).unwrap();
	(document, root)
}

#[wasm_bindgen_test]
fn snapshot_round_trip() {
	let root = mount_root(r#"<div live:id="c"><p class="x">Hello live-component!</p><!--note--></div>"#);
	let dom = WebDom::new("live:").unwrap();
	let snapshot = dom.snapshot(&root.clone().into());
	let copy = snapshot.first_element_child(snapshot.body()).unwrap();
	assert_eq!(snapshot.outer_html(copy), root.outer_html());
}

#[wasm_bindgen_test]
fn morph_keeps_element_identity() {
	let root = mount_root(r#"<div live:id="c"><span id="count">0</span><button id="inc">+</button></div>"#);
	let button = root.query_selector("#inc").unwrap().unwrap();
	let mut dom = WebDom::new("live:").unwrap();

	let (document, to) = incoming(r#"<div live:id="c"><span id="count">1</span><button id="inc" class="pressed">+</button><em>new</em></div>"#);
	let summary = morph(&mut dom, &root.clone().into(), &document, to, MorphOptions::new("live:", "c", &[]), &mut ());
	assert!(!summary.aborted);
	assert_eq!(summary.added, 1);

	let after = root.query_selector("#inc").unwrap().unwrap();
	assert!(after.is_same_node(Some(button.as_ref())));
	assert_eq!(after.get_attribute("class").as_deref(), Some("pressed"));
	assert_eq!(root.query_selector("#count").unwrap().unwrap().text_content().as_deref(), Some("1"));
}

#[wasm_bindgen_test]
fn materialize_builds_real_nodes() {
	let root = mount_root("<div></div>");
	let (document, node) = incoming(r#"<ul live:key="list"><li>a</li><li>b</li></ul>"#);
	let created = load::materialize(&window().unwrap().document().unwrap(), &document, node);
	root.append_child(&created).unwrap();
	assert_eq!(root.inner_html(), r#"<ul live:key="list"><li>a</li><li>b</li></ul>"#);

	let dom = WebDom::new("live:").unwrap();
	assert_eq!(dom.element_children(&created).len(), 2);
}
