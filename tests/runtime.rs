mod common;

use common::{dispatcher, init_tracing, mount, nest, updates, ManualTransport};
use live_component::{
	client::{Hook, HookEvent, LoopbackTransport, Runtime, Transport},
	config::ClientConfig,
	document::{Document, NodeId},
	protocol::Action,
	server::Dispatcher,
};
use serde_json::{json, Value};
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
	sync::Arc,
};

fn boot<T: Transport>(markup: &str, transport: T) -> Runtime<Document, T> {
	init_tracing();
	let mut runtime = Runtime::new(ClientConfig::default(), Document::parse(markup), transport);
	runtime.start(0);
	runtime
}

fn loopback(dispatcher: &Arc<Dispatcher>) -> LoopbackTransport {
	LoopbackTransport::new(Arc::clone(dispatcher))
}

fn element(runtime: &Runtime<Document, impl Transport>, id: &str) -> NodeId {
	runtime.browser().get_element_by_id(id).unwrap()
}

fn text(runtime: &Runtime<Document, impl Transport>, id: &str) -> String {
	runtime.browser().text_content(element(runtime, id))
}

#[test]
fn start_initializes_roots() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({ "name": "Ada" }));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = Runtime::new(ClientConfig::default(), Document::parse(&mounted.html), loopback(&dispatcher));
	assert_eq!(runtime.start(0), 1);

	let root = *runtime.component(&id).unwrap().root();
	assert_eq!(runtime.browser().attribute(root, "live:initial-data"), None);
	assert_eq!(runtime.component(&id).unwrap().name(), "counter");
	assert!(runtime.is_listening("click"));
	assert!(runtime.is_listening("input"));
	assert_eq!(runtime.browser().value(element(&runtime, "name")), "Ada");
}

#[test]
fn click_increments() {
	let dispatcher = dispatcher();
	let mut runtime = boot(&mount(&dispatcher, "counter", json!({})).html, loopback(&dispatcher));

	let button = element(&runtime, "inc");
	assert!(runtime.browser_mut().fire(button, "click"));
	runtime.tick(1);
	assert!(runtime.transport().sent().is_empty(), "the queue debounces");
	runtime.tick(6);
	assert_eq!(runtime.transport().sent().len(), 1);
	assert_eq!(text(&runtime, "count"), "1");
	assert_eq!(element(&runtime, "inc"), button, "morphing keeps element identity");
}

#[test]
fn return_values_by_action_id() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({ "count": 41 }));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, loopback(&dispatcher));

	let action = runtime.call(&id, "increment", vec![]).unwrap();
	runtime.tick(5);
	let component = runtime.component_mut(&id).unwrap();
	assert_eq!(component.take_return(&action), Some(json!(42)));
	assert_eq!(component.take_return(&action), None);
	assert_eq!(component.get("count"), Some(&json!(42)));
}

#[test]
fn one_message_in_flight() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({}));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, ManualTransport::default());

	runtime.call(&id, "increment", vec![]).unwrap();
	runtime.tick(5);
	assert_eq!(runtime.transport().in_flight(), 1);

	runtime.call(&id, "increment", vec![]).unwrap();
	runtime.call(&id, "add", vec![json!(10)]).unwrap();
	runtime.tick(10);
	assert_eq!(runtime.transport().sent.len(), 1, "nothing is sent while a message is in flight");

	assert!(runtime.transport_mut().answer_next(&dispatcher));
	runtime.tick(11);
	assert_eq!(text(&runtime, "count"), "1");
	assert_eq!(runtime.transport().sent.len(), 2, "the follow-up goes out once the first resolved");
	assert_eq!(updates(&runtime.transport().sent[1]).len(), 2);

	assert!(runtime.transport_mut().answer_next(&dispatcher));
	runtime.tick(12);
	assert_eq!(text(&runtime, "count"), "12");
	assert_eq!(runtime.transport().in_flight(), 0);
}

#[test]
fn deferred_writes_ride_along() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({}));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, loopback(&dispatcher));

	runtime.sync(&id, "name", json!("A")).unwrap();
	runtime.sync(&id, "name", json!("B")).unwrap();
	runtime.tick(100);
	assert!(runtime.transport().sent().is_empty(), "deferred writes alone don't send");
	assert_eq!(runtime.component(&id).unwrap().get_including_defers("name"), Some(&json!("B")));
	assert_eq!(runtime.component(&id).unwrap().get("name"), Some(&json!("")));

	runtime.call(&id, "increment", vec![]).unwrap();
	runtime.tick(105);
	let sent = runtime.transport().sent();
	assert_eq!(sent.len(), 1);
	let updates = updates(&sent[0]);
	assert_eq!(updates.len(), 2);
	assert_eq!(updates[0]["type"], "syncInput");
	assert_eq!(updates[0]["payload"]["value"], "B");
	assert_eq!(updates[1]["payload"]["method"], "increment");
	assert_eq!(text(&runtime, "greeting"), "Hi B");
}

#[test]
fn deferred_writes_after_a_failed_message() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({}));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, ManualTransport::default());
	runtime.on_error(|_, _| true);

	runtime.sync(&id, "name", json!("A")).unwrap();
	runtime.call(&id, "increment", vec![]).unwrap();
	runtime.tick(5);
	assert!(runtime.transport_mut().fail_next(500, "oops"));
	runtime.tick(6);

	runtime.sync(&id, "name", json!("B")).unwrap();
	runtime.call(&id, "increment", vec![]).unwrap();
	runtime.tick(11);
	let values: Vec<Value> = updates(&runtime.transport().sent[1])
		.iter()
		.filter(|update| update["type"] == "syncInput")
		.map(|update| update["payload"]["value"].clone())
		.collect();
	assert_eq!(values, [json!("A"), json!("B")], "the newer write is applied last");

	assert!(runtime.transport_mut().answer_next(&dispatcher));
	runtime.tick(12);
	assert_eq!(text(&runtime, "greeting"), "Hi B");
	assert_eq!(runtime.component(&id).unwrap().get("name"), Some(&json!("B")));
	assert_eq!(text(&runtime, "count"), "2");
}

#[test]
fn set_sends_without_another_action() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({}));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, loopback(&dispatcher));

	runtime.set(&id, "name", json!("Grace")).unwrap();
	runtime.tick(5);
	assert_eq!(runtime.transport().sent().len(), 1);
	assert_eq!(text(&runtime, "greeting"), "Hi Grace");
	assert_eq!(runtime.browser().value(element(&runtime, "name")), "Grace", "dirty fields refresh their bound controls");
}

#[test]
fn typing_is_debounced_and_keeps_focus() {
	let dispatcher = dispatcher();
	let mut runtime = boot(&mount(&dispatcher, "counter", json!({})).html, loopback(&dispatcher));

	let input = element(&runtime, "name");
	runtime.browser_mut().focus(input);
	runtime.browser_mut().set_value(input, "Ada");
	assert!(runtime.browser_mut().fire(input, "input"));
	runtime.tick(1);
	runtime.tick(100);
	assert!(runtime.transport().sent().is_empty());
	runtime.tick(151);
	runtime.tick(156);
	assert_eq!(runtime.transport().sent().len(), 1);
	assert_eq!(text(&runtime, "greeting"), "Hi Ada");
	assert_eq!(runtime.browser().value(input), "Ada");
	assert_eq!(runtime.browser().focused(), Some(input));

	// Typing on while a count update arrives.
	runtime.browser_mut().set_value(input, "Ada L");
	let button = element(&runtime, "inc");
	runtime.browser_mut().fire(button, "click");
	runtime.tick(157);
	runtime.tick(162);
	assert_eq!(text(&runtime, "count"), "1");
	assert_eq!(runtime.browser().value(input), "Ada L");
}

#[test]
fn debounced_input_precedes_method_calls() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({}));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, loopback(&dispatcher));

	let input = element(&runtime, "name");
	runtime.browser_mut().set_value(input, "Bob");
	runtime.browser_mut().fire(input, "input");
	runtime.tick(1);
	runtime.call(&id, "increment", vec![]).unwrap();
	runtime.tick(6);

	let sent = runtime.transport().sent();
	assert_eq!(sent.len(), 1);
	let updates = updates(&sent[0]);
	assert_eq!(updates[0]["type"], "syncInput");
	assert_eq!(updates[0]["payload"]["value"], "Bob");
	assert_eq!(updates[1]["type"], "callMethod");
}

#[test]
fn prefetched_responses_are_used_once() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({}));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, loopback(&dispatcher));

	let action = Action::CallMethod {
		id: "prefetch".into(),
		method: "increment".into(),
		params: vec![],
	};
	runtime.prefetch(&id, action.clone()).unwrap();
	runtime.prefetch(&id, action).unwrap();
	assert_eq!(runtime.transport().sent().len(), 1, "identical prefetches are sent once");
	runtime.tick(1);
	assert_eq!(text(&runtime, "count"), "0", "prefetched responses wait for the real action");

	runtime.call(&id, "increment", vec![]).unwrap();
	assert_eq!(runtime.transport().sent().len(), 1);
	assert_eq!(text(&runtime, "count"), "1");

	runtime.call(&id, "increment", vec![]).unwrap();
	runtime.tick(6);
	assert_eq!(runtime.transport().sent().len(), 2);
	assert_eq!(text(&runtime, "count"), "2");
}

#[test]
fn prefetches_of_a_replaced_memo_are_not_used() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({}));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, ManualTransport::default());

	runtime.set(&id, "name", json!("X")).unwrap();
	runtime.tick(5);
	runtime.prefetch(&id, Action::CallMethod { id: "p".into(), method: "increment".into(), params: vec![] }).unwrap();
	assert_eq!(runtime.transport().in_flight(), 2);
	assert!(runtime.transport_mut().answer_next(&dispatcher));
	assert!(runtime.transport_mut().answer_next(&dispatcher));
	runtime.tick(6);
	assert_eq!(text(&runtime, "greeting"), "Hi X");

	runtime.call(&id, "increment", vec![]).unwrap();
	assert_eq!(text(&runtime, "count"), "0", "the prefetch was computed before the name changed");
	runtime.tick(11);
	assert_eq!(runtime.transport().sent.len(), 3);
	assert!(runtime.transport_mut().answer_next(&dispatcher));
	runtime.tick(12);
	assert_eq!(text(&runtime, "count"), "1");
	assert_eq!(text(&runtime, "greeting"), "Hi X");

	runtime.call(&id, "add", vec![json!(2)]).unwrap();
	runtime.tick(17);
	assert!(runtime.transport_mut().answer_next(&dispatcher));
	runtime.tick(18);
	assert_eq!(text(&runtime, "count"), "3");
	assert!(runtime.browser().error_pages().is_empty());
}

#[test]
fn non_ascii_data_survives_the_round_trip() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({ "name": "xéééé" }));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = Runtime::new(ClientConfig::default(), Document::parse(&mounted.html), loopback(&dispatcher));
	assert_eq!(runtime.start(0), 1);
	assert_eq!(runtime.browser().value(element(&runtime, "name")), "xéééé");
	assert_eq!(text(&runtime, "greeting"), "Hi xéééé");

	runtime.set(&id, "name", json!("Grüße & 日本")).unwrap();
	runtime.call(&id, "increment", vec![]).unwrap();
	runtime.tick(5);
	assert_eq!(text(&runtime, "greeting"), "Hi Grüße & 日本");
	assert_eq!(runtime.component(&id).unwrap().get("name"), Some(&json!("Grüße & 日本")));

	runtime.call(&id, "increment", vec![]).unwrap();
	runtime.tick(10);
	assert_eq!(text(&runtime, "count"), "2");
	assert!(runtime.browser().error_pages().is_empty());
}

#[test]
fn expired_prefetches_are_not_used() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({}));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, loopback(&dispatcher));

	runtime.prefetch(&id, Action::CallMethod { id: "p".into(), method: "increment".into(), params: vec![] }).unwrap();
	runtime.tick(1);
	runtime.tick(40_000);
	runtime.call(&id, "increment", vec![]).unwrap();
	assert_eq!(text(&runtime, "count"), "0");
	runtime.tick(40_005);
	assert_eq!(runtime.transport().sent().len(), 2);
	assert_eq!(text(&runtime, "count"), "1");
}

#[test]
fn session_expiry_prompts_once() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({}));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, ManualTransport::default());

	runtime.call(&id, "increment", vec![]).unwrap();
	runtime.tick(5);
	assert!(runtime.transport_mut().fail_next(419, ""));
	runtime.tick(6);
	assert!(runtime.session_expired());
	assert_eq!(runtime.browser().expiry_prompts(), 1);

	assert!(runtime.flush(&id).unwrap(), "rejected actions stay queued for a retry");
	assert_eq!(updates(&runtime.transport().sent[1]).len(), 1);
	assert!(runtime.transport_mut().fail_next(419, ""));
	runtime.tick(7);
	assert_eq!(runtime.browser().expiry_prompts(), 1);

	assert!(runtime.flush(&id).unwrap());
	assert!(runtime.transport_mut().answer_next(&dispatcher));
	runtime.tick(8);
	assert_eq!(text(&runtime, "count"), "1");
}

#[test]
fn session_expiry_callback_replaces_the_prompt() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({}));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, ManualTransport::default());
	let called = Rc::new(Cell::new(0));
	{
		let called = Rc::clone(&called);
		runtime.on_session_expired(move || {
			called.set(called.get() + 1);
			true
		});
	}

	runtime.call(&id, "increment", vec![]).unwrap();
	runtime.tick(5);
	runtime.transport_mut().fail_next(419, "");
	runtime.tick(6);
	assert_eq!(called.get(), 1);
	assert_eq!(runtime.browser().expiry_prompts(), 0);
}

#[test]
fn failures_show_the_response() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({}));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, loopback(&dispatcher));

	runtime.call(&id, "fail", vec![]).unwrap();
	runtime.tick(5);
	assert_eq!(runtime.browser().error_pages().len(), 1);
	assert!(runtime.browser().error_pages()[0].contains("boom"));
	assert_eq!(text(&runtime, "count"), "0");

	let statuses = Rc::new(RefCell::new(Vec::new()));
	{
		let statuses = Rc::clone(&statuses);
		runtime.on_error(move |status, _| {
			statuses.borrow_mut().push(status);
			true
		});
	}
	runtime.flush(&id).unwrap();
	runtime.tick(6);
	assert_eq!(*statuses.borrow(), [Some(500)]);
	assert_eq!(runtime.browser().error_pages().len(), 1);
}

#[test]
fn redirects_and_navigation() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({}));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, loopback(&dispatcher));

	runtime.navigate(&id, "/next").unwrap();
	runtime.tick(5);
	assert_eq!(runtime.browser().navigations(), ["/next"]);

	runtime.call(&id, "leave", vec![]).unwrap();
	runtime.tick(10);
	assert_eq!(runtime.browser().redirects(), ["/bye"]);
}

#[test]
fn browser_events_are_dispatched_on_the_root() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({ "count": 5 }));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, loopback(&dispatcher));

	runtime.call(&id, "celebrate", vec![]).unwrap();
	runtime.tick(5);
	let root = *runtime.component(&id).unwrap().root();
	let dispatched = runtime.browser().dispatched_events();
	assert_eq!(dispatched.len(), 1);
	assert_eq!(dispatched[0].target, root);
	assert_eq!(dispatched[0].event, "celebrated");
	assert_eq!(dispatched[0].detail, json!({ "count": 5 }));
}

#[test]
fn emits_reach_listening_components() {
	let dispatcher = dispatcher();
	let counter = mount(&dispatcher, "counter", json!({ "count": 2 }));
	let tally = mount(&dispatcher, "tally", json!({}));
	let counter_id = counter.initial.fingerprint.id.clone();
	let tally_id = tally.initial.fingerprint.id.clone();
	let mut runtime = boot(&format!("{}{}", counter.html, tally.html), loopback(&dispatcher));
	assert_eq!(runtime.components().count(), 2);

	let heard = Rc::new(RefCell::new(Vec::new()));
	{
		let heard = Rc::clone(&heard);
		runtime.on("counted", move |params| heard.borrow_mut().extend(params.iter().cloned()));
	}
	let local = Rc::new(RefCell::new(Vec::new()));
	{
		let local = Rc::clone(&local);
		runtime.component_mut(&tally_id).unwrap().on("counted", move |params| local.borrow_mut().extend(params.iter().cloned()));
	}

	runtime.call(&counter_id, "announce", vec![]).unwrap();
	runtime.tick(5);
	assert_eq!(*heard.borrow(), [json!(2)]);
	assert_eq!(*local.borrow(), [json!(2)]);
	runtime.tick(10);
	assert_eq!(runtime.transport().sent().len(), 2);
	let fired = updates(&runtime.transport().sent()[1]);
	assert_eq!(fired[0]["type"], "fireEvent");
	assert_eq!(fired[0]["payload"]["origin"], counter_id.as_str());
	assert_eq!(runtime.component(&tally_id).unwrap().get("heard"), Some(&json!([2])));
	assert_eq!(runtime.browser().inner_html(element(&runtime, "tally")), "<li>2</li>");

	runtime.emit_to("tally", "counted", vec![json!(9)]);
	runtime.emit("reset-all", vec![]);
	runtime.tick(15);
	assert_eq!(runtime.component(&tally_id).unwrap().get("heard"), Some(&json!([2, 9])));
	assert_eq!(text(&runtime, "count"), "0");
	assert_eq!(*heard.borrow(), [json!(2), json!(9)]);
}

#[test]
fn self_emits_stay_local() {
	let dispatcher = dispatcher();
	let counter = mount(&dispatcher, "counter", json!({}));
	let tally = mount(&dispatcher, "tally", json!({}));
	let tally_id = tally.initial.fingerprint.id.clone();
	let mut runtime = boot(&format!("{}{}", counter.html, tally.html), loopback(&dispatcher));

	runtime.emit_self(&tally_id, "counted", vec![json!(1)]);
	runtime.tick(5);
	assert_eq!(runtime.transport().sent().len(), 1);
	let sent: Value = serde_json::from_str(&runtime.transport().sent()[0].body).unwrap();
	assert_eq!(sent["fingerprint"]["name"], "tally");
}

#[test]
fn nested_components_survive_parent_renders() {
	let dispatcher = dispatcher();
	let child = mount(&dispatcher, "counter", json!({}));
	let child_id = child.initial.fingerprint.id.clone();
	let parent = mount(&dispatcher, "parent", json!({ "title": "Home", "child": child_id, "show_child": true }));
	let parent_id = parent.initial.fingerprint.id.clone();
	let mut runtime = boot(&nest(&parent, &child), loopback(&dispatcher));
	assert_eq!(runtime.components().count(), 2);

	runtime.call(&child_id, "add", vec![json!(3)]).unwrap();
	runtime.tick(5);
	assert_eq!(text(&runtime, "count"), "3");

	runtime.call(&parent_id, "rename", vec![json!("Away")]).unwrap();
	runtime.tick(10);
	assert_eq!(text(&runtime, "title"), "Away");
	assert_eq!(text(&runtime, "count"), "3", "the parent's markup only holds a placeholder for the child");
	assert_eq!(runtime.components().count(), 2);
	let children = &runtime.component(&parent_id).unwrap().memo().children;
	assert_eq!(children.len(), 1);
	assert_eq!(children[0].id, child_id);
}

#[test]
fn removed_components_are_torn_down() {
	let dispatcher = dispatcher();
	let child = mount(&dispatcher, "counter", json!({}));
	let child_id = child.initial.fingerprint.id.clone();
	let parent = mount(&dispatcher, "parent", json!({ "title": "Home", "child": child_id, "show_child": true }));
	let parent_id = parent.initial.fingerprint.id.clone();
	let mut runtime = boot(&nest(&parent, &child), loopback(&dispatcher));

	let torn_down = Rc::new(Cell::new(false));
	{
		let torn_down = Rc::clone(&torn_down);
		runtime.component_mut(&child_id).unwrap().add_teardown(move || torn_down.set(true));
	}
	let removed = Rc::new(Cell::new(0));
	{
		let removed = Rc::clone(&removed);
		runtime.hooks_mut().register(Hook::ElementRemoved, move |_| removed.set(removed.get() + 1));
	}

	runtime.call(&parent_id, "hide", vec![]).unwrap();
	runtime.tick(5);
	assert!(torn_down.get());
	assert_eq!(removed.get(), 1);
	assert!(runtime.component(&child_id).is_none());
	assert_eq!(runtime.components().count(), 1);
	assert!(runtime.browser().get_element_by_id("count").is_none());
	assert!(!runtime.is_listening("click"), "nobody needs click listeners anymore");
	assert!(!runtime.remove_component(&child_id));
}

#[test]
fn polls_pause_while_offline() {
	let dispatcher = dispatcher();
	let mut runtime = boot(&mount(&dispatcher, "clock", json!({})).html, loopback(&dispatcher));
	let banner = element(&runtime, "banner");
	assert_eq!(runtime.browser().attribute(banner, "hidden"), Some(""));

	runtime.tick(100);
	runtime.tick(105);
	assert_eq!(runtime.transport().sent().len(), 1);
	assert_eq!(text(&runtime, "ticks"), "1");
	assert_eq!(runtime.browser().attribute(banner, "hidden"), Some(""), "morphing keeps the offline state");

	runtime.set_offline(true);
	assert_eq!(runtime.browser().attribute(banner, "hidden"), None);
	runtime.tick(200);
	runtime.tick(205);
	assert_eq!(runtime.transport().sent().len(), 1);

	runtime.set_offline(false);
	assert_eq!(runtime.browser().attribute(banner, "hidden"), Some(""));
	runtime.tick(300);
	runtime.tick(305);
	assert_eq!(runtime.transport().sent().len(), 2);
	assert_eq!(text(&runtime, "ticks"), "2");
}

#[test]
fn background_pages_skip_polls() {
	let dispatcher = dispatcher();
	let mut runtime = boot(&mount(&dispatcher, "clock", json!({})).html, loopback(&dispatcher));
	runtime.set_background(true);
	runtime.tick(100);
	runtime.tick(105);
	assert!(runtime.transport().sent().is_empty());
	runtime.set_background(false);
	runtime.tick(200);
	runtime.tick(205);
	assert_eq!(runtime.transport().sent().len(), 1);
}

#[test]
fn message_hooks() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({}));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, loopback(&dispatcher));

	let seen = Rc::new(RefCell::new(Vec::new()));
	for hook in [Hook::MessageSent, Hook::MessageReceived, Hook::MessageProcessed] {
		let seen = Rc::clone(&seen);
		runtime.hooks_mut().register(hook, move |event| {
			if let HookEvent::MessageSent { message, .. } | HookEvent::MessageReceived { message, .. } | HookEvent::MessageProcessed { message, .. } = event {
				seen.borrow_mut().push((event.hook(), message.actions.len()));
			}
		});
	}

	runtime.call(&id, "increment", vec![]).unwrap();
	runtime.tick(5);
	assert_eq!(*seen.borrow(), [(Hook::MessageSent, 1), (Hook::MessageReceived, 1), (Hook::MessageProcessed, 1)]);
}

#[test]
fn watchers_see_changes() {
	let dispatcher = dispatcher();
	let mounted = mount(&dispatcher, "counter", json!({}));
	let id = mounted.initial.fingerprint.id.clone();
	let mut runtime = boot(&mounted.html, loopback(&dispatcher));

	let changes = Rc::new(RefCell::new(Vec::new()));
	{
		let changes = Rc::clone(&changes);
		runtime.component_mut(&id).unwrap().watch("count", move |new, old| changes.borrow_mut().push((new.clone(), old.cloned())));
	}
	runtime.call(&id, "increment", vec![]).unwrap();
	runtime.tick(5);
	assert_eq!(*changes.borrow(), [(json!(1), Some(json!(0)))]);
}

#[test]
fn unknown_components_are_errors() {
	let dispatcher = dispatcher();
	let mut runtime = boot(&mount(&dispatcher, "counter", json!({})).html, loopback(&dispatcher));
	assert!(runtime.call("missing", "increment", vec![]).is_err());
	assert!(runtime.flush("missing").is_err());
}
