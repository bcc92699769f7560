#![allow(dead_code)]

use live_component::{
	client::{HttpReply, OutboundRequest, Ticket, Transport},
	config::ServerConfig,
	error::{MethodError, TransportError},
	markup::escape_text,
	protocol::{Data, ErrorBag},
	server::{Capabilities, Component, Dispatcher, InboundRequest, Mounted, PageContext, Registry, Rules, Validation},
};
use serde_json::{json, Value};
use std::{collections::VecDeque, sync::Arc};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_test_writer().try_init();
}

#[derive(Default)]
pub struct Counter {
	pub count: i64,
	pub name: String,
}

impl Component for Counter {
	const NAME: &'static str = "counter";

	fn capabilities() -> Capabilities<Self> {
		Capabilities::<Self>::new()
			.field("count", |c| &c.count, |c| &mut c.count)
			.field("name", |c| &c.name, |c| &mut c.name)
			.method("increment", |c, _, _| {
				c.count += 1;
				Ok(json!(c.count))
			})
			.method("add", |c, _, args| {
				c.count += args.get::<i64>(0)?;
				Ok(Value::Null)
			})
			.method("announce", |c, scope, _| {
				scope.emit("counted", vec![json!(c.count)]);
				Ok(Value::Null)
			})
			.method("reset", |c, _, _| {
				c.count = 0;
				Ok(Value::Null)
			})
			.method("leave", |_, scope, _| {
				scope.redirect("/bye");
				Ok(Value::Null)
			})
			.method("celebrate", |c, scope, _| {
				scope.dispatch_browser_event("celebrated", json!({ "count": c.count }));
				Ok(Value::Null)
			})
			.method("fail", |_, _, _| Err(MethodError::failed("boom")))
			.listen("reset-all", "reset")
	}

	fn render(&self, _errors: &ErrorBag) -> Option<String> {
		Some(format!(
			r#"<div><input live:model="name" id="name"><button live:click="increment" id="inc">+</button><span id="count">{}</span><span id="greeting">Hi {}</span></div>"#,
			self.count,
			escape_text(&self.name)
		))
	}
}

/// Records what it heard from `counted`.
#[derive(Default)]
pub struct Tally {
	pub heard: Vec<i64>,
}

impl Component for Tally {
	const NAME: &'static str = "tally";

	fn capabilities() -> Capabilities<Self> {
		Capabilities::<Self>::new()
			.field("heard", |c| &c.heard, |c| &mut c.heard)
			.method("record", |c, _, args| {
				c.heard.push(args.get(0)?);
				Ok(Value::Null)
			})
			.listen("counted", "record")
	}

	fn render(&self, _errors: &ErrorBag) -> Option<String> {
		let items: String = self.heard.iter().map(|heard| format!("<li>{}</li>", heard)).collect();
		Some(format!(r#"<ul id="tally">{}</ul>"#, items))
	}
}

/// Hosts a nested component by id.
#[derive(Default)]
pub struct Parent {
	pub title: String,
	pub child: String,
	pub show_child: bool,
}

impl Component for Parent {
	const NAME: &'static str = "parent";

	fn capabilities() -> Capabilities<Self> {
		Capabilities::<Self>::new()
			.field("title", |c| &c.title, |c| &mut c.title)
			.field("child", |c| &c.child, |c| &mut c.child)
			.field("show_child", |c| &c.show_child, |c| &mut c.show_child)
			.method("rename", |c, _, args| {
				c.title = args.get(0)?;
				Ok(Value::Null)
			})
			.method("hide", |c, _, _| {
				c.show_child = false;
				Ok(Value::Null)
			})
	}

	fn render(&self, _errors: &ErrorBag) -> Option<String> {
		let child = if self.show_child { format!(r#"<div live:id="{}"></div>"#, self.child) } else { String::new() };
		Some(format!(r#"<section><h1 id="title">{}</h1>{}</section>"#, escape_text(&self.title), child))
	}
}

/// Polls and reacts to connectivity.
#[derive(Default)]
pub struct Clock {
	pub ticks: u32,
}

impl Component for Clock {
	const NAME: &'static str = "clock";

	fn capabilities() -> Capabilities<Self> {
		Capabilities::<Self>::new().field("ticks", |c| &c.ticks, |c| &mut c.ticks).method("tick", |c, _, _| {
			c.ticks += 1;
			Ok(Value::Null)
		})
	}

	fn render(&self, _errors: &ErrorBag) -> Option<String> {
		Some(format!(
			r#"<div live:poll.100ms="tick"><span id="ticks">{}</span><p id="banner" live:offline>You are offline.</p></div>"#,
			self.ticks
		))
	}
}

/// Validated form with an upload field.
#[derive(Default)]
pub struct Signup {
	pub email: String,
	pub avatar: Option<String>,
	pub saved: bool,
}

impl Component for Signup {
	const NAME: &'static str = "signup";

	fn capabilities() -> Capabilities<Self> {
		Capabilities::<Self>::new()
			.field("email", |c| &c.email, |c| &mut c.email)
			.field("avatar", |c| &c.avatar, |c| &mut c.avatar)
			.field("saved", |c| &c.saved, |c| &mut c.saved)
			.method("save", |c, scope, _| {
				let data = json!({ "email": c.email });
				scope.validate(data.as_object().unwrap_or(&Data::new()))?;
				c.saved = true;
				Ok(Value::Null)
			})
			.with_uploads()
	}

	fn rules(&self) -> Rules {
		[("email".to_owned(), "required".to_owned())].into_iter().collect()
	}

	fn render(&self, errors: &ErrorBag) -> Option<String> {
		let error = errors.get("email").and_then(|messages| messages.first()).map_or_else(String::new, |message| escape_text(message).into_owned());
		Some(format!(r#"<form><input live:model.defer="email"><em id="error">{}</em></form>"#, error))
	}
}

/// Fails every `required` rule whose field is missing or empty.
pub fn required(rules: &Rules, data: &Data) -> Validation {
	rules.iter().filter(|(_, rule)| rule.as_str() == "required").fold(Validation::default(), |validation, (field, _)| {
		if data.get(field).and_then(Value::as_str).map_or(true, str::is_empty) {
			validation.fail(field.clone(), format!("The {} field is required.", field))
		} else {
			validation
		}
	})
}

pub fn server_config() -> ServerConfig {
	ServerConfig {
		secret: "integration-test-secret".to_owned(),
		..ServerConfig::default()
	}
}

pub fn registry() -> Registry {
	Registry::new().register::<Counter>().register::<Tally>().register::<Parent>().register::<Clock>().register::<Signup>()
}

pub fn dispatcher() -> Arc<Dispatcher> {
	Arc::new(Dispatcher::new(server_config(), registry()).with_validator(required))
}

pub fn mount(dispatcher: &Dispatcher, name: &str, params: Value) -> Mounted {
	let params = params.as_object().cloned().unwrap_or_default();
	dispatcher.mount(name, &params, &PageContext::default()).unwrap()
}

/// A parent page with `child` rendered in place of its placeholder.
pub fn nest(parent: &Mounted, child: &Mounted) -> String {
	let placeholder = format!(r#"<div live:id="{}"></div>"#, child.initial.fingerprint.id);
	assert!(parent.html.contains(&placeholder), "parent markup lacks the child placeholder");
	parent.html.replace(&placeholder, &child.html)
}

/// Holds requests until the test answers them.
#[derive(Debug, Default)]
pub struct ManualTransport {
	pub unanswered: VecDeque<(Ticket, OutboundRequest)>,
	pub sent: Vec<OutboundRequest>,
	replies: VecDeque<(Ticket, Result<HttpReply, TransportError>)>,
}

impl ManualTransport {
	/// Lets `dispatcher` answer the oldest unanswered request.
	pub fn answer_next(&mut self, dispatcher: &Dispatcher) -> bool {
		let Some((ticket, request)) = self.unanswered.pop_front() else {
			return false;
		};
		let (status, body) = dispatcher.handle_http(&InboundRequest { headers: request.headers, body: request.body });
		self.replies.push_back((ticket, Ok(HttpReply { status, headers: vec![], body })));
		true
	}

	/// Answers the oldest unanswered request with `status`.
	pub fn fail_next(&mut self, status: u16, body: &str) -> bool {
		let Some((ticket, _)) = self.unanswered.pop_front() else {
			return false;
		};
		self.replies.push_back((ticket, Ok(HttpReply { status, headers: vec![], body: body.to_owned() })));
		true
	}

	pub fn in_flight(&self) -> usize {
		self.unanswered.len()
	}
}

impl Transport for ManualTransport {
	fn send(&mut self, ticket: Ticket, request: OutboundRequest) {
		self.sent.push(request.clone());
		self.unanswered.push_back((ticket, request));
	}

	fn poll(&mut self) -> Option<(Ticket, Result<HttpReply, TransportError>)> {
		self.replies.pop_front()
	}
}

/// The `updates` of a sent request body.
pub fn updates(request: &OutboundRequest) -> Vec<Value> {
	let body: Value = serde_json::from_str(&request.body).unwrap();
	body["updates"].as_array().cloned().unwrap_or_default()
}
