//! Wire types exchanged between the client runtime and the dispatcher.
//!
//! All maps serialize with sorted keys (`serde_json::Map` without `preserve_order`),
//! which is what makes the checksum input stable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Public component state, by field name.
pub type Data = Map<String, Value>;

/// Validation messages, by field name.
pub type ErrorBag = BTreeMap<String, Vec<String>>;

/// Identity and routing information of one component instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
	pub id: String,
	pub name: String,
	pub locale: String,
	pub path: String,
	pub method: String,
}

/// Nested component bookkeeping. Written by the client, so never sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef {
	pub key: String,
	pub id: String,
	pub tag: String,
}

/// The sealed snapshot of a component's state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMemo {
	#[serde(default)]
	pub children: Vec<ChildRef>,
	#[serde(default)]
	pub errors: ErrorBag,
	#[serde(default)]
	pub html_hash: String,
	#[serde(default)]
	pub data: Data,
	#[serde(default)]
	pub data_meta: Data,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub checksum: Option<String>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
	!*value
}

/// A component-to-component event raised during a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
	pub event: String,
	#[serde(default)]
	pub params: Vec<Value>,
	/// Only components enclosing the emitter receive it.
	#[serde(default, skip_serializing_if = "is_false")]
	pub ancestors_only: bool,
	/// Only the emitter itself receives it.
	#[serde(default, skip_serializing_if = "is_false")]
	pub self_only: bool,
	/// Only components with this name receive it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub to: Option<String>,
}

impl EventRecord {
	pub fn new(event: impl Into<String>, params: Vec<Value>) -> Self {
		Self {
			event: event.into(),
			params,
			ancestors_only: false,
			self_only: false,
			to: None,
		}
	}

	pub fn up(&mut self) -> &mut Self {
		self.ancestors_only = true;
		self
	}

	pub fn only_self(&mut self) -> &mut Self {
		self.self_only = true;
		self
	}

	pub fn target(&mut self, component_name: impl Into<String>) -> &mut Self {
		self.to = Some(component_name.into());
		self
	}
}

/// A DOM `CustomEvent` the client fires on the component root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserDispatch {
	pub event: String,
	#[serde(default)]
	pub data: Value,
}

/// Instructions for the client produced by a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Effects {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub html: Option<String>,
	#[serde(default)]
	pub dirty: Vec<String>,
	#[serde(default)]
	pub emits: Vec<EventRecord>,
	#[serde(default)]
	pub listeners: Vec<String>,
	#[serde(default)]
	pub dispatches: Vec<BrowserDispatch>,
	/// Return values of method calls, by action id.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub returns: BTreeMap<String, Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub redirect: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub navigate: Option<String>,
}

/// A unit of user intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Action {
	SyncInput { id: String, name: String, value: Value },
	CallMethod {
		id: String,
		method: String,
		#[serde(default)]
		params: Vec<Value>,
	},
	FireEvent {
		id: String,
		event: String,
		#[serde(default)]
		params: Vec<Value>,
		/// Id of the component that emitted the event, if any.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		origin: Option<String>,
	},
	Navigate { id: String, url: String },
}

impl Action {
	/// Values of the `type` discriminator the dispatcher understands.
	pub const TYPES: [&'static str; 4] = ["syncInput", "callMethod", "fireEvent", "navigate"];

	#[must_use]
	pub fn id(&self) -> &str {
		match self {
			Action::SyncInput { id, .. } | Action::CallMethod { id, .. } | Action::FireEvent { id, .. } | Action::Navigate { id, .. } => id,
		}
	}

	#[must_use]
	pub fn type_name(&self) -> &'static str {
		match self {
			Action::SyncInput { .. } => "syncInput",
			Action::CallMethod { .. } => "callMethod",
			Action::FireEvent { .. } => "fireEvent",
			Action::Navigate { .. } => "navigate",
		}
	}

	/// The field a `syncInput` writes to.
	#[must_use]
	pub fn field(&self) -> Option<&str> {
		match self {
			Action::SyncInput { name, .. } => Some(name),
			_ => None,
		}
	}

	/// Identifies "the same" action across ids, for prefetch matching.
	#[must_use]
	pub fn signature(&self) -> String {
		let (target, params) = match self {
			Action::SyncInput { name, value, .. } => (name.as_str(), value.to_string()),
			Action::CallMethod { method, params, .. } => (method.as_str(), Value::from(params.clone()).to_string()),
			Action::FireEvent { event, params, .. } => (event.as_str(), Value::from(params.clone()).to_string()),
			Action::Navigate { url, .. } => (url.as_str(), String::new()),
		};
		format!("{}:{}:{}", self.type_name(), target, params)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
	pub fingerprint: Fingerprint,
	pub server_memo: ServerMemo,
	pub updates: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
	pub effects: Effects,
	pub server_memo: ServerMemo,
}

/// Everything the client needs to boot a component, embedded on its root element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialData {
	pub fingerprint: Fingerprint,
	pub effects: Effects,
	pub server_memo: ServerMemo,
}

/// Looks up a dot path (`form.email`) in component data.
#[must_use]
pub fn data_get<'a>(data: &'a Data, path: &str) -> Option<&'a Value> {
	let mut segments = path.split('.');
	let mut current = data.get(segments.next()?)?;
	for segment in segments {
		current = match current {
			Value::Object(object) => object.get(segment)?,
			Value::Array(array) => array.get(segment.parse::<usize>().ok()?)?,
			_ => return None,
		};
	}
	Some(current)
}

/// Writes `value` at a dot path below `target`, creating intermediate objects as needed.
pub fn data_set(target: &mut Value, path: &str, value: Value) {
	let mut current = target;
	for segment in path.split('.') {
		let index = match current {
			Value::Array(_) => segment.parse::<usize>().ok(),
			_ => None,
		};
		current = match (current, index) {
			(Value::Array(array), Some(index)) => {
				if index >= array.len() {
					array.resize(index + 1, Value::Null);
				}
				&mut array[index]
			}
			(other, _) => {
				if !other.is_object() {
					*other = Value::Object(Map::new());
				}
				match other {
					Value::Object(object) => object.entry(segment.to_owned()).or_insert(Value::Null),
					_ => unreachable!("replaced with an object above"),
				}
			}
		};
	}
	*current = value;
}
