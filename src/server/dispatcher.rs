//! One component turn: hydrate, verify, apply, render, seal.

use super::{
	bus::{EventBus, SignalEvent},
	collab::{BlobStore, NoBlobs, NoValidation, NoViews, Validator, ViewResolver},
	component::{is_reserved, Args, Instance},
	effects::EffectCompiler,
	html::add_root_attributes,
	registry::Registry,
	scope::Scope,
	uploads,
};
use crate::{
	checksum::ChecksumGuard,
	config::{DirtyPolicy, ServerConfig},
	dirty::{snapshot_diff, DirtyHasher},
	error::{FieldError, MethodError, TurnError},
	markup::count_root_elements,
	protocol::{Action, Data, Effects, ErrorBag, Fingerprint, InitialData, ResponsePayload, ServerMemo},
};
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, error, info_span, instrument, trace, warn};
use xxhash_rust::xxh3::xxh3_64;

const ID_LENGTH: usize = 20;

/// A request as far as the dispatcher cares: headers and body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundRequest {
	pub headers: Vec<(String, String)>,
	pub body: String,
}

impl InboundRequest {
	#[must_use]
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.iter().find(|(existing, _)| existing.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
	}
}

/// Where a component is first rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
	pub path: String,
	pub method: String,
}

impl Default for PageContext {
	fn default() -> Self {
		Self {
			path: "/".to_owned(),
			method: "GET".to_owned(),
		}
	}
}

/// A freshly mounted component: markup with embedded identity, and the same data in structured form.
#[derive(Debug, Clone, PartialEq)]
pub struct Mounted {
	pub html: String,
	pub initial: InitialData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Inbound {
	fingerprint: Fingerprint,
	server_memo: ServerMemo,
	#[serde(default)]
	updates: Vec<Value>,
}

pub struct Dispatcher {
	config: ServerConfig,
	registry: Registry,
	guard: ChecksumGuard,
	views: Box<dyn ViewResolver>,
	validator: Box<dyn Validator>,
	blobs: Box<dyn BlobStore>,
	bus: EventBus,
}

impl fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dispatcher")
			.field("registry", &self.registry)
			.field("dirty_policy", &self.config.dirty_policy)
			.field("bus", &self.bus)
			.finish_non_exhaustive()
	}
}

fn parse_action(update: Value) -> Result<Action, TurnError> {
	let kind = update
		.get("type")
		.and_then(Value::as_str)
		.ok_or_else(|| TurnError::Malformed("action without `type`".to_owned()))?;
	if !Action::TYPES.contains(&kind) {
		return Err(TurnError::UnknownActionType(kind.to_owned()));
	}
	serde_json::from_value(update).map_err(|error| TurnError::Malformed(error.to_string()))
}

fn random_id() -> String {
	rand::thread_rng().sample_iter(&Alphanumeric).take(ID_LENGTH).map(char::from).collect()
}

/// Top-level entries of `current` that differ from `previous`.
fn changed_top_level(previous: &Data, current: &Data) -> Data {
	current.iter().filter(|(key, value)| previous.get(key.as_str()) != Some(*value)).map(|(key, value)| (key.clone(), value.clone())).collect()
}

impl Dispatcher {
	#[must_use]
	pub fn new(config: ServerConfig, registry: Registry) -> Self {
		let guard = if config.secret.is_empty() {
			warn!("No checksum secret configured; Generating one for this process. Snapshots won't survive a restart.");
			ChecksumGuard::new(rand::thread_rng().gen::<[u8; 32]>())
		} else {
			ChecksumGuard::new(config.secret.as_bytes())
		};
		Self {
			config,
			registry,
			guard,
			views: Box::new(NoViews),
			validator: Box::new(NoValidation),
			blobs: Box::new(NoBlobs),
			bus: EventBus::new(),
		}
	}

	#[must_use]
	pub fn with_views(mut self, views: impl ViewResolver + 'static) -> Self {
		self.views = Box::new(views);
		self
	}

	#[must_use]
	pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
		self.validator = Box::new(validator);
		self
	}

	#[must_use]
	pub fn with_blobs(mut self, blobs: impl BlobStore + 'static) -> Self {
		self.blobs = Box::new(blobs);
		self
	}

	pub fn bus_mut(&mut self) -> &mut EventBus {
		&mut self.bus
	}

	#[must_use]
	pub fn config(&self) -> &ServerConfig {
		&self.config
	}

	#[must_use]
	pub fn guard(&self) -> &ChecksumGuard {
		&self.guard
	}

	#[must_use]
	pub fn registry(&self) -> &Registry {
		&self.registry
	}

	/// Renders a component for the first time.
	///
	/// # Errors
	///
	/// Iff the component isn't registered, its `mount` hook fails or it doesn't render a root element.
	#[instrument(skip(self, params, page))]
	pub fn mount(&self, name: &str, params: &Data, page: &PageContext) -> Result<Mounted, TurnError> {
		let mut instance = self.registry.instantiate(name).ok_or_else(|| TurnError::UnknownComponent(name.to_owned()))?;
		let fingerprint = Fingerprint {
			id: random_id(),
			name: name.to_owned(),
			locale: self.config.locale.clone(),
			path: page.path.clone(),
			method: page.method.clone(),
		};
		instance.fill(params).map_err(|error| invalid_field(name, error))?;

		let mut effects = EffectCompiler::new();
		let mut errors = ErrorBag::new();
		let rules = instance.rules();
		let mut scope = Scope {
			id: &fingerprint.id,
			name: &fingerprint.name,
			effects: &mut effects,
			errors: &mut errors,
			rules: &rules,
			validator: &*self.validator,
			blobs: &*self.blobs,
		};
		match instance.mount(params, &mut scope) {
			Ok(()) | Err(MethodError::Invalid(_)) => (),
			Err(error) => {
				return Err(TurnError::MethodFailed {
					component: name.to_owned(),
					method: "mount".to_owned(),
					message: error.to_string(),
				})
			}
		}

		let (mut effects, server_memo) = self.finish(&mut *instance, &fingerprint, None, effects, errors, DirtyHasher::new())?;
		let html = effects.html.take().unwrap_or_default();
		debug!(id = fingerprint.id.as_str(), "Mounted");
		Ok(Mounted {
			html,
			initial: InitialData { fingerprint, effects, server_memo },
		})
	}

	/// Runs one turn.
	///
	/// # Errors
	///
	/// See [`TurnError`]. Nothing of the turn's state is returned on error.
	pub fn handle(&self, request: &InboundRequest) -> Result<ResponsePayload, TurnError> {
		let marker = &self.config.marker_header;
		if request.header(marker).is_none() {
			return Err(TurnError::NotProtocolRequest { header: marker.clone() });
		}
		let inbound: Inbound = serde_json::from_str(&request.body).map_err(|error| TurnError::Malformed(error.to_string()))?;
		let updates = inbound.updates.into_iter().map(parse_action).collect::<Result<Vec<_>, _>>()?;
		let fingerprint = inbound.fingerprint;
		let memo = inbound.server_memo;

		let span = info_span!("turn", component = fingerprint.name.as_str(), id = fingerprint.id.as_str(), updates = updates.len());
		let _enter = span.enter();

		let mut instance = self
			.registry
			.instantiate(&fingerprint.name)
			.ok_or_else(|| TurnError::UnknownComponent(fingerprint.name.clone()))?;

		let checksum = memo.checksum.as_deref().unwrap_or_default();
		if !self.guard.check(checksum, &fingerprint, &memo) {
			#[cfg(feature = "dangerous-logging")]
			warn!(data = %Value::Object(memo.data.clone()), "Checksum mismatch; Rejecting turn.");
			#[cfg(not(feature = "dangerous-logging"))]
			warn!("Checksum mismatch; Rejecting turn.");
			return Err(TurnError::Integrity { component: fingerprint.name.clone() });
		}

		instance.fill(&memo.data).map_err(|error| invalid_field(&fingerprint.name, error))?;
		instance.hydrate();
		self.bus.trigger(&SignalEvent::ComponentHydrated {
			component: &fingerprint.name,
			id: &fingerprint.id,
		});
		let mut hasher = DirtyHasher::new();
		hasher.hydrate(&fingerprint.id, &instance.snapshot());

		let mut effects = EffectCompiler::new();
		let mut errors = memo.errors.clone();
		for action in &updates {
			let rules = instance.rules();
			let mut scope = Scope {
				id: &fingerprint.id,
				name: &fingerprint.name,
				effects: &mut effects,
				errors: &mut errors,
				rules: &rules,
				validator: &*self.validator,
				blobs: &*self.blobs,
			};
			self.apply(&mut *instance, &mut scope, action)?;
		}

		let (effects, mut server_memo) = self.finish(&mut *instance, &fingerprint, Some(&memo), effects, errors, hasher)?;
		server_memo.data = changed_top_level(&memo.data, &server_memo.data);
		Ok(ResponsePayload { effects, server_memo })
	}

	/// [`Dispatcher::handle`] with the outcome mapped to a status code and a JSON body.
	pub fn handle_http(&self, request: &InboundRequest) -> (u16, String) {
		match self.handle(request) {
			Ok(response) => match serde_json::to_string(&response) {
				Ok(body) => (200, body),
				Err(serialization_error) => {
					error!("Response could not be serialized: {}", serialization_error);
					(500, json!({ "message": "response could not be serialized" }).to_string())
				}
			},
			Err(turn_error) => {
				if turn_error.status_code() >= 500 {
					error!("Turn failed: {}", turn_error);
				} else {
					warn!("Turn rejected: {}", turn_error);
				}
				(turn_error.status_code(), json!({ "message": turn_error.to_string() }).to_string())
			}
		}
	}

	#[instrument(skip(self, instance, scope, action), fields(action = action.type_name()))]
	fn apply(&self, instance: &mut dyn Instance, scope: &mut Scope<'_>, action: &Action) -> Result<(), TurnError> {
		match action {
			Action::SyncInput { name, value, .. } => Self::sync(instance, scope, name, value.clone()),
			Action::CallMethod { id, method, params } => match method.as_str() {
				"$set" | "$sync" => {
					let field = field_argument(scope, method, params)?;
					Self::sync(instance, scope, &field, params.get(1).cloned().unwrap_or(Value::Null))
				}
				"$toggle" => {
					let field = field_argument(scope, method, params)?;
					let current = instance.get(&field).and_then(|value| value.as_bool()).unwrap_or(false);
					Self::sync(instance, scope, &field, Value::Bool(!current))
				}
				"$refresh" => Ok(()),
				upload if uploads::is_upload_method(upload) && instance.accepts_uploads() => uploads::call(instance, scope, upload, params),
				method => {
					let returned = Self::invoke(instance, scope, method, params)?;
					scope.effects.record_return(id, returned);
					Ok(())
				}
			},
			Action::FireEvent { id, event, params, origin } => {
				let method = instance.listener(event).ok_or_else(|| TurnError::UnknownListener {
					component: scope.name().to_owned(),
					event: event.clone(),
				})?;
				let returned = Self::invoke(instance, scope, method, params)?;
				self.bus.trigger(&SignalEvent::ActionReturned {
					component: scope.name(),
					id: scope.id(),
					event,
					origin: origin.as_deref(),
					returned: &returned,
				});
				scope.effects.record_return(id, returned);
				Ok(())
			}
			Action::Navigate { url, .. } => {
				scope.navigate(url.clone());
				Ok(())
			}
		}
	}

	fn sync(instance: &mut dyn Instance, scope: &mut Scope<'_>, path: &str, value: Value) -> Result<(), TurnError> {
		let base = path.split('.').next().unwrap_or_default();
		if !instance.has_field(base) {
			return Err(TurnError::MissingProperty {
				component: scope.name().to_owned(),
				field: path.to_owned(),
			});
		}
		instance.set(path, value).map_err(|error| invalid_field(scope.name(), error))?;
		instance.updated(path, scope);
		Ok(())
	}

	fn invoke(instance: &mut dyn Instance, scope: &mut Scope<'_>, method: &str, params: &[Value]) -> Result<Value, TurnError> {
		let component = scope.name();
		let unknown = || TurnError::UnknownMethod {
			component: component.to_owned(),
			method: method.to_owned(),
		};
		if is_reserved(method) || method.starts_with('$') {
			return Err(unknown());
		}
		match instance.call(method, scope, Args::new(params.to_vec())) {
			None => Err(unknown()),
			Some(Ok(returned)) => Ok(returned),
			Some(Err(MethodError::Invalid(fields))) => {
				trace!(failed = fields.len(), "Validation stopped the action");
				Ok(Value::Null)
			}
			Some(Err(error)) => Err(TurnError::MethodFailed {
				component: component.to_owned(),
				method: method.to_owned(),
				message: error.to_string(),
			}),
		}
	}

	/// Dehydrates, renders and seals. `previous` is `None` on mount.
	fn finish(
		&self,
		instance: &mut dyn Instance,
		fingerprint: &Fingerprint,
		previous: Option<&ServerMemo>,
		effects: EffectCompiler,
		errors: ErrorBag,
		mut hasher: DirtyHasher,
	) -> Result<(Effects, ServerMemo), TurnError> {
		instance.dehydrate();
		let data = instance.snapshot();
		self.bus.trigger(&SignalEvent::ComponentDehydrated {
			component: &fingerprint.name,
			id: &fingerprint.id,
			data: &data,
		});

		let html = match instance.render(&errors) {
			Some(html) => html,
			None => self.views.render(&fingerprint.name, &data, &errors).map_err(|message| TurnError::Render {
				component: fingerprint.name.clone(),
				message,
			})?,
		};
		match count_root_elements(&html) {
			0 => return Err(TurnError::MissingRoot { component: fingerprint.name.clone() }),
			1 => (),
			roots => warn!(roots, "Component renders more than one root element; Only the first one is tracked."),
		}
		let html_hash = format!("{:016x}", xxh3_64(html.as_bytes()));

		let dirty = match previous {
			None => Vec::new(),
			Some(previous) => match self.config.dirty_policy {
				DirtyPolicy::Hashed => hasher.dehydrate(&fingerprint.id, &data),
				DirtyPolicy::Snapshot => snapshot_diff(&previous.data, &data),
			},
		};
		hasher.forget(&fingerprint.id);

		let mut memo = ServerMemo {
			children: previous.map(|previous| previous.children.clone()).unwrap_or_default(),
			errors,
			html_hash,
			data,
			data_meta: previous.map(|previous| previous.data_meta.clone()).unwrap_or_default(),
			checksum: None,
		};
		self.guard.seal(fingerprint, &mut memo);

		let mut effects = effects.compile(dirty, instance.listeners());
		let unchanged = previous.map_or(false, |previous| previous.html_hash == memo.html_hash);
		if self.config.omit_unchanged_html && unchanged {
			trace!("Markup unchanged; Omitting it.");
		} else {
			let embedded = if previous.is_none() {
				effects.clone()
			} else {
				Effects {
					listeners: effects.listeners.clone(),
					..Effects::default()
				}
			};
			let initial = InitialData {
				fingerprint: fingerprint.clone(),
				effects: embedded,
				server_memo: memo.clone(),
			};
			effects.html = Some(self.embed(&html, fingerprint, &initial)?);
		}
		self.bus.trigger(&SignalEvent::ComponentRendered {
			component: &fingerprint.name,
			id: &fingerprint.id,
			html: &html,
		});
		Ok((effects, memo))
	}

	fn embed(&self, html: &str, fingerprint: &Fingerprint, initial: &InitialData) -> Result<String, TurnError> {
		let serialized = serde_json::to_string(initial).map_err(|error| TurnError::Render {
			component: fingerprint.name.clone(),
			message: error.to_string(),
		})?;
		let prefix = &self.config.prefix;
		add_root_attributes(
			html,
			&[
				(format!("{}id", prefix), fingerprint.id.clone()),
				(format!("{}initial-data", prefix), serialized),
			],
		)
		.ok_or_else(|| TurnError::MissingRoot { component: fingerprint.name.clone() })
	}
}

fn invalid_field(component: &str, error: FieldError) -> TurnError {
	TurnError::InvalidField {
		component: component.to_owned(),
		field: error.field,
		message: error.message,
	}
}

fn field_argument(scope: &Scope<'_>, method: &str, params: &[Value]) -> Result<String, TurnError> {
	params.get(0).and_then(Value::as_str).map(str::to_owned).ok_or_else(|| TurnError::MethodFailed {
		component: scope.name().to_owned(),
		method: method.to_owned(),
		message: "expected a field name as first argument".to_owned(),
	})
}
