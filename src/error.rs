//! Error types shared by the server turn and the client runtime.

use thiserror::Error;

/// Coarse classification of a failed server turn.
///
/// The kind decides which HTTP status [`crate::server::Dispatcher::handle_http`] answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// The sealed snapshot did not survive the round trip unmodified.
	Integrity,
	/// The request is not shaped like a component turn.
	Protocol,
	/// The request tried to reach something that isn't exposed.
	Authorization,
	/// Component code, rendering or a collaborator failed.
	Component,
}

impl ErrorKind {
	#[must_use]
	pub fn status_code(self) -> u16 {
		match self {
			ErrorKind::Integrity => 403,
			ErrorKind::Protocol => 400,
			ErrorKind::Authorization => 404,
			ErrorKind::Component => 500,
		}
	}
}

/// A failed server turn. No partial state is ever returned alongside one of these.
#[derive(Debug, Error)]
pub enum TurnError {
	#[error("not a component request: missing `{header}` header")]
	NotProtocolRequest { header: String },
	#[error("malformed request payload: {0}")]
	Malformed(String),
	#[error("unknown action type `{0}`")]
	UnknownActionType(String),
	#[error("corrupt data when hydrating the [{component}] component; ensure that [name, id, data] of the component were not tampered with between requests")]
	Integrity { component: String },
	#[error("component [{0}] is not registered")]
	UnknownComponent(String),
	#[error("property [{field}] not found on component [{component}]")]
	MissingProperty { component: String, field: String },
	#[error("method [{method}] is not callable on component [{component}]")]
	UnknownMethod { component: String, method: String },
	#[error("component [{component}] does not listen for event [{event}]")]
	UnknownListener { component: String, event: String },
	#[error("field [{field}] of component [{component}] rejected its value: {message}")]
	InvalidField { component: String, field: String, message: String },
	#[error("[{component}::{method}] failed: {message}")]
	MethodFailed { component: String, method: String, message: String },
	#[error("component [{component}] rendered markup without a root element")]
	MissingRoot { component: String },
	#[error("view for component [{component}] could not be rendered: {message}")]
	Render { component: String, message: String },
}

impl TurnError {
	#[must_use]
	pub fn kind(&self) -> ErrorKind {
		match self {
			TurnError::Integrity { .. } => ErrorKind::Integrity,
			TurnError::NotProtocolRequest { .. } | TurnError::Malformed(_) | TurnError::UnknownActionType(_) => ErrorKind::Protocol,
			TurnError::UnknownComponent(_) | TurnError::MissingProperty { .. } | TurnError::UnknownMethod { .. } | TurnError::UnknownListener { .. } => ErrorKind::Authorization,
			TurnError::InvalidField { .. } | TurnError::MethodFailed { .. } | TurnError::MissingRoot { .. } | TurnError::Render { .. } => ErrorKind::Component,
		}
	}

	#[must_use]
	pub fn status_code(&self) -> u16 {
		self.kind().status_code()
	}
}

/// Returned by component method handlers.
#[derive(Debug, Error)]
pub enum MethodError {
	/// Validation failed. The messages are already in the error bag; only the current action is stopped.
	#[error("validation failed for {} field(s)", .0.len())]
	Invalid(std::collections::BTreeMap<String, String>),
	#[error("argument {index}: {message}")]
	Argument { index: usize, message: String },
	#[error("{0}")]
	Failed(String),
}

impl MethodError {
	pub fn failed(message: impl Into<String>) -> Self {
		Self::Failed(message.into())
	}
}

#[derive(Debug, Error)]
#[error("field [{field}] rejected value: {message}")]
pub struct FieldError {
	pub field: String,
	pub message: String,
}

/// Client-side component initialization failures.
#[derive(Debug, Error)]
pub enum InitError {
	#[error("component root is missing the `{0}` attribute")]
	MissingAttribute(String),
	#[error("initial data of component root is not valid: {0}")]
	InvalidInitialData(String),
	#[error("component [{0}] is already initialized")]
	AlreadyInitialized(String),
}

/// Failures of client runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
	#[error("component [{0}] is not initialized on this page")]
	UnknownComponent(String),
	#[error("request could not be serialized: {0}")]
	Serialize(#[from] serde_json::Error),
}

/// Network-level failures reported by a [`crate::client::Transport`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
	#[error("network error: {0}")]
	Network(String),
	#[error("request was aborted")]
	Aborted,
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid configuration: {0}")]
	Parse(#[from] serde_json::Error),
}

/// A hook name outside the fixed set of lifecycle points.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown hook `{0}`")]
pub struct UnknownHook(pub String);
