//! Deployment settings for both halves of the protocol.
//!
//! Every struct deserializes with defaults for missing keys, so `{}` is a valid configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute prefix used for component identity and directives (`live:id`, `live:model`, …).
pub const DEFAULT_PREFIX: &str = "live:";
/// Header that marks a request as a component turn.
pub const DEFAULT_MARKER_HEADER: &str = "X-Live";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub server: ServerConfig,
	pub client: ClientConfig,
}

impl Config {
	/// # Errors
	///
	/// Iff `json` isn't a valid configuration document.
	pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
		Ok(serde_json::from_str(json)?)
	}
}

/// How the server decides which fields changed during a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyPolicy {
	/// Per-path hashes taken at hydration, compared at dehydration. Nested objects report dot paths.
	Hashed,
	/// Top-level comparison of the incoming snapshot against the outgoing one.
	Snapshot,
}

impl Default for DirtyPolicy {
	fn default() -> Self {
		Self::Hashed
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
	/// HMAC key for snapshot seals. Empty means "generate one per process".
	pub secret: String,
	pub marker_header: String,
	pub prefix: String,
	pub locale: String,
	pub dirty_policy: DirtyPolicy,
	/// Leave `effects.html` out when the rendered markup hashes the same as before the turn.
	pub omit_unchanged_html: bool,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			secret: String::new(),
			marker_header: DEFAULT_MARKER_HEADER.to_owned(),
			prefix: DEFAULT_PREFIX.to_owned(),
			locale: "EN".to_owned(),
			dirty_policy: DirtyPolicy::default(),
			omit_unchanged_html: true,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	/// Base URL; turns are posted to `{app_url}/{component name}`.
	pub app_url: String,
	pub marker_header: String,
	pub prefix: String,
	pub debounce_ms: u64,
	pub model_debounce_ms: u64,
	pub poll_interval_ms: u64,
	pub prefetch_ttl_ms: u64,
	pub headers: BTreeMap<String, String>,
	pub csrf_token: Option<String>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			app_url: String::new(),
			marker_header: DEFAULT_MARKER_HEADER.to_owned(),
			prefix: DEFAULT_PREFIX.to_owned(),
			debounce_ms: 5,
			model_debounce_ms: 150,
			poll_interval_ms: 2000,
			prefetch_ttl_ms: 30_000,
			headers: BTreeMap::new(),
			csrf_token: None,
		}
	}
}
