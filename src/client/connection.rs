//! Request building and response interpretation for component turns.
//!
//! The actual I/O happens behind [`Transport`], which is polled by the runtime so that
//! deliveries are processed at well-defined points.

use crate::{
	config::ClientConfig,
	error::TransportError,
	protocol::{RequestPayload, ResponsePayload},
	server::{Dispatcher, InboundRequest},
};
use std::{collections::VecDeque, sync::Arc};
use tracing::{error, instrument, trace, warn};

/// Correlates a sent request with its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
	pub url: String,
	pub method: &'static str,
	pub headers: Vec<(String, String)>,
	pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
	pub status: u16,
	pub headers: Vec<(String, String)>,
	pub body: String,
}

impl HttpReply {
	#[must_use]
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.iter().find(|(existing, _)| existing.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
	}
}

pub trait Transport {
	fn send(&mut self, ticket: Ticket, request: OutboundRequest);
	/// Returns one completed exchange, if any.
	fn poll(&mut self) -> Option<(Ticket, Result<HttpReply, TransportError>)>;
}

/// What the runtime should do with a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
	Payload(ResponsePayload),
	/// The session (CSRF token) expired. `first` is only set the first time per page.
	SessionExpired { first: bool },
	Redirect(String),
	Failed { status: Option<u16>, body: String },
}

#[derive(Debug, Clone)]
pub struct Connection {
	app_url: String,
	headers: Vec<(String, String)>,
	session_expired: bool,
}

impl Connection {
	#[must_use]
	pub fn new(config: &ClientConfig) -> Self {
		let mut headers = vec![
			("Content-Type".to_owned(), "application/json".to_owned()),
			("Accept".to_owned(), "text/html, application/xhtml+xml".to_owned()),
			("X-Requested-With".to_owned(), "XMLHttpRequest".to_owned()),
			(config.marker_header.clone(), "true".to_owned()),
		];
		headers.extend(config.headers.iter().map(|(name, value)| (name.clone(), value.clone())));
		if let Some(token) = &config.csrf_token {
			headers.push(("X-CSRF-TOKEN".to_owned(), token.clone()));
		}
		Self {
			app_url: config.app_url.trim_end_matches('/').to_owned(),
			headers,
			session_expired: false,
		}
	}

	/// # Errors
	///
	/// Iff the payload can't be serialized.
	pub fn request(&self, payload: &RequestPayload) -> Result<OutboundRequest, serde_json::Error> {
		Ok(OutboundRequest {
			url: format!("{}/{}", self.app_url, payload.fingerprint.name),
			method: "POST",
			headers: self.headers.clone(),
			body: serde_json::to_string(payload)?,
		})
	}

	#[must_use]
	pub fn session_expired(&self) -> bool {
		self.session_expired
	}

	#[instrument(skip(self, reply))]
	pub fn interpret(&mut self, reply: Result<HttpReply, TransportError>) -> Delivery {
		let reply = match reply {
			Ok(reply) => reply,
			Err(error) => {
				error!("Transport failed: {}", error);
				return Delivery::Failed { status: None, body: String::new() };
			}
		};
		trace!(status = reply.status);

		match reply.status {
			200..=299 => match serde_json::from_str(&reply.body) {
				Ok(payload) => Delivery::Payload(payload),
				Err(parse_error) => {
					error!("Response body is not a component payload: {}", parse_error);
					Delivery::Failed { status: Some(reply.status), body: reply.body }
				}
			},
			419 => {
				let first = !self.session_expired;
				self.session_expired = true;
				if !first {
					trace!("Session already flagged as expired; Not prompting again.");
				}
				Delivery::SessionExpired { first }
			}
			300..=399 => match reply.header("Location") {
				Some(location) => Delivery::Redirect(location.to_owned()),
				None => {
					warn!("Redirect status without a `Location` header.");
					Delivery::Failed { status: Some(reply.status), body: reply.body }
				}
			},
			status => Delivery::Failed { status: Some(status), body: reply.body },
		}
	}
}

/// Sends requests straight into an in-process [`Dispatcher`].
#[derive(Debug)]
pub struct LoopbackTransport {
	dispatcher: Arc<Dispatcher>,
	replies: VecDeque<(Ticket, Result<HttpReply, TransportError>)>,
	sent: Vec<OutboundRequest>,
}

impl LoopbackTransport {
	#[must_use]
	pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
		Self {
			dispatcher,
			replies: VecDeque::new(),
			sent: Vec::new(),
		}
	}

	/// Every request sent so far.
	#[must_use]
	pub fn sent(&self) -> &[OutboundRequest] {
		&self.sent
	}
}

impl Transport for LoopbackTransport {
	fn send(&mut self, ticket: Ticket, request: OutboundRequest) {
		let inbound = InboundRequest {
			headers: request.headers.clone(),
			body: request.body.clone(),
		};
		let (status, body) = self.dispatcher.handle_http(&inbound);
		self.sent.push(request);
		self.replies.push_back((
			ticket,
			Ok(HttpReply {
				status,
				headers: vec![("Content-Type".to_owned(), "application/json".to_owned())],
				body,
			}),
		));
	}

	fn poll(&mut self) -> Option<(Ticket, Result<HttpReply, TransportError>)> {
		self.replies.pop_front()
	}
}
