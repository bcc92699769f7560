//! Tamper detection for component snapshots.
//!
//! The seal is an HMAC-SHA256 over the fingerprint followed by the memo, both serialized as
//! canonical JSON. `children` is left out since the client rewrites it after every morph, and the
//! checksum obviously can't cover itself.

use crate::protocol::{Fingerprint, ServerMemo};
use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use tracing::{instrument, trace, warn};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct ChecksumGuard {
	key: Vec<u8>,
}

impl std::fmt::Debug for ChecksumGuard {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChecksumGuard").field("key", &"<redacted>").finish()
	}
}

impl ChecksumGuard {
	pub fn new(secret: impl AsRef<[u8]>) -> Self {
		Self { key: secret.as_ref().to_vec() }
	}

	fn mac(&self, fingerprint: &Fingerprint, memo: &ServerMemo) -> HmacSha256 {
		let mut mac = match HmacSha256::new_from_slice(&self.key) {
			Ok(mac) => mac,
			Err(_) => unreachable!("HMAC accepts keys of any length"),
		};
		mac.update(canonical_fingerprint(fingerprint).to_string().as_bytes());
		mac.update(canonical_memo(memo).to_string().as_bytes());
		mac
	}

	/// Computes the lowercase hex seal of this snapshot.
	#[must_use]
	pub fn generate(&self, fingerprint: &Fingerprint, memo: &ServerMemo) -> String {
		hex::encode(self.mac(fingerprint, memo).finalize().into_bytes())
	}

	/// Constant-time comparison of `digest` against the seal of this snapshot.
	#[must_use]
	#[instrument(skip(self, memo), fields(component = %fingerprint.name, id = %fingerprint.id))]
	pub fn check(&self, digest: &str, fingerprint: &Fingerprint, memo: &ServerMemo) -> bool {
		let digest = match hex::decode(digest) {
			Ok(digest) => digest,
			Err(_) => {
				warn!("Checksum is not a hex string.");
				return false;
			}
		};
		let verified = self.mac(fingerprint, memo).verify_slice(&digest).is_ok();
		trace!(verified);
		verified
	}

	/// Stores a fresh seal in `memo.checksum`.
	pub fn seal(&self, fingerprint: &Fingerprint, memo: &mut ServerMemo) {
		memo.checksum = Some(self.generate(fingerprint, memo));
	}
}

fn canonical_fingerprint(fingerprint: &Fingerprint) -> Value {
	json!({
		"id": fingerprint.id,
		"name": fingerprint.name,
		"locale": fingerprint.locale,
		"path": fingerprint.path,
		"method": fingerprint.method,
	})
}

fn canonical_memo(memo: &ServerMemo) -> Value {
	let errors: Map<String, Value> = memo
		.errors
		.iter()
		.map(|(field, messages)| (field.clone(), messages.iter().cloned().map(Value::String).collect()))
		.collect();
	json!({
		"errors": errors,
		"htmlHash": memo.html_hash,
		"data": memo.data,
		"dataMeta": memo.data_meta,
	})
}
