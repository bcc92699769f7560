//! Pseudo-methods for components that accept file uploads.
//!
//! Files go to a [`super::BlobStore`] out of band. Only their references travel through component state.

use super::{component::Instance, scope::Scope};
use crate::error::{FieldError, MethodError, TurnError};
use serde_json::{json, Value};
use tracing::{instrument, warn};

pub const START: &str = "startUpload";
pub const FINISH: &str = "finishUpload";
pub const ERRORED: &str = "uploadErrored";
pub const REMOVE: &str = "removeUpload";

const FAILED_MESSAGE: &str = "The upload failed.";

#[must_use]
pub fn is_upload_method(method: &str) -> bool {
	[START, FINISH, ERRORED, REMOVE].contains(&method)
}

fn argument(params: &[Value], index: usize) -> Result<&Value, MethodError> {
	params.get(index).ok_or(MethodError::Argument { index, message: "missing".to_owned() })
}

fn references(value: &Value) -> Vec<String> {
	match value {
		Value::String(reference) => vec![reference.clone()],
		Value::Array(items) => items.iter().filter_map(Value::as_str).map(str::to_owned).collect(),
		_ => vec![],
	}
}

/// Runs one upload pseudo-method.
///
/// # Errors
///
/// Iff the addressed field doesn't exist, an argument is missing or the field rejects the file references.
#[instrument(skip(instance, scope, params))]
pub(crate) fn call(instance: &mut dyn Instance, scope: &mut Scope<'_>, method: &str, params: &[Value]) -> Result<(), TurnError> {
	let component = scope.name().to_owned();
	let failed = |error: MethodError| TurnError::MethodFailed {
		component: component.clone(),
		method: method.to_owned(),
		message: error.to_string(),
	};
	let invalid = |error: FieldError| TurnError::InvalidField {
		component: component.clone(),
		field: error.field,
		message: error.message,
	};

	let field = argument(params, 0)
		.map_err(failed)?
		.as_str()
		.ok_or_else(|| {
			failed(MethodError::Argument {
				index: 0,
				message: "expected a field name".to_owned(),
			})
		})?
		.to_owned();
	let base = field.split('.').next().unwrap_or_default();
	if !instance.has_field(base) {
		return Err(TurnError::MissingProperty { component, field });
	}

	match method {
		START => {
			let url = scope.blobs().upload_url(scope.id(), &field);
			scope.emit("upload:generatedSignedUrl", vec![json!(field), json!(url)]).only_self();
		}
		FINISH => {
			let uploaded = references(argument(params, 1).map_err(failed)?);
			let multiple = params.get(2).and_then(Value::as_bool).unwrap_or(false);
			if uploaded.iter().any(|reference| !scope.blobs().contains(reference)) {
				warn!("Upload reference is unknown to the blob store.");
				scope.add_error(field.clone(), FAILED_MESSAGE);
				scope.emit("upload:errored", vec![json!(field)]).only_self();
				return Ok(());
			}
			let value = if multiple {
				json!(uploaded)
			} else {
				uploaded.first().map_or(Value::Null, |reference| json!(reference))
			};
			instance.set(&field, value).map_err(invalid)?;
			scope.emit("upload:finished", vec![json!(field), json!(uploaded)]).only_self();
		}
		ERRORED => {
			let message = params
				.get(1)
				.and_then(Value::as_str)
				.and_then(|errors| serde_json::from_str::<Value>(errors).ok())
				.and_then(|errors| errors.get(&field).and_then(|messages| messages.get(0)).and_then(Value::as_str).map(str::to_owned))
				.unwrap_or_else(|| FAILED_MESSAGE.to_owned());
			scope.add_error(field.clone(), message);
			scope.emit("upload:errored", vec![json!(field)]).only_self();
		}
		REMOVE => {
			let reference = argument(params, 1).map_err(failed)?.as_str().unwrap_or_default().to_owned();
			let remaining = match instance.get(&field) {
				Some(Value::Array(items)) => Value::Array(items.into_iter().filter(|item| item.as_str() != Some(reference.as_str())).collect()),
				Some(Value::String(current)) if current == reference => Value::Null,
				Some(other) => other,
				None => Value::Null,
			};
			instance.set(&field, remaining).map_err(invalid)?;
			scope.blobs().remove(&reference);
			scope.emit("upload:removed", vec![json!(field), json!(reference)]).only_self();
		}
		_ => {
			return Err(TurnError::UnknownMethod {
				component,
				method: method.to_owned(),
			})
		}
	}
	Ok(())
}
