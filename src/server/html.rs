//! Identity attribute injection into rendered component markup.

use crate::markup::escape_attribute;
use tracing::{instrument, warn};

/// Inserts `attributes` into the first start tag of `markup`.
///
/// Returns `None` iff `markup` contains no element.
#[instrument(skip(markup, attributes))]
#[must_use]
pub fn add_root_attributes(markup: &str, attributes: &[(String, String)]) -> Option<String> {
	let start = first_start_tag(markup)?;
	let tag_end = markup[start..].find('>').map(|offset| start + offset)?;
	let insert_at = if markup[..tag_end].ends_with('/') { tag_end - 1 } else { tag_end };

	let mut rendered = String::with_capacity(markup.len() + attributes.iter().map(|(name, value)| name.len() + value.len() + 4).sum::<usize>());
	rendered.push_str(&markup[..insert_at]);
	for (name, value) in attributes {
		rendered.push(' ');
		rendered.push_str(name);
		rendered.push_str("=\"");
		rendered.push_str(&escape_attribute(value));
		rendered.push('"');
	}
	rendered.push_str(&markup[insert_at..]);
	Some(rendered)
}

fn first_start_tag(markup: &str) -> Option<usize> {
	let mut offset = 0;
	while let Some(found) = markup[offset..].find('<') {
		let position = offset + found;
		let rest = &markup[position + 1..];
		if rest.starts_with("!--") {
			offset = position + rest.find("-->").map_or(markup.len() - position, |end| end + 4);
			if offset >= markup.len() {
				return None;
			}
		} else if rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
			return Some(position);
		} else {
			offset = position + 1;
		}
	}
	if offset == 0 && !markup.trim().is_empty() {
		warn!("Markup contains no tags.");
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;

	fn attributes() -> Vec<(String, String)> {
		vec![("live:id".into(), "abc".into()), ("live:initial-data".into(), r#"{"a":"<'>"}"#.into())]
	}

	#[test]
	fn injects_into_first_tag() {
		let rendered = add_root_attributes("<!-- c --><div class=\"x\"><span></span></div>", &attributes()).unwrap();
		assert_eq!(
			rendered,
			"<!-- c --><div class=\"x\" live:id=\"abc\" live:initial-data=\"{&quot;a&quot;:&quot;&lt;&#039;&gt;&quot;}\"><span></span></div>"
		);
	}

	#[test]
	fn self_closing() {
		assert_eq!(add_root_attributes("<input/>", &attributes()[..1]).unwrap(), "<input live:id=\"abc\"/>");
	}

	#[test]
	fn no_element() {
		assert_eq!(add_root_attributes("just text", &attributes()), None);
		assert_eq!(add_root_attributes("<!-- only a comment -->", &attributes()), None);
	}
}
