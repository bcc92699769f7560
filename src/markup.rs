//! A forgiving HTML fragment parser and the escaping used when writing markup back out.
//!
//! Component markup comes from trusted server-side renderers, so this only handles what those
//! produce: elements, attributes (quoted, unquoted, bare), text with character references,
//! comments, void elements and raw text elements. Optional end tags aren't inferred.

use crate::document::{Document, NodeId};
use std::borrow::Cow;
use tracing::{instrument, trace, warn};

pub(crate) const VOID_ELEMENTS: &[&str] = &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr"];
pub(crate) const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Parses `markup` into the `body` of a fresh [`Document`].
#[must_use]
pub fn parse_fragment(markup: &str) -> Document {
	let mut document = Document::new();
	let body = document.body();
	parse_into(&mut document, body, markup);
	document
}

/// Number of top-level elements in `markup`. Text and comments don't count.
#[must_use]
pub fn count_root_elements(markup: &str) -> usize {
	let document = parse_fragment(markup);
	document.element_children(document.body()).len()
}

/// Appends the nodes of `markup` to `parent`.
#[instrument(skip(document, markup))]
pub fn parse_into(document: &mut Document, parent: NodeId, markup: &str) {
	let mut open = vec![parent];
	let mut rest = markup;

	while !rest.is_empty() {
		let current = *open.last().unwrap_or(&parent);

		if let Some(after) = rest.strip_prefix("<!--") {
			let (comment, tail) = match after.find("-->") {
				Some(end) => (&after[..end], &after[end + 3..]),
				None => (after, ""),
			};
			let node = document.create_comment(comment);
			document.append_child(current, node);
			rest = tail;
		} else if rest.starts_with("<!") || rest.starts_with("<?") {
			rest = rest.find('>').map_or("", |end| &rest[end + 1..]);
		} else if let Some(after) = rest.strip_prefix("</") {
			let end = after.find('>').unwrap_or(after.len());
			let name = after[..end].trim().to_ascii_lowercase();
			match open.iter().skip(1).rposition(|&node| document.tag(node) == Some(name.as_str())) {
				Some(position) => {
					for closed in open.drain(position + 1..).rev() {
						document.reset_form_state(closed);
					}
				}
				None => warn!("Stray end tag </{}>; Ignoring it.", name),
			}
			rest = after.get(end + 1..).unwrap_or("");
		} else if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
			let StartTag { name, attributes, self_closing, rest: tail } = parse_start_tag(rest);
			let element = document.create_element(&name);
			for (attribute, value) in attributes {
				document.set_attribute(element, &attribute, &value);
			}
			document.append_child(current, element);
			rest = tail;

			if RAW_TEXT_ELEMENTS.contains(&name.as_str()) && !self_closing {
				let closing = format!("</{}", name);
				let end = rest.to_ascii_lowercase().find(&closing).unwrap_or(rest.len());
				let text = &rest[..end];
				if !text.is_empty() {
					let text = if name == "script" || name == "style" { Cow::Borrowed(text) } else { decode_entities(text) };
					let node = document.create_text(&text);
					document.append_child(element, node);
				}
				rest = &rest[end..];
				rest = rest.find('>').map_or("", |end| &rest[end + 1..]);
				document.reset_form_state(element);
			} else if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
				document.reset_form_state(element);
			} else {
				open.push(element);
			}
		} else {
			let end = rest.char_indices().skip(1).find(|&(_, c)| c == '<').map_or(rest.len(), |(end, _)| end);
			let node = document.create_text(&decode_entities(&rest[..end]));
			document.append_child(current, node);
			rest = &rest[end..];
		}
	}

	for unclosed in open.drain(1..).rev() {
		trace!("Implicitly closing <{}>", document.tag(unclosed).unwrap_or_default());
		document.reset_form_state(unclosed);
	}
}

struct StartTag<'a> {
	name: String,
	attributes: Vec<(String, String)>,
	self_closing: bool,
	rest: &'a str,
}

fn parse_start_tag(input: &str) -> StartTag<'_> {
	let bytes = input.as_bytes();
	let is_name_end = |byte: u8| byte.is_ascii_whitespace() || byte == b'/' || byte == b'>' || byte == b'=';

	let mut i = 1;
	while i < bytes.len() && !is_name_end(bytes[i]) {
		i += 1;
	}
	let name = input[1..i].to_ascii_lowercase();
	let mut attributes: Vec<(String, String)> = Vec::new();

	loop {
		while i < bytes.len() && bytes[i].is_ascii_whitespace() {
			i += 1;
		}
		if i >= bytes.len() {
			return StartTag { name, attributes, self_closing: false, rest: "" };
		}
		match bytes[i] {
			b'>' => return StartTag { name, attributes, self_closing: false, rest: &input[i + 1..] },
			b'/' if bytes.get(i + 1) == Some(&b'>') => return StartTag { name, attributes, self_closing: true, rest: &input[i + 2..] },
			b'/' | b'=' => {
				i += 1;
				continue;
			}
			_ => (),
		}

		let start = i;
		while i < bytes.len() && !is_name_end(bytes[i]) {
			i += 1;
		}
		let attribute = input[start..i].to_ascii_lowercase();

		while i < bytes.len() && bytes[i].is_ascii_whitespace() {
			i += 1;
		}
		let mut value = String::new();
		if bytes.get(i) == Some(&b'=') {
			i += 1;
			while i < bytes.len() && bytes[i].is_ascii_whitespace() {
				i += 1;
			}
			match bytes.get(i) {
				Some(&quote) if quote == b'"' || quote == b'\'' => {
					let end = input[i + 1..].find(quote as char).map_or(bytes.len(), |end| i + 1 + end);
					value = decode_entities(&input[i + 1..end]).into_owned();
					i = (end + 1).min(bytes.len());
				}
				_ => {
					let start = i;
					while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
						i += 1;
					}
					value = decode_entities(&input[start..i]).into_owned();
				}
			}
		}

		if attributes.iter().any(|(existing, _)| *existing == attribute) {
			warn!("Duplicate attribute {:?} on <{}>; Keeping the first.", attribute, name);
		} else {
			attributes.push((attribute, value));
		}
	}
}

/// Resolves character references. Unknown references are kept literally.
#[must_use]
pub fn decode_entities(text: &str) -> Cow<'_, str> {
	if !text.contains('&') {
		return Cow::Borrowed(text);
	}

	let mut decoded = String::with_capacity(text.len());
	let mut rest = text;
	while let Some(start) = rest.find('&') {
		decoded.push_str(&rest[..start]);
		rest = &rest[start..];
		// `;` is ASCII, so its byte position is always a char boundary.
		let resolved = rest.as_bytes()[1..].iter().take(11).position(|&byte| byte == b';').and_then(|end| {
			let character = match &rest[1..=end] {
				"amp" => '&',
				"lt" => '<',
				"gt" => '>',
				"quot" => '"',
				"apos" => '\'',
				"nbsp" => '\u{a0}',
				numeric => {
					let numeric = numeric.strip_prefix('#')?;
					let code = match numeric.strip_prefix(|c: char| c == 'x' || c == 'X') {
						Some(hex) => u32::from_str_radix(hex, 16).ok()?,
						None => numeric.parse().ok()?,
					};
					char::from_u32(code)?
				}
			};
			Some((character, end + 2))
		});
		match resolved {
			Some((character, consumed)) => {
				decoded.push(character);
				rest = &rest[consumed..];
			}
			None => {
				decoded.push('&');
				rest = &rest[1..];
			}
		}
	}
	decoded.push_str(rest);
	Cow::Owned(decoded)
}

#[must_use]
pub fn escape_text(text: &str) -> Cow<'_, str> {
	escape(text, false)
}

/// Escapes a value for use inside a double- or single-quoted attribute.
#[must_use]
pub fn escape_attribute(value: &str) -> Cow<'_, str> {
	escape(value, true)
}

fn escape(text: &str, quotes: bool) -> Cow<'_, str> {
	let needs_escape = |c: char| matches!(c, '&' | '<' | '>') || (quotes && matches!(c, '"' | '\''));
	if !text.contains(needs_escape) {
		return Cow::Borrowed(text);
	}
	let mut escaped = String::with_capacity(text.len() + 16);
	for c in text.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' if quotes => escaped.push_str("&quot;"),
			'\'' if quotes => escaped.push_str("&#039;"),
			c => escaped.push(c),
		}
	}
	Cow::Owned(escaped)
}
